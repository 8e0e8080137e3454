//! Storage service: atomic writes, version conflicts, manifest waits.

mod common;

use common::*;
use prost::Message as ProstMessage;

use signal_mock_server::proto::storage::{
    ReadOperation, StorageItem, StorageItems, StorageManifest, WriteOperation,
};

fn write_op(version: u64, inserts: Vec<StorageItem>) -> WriteOperation {
    WriteOperation {
        manifest: Some(StorageManifest {
            version: Some(version),
            value: Some(format!("manifest-v{}", version).into_bytes()),
        }),
        insert_item: inserts,
        delete_key: vec![],
        clear_all: None,
    }
}

fn item(key: &[u8], value: &[u8]) -> StorageItem {
    StorageItem {
        key: Some(key.to_vec()),
        value: Some(value.to_vec()),
    }
}

#[tokio::test]
async fn test_conflict_returns_current_manifest_then_retry_succeeds() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();
    let auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);

    // Install version 3.
    let response = client
        .put(http_url(addr, "/v1/storage"))
        .header("authorization", auth.clone())
        .body(write_op(3, vec![]).encode_to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Re-submitting version 3 conflicts and hands back the current manifest.
    let response = client
        .put(http_url(addr, "/v1/storage"))
        .header("authorization", auth.clone())
        .body(write_op(3, vec![item(b"k", b"v")]).encode_to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let current =
        StorageManifest::decode(response.bytes().await.unwrap().as_ref()).unwrap();
    assert_eq!(current.version, Some(3));

    // Retry at version 4 goes through.
    let response = client
        .put(http_url(addr, "/v1/storage"))
        .header("authorization", auth.clone())
        .body(write_op(4, vec![item(b"k", b"v")]).encode_to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The manifest newer than version 3 is now v4.
    let response = client
        .get(http_url(addr, "/v1/storage/manifest/version/3"))
        .header("authorization", auth.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let manifest =
        StorageManifest::decode(response.bytes().await.unwrap().as_ref()).unwrap();
    assert_eq!(manifest.version, Some(4));

    // Nothing newer than v4.
    let response = client
        .get(http_url(addr, "/v1/storage/manifest/version/4"))
        .header("authorization", auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_item_roundtrip_via_read_operation() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();
    let auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);

    let value = vec![0x00, 0xff, 0x10, 0x20, 0x30];
    client
        .put(http_url(addr, "/v1/storage"))
        .header("authorization", auth.clone())
        .body(write_op(1, vec![item(b"record-1", &value)]).encode_to_vec())
        .send()
        .await
        .unwrap();

    let read = ReadOperation {
        read_key: vec![b"record-1".to_vec(), b"absent".to_vec()],
    };
    let response = client
        .put(http_url(addr, "/v1/storage/read"))
        .header("authorization", auth)
        .body(read.encode_to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let items = StorageItems::decode(response.bytes().await.unwrap().as_ref()).unwrap();
    assert_eq!(items.items.len(), 1);
    assert_eq!(items.items[0].value.as_deref(), Some(value.as_slice()));
}

#[tokio::test]
async fn test_manifest_wait_rendezvous() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();
    let auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);

    let aci = alice.aci;
    let waiter = {
        let state = server.state().clone();
        tokio::spawn(async move {
            state
                .wait_for_manifest(aci, 0, std::time::Duration::from_secs(5))
                .await
        })
    };
    tokio::task::yield_now().await;

    client
        .put(http_url(addr, "/v1/storage"))
        .header("authorization", auth)
        .body(write_op(7, vec![]).encode_to_vec())
        .send()
        .await
        .unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), 7);
    assert_eq!(server.wait_for_storage_manifest(aci, 0).await.unwrap(), 7);
}

#[tokio::test]
async fn test_storage_requires_auth() {
    let (_server, addr) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .put(http_url(addr, "/v1/storage"))
        .body(write_op(1, vec![]).encode_to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
