//! End-to-end prekey exchange over the REST surface.

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::*;

#[tokio::test]
async fn test_register_primary_and_fetch_prekeys() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    // Upload 5 one-time prekeys (ids 1..=5) and a signed prekey (id 100).
    let body = serde_json::json!({
        "preKeys": (1..=5).map(one_time_prekey_json).collect::<Vec<_>>(),
        "signedPreKey": signed_prekey_json(&alice.aci_identity, 100),
    });
    let response = client
        .put(http_url(addr, "/v2/keys?identity=aci"))
        .header("authorization", alice.authorization())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Unauthenticated bundle fetch consumes the oldest one-time key.
    let response = client
        .get(http_url(addr, &format!("/v2/keys/{}/1", alice.aci)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let bundle: serde_json::Value = response.json().await.unwrap();

    assert_eq!(
        bundle["identityKey"].as_str().unwrap(),
        BASE64.encode(alice.aci_identity.public_key.serialize())
    );
    let devices = bundle["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["deviceId"], 1);
    assert_eq!(devices[0]["registrationId"], alice.registration_id);
    assert_eq!(devices[0]["preKey"]["keyId"], 1);
    assert_eq!(devices[0]["signedPreKey"]["keyId"], 100);

    // The one-time queue is now [2, 3, 4, 5].
    let response = client
        .get(http_url(addr, "/v2/keys?identity=aci"))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap();
    let counts: serde_json::Value = response.json().await.unwrap();
    assert_eq!(counts["count"], 4);

    let response = client
        .get(http_url(addr, &format!("/v2/keys/{}/1", alice.aci)))
        .send()
        .await
        .unwrap();
    let bundle: serde_json::Value = response.json().await.unwrap();
    assert_eq!(bundle["devices"][0]["preKey"]["keyId"], 2);
}

#[tokio::test]
async fn test_exhausted_one_time_queue_serves_signed_prekey_only() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "signedPreKey": signed_prekey_json(&alice.aci_identity, 42),
    });
    client
        .put(http_url(addr, "/v2/keys?identity=aci"))
        .header("authorization", alice.authorization())
        .json(&body)
        .send()
        .await
        .unwrap();

    let bundle: serde_json::Value = client
        .get(http_url(addr, &format!("/v2/keys/{}/1", alice.aci)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let device = &bundle["devices"][0];
    assert!(device.get("preKey").is_none());
    assert_eq!(device["signedPreKey"]["keyId"], 42);
}

#[tokio::test]
async fn test_upload_rejects_bad_signature() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let mut signed = signed_prekey_json(&alice.aci_identity, 1);
    signed["signature"] = serde_json::json!(BASE64.encode([0u8; 64]));
    let response = client
        .put(http_url(addr, "/v2/keys?identity=aci"))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({ "signedPreKey": signed }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_fetch_unknown_targets_is_404_and_unauthenticated_upload_is_401() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let response = client
        .get(http_url(
            addr,
            &format!("/v2/keys/{}/1", uuid::Uuid::new_v4()),
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(http_url(addr, &format!("/v2/keys/{}/7", alice.aci)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .put(http_url(addr, "/v2/keys?identity=aci"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_pni_flavor_is_independent() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "preKeys": [one_time_prekey_json(11)],
        "signedPreKey": signed_prekey_json(&alice.pni_identity, 900),
    });
    let response = client
        .put(http_url(addr, "/v2/keys?identity=pni"))
        .header("authorization", alice.authorization())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Fetch by PNI service id returns the PNI flavor with its registration id.
    let bundle: serde_json::Value = client
        .get(http_url(addr, &format!("/v2/keys/PNI:{}/1", alice.pni)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        bundle["devices"][0]["registrationId"],
        alice.pni_registration_id
    );
    assert_eq!(bundle["devices"][0]["preKey"]["keyId"], 11);

    // The ACI flavor is untouched.
    let counts: serde_json::Value = client
        .get(http_url(addr, "/v2/keys?identity=aci"))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts["count"], 0);
}
