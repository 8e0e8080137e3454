//! Username hash reservation and confirmation.

mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use common::*;
use rand::RngCore;

fn username_material(name: &str) -> (Vec<u8>, Vec<u8>) {
    let username = usernames::Username::new(name).expect("valid username");
    let mut randomness = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut randomness);
    let proof = username.proof(&randomness).expect("proof");
    (username.hash().to_vec(), proof)
}

#[tokio::test]
async fn test_reserve_and_confirm_roundtrip_with_conflict() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let bob = create_primary(&server, "Bob");
    let client = reqwest::Client::new();
    let alice_auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);
    let bob_auth = basic_auth(&format!("{}.1", bob.aci), &bob.password);

    let (h1, p1) = username_material("bob.01");
    let (h2, p2) = username_material("alice.01");

    // Bob takes h1 first.
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/reserve"))
        .header("authorization", bob_auth.clone())
        .json(&serde_json::json!({ "usernameHashes": [BASE64_URL.encode(&h1)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    client
        .put(http_url(addr, "/v1/accounts/username_hash/confirm"))
        .header("authorization", bob_auth)
        .json(&serde_json::json!({
            "usernameHash": BASE64_URL.encode(&h1),
            "zkProof": BASE64_URL.encode(&p1),
        }))
        .send()
        .await
        .unwrap();

    // Alice offers [h1, h2]; the first free hash wins.
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/reserve"))
        .header("authorization", alice_auth.clone())
        .json(&serde_json::json!({
            "usernameHashes": [BASE64_URL.encode(&h1), BASE64_URL.encode(&h2)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["usernameHash"].as_str().unwrap(),
        BASE64_URL.encode(&h2)
    );

    // Confirm with the matching proof.
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/confirm"))
        .header("authorization", alice_auth.clone())
        .json(&serde_json::json!({
            "usernameHash": BASE64_URL.encode(&h2),
            "zkProof": BASE64_URL.encode(&p2),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The hash resolves to Alice.
    let body: serde_json::Value = client
        .get(http_url(
            addr,
            &format!("/v1/accounts/username_hash/{}", BASE64_URL.encode(&h2)),
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["uuid"].as_str().unwrap(), alice.aci.to_string());

    // A second confirm of the same hash conflicts.
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/confirm"))
        .header("authorization", alice_auth)
        .json(&serde_json::json!({
            "usernameHash": BASE64_URL.encode(&h2),
            "zkProof": BASE64_URL.encode(&p2),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_reserve_bounds() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();
    let auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);

    // Zero hashes.
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/reserve"))
        .header("authorization", auth.clone())
        .json(&serde_json::json!({ "usernameHashes": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // Twenty-one hashes.
    let hashes: Vec<String> = (0..21u8)
        .map(|i| BASE64_URL.encode([i; 32]))
        .collect();
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/reserve"))
        .header("authorization", auth.clone())
        .json(&serde_json::json!({ "usernameHashes": hashes }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // Twenty is accepted.
    let hashes: Vec<String> = (0..20u8)
        .map(|i| BASE64_URL.encode([i; 32]))
        .collect();
    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/reserve"))
        .header("authorization", auth)
        .json(&serde_json::json!({ "usernameHashes": hashes }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_confirm_rejects_bogus_proof() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();
    let auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);

    let (hash, _proof) = username_material("mallory.99");
    client
        .put(http_url(addr, "/v1/accounts/username_hash/reserve"))
        .header("authorization", auth.clone())
        .json(&serde_json::json!({ "usernameHashes": [BASE64_URL.encode(&hash)] }))
        .send()
        .await
        .unwrap();

    let response = client
        .put(http_url(addr, "/v1/accounts/username_hash/confirm"))
        .header("authorization", auth)
        .json(&serde_json::json!({
            "usernameHash": BASE64_URL.encode(&hash),
            "zkProof": BASE64_URL.encode([0u8; 128]),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_username_link_roundtrip() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();
    let auth = basic_auth(&format!("{}.1", alice.aci), &alice.password);

    let blob = vec![7u8; 48];
    let body: serde_json::Value = client
        .put(http_url(addr, "/v1/accounts/username_link"))
        .header("authorization", auth)
        .json(&serde_json::json!({
            "usernameLinkEncryptedValue": BASE64_URL.encode(&blob),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let handle = body["usernameLinkHandle"].as_str().unwrap();

    let body: serde_json::Value = client
        .get(http_url(
            addr,
            &format!("/v1/accounts/username_link/{}", handle),
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["usernameLinkEncryptedValue"].as_str().unwrap(),
        BASE64_URL.encode(&blob)
    );
}
