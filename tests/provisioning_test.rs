//! Device linking: the provisioning handoff, code redemption, key upload.

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::*;
use libsignal_protocol::{KeyPair, PrivateKey, PublicKey};
use prost::Message as ProstMessage;
use rand::rngs::OsRng;

use signal_mock_server::crypto;
use signal_mock_server::proto::provisioning::{ProvisionEnvelope, ProvisionMessage};
use signal_mock_server::provisioning::PendingProvisionResponse;

/// Drives the linking client side: fetch the envelope, decrypt it, redeem the
/// code, upload keys. Returns (device id, account uuid).
async fn run_linking_client(
    addr: std::net::SocketAddr,
    provisioning_uuid: String,
    ephemeral: KeyPair,
) -> (u32, String) {
    let client = reqwest::Client::new();

    let response = client
        .get(http_url(
            addr,
            &format!("/v1/devices/provisioning/{}", provisioning_uuid),
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let envelope =
        ProvisionEnvelope::decode(response.bytes().await.unwrap().as_ref()).unwrap();

    let server_ephemeral =
        PublicKey::deserialize(envelope.public_key.as_deref().unwrap()).unwrap();
    let plaintext = crypto::decrypt_provision_message(
        envelope.body.as_deref().unwrap(),
        &server_ephemeral,
        &ephemeral.private_key,
    )
    .unwrap();
    let message = ProvisionMessage::decode(plaintext.as_slice()).unwrap();

    let code = message.provisioning_code.clone().unwrap();
    let number = message.number.clone().unwrap();
    let identity_public = message.aci_identity_key_public.clone().unwrap();
    let identity_private =
        PrivateKey::deserialize(message.aci_identity_key_private.as_deref().unwrap()).unwrap();

    // Redeem the provisioning code as a new device.
    let password = "linked-device-password";
    let response = client
        .put(http_url(addr, &format!("/v1/devices/{}", code)))
        .header("authorization", basic_auth(&number, password))
        .json(&serde_json::json!({
            "accountAttributes": {
                "registrationId": 4711,
                "pniRegistrationId": 4712,
                "fetchesMessages": true,
            },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let device_id = body["deviceId"].as_u64().unwrap() as u32;
    let account_uuid = body["uuid"].as_str().unwrap().to_string();

    // Upload keys; this is what completes the pending link.
    let prekey = KeyPair::generate(&mut OsRng);
    let public = prekey.public_key.serialize();
    let signature = identity_private
        .calculate_signature(&public, &mut OsRng)
        .unwrap();
    let response = client
        .put(http_url(addr, "/v2/keys?identity=aci"))
        .header(
            "authorization",
            basic_auth(&format!("{}.{}", account_uuid, device_id), password),
        )
        .json(&serde_json::json!({
            "identityKey": BASE64.encode(&identity_public),
            "signedPreKey": {
                "keyId": 1,
                "publicKey": BASE64.encode(&public),
                "signature": BASE64.encode(&signature),
            },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    (device_id, account_uuid)
}

#[tokio::test]
async fn test_link_secondary_device() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");

    let provisioning_uuid = uuid::Uuid::new_v4().to_string();
    let ephemeral = KeyPair::generate(&mut OsRng);
    let client_task = tokio::spawn(run_linking_client(
        addr,
        provisioning_uuid.clone(),
        ephemeral,
    ));

    // The harness observes the advertised attempt and supplies the URL the
    // linking client displayed.
    let pending = server.wait_for_provision().await.unwrap();
    assert_eq!(pending.uuid, provisioning_uuid);

    let provision_url = url::Url::parse_with_params(
        "sgnl://linkdevice",
        &[
            ("uuid", provisioning_uuid.as_str()),
            (
                "pub_key",
                BASE64.encode(ephemeral.public_key.serialize()).as_str(),
            ),
        ],
    )
    .unwrap()
    .to_string();

    // complete() resolves only after the secondary has uploaded its keys.
    let linked = pending
        .complete(PendingProvisionResponse {
            provision_url,
            primary: alice.secrets(),
        })
        .await
        .unwrap();

    assert_eq!(linked.aci, alice.aci);
    assert_eq!(linked.device_id, 2);
    assert_eq!(linked.registration_id, 4711);

    let (client_device_id, client_uuid) = client_task.await.unwrap();
    assert_eq!(client_device_id, 2);
    assert_eq!(client_uuid, alice.aci.to_string());

    // The account now serves bundles for the new device under the shared
    // identity key.
    let bundles = server
        .state()
        .prekey_bundles(&alice.aci.to_string(), "2", false)
        .unwrap();
    assert_eq!(
        bundles.identity_key,
        alice.aci_identity.public_key.serialize().into_vec()
    );
}

#[tokio::test]
async fn test_provisioning_code_is_single_use() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    // The primary can mint a code directly over the real-wire endpoint.
    let body: serde_json::Value = client
        .get(http_url(addr, "/v1/devices/provisioning/code"))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let code = body["verificationCode"].as_str().unwrap().to_string();

    let attributes = serde_json::json!({
        "accountAttributes": {
            "registrationId": 100,
            "pniRegistrationId": 101,
        },
    });
    let response = client
        .put(http_url(addr, &format!("/v1/devices/{}", code)))
        .header("authorization", basic_auth(&alice.e164, "pw-1"))
        .json(&attributes)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The code was consumed.
    let response = client
        .put(http_url(addr, &format!("/v1/devices/{}", code)))
        .header("authorization", basic_auth(&alice.e164, "pw-2"))
        .json(&attributes)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_provisioning_socket_relays_envelope() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    // The linking client opens the unauthenticated provisioning socket and is
    // assigned an address uuid.
    let url = format!("ws://{}/v1/websocket/provisioning/", addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let address = next_server_request(&mut socket).await;
    assert_eq!(address.verb.as_deref(), Some("PUT"));
    assert_eq!(address.path.as_deref(), Some("/v1/address"));
    let advertised = signal_mock_server::proto::provisioning::ProvisioningUuid::decode(
        address.body.as_deref().unwrap(),
    )
    .unwrap();
    let destination = advertised.uuid.unwrap();

    // The primary posts a sealed envelope to that address.
    let envelope_bytes = vec![1u8, 2, 3, 4];
    let response = client
        .put(http_url(addr, &format!("/v1/provisioning/{}", destination)))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({ "body": BASE64.encode(&envelope_bytes) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // It arrives over the socket as PUT /v1/message.
    let message = next_server_request(&mut socket).await;
    assert_eq!(message.path.as_deref(), Some("/v1/message"));
    assert_eq!(message.body.as_deref(), Some(envelope_bytes.as_slice()));

    // Posting to an unknown address is a 404.
    let response = client
        .put(http_url(addr, "/v1/provisioning/unknown-address"))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({ "body": BASE64.encode([9u8]) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
