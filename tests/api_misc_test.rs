//! Registration over REST, attachments, certificates, archives, call links.

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use common::*;
use libsignal_protocol::{KeyPair, SenderCertificate};
use rand::rngs::OsRng;
use rand::RngCore;

fn randomness() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[tokio::test]
async fn test_registration_over_rest() {
    let (_server, addr) = start_server().await;
    let client = reqwest::Client::new();
    let identity = KeyPair::generate(&mut OsRng);

    let body = serde_json::json!({
        "number": "+12025551234",
        "accountAttributes": {
            "registrationId": 1000,
            "pniRegistrationId": 1001,
            "fetchesMessages": true,
        },
        "aciIdentityKey": BASE64.encode(identity.public_key.serialize()),
        "aciSignedPreKey": signed_prekey_json(&identity, 5),
    });
    let response = client
        .put(http_url(addr, "/v1/registration"))
        .header("authorization", basic_auth("+12025551234", "reg-password"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let registered: serde_json::Value = response.json().await.unwrap();
    let aci = registered["uuid"].as_str().unwrap().to_string();
    assert_eq!(registered["number"], "+12025551234");
    assert!(registered["pni"].as_str().is_some());

    // Same number, wrong password: 409.
    let response = client
        .put(http_url(addr, "/v1/registration"))
        .header("authorization", basic_auth("+12025551234", "other-password"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // The registered device authenticates and lists itself.
    let devices: serde_json::Value = client
        .get(http_url(addr, "/v1/devices"))
        .header(
            "authorization",
            basic_auth(&format!("{}.1", aci), "reg-password"),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(devices["devices"].as_array().unwrap().len(), 1);
    assert_eq!(devices["devices"][0]["id"], 1);
    assert_eq!(devices["devices"][0]["registrationId"], 1000);
}

#[tokio::test]
async fn test_attachment_form_upload_download() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let form: serde_json::Value = client
        .post(http_url(addr, "/v3/attachments/form/upload"))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let key = form["key"].as_str().unwrap();
    let upload_location = form["signedUploadLocation"].as_str().unwrap();
    assert_eq!(key.len(), 32);

    let blob = vec![0xabu8; 1024];
    let response = client
        .put(http_url(addr, upload_location))
        .body(blob.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(http_url(addr, &format!("/attachments/{}", key)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), blob.as_slice());

    // Unknown CDN keys 404; uploads without an issued form 404.
    let response = client
        .get(http_url(addr, "/attachments/ffffffffffffffffffffffffffffffff"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let response = client
        .put(http_url(addr, "/attachments/upload/deadbeefdeadbeefdeadbeefdeadbeef"))
        .body(vec![1u8])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_sender_certificate_binds_device() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(http_url(addr, "/v1/certificate/delivery"))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let certificate = BASE64
        .decode(body["certificate"].as_str().unwrap())
        .unwrap();

    let certificate = SenderCertificate::deserialize(&certificate).unwrap();
    assert_eq!(
        certificate.sender_uuid().unwrap(),
        alice.aci.to_string().as_str()
    );
    assert_eq!(certificate.sender_e164().unwrap(), Some(alice.e164.as_str()));
    assert_eq!(
        u32::from(certificate.sender_device_id().unwrap()),
        alice.device_id
    );
}

#[tokio::test]
async fn test_backup_credentials_and_zk_auth() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let backup_key = [0x42u8; 32];
    let request_context =
        zkgroup::backups::BackupAuthCredentialRequestContext::new(&backup_key, &alice.aci);
    let request = zkgroup::serialize(&request_context.get_request());

    // Bind the credential requests.
    let response = client
        .put(http_url(addr, "/v1/archives/backupid"))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({
            "messagesBackupAuthCredentialRequest": BASE64.encode(&request),
            "mediaBackupAuthCredentialRequest": BASE64.encode(&request),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Fetch one day of credentials.
    let today = {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        now - now % 86_400
    };
    let body: serde_json::Value = client
        .get(http_url(
            addr,
            &format!(
                "/v1/archives/auth?redemptionStartSeconds={}&redemptionEndSeconds={}",
                today, today
            ),
        ))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let credential_b64 = body["messagesCredentials"][0]["credential"]
        .as_str()
        .unwrap();

    // Client side: receive the credential and build a presentation.
    let blinded = zkgroup::deserialize(&BASE64.decode(credential_b64).unwrap()).unwrap();
    let backup_params = server.state().config.zk_params.backup_public();
    let credential = request_context
        .receive(
            blinded,
            &backup_params,
            zkgroup::backups::BackupLevel::Messages,
        )
        .expect("credential should be valid");
    let presentation = credential.present(&backup_params, randomness());
    let presentation_bytes = zkgroup::serialize(&presentation);

    // Bind the backup public key; the signature must verify under it.
    let backup_signing = KeyPair::generate(&mut OsRng);
    let signature = backup_signing
        .private_key
        .calculate_signature(&presentation_bytes, &mut OsRng)
        .unwrap();
    let response = client
        .put(http_url(addr, "/v1/archives/keys"))
        .header("x-signal-zk-auth", BASE64.encode(&presentation_bytes))
        .header("x-signal-zk-auth-signature", BASE64.encode(&signature))
        .json(&serde_json::json!({
            "backupIdPublicKey": BASE64.encode(backup_signing.public_key.serialize()),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Authenticated backup info with the same presentation + signature.
    let response = client
        .get(http_url(addr, "/v1/archives"))
        .header("x-signal-zk-auth", BASE64.encode(&presentation_bytes))
        .header("x-signal-zk-auth-signature", BASE64.encode(&signature))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let info: serde_json::Value = response.json().await.unwrap();
    assert_eq!(info["usedSpace"], 0);

    // A signature by some other key is rejected.
    let rogue = KeyPair::generate(&mut OsRng);
    let bad_signature = rogue
        .private_key
        .calculate_signature(&presentation_bytes, &mut OsRng)
        .unwrap();
    let response = client
        .get(http_url(addr, "/v1/archives"))
        .header("x-signal-zk-auth", BASE64.encode(&presentation_bytes))
        .header("x-signal-zk-auth-signature", BASE64.encode(&bad_signature))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_call_link_lifecycle() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    // Credential issuance for link creation.
    let room_id = [0x17u8; 32];
    let context = zkgroup::call_links::CreateCallLinkCredentialRequestContext::new(
        &room_id,
        randomness(),
    );
    let request = zkgroup::serialize(&context.get_request());
    let body: serde_json::Value = client
        .post(http_url(addr, "/v1/call-link/create-auth"))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({
            "createCallLinkCredentialRequest": BASE64.encode(&request),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["credential"].as_str().is_some());
    assert_eq!(body["redemptionTime"].as_u64().unwrap() % 86_400, 0);

    // Store, fetch, revoke.
    let room_b64 = BASE64_URL.encode(room_id);
    let response = client
        .put(http_url(addr, &format!("/v1/call-link/{}", room_b64)))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({
            "rootKey": BASE64.encode([0x01u8; 16]),
            "adminPasskey": BASE64.encode([0x02u8; 32]),
            "name": "standup",
            "restrictions": "adminApproval",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let link: serde_json::Value = client
        .get(http_url(addr, &format!("/v1/call-link/{}", room_b64)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(link["name"], "standup");
    assert_eq!(link["restrictions"], "adminApproval");
    assert_eq!(link["revoked"], false);

    let response = client
        .delete(http_url(addr, &format!("/v1/call-link/{}", room_b64)))
        .header("authorization", alice.authorization())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let link: serde_json::Value = client
        .get(http_url(addr, &format!("/v1/call-link/{}", room_b64)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(link["revoked"], true);
}

#[tokio::test]
async fn test_profile_write_and_fetch() {
    let (server, addr) = start_server().await;
    let alice = create_primary(&server, "Alice");
    let client = reqwest::Client::new();

    let profile_key = zkgroup::profiles::ProfileKey::generate(randomness());
    let commitment = profile_key.get_commitment(alice.aci.into());

    let response = client
        .put(http_url(addr, "/v1/profile"))
        .header("authorization", alice.authorization())
        .json(&serde_json::json!({
            "version": "v-1",
            "name": BASE64.encode(b"name ciphertext"),
            "commitment": BASE64.encode(zkgroup::serialize(&commitment)),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let profile: serde_json::Value = client
        .get(http_url(addr, &format!("/v1/profile/{}", alice.aci)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        profile["identityKey"].as_str().unwrap(),
        BASE64.encode(alice.aci_identity.public_key.serialize())
    );
    assert_eq!(
        profile["name"].as_str().unwrap(),
        BASE64.encode(b"name ciphertext")
    );

    // Profile key credential issuance against the stored commitment.
    let server_public = server.state().config.zk_params.server_public();
    let context = server_public.create_profile_key_credential_request_context(
        randomness(),
        alice.aci.into(),
        profile_key,
    );
    let request = zkgroup::serialize(&context.get_request());
    let body: serde_json::Value = client
        .get(http_url(
            addr,
            &format!(
                "/v1/profile/{}/v-1/{}?credentialType=expiringProfileKey",
                alice.aci,
                hex::encode(&request)
            ),
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let response = zkgroup::deserialize(
        &BASE64.decode(body["credential"].as_str().unwrap()).unwrap(),
    )
    .unwrap();

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    server_public
        .receive_expiring_profile_key_credential(
            &context,
            &response,
            zkgroup::Timestamp::from_epoch_seconds(now),
        )
        .expect("credential should be valid");
}
