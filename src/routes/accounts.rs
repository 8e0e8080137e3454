//! Account Routes
//!
//! PUT    /v1/registration                       — register an account + primary device
//! GET    /v1/devices                            — list the account's devices
//! PUT    /v1/devices/:code                      — register a linked device
//! PUT    /v1/accounts/attributes                — update device-visible attributes
//! PUT    /v1/accounts/username_hash/reserve     — soft-reserve a username hash
//! PUT    /v1/accounts/username_hash/confirm     — confirm with a zk proof
//! DELETE /v1/accounts/username_hash             — clear the username
//! GET    /v1/accounts/username_hash/:hash       — hash -> ACI lookup
//! PUT    /v1/accounts/username_link             — store the encrypted username link
//! GET    /v1/accounts/username_link/:handle     — fetch an encrypted username link

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::UploadedSignedPreKey;
use crate::auth::DeviceAuth;
use crate::error::{ServerError, ServerResult};
use crate::state::{LinkAttributes, RegistrationRequest, ServerState};

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/registration", put(register))
        .route("/v1/devices", get(list_devices))
        .route("/v1/devices/:code", put(link_device))
        .route("/v1/accounts/attributes", put(set_attributes))
        .route("/v1/accounts/username_hash/reserve", put(reserve_username))
        .route("/v1/accounts/username_hash/confirm", put(confirm_username))
        .route("/v1/accounts/username_hash", delete(delete_username))
        .route("/v1/accounts/username_hash/:hash", get(lookup_username))
        .route("/v1/accounts/username_link", put(put_username_link))
        .route("/v1/accounts/username_link/:handle", get(get_username_link))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountAttributes {
    registration_id: u32,
    pni_registration_id: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_true")]
    fetches_messages: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationBody {
    #[serde(default)]
    number: Option<String>,
    account_attributes: AccountAttributes,
    #[serde(default)]
    aci_identity_key: Option<String>,
    #[serde(default)]
    pni_identity_key: Option<String>,
    #[serde(default)]
    aci_signed_pre_key: Option<UploadedSignedPreKey>,
    #[serde(default)]
    pni_signed_pre_key: Option<UploadedSignedPreKey>,
    #[serde(default)]
    aci_pq_last_resort_pre_key: Option<UploadedSignedPreKey>,
    #[serde(default)]
    pni_pq_last_resort_pre_key: Option<UploadedSignedPreKey>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    uuid: Uuid,
    pni: Uuid,
    number: String,
    storage_capable: bool,
}

/// Registration authenticates like Basic: the username is the claimed E164 and
/// the password becomes the primary device's credential.
fn basic_credentials(headers: &HeaderMap) -> ServerResult<(String, String)> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(ServerError::Unauthorized)?;
    let decoded = BASE64
        .decode(encoded)
        .map_err(|_| ServerError::Unauthorized)?;
    let decoded = String::from_utf8(decoded).map_err(|_| ServerError::Unauthorized)?;
    let (user, password) = decoded.split_once(':').ok_or(ServerError::Unauthorized)?;
    Ok((user.to_string(), password.to_string()))
}

fn decode_b64_field(field: &str, value: &str) -> ServerResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| ServerError::Protocol(format!("{}: {}", field, e)))
}

async fn register(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<RegistrationBody>,
) -> ServerResult<Json<RegistrationResponse>> {
    let (user, password) = basic_credentials(&headers)?;
    let e164 = body.number.clone().or(Some(user)).filter(|n| n.starts_with('+'));

    let request = RegistrationRequest {
        e164,
        password,
        registration_id: body.account_attributes.registration_id,
        pni_registration_id: body.account_attributes.pni_registration_id,
        fetches_messages: body.account_attributes.fetches_messages,
        name: body.account_attributes.name,
        aci_identity_key: body
            .aci_identity_key
            .as_deref()
            .map(|v| decode_b64_field("aciIdentityKey", v))
            .transpose()?,
        pni_identity_key: body
            .pni_identity_key
            .as_deref()
            .map(|v| decode_b64_field("pniIdentityKey", v))
            .transpose()?,
        aci_signed_pre_key: body.aci_signed_pre_key.map(|k| k.decode()).transpose()?,
        pni_signed_pre_key: body.pni_signed_pre_key.map(|k| k.decode()).transpose()?,
        aci_pq_last_resort_pre_key: body
            .aci_pq_last_resort_pre_key
            .map(|k| k.decode())
            .transpose()?,
        pni_pq_last_resort_pre_key: body
            .pni_pq_last_resort_pre_key
            .map(|k| k.decode())
            .transpose()?,
        profile_key: None,
    };

    let registered = state.register_account(request)?;
    Ok(Json(RegistrationResponse {
        uuid: registered.aci,
        pni: registered.pni,
        number: registered.e164,
        storage_capable: true,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkDeviceBody {
    account_attributes: AccountAttributes,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkDeviceResponse {
    uuid: Uuid,
    pni: Uuid,
    device_id: u32,
}

async fn link_device(
    State(state): State<Arc<ServerState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(body): Json<LinkDeviceBody>,
) -> ServerResult<Json<LinkDeviceResponse>> {
    let (_user, password) = basic_credentials(&headers)?;

    let registered = state.link_device(
        &code,
        LinkAttributes {
            password,
            registration_id: body.account_attributes.registration_id,
            pni_registration_id: body.account_attributes.pni_registration_id,
            name: body.account_attributes.name,
            fetches_messages: body.account_attributes.fetches_messages,
        },
    )?;

    Ok(Json(LinkDeviceResponse {
        uuid: registered.aci,
        pni: registered.pni,
        device_id: registered.device_id,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceInfo {
    id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    created: u64,
    registration_id: u32,
}

#[derive(Serialize)]
struct DeviceList {
    devices: Vec<DeviceInfo>,
}

async fn list_devices(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
) -> Json<DeviceList> {
    let devices = state
        .devices(&auth)
        .into_iter()
        .map(|(id, name, created, registration_id)| DeviceInfo {
            id,
            name,
            created,
            registration_id,
        })
        .collect();
    Json(DeviceList { devices })
}

async fn set_attributes(
    State(_state): State<Arc<ServerState>>,
    DeviceAuth(_auth): DeviceAuth,
    Json(_body): Json<serde_json::Value>,
) -> ServerResult<()> {
    // Accepted for wire compatibility; registration ids are fixed at
    // registration time in this mock.
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveUsernameBody {
    username_hashes: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReserveUsernameResponse {
    username_hash: String,
}

async fn reserve_username(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Json(body): Json<ReserveUsernameBody>,
) -> ServerResult<Json<ReserveUsernameResponse>> {
    let hashes = body
        .username_hashes
        .iter()
        .map(|h| {
            BASE64_URL
                .decode(h)
                .map_err(|e| ServerError::Protocol(format!("usernameHashes: {}", e)))
        })
        .collect::<ServerResult<Vec<_>>>()?;

    let chosen = state.reserve_username(&auth, &hashes)?;
    Ok(Json(ReserveUsernameResponse {
        username_hash: BASE64_URL.encode(chosen),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmUsernameBody {
    username_hash: String,
    zk_proof: String,
}

async fn confirm_username(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Json(body): Json<ConfirmUsernameBody>,
) -> ServerResult<()> {
    let hash = BASE64_URL
        .decode(&body.username_hash)
        .map_err(|e| ServerError::Protocol(format!("usernameHash: {}", e)))?;
    let proof = BASE64_URL
        .decode(&body.zk_proof)
        .map_err(|e| ServerError::Protocol(format!("zkProof: {}", e)))?;
    state.confirm_username(&auth, &hash, &proof)
}

async fn delete_username(State(state): State<Arc<ServerState>>, DeviceAuth(auth): DeviceAuth) {
    state.delete_username(&auth);
}

#[derive(Serialize)]
struct UsernameLookupResponse {
    uuid: Uuid,
}

async fn lookup_username(
    State(state): State<Arc<ServerState>>,
    Path(hash): Path<String>,
) -> ServerResult<Json<UsernameLookupResponse>> {
    let hash = BASE64_URL
        .decode(&hash)
        .map_err(|e| ServerError::Protocol(format!("usernameHash: {}", e)))?;
    let uuid = state
        .lookup_username(&hash)
        .ok_or(ServerError::NotFound("username"))?;
    Ok(Json(UsernameLookupResponse { uuid }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsernameLinkBody {
    username_link_encrypted_value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsernameLinkResponse {
    username_link_handle: Uuid,
}

async fn put_username_link(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Json(body): Json<UsernameLinkBody>,
) -> ServerResult<Json<UsernameLinkResponse>> {
    let blob = BASE64_URL
        .decode(&body.username_link_encrypted_value)
        .map_err(|e| ServerError::Protocol(format!("usernameLinkEncryptedValue: {}", e)))?;
    let handle = state.put_username_link(&auth, blob)?;
    Ok(Json(UsernameLinkResponse {
        username_link_handle: handle,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsernameLinkValue {
    username_link_encrypted_value: String,
}

async fn get_username_link(
    State(state): State<Arc<ServerState>>,
    Path(handle): Path<Uuid>,
) -> ServerResult<Json<UsernameLinkValue>> {
    let blob = state
        .get_username_link(handle)
        .ok_or(ServerError::NotFound("username link"))?;
    Ok(Json(UsernameLinkValue {
        username_link_encrypted_value: BASE64_URL.encode(blob),
    }))
}
