//! Prekey Routes
//!
//! GET /v2/keys?identity=aci|pni                 — remaining one-time key counts
//! PUT /v2/keys?identity=aci|pni                 — upload key material
//! GET /v2/keys/:serviceId/:deviceId?pq=true     — fetch (and consume) bundles

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::account::{IdentityKind, UploadedPreKey, UploadedSignedPreKey};
use crate::auth::DeviceAuth;
use crate::error::ServerResult;
use crate::state::{KeyUpload, ServerState};

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v2/keys", get(key_counts).put(upload_keys))
        .route("/v2/keys/:service_id/:device_id", get(fetch_bundles))
}

#[derive(Deserialize)]
struct IdentityQuery {
    #[serde(default = "default_identity")]
    identity: String,
}

fn default_identity() -> String {
    "aci".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyCountResponse {
    count: usize,
    pq_count: usize,
}

async fn key_counts(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Query(query): Query<IdentityQuery>,
) -> ServerResult<Json<KeyCountResponse>> {
    let kind: IdentityKind = query.identity.parse()?;
    let (count, pq_count) = state.prekey_counts(&auth, kind)?;
    Ok(Json(KeyCountResponse { count, pq_count }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetKeysRequest {
    #[serde(default)]
    identity_key: Option<String>,
    #[serde(default)]
    pre_keys: Vec<UploadedPreKey>,
    #[serde(default)]
    signed_pre_key: Option<UploadedSignedPreKey>,
    #[serde(default)]
    pq_pre_keys: Vec<UploadedSignedPreKey>,
    #[serde(default)]
    pq_last_resort_pre_key: Option<UploadedSignedPreKey>,
}

async fn upload_keys(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Query(query): Query<IdentityQuery>,
    Json(body): Json<SetKeysRequest>,
) -> ServerResult<()> {
    let kind: IdentityKind = query.identity.parse()?;

    let upload = KeyUpload {
        identity_key: body
            .identity_key
            .as_deref()
            .map(|v| {
                BASE64.decode(v).map_err(|e| {
                    crate::error::ServerError::Protocol(format!("identityKey: {}", e))
                })
            })
            .transpose()?,
        signed_pre_key: body.signed_pre_key.map(|k| k.decode()).transpose()?,
        pq_last_resort_pre_key: body
            .pq_last_resort_pre_key
            .map(|k| k.decode())
            .transpose()?,
        pre_keys: body
            .pre_keys
            .iter()
            .map(|k| k.decode())
            .collect::<ServerResult<Vec<_>>>()?,
        pq_pre_keys: body
            .pq_pre_keys
            .iter()
            .map(|k| k.decode())
            .collect::<ServerResult<Vec<_>>>()?,
    };

    state.update_device_keys(&auth, kind, upload)
}

#[derive(Deserialize)]
struct BundleQuery {
    #[serde(default)]
    pq: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceBundle {
    device_id: u32,
    registration_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_key: Option<UploadedPreKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signed_pre_key: Option<UploadedSignedPreKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pq_pre_key: Option<UploadedSignedPreKey>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleResponse {
    identity_key: String,
    devices: Vec<DeviceBundle>,
}

async fn fetch_bundles(
    State(state): State<Arc<ServerState>>,
    Path((service_id, device_id)): Path<(String, String)>,
    Query(query): Query<BundleQuery>,
) -> ServerResult<Json<BundleResponse>> {
    let bundles = state.prekey_bundles(&service_id, &device_id, query.pq)?;

    Ok(Json(BundleResponse {
        identity_key: BASE64.encode(&bundles.identity_key),
        devices: bundles
            .devices
            .into_iter()
            .map(|d| DeviceBundle {
                device_id: d.device_id,
                registration_id: d.registration_id,
                pre_key: d.pre_key.as_ref().map(UploadedPreKey::encode),
                signed_pre_key: d.signed_pre_key.as_ref().map(UploadedSignedPreKey::encode),
                pq_pre_key: d.pq_pre_key.as_ref().map(UploadedSignedPreKey::encode),
            })
            .collect(),
    }))
}
