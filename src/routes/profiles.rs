//! Profile Routes
//!
//! PUT /v1/profile                                         — write a versioned profile
//! GET /v1/profile/:serviceId                              — minimal profile fetch
//! GET /v1/profile/:aci/:version/:credentialRequest        — expiring profile key credential

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::{now_secs, VersionedProfile};
use crate::auth::DeviceAuth;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use crate::zkcred::day_aligned;

/// Profile key credentials expire after a week, day-aligned.
const CREDENTIAL_LIFETIME_SECS: u64 = 7 * 86_400;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/profile", put(set_profile))
        .route("/v1/profile/:service_id", get(get_profile))
        .route(
            "/v1/profile/:aci/:version/:credential_request",
            get(profile_key_credential),
        )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetProfileBody {
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    about: Option<String>,
    commitment: String,
}

async fn set_profile(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Json(body): Json<SetProfileBody>,
) -> ServerResult<()> {
    let decode = |field: &str, value: &str| {
        BASE64
            .decode(value)
            .map_err(|e| ServerError::Protocol(format!("{}: {}", field, e)))
    };
    let profile = VersionedProfile {
        version: body.version,
        name: body.name.as_deref().map(|v| decode("name", v)).transpose()?,
        about: body
            .about
            .as_deref()
            .map(|v| decode("about", v))
            .transpose()?,
        commitment: decode("commitment", &body.commitment)?,
    };
    state.set_profile(&auth, profile)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    identity_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    about: Option<String>,
    capabilities: serde_json::Value,
}

async fn get_profile(
    State(state): State<Arc<ServerState>>,
    Path(service_id): Path<String>,
) -> ServerResult<Json<ProfileResponse>> {
    let (identity_key, profile) = state.profile(&service_id)?;
    Ok(Json(ProfileResponse {
        identity_key: identity_key.map(|k| BASE64.encode(k)),
        name: profile
            .as_ref()
            .and_then(|p| p.name.as_ref())
            .map(|n| BASE64.encode(n)),
        about: profile
            .as_ref()
            .and_then(|p| p.about.as_ref())
            .map(|a| BASE64.encode(a)),
        capabilities: serde_json::json!({}),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialQuery {
    #[serde(default)]
    credential_type: Option<String>,
}

#[derive(Serialize)]
struct CredentialResponse {
    credential: String,
}

async fn profile_key_credential(
    State(state): State<Arc<ServerState>>,
    Path((aci, _version, credential_request)): Path<(Uuid, String, String)>,
    Query(query): Query<CredentialQuery>,
) -> ServerResult<Json<CredentialResponse>> {
    if let Some(credential_type) = &query.credential_type {
        if credential_type != "expiringProfileKey" {
            return Err(ServerError::Protocol(format!(
                "unknown credential type: {}",
                credential_type
            )));
        }
    }

    let request = hex::decode(&credential_request)
        .map_err(|e| ServerError::Protocol(format!("credentialRequest: {}", e)))?;
    let commitment = state.profile_commitment(aci)?;
    let expiration = day_aligned(now_secs()) + CREDENTIAL_LIFETIME_SECS;

    let credential = state.config.zk_params.issue_profile_key_credential(
        &request,
        aci.into(),
        &commitment,
        expiration,
        &mut OsRng,
    )?;
    Ok(Json(CredentialResponse {
        credential: BASE64.encode(credential),
    }))
}
