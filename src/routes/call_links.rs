//! Call Link Routes
//!
//! POST   /v1/call-link/create-auth — issue a create-call-link credential
//! GET    /v1/call-link/auth        — issue a call-link auth credential
//! PUT    /v1/call-link/:roomId     — create or update a call link
//! GET    /v1/call-link/:roomId     — fetch a call link
//! DELETE /v1/call-link/:roomId     — revoke a call link

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::account::now_secs;
use crate::auth::DeviceAuth;
use crate::error::{ServerError, ServerResult};
use crate::state::{CallLinkRecord, CallLinkRestrictions, ServerState};
use crate::zkcred::day_aligned;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/call-link/create-auth", post(create_auth))
        .route("/v1/call-link/auth", get(link_auth))
        .route(
            "/v1/call-link/:room_id",
            put(upsert_link).get(get_link).delete(delete_link),
        )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAuthBody {
    create_call_link_credential_request: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssuedCredential {
    redemption_time: u64,
    credential: String,
}

async fn create_auth(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Json(body): Json<CreateAuthBody>,
) -> ServerResult<Json<IssuedCredential>> {
    let request = BASE64
        .decode(&body.create_call_link_credential_request)
        .map_err(|e| {
            ServerError::Protocol(format!("createCallLinkCredentialRequest: {}", e))
        })?;
    let redemption_time = day_aligned(now_secs());
    let credential = state.config.zk_params.issue_create_call_link_credential(
        &request,
        auth.aci.into(),
        redemption_time,
        &mut OsRng,
    )?;
    Ok(Json(IssuedCredential {
        redemption_time,
        credential: BASE64.encode(credential),
    }))
}

async fn link_auth(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
) -> Json<IssuedCredential> {
    let redemption_time = day_aligned(now_secs());
    let credential = state.config.zk_params.issue_call_link_auth_credential(
        auth.aci.into(),
        redemption_time,
        &mut OsRng,
    );
    Json(IssuedCredential {
        redemption_time,
        credential: BASE64.encode(credential),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertCallLinkBody {
    root_key: String,
    admin_passkey: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    restrictions: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallLinkResponse {
    name: String,
    restrictions: String,
    revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration: Option<u64>,
}

fn restrictions_from(value: Option<&str>) -> ServerResult<CallLinkRestrictions> {
    match value {
        None | Some("none") => Ok(CallLinkRestrictions::None),
        Some("adminApproval") => Ok(CallLinkRestrictions::AdminApproval),
        Some(other) => Err(ServerError::Protocol(format!(
            "unknown restrictions: {}",
            other
        ))),
    }
}

fn restrictions_str(value: CallLinkRestrictions) -> &'static str {
    match value {
        CallLinkRestrictions::None => "none",
        CallLinkRestrictions::AdminApproval => "adminApproval",
    }
}

fn room_id_bytes(room_id: &str) -> ServerResult<Vec<u8>> {
    BASE64_URL
        .decode(room_id)
        .map_err(|e| ServerError::Protocol(format!("roomId: {}", e)))
}

async fn upsert_link(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(_auth): DeviceAuth,
    Path(room_id): Path<String>,
    Json(body): Json<UpsertCallLinkBody>,
) -> ServerResult<Json<CallLinkResponse>> {
    let root_key = BASE64
        .decode(&body.root_key)
        .map_err(|e| ServerError::Protocol(format!("rootKey: {}", e)))?;
    if root_key.len() != 16 {
        return Err(ServerError::Validation(format!(
            "rootKey must be 16 bytes, got {}",
            root_key.len()
        )));
    }
    let admin_passkey = BASE64
        .decode(&body.admin_passkey)
        .map_err(|e| ServerError::Protocol(format!("adminPasskey: {}", e)))?;
    let restrictions = restrictions_from(body.restrictions.as_deref())?;

    let record = CallLinkRecord {
        root_key,
        admin_passkey,
        name: body.name,
        restrictions,
        revoked: false,
        deleted_at: None,
    };
    state.upsert_call_link(room_id_bytes(&room_id)?, record.clone());

    Ok(Json(CallLinkResponse {
        name: record.name,
        restrictions: restrictions_str(record.restrictions).to_string(),
        revoked: false,
        expiration: None,
    }))
}

async fn get_link(
    State(state): State<Arc<ServerState>>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<CallLinkResponse>> {
    let record = state
        .call_link(&room_id_bytes(&room_id)?)
        .ok_or(ServerError::NotFound("call link"))?;
    Ok(Json(CallLinkResponse {
        name: record.name,
        restrictions: restrictions_str(record.restrictions).to_string(),
        revoked: record.revoked,
        expiration: record.deleted_at,
    }))
}

async fn delete_link(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(_auth): DeviceAuth,
    Path(room_id): Path<String>,
) -> ServerResult<()> {
    if state.delete_call_link(&room_id_bytes(&room_id)?) {
        Ok(())
    } else {
        Err(ServerError::NotFound("call link"))
    }
}
