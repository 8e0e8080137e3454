//! Backup Archive Routes
//!
//! PUT /v1/archives/backupid — bind backup credential requests (Basic auth)
//! GET /v1/archives/auth     — issue day-aligned backup auth credentials
//! PUT /v1/archives/keys     — bind the backup-id public key (zk auth)
//! GET /v1/archives          — backup info (zk auth + signature check)

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use libsignal_protocol::PublicKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::account::BackupCredentialRequests;
use crate::auth::{BackupZkAuth, DeviceAuth};
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use crate::zkcred::day_aligned;

const SECONDS_PER_DAY: u64 = 86_400;
const MAX_REDEMPTION_WINDOW_DAYS: u64 = 7;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/archives/backupid", put(set_backup_id))
        .route("/v1/archives/auth", get(backup_auth_credentials))
        .route("/v1/archives/keys", put(set_backup_key))
        .route("/v1/archives", get(backup_info))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBackupIdBody {
    messages_backup_auth_credential_request: String,
    media_backup_auth_credential_request: String,
}

async fn set_backup_id(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Json(body): Json<SetBackupIdBody>,
) -> ServerResult<()> {
    let decode = |field: &str, value: &str| {
        BASE64
            .decode(value)
            .map_err(|e| ServerError::Protocol(format!("{}: {}", field, e)))
    };
    state.set_backup_credential_requests(
        &auth,
        BackupCredentialRequests {
            messages: decode(
                "messagesBackupAuthCredentialRequest",
                &body.messages_backup_auth_credential_request,
            )?,
            media: decode(
                "mediaBackupAuthCredentialRequest",
                &body.media_backup_auth_credential_request,
            )?,
        },
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedemptionWindow {
    redemption_start_seconds: u64,
    redemption_end_seconds: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssuedCredential {
    credential: String,
    redemption_time: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupCredentialsResponse {
    messages_credentials: Vec<IssuedCredential>,
    media_credentials: Vec<IssuedCredential>,
}

async fn backup_auth_credentials(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Query(window): Query<RedemptionWindow>,
) -> ServerResult<Json<BackupCredentialsResponse>> {
    let start = window.redemption_start_seconds;
    let end = window.redemption_end_seconds;
    if start != day_aligned(start)
        || end != day_aligned(end)
        || start > end
        || end - start > MAX_REDEMPTION_WINDOW_DAYS * SECONDS_PER_DAY
    {
        return Err(ServerError::Protocol("redemption window invalid".into()));
    }

    let requests = state.backup_credential_requests(&auth)?;
    let zk = &state.config.zk_params;
    let mut rng = OsRng;

    let mut messages_credentials = Vec::new();
    let mut media_credentials = Vec::new();
    let mut day = start;
    while day <= end {
        messages_credentials.push(IssuedCredential {
            credential: BASE64.encode(zk.issue_backup_auth_credential(
                &requests.messages,
                day,
                &mut rng,
            )?),
            redemption_time: day,
        });
        media_credentials.push(IssuedCredential {
            credential: BASE64.encode(zk.issue_backup_auth_credential(
                &requests.media,
                day,
                &mut rng,
            )?),
            redemption_time: day,
        });
        day += SECONDS_PER_DAY;
    }

    Ok(Json(BackupCredentialsResponse {
        messages_credentials,
        media_credentials,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBackupKeyBody {
    backup_id_public_key: String,
}

/// The signature bootstraps trust: it must verify under the key being bound.
async fn set_backup_key(
    State(state): State<Arc<ServerState>>,
    auth: BackupZkAuth,
    Json(body): Json<SetBackupKeyBody>,
) -> ServerResult<()> {
    let key_bytes = BASE64
        .decode(&body.backup_id_public_key)
        .map_err(|e| ServerError::Protocol(format!("backupIdPublicKey: {}", e)))?;
    let public_key = PublicKey::deserialize(&key_bytes)
        .map_err(|_| ServerError::Protocol("backupIdPublicKey unparseable".into()))?;

    if !public_key.verify_signature(&auth.presentation_bytes, &auth.signature)? {
        return Err(ServerError::Unauthorized);
    }

    state.set_backup_key(auth.presentation.backup_id().to_vec(), key_bytes);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupInfoResponse {
    cdn: u32,
    backup_dir: String,
    media_dir: String,
    backup_name: String,
    used_space: u64,
}

async fn backup_info(
    State(state): State<Arc<ServerState>>,
    auth: BackupZkAuth,
) -> ServerResult<Json<BackupInfoResponse>> {
    let backup_id = auth.presentation.backup_id().to_vec();
    let key_bytes = state
        .backup_key(&backup_id)
        .ok_or(ServerError::NotFound("backup"))?;
    let public_key = PublicKey::deserialize(&key_bytes)
        .map_err(|_| ServerError::Internal("stored backup key unparseable".into()))?;
    if !public_key.verify_signature(&auth.presentation_bytes, &auth.signature)? {
        return Err(ServerError::Unauthorized);
    }

    let backup_dir = hex::encode(&backup_id);
    Ok(Json(BackupInfoResponse {
        cdn: 3,
        media_dir: format!("{}/media", backup_dir),
        backup_dir,
        backup_name: "signal-backup".to_string(),
        used_space: 0,
    }))
}
