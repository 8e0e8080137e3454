//! Credential Issuance Routes
//!
//! GET /v1/certificate/delivery    — sealed-sender sender certificate
//! GET /v1/certificate/auth/group  — day-aligned group + call link auth credentials

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::DeviceAuth;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use crate::zkcred::day_aligned;

const SECONDS_PER_DAY: u64 = 86_400;
const MAX_REDEMPTION_WINDOW_DAYS: u64 = 7;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/certificate/delivery", get(delivery_certificate))
        .route("/v1/certificate/auth/group", get(group_auth_credentials))
}

#[derive(Serialize)]
struct DeliveryCertificateResponse {
    certificate: String,
}

async fn delivery_certificate(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
) -> ServerResult<Json<DeliveryCertificateResponse>> {
    let certificate = state.sender_certificate(&auth)?;
    Ok(Json(DeliveryCertificateResponse {
        certificate: BASE64.encode(certificate),
    }))
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
struct GroupCredentialsResponse {
    credentials: Vec<IssuedCredential>,
    call_link_auth_credentials: Vec<IssuedCredential>,
    pni: Uuid,
}

async fn group_auth_credentials(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Query(window): Query<RedemptionWindow>,
) -> ServerResult<Json<GroupCredentialsResponse>> {
    let start = window.redemption_start_seconds;
    let end = window.redemption_end_seconds;
    if start != day_aligned(start) || end != day_aligned(end) {
        return Err(ServerError::Protocol(
            "redemption window must be day-aligned".into(),
        ));
    }
    if start > end || end - start > MAX_REDEMPTION_WINDOW_DAYS * SECONDS_PER_DAY {
        return Err(ServerError::Protocol("redemption window invalid".into()));
    }

    let mut rng = OsRng;
    let zk = &state.config.zk_params;
    let mut credentials = Vec::new();
    let mut call_link_auth_credentials = Vec::new();
    let mut day = start;
    while day <= end {
        credentials.push(IssuedCredential {
            credential: BASE64.encode(zk.issue_group_auth_credential(
                auth.aci.into(),
                auth.pni.into(),
                day,
                &mut rng,
            )),
            redemption_time: day,
        });
        call_link_auth_credentials.push(IssuedCredential {
            credential: BASE64.encode(zk.issue_call_link_auth_credential(
                auth.aci.into(),
                day,
                &mut rng,
            )),
            redemption_time: day,
        });
        day += SECONDS_PER_DAY;
    }

    Ok(Json(GroupCredentialsResponse {
        credentials,
        call_link_auth_credentials,
        pni: auth.pni,
    }))
}
