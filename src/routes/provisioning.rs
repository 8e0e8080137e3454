//! Provisioning Routes
//!
//! GET /v1/devices/provisioning/:uuid  — test-driven linking handoff; returns
//!                                       the encrypted ProvisionEnvelope once
//!                                       the harness supplies the URL
//! GET /v1/devices/provisioning/code   — mint a provisioning code directly
//! PUT /v1/provisioning/:destination   — forward an envelope to a live
//!                                       provisioning socket

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use libsignal_protocol::PublicKey;
use prost::Message;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::auth::DeviceAuth;
use crate::crypto;
use crate::error::{ServerError, ServerResult};
use crate::proto::provisioning::{ProvisionEnvelope, ProvisionMessage, ProvisioningVersion};
use crate::provisioning::PendingProvisionResponse;
use crate::routes::PROTOBUF_CONTENT_TYPE;
use crate::state::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/devices/provisioning/code", get(provisioning_code))
        .route("/v1/devices/provisioning/:uuid", get(provisioning_handoff))
        .route("/v1/provisioning/:destination", put(forward_envelope))
}

/// Builds and seals the provision message for an ephemeral client key.
pub fn seal_provision_message(
    response: &PendingProvisionResponse,
    provisioning_code: &str,
    client_public: &PublicKey,
) -> ServerResult<ProvisionEnvelope> {
    let primary = &response.primary;
    let message = ProvisionMessage {
        aci_identity_key_public: Some(primary.aci_identity.0.clone()),
        aci_identity_key_private: Some(primary.aci_identity.1.clone()),
        pni_identity_key_public: Some(primary.pni_identity.0.clone()),
        pni_identity_key_private: Some(primary.pni_identity.1.clone()),
        number: Some(primary.e164.clone()),
        provisioning_code: Some(provisioning_code.to_string()),
        user_agent: Some("signal-mock-server".to_string()),
        profile_key: Some(primary.profile_key.clone()),
        read_receipts: Some(true),
        aci: Some(primary.aci.to_string()),
        provisioning_version: Some(ProvisioningVersion::CURRENT as u32),
        pni: Some(primary.pni.to_string()),
        master_key: None,
    };

    let sealed = crypto::encrypt_provision_message(
        &message.encode_to_vec(),
        client_public,
        &mut OsRng,
    )?;
    Ok(ProvisionEnvelope {
        public_key: Some(sealed.ephemeral_public),
        body: Some(sealed.body),
    })
}

/// Extracts (`uuid`, `pub_key`) from a `sgnl://linkdevice?...` URL.
pub fn parse_provision_url(provision_url: &str) -> ServerResult<(String, PublicKey)> {
    let url = url::Url::parse(provision_url)
        .map_err(|e| ServerError::Protocol(format!("provision url: {}", e)))?;
    let mut uuid = None;
    let mut pub_key = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "uuid" => uuid = Some(value.into_owned()),
            "pub_key" => pub_key = Some(value.into_owned()),
            _ => {}
        }
    }
    let uuid = uuid.ok_or_else(|| ServerError::Protocol("provision url has no uuid".into()))?;
    let pub_key =
        pub_key.ok_or_else(|| ServerError::Protocol("provision url has no pub_key".into()))?;
    let pub_key = BASE64
        .decode(pub_key.as_bytes())
        .map_err(|e| ServerError::Protocol(format!("pub_key: {}", e)))?;
    let pub_key = PublicKey::deserialize(&pub_key)
        .map_err(|_| ServerError::Protocol("pub_key unparseable".into()))?;
    Ok((uuid, pub_key))
}

async fn provisioning_handoff(
    State(state): State<Arc<ServerState>>,
    Path(uuid): Path<String>,
) -> ServerResult<Response> {
    let ticket = state.provisioning.advertise(uuid);
    let response = state.provisioning.await_response(ticket.response_rx).await?;

    let (_ephemeral_id, client_public) = parse_provision_url(&response.provision_url)?;
    let code = crypto::generate_provisioning_code();
    state
        .provisioning
        .bind_code(code.clone(), response.primary.aci, ticket.result_tx);

    let envelope = seal_provision_message(&response, &code, &client_public)?;
    Ok((
        [(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        envelope.encode_to_vec(),
    )
        .into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvisioningCodeResponse {
    verification_code: String,
}

async fn provisioning_code(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
) -> Json<ProvisioningCodeResponse> {
    let code = crypto::generate_provisioning_code();
    // No harness is waiting on this attempt; the result inbox is discarded.
    let (result_tx, _result_rx) = oneshot::channel();
    state.provisioning.bind_code(code.clone(), auth.aci, result_tx);
    Json(ProvisioningCodeResponse {
        verification_code: code,
    })
}

#[derive(Deserialize)]
struct ForwardEnvelopeBody {
    body: String,
}

async fn forward_envelope(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(_auth): DeviceAuth,
    Path(destination): Path<String>,
    Json(body): Json<ForwardEnvelopeBody>,
) -> ServerResult<()> {
    let envelope = BASE64
        .decode(&body.body)
        .map_err(|e| ServerError::Protocol(format!("body: {}", e)))?;
    if state.provisioning.deliver_envelope(&destination, envelope) {
        Ok(())
    } else {
        Err(ServerError::NotFound("provisioning address"))
    }
}
