//! Message Routes
//!
//! PUT    /v1/messages/:serviceId        — send a MessageList (Basic or sealed)
//! GET    /v1/messages                   — current queue for the device
//! DELETE /v1/messages/uuid/:guid        — acknowledge one envelope

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{OptionalDeviceAuth, UnidentifiedAccess};
use crate::error::{ServerError, ServerResult};
use crate::proto::service::Envelope;
use crate::state::{MessageSource, OutgoingMessage, ServerState};

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/messages/:service_id", put(send_messages))
        .route("/v1/messages", get(get_messages))
        .route("/v1/messages/uuid/:guid", delete(ack_message))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingMessage {
    r#type: i32,
    destination_device_id: u32,
    destination_registration_id: u32,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    online: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    needs_sync: bool,
}

async fn send_messages(
    State(state): State<Arc<ServerState>>,
    OptionalDeviceAuth(auth): OptionalDeviceAuth,
    UnidentifiedAccess(access_key): UnidentifiedAccess,
    Path(service_id): Path<String>,
    Json(body): Json<MessageList>,
) -> ServerResult<Json<SendMessageResponse>> {
    let source = auth.as_ref().map(|device| MessageSource {
        service_id: device.aci.to_string(),
        aci: device.aci,
        device_id: device.device_id,
    });
    if source.is_none() && access_key.is_none() {
        return Err(ServerError::Unauthorized);
    }

    let messages = body
        .messages
        .iter()
        .map(|m| {
            Ok(OutgoingMessage {
                envelope_type: m.r#type,
                destination_device_id: m.destination_device_id,
                destination_registration_id: m.destination_registration_id,
                content: BASE64
                    .decode(&m.content)
                    .map_err(|e| ServerError::Protocol(format!("content: {}", e)))?,
            })
        })
        .collect::<ServerResult<Vec<_>>>()?;

    state.queue_messages(
        source.as_ref(),
        access_key.as_deref(),
        &service_id,
        &messages,
        body.timestamp,
    )?;

    let needs_sync = !body.online
        && source
            .as_ref()
            .map(|s| s.service_id != service_id)
            .unwrap_or(false);
    Ok(Json(SendMessageResponse { needs_sync }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    r#type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_device: Option<u32>,
    destination_service_id: Option<String>,
    timestamp: u64,
    content: String,
    guid: String,
    server_timestamp: u64,
    urgent: bool,
}

impl WireEnvelope {
    fn from_envelope(envelope: &Envelope) -> Self {
        WireEnvelope {
            r#type: envelope.r#type.unwrap_or(0),
            source_service_id: envelope.source_service_id.clone(),
            source_device: envelope.source_device,
            destination_service_id: envelope.destination_service_id.clone(),
            timestamp: envelope.timestamp.unwrap_or(0),
            content: BASE64.encode(envelope.content.as_deref().unwrap_or_default()),
            guid: envelope.server_guid.clone().unwrap_or_default(),
            server_timestamp: envelope.server_timestamp.unwrap_or(0),
            urgent: envelope.urgent.unwrap_or(true),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Vec<WireEnvelope>,
    more: bool,
}

async fn get_messages(
    State(state): State<Arc<ServerState>>,
    OptionalDeviceAuth(auth): OptionalDeviceAuth,
) -> ServerResult<Json<MessageListResponse>> {
    let auth = auth.ok_or(ServerError::Unauthorized)?;
    let messages = state
        .pending_messages(auth.aci, auth.device_id)
        .iter()
        .map(|m| WireEnvelope::from_envelope(&m.envelope))
        .collect();
    Ok(Json(MessageListResponse {
        messages,
        more: false,
    }))
}

async fn ack_message(
    State(state): State<Arc<ServerState>>,
    OptionalDeviceAuth(auth): OptionalDeviceAuth,
    Path(guid): Path<Uuid>,
) -> ServerResult<StatusCode> {
    let auth = auth.ok_or(ServerError::Unauthorized)?;
    if state.ack_message(auth.aci, auth.device_id, &guid) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound("message"))
    }
}
