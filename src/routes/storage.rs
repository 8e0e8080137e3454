//! Storage Service Routes
//!
//! GET /v1/storage/manifest                    — current manifest
//! GET /v1/storage/manifest/version/:version   — manifest if newer than :version
//! PUT /v1/storage                             — atomic WriteOperation
//! PUT /v1/storage/read                        — batch item read
//!
//! Bodies are protobuf. A conflicting write returns 409 with the current
//! manifest as its body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use prost::Message;

use crate::auth::DeviceAuth;
use crate::error::ServerResult;
use crate::proto::storage::{ReadOperation, StorageItems, WriteOperation};
use crate::routes::PROTOBUF_CONTENT_TYPE;
use crate::state::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v1/storage", put(write))
        .route("/v1/storage/read", put(read))
        .route("/v1/storage/manifest", get(manifest))
        .route("/v1/storage/manifest/version/:version", get(manifest_if_newer))
}

fn protobuf_response<M: Message>(message: &M) -> Response {
    (
        [(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        message.encode_to_vec(),
    )
        .into_response()
}

async fn manifest(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
) -> Response {
    match state.storage_manifest_if_newer(auth.aci, 0) {
        Some(manifest) => protobuf_response(&manifest),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn manifest_if_newer(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    Path(version): Path<u64>,
) -> Response {
    match state.storage_manifest_if_newer(auth.aci, version) {
        Some(manifest) => protobuf_response(&manifest),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn write(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let op = WriteOperation::decode(body.as_ref())?;
    state.storage_write(auth.aci, op)?;
    Ok(StatusCode::OK)
}

async fn read(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(auth): DeviceAuth,
    body: Bytes,
) -> ServerResult<Response> {
    let op = ReadOperation::decode(body.as_ref())?;
    let items = state.storage_read(auth.aci, &op.read_key);
    Ok(protobuf_response(&StorageItems { items }))
}
