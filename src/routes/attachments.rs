//! Attachment CDN Routes
//!
//! POST /v3/attachments/form/upload  — issue a pre-signed-looking upload form
//! PUT  /attachments/upload/:cdnKey  — store bytes under the issued key
//! GET  /attachments/:cdnKey         — fetch stored bytes

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;

use crate::auth::DeviceAuth;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/v3/attachments/form/upload", post(upload_form))
        .route("/attachments/upload/:cdn_key", put(upload))
        .route("/attachments/:cdn_key", get(download))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadFormResponse {
    cdn: u32,
    key: String,
    headers: HashMap<String, String>,
    signed_upload_location: String,
}

async fn upload_form(
    State(state): State<Arc<ServerState>>,
    DeviceAuth(_auth): DeviceAuth,
) -> Json<UploadFormResponse> {
    let form = state.create_upload_form();
    Json(UploadFormResponse {
        cdn: form.cdn_number,
        signed_upload_location: format!("/attachments/upload/{}", form.cdn_key),
        key: form.cdn_key,
        headers: HashMap::new(),
    })
}

/// The upload URL acts as pre-signed: no further auth required.
async fn upload(
    State(state): State<Arc<ServerState>>,
    Path(cdn_key): Path<String>,
    body: Bytes,
) -> ServerResult<()> {
    state.put_attachment(&cdn_key, body.to_vec())
}

async fn download(
    State(state): State<Arc<ServerState>>,
    Path(cdn_key): Path<String>,
) -> ServerResult<Vec<u8>> {
    state
        .get_attachment(&cdn_key)
        .ok_or(ServerError::NotFound("attachment"))
}
