//! Group Routes
//!
//! PUT   /v1/groups                   — create a group at version 0
//! GET   /v1/groups                   — fetch current group state
//! PATCH /v1/groups                   — apply a signed group change
//! GET   /v1/groups/logs/:fromVersion — slice of the change log
//!
//! All bodies are protobuf; auth is a zkgroup auth credential presentation
//! carried with the group's public params.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prost::Message;

use crate::auth::GroupAuth;
use crate::error::{ServerError, ServerResult};
use crate::proto::groups::{Group, GroupChange, GroupChangeResponse, GroupChanges};
use crate::routes::PROTOBUF_CONTENT_TYPE;
use crate::state::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route(
            "/v1/groups",
            get(fetch_group).put(create_group).patch(modify_group),
        )
        .route("/v1/groups/logs/:from_version", get(group_logs))
}

fn protobuf_response<M: Message>(message: &M) -> Response {
    (
        [(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        message.encode_to_vec(),
    )
        .into_response()
}

/// The presenter must appear in the member list as a uuid ciphertext.
fn require_membership(group: &Group, auth: &GroupAuth) -> ServerResult<()> {
    let presenter = zkgroup::serialize(&auth.claims.aci_ciphertext);
    let is_member = group
        .members
        .iter()
        .any(|m| m.user_id.as_deref() == Some(presenter.as_slice()));
    if is_member {
        Ok(())
    } else {
        Err(ServerError::Forbidden)
    }
}

async fn create_group(
    State(state): State<Arc<ServerState>>,
    auth: GroupAuth,
    body: Bytes,
) -> ServerResult<Response> {
    let group = Group::decode(body.as_ref())?;

    if group.public_key.as_deref() != Some(auth.public_params.as_slice()) {
        return Err(ServerError::Validation(
            "group publicKey does not match auth params".into(),
        ));
    }
    require_membership(&group, &auth)?;

    let stored = state.with_groups(|groups| {
        groups.create(group)?;
        Ok(groups.get(&auth.public_params)?.state.clone())
    })?;
    Ok(protobuf_response(&stored))
}

async fn fetch_group(
    State(state): State<Arc<ServerState>>,
    auth: GroupAuth,
) -> ServerResult<Response> {
    let group = state.with_groups(|groups| Ok(groups.get(&auth.public_params)?.state.clone()))?;
    require_membership(&group, &auth)?;
    Ok(protobuf_response(&group))
}

async fn modify_group(
    State(state): State<Arc<ServerState>>,
    auth: GroupAuth,
    body: Bytes,
) -> ServerResult<Response> {
    let change = GroupChange::decode(body.as_ref())?;
    let signing_key = state.config.trust_root.private_key;

    let signed = state.with_groups(|groups| {
        let group = groups.get(&auth.public_params)?.state.clone();
        require_membership(&group, &auth)?;
        groups.apply_change(&auth.public_params, change, &signing_key)
    })?;

    Ok(protobuf_response(&GroupChangeResponse {
        group_change: Some(signed),
    }))
}

async fn group_logs(
    State(state): State<Arc<ServerState>>,
    auth: GroupAuth,
    Path(from_version): Path<u32>,
) -> ServerResult<Response> {
    let entries = state.with_groups(|groups| {
        let group = groups.get(&auth.public_params)?.state.clone();
        require_membership(&group, &auth)?;
        groups.logs(&auth.public_params, from_version)
    })?;

    Ok(protobuf_response(&GroupChanges {
        group_changes: entries,
    }))
}
