//! HTTP Route Table
//!
//! One handler table serves both transports: the HTTPS listener mounts this
//! router directly, and the WebSocket multiplexer dispatches client-originated
//! frames through the same `Router` via `tower::ServiceExt::oneshot`.

pub mod accounts;
pub mod archives;
pub mod attachments;
pub mod call_links;
pub mod certificates;
pub mod groups;
pub mod keys;
pub mod messages;
pub mod profiles;
pub mod provisioning;
pub mod storage;

use std::sync::Arc;

use axum::Router;

use crate::state::ServerState;

/// Builds the full REST surface (everything except the WebSocket upgrades,
/// which the server mounts alongside this).
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .merge(accounts::router())
        .merge(archives::router())
        .merge(attachments::router())
        .merge(call_links::router())
        .merge(certificates::router())
        .merge(groups::router())
        .merge(keys::router())
        .merge(messages::router())
        .merge(profiles::router())
        .merge(provisioning::router())
        .merge(storage::router())
        .with_state(state)
}

/// Content type for protobuf request and response bodies.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
