//! Mock Signal Server
//!
//! An in-memory Signal service good enough for real client code to run
//! against in integration tests: registration, device linking, prekey
//! exchange, sealed-sender message delivery over the WebSocket transport,
//! groups, the storage service, usernames, backups, and call links.
//!
//! The [`server::Server`] facade embeds the whole thing in-process; see the
//! `tests/` directory for end-to-end usage.

pub mod account;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod connection_registry;
pub mod crypto;
pub mod error;
pub mod groups;
pub mod proto;
pub mod provisioning;
pub mod queue;
pub mod routes;
pub mod server;
pub mod state;
pub mod storage_service;
pub mod tls;
pub mod websocket;
pub mod zkcred;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{PrimaryDevice, PrimaryDeviceOptions, SecondaryDevice, Server};
