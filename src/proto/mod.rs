//! Pre-generated protobuf messages for the `signalservice` package.
//!
//! Checked in rather than built from `.proto` sources so the crate compiles
//! without a protoc toolchain. Field numbers and names track the upstream
//! Signal schemas; only the messages the mock server exercises are kept.

pub mod groups;
pub mod provisioning;
pub mod service;
pub mod storage;
pub mod websocket;
