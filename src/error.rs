//! Centralized error types.
//!
//! Uses `thiserror` for the error taxonomy and converts each variant to the
//! HTTP status + small JSON body the Signal wire protocol expects. Handlers
//! return `Result<_, ServerError>` and bubble with `?`; anything a handler
//! cannot translate maps to 500.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type ServerResult<T> = Result<T, ServerError>;

/// Error type shared by the protocol engine, the HTTP routes, and the
/// WebSocket multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    // === Wire / validation errors ===
    #[error("Malformed request: {0}")]
    Protocol(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // === Auth errors ===
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    // === Resource errors ===
    #[error("{0} not found")]
    NotFound(&'static str),

    // === Conflict errors ===
    #[error("Device set mismatch")]
    MismatchedDevices {
        stale_devices: Vec<u32>,
        missing_devices: Vec<u32>,
        extra_devices: Vec<u32>,
    },

    /// Storage write lost the version race; the body carries the current
    /// manifest so the client can rebase.
    #[error("Storage manifest conflict")]
    StorageConflict { current_manifest: Vec<u8> },

    #[error("Username hash already taken")]
    UsernameConflict,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Account already registered for this number")]
    ReRegistration,

    // === Crypto errors ===
    #[error("Bad cryptographic input: {0}")]
    BadCryptoInput(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Credential verification failed")]
    BadCredential,

    // === Harness-side errors (never sent to a client) ===
    #[error("Timed out waiting on an orchestration queue")]
    QueueTimeout,

    #[error("Timed out waiting for a device link to complete")]
    ProvisionTimeout,

    // === Everything else ===
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MismatchedDevicesBody {
    stale_devices: Vec<u32>,
    missing_devices: Vec<u32>,
    extra_devices: Vec<u32>,
}

impl ServerError {
    /// Status code this error maps to on the wire.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::Validation(_) | ServerError::BadSignature => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServerError::Unauthorized | ServerError::BadCredential => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MismatchedDevices { .. }
            | ServerError::StorageConflict { .. }
            | ServerError::UsernameConflict
            | ServerError::Conflict(_)
            | ServerError::ReRegistration => StatusCode::CONFLICT,
            ServerError::BadCryptoInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::QueueTimeout | ServerError::ProvisionTimeout | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            ServerError::MismatchedDevices {
                stale_devices,
                missing_devices,
                extra_devices,
            } => (
                status,
                axum::Json(MismatchedDevicesBody {
                    stale_devices,
                    missing_devices,
                    extra_devices,
                }),
            )
                .into_response(),
            ServerError::StorageConflict { current_manifest } => (
                status,
                [(header::CONTENT_TYPE, "application/x-protobuf")],
                current_manifest,
            )
                .into_response(),
            ServerError::Internal(ref msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    status,
                    axum::Json(ErrorBody {
                        error: "internal error".to_string(),
                    }),
                )
                    .into_response()
            }
            other => (
                status,
                axum::Json(ErrorBody {
                    error: other.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

impl From<prost::DecodeError> for ServerError {
    fn from(e: prost::DecodeError) -> Self {
        ServerError::Protocol(format!("protobuf decode: {}", e))
    }
}

impl From<libsignal_protocol::SignalProtocolError> for ServerError {
    fn from(e: libsignal_protocol::SignalProtocolError) -> Self {
        ServerError::BadCryptoInput(e.to_string())
    }
}

impl From<zkgroup::ZkGroupDeserializationFailure> for ServerError {
    fn from(_: zkgroup::ZkGroupDeserializationFailure) -> Self {
        ServerError::Protocol("zkgroup deserialization".to_string())
    }
}

impl From<zkgroup::ZkGroupVerificationFailure> for ServerError {
    fn from(_: zkgroup::ZkGroupVerificationFailure) -> Self {
        ServerError::BadCredential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::Protocol("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ServerError::NotFound("account").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::UsernameConflict.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServerError::Validation("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_mismatched_devices_is_conflict() {
        let err = ServerError::MismatchedDevices {
            stale_devices: vec![2],
            missing_devices: vec![],
            extra_devices: vec![3],
        };
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
