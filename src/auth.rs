//! Request Authentication
//!
//! axum extractors for the four auth modes routes declare: HTTP Basic device
//! credentials, sealed-sender unidentified access, zkgroup group auth, and
//! the dual backup zk headers. Each extractor short-circuits with 401 before
//! the handler runs.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zkgroup::backups::BackupAuthCredentialPresentation;

use crate::account::now_secs;
use crate::error::ServerError;
use crate::state::{AuthenticatedDevice, ServerState};
use crate::zkcred::GroupAuthClaims;

pub const UNIDENTIFIED_ACCESS_HEADER: &str = "unidentified-access-key";
pub const GROUP_AUTH_HEADER: &str = "group-auth";
pub const BACKUP_ZK_AUTH_HEADER: &str = "x-signal-zk-auth";
pub const BACKUP_ZK_SIGNATURE_HEADER: &str = "x-signal-zk-auth-signature";

/// Basic-authenticated device credentials: `serviceId[.deviceId]:password`.
pub struct DeviceAuth(pub AuthenticatedDevice);

/// Either device credentials or nothing; sealed-sender sends use the access
/// key carried next to the body instead.
pub struct OptionalDeviceAuth(pub Option<AuthenticatedDevice>);

/// The `Unidentified-Access-Key` header, decoded.
pub struct UnidentifiedAccess(pub Option<Vec<u8>>);

/// A verified group auth presentation plus the params it was verified under.
pub struct GroupAuth {
    pub public_params: Vec<u8>,
    pub claims: GroupAuthClaims,
}

/// A verified backup zk presentation with its detached signature.
pub struct BackupZkAuth {
    pub presentation: BackupAuthCredentialPresentation,
    pub presentation_bytes: Vec<u8>,
    pub signature: Vec<u8>,
}

fn parse_basic(parts: &Parts) -> Option<(String, String)> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for DeviceAuth {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let (user, password) = parse_basic(parts).ok_or(ServerError::Unauthorized)?;
        let device = state.authenticate(&user, &password)?;
        Ok(DeviceAuth(device))
    }
}

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for OptionalDeviceAuth {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        match parse_basic(parts) {
            Some((user, password)) => {
                let device = state.authenticate(&user, &password)?;
                Ok(OptionalDeviceAuth(Some(device)))
            }
            None => Ok(OptionalDeviceAuth(None)),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for UnidentifiedAccess {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(UNIDENTIFIED_ACCESS_HEADER) else {
            return Ok(UnidentifiedAccess(None));
        };
        let value = value.to_str().map_err(|_| ServerError::Unauthorized)?;
        let key = BASE64.decode(value).map_err(|_| ServerError::Unauthorized)?;
        Ok(UnidentifiedAccess(Some(key)))
    }
}

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for GroupAuth {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(GROUP_AUTH_HEADER)
            .ok_or(ServerError::Unauthorized)?
            .to_str()
            .map_err(|_| ServerError::Unauthorized)?;
        // base64(groupPublicParams):base64(presentation)
        let (params_b64, presentation_b64) = header
            .split_once(':')
            .ok_or(ServerError::Unauthorized)?;
        let public_params = BASE64
            .decode(params_b64)
            .map_err(|_| ServerError::Unauthorized)?;
        let presentation = BASE64
            .decode(presentation_b64)
            .map_err(|_| ServerError::Unauthorized)?;

        let claims = state
            .config
            .zk_params
            .verify_group_auth(&public_params, &presentation, now_secs())
            .map_err(|_| ServerError::Unauthorized)?;

        Ok(GroupAuth {
            public_params,
            claims,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for BackupZkAuth {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let presentation_bytes = header_b64(parts, BACKUP_ZK_AUTH_HEADER)?;
        let signature = header_b64(parts, BACKUP_ZK_SIGNATURE_HEADER)?;

        let presentation = state
            .config
            .zk_params
            .verify_backup_presentation(&presentation_bytes, now_secs())
            .map_err(|_| ServerError::Unauthorized)?;

        Ok(BackupZkAuth {
            presentation,
            presentation_bytes,
            signature,
        })
    }
}

fn header_b64(parts: &Parts, name: &str) -> Result<Vec<u8>, ServerError> {
    let value = parts
        .headers
        .get(name)
        .ok_or(ServerError::Unauthorized)?
        .to_str()
        .map_err(|_| ServerError::Unauthorized)?;
    BASE64.decode(value).map_err(|_| ServerError::Unauthorized)
}

/// Formats the Basic credentials the WebSocket multiplexer injects when
/// dispatching client-originated frames through the router.
pub fn basic_header(service_id: &str, device_id: u32, password: &str) -> String {
    basic_header_from_login(&format!("{}.{}", service_id, device_id), password)
}

/// Same, from the raw `login` query value of a socket upgrade.
pub fn basic_header_from_login(login: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{}:{}", login, password))
    )
}
