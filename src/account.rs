//! Account and Device Model
//!
//! Immutable-after-construction descriptors owned by the server state:
//! accounts keyed by ACI, devices keyed by (ACI, device id), and the prekey
//! inventory each device carries per identity flavor. Everything a client
//! encrypts stays opaque bytes here.

use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::proto::service::Envelope;

/// The primary device always has id 1.
pub const PRIMARY_DEVICE_ID: u32 = 1;

/// Which identity flavor a key inventory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Aci,
    Pni,
}

impl FromStr for IdentityKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aci" => Ok(IdentityKind::Aci),
            "pni" => Ok(IdentityKind::Pni),
            other => Err(ServerError::Protocol(format!(
                "unknown identity kind: {}",
                other
            ))),
        }
    }
}

/// A one-time EC prekey as uploaded over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPreKey {
    pub key_id: u32,
    /// Base64 of the 33-byte serialized public key.
    pub public_key: String,
}

/// A signed prekey (EC or Kyber) as uploaded over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedSignedPreKey {
    pub key_id: u32,
    pub public_key: String,
    pub signature: String,
}

/// Decoded one-time prekey held in a device's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPreKey {
    pub key_id: u32,
    pub public_key: Vec<u8>,
}

/// Decoded signed prekey (EC signed prekey, PQ one-shot, or PQ last resort).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSignedPreKey {
    pub key_id: u32,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl UploadedPreKey {
    pub fn decode(&self) -> ServerResult<StoredPreKey> {
        Ok(StoredPreKey {
            key_id: self.key_id,
            public_key: decode_b64("publicKey", &self.public_key)?,
        })
    }

    pub fn encode(key: &StoredPreKey) -> Self {
        UploadedPreKey {
            key_id: key.key_id,
            public_key: BASE64.encode(&key.public_key),
        }
    }
}

impl UploadedSignedPreKey {
    pub fn decode(&self) -> ServerResult<StoredSignedPreKey> {
        Ok(StoredSignedPreKey {
            key_id: self.key_id,
            public_key: decode_b64("publicKey", &self.public_key)?,
            signature: decode_b64("signature", &self.signature)?,
        })
    }

    pub fn encode(key: &StoredSignedPreKey) -> Self {
        UploadedSignedPreKey {
            key_id: key.key_id,
            public_key: BASE64.encode(&key.public_key),
            signature: BASE64.encode(&key.signature),
        }
    }
}

fn decode_b64(field: &str, value: &str) -> ServerResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| ServerError::Protocol(format!("{}: {}", field, e)))
}

/// Current prekey inventory for one identity flavor of one device.
#[derive(Debug, Default)]
pub struct DeviceKeys {
    /// 33-byte serialized identity public key.
    pub identity_key: Option<Vec<u8>>,
    /// Replaced on upload, never unset once present.
    pub signed_pre_key: Option<StoredSignedPreKey>,
    pub pq_last_resort_pre_key: Option<StoredSignedPreKey>,
    /// One-time queues, consumed FIFO, each key at most once.
    pub one_time_keys: VecDeque<StoredPreKey>,
    pub one_time_pq_keys: VecDeque<StoredSignedPreKey>,
    /// Total keys ever consumed from each queue.
    pub consumed_one_time: usize,
    pub consumed_one_time_pq: usize,
}

impl DeviceKeys {
    /// Whether this flavor has the material a session initiator needs.
    pub fn is_populated(&self) -> bool {
        self.identity_key.is_some() && self.signed_pre_key.is_some()
    }

    pub fn take_one_time_key(&mut self) -> Option<StoredPreKey> {
        let key = self.one_time_keys.pop_front();
        if key.is_some() {
            self.consumed_one_time += 1;
        }
        key
    }

    pub fn take_one_time_pq_key(&mut self) -> Option<StoredSignedPreKey> {
        let key = self.one_time_pq_keys.pop_front();
        if key.is_some() {
            self.consumed_one_time_pq += 1;
        }
        key
    }
}

/// A message awaiting delivery to one device.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub guid: Uuid,
    pub envelope: Envelope,
}

/// One device of an account.
#[derive(Debug)]
pub struct Device {
    pub device_id: u32,
    pub registration_id: u32,
    pub pni_registration_id: u32,
    pub password: String,
    /// Encrypted by the client; opaque here.
    pub name: Option<String>,
    pub fetches_messages: bool,
    pub created_at: u64,
    pub aci_keys: DeviceKeys,
    pub pni_keys: DeviceKeys,
    pub message_queue: VecDeque<QueuedMessage>,
}

impl Device {
    pub fn new(
        device_id: u32,
        registration_id: u32,
        pni_registration_id: u32,
        password: String,
    ) -> Self {
        Device {
            device_id,
            registration_id,
            pni_registration_id,
            password,
            name: None,
            fetches_messages: true,
            created_at: now_millis(),
            aci_keys: DeviceKeys::default(),
            pni_keys: DeviceKeys::default(),
            message_queue: VecDeque::new(),
        }
    }

    pub fn keys(&self, kind: IdentityKind) -> &DeviceKeys {
        match kind {
            IdentityKind::Aci => &self.aci_keys,
            IdentityKind::Pni => &self.pni_keys,
        }
    }

    pub fn keys_mut(&mut self, kind: IdentityKind) -> &mut DeviceKeys {
        match kind {
            IdentityKind::Aci => &mut self.aci_keys,
            IdentityKind::Pni => &mut self.pni_keys,
        }
    }

    pub fn registration_id(&self, kind: IdentityKind) -> u32 {
        match kind {
            IdentityKind::Aci => self.registration_id,
            IdentityKind::Pni => self.pni_registration_id,
        }
    }
}

/// Backup credential request bindings registered via `/v1/archives/backupid`.
#[derive(Debug, Clone)]
pub struct BackupCredentialRequests {
    pub messages: Vec<u8>,
    pub media: Vec<u8>,
}

/// A versioned profile written by the client; commitment is kept so profile
/// key credentials can be issued against it.
#[derive(Debug, Clone)]
pub struct VersionedProfile {
    pub version: String,
    pub name: Option<Vec<u8>>,
    pub about: Option<Vec<u8>>,
    pub commitment: Vec<u8>,
}

/// One Signal account: an ACI/PNI pair, its E164, and its devices.
#[derive(Debug)]
pub struct Account {
    pub aci: Uuid,
    pub pni: Uuid,
    pub e164: String,
    /// 32 bytes, opaque; used only to derive the unidentified-access key.
    pub profile_key: Option<Vec<u8>>,
    pub devices: BTreeMap<u32, Device>,
    pub username_hash: Option<Vec<u8>>,
    /// Server-issued link handle and the client's encrypted username blob.
    pub username_link: Option<(Uuid, Vec<u8>)>,
    pub profile: Option<VersionedProfile>,
    pub backup_credential_requests: Option<BackupCredentialRequests>,
    pub backup_public_key: Option<Vec<u8>>,
}

impl Account {
    pub fn new(aci: Uuid, pni: Uuid, e164: String) -> Self {
        Account {
            aci,
            pni,
            e164,
            profile_key: None,
            devices: BTreeMap::new(),
            username_hash: None,
            username_link: None,
            profile: None,
            backup_credential_requests: None,
            backup_public_key: None,
        }
    }

    /// Device id for the next linked device.
    pub fn next_device_id(&self) -> u32 {
        self.devices
            .keys()
            .next_back()
            .map(|id| id + 1)
            .unwrap_or(PRIMARY_DEVICE_ID)
    }

    pub fn primary(&self) -> Option<&Device> {
        self.devices.get(&PRIMARY_DEVICE_ID)
    }

    /// Unidentified-access key derived from the profile key, if one is set.
    pub fn access_key(&self) -> Option<[u8; 16]> {
        let profile_key = self.profile_key.as_deref()?;
        crate::crypto::derive_access_key(profile_key).ok()
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
