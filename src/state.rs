//! Server State
//!
//! The process-wide in-memory store and protocol engine: accounts, devices,
//! prekey inventories, per-device message queues, groups, storage service
//! records, usernames, backups, call links, and the CDN blob store. All
//! mutation goes through one mutex; methods lock, commit atomically, and
//! return domain results the transport layer translates to wire responses.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use libsignal_protocol::PublicKey;
use rand::rngs::OsRng;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::account::{
    now_millis, now_secs, Account, BackupCredentialRequests, Device, DeviceKeys, IdentityKind,
    QueuedMessage, StoredPreKey, StoredSignedPreKey, VersionedProfile, PRIMARY_DEVICE_ID,
};
use crate::attachments::CdnStore;
use crate::config::ServerConfig;
use crate::connection_registry::ConnectionRegistry;
use crate::crypto::{self, ServerCertificateMaterial};
use crate::error::{ServerError, ServerResult};
use crate::groups::GroupStore;
use crate::proto::service::Envelope;
use crate::provisioning::{LinkedDevice, ProvisioningCoordinator};
use crate::storage_service::StorageStore;

/// How long a username reservation is soft-held before expiring.
const USERNAME_RESERVATION_TTL_SECS: u64 = 300;

/// Sender certificates are minted with a one-day lifetime.
const SENDER_CERTIFICATE_LIFETIME_MS: u64 = 24 * 60 * 60 * 1000;

/// A device that passed Basic authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedDevice {
    pub aci: Uuid,
    pub pni: Uuid,
    pub e164: String,
    pub device_id: u32,
}

/// Decoded registration request, shared by the REST path and the harness.
#[derive(Debug, Default)]
pub struct RegistrationRequest {
    pub e164: Option<String>,
    pub password: String,
    pub registration_id: u32,
    pub pni_registration_id: u32,
    pub fetches_messages: bool,
    pub name: Option<String>,
    pub aci_identity_key: Option<Vec<u8>>,
    pub pni_identity_key: Option<Vec<u8>>,
    pub aci_signed_pre_key: Option<StoredSignedPreKey>,
    pub pni_signed_pre_key: Option<StoredSignedPreKey>,
    pub aci_pq_last_resort_pre_key: Option<StoredSignedPreKey>,
    pub pni_pq_last_resort_pre_key: Option<StoredSignedPreKey>,
    pub profile_key: Option<Vec<u8>>,
}

/// Identifiers of a freshly registered or linked account/device.
#[derive(Debug, Clone)]
pub struct RegisteredDevice {
    pub aci: Uuid,
    pub pni: Uuid,
    pub e164: String,
    pub device_id: u32,
}

/// Attributes submitted when linking a secondary device.
#[derive(Debug, Default)]
pub struct LinkAttributes {
    pub password: String,
    pub registration_id: u32,
    pub pni_registration_id: u32,
    pub name: Option<String>,
    pub fetches_messages: bool,
}

/// Key material accepted by `PUT /v2/keys`, already decoded.
#[derive(Debug, Default)]
pub struct KeyUpload {
    pub identity_key: Option<Vec<u8>>,
    pub signed_pre_key: Option<StoredSignedPreKey>,
    pub pq_last_resort_pre_key: Option<StoredSignedPreKey>,
    pub pre_keys: Vec<StoredPreKey>,
    pub pq_pre_keys: Vec<StoredSignedPreKey>,
}

/// One message of a `MessageList`, already decoded.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub envelope_type: i32,
    pub destination_device_id: u32,
    pub destination_registration_id: u32,
    pub content: Vec<u8>,
}

/// Who is sending; `None` for sealed-sender sends.
#[derive(Debug, Clone)]
pub struct MessageSource {
    pub service_id: String,
    pub aci: Uuid,
    pub device_id: u32,
}

/// Prekey bundle for one device of a fetch response.
#[derive(Debug)]
pub struct DevicePreKeys {
    pub device_id: u32,
    pub registration_id: u32,
    pub pre_key: Option<StoredPreKey>,
    pub signed_pre_key: Option<StoredSignedPreKey>,
    pub pq_pre_key: Option<StoredSignedPreKey>,
}

/// Response to a prekey bundle fetch.
#[derive(Debug)]
pub struct PreKeyBundles {
    pub identity_key: Vec<u8>,
    pub devices: Vec<DevicePreKeys>,
}

/// Call link restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLinkRestrictions {
    None,
    AdminApproval,
}

/// A stored call link.
#[derive(Debug, Clone)]
pub struct CallLinkRecord {
    pub root_key: Vec<u8>,
    pub admin_passkey: Vec<u8>,
    pub name: String,
    pub restrictions: CallLinkRestrictions,
    pub revoked: bool,
    pub deleted_at: Option<u64>,
}

struct UsernameReservation {
    hash: Vec<u8>,
    expires_at_secs: u64,
}

#[derive(Default)]
struct StateInner {
    accounts: HashMap<Uuid, Account>,
    aci_by_pni: HashMap<Uuid, Uuid>,
    aci_by_e164: HashMap<String, Uuid>,
    groups: GroupStore,
    storage: StorageStore,
    cdn: CdnStore,
    username_index: HashMap<Vec<u8>, Uuid>,
    username_reservations: HashMap<Uuid, UsernameReservation>,
    username_links: HashMap<Uuid, Uuid>,
    backup_keys: HashMap<Vec<u8>, Vec<u8>>,
    call_links: HashMap<Vec<u8>, CallLinkRecord>,
    issued_upload_keys: HashSet<String>,
    manifest_waiters: HashMap<Uuid, Vec<oneshot::Sender<u64>>>,
}

/// The abstract protocol engine shared by the HTTP router, the WebSocket
/// multiplexer, and the test facade.
pub struct ServerState {
    pub config: ServerConfig,
    pub server_cert: ServerCertificateMaterial,
    pub registry: ConnectionRegistry,
    pub provisioning: ProvisioningCoordinator,
    inner: Mutex<StateInner>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let server_cert =
            crypto::generate_server_certificate(&config.trust_root.private_key, &mut OsRng)?;
        let provisioning = ProvisioningCoordinator::new(config.orchestration_timeout);
        Ok(ServerState {
            config,
            server_cert,
            registry: ConnectionRegistry::new(),
            provisioning,
            inner: Mutex::new(StateInner {
                cdn: CdnStore::new(),
                ..StateInner::default()
            }),
        })
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Authenticates `serviceId[.deviceId]` + password Basic credentials.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> ServerResult<AuthenticatedDevice> {
        let (service_id, device_id) = match username.rsplit_once('.') {
            Some((id, device)) => (
                id,
                device
                    .parse::<u32>()
                    .map_err(|_| ServerError::Unauthorized)?,
            ),
            None => (username, PRIMARY_DEVICE_ID),
        };

        let inner = self.inner.lock().unwrap();
        let account = resolve_account(&inner, service_id).ok_or(ServerError::Unauthorized)?;
        let device = account
            .devices
            .get(&device_id)
            .ok_or(ServerError::Unauthorized)?;
        if device.password != password {
            return Err(ServerError::Unauthorized);
        }

        Ok(AuthenticatedDevice {
            aci: account.aci,
            pni: account.pni,
            e164: account.e164.clone(),
            device_id,
        })
    }

    // ========================================================================
    // Registration and linking
    // ========================================================================

    /// Registers (or re-registers) an account with its primary device.
    pub fn register_account(&self, request: RegistrationRequest) -> ServerResult<RegisteredDevice> {
        if !crypto::valid_registration_id(request.registration_id)
            || !crypto::valid_registration_id(request.pni_registration_id)
        {
            return Err(ServerError::Validation(
                "registration id out of range".into(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        let e164 = request
            .e164
            .clone()
            .unwrap_or_else(crypto::generate_e164);

        let existing_aci = inner.aci_by_e164.get(&e164).copied();
        let (aci, pni) = match existing_aci {
            Some(existing_aci) => {
                let (authorized, ids, old_hash) = {
                    let existing = &inner.accounts[&existing_aci];
                    (
                        existing
                            .primary()
                            .map(|d| d.password == request.password)
                            .unwrap_or(false),
                        (existing.aci, existing.pni),
                        existing.username_hash.clone(),
                    )
                };
                if !authorized {
                    return Err(ServerError::ReRegistration);
                }
                if let Some(hash) = old_hash {
                    inner.username_index.remove(&hash);
                }
                ids
            }
            None => (crypto::random_aci(), crypto::random_pni()),
        };

        let mut device = Device::new(
            PRIMARY_DEVICE_ID,
            request.registration_id,
            request.pni_registration_id,
            request.password,
        );
        device.name = request.name;
        device.fetches_messages = request.fetches_messages;
        install_registration_keys(&mut device, &request);

        let mut account = Account::new(aci, pni, e164.clone());
        account.profile_key = request.profile_key;
        account.devices.insert(PRIMARY_DEVICE_ID, device);

        inner.aci_by_pni.insert(pni, aci);
        inner.aci_by_e164.insert(e164.clone(), aci);
        inner.accounts.insert(aci, account);

        debug!("registered account {} ({})", aci, e164);
        Ok(RegisteredDevice {
            aci,
            pni,
            e164,
            device_id: PRIMARY_DEVICE_ID,
        })
    }

    /// Registers a secondary device against a consumed provisioning code.
    pub fn link_device(&self, code: &str, attrs: LinkAttributes) -> ServerResult<RegisteredDevice> {
        if !crypto::valid_registration_id(attrs.registration_id)
            || !crypto::valid_registration_id(attrs.pni_registration_id)
        {
            return Err(ServerError::Validation(
                "registration id out of range".into(),
            ));
        }

        let (primary_aci, result_tx) = self.provisioning.take_code(code)?;

        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get_mut(&primary_aci)
            .ok_or(ServerError::NotFound("account"))?;

        let device_id = account.next_device_id();
        let mut device = Device::new(
            device_id,
            attrs.registration_id,
            attrs.pni_registration_id,
            attrs.password,
        );
        device.name = attrs.name;
        device.fetches_messages = attrs.fetches_messages;
        account.devices.insert(device_id, device);

        let registered = RegisteredDevice {
            aci: account.aci,
            pni: account.pni,
            e164: account.e164.clone(),
            device_id,
        };
        drop(inner);

        self.provisioning
            .bind_device(registered.aci, device_id, result_tx);
        debug!("linked device {}.{}", registered.aci, device_id);
        Ok(registered)
    }

    // ========================================================================
    // Prekeys
    // ========================================================================

    /// Validates and installs uploaded key material for one identity flavor.
    pub fn update_device_keys(
        &self,
        auth: &AuthenticatedDevice,
        kind: IdentityKind,
        upload: KeyUpload,
    ) -> ServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let device = device_mut(&mut inner, auth.aci, auth.device_id)?;
        let keys = device.keys_mut(kind);

        let identity_bytes = upload
            .identity_key
            .clone()
            .or_else(|| keys.identity_key.clone())
            .ok_or_else(|| ServerError::Validation("no identity key on file".into()))?;
        let identity = PublicKey::deserialize(&identity_bytes)
            .map_err(|_| ServerError::Validation("identity key unparseable".into()))?;

        for key in &upload.pre_keys {
            validate_ec_public(&key.public_key)?;
        }
        if let Some(signed) = &upload.signed_pre_key {
            validate_ec_public(&signed.public_key)?;
            verify_prekey_signature(&identity, signed)?;
        }
        for pq in upload
            .pq_pre_keys
            .iter()
            .chain(upload.pq_last_resort_pre_key.iter())
        {
            if pq.public_key.is_empty() {
                return Err(ServerError::Validation("empty kyber public key".into()));
            }
            verify_prekey_signature(&identity, pq)?;
        }

        keys.identity_key = Some(identity_bytes);
        if let Some(signed) = upload.signed_pre_key {
            keys.signed_pre_key = Some(signed);
        }
        if let Some(last_resort) = upload.pq_last_resort_pre_key {
            keys.pq_last_resort_pre_key = Some(last_resort);
        }
        keys.one_time_keys.extend(upload.pre_keys);
        keys.one_time_pq_keys.extend(upload.pq_pre_keys);

        let populated = device.aci_keys.is_populated();
        let registration_id = device.registration_id;
        drop(inner);

        // A pending link attempt reaches its terminal state on the first key
        // upload of the new device.
        if populated && self.provisioning.has_pending_device(auth.aci, auth.device_id) {
            self.provisioning.complete_device(
                auth.aci,
                auth.device_id,
                LinkedDevice {
                    aci: auth.aci,
                    pni: auth.pni,
                    device_id: auth.device_id,
                    registration_id,
                },
            );
        }
        Ok(())
    }

    /// Remaining one-time prekey counts for `GET /v2/keys`.
    pub fn prekey_counts(
        &self,
        auth: &AuthenticatedDevice,
        kind: IdentityKind,
    ) -> ServerResult<(usize, usize)> {
        let inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get(&auth.aci)
            .ok_or(ServerError::NotFound("account"))?;
        let device = account
            .devices
            .get(&auth.device_id)
            .ok_or(ServerError::NotFound("device"))?;
        let keys = device.keys(kind);
        Ok((keys.one_time_keys.len(), keys.one_time_pq_keys.len()))
    }

    /// Consumes and returns prekey bundles for the targeted devices.
    pub fn prekey_bundles(
        &self,
        service_id: &str,
        device_selector: &str,
        pq: bool,
    ) -> ServerResult<PreKeyBundles> {
        let kind = identity_kind_of(service_id);
        let mut inner = self.inner.lock().unwrap();
        let aci = resolve_account(&inner, service_id)
            .map(|a| a.aci)
            .ok_or(ServerError::NotFound("account"))?;
        let account = inner.accounts.get_mut(&aci).unwrap();

        let device_ids: Vec<u32> = match device_selector {
            "*" => account.devices.keys().copied().collect(),
            id => {
                let id = id
                    .parse::<u32>()
                    .map_err(|_| ServerError::Protocol("bad device id".into()))?;
                if !account.devices.contains_key(&id) {
                    return Err(ServerError::NotFound("device"));
                }
                vec![id]
            }
        };

        let mut identity_key = None;
        let mut devices = Vec::with_capacity(device_ids.len());
        for id in device_ids {
            let device = account.devices.get_mut(&id).unwrap();
            let registration_id = device.registration_id(kind);
            let keys = device.keys_mut(kind);
            if identity_key.is_none() {
                identity_key = keys.identity_key.clone();
            }

            let pre_key = keys.take_one_time_key();
            let pq_pre_key = if pq {
                keys.take_one_time_pq_key()
                    .or_else(|| keys.pq_last_resort_pre_key.clone())
            } else {
                None
            };

            devices.push(DevicePreKeys {
                device_id: id,
                registration_id,
                pre_key,
                signed_pre_key: keys.signed_pre_key.clone(),
                pq_pre_key,
            });
        }

        Ok(PreKeyBundles {
            identity_key: identity_key
                .ok_or_else(|| ServerError::NotFound("identity key"))?,
            devices,
        })
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Validates the device set and queues one envelope per target device.
    pub fn queue_messages(
        &self,
        source: Option<&MessageSource>,
        access_key: Option<&[u8]>,
        destination: &str,
        messages: &[OutgoingMessage],
        timestamp: u64,
    ) -> ServerResult<()> {
        let kind = identity_kind_of(destination);
        let mut inner = self.inner.lock().unwrap();
        let account = resolve_account(&inner, destination).ok_or(ServerError::NotFound("account"))?;
        let dest_aci = account.aci;

        // Sealed sends authenticate with the destination's access key instead
        // of device credentials.
        if source.is_none() {
            let expected = account.access_key().ok_or(ServerError::Unauthorized)?;
            let provided = access_key.ok_or(ServerError::Unauthorized)?;
            if provided != expected {
                return Err(ServerError::Unauthorized);
            }
        }

        let same_account_sync = source.map(|s| s.aci == dest_aci).unwrap_or(false);

        let mut stale = Vec::new();
        let mut extra = Vec::new();
        let mut listed = HashSet::new();
        for message in messages {
            listed.insert(message.destination_device_id);
            match account.devices.get(&message.destination_device_id) {
                None => extra.push(message.destination_device_id),
                Some(device) => {
                    if device.registration_id(kind) != message.destination_registration_id {
                        stale.push(message.destination_device_id);
                    }
                }
            }
        }
        let missing: Vec<u32> = account
            .devices
            .keys()
            .copied()
            .filter(|id| !listed.contains(id))
            .filter(|id| !(same_account_sync && Some(*id) == source.map(|s| s.device_id)))
            .collect();

        if !stale.is_empty() || !missing.is_empty() || !extra.is_empty() {
            return Err(ServerError::MismatchedDevices {
                stale_devices: stale,
                missing_devices: missing,
                extra_devices: extra,
            });
        }

        let account = inner.accounts.get_mut(&dest_aci).unwrap();
        let mut queued = Vec::new();
        for message in messages {
            let envelope = Envelope {
                r#type: Some(message.envelope_type),
                timestamp: Some(timestamp),
                source_device: source.map(|s| s.device_id),
                content: Some(message.content.clone()),
                server_guid: Some(Uuid::new_v4().to_string()),
                server_timestamp: Some(now_millis()),
                source_service_id: source.map(|s| s.service_id.clone()),
                ephemeral: None,
                destination_service_id: Some(destination.to_string()),
                urgent: Some(true),
                updated_pni: None,
                story: None,
            };
            let device = account
                .devices
                .get_mut(&message.destination_device_id)
                .unwrap();
            device.message_queue.push_back(QueuedMessage {
                guid: Uuid::parse_str(envelope.server_guid.as_deref().unwrap()).unwrap(),
                envelope,
            });
            queued.push(message.destination_device_id);
        }
        drop(inner);

        for device_id in queued {
            self.registry.notify(dest_aci, device_id);
        }
        Ok(())
    }

    /// Current queue contents, oldest first. Messages stay queued until acked.
    pub fn pending_messages(&self, aci: Uuid, device_id: u32) -> Vec<QueuedMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&aci)
            .and_then(|a| a.devices.get(&device_id))
            .map(|d| d.message_queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The envelope at the head of the queue, if any.
    pub fn peek_message(&self, aci: Uuid, device_id: u32) -> Option<QueuedMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&aci)?
            .devices
            .get(&device_id)?
            .message_queue
            .front()
            .cloned()
    }

    /// Acknowledges one message by guid. Returns true if it was queued.
    pub fn ack_message(&self, aci: Uuid, device_id: u32, guid: &Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(device) = inner
            .accounts
            .get_mut(&aci)
            .and_then(|a| a.devices.get_mut(&device_id))
        else {
            return false;
        };
        let before = device.message_queue.len();
        device.message_queue.retain(|m| m.guid != *guid);
        device.message_queue.len() != before
    }

    pub fn queue_len(&self, aci: Uuid, device_id: u32) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&aci)
            .and_then(|a| a.devices.get(&device_id))
            .map(|d| d.message_queue.len())
            .unwrap_or(0)
    }

    /// Whether the device exists and has `fetchesMessages` set.
    pub fn fetches_messages(&self, aci: Uuid, device_id: u32) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&aci)
            .and_then(|a| a.devices.get(&device_id))
            .map(|d| d.fetches_messages)
            .unwrap_or(false)
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub fn with_groups<T>(&self, f: impl FnOnce(&mut GroupStore) -> ServerResult<T>) -> ServerResult<T> {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner.groups)
    }

    // ========================================================================
    // Storage service
    // ========================================================================

    pub fn storage_manifest_if_newer(
        &self,
        aci: Uuid,
        after: u64,
    ) -> Option<crate::proto::storage::StorageManifest> {
        let inner = self.inner.lock().unwrap();
        inner.storage.manifest_if_newer(&aci, after)
    }

    pub fn storage_read(
        &self,
        aci: Uuid,
        keys: &[Vec<u8>],
    ) -> Vec<crate::proto::storage::StorageItem> {
        let inner = self.inner.lock().unwrap();
        inner.storage.read(&aci, keys)
    }

    /// Applies a write operation; on success wakes every manifest waiter.
    pub fn storage_write(
        &self,
        aci: Uuid,
        op: crate::proto::storage::WriteOperation,
    ) -> ServerResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.storage.write(&aci, op)?;
        if let Some(waiters) = inner.manifest_waiters.remove(&aci) {
            for waiter in waiters {
                let _ = waiter.send(version);
            }
        }
        Ok(version)
    }

    /// Waits until the account's manifest version exceeds `after`.
    pub async fn wait_for_manifest(&self, aci: Uuid, after: u64, wait: Duration) -> ServerResult<u64> {
        let rx = {
            let mut inner = self.inner.lock().unwrap();
            let current = inner.storage.current_version(&aci);
            if current > after {
                return Ok(current);
            }
            let (tx, rx) = oneshot::channel();
            inner.manifest_waiters.entry(aci).or_default().push(tx);
            rx
        };
        match timeout(wait, rx).await {
            Ok(Ok(version)) => Ok(version),
            Ok(Err(_)) | Err(_) => Err(ServerError::QueueTimeout),
        }
    }

    // ========================================================================
    // Usernames
    // ========================================================================

    /// Reserves the first untaken hash of 1..=20 candidates.
    pub fn reserve_username(
        &self,
        auth: &AuthenticatedDevice,
        hashes: &[Vec<u8>],
    ) -> ServerResult<Vec<u8>> {
        if hashes.is_empty() || hashes.len() > 20 {
            return Err(ServerError::Validation(format!(
                "usernameHashes must contain 1..=20 entries, got {}",
                hashes.len()
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        let now = now_secs();
        let reserved_elsewhere: HashSet<Vec<u8>> = inner
            .username_reservations
            .iter()
            .filter(|(aci, r)| **aci != auth.aci && r.expires_at_secs > now)
            .map(|(_, r)| r.hash.clone())
            .collect();

        let chosen = hashes
            .iter()
            .find(|hash| {
                !inner.username_index.contains_key(*hash) && !reserved_elsewhere.contains(*hash)
            })
            .cloned()
            .ok_or(ServerError::UsernameConflict)?;

        inner.username_reservations.insert(
            auth.aci,
            UsernameReservation {
                hash: chosen.clone(),
                expires_at_secs: now + USERNAME_RESERVATION_TTL_SECS,
            },
        );
        Ok(chosen)
    }

    /// Confirms a reservation after verifying the zk proof for the hash.
    pub fn confirm_username(
        &self,
        auth: &AuthenticatedDevice,
        hash: &[u8],
        proof: &[u8],
    ) -> ServerResult<()> {
        let hash_array: [u8; 32] = hash
            .try_into()
            .map_err(|_| ServerError::Validation("username hash must be 32 bytes".into()))?;
        usernames::Username::verify_proof(proof, hash_array)
            .map_err(|_| ServerError::BadSignature)?;

        let mut inner = self.inner.lock().unwrap();
        if inner.username_index.contains_key(hash) {
            return Err(ServerError::UsernameConflict);
        }
        let reservation = inner
            .username_reservations
            .get(&auth.aci)
            .ok_or(ServerError::UsernameConflict)?;
        if reservation.hash != hash || reservation.expires_at_secs < now_secs() {
            return Err(ServerError::UsernameConflict);
        }

        inner.username_reservations.remove(&auth.aci);
        let previous = {
            let account = inner
                .accounts
                .get_mut(&auth.aci)
                .ok_or(ServerError::NotFound("account"))?;
            let previous = account.username_hash.replace(hash.to_vec());
            previous
        };
        if let Some(previous) = previous {
            inner.username_index.remove(&previous);
        }
        inner.username_index.insert(hash.to_vec(), auth.aci);
        Ok(())
    }

    pub fn delete_username(&self, auth: &AuthenticatedDevice) {
        let mut inner = self.inner.lock().unwrap();
        let hash = inner
            .accounts
            .get_mut(&auth.aci)
            .and_then(|a| a.username_hash.take());
        if let Some(hash) = hash {
            inner.username_index.remove(&hash);
        }
    }

    /// ACI lookup by registered username hash.
    pub fn lookup_username(&self, hash: &[u8]) -> Option<Uuid> {
        let inner = self.inner.lock().unwrap();
        inner.username_index.get(hash).copied()
    }

    /// Installs the encrypted username blob and returns a fresh link handle.
    pub fn put_username_link(
        &self,
        auth: &AuthenticatedDevice,
        encrypted_username: Vec<u8>,
    ) -> ServerResult<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        let previous = inner
            .accounts
            .get(&auth.aci)
            .and_then(|a| a.username_link.as_ref())
            .map(|(handle, _)| *handle);
        if let Some(previous) = previous {
            inner.username_links.remove(&previous);
        }

        let handle = Uuid::new_v4();
        let account = inner
            .accounts
            .get_mut(&auth.aci)
            .ok_or(ServerError::NotFound("account"))?;
        account.username_link = Some((handle, encrypted_username));
        inner.username_links.insert(handle, auth.aci);
        Ok(handle)
    }

    pub fn get_username_link(&self, handle: Uuid) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let aci = inner.username_links.get(&handle)?;
        inner
            .accounts
            .get(aci)?
            .username_link
            .as_ref()
            .map(|(_, blob)| blob.clone())
    }

    // ========================================================================
    // Backups and call links
    // ========================================================================

    pub fn set_backup_credential_requests(
        &self,
        auth: &AuthenticatedDevice,
        requests: BackupCredentialRequests,
    ) -> ServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get_mut(&auth.aci)
            .ok_or(ServerError::NotFound("account"))?;
        account.backup_credential_requests = Some(requests);
        Ok(())
    }

    pub fn backup_credential_requests(
        &self,
        auth: &AuthenticatedDevice,
    ) -> ServerResult<BackupCredentialRequests> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&auth.aci)
            .and_then(|a| a.backup_credential_requests.clone())
            .ok_or(ServerError::NotFound("backup id"))
    }

    /// Binds a backup-id public key, keyed by the presentation's backup id.
    pub fn set_backup_key(&self, backup_id: Vec<u8>, public_key: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.backup_keys.insert(backup_id, public_key);
    }

    pub fn backup_key(&self, backup_id: &[u8]) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.backup_keys.get(backup_id).cloned()
    }

    pub fn upsert_call_link(&self, room_id: Vec<u8>, record: CallLinkRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.call_links.insert(room_id, record);
    }

    pub fn call_link(&self, room_id: &[u8]) -> Option<CallLinkRecord> {
        let inner = self.inner.lock().unwrap();
        inner.call_links.get(room_id).cloned()
    }

    pub fn delete_call_link(&self, room_id: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.call_links.get_mut(room_id) {
            Some(record) => {
                record.revoked = true;
                record.deleted_at = Some(now_millis());
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Issues an upload form with a fresh CDN key.
    pub fn create_upload_form(&self) -> crate::attachments::UploadForm {
        let cdn_key = crypto::generate_cdn_key(&mut OsRng);
        let mut inner = self.inner.lock().unwrap();
        inner.issued_upload_keys.insert(cdn_key.clone());
        crate::attachments::UploadForm { cdn_key, cdn_number: 2 }
    }

    /// Stores uploaded bytes under a previously issued CDN key.
    pub fn put_attachment(&self, cdn_key: &str, data: Vec<u8>) -> ServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.issued_upload_keys.remove(cdn_key) {
            return Err(ServerError::NotFound("upload form"));
        }
        inner.cdn.store(cdn_key, data);
        Ok(())
    }

    pub fn get_attachment(&self, cdn_key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.cdn.get(cdn_key).map(|b| b.to_vec())
    }

    // ========================================================================
    // Certificates and profiles
    // ========================================================================

    /// Mints a sender certificate for the authenticated device.
    pub fn sender_certificate(&self, auth: &AuthenticatedDevice) -> ServerResult<Vec<u8>> {
        let identity_bytes = {
            let inner = self.inner.lock().unwrap();
            inner
                .accounts
                .get(&auth.aci)
                .and_then(|a| a.devices.get(&auth.device_id))
                .and_then(|d| d.aci_keys.identity_key.clone())
                .ok_or_else(|| ServerError::Validation("device has no identity key".into()))?
        };
        let identity = PublicKey::deserialize(&identity_bytes)?;
        let certificate = crypto::generate_sender_certificate(
            &self.server_cert,
            auth.aci,
            &auth.e164,
            auth.device_id.into(),
            identity,
            now_millis() + SENDER_CERTIFICATE_LIFETIME_MS,
            &mut OsRng,
        )?;
        Ok(certificate.serialized()?.to_vec())
    }

    pub fn set_profile(
        &self,
        auth: &AuthenticatedDevice,
        profile: VersionedProfile,
    ) -> ServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get_mut(&auth.aci)
            .ok_or(ServerError::NotFound("account"))?;
        account.profile = Some(profile);
        Ok(())
    }

    /// Minimal profile fetch: the account's ACI identity key plus the stored
    /// versioned profile, if any.
    pub fn profile(&self, service_id: &str) -> ServerResult<(Option<Vec<u8>>, Option<VersionedProfile>)> {
        let inner = self.inner.lock().unwrap();
        let account = resolve_account(&inner, service_id).ok_or(ServerError::NotFound("account"))?;
        let identity = account
            .primary()
            .and_then(|d| d.aci_keys.identity_key.clone());
        Ok((identity, account.profile.clone()))
    }

    pub fn profile_commitment(&self, aci: Uuid) -> ServerResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&aci)
            .and_then(|a| a.profile.as_ref())
            .map(|p| p.commitment.clone())
            .ok_or(ServerError::NotFound("profile"))
    }

    /// Harness hook: sets the account's profile key (normally carried in the
    /// provision message, never uploaded in clear by real clients).
    pub fn set_profile_key(&self, aci: Uuid, profile_key: Vec<u8>) -> ServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get_mut(&aci)
            .ok_or(ServerError::NotFound("account"))?;
        account.profile_key = Some(profile_key);
        Ok(())
    }

    /// Device list for `GET /v1/devices`.
    pub fn devices(&self, auth: &AuthenticatedDevice) -> Vec<(u32, Option<String>, u64, u32)> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&auth.aci)
            .map(|account| {
                account
                    .devices
                    .values()
                    .map(|d| (d.device_id, d.name.clone(), d.created_at, d.registration_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Identity material the harness needs when driving a primary device.
    pub fn account_snapshot(&self, aci: Uuid) -> ServerResult<RegisteredDevice> {
        let inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get(&aci)
            .ok_or(ServerError::NotFound("account"))?;
        Ok(RegisteredDevice {
            aci: account.aci,
            pni: account.pni,
            e164: account.e164.clone(),
            device_id: PRIMARY_DEVICE_ID,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// "PNI:uuid" strings select the phone-number identity.
pub fn identity_kind_of(service_id: &str) -> IdentityKind {
    if service_id.starts_with("PNI:") {
        IdentityKind::Pni
    } else {
        IdentityKind::Aci
    }
}

fn resolve_account<'a>(inner: &'a StateInner, service_id: &str) -> Option<&'a Account> {
    if let Some(pni) = service_id.strip_prefix("PNI:") {
        let pni = Uuid::parse_str(pni).ok()?;
        let aci = inner.aci_by_pni.get(&pni)?;
        inner.accounts.get(aci)
    } else {
        let aci = Uuid::parse_str(service_id).ok()?;
        inner.accounts.get(&aci)
    }
}

fn device_mut<'a>(
    inner: &'a mut StateInner,
    aci: Uuid,
    device_id: u32,
) -> ServerResult<&'a mut Device> {
    inner
        .accounts
        .get_mut(&aci)
        .ok_or(ServerError::NotFound("account"))?
        .devices
        .get_mut(&device_id)
        .ok_or(ServerError::NotFound("device"))
}

fn validate_ec_public(bytes: &[u8]) -> ServerResult<()> {
    if bytes.len() != 33 {
        return Err(ServerError::Validation(format!(
            "EC public key must be 33 bytes, got {}",
            bytes.len()
        )));
    }
    PublicKey::deserialize(bytes)
        .map(|_| ())
        .map_err(|_| ServerError::Validation("EC public key unparseable".into()))
}

fn verify_prekey_signature(
    identity: &PublicKey,
    key: &StoredSignedPreKey,
) -> ServerResult<()> {
    if !identity.verify_signature(&key.public_key, &key.signature) {
        return Err(ServerError::BadSignature);
    }
    Ok(())
}

fn install_registration_keys(device: &mut Device, request: &RegistrationRequest) {
    install_flavor(
        &mut device.aci_keys,
        &request.aci_identity_key,
        &request.aci_signed_pre_key,
        &request.aci_pq_last_resort_pre_key,
    );
    install_flavor(
        &mut device.pni_keys,
        &request.pni_identity_key,
        &request.pni_signed_pre_key,
        &request.pni_pq_last_resort_pre_key,
    );
}

fn install_flavor(
    keys: &mut DeviceKeys,
    identity: &Option<Vec<u8>>,
    signed: &Option<StoredSignedPreKey>,
    pq_last_resort: &Option<StoredSignedPreKey>,
) {
    keys.identity_key = identity.clone();
    keys.signed_pre_key = signed.clone();
    keys.pq_last_resort_pre_key = pq_last_resort.clone();
    keys.one_time_keys = VecDeque::new();
    keys.one_time_pq_keys = VecDeque::new();
}
