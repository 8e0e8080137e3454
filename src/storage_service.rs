//! Storage Service
//!
//! Per-account encrypted key/value store arbitrated by a strictly monotonic
//! manifest version. Writes are atomic: a stale manifest version rejects the
//! whole operation and hands back the current manifest for the client to
//! rebase on.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::proto::storage::{StorageItem, StorageManifest, WriteOperation};

/// One account's storage: current manifest plus the item map.
#[derive(Default)]
pub struct StorageRecord {
    pub manifest: Option<StorageManifest>,
    pub items: HashMap<Vec<u8>, Vec<u8>>,
}

/// Storage records for every account that has written one, keyed by ACI.
#[derive(Default)]
pub struct StorageStore {
    by_account: HashMap<Uuid, StorageRecord>,
}

impl StorageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_version(&self, aci: &Uuid) -> u64 {
        self.by_account
            .get(aci)
            .and_then(|r| r.manifest.as_ref())
            .and_then(|m| m.version)
            .unwrap_or(0)
    }

    /// Returns the manifest if its version is strictly greater than `after`.
    pub fn manifest_if_newer(&self, aci: &Uuid, after: u64) -> Option<StorageManifest> {
        let manifest = self.by_account.get(aci)?.manifest.clone()?;
        if manifest.version.unwrap_or(0) > after {
            Some(manifest)
        } else {
            None
        }
    }

    /// Reads the requested keys; absent keys are silently skipped.
    pub fn read(&self, aci: &Uuid, keys: &[Vec<u8>]) -> Vec<StorageItem> {
        let Some(record) = self.by_account.get(aci) else {
            return Vec::new();
        };
        keys.iter()
            .filter_map(|key| {
                record.items.get(key).map(|value| StorageItem {
                    key: Some(key.clone()),
                    value: Some(value.clone()),
                })
            })
            .collect()
    }

    /// Applies a write operation atomically. Fails with the current manifest
    /// if the submitted version does not exceed it.
    pub fn write(&mut self, aci: &Uuid, op: WriteOperation) -> ServerResult<u64> {
        let manifest = op
            .manifest
            .ok_or_else(|| ServerError::Protocol("write operation has no manifest".into()))?;
        let version = manifest
            .version
            .ok_or_else(|| ServerError::Protocol("manifest has no version".into()))?;

        let record = self.by_account.entry(*aci).or_default();
        let current = record
            .manifest
            .as_ref()
            .and_then(|m| m.version)
            .unwrap_or(0);

        if version <= current {
            let current_manifest = record
                .manifest
                .clone()
                .expect("current version > 0 implies a manifest");
            return Err(ServerError::StorageConflict {
                current_manifest: prost::Message::encode_to_vec(&current_manifest),
            });
        }

        // Validate every insert before touching the record so a malformed
        // operation leaves no partial state.
        let mut inserts = Vec::with_capacity(op.insert_item.len());
        for item in op.insert_item {
            let (Some(key), Some(value)) = (item.key, item.value) else {
                return Err(ServerError::Protocol("insert item missing key or value".into()));
            };
            inserts.push((key, value));
        }

        if op.clear_all.unwrap_or(false) {
            record.items.clear();
        }
        for key in op.delete_key {
            record.items.remove(&key);
        }
        for (key, value) in inserts {
            record.items.insert(key, value);
        }

        record.manifest = Some(manifest);
        Ok(version)
    }

    pub fn item_count(&self, aci: &Uuid) -> usize {
        self.by_account.get(aci).map(|r| r.items.len()).unwrap_or(0)
    }
}
