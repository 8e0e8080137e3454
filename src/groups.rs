//! Group Store
//!
//! Holds zkgroup-encrypted group state keyed by the group's public params
//! (which double as the group id on the wire) plus the ordered log of signed
//! group changes. Member user-ids are uuid ciphertexts under the group's
//! secret params; the server only compares them for equality.

use std::collections::HashMap;

use libsignal_protocol::PrivateKey;
use prost::Message;
use rand::rngs::OsRng;

use crate::error::{ServerError, ServerResult};
use crate::proto::groups::{
    group_change, group_changes::GroupChangeState, Group, GroupChange,
};

/// One group: current state plus its change log.
#[derive(Clone)]
pub struct GroupRecord {
    pub state: Group,
    pub change_log: Vec<GroupChangeState>,
}

/// All groups, keyed by serialized group public params.
#[derive(Default)]
pub struct GroupStore {
    groups: HashMap<Vec<u8>, GroupRecord>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists a new group at version 0. The creator's member presentations
    /// are stripped before storage.
    pub fn create(&mut self, mut group: Group) -> ServerResult<()> {
        let public_key = group
            .public_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServerError::Protocol("group is missing publicKey".into()))?;

        if group.revision.unwrap_or(0) != 0 {
            return Err(ServerError::Validation(
                "new group must start at revision 0".into(),
            ));
        }
        if group.members.is_empty() {
            return Err(ServerError::Validation("new group has no members".into()));
        }
        if self.groups.contains_key(&public_key) {
            return Err(ServerError::Conflict("group already exists".into()));
        }

        group.revision = Some(0);
        for member in &mut group.members {
            member.presentation = None;
            member.joined_at_revision = Some(0);
        }

        self.groups.insert(
            public_key,
            GroupRecord {
                state: group,
                change_log: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, public_key: &[u8]) -> ServerResult<&GroupRecord> {
        self.groups
            .get(public_key)
            .ok_or(ServerError::NotFound("group"))
    }

    /// Applies a well-formed signed change at exactly version current+1 and
    /// returns the server-countersigned change.
    pub fn apply_change(
        &mut self,
        public_key: &[u8],
        change: GroupChange,
        signing_key: &PrivateKey,
    ) -> ServerResult<GroupChange> {
        let record = self
            .groups
            .get_mut(public_key)
            .ok_or(ServerError::NotFound("group"))?;

        let actions_bytes = change
            .actions
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ServerError::Protocol("group change has no actions".into()))?;
        let actions = group_change::Actions::decode(actions_bytes.as_slice())?;

        let current = record.state.revision.unwrap_or(0);
        let proposed = actions
            .revision
            .ok_or_else(|| ServerError::Protocol("group change has no revision".into()))?;
        if proposed != current + 1 {
            return Err(ServerError::Conflict(format!(
                "group change revision {} does not follow current revision {}",
                proposed, current
            )));
        }

        apply_actions(&mut record.state, &actions, proposed);
        record.state.revision = Some(proposed);

        let server_signature = signing_key
            .calculate_signature(&actions_bytes, &mut OsRng)?
            .into_vec();
        let signed = GroupChange {
            actions: Some(actions_bytes),
            server_signature: Some(server_signature),
            change_epoch: change.change_epoch,
        };

        record.change_log.push(GroupChangeState {
            group_change: Some(signed.clone()),
            group_state: Some(record.state.clone()),
        });

        Ok(signed)
    }

    /// Change log entries with revision >= `from_version`, in order.
    pub fn logs(&self, public_key: &[u8], from_version: u32) -> ServerResult<Vec<GroupChangeState>> {
        let record = self.get(public_key)?;
        Ok(record
            .change_log
            .iter()
            .filter(|entry| {
                entry
                    .group_state
                    .as_ref()
                    .and_then(|s| s.revision)
                    .unwrap_or(0)
                    >= from_version
            })
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn apply_actions(state: &mut Group, actions: &group_change::Actions, revision: u32) {
    for add in &actions.add_members {
        if let Some(mut member) = add.added.clone() {
            member.presentation = None;
            member.joined_at_revision = Some(revision);
            let exists = state
                .members
                .iter()
                .any(|m| m.user_id == member.user_id);
            if !exists {
                state.members.push(member);
            }
        }
    }

    for delete in &actions.delete_members {
        if let Some(user_id) = &delete.deleted_user_id {
            state
                .members
                .retain(|m| m.user_id.as_ref() != Some(user_id));
        }
    }

    if let Some(modify) = &actions.modify_title {
        state.title = modify.title.clone();
    }
}
