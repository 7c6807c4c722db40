// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only view of who else is present on a channel.

use std::collections::BTreeMap;

use livesync_core::{PresenceMessage, PresenceRecord};

/// `(user_id, presence_ref)`; records without a ref share the empty ref.
type MemberKey = (String, String);

fn member_key(record: &PresenceRecord) -> MemberKey {
    (
        record.user_id.clone(),
        record.presence_ref.clone().unwrap_or_default(),
    )
}

/// Presence records keyed by user and connection, excluding the local user.
///
/// A user with several connections stays listed until the last one leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    self_id: String,
    members: BTreeMap<MemberKey, PresenceRecord>,
}

impl Roster {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            members: BTreeMap::new(),
        }
    }

    /// Apply one presence message. `sync` replaces the roster, `join`
    /// upserts and `leave` removes the connections it names.
    pub fn apply(&mut self, message: &PresenceMessage) {
        match message {
            PresenceMessage::Sync(records) => {
                self.members.clear();
                self.insert_all(records);
            }
            PresenceMessage::Join(records) => self.insert_all(records),
            PresenceMessage::Leave(records) => {
                for record in records {
                    self.members.remove(&member_key(record));
                }
            }
        }
    }

    fn insert_all(&mut self, records: &[PresenceRecord]) {
        for record in records {
            if record.user_id != self.self_id {
                self.members.insert(member_key(record), record.clone());
            }
        }
    }

    /// One record per user, keeping each user's most recently seen
    /// connection.
    fn per_user<'a>(records: impl Iterator<Item = &'a PresenceRecord>) -> Vec<PresenceRecord> {
        let mut users: BTreeMap<&str, &PresenceRecord> = BTreeMap::new();
        for record in records {
            users
                .entry(record.user_id.as_str())
                .and_modify(|kept| {
                    if record.last_seen > kept.last_seen {
                        *kept = record;
                    }
                })
                .or_insert(record);
        }
        users.into_values().cloned().collect()
    }

    /// Everyone present except the local user, ordered by user id.
    pub fn others(&self) -> Vec<PresenceRecord> {
        Self::per_user(self.members.values())
    }

    /// Peers with a connection currently viewing `entity_id`.
    pub fn viewing(&self, entity_id: &str) -> Vec<PresenceRecord> {
        Self::per_user(
            self.members
                .values()
                .filter(|r| r.viewing_entity_id.as_deref() == Some(entity_id)),
        )
    }

    /// Number of distinct users present.
    pub fn len(&self) -> usize {
        self.others().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
