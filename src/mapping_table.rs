use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::bridge::event::Platform;

/// One successfully cross-posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredMessage {
    pub source_platform: Platform,
    pub source_channel_id: String,
    pub source_message_id: String,
    pub destination_channel_id: String,
    pub destination_message_id: String,
    pub created_at: DateTime<Utc>,
}

/// Lookup key for a mirrored message, shaped by where the source ids are
/// unique: Stoat message ids are globally unique, Discord message ids are
/// only treated as unique within their channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Stoat {
        message_id: String,
    },
    Discord {
        channel_id: String,
        message_id: String,
    },
}

impl MirroredMessage {
    pub fn source_key(&self) -> SourceKey {
        match self.source_platform {
            Platform::Stoat => SourceKey::Stoat {
                message_id: self.source_message_id.clone(),
            },
            Platform::Discord => SourceKey::Discord {
                channel_id: self.source_channel_id.clone(),
                message_id: self.source_message_id.clone(),
            },
        }
    }
}

/// In-memory table resolving a source message to its mirrored counterpart.
/// The upstream event stream is canonical; nothing here is persisted.
/// Operations on distinct keys may run from concurrent relay tasks.
#[derive(Default)]
pub struct IdentityMappingTable {
    stoat_sourced: RwLock<HashMap<String, MirroredMessage>>,
    discord_sourced: RwLock<HashMap<(String, String), MirroredMessage>>,
}

impl IdentityMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly relayed message. Source platforms never reuse
    /// message ids, so this is a plain insert.
    pub fn record(&self, record: MirroredMessage) {
        match record.source_platform {
            Platform::Stoat => {
                self.stoat_sourced
                    .write()
                    .insert(record.source_message_id.clone(), record);
            }
            Platform::Discord => {
                let key = (
                    record.source_channel_id.clone(),
                    record.source_message_id.clone(),
                );
                self.discord_sourced.write().insert(key, record);
            }
        }
    }

    pub fn lookup(&self, key: &SourceKey) -> Option<MirroredMessage> {
        match key {
            SourceKey::Stoat { message_id } => self.stoat_sourced.read().get(message_id).cloned(),
            SourceKey::Discord {
                channel_id,
                message_id,
            } => self
                .discord_sourced
                .read()
                .get(&(channel_id.clone(), message_id.clone()))
                .cloned(),
        }
    }

    pub fn remove(&self, key: &SourceKey) -> Option<MirroredMessage> {
        match key {
            SourceKey::Stoat { message_id } => self.stoat_sourced.write().remove(message_id),
            SourceKey::Discord {
                channel_id,
                message_id,
            } => self
                .discord_sourced
                .write()
                .remove(&(channel_id.clone(), message_id.clone())),
        }
    }

    pub fn len(&self) -> usize {
        self.stoat_sourced.read().len() + self.discord_sourced.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops records created before `cutoff`. Retention is hygiene only;
    /// correctness never depends on a record expiring.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        {
            let mut map = self.stoat_sourced.write();
            let before = map.len();
            map.retain(|_, record| record.created_at >= cutoff);
            pruned += before - map.len();
        }
        {
            let mut map = self.discord_sourced.write();
            let before = map.len();
            map.retain(|_, record| record.created_at >= cutoff);
            pruned += before - map.len();
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(platform: Platform, channel: &str, message: &str, dest: &str) -> MirroredMessage {
        MirroredMessage {
            source_platform: platform,
            source_channel_id: channel.to_string(),
            source_message_id: message.to_string(),
            destination_channel_id: "dest-chan".to_string(),
            destination_message_id: dest.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stoat_records_are_keyed_by_message_id_alone() {
        let table = IdentityMappingTable::new();
        table.record(record(Platform::Stoat, "s-chan", "s-msg", "d-msg"));

        let found = table
            .lookup(&SourceKey::Stoat {
                message_id: "s-msg".to_string(),
            })
            .expect("record present");
        assert_eq!(found.destination_message_id, "d-msg");
    }

    #[test]
    fn discord_records_do_not_collide_across_channels() {
        let table = IdentityMappingTable::new();
        table.record(record(Platform::Discord, "chan-a", "42", "s-msg-a"));
        table.record(record(Platform::Discord, "chan-b", "42", "s-msg-b"));

        let a = table
            .lookup(&SourceKey::Discord {
                channel_id: "chan-a".to_string(),
                message_id: "42".to_string(),
            })
            .expect("chan-a record");
        let b = table
            .lookup(&SourceKey::Discord {
                channel_id: "chan-b".to_string(),
                message_id: "42".to_string(),
            })
            .expect("chan-b record");
        assert_eq!(a.destination_message_id, "s-msg-a");
        assert_eq!(b.destination_message_id, "s-msg-b");
    }

    #[test]
    fn lookup_returns_none_for_unknown_keys() {
        let table = IdentityMappingTable::new();
        assert!(table
            .lookup(&SourceKey::Stoat {
                message_id: "missing".to_string(),
            })
            .is_none());
    }

    #[test]
    fn remove_deletes_exactly_one_record() {
        let table = IdentityMappingTable::new();
        let first = record(Platform::Stoat, "s-chan", "one", "d-one");
        let second = record(Platform::Stoat, "s-chan", "two", "d-two");
        table.record(first.clone());
        table.record(second);

        let removed = table.remove(&first.source_key()).expect("removed");
        assert_eq!(removed.destination_message_id, "d-one");
        assert_eq!(table.len(), 1);
        assert!(table.lookup(&first.source_key()).is_none());
    }

    #[test]
    fn prune_drops_only_expired_records() {
        let table = IdentityMappingTable::new();
        let mut old = record(Platform::Discord, "chan", "old", "d-old");
        old.created_at = Utc::now() - Duration::days(60);
        table.record(old);
        table.record(record(Platform::Stoat, "chan", "fresh", "d-fresh"));

        let pruned = table.prune_older_than(Utc::now() - Duration::days(30));

        assert_eq!(pruned, 1);
        assert_eq!(table.len(), 1);
        assert!(table
            .lookup(&SourceKey::Stoat {
                message_id: "fresh".to_string(),
            })
            .is_some());
    }
}
