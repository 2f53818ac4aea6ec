use std::sync::Arc;

use tracing::error;

use crate::mappings::ChannelMappingStore;

const NO_PERMISSION: &str = "❌ You must be an administrator to use this command.";
const SYNC_FAILED: &str = "❌ Failed to sync channels. Please check the logs.";
const UNSYNC_FAILED: &str = "❌ Failed to unsync channels. Please check the logs.";

/// A parsed admin command, independent of the interaction SDK types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    Sync { stoat_id: String },
    Unsync,
    Status,
}

impl SyncCommand {
    /// Maps a slash-command name (plus its `stoatid` option, when present)
    /// to a command. Unknown names are ignored.
    pub fn parse(name: &str, stoat_id: Option<String>) -> Option<Self> {
        match name {
            "sync-channel" => Some(SyncCommand::Sync {
                stoat_id: stoat_id?,
            }),
            "unsync-channel" => Some(SyncCommand::Unsync),
            "is-synced" => Some(SyncCommand::Status),
            _ => None,
        }
    }
}

/// Executes admin commands against the channel mapping store and produces
/// the user-visible reply. Internal errors never escape: they are logged and
/// reported as a generic failure notice.
pub struct SyncCommandHandler {
    store: Arc<ChannelMappingStore>,
}

impl SyncCommandHandler {
    pub fn new(store: Arc<ChannelMappingStore>) -> Self {
        Self { store }
    }

    pub fn handle(
        &self,
        command: SyncCommand,
        discord_channel_id: &str,
        is_admin: bool,
    ) -> String {
        match command {
            SyncCommand::Sync { stoat_id } => {
                if !is_admin {
                    return NO_PERMISSION.to_string();
                }
                match self.store.add(discord_channel_id, &stoat_id) {
                    Ok(()) => format!(
                        "✅ Successfully synced this Discord channel with Stoat Channel ID: `{}`",
                        stoat_id
                    ),
                    Err(err) => {
                        error!(
                            "failed to sync channel {} to {}: {}",
                            discord_channel_id, stoat_id, err
                        );
                        SYNC_FAILED.to_string()
                    }
                }
            }
            SyncCommand::Unsync => {
                if !is_admin {
                    return NO_PERMISSION.to_string();
                }
                match self.store.remove(discord_channel_id) {
                    Ok(_) => {
                        "✅ Successfully unsynced this Discord channel from its Stoat channel."
                            .to_string()
                    }
                    Err(err) => {
                        error!("failed to unsync channel {}: {}", discord_channel_id, err);
                        UNSYNC_FAILED.to_string()
                    }
                }
            }
            SyncCommand::Status => match self.store.stoat_for_discord(discord_channel_id) {
                Some(stoat_id) => format!(
                    "✅ This channel is synced with Stoat Channel ID: `{}`",
                    stoat_id
                ),
                None => {
                    "ℹ️ This channel is not currently synced with any Stoat channel.".to_string()
                }
            },
        }
    }
}
