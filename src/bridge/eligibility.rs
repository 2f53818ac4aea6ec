use crate::mappings::ChannelIndexes;

use super::event::{Direction, InboundMessage};

/// Account id of the external restore bot. Its messages are replayed history
/// and must never be mirrored, independent of any configuration.
pub const RESTORE_BOT_SENTINEL_ID: &str = "01KH706FEP6ZVDTD0Y99W3FVEZ";

/// The bridge's own identities on both platforms, used to break relay loops.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub discord_application_id: String,
    pub stoat_bot_id: String,
}

/// A channel is mirrored iff it appears in the index for its direction.
pub fn should_mirror(indexes: &ChannelIndexes, direction: Direction, channel_id: &str) -> bool {
    match direction {
        Direction::DiscordToStoat => indexes.forward.contains_key(channel_id),
        Direction::StoatToDiscord => indexes.reverse.contains_key(channel_id),
    }
}

/// True when the message is one of our own, relayed back to us by the source
/// platform. On Discord our messages are sent through managed webhooks, so a
/// webhook message whose owning application is us counts as self-originated.
pub fn is_self_originated(
    identity: &BotIdentity,
    direction: Direction,
    message: &InboundMessage,
) -> bool {
    match direction {
        Direction::StoatToDiscord => {
            message.author_id == identity.stoat_bot_id
                || message.author_id == RESTORE_BOT_SENTINEL_ID
        }
        Direction::DiscordToStoat => {
            if message.author_id == identity.discord_application_id {
                return true;
            }
            message.webhook_id.is_some()
                && message.application_id.as_deref()
                    == Some(identity.discord_application_id.as_str())
        }
    }
}
