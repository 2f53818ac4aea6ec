use serde::{Deserialize, Serialize};

/// Which chat platform an event originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Discord,
    Stoat,
}

impl Platform {
    /// The relay direction for events that originate on this platform.
    pub fn mirror_direction(self) -> Direction {
        match self {
            Platform::Discord => Direction::DiscordToStoat,
            Platform::Stoat => Direction::StoatToDiscord,
        }
    }
}

/// Relay direction, dispatched once at the entry point. Everything downstream
/// matches on this instead of re-checking source-platform flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    DiscordToStoat,
    StoatToDiscord,
}

impl Direction {
    pub fn source(self) -> Platform {
        match self {
            Direction::DiscordToStoat => Platform::Discord,
            Direction::StoatToDiscord => Platform::Stoat,
        }
    }

    pub fn destination(self) -> Platform {
        match self {
            Direction::DiscordToStoat => Platform::Stoat,
            Direction::StoatToDiscord => Platform::Discord,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MentionKind {
    User,
    Role,
}

/// A resolved mention entity delivered alongside an inbound message.
/// Ids that the platform layer could not resolve simply produce no entity;
/// the transcoder then leaves the raw token untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionEntity {
    pub id: String,
    pub name: String,
    pub kind: MentionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
    pub url: String,
}

/// A decoded create/update message event, platform-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
    pub content: String,
    pub mentions: Vec<MentionEntity>,
    pub attachments: Vec<AttachmentRef>,
    /// Set when the message was delivered through a webhook (Discord only).
    pub webhook_id: Option<String>,
    /// The application owning the webhook, when the platform reports one.
    pub application_id: Option<String>,
}

/// The single internal event type both platform gateways feed into the
/// bridge dispatcher. Delete events carry only the minimal id pair.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    Create {
        platform: Platform,
        message: InboundMessage,
    },
    Update {
        platform: Platform,
        message: InboundMessage,
    },
    Delete {
        platform: Platform,
        channel_id: String,
        message_id: String,
    },
}

impl MirrorEvent {
    pub fn platform(&self) -> Platform {
        match self {
            MirrorEvent::Create { platform, .. }
            | MirrorEvent::Update { platform, .. }
            | MirrorEvent::Delete { platform, .. } => *platform,
        }
    }
}
