use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, IdentityConfig};
use crate::mapping_table::{IdentityMappingTable, MirroredMessage, SourceKey};
use crate::mappings::{ChannelIndexes, ChannelMappingStore};
use crate::media::{check_discord_file_size, check_stoat_file_size, MediaFetcher, MediaInfo};
use crate::parsers;

pub mod eligibility;
pub mod event;

pub use self::eligibility::{
    is_self_originated, should_mirror, BotIdentity, RESTORE_BOT_SENTINEL_ID,
};
pub use self::event::{
    AttachmentRef, Direction, InboundMessage, MentionEntity, MentionKind, MirrorEvent, Platform,
};

const PRUNE_INTERVAL_SECS: u64 = 3600;
const DISCORD_AUTHOR_FALLBACK: &str = "Discord User";
const STOAT_AUTHOR_FALLBACK: &str = "Stoat User";

/// A message ready for webhook delivery on Discord, with its per-call
/// identity override and relayed attachment bytes.
#[derive(Debug, Clone)]
pub struct OutboundDiscordMessage {
    pub content: String,
    pub username: String,
    pub avatar_url: String,
    pub files: Vec<MediaInfo>,
}

#[derive(Debug, Clone)]
pub struct Masquerade {
    pub name: String,
    pub avatar: String,
}

/// A message ready for delivery on Stoat, masqueraded as the original
/// author, with already-uploaded attachment ids.
#[derive(Debug, Clone)]
pub struct OutboundStoatMessage {
    pub content: String,
    pub masquerade: Masquerade,
    pub attachments: Vec<String>,
}

/// Destination-side delivery on Discord. Implementations own webhook
/// acquisition; a missing or unobtainable webhook surfaces as a send error.
#[async_trait]
pub trait DiscordSink: Send + Sync {
    async fn send_message(
        &self,
        channel_id: &str,
        outbound: OutboundDiscordMessage,
    ) -> Result<String>;
    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;
}

/// Destination-side delivery on Stoat, plus attachment uploads to its file
/// store.
#[async_trait]
pub trait StoatSink: Send + Sync {
    async fn send_message(
        &self,
        channel_id: &str,
        outbound: OutboundStoatMessage,
    ) -> Result<String>;
    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;
    async fn upload_attachment(&self, media: &MediaInfo) -> Result<String>;
}

/// The relay orchestrator. Owns the identity mapping table and composes
/// eligibility filtering, transcoding, attachment relay, and delivery for
/// both directions. Every operation is a short-lived, per-message
/// transaction; failures are logged and never escape to the caller's task.
pub struct BridgeCore {
    identity: BotIdentity,
    identity_config: IdentityConfig,
    retention: chrono::Duration,
    store: Arc<ChannelMappingStore>,
    messages: IdentityMappingTable,
    media: Arc<dyn MediaFetcher>,
    discord: Arc<dyn DiscordSink>,
    stoat: Arc<dyn StoatSink>,
}

impl BridgeCore {
    pub fn new(
        config: &Config,
        store: Arc<ChannelMappingStore>,
        media: Arc<dyn MediaFetcher>,
        discord: Arc<dyn DiscordSink>,
        stoat: Arc<dyn StoatSink>,
    ) -> Self {
        Self {
            identity: BotIdentity {
                discord_application_id: config.bridge.discord_bot_id.clone(),
                stoat_bot_id: config.bridge.stoat_bot_id.clone(),
            },
            identity_config: config.identity.clone(),
            retention: chrono::Duration::days(config.limits.mapping_retention_days),
            store,
            messages: IdentityMappingTable::new(),
            media,
            discord,
            stoat,
        }
    }

    pub fn mappings(&self) -> Arc<ChannelMappingStore> {
        self.store.clone()
    }

    /// Periodic housekeeping: prune identity-mapping records past the
    /// retention window. Relay work happens on the platform event tasks.
    pub async fn start(&self) -> Result<()> {
        info!("bridge core started");
        let mut ticker = tokio::time::interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - self.retention;
            let pruned = self.messages.prune_older_than(cutoff);
            if pruned > 0 {
                info!("pruned {} expired message mappings", pruned);
            }
        }
    }

    /// Single dispatch point for both platform gateways.
    pub async fn handle_event(&self, event: MirrorEvent) -> Result<()> {
        match event {
            MirrorEvent::Create { platform, message } => {
                self.relay_create(platform.mirror_direction(), &message)
                    .await?;
            }
            MirrorEvent::Update { platform, message } => {
                self.relay_edit(platform.mirror_direction(), &message)
                    .await?;
            }
            MirrorEvent::Delete {
                platform,
                channel_id,
                message_id,
            } => {
                self.relay_delete(platform.mirror_direction(), &channel_id, &message_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Mirrors a newly created message. Returns the destination message id,
    /// or `None` when the event was skipped or delivery failed. A failed
    /// create records no mapping and is never retried.
    pub async fn relay_create(
        &self,
        direction: Direction,
        message: &InboundMessage,
    ) -> Result<Option<String>> {
        let indexes = self.store.snapshot();
        if !should_mirror(&indexes, direction, &message.channel_id) {
            debug!(
                "skipping create in unmapped channel {} ({:?})",
                message.channel_id, direction
            );
            return Ok(None);
        }
        if is_self_originated(&self.identity, direction, message) {
            debug!(
                "skipping self-originated message {} in {}",
                message.message_id, message.channel_id
            );
            return Ok(None);
        }
        let Some(destination_channel_id) =
            destination_channel(&indexes, direction, &message.channel_id)
        else {
            error!(
                "no destination channel resolvable for {} ({:?})",
                message.channel_id, direction
            );
            return Ok(None);
        };

        match direction {
            Direction::DiscordToStoat => {
                let attachments = self.relay_attachments_to_stoat(message).await;
                let content =
                    parsers::format_for_stoat(&message.content, &message.mentions, &indexes);
                let outbound = OutboundStoatMessage {
                    content,
                    masquerade: Masquerade {
                        name: message
                            .author_name
                            .clone()
                            .unwrap_or_else(|| DISCORD_AUTHOR_FALLBACK.to_string()),
                        avatar: self.resolve_avatar(
                            &destination_channel_id,
                            message.author_avatar.as_deref(),
                        ),
                    },
                    attachments,
                };
                match self
                    .stoat
                    .send_message(&destination_channel_id, outbound)
                    .await
                {
                    Ok(destination_message_id) => {
                        self.record_mirrored(
                            direction,
                            message,
                            &destination_channel_id,
                            &destination_message_id,
                        );
                        Ok(Some(destination_message_id))
                    }
                    Err(err) => {
                        error!(
                            "failed to relay discord message {} to stoat channel {}: {}",
                            message.message_id, destination_channel_id, err
                        );
                        Ok(None)
                    }
                }
            }
            Direction::StoatToDiscord => {
                let files = self.relay_attachments_to_discord(message).await;
                let content =
                    parsers::format_for_discord(&message.content, &message.mentions, &indexes);
                let outbound = OutboundDiscordMessage {
                    content,
                    username: message
                        .author_name
                        .clone()
                        .unwrap_or_else(|| STOAT_AUTHOR_FALLBACK.to_string()),
                    avatar_url: self
                        .resolve_avatar(&destination_channel_id, message.author_avatar.as_deref()),
                    files,
                };
                match self
                    .discord
                    .send_message(&destination_channel_id, outbound)
                    .await
                {
                    Ok(destination_message_id) => {
                        self.record_mirrored(
                            direction,
                            message,
                            &destination_channel_id,
                            &destination_message_id,
                        );
                        Ok(Some(destination_message_id))
                    }
                    Err(err) => {
                        error!(
                            "failed to relay stoat message {} to discord channel {}: {}",
                            message.message_id, destination_channel_id, err
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Propagates an edit to the mirrored counterpart. A source message that
    /// was never mirrored (predates mirroring, or its create failed) is a
    /// silent no-op.
    pub async fn relay_edit(&self, direction: Direction, message: &InboundMessage) -> Result<()> {
        let indexes = self.store.snapshot();
        if !should_mirror(&indexes, direction, &message.channel_id) {
            return Ok(());
        }
        if is_self_originated(&self.identity, direction, message) {
            return Ok(());
        }
        let key = source_key(direction, &message.channel_id, &message.message_id);
        let Some(record) = self.messages.lookup(&key) else {
            debug!(
                "no mirror mapping for edited message {}, skipping",
                message.message_id
            );
            return Ok(());
        };

        let result = match direction {
            Direction::DiscordToStoat => {
                let content =
                    parsers::format_for_stoat(&message.content, &message.mentions, &indexes);
                self.stoat
                    .edit_message(
                        &record.destination_channel_id,
                        &record.destination_message_id,
                        &content,
                    )
                    .await
            }
            Direction::StoatToDiscord => {
                let content =
                    parsers::format_for_discord(&message.content, &message.mentions, &indexes);
                self.discord
                    .edit_message(
                        &record.destination_channel_id,
                        &record.destination_message_id,
                        &content,
                    )
                    .await
            }
        };
        if let Err(err) = result {
            error!(
                "failed to edit mirrored message {} in channel {}: {}",
                record.destination_message_id, record.destination_channel_id, err
            );
        }
        Ok(())
    }

    /// Propagates a delete. The mapping record is removed only after the
    /// destination confirms the delete; on failure the record stays so a
    /// later retry or operator resync can still find it.
    pub async fn relay_delete(
        &self,
        direction: Direction,
        channel_id: &str,
        message_id: &str,
    ) -> Result<()> {
        let indexes = self.store.snapshot();
        if !should_mirror(&indexes, direction, channel_id) {
            return Ok(());
        }
        let key = source_key(direction, channel_id, message_id);
        let Some(record) = self.messages.lookup(&key) else {
            return Ok(());
        };

        let result = match direction {
            Direction::DiscordToStoat => {
                self.stoat
                    .delete_message(
                        &record.destination_channel_id,
                        &record.destination_message_id,
                    )
                    .await
            }
            Direction::StoatToDiscord => {
                self.discord
                    .delete_message(
                        &record.destination_channel_id,
                        &record.destination_message_id,
                    )
                    .await
            }
        };
        match result {
            Ok(()) => {
                self.messages.remove(&key);
            }
            Err(err) => {
                error!(
                    "failed to delete mirrored message {} in channel {}: {} (mapping kept)",
                    record.destination_message_id, record.destination_channel_id, err
                );
            }
        }
        Ok(())
    }

    /// Downloads each attachment and uploads it to the Stoat file store.
    /// A failing attachment is logged and dropped; the rest still relay.
    async fn relay_attachments_to_stoat(&self, message: &InboundMessage) -> Vec<String> {
        let mut attachment_ids = Vec::new();
        for attachment in &message.attachments {
            let media = match self.media.fetch(&attachment.url, &attachment.filename).await {
                Ok(media) => media,
                Err(err) => {
                    warn!(
                        "failed to download attachment {}: {}",
                        attachment.filename, err
                    );
                    continue;
                }
            };
            if let Err(err) = check_stoat_file_size(media.size) {
                warn!("dropping attachment {}: {}", attachment.filename, err);
                continue;
            }
            match self.stoat.upload_attachment(&media).await {
                Ok(id) => attachment_ids.push(id),
                Err(err) => {
                    warn!(
                        "failed to upload attachment {} to stoat: {}",
                        attachment.filename, err
                    );
                }
            }
        }
        attachment_ids
    }

    async fn relay_attachments_to_discord(&self, message: &InboundMessage) -> Vec<MediaInfo> {
        let mut files = Vec::new();
        for attachment in &message.attachments {
            match self.media.fetch(&attachment.url, &attachment.filename).await {
                Ok(media) => {
                    if let Err(err) = check_discord_file_size(media.size) {
                        warn!("dropping attachment {}: {}", attachment.filename, err);
                        continue;
                    }
                    files.push(media);
                }
                Err(err) => {
                    warn!(
                        "failed to download attachment {}: {}",
                        attachment.filename, err
                    );
                }
            }
        }
        files
    }

    /// Avatar precedence: channel-specific override, then the author's
    /// profile avatar from the event, then the static default.
    fn resolve_avatar(&self, destination_channel_id: &str, author_avatar: Option<&str>) -> String {
        if let Some(url) = self
            .identity_config
            .channel_avatars
            .get(destination_channel_id)
        {
            return url.clone();
        }
        if let Some(url) = author_avatar {
            return url.to_string();
        }
        self.identity_config.default_avatar.clone()
    }

    fn record_mirrored(
        &self,
        direction: Direction,
        message: &InboundMessage,
        destination_channel_id: &str,
        destination_message_id: &str,
    ) {
        self.messages.record(MirroredMessage {
            source_platform: direction.source(),
            source_channel_id: message.channel_id.clone(),
            source_message_id: message.message_id.clone(),
            destination_channel_id: destination_channel_id.to_string(),
            destination_message_id: destination_message_id.to_string(),
            created_at: Utc::now(),
        });
    }
}

fn destination_channel(
    indexes: &ChannelIndexes,
    direction: Direction,
    channel_id: &str,
) -> Option<String> {
    match direction {
        Direction::DiscordToStoat => indexes.forward.get(channel_id).cloned(),
        Direction::StoatToDiscord => indexes.reverse.get(channel_id).cloned(),
    }
}

fn source_key(direction: Direction, channel_id: &str, message_id: &str) -> SourceKey {
    match direction {
        Direction::DiscordToStoat => SourceKey::Discord {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        },
        Direction::StoatToDiscord => SourceKey::Stoat {
            message_id: message_id.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::anyhow;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use crate::config::{
        AuthConfig, BridgeConfig, Config, IdentityConfig, LimitsConfig, LoggingConfig,
        MappingsConfig, StoatConfig,
    };

    const DISCORD_CHANNEL: &str = "123456789";
    const STOAT_CHANNEL: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[derive(Default)]
    struct MockDiscordSink {
        sent: Mutex<Vec<(String, OutboundDiscordMessage)>>,
        edits: Mutex<Vec<(String, String, String)>>,
        deletes: Mutex<Vec<(String, String)>>,
        fail_send: bool,
        fail_delete: bool,
    }

    #[async_trait]
    impl DiscordSink for MockDiscordSink {
        async fn send_message(
            &self,
            channel_id: &str,
            outbound: OutboundDiscordMessage,
        ) -> Result<String> {
            if self.fail_send {
                return Err(anyhow!("discord rejected the send"));
            }
            let mut sent = self.sent.lock();
            sent.push((channel_id.to_string(), outbound));
            Ok(format!("d-msg-{}", sent.len()))
        }

        async fn edit_message(
            &self,
            channel_id: &str,
            message_id: &str,
            content: &str,
        ) -> Result<()> {
            self.edits.lock().push((
                channel_id.to_string(),
                message_id.to_string(),
                content.to_string(),
            ));
            Ok(())
        }

        async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(anyhow!("discord rejected the delete"));
            }
            self.deletes
                .lock()
                .push((channel_id.to_string(), message_id.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockStoatSink {
        sent: Mutex<Vec<(String, OutboundStoatMessage)>>,
        edits: Mutex<Vec<(String, String, String)>>,
        deletes: Mutex<Vec<(String, String)>>,
        uploads: Mutex<Vec<String>>,
        fail_send: bool,
        fail_delete: bool,
    }

    #[async_trait]
    impl StoatSink for MockStoatSink {
        async fn send_message(
            &self,
            channel_id: &str,
            outbound: OutboundStoatMessage,
        ) -> Result<String> {
            if self.fail_send {
                return Err(anyhow!("stoat rejected the send"));
            }
            let mut sent = self.sent.lock();
            sent.push((channel_id.to_string(), outbound));
            Ok(format!("s-msg-{}", sent.len()))
        }

        async fn edit_message(
            &self,
            channel_id: &str,
            message_id: &str,
            content: &str,
        ) -> Result<()> {
            self.edits.lock().push((
                channel_id.to_string(),
                message_id.to_string(),
                content.to_string(),
            ));
            Ok(())
        }

        async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(anyhow!("stoat rejected the delete"));
            }
            self.deletes
                .lock()
                .push((channel_id.to_string(), message_id.to_string()));
            Ok(())
        }

        async fn upload_attachment(&self, media: &MediaInfo) -> Result<String> {
            let mut uploads = self.uploads.lock();
            uploads.push(media.filename.clone());
            Ok(format!("autumn-{}", uploads.len()))
        }
    }

    #[derive(Default)]
    struct MockMediaFetcher {
        fail_urls: HashSet<String>,
    }

    #[async_trait]
    impl MediaFetcher for MockMediaFetcher {
        async fn fetch(&self, url: &str, filename: &str) -> Result<MediaInfo> {
            if self.fail_urls.contains(url) {
                return Err(anyhow!("download failed for {}", url));
            }
            Ok(MediaInfo {
                data: vec![1, 2, 3],
                content_type: "application/octet-stream".to_string(),
                filename: filename.to_string(),
                size: 3,
            })
        }
    }

    fn test_config() -> Config {
        Config {
            auth: AuthConfig {
                discord_token: "discord-secret".to_string(),
                stoat_token: "stoat-secret".to_string(),
            },
            bridge: BridgeConfig {
                discord_bot_id: "111222333".to_string(),
                stoat_bot_id: "01AAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            },
            stoat: StoatConfig {
                base_url: "https://stoat.example.com".to_string(),
                ws_url: None,
            },
            identity: IdentityConfig::default(),
            mappings: MappingsConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    struct Harness {
        bridge: BridgeCore,
        discord: Arc<MockDiscordSink>,
        stoat: Arc<MockStoatSink>,
        _dir: TempDir,
    }

    fn harness_with(
        discord: MockDiscordSink,
        stoat: MockStoatSink,
        media: MockMediaFetcher,
    ) -> Harness {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(
            ChannelMappingStore::load(dir.path().join("channel_mapping.yaml")).expect("store"),
        );
        store.add(DISCORD_CHANNEL, STOAT_CHANNEL).expect("mapping");

        let discord = Arc::new(discord);
        let stoat = Arc::new(stoat);
        let bridge = BridgeCore::new(
            &test_config(),
            store,
            Arc::new(media),
            discord.clone(),
            stoat.clone(),
        );
        Harness {
            bridge,
            discord,
            stoat,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockDiscordSink::default(),
            MockStoatSink::default(),
            MockMediaFetcher::default(),
        )
    }

    fn discord_message(message_id: &str, content: &str) -> InboundMessage {
        InboundMessage {
            channel_id: DISCORD_CHANNEL.to_string(),
            message_id: message_id.to_string(),
            author_id: "444555666".to_string(),
            author_name: Some("alice".to_string()),
            author_avatar: None,
            content: content.to_string(),
            mentions: Vec::new(),
            attachments: Vec::new(),
            webhook_id: None,
            application_id: None,
        }
    }

    fn stoat_message(message_id: &str, content: &str) -> InboundMessage {
        InboundMessage {
            channel_id: STOAT_CHANNEL.to_string(),
            message_id: message_id.to_string(),
            author_id: "01CCCCCCCCCCCCCCCCCCCCCCCC".to_string(),
            author_name: Some("bob".to_string()),
            author_avatar: None,
            content: content.to_string(),
            mentions: Vec::new(),
            attachments: Vec::new(),
            webhook_id: None,
            application_id: None,
        }
    }

    #[tokio::test]
    async fn create_on_mapped_channel_records_identity_mapping() {
        let h = harness();

        let sent_id = h
            .bridge
            .relay_create(Direction::DiscordToStoat, &discord_message("m1", "hello"))
            .await
            .expect("relay")
            .expect("destination id");

        assert_eq!(sent_id, "s-msg-1");
        assert_eq!(h.stoat.sent.lock().len(), 1);
        let record = h
            .bridge
            .messages
            .lookup(&SourceKey::Discord {
                channel_id: DISCORD_CHANNEL.to_string(),
                message_id: "m1".to_string(),
            })
            .expect("mapping recorded");
        assert_eq!(record.destination_message_id, "s-msg-1");
        assert_eq!(record.destination_channel_id, STOAT_CHANNEL);
    }

    #[tokio::test]
    async fn create_from_stoat_delivers_via_discord_sink() {
        let h = harness();

        let sent_id = h
            .bridge
            .relay_create(Direction::StoatToDiscord, &stoat_message("s1", "hi"))
            .await
            .expect("relay")
            .expect("destination id");

        assert_eq!(sent_id, "d-msg-1");
        let sent = h.discord.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, DISCORD_CHANNEL);
        assert_eq!(sent[0].1.username, "bob");
    }

    #[tokio::test]
    async fn create_in_unmapped_channel_is_skipped() {
        let h = harness();
        let mut message = discord_message("m1", "hello");
        message.channel_id = "999999".to_string();

        let result = h
            .bridge
            .relay_create(Direction::DiscordToStoat, &message)
            .await
            .expect("relay");

        assert!(result.is_none());
        assert!(h.stoat.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn self_originated_create_is_skipped_before_any_side_effect() {
        let h = harness();
        let mut message = discord_message("m1", "hello");
        message.webhook_id = Some("777".to_string());
        message.application_id = Some("111222333".to_string());

        let result = h
            .bridge
            .relay_create(Direction::DiscordToStoat, &message)
            .await
            .expect("relay");

        assert!(result.is_none());
        assert!(h.stoat.sent.lock().is_empty());
        assert!(h.stoat.uploads.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_create_records_no_mapping() {
        let h = harness_with(
            MockDiscordSink::default(),
            MockStoatSink {
                fail_send: true,
                ..Default::default()
            },
            MockMediaFetcher::default(),
        );

        let result = h
            .bridge
            .relay_create(Direction::DiscordToStoat, &discord_message("m1", "hello"))
            .await
            .expect("relay");

        assert!(result.is_none());
        assert!(h.bridge.messages.is_empty());
    }

    #[tokio::test]
    async fn edit_without_mapping_never_calls_destination() {
        let h = harness();

        h.bridge
            .relay_edit(Direction::DiscordToStoat, &discord_message("m1", "edited"))
            .await
            .expect("relay");

        assert!(h.stoat.edits.lock().is_empty());
    }

    #[tokio::test]
    async fn edit_with_mapping_reaches_the_mirrored_message() {
        let h = harness();
        h.bridge
            .relay_create(Direction::DiscordToStoat, &discord_message("m1", "hello"))
            .await
            .expect("create");

        h.bridge
            .relay_edit(
                Direction::DiscordToStoat,
                &discord_message("m1", "hello, edited"),
            )
            .await
            .expect("edit");

        let edits = h.stoat.edits.lock();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, STOAT_CHANNEL);
        assert_eq!(edits[0].1, "s-msg-1");
        assert_eq!(edits[0].2, "hello, edited");
    }

    #[tokio::test]
    async fn failed_delete_keeps_the_mapping() {
        let h = harness_with(
            MockDiscordSink::default(),
            MockStoatSink {
                fail_delete: true,
                ..Default::default()
            },
            MockMediaFetcher::default(),
        );
        h.bridge
            .relay_create(Direction::DiscordToStoat, &discord_message("m1", "hello"))
            .await
            .expect("create");

        h.bridge
            .relay_delete(Direction::DiscordToStoat, DISCORD_CHANNEL, "m1")
            .await
            .expect("delete");

        assert!(h
            .bridge
            .messages
            .lookup(&SourceKey::Discord {
                channel_id: DISCORD_CHANNEL.to_string(),
                message_id: "m1".to_string(),
            })
            .is_some());
    }

    #[tokio::test]
    async fn successful_delete_removes_the_mapping() {
        let h = harness();
        h.bridge
            .relay_create(Direction::StoatToDiscord, &stoat_message("s1", "hi"))
            .await
            .expect("create");

        h.bridge
            .relay_delete(Direction::StoatToDiscord, STOAT_CHANNEL, "s1")
            .await
            .expect("delete");

        assert_eq!(h.discord.deletes.lock().len(), 1);
        assert!(h.bridge.messages.is_empty());
    }

    #[tokio::test]
    async fn partial_attachment_failure_still_relays_the_message() {
        let mut media = MockMediaFetcher::default();
        media
            .fail_urls
            .insert("https://cdn.discord.example/broken.png".to_string());
        let h = harness_with(MockDiscordSink::default(), MockStoatSink::default(), media);

        let mut message = discord_message("m1", "two files");
        message.attachments = vec![
            AttachmentRef {
                id: "a1".to_string(),
                filename: "ok.png".to_string(),
                url: "https://cdn.discord.example/ok.png".to_string(),
            },
            AttachmentRef {
                id: "a2".to_string(),
                filename: "broken.png".to_string(),
                url: "https://cdn.discord.example/broken.png".to_string(),
            },
        ];

        let sent_id = h
            .bridge
            .relay_create(Direction::DiscordToStoat, &message)
            .await
            .expect("relay")
            .expect("destination id");

        assert_eq!(sent_id, "s-msg-1");
        let sent = h.stoat.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.attachments, vec!["autumn-1".to_string()]);
        assert_eq!(*h.stoat.uploads.lock(), vec!["ok.png".to_string()]);
    }

    #[tokio::test]
    async fn dispatcher_routes_events_by_platform_and_kind() {
        let h = harness();

        h.bridge
            .handle_event(MirrorEvent::Create {
                platform: Platform::Discord,
                message: discord_message("m1", "hello"),
            })
            .await
            .expect("create event");
        h.bridge
            .handle_event(MirrorEvent::Update {
                platform: Platform::Discord,
                message: discord_message("m1", "edited"),
            })
            .await
            .expect("update event");
        h.bridge
            .handle_event(MirrorEvent::Delete {
                platform: Platform::Discord,
                channel_id: DISCORD_CHANNEL.to_string(),
                message_id: "m1".to_string(),
            })
            .await
            .expect("delete event");

        assert_eq!(h.stoat.sent.lock().len(), 1);
        assert_eq!(h.stoat.edits.lock().len(), 1);
        assert_eq!(h.stoat.deletes.lock().len(), 1);
        assert!(h.bridge.messages.is_empty());
    }

    #[test]
    fn avatar_precedence_prefers_channel_override_then_author() {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(
            ChannelMappingStore::load(dir.path().join("channel_mapping.yaml")).expect("store"),
        );
        let mut config = test_config();
        config.identity.channel_avatars.insert(
            STOAT_CHANNEL.to_string(),
            "https://img.example/override.png".to_string(),
        );
        let bridge = BridgeCore::new(
            &config,
            store,
            Arc::new(MockMediaFetcher::default()),
            Arc::new(MockDiscordSink::default()),
            Arc::new(MockStoatSink::default()),
        );

        assert_eq!(
            bridge.resolve_avatar(STOAT_CHANNEL, Some("https://img.example/profile.png")),
            "https://img.example/override.png"
        );
        assert_eq!(
            bridge.resolve_avatar("other-channel", Some("https://img.example/profile.png")),
            "https://img.example/profile.png"
        );
        assert_eq!(
            bridge.resolve_avatar("other-channel", None),
            config.identity.default_avatar
        );
    }
}
