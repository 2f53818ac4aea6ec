use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, error, info};

use serenity::all::{
    ChannelId, Client as SerenityClient, CommandOptionType, Context as SerenityContext,
    EventHandler as SerenityEventHandler, GatewayIntents, GuildId, Http, Interaction,
    Message as SerenityMessage, MessageId, MessageUpdateEvent, Permissions, Ready, Webhook,
};
use serenity::builder::{
    CreateAttachment, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateWebhook, EditWebhookMessage, ExecuteWebhook,
};
use serenity::model::application::Command;
use tokio::sync::{oneshot, Mutex as AsyncMutex, RwLock};

use crate::bridge::{
    AttachmentRef, BridgeCore, DiscordSink, InboundMessage, MentionEntity, MentionKind,
    MirrorEvent, OutboundDiscordMessage, Platform,
};
use crate::config::Config;
use crate::mappings::ChannelMappingStore;
use crate::media::MediaFetcher;
use crate::utils::formatting::slugify_channel_name;

pub mod command_handler;

pub use self::command_handler::{SyncCommand, SyncCommandHandler};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;

/// Reserved name prefix marking webhooks this bridge manages. Recognizing
/// the prefix lets a restarted process reuse its identities instead of
/// creating new ones.
const WEBHOOK_NAME_PREFIX: &str = "stoat";

#[derive(Clone)]
struct WebhookInfo {
    url: String,
}

#[derive(Clone)]
pub struct DiscordClient {
    config: Arc<Config>,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    bridge: Arc<RwLock<Option<Arc<BridgeCore>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    webhook_cache: Arc<RwLock<HashMap<String, WebhookInfo>>>,
    command_handler: Arc<SyncCommandHandler>,
    media: Arc<dyn MediaFetcher>,
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

struct GatewayHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    http_sender: Arc<AsyncMutex<Option<oneshot::Sender<Arc<Http>>>>>,
    bridge: Arc<RwLock<Option<Arc<BridgeCore>>>>,
    command_handler: Arc<SyncCommandHandler>,
}

#[serenity::async_trait]
impl SerenityEventHandler for GatewayHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );

        if let Err(err) = Command::set_global_commands(&ctx.http, admin_commands()).await {
            error!("failed to register admin commands: {}", err);
        }

        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
        if let Some(sender) = self.http_sender.lock().await.take() {
            let _ = sender.send(ctx.http.clone());
        }
    }

    async fn message(&self, ctx: SerenityContext, msg: SerenityMessage) {
        let bridge = self.bridge.read().await.clone();
        let Some(bridge) = bridge else {
            debug!("ignoring discord message before bridge binding");
            return;
        };

        let message = inbound_from_message(&ctx, &msg);
        if let Err(err) = bridge
            .handle_event(MirrorEvent::Create {
                platform: Platform::Discord,
                message,
            })
            .await
        {
            error!("failed to handle discord message: {err}");
        }
    }

    async fn message_update(
        &self,
        ctx: SerenityContext,
        _old_if_available: Option<SerenityMessage>,
        _new_if_available: Option<SerenityMessage>,
        update: MessageUpdateEvent,
    ) {
        let Some(content) = update.content.clone() else {
            return;
        };

        let bridge = self.bridge.read().await.clone();
        let Some(bridge) = bridge else {
            return;
        };

        let message = inbound_from_update(&ctx, &update, content);
        if let Err(err) = bridge
            .handle_event(MirrorEvent::Update {
                platform: Platform::Discord,
                message,
            })
            .await
        {
            error!("failed to handle discord message update: {err}");
        }
    }

    async fn message_delete(
        &self,
        _ctx: SerenityContext,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let bridge = self.bridge.read().await.clone();
        let Some(bridge) = bridge else {
            return;
        };

        if let Err(err) = bridge
            .handle_event(MirrorEvent::Delete {
                platform: Platform::Discord,
                channel_id: channel_id.to_string(),
                message_id: deleted_message_id.to_string(),
            })
            .await
        {
            error!("failed to handle discord message delete: {err}");
        }
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let stoat_id = command
            .data
            .options
            .first()
            .and_then(|option| option.value.as_str())
            .map(ToOwned::to_owned);
        let Some(parsed) = SyncCommand::parse(&command.data.name, stoat_id) else {
            return;
        };

        let is_admin = command
            .member
            .as_ref()
            .and_then(|member| member.permissions)
            .is_some_and(|permissions| permissions.contains(Permissions::ADMINISTRATOR));

        let reply =
            self.command_handler
                .handle(parsed, &command.channel_id.to_string(), is_admin);

        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(reply)
                .ephemeral(true),
        );
        if let Err(err) = command.create_response(&ctx.http, response).await {
            error!("failed to respond to admin command: {}", err);
        }
    }
}

fn admin_commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("sync-channel")
            .description("Syncs a Stoat channel with this Discord channel")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "stoatid",
                    "The Stoat channel ID to sync",
                )
                .required(true),
            ),
        CreateCommand::new("unsync-channel")
            .description("Unsyncs this Discord channel from its Stoat channel"),
        CreateCommand::new("is-synced")
            .description("Checks if this Discord channel is synced with a Stoat channel"),
    ]
}

fn inbound_from_message(ctx: &SerenityContext, msg: &SerenityMessage) -> InboundMessage {
    let mut mentions: Vec<MentionEntity> = msg
        .mentions
        .iter()
        .map(|user| MentionEntity {
            id: user.id.to_string(),
            name: user.name.clone(),
            kind: MentionKind::User,
        })
        .collect();

    // Role names only resolve through the guild cache; an uncached role
    // produces no entity and its raw token passes through the transcoder.
    if let Some(guild_id) = msg.guild_id {
        if let Some(guild) = ctx.cache.guild(guild_id) {
            for role_id in &msg.mention_roles {
                if let Some(role) = guild.roles.get(role_id) {
                    mentions.push(MentionEntity {
                        id: role_id.to_string(),
                        name: role.name.clone(),
                        kind: MentionKind::Role,
                    });
                }
            }
        }
    }

    let attachments = msg
        .attachments
        .iter()
        .map(|attachment| AttachmentRef {
            id: attachment.id.to_string(),
            filename: attachment.filename.clone(),
            url: attachment.url.clone(),
        })
        .collect();

    InboundMessage {
        channel_id: msg.channel_id.to_string(),
        message_id: msg.id.to_string(),
        author_id: msg.author.id.to_string(),
        author_name: Some(
            msg.author
                .global_name
                .clone()
                .unwrap_or_else(|| msg.author.name.clone()),
        ),
        author_avatar: msg.author.avatar_url(),
        content: msg.content.clone(),
        mentions,
        attachments,
        webhook_id: msg.webhook_id.map(|id| id.to_string()),
        application_id: msg.application_id.map(|id| id.to_string()),
    }
}

fn inbound_from_update(
    ctx: &SerenityContext,
    update: &MessageUpdateEvent,
    content: String,
) -> InboundMessage {
    let mut mentions: Vec<MentionEntity> = update
        .mentions
        .iter()
        .flatten()
        .map(|user| MentionEntity {
            id: user.id.to_string(),
            name: user.name.clone(),
            kind: MentionKind::User,
        })
        .collect();

    if let (Some(guild_id), Some(role_ids)) = (update.guild_id, update.mention_roles.as_ref()) {
        if let Some(guild) = ctx.cache.guild(guild_id) {
            for role_id in role_ids {
                if let Some(role) = guild.roles.get(role_id) {
                    mentions.push(MentionEntity {
                        id: role_id.to_string(),
                        name: role.name.clone(),
                        kind: MentionKind::Role,
                    });
                }
            }
        }
    }

    InboundMessage {
        channel_id: update.channel_id.to_string(),
        message_id: update.id.to_string(),
        author_id: update
            .author
            .as_ref()
            .map(|author| author.id.to_string())
            .unwrap_or_default(),
        author_name: update.author.as_ref().map(|author| author.name.clone()),
        author_avatar: update.author.as_ref().and_then(|author| author.avatar_url()),
        content,
        mentions,
        attachments: Vec::new(),
        webhook_id: None,
        application_id: None,
    }
}

impl DiscordClient {
    pub fn new(
        config: Arc<Config>,
        store: Arc<ChannelMappingStore>,
        media: Arc<dyn MediaFetcher>,
    ) -> Self {
        info!("initializing discord client");
        Self {
            config,
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            bridge: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
            webhook_cache: Arc::new(RwLock::new(HashMap::new())),
            command_handler: Arc::new(SyncCommandHandler::new(store)),
            media,
        }
    }

    pub async fn set_bridge(&self, bridge: Arc<BridgeCore>) {
        *self.bridge.write().await = Some(bridge);
    }

    async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (http_tx, http_rx) = oneshot::channel();
        let event_handler = GatewayHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            http_sender: Arc::new(AsyncMutex::new(Some(http_tx))),
            bridge: self.bridge.clone(),
            command_handler: self.command_handler.clone(),
        };

        let mut gateway_client =
            SerenityClient::builder(&self.config.auth.discord_token, intents)
                .event_handler(event_handler)
                .await
                .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(std::time::Duration::from_secs(30), ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");

                if let Ok(Ok(http)) =
                    tokio::time::timeout(std::time::Duration::from_secs(5), http_rx).await
                {
                    *self.http.write().await = Some(http);
                }

                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!(
                    "discord gateway exited before receiving Ready event"
                ))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(retry_seconds)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        info!("discord client stopped");
        Ok(())
    }

    async fn http(&self) -> Result<Arc<Http>> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("discord http client not available"))
    }

    /// Obtains the managed webhook for a channel: reuse any webhook carrying
    /// the reserved prefix, otherwise create one named after the channel.
    /// Results are cached per channel for the life of the process.
    async fn get_or_create_webhook(&self, http: &Http, channel_id: u64) -> Result<WebhookInfo> {
        if let Some(info) = self.webhook_cache.read().await.get(&channel_id.to_string()) {
            return Ok(info.clone());
        }

        let channel = ChannelId::new(channel_id);
        let webhooks = channel
            .webhooks(http)
            .await
            .map_err(|e| anyhow!("failed to fetch webhooks: {}", e))?;

        let existing = webhooks.iter().find(|webhook| {
            webhook
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(WEBHOOK_NAME_PREFIX))
        });

        let info = if let Some(webhook) = existing {
            WebhookInfo {
                url: webhook
                    .url()
                    .map_err(|e| anyhow!("webhook has no token: {}", e))?,
            }
        } else {
            let channel_name = channel
                .to_channel(http)
                .await
                .ok()
                .and_then(|channel| channel.guild())
                .map(|guild_channel| guild_channel.name)
                .unwrap_or_else(|| channel_id.to_string());
            let webhook_name = format!(
                "{}-{}",
                WEBHOOK_NAME_PREFIX,
                slugify_channel_name(&channel_name)
            );

            let mut builder = CreateWebhook::new(&webhook_name);
            match self
                .media
                .fetch(&self.config.identity.default_avatar, "avatar.jpeg")
                .await
            {
                Ok(avatar) => {
                    builder =
                        builder.avatar(&CreateAttachment::bytes(avatar.data, avatar.filename));
                }
                Err(err) => {
                    debug!("creating webhook without avatar: {}", err);
                }
            }

            let webhook = channel
                .create_webhook(http, builder)
                .await
                .map_err(|e| anyhow!("failed to create webhook: {}", e))?;

            WebhookInfo {
                url: webhook
                    .url()
                    .map_err(|e| anyhow!("created webhook has no token: {}", e))?,
            }
        };

        self.webhook_cache
            .write()
            .await
            .insert(channel_id.to_string(), info.clone());
        Ok(info)
    }

    async fn webhook_for_channel(&self, http: &Http, channel_id: &str) -> Result<Webhook> {
        let channel_id_num: u64 = channel_id
            .parse()
            .map_err(|_| anyhow!("invalid channel id: {}", channel_id))?;
        let info = self.get_or_create_webhook(http, channel_id_num).await?;
        Webhook::from_url(http, &info.url)
            .await
            .map_err(|e| anyhow!("failed to resolve webhook: {}", e))
    }
}

#[async_trait::async_trait]
impl DiscordSink for DiscordClient {
    async fn send_message(
        &self,
        channel_id: &str,
        outbound: OutboundDiscordMessage,
    ) -> Result<String> {
        let http = self.http().await?;
        let webhook = self.webhook_for_channel(&http, channel_id).await?;

        let mut builder = ExecuteWebhook::new()
            .content(&outbound.content)
            .username(&outbound.username)
            .avatar_url(&outbound.avatar_url);
        for file in &outbound.files {
            builder = builder.add_file(CreateAttachment::bytes(
                file.data.clone(),
                file.filename.clone(),
            ));
        }

        let message = webhook
            .execute(&*http, true, builder)
            .await
            .map_err(|e| anyhow!("webhook send failed: {}", e))?
            .ok_or_else(|| anyhow!("webhook execution returned no message"))?;

        debug!(
            "sent message via webhook to channel {}, message_id={}",
            channel_id, message.id
        );
        Ok(message.id.to_string())
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        let http = self.http().await?;
        let webhook = self.webhook_for_channel(&http, channel_id).await?;

        let message_id_num: u64 = message_id
            .parse()
            .map_err(|_| anyhow!("invalid message id for edit: {}", message_id))?;

        webhook
            .edit_message(
                &*http,
                MessageId::new(message_id_num),
                EditWebhookMessage::new().content(content),
            )
            .await
            .map_err(|e| anyhow!("webhook edit failed: {}", e))?;

        debug!(
            "edited message via webhook in channel {}, message_id={}",
            channel_id, message_id
        );
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let http = self.http().await?;
        let channel_id_num: u64 = channel_id
            .parse()
            .map_err(|_| anyhow!("invalid channel id: {}", channel_id))?;
        let message_id_num: u64 = message_id
            .parse()
            .map_err(|_| anyhow!("invalid message id for delete: {}", message_id))?;

        ChannelId::new(channel_id_num)
            .delete_message(&*http, MessageId::new(message_id_num))
            .await
            .map_err(|e| anyhow!("message delete failed: {}", e))?;

        debug!(
            "deleted message in channel {}, message_id={}",
            channel_id, message_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_prefix_is_the_reserved_identity_marker() {
        assert_eq!(WEBHOOK_NAME_PREFIX, "stoat");
    }

    #[test]
    fn derived_webhook_names_carry_the_prefix_and_slug() {
        let name = format!(
            "{}-{}",
            WEBHOOK_NAME_PREFIX,
            slugify_channel_name("General Chat")
        );
        assert_eq!(name, "stoat-general-chat");
        assert!(name.starts_with(WEBHOOK_NAME_PREFIX));
    }
}
