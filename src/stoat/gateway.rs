use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::bridge::{
    AttachmentRef, BridgeCore, InboundMessage, MentionEntity, MentionKind, MirrorEvent, Platform,
};
use crate::config::Config;

use super::StoatClient;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Decoded frames from the Stoat event websocket. Anything the bridge does
/// not mirror falls into `Other` and is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum GatewayEvent {
    Authenticated,
    Ready {},
    Pong {
        #[serde(default)]
        data: serde_json::Value,
    },
    Message(WireMessage),
    MessageUpdate {
        id: String,
        channel: String,
        data: WireMessageEdits,
    },
    MessageDelete {
        id: String,
        channel: String,
    },
    Error {
        #[serde(default)]
        error: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub channel: String,
    pub author: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAttachment {
    #[serde(rename = "_id")]
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessageEdits {
    #[serde(default)]
    pub content: Option<String>,
}

/// Live event feed from Stoat. Authenticates over the websocket, keeps the
/// connection alive, and feeds decoded message events into the bridge; each
/// event runs on its own task so a slow relay never stalls the read loop.
pub struct StoatGateway {
    events_url: String,
    token: String,
    client: Arc<StoatClient>,
    bridge: Arc<BridgeCore>,
}

impl StoatGateway {
    pub fn new(config: &Config, client: Arc<StoatClient>, bridge: Arc<BridgeCore>) -> Self {
        Self {
            events_url: config.stoat.events_url(),
            token: config.auth.stoat_token.clone(),
            client,
            bridge,
        }
    }

    /// Connects and reconnects forever. Only returns on task shutdown.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.connect_once().await {
                Ok(()) => info!("stoat gateway disconnected, reconnecting"),
                Err(err) => error!("stoat gateway error: {err}, reconnecting"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let (ws, _) = connect_async(self.events_url.as_str())
            .await
            .context("failed to connect to stoat events endpoint")?;
        info!("connected to stoat gateway at {}", self.events_url);

        let (mut write, mut read) = ws.split();

        let authenticate = json!({ "type": "Authenticate", "token": self.token });
        write
            .send(WsMessage::Text(authenticate.to_string().into()))
            .await
            .context("failed to send Authenticate")?;

        let mut ping = tokio::time::interval(PING_INTERVAL);
        loop {
            tokio::select! {
                _ = ping.tick() => {
                    let ping_frame = json!({ "type": "Ping", "data": 0 });
                    write
                        .send(WsMessage::Text(ping_frame.to_string().into()))
                        .await
                        .context("failed to send Ping")?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => self.handle_frame(text.as_str())?,
                        Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) -> Result<()> {
        let event: GatewayEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                debug!("ignoring undecodable stoat frame: {}", err);
                return Ok(());
            }
        };

        match event {
            GatewayEvent::Authenticated => info!("stoat gateway authenticated"),
            GatewayEvent::Ready {} => info!("stoat gateway ready"),
            GatewayEvent::Pong { .. } => {}
            GatewayEvent::Message(message) => {
                let client = self.client.clone();
                let bridge = self.bridge.clone();
                tokio::spawn(async move {
                    let inbound = inbound_from_wire(&client, message).await;
                    if let Err(err) = bridge
                        .handle_event(MirrorEvent::Create {
                            platform: Platform::Stoat,
                            message: inbound,
                        })
                        .await
                    {
                        error!("failed to handle stoat message: {err}");
                    }
                });
            }
            GatewayEvent::MessageUpdate { id, channel, data } => {
                let Some(content) = data.content else {
                    return Ok(());
                };
                let bridge = self.bridge.clone();
                tokio::spawn(async move {
                    let message = InboundMessage {
                        channel_id: channel,
                        message_id: id,
                        // Update frames carry no author; self-loop protection
                        // already happened when the create was filtered.
                        author_id: String::new(),
                        author_name: None,
                        author_avatar: None,
                        content,
                        mentions: Vec::new(),
                        attachments: Vec::new(),
                        webhook_id: None,
                        application_id: None,
                    };
                    if let Err(err) = bridge
                        .handle_event(MirrorEvent::Update {
                            platform: Platform::Stoat,
                            message,
                        })
                        .await
                    {
                        error!("failed to handle stoat message update: {err}");
                    }
                });
            }
            GatewayEvent::MessageDelete { id, channel } => {
                let bridge = self.bridge.clone();
                tokio::spawn(async move {
                    if let Err(err) = bridge
                        .handle_event(MirrorEvent::Delete {
                            platform: Platform::Stoat,
                            channel_id: channel,
                            message_id: id,
                        })
                        .await
                    {
                        error!("failed to handle stoat message delete: {err}");
                    }
                });
            }
            GatewayEvent::Error { error } => {
                return Err(anyhow!("stoat gateway reported an error: {error}"));
            }
            GatewayEvent::Other => {}
        }
        Ok(())
    }
}

async fn inbound_from_wire(client: &StoatClient, message: WireMessage) -> InboundMessage {
    let mut mentions = Vec::new();
    for user_id in &message.mentions {
        match client.fetch_user(user_id).await {
            Some(profile) => mentions.push(MentionEntity {
                id: user_id.clone(),
                name: profile.username,
                kind: MentionKind::User,
            }),
            None => warn!("could not resolve stoat mention {}", user_id),
        }
    }

    let author = client.fetch_user(&message.author).await;
    let attachments = message
        .attachments
        .iter()
        .map(|attachment| AttachmentRef {
            id: attachment.id.clone(),
            filename: attachment.filename.clone(),
            url: client.attachment_url(&attachment.id),
        })
        .collect();

    InboundMessage {
        channel_id: message.channel,
        message_id: message.id,
        author_id: message.author,
        author_name: author.as_ref().map(|profile| profile.username.clone()),
        author_avatar: author.and_then(|profile| profile.avatar_url),
        content: message.content.unwrap_or_default(),
        mentions,
        attachments,
        webhook_id: None,
        application_id: None,
    }
}
