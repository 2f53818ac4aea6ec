use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::bridge::{OutboundStoatMessage, StoatSink};
use crate::config::Config;
use crate::media::MediaInfo;

pub mod gateway;

pub use self::gateway::StoatGateway;

const BOT_TOKEN_HEADER: &str = "x-bot-token";

/// A Stoat user's profile, as much of it as the bridge needs for
/// masquerading and mention resolution.
#[derive(Debug, Clone)]
pub struct StoatUserProfile {
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
    #[serde(default)]
    avatar: Option<AvatarResponse>,
}

#[derive(Debug, Deserialize)]
struct AvatarResponse {
    #[serde(rename = "_id")]
    id: String,
}

/// REST client for the Stoat API and its Autumn file store. Outbound calls
/// share one pooled client with a bounded timeout; a timeout is a delivery
/// failure like any other.
pub struct StoatClient {
    client: Client,
    api_url: String,
    autumn_url: String,
    token: String,
    profiles: RwLock<HashMap<String, StoatUserProfile>>,
}

impl StoatClient {
    pub fn new(config: &Config) -> Result<Self> {
        info!("initializing stoat client for {}", config.stoat.base_url);
        let client = Client::builder()
            .timeout(config.limits.http_timeout())
            .build()
            .map_err(|e| anyhow!("failed to build stoat http client: {}", e))?;
        Ok(Self {
            client,
            api_url: config.stoat.api_url(),
            autumn_url: config.stoat.autumn_url(),
            token: config.auth.stoat_token.clone(),
            profiles: RwLock::new(HashMap::new()),
        })
    }

    pub fn attachment_url(&self, attachment_id: &str) -> String {
        format!("{}/attachments/{}", self.autumn_url, attachment_id)
    }

    fn avatar_url(&self, avatar_id: &str) -> String {
        format!("{}/avatars/{}", self.autumn_url, avatar_id)
    }

    /// Fetches a user's profile, serving repeats from an in-memory cache.
    /// Returns `None` when the user cannot be resolved; callers fall back
    /// to raw tokens or default identities.
    pub async fn fetch_user(&self, user_id: &str) -> Option<StoatUserProfile> {
        if let Some(profile) = self.profiles.read().get(user_id) {
            return Some(profile.clone());
        }

        let url = format!("{}/users/{}", self.api_url, user_id);
        let response = self
            .client
            .get(&url)
            .header(BOT_TOKEN_HEADER, &self.token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(
                "stoat user lookup for {} returned {}",
                user_id,
                response.status()
            );
            return None;
        }
        let user: UserResponse = response.json().await.ok()?;

        let profile = StoatUserProfile {
            username: user.username,
            avatar_url: user.avatar.map(|avatar| self.avatar_url(&avatar.id)),
        };
        self.profiles
            .write()
            .insert(user_id.to_string(), profile.clone());
        Some(profile)
    }
}

#[async_trait]
impl StoatSink for StoatClient {
    async fn send_message(
        &self,
        channel_id: &str,
        outbound: OutboundStoatMessage,
    ) -> Result<String> {
        let payload = json!({
            "content": outbound.content,
            "attachments": outbound.attachments,
            "masquerade": {
                "name": outbound.masquerade.name,
                "avatar": outbound.masquerade.avatar,
            },
        });

        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_url, channel_id))
            .header(BOT_TOKEN_HEADER, &self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("failed to send message to stoat: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("stoat send rejected: status {}", status));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse stoat send response: {}", e))?;
        let message_id = body
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("no _id in stoat send response"))?
            .to_string();

        debug!(
            "sent message to stoat channel {}, message_id={}",
            channel_id, message_id
        );
        Ok(message_id)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        let response = self
            .client
            .patch(format!(
                "{}/channels/{}/messages/{}",
                self.api_url, channel_id, message_id
            ))
            .header(BOT_TOKEN_HEADER, &self.token)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| anyhow!("failed to edit message in stoat: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("stoat edit rejected: status {}", status));
        }

        debug!(
            "edited message in stoat channel {}, message_id={}",
            channel_id, message_id
        );
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/channels/{}/messages/{}",
                self.api_url, channel_id, message_id
            ))
            .header(BOT_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| anyhow!("failed to delete message in stoat: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("stoat delete rejected: status {}", status));
        }

        debug!(
            "deleted message in stoat channel {}, message_id={}",
            channel_id, message_id
        );
        Ok(())
    }

    async fn upload_attachment(&self, media: &MediaInfo) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(media.data.clone())
            .file_name(media.filename.clone())
            .mime_str(&media.content_type)
            .map_err(|e| anyhow!("invalid attachment content type: {}", e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/attachments", self.autumn_url))
            .header(BOT_TOKEN_HEADER, &self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow!("failed to upload attachment to stoat: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("stoat attachment upload rejected: status {}", status));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse upload response: {}", e))?;
        let attachment_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("no id in upload response"))?
            .to_string();

        debug!(
            "uploaded attachment {} to stoat, id={}",
            media.filename, attachment_id
        );
        Ok(attachment_id)
    }
}
