use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

const MAX_DISCORD_FILE_SIZE: usize = 8 * 1024 * 1024;
const MAX_STOAT_FILE_SIZE: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
    pub size: usize,
}

/// Seam between the relay orchestrator and the network: fetches attachment
/// bytes from a source platform URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, filename: &str) -> Result<MediaInfo>;
}

pub struct MediaHandler {
    client: Client,
}

impl MediaHandler {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build media http client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for MediaHandler {
    async fn fetch(&self, url: &str, filename: &str) -> Result<MediaInfo> {
        debug!("downloading media from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("failed to download from {}: {}", url, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to download from {}: status {}",
                url,
                response.status()
            ));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| anyhow!("failed to read response body: {}", e))?
            .to_vec();

        let size = data.len();
        let filename = if filename.is_empty() {
            filename_from_url(url)
        } else {
            filename.to_string()
        };

        debug!("downloaded {} bytes from {}", size, url);

        Ok(MediaInfo {
            data,
            content_type,
            filename,
            size,
        })
    }
}

pub fn check_discord_file_size(size: usize) -> Result<()> {
    if size > MAX_DISCORD_FILE_SIZE {
        Err(anyhow!(
            "file too large for Discord: {} bytes (max {})",
            size,
            MAX_DISCORD_FILE_SIZE
        ))
    } else {
        Ok(())
    }
}

pub fn check_stoat_file_size(size: usize) -> Result<()> {
    if size > MAX_STOAT_FILE_SIZE {
        Err(anyhow!(
            "file too large for Stoat: {} bytes (max {})",
            size,
            MAX_STOAT_FILE_SIZE
        ))
    } else {
        Ok(())
    }
}

fn filename_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or("attachment").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_takes_the_last_segment() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/files/photo.png"),
            "photo.png"
        );
    }

    #[test]
    fn file_size_checks_enforce_platform_caps() {
        assert!(check_discord_file_size(MAX_DISCORD_FILE_SIZE).is_ok());
        assert!(check_discord_file_size(MAX_DISCORD_FILE_SIZE + 1).is_err());
        assert!(check_stoat_file_size(MAX_STOAT_FILE_SIZE).is_ok());
        assert!(check_stoat_file_size(MAX_STOAT_FILE_SIZE + 1).is_err());
    }
}
