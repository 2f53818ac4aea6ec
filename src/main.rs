#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod bridge;
mod cli;
mod config;
mod discord;
mod mapping_table;
mod mappings;
mod media;
mod parsers;
mod stoat;
mod utils;

use bridge::BridgeCore;
use config::Config;
use discord::DiscordClient;
use mappings::ChannelMappingStore;
use media::MediaHandler;
use stoat::{StoatClient, StoatGateway};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = Arc::new(Config::load_from_file(&cli.config)?);
    utils::logging::init_tracing(&config.logging);
    info!("discord-stoat bridge starting up");

    let store = Arc::new(ChannelMappingStore::load(&config.mappings.file)?);
    info!("loaded {} channel mappings", store.len());

    let media = Arc::new(MediaHandler::new(config.limits.http_timeout())?);
    let stoat_client = Arc::new(StoatClient::new(&config)?);
    let discord_client = Arc::new(DiscordClient::new(
        config.clone(),
        store.clone(),
        media.clone(),
    ));

    let bridge = Arc::new(BridgeCore::new(
        &config,
        store,
        media,
        discord_client.clone(),
        stoat_client.clone(),
    ));
    discord_client.set_bridge(bridge.clone()).await;

    let stoat_gateway = StoatGateway::new(&config, stoat_client, bridge.clone());

    let discord_handle = tokio::spawn({
        let discord_client = discord_client.clone();
        async move {
            if let Err(e) = discord_client.start().await {
                error!("discord client error: {}", e);
            }
        }
    });

    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = stoat_gateway.run().await {
            error!("stoat gateway error: {}", e);
        }
    });

    let bridge_handle = tokio::spawn(async move {
        if let Err(e) = bridge.start().await {
            error!("bridge error: {}", e);
        }
    });

    tokio::select! {
        _ = discord_handle => {},
        _ = gateway_handle => {},
        _ = bridge_handle => {},
    }

    info!("discord-stoat bridge shutting down");
    Ok(())
}
