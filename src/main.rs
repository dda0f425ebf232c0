use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod host;
mod link;
mod scoreboard;

use config::{Config, LogReaderMode};
use host::{spawn_plugin, EventBus, HostFeed, Plugin, ServerState};
use link::{IdentityLinker, LinkApiClient, LinkOptions};
use scoreboard::{
    DiscordChannel, ScoreboardLocator, ScoreboardPublisher, ScoreboardSource, SftpConfig,
    SftpConnector,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let state = ServerState::new();
    let bus = EventBus::new();

    let plugins = build_plugins(&config, &state)?;
    if plugins.is_empty() {
        warn!("No plugins enabled (use --scoreboard-enabled and/or --link-enabled); exiting");
        return Ok(());
    }

    let mut handles = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        info!("Starting plugin {}", plugin.name());
        handles.push(spawn_plugin(&bus, plugin).await);
    }

    let feed = HostFeed::new(&config.host_feed_url, state.clone(), bus.clone());
    let feed_task = tokio::spawn(feed.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    feed_task.abort();
    bus.close().await;
    for result in futures_util::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Plugin task failed: {}", e);
        }
    }

    Ok(())
}

fn build_plugins(config: &Config, state: &ServerState) -> Result<Vec<Box<dyn Plugin>>> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();

    if config.scoreboard_enabled {
        let channel = DiscordChannel::new(
            &config.discord_api_url,
            config.discord_token.as_deref().unwrap_or_default(),
            config.channel_id.as_deref().unwrap_or_default(),
        )?;

        let source = match config.log_reader_mode {
            LogReaderMode::Local => ScoreboardSource::Local,
            LogReaderMode::Sftp => {
                let sftp = SftpConfig::from_config(config)
                    .context("SFTP_HOST and SFTP_USERNAME are required in sftp mode")?;
                ScoreboardSource::Remote {
                    connector: Arc::new(SftpConnector::new(sftp)),
                    staging_dir: config.staging_dir.clone(),
                }
            }
        };

        info!(
            "Scoreboard publisher: {} ({:?}), wait {}ms",
            config.scoreboard_path.display(),
            config.log_reader_mode,
            config.wait_time_ms
        );
        plugins.push(Box::new(ScoreboardPublisher::new(
            Arc::new(channel),
            ScoreboardLocator::new(config.scoreboard_path.clone(), source),
            state.clone(),
            config.wait_time(),
        )));
    }

    if config.link_enabled {
        let api = LinkApiClient::new(&config.api_endpoint, &config.api_token, config.api_timeout())?;
        if config.api_token.is_empty() {
            warn!("LINK_API_TOKEN is empty; the link API will likely reject submissions");
        }
        info!(
            "Identity linker: {} (retry: {})",
            config.api_endpoint, config.retry_on_failure
        );
        plugins.push(Box::new(IdentityLinker::new(
            Arc::new(api),
            LinkOptions::from_config(config),
            state.clone(),
        )));
    }

    Ok(plugins)
}
