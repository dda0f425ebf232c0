use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// How the game server's files are reached.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogReaderMode {
    /// Files live on this machine
    Local,
    /// Files are fetched over SFTP
    Sftp,
}

/// Squad server companion: scoreboard publisher and Steam/EOS link relay
#[derive(Parser, Debug, Clone)]
#[command(name = "squad-relay", version, about)]
pub struct Config {
    /// WebSocket URL of the host event bridge
    #[arg(long, env = "HOST_FEED_URL", default_value = "ws://127.0.0.1:3300/events")]
    pub host_feed_url: String,

    /// Where the game server writes its files
    #[arg(long, env = "LOG_READER_MODE", value_enum, default_value = "local")]
    pub log_reader_mode: LogReaderMode,

    // ── SFTP ─────────────────────────────────────────────────────────────────
    /// SFTP host (required in sftp mode)
    #[arg(long, env = "SFTP_HOST")]
    pub sftp_host: Option<String>,

    /// SFTP port
    #[arg(long, env = "SFTP_PORT", default_value = "22")]
    pub sftp_port: u16,

    /// SFTP username (required in sftp mode)
    #[arg(long, env = "SFTP_USERNAME")]
    pub sftp_username: Option<String>,

    /// SFTP password, or the passphrase of --sftp-private-key
    #[arg(long, env = "SFTP_PASSWORD")]
    pub sftp_password: Option<String>,

    /// Path to a private key used instead of password authentication
    #[arg(long, env = "SFTP_PRIVATE_KEY")]
    pub sftp_private_key: Option<PathBuf>,

    /// Timeout (milliseconds) for connecting and for each SFTP operation
    #[arg(long, env = "SFTP_TIMEOUT_MS", default_value = "20000")]
    pub sftp_timeout_ms: u64,

    // ── Scoreboard publisher ─────────────────────────────────────────────────
    /// Post match scoreboard CSV files to Discord when a round ends
    #[arg(long, env = "SCOREBOARD_ENABLED", default_value = "false")]
    pub scoreboard_enabled: bool,

    /// The ID of the channel to post scoreboards to
    #[arg(long, env = "SCOREBOARD_CHANNEL_ID")]
    pub channel_id: Option<String>,

    /// Path to the OSI_Scoreboards directory on the server
    #[arg(
        long,
        env = "SCOREBOARD_PATH",
        default_value = "/SquadGame/Saved/OSI_Scoreboards/"
    )]
    pub scoreboard_path: PathBuf,

    /// Time to wait (milliseconds) after the round ends before looking for the CSV file
    #[arg(long, env = "SCOREBOARD_WAIT_TIME_MS", default_value = "5000")]
    pub wait_time_ms: u64,

    /// Local directory that receives scoreboards downloaded over SFTP
    #[arg(long, env = "SCOREBOARD_STAGING_DIR", default_value = "/tmp/squad-scoreboards")]
    pub staging_dir: PathBuf,

    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN")]
    pub discord_token: Option<String>,

    /// Discord REST API base URL
    #[arg(long, env = "DISCORD_API_URL", default_value = "https://discord.com/api/v10")]
    pub discord_api_url: String,

    // ── Identity linker ──────────────────────────────────────────────────────
    /// Send player Steam ID and EOS ID to the link API when they connect
    #[arg(long, env = "LINK_ENABLED", default_value = "false")]
    pub link_enabled: bool,

    /// API endpoint URL to send player data to
    #[arg(
        long,
        env = "LINK_API_ENDPOINT",
        default_value = "https://squad.competification.com/api-squad/eoslink"
    )]
    pub api_endpoint: String,

    /// API authentication token
    #[arg(long, env = "LINK_API_TOKEN", default_value = "")]
    pub api_token: String,

    /// API request timeout in milliseconds
    #[arg(long, env = "LINK_API_TIMEOUT_MS", default_value = "5000")]
    pub api_timeout_ms: u64,

    /// Retry failed API calls (two more attempts, two seconds apart)
    #[arg(long, env = "LINK_RETRY_ON_FAILURE", default_value = "false")]
    pub retry_on_failure: bool,

    /// Log successful API calls
    #[arg(long, env = "LINK_LOG_SUCCESSFUL", default_value = "false")]
    pub log_successful: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.host_feed_url)
            .map_err(|e| anyhow::anyhow!("host_feed_url is not a valid URL: {}", e))?;

        if self.scoreboard_enabled {
            if self.channel_id.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("SCOREBOARD_CHANNEL_ID is required when the scoreboard publisher is enabled");
            }
            if self.discord_token.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("DISCORD_TOKEN is required when the scoreboard publisher is enabled");
            }
            url::Url::parse(&self.discord_api_url)
                .map_err(|e| anyhow::anyhow!("discord_api_url is not a valid URL: {}", e))?;
            if self.log_reader_mode == LogReaderMode::Sftp {
                if self.sftp_host.is_none() {
                    anyhow::bail!("SFTP_HOST is required in sftp mode");
                }
                if self.sftp_username.is_none() {
                    anyhow::bail!("SFTP_USERNAME is required in sftp mode");
                }
                if self.sftp_timeout_ms == 0 {
                    anyhow::bail!("sftp_timeout_ms must be positive");
                }
            }
        }

        if self.link_enabled {
            url::Url::parse(&self.api_endpoint)
                .map_err(|e| anyhow::anyhow!("api_endpoint is not a valid URL: {}", e))?;
            if self.api_timeout_ms == 0 {
                anyhow::bail!("api_timeout_ms must be positive");
            }
        }
        Ok(())
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn sftp_timeout(&self) -> Duration {
        Duration::from_millis(self.sftp_timeout_ms)
    }
}
