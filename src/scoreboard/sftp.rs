//! SFTP access to the game server's files via libssh2.
//!
//! libssh2 calls block, so every operation runs on the blocking pool. The
//! `Sftp` handle is moved into the blocking task and handed back afterwards.

use async_trait::async_trait;
use chrono::DateTime;
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::transport::{EntryKind, RemoteConnector, RemoteEntry, RemoteSession, TransportError};
use crate::config::Config;

/// libssh2's SFTP status for a missing path.
const SFTP_NO_SUCH_FILE: i32 = 2;

#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    /// Bounds the TCP connect and every libssh2 call
    pub timeout: Duration,
}

impl SftpConfig {
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(SftpConfig {
            host: config.sftp_host.clone()?,
            port: config.sftp_port,
            username: config.sftp_username.clone()?,
            password: config.sftp_password.clone(),
            private_key: config.sftp_private_key.clone(),
            timeout: config.sftp_timeout(),
        })
    }
}

pub struct SftpConnector {
    config: SftpConfig,
}

impl SftpConnector {
    pub fn new(config: SftpConfig) -> Self {
        SftpConnector { config }
    }
}

#[async_trait]
impl RemoteConnector for SftpConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, TransportError> {
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || open_session(&config)).await??;
        Ok(Box::new(session))
    }
}

fn open_session(config: &SftpConfig) -> Result<SftpSession, TransportError> {
    debug!("Opening SFTP session to {}:{}", config.host, config.port);
    let tcp = connect_tcp(config)?;
    let mut session = Session::new()?;
    session.set_timeout(u32::try_from(config.timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake()?;

    match (&config.private_key, &config.password) {
        (Some(key), passphrase) => {
            session.userauth_pubkey_file(&config.username, None, key, passphrase.as_deref())?
        }
        (None, Some(password)) => session.userauth_password(&config.username, password)?,
        (None, None) => session.userauth_agent(&config.username)?,
    }
    if !session.authenticated() {
        return Err(TransportError::Auth(config.username.clone()));
    }

    let sftp = session.sftp()?;
    Ok(SftpSession {
        session,
        sftp: Some(sftp),
    })
}

/// Try each resolved address in turn, each bounded by the configured timeout.
fn connect_tcp(config: &SftpConfig) -> Result<TcpStream, TransportError> {
    let mut last_err = None;
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(Some(config.timeout))?;
                tcp.set_write_timeout(Some(config.timeout))?;
                return Ok(tcp);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} did not resolve", config.host),
            )
        })
        .into())
}

pub struct SftpSession {
    session: Session,
    sftp: Option<Sftp>,
}

impl SftpSession {
    async fn with_sftp<T, F>(&mut self, op: F) -> Result<T, TransportError>
    where
        F: FnOnce(&Sftp) -> Result<T, TransportError> + Send + 'static,
        T: Send + 'static,
    {
        let sftp = self.sftp.take().ok_or(TransportError::Closed)?;
        let (sftp, result) = tokio::task::spawn_blocking(move || {
            let result = op(&sftp);
            (sftp, result)
        })
        .await?;
        self.sftp = Some(sftp);
        result
    }
}

fn entry_from_stat(path: &Path, stat: &FileStat) -> RemoteEntry {
    let kind = if stat.is_file() {
        EntryKind::File
    } else if stat.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::Other
    };
    RemoteEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        kind,
        modified: stat
            .mtime
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0)),
    }
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn exists(&mut self, path: &Path) -> Result<bool, TransportError> {
        let path = path.to_path_buf();
        self.with_sftp(move |sftp| match sftp.stat(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => Ok(false),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list(&mut self, path: &Path) -> Result<Vec<RemoteEntry>, TransportError> {
        let path = path.to_path_buf();
        self.with_sftp(move |sftp| {
            let entries = sftp.readdir(&path)?;
            Ok(entries
                .iter()
                .map(|(p, stat)| entry_from_stat(p, stat))
                .collect())
        })
        .await
    }

    async fn download(&mut self, remote: &Path, local: &Path) -> Result<(), TransportError> {
        let remote = remote.to_path_buf();
        let local = local.to_path_buf();
        self.with_sftp(move |sftp| {
            let mut src = sftp.open(&remote)?;
            let mut dst = std::fs::File::create(&local)?;
            let bytes = std::io::copy(&mut src, &mut dst)?;
            debug!("Downloaded {} bytes from {}", bytes, remote.display());
            Ok(())
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let SftpSession { session, sftp } = *self;
        tokio::task::spawn_blocking(move || {
            drop(sftp);
            session.disconnect(None, "closing", None)
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sftp_config_needs_host_and_user() {
        use clap::Parser;

        let config = Config::try_parse_from(["squad-relay", "--sftp-host", "h"]).unwrap();
        assert!(SftpConfig::from_config(&config).is_none());

        let config = Config::try_parse_from([
            "squad-relay",
            "--sftp-host",
            "h",
            "--sftp-username",
            "u",
            "--sftp-port",
            "2222",
        ])
        .unwrap();
        let sftp = SftpConfig::from_config(&config).unwrap();
        assert_eq!(sftp.port, 2222);
        assert!(sftp.password.is_none());
        assert_eq!(sftp.timeout, Duration::from_millis(20000));
    }

    /// Accepts connections and never says a word.
    fn silent_server() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().take(4) {
                held.push(stream);
                std::thread::sleep(Duration::from_secs(5));
            }
        });
        port
    }

    fn silent_config(port: u16) -> SftpConfig {
        SftpConfig {
            host: "127.0.0.1".into(),
            port,
            username: "squad".into(),
            password: Some("secret".into()),
            private_key: None,
            timeout: Duration::from_millis(300),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_silent_server_times_out() {
        let connector = SftpConnector::new(silent_config(silent_server()));

        let result = tokio::time::timeout(Duration::from_secs(4), connector.connect())
            .await
            .expect("connect should give up on its own");
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_silent_server_degrades_to_not_found() {
        use crate::scoreboard::{ScoreboardLocator, ScoreboardSource};
        use std::sync::Arc;

        let staging = tempfile::tempdir().unwrap();
        let locator = ScoreboardLocator::new(
            "/SquadGame/Saved/OSI_Scoreboards/",
            ScoreboardSource::Remote {
                connector: Arc::new(SftpConnector::new(silent_config(silent_server()))),
                staging_dir: staging.path().to_path_buf(),
            },
        );

        let found = tokio::time::timeout(Duration::from_secs(4), locator.find_latest())
            .await
            .expect("lookup should give up on its own");
        assert!(found.is_none());
    }
}
