use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("ssh: {0}")]
    Ssh(#[from] ssh2::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("authentication rejected for {0}")]
    Auth(String),
    #[error("session already closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One item of a remote directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub modified: Option<DateTime<Utc>>,
}

/// Opens sessions against the game server's filesystem.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, TransportError>;
}

/// A live file-transfer session. Callers must `close` it on every path.
#[async_trait]
pub trait RemoteSession: Send {
    async fn exists(&mut self, path: &Path) -> Result<bool, TransportError>;

    async fn list(&mut self, path: &Path) -> Result<Vec<RemoteEntry>, TransportError>;

    async fn download(&mut self, remote: &Path, local: &Path) -> Result<(), TransportError>;

    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}
