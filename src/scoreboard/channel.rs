use anyhow::Result;
use async_trait::async_trait;

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Destination for round summaries.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Check the channel is reachable before any round is published.
    async fn verify(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, content: &str, attachment: Attachment) -> Result<()>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
