use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, info};

use super::channel::{Attachment, ChatChannel};

/// A Discord text channel, driven through the bot REST API.
#[derive(Clone)]
pub struct DiscordChannel {
    http: Client,
    api_url: String,
    token: String,
    channel_id: String,
    label: String,
}

impl DiscordChannel {
    pub fn new(api_url: &str, token: &str, channel_id: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(DiscordChannel {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            channel_id: channel_id.to_string(),
            label: format!("discord:{}", channel_id),
        })
    }

    fn channel_url(&self) -> String {
        format!("{}/channels/{}", self.api_url, self.channel_id)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn build_message(&self, content: &str, attachment: Attachment) -> Result<reqwest::Request> {
        let payload = serde_json::json!({
            "content": content,
            "attachments": [{ "id": 0, "filename": attachment.name }],
        });
        let file = Part::bytes(attachment.bytes)
            .file_name(attachment.name)
            .mime_str("text/csv")?;
        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", file);

        let request = self
            .http
            .post(format!("{}/messages", self.channel_url()))
            .header("Authorization", self.auth())
            .multipart(form)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl ChatChannel for DiscordChannel {
    async fn verify(&self) -> Result<()> {
        let resp = self
            .http
            .get(self.channel_url())
            .header("Authorization", self.auth())
            .send()
            .await
            .context("Discord channel lookup failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Could not fetch channel {}: {} {}", self.channel_id, status, body);
        }

        let raw: serde_json::Value = resp.json().await.context("Failed to parse Discord channel")?;
        info!(
            "Posting scoreboards to #{} ({})",
            raw["name"].as_str().unwrap_or("unknown"),
            self.channel_id
        );
        Ok(())
    }

    async fn send(&self, content: &str, attachment: Attachment) -> Result<()> {
        debug!("Sending {} to {}", attachment.name, self.label);
        let request = self.build_message(content, attachment)?;
        let resp = self
            .http
            .execute(request)
            .await
            .context("Discord message request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord rejected message {}: {}", status, body);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}
