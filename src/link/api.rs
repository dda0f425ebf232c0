use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Header the link API reads its shared token from.
pub const TOKEN_HEADER: &str = "X-Squad-JS-Token";

/// One player's identifiers on their way to the link API.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLink {
    pub steam_id: String,
    pub eos_id: String,
    pub player_name: String,
    /// 1-based attempt number
    pub attempt: u32,
}

impl PendingLink {
    pub fn new(steam_id: &str, eos_id: &str, player_name: &str) -> Self {
        PendingLink {
            steam_id: steam_id.to_string(),
            eos_id: eos_id.to_string(),
            player_name: player_name.to_string(),
            attempt: 1,
        }
    }

    pub fn body(&self) -> LinkBody<'_> {
        LinkBody {
            steamid: &self.steam_id,
            eosid: &self.eos_id,
        }
    }
}

/// JSON request body.
#[derive(Debug, Serialize)]
pub struct LinkBody<'a> {
    pub steamid: &'a str,
    pub eosid: &'a str,
}

/// What the API says about a submitted link.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Connection failure, timeout, or unreadable response.
    #[error("no usable response from link API: {0}")]
    Request(#[from] reqwest::Error),
    #[error("link API error {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Remote endpoint that records Steam/EOS pairs.
#[async_trait]
pub trait LinkApi: Send + Sync {
    /// Submit one pair. `Err` means the call itself failed and may be retried.
    async fn submit(&self, link: &PendingLink) -> Result<LinkResponse, LinkError>;
}

/// HTTP client for the link API (`PUT` with a JSON body).
#[derive(Clone)]
pub struct LinkApiClient {
    http: Client,
    endpoint: String,
    token: String,
}

impl LinkApiClient {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(LinkApiClient {
            http,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        })
    }

    fn build_request(&self, link: &PendingLink) -> reqwest::Result<reqwest::Request> {
        self.http
            .put(&self.endpoint)
            .header(TOKEN_HEADER, &self.token)
            .json(&link.body())
            .build()
    }
}

#[async_trait]
impl LinkApi for LinkApiClient {
    async fn submit(&self, link: &PendingLink) -> Result<LinkResponse, LinkError> {
        debug!("PUT {} (attempt {})", self.endpoint, link.attempt);

        let request = self.build_request(link)?;
        let resp = self.http.execute(request).await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(LinkError::Status { status, body });
        }

        Ok(parse_link_response(&body))
    }
}

/// A 2xx body that isn't the expected JSON counts as an unsuccessful link.
fn parse_link_response(body: &str) -> LinkResponse {
    serde_json::from_str(body).unwrap_or_else(|_| LinkResponse {
        success: false,
        message: Some(body.to_string()),
    })
}
