use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Upstream search/download service. One implementation talks to the real
/// endpoints; tests inject scripted ones.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `GET <search-endpoint>?q=<text>`, parsed JSON body.
    async fn search(&self, query: &str) -> Result<Value>;

    /// `GET <download-endpoint>?url=<watch-url>&format=mp3`. The worker
    /// usually answers JSON carrying a download link, but some
    /// deployments hand back plain text.
    async fn download(&self, watch_url: &str) -> Result<DownloadPayload>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadPayload {
    Json(Value),
    Text(String),
}

/// Gateway over the real HTTP endpoints, sharing one client.
pub struct HttpGateway {
    client: reqwest::Client,
    search_url: String,
    download_url: String,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("musicflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            search_url: config.gateway_search_url.clone(),
            download_url: config.gateway_download_url.clone(),
        })
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn search(&self, query: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(response.status().as_u16()));
        }
        Ok(response.json::<Value>().await?)
    }

    async fn download(&self, watch_url: &str) -> Result<DownloadPayload> {
        let response = self
            .client
            .get(&self.download_url)
            .query(&[("url", watch_url), ("format", "mp3")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(response.status().as_u16()));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);
        if is_json {
            return Ok(DownloadPayload::Json(response.json::<Value>().await?));
        }
        Ok(classify_text_body(response.text().await?))
    }
}

/// Workers sometimes return JSON under a text content type; parse it if
/// possible, otherwise pass the raw text through.
fn classify_text_body(text: String) -> DownloadPayload {
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => DownloadPayload::Json(json),
        Err(_) => DownloadPayload::Text(text),
    }
}
