use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::services::gateway::{DownloadPayload, Gateway};

/// Outcome of one stream resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Playable URL for the requested track.
    Resolved(String),
    /// The gateway answered without a usable URL, or the call timed out.
    NoStream,
    /// A newer resolution was issued while this one was in flight; the
    /// response must be discarded.
    Stale,
}

/// Resolves a video id to a time-limited playable URL via the gateway
/// download endpoint.
///
/// Streams expire server-side, so there is deliberately no cache keyed on
/// video id: every play re-resolves. One fixed timeout bounds each call;
/// there is no retry.
pub struct StreamResolver {
    gateway: Arc<dyn Gateway>,
    timeout: Duration,
    sequence: AtomicU64,
}

/// Canonical watch URL the download endpoint expects.
pub fn watch_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={video_id}")
}

impl StreamResolver {
    pub fn new(gateway: Arc<dyn Gateway>, timeout: Duration) -> Self {
        Self {
            gateway,
            timeout,
            sequence: AtomicU64::new(0),
        }
    }

    /// Claims the next resolution token. Callers claim it inside the same
    /// critical section as the playback transition the resolution serves,
    /// so token order always matches transition order.
    pub fn begin(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolves a video id under a previously claimed token. The outcome
    /// is `Stale` whenever a newer token was claimed in the meantime.
    pub async fn resolve(&self, video_id: &str, token: u64) -> Result<Resolution> {
        let url = watch_url(video_id);

        let payload = match tokio::time::timeout(self.timeout, self.gateway.download(&url)).await {
            Err(_) => {
                if self.superseded(token) {
                    log::warn!("Discarding stale stream resolution for {video_id}");
                    return Ok(Resolution::Stale);
                }
                log::warn!("Stream resolution for {video_id} timed out");
                return Ok(Resolution::NoStream);
            }
            Ok(result) => result?,
        };

        if self.superseded(token) {
            log::warn!("Discarding stale stream resolution for {video_id}");
            return Ok(Resolution::Stale);
        }

        match extract_download_url(&payload) {
            Some(resolved) => Ok(Resolution::Resolved(resolved)),
            None => {
                log::warn!("No download URL in gateway response for {video_id}");
                Ok(Resolution::NoStream)
            }
        }
    }

    fn superseded(&self, token: u64) -> bool {
        self.sequence.load(Ordering::SeqCst) != token
    }
}

/// `data[0].downloadUrl` first, then the flat fields some gateway
/// deployments answer with. Raw text payloads never carry a stream.
pub fn extract_download_url(payload: &DownloadPayload) -> Option<String> {
    let body = match payload {
        DownloadPayload::Json(body) => body,
        DownloadPayload::Text(_) => return None,
    };
    if let Some(url) = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|first| first.get("downloadUrl"))
        .and_then(Value::as_str)
    {
        return Some(url.to_string());
    }
    ["url", "link", "downloadUrl"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}
