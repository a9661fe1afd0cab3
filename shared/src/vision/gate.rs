//! Optional pre-inference gate backed by an external tagging service.
//!
//! The gate only ever short-circuits on a *successful* answer that contains
//! no plant-like tag. Any failure to get an answer lets the photo through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

/// Tag substrings that let a photo through to the detector.
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "plant",
    "tree",
    "leaf",
    "foliage",
    "mangrove",
    "vegetation",
    "shrub",
    "forest",
    "flora",
];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid tagging endpoint '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("tagging request failed: {0}")]
    Transport(String),

    #[error("tagging service returned status {0}")]
    Status(u16),

    #[error("tagging response malformed: {0}")]
    Malformed(String),
}

/// One tag from the external classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(alias = "name")]
    pub tag: String,
    #[serde(default)]
    pub confidence: f32,
}

impl Tag {
    pub fn new(tag: impl Into<String>, confidence: f32) -> Self {
        Self {
            tag: tag.into(),
            confidence,
        }
    }
}

/// Best-effort tag provider for a photo.
#[async_trait]
pub trait TagSource: Send + Sync {
    async fn tags(&self, image: Arc<[u8]>) -> Result<Vec<Tag>, GateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// No tag source configured.
    Disabled,
    /// A plant-like tag was present.
    Passed,
    /// The source answered and nothing looked like a plant.
    Blocked,
    /// The source failed; detection proceeds anyway.
    Unavailable,
}

impl GateOutcome {
    pub const fn allows_detection(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

#[derive(Debug, Clone)]
pub struct TagGate {
    allow_list: Vec<String>,
}

impl Default for TagGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOW_LIST.iter().copied())
    }
}

impl TagGate {
    pub fn new<I, S>(allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allow_list: allow_list
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// True when any tag contains an allow-listed substring (case-insensitive).
    pub fn matches(&self, tags: &[Tag]) -> bool {
        tags.iter().any(|t| {
            let tag = t.tag.to_lowercase();
            self.allow_list.iter().any(|term| tag.contains(term.as_str()))
        })
    }

    #[instrument(skip_all, fields(image_len = image.len()))]
    pub async fn evaluate(&self, source: Option<&dyn TagSource>, image: Arc<[u8]>) -> GateOutcome {
        let Some(source) = source else {
            return GateOutcome::Disabled;
        };

        match source.tags(image).await {
            Ok(tags) if self.matches(&tags) => {
                debug!(tags = tags.len(), "tag gate passed");
                GateOutcome::Passed
            }
            Ok(tags) => {
                debug!(tags = ?tags.iter().map(|t| t.tag.as_str()).collect::<Vec<_>>(), "no plant tag, skipping detection");
                GateOutcome::Blocked
            }
            Err(e) => {
                warn!(error = %e, "tag gate unavailable, continuing to detection");
                GateOutcome::Unavailable
            }
        }
    }
}

// ============================================================================
// HTTP tag source
// ============================================================================

#[derive(Debug, Deserialize)]
struct TagResponse {
    tags: Vec<Tag>,
}

/// Posts the raw photo bytes to a tagging endpoint.
///
/// Expects a JSON body `{"tags": [{"tag" | "name": ..., "confidence": ...}]}`.
#[derive(Debug, Clone)]
pub struct HttpTagSource {
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTagSource {
    pub fn new(endpoint: &str) -> Result<Self, GateError> {
        Ok(Self {
            endpoint: validate_endpoint(endpoint)?,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn fetch_blocking(&self, image: &[u8]) -> Result<Vec<Tag>, GateError> {
        let mut request = ureq::post(self.endpoint.as_str())
            .timeout(self.timeout)
            .set("Content-Type", "application/octet-stream");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = match request.send_bytes(image) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(GateError::Status(code)),
            Err(e) => return Err(GateError::Transport(e.to_string())),
        };

        let body = response
            .into_string()
            .map_err(|e| GateError::Transport(e.to_string()))?;
        parse_tags(&body)
    }
}

#[async_trait]
impl TagSource for HttpTagSource {
    async fn tags(&self, image: Arc<[u8]>) -> Result<Vec<Tag>, GateError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.fetch_blocking(&image))
            .await
            .map_err(|e| GateError::Transport(e.to_string()))?
    }
}

/// Error bodies (`{"error": ...}`, arrays, bare values) are malformed, never
/// an empty tag list.
fn parse_tags(body: &str) -> Result<Vec<Tag>, GateError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| GateError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(GateError::Malformed("expected a JSON object".into()));
    }
    serde_json::from_value::<TagResponse>(value)
        .map(|r| r.tags)
        .map_err(|e| GateError::Malformed(e.to_string()))
}

fn validate_endpoint(url: &str) -> Result<Url, GateError> {
    let invalid = |reason: &str| GateError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid("only 'http' and 'https' are allowed"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("URL must have a host"));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid("credentials in URL are not allowed"));
    }

    Ok(parsed)
}
