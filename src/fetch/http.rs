//! HTTP odds source.
//!
//! Fetches one JSON document per group and reads the bookie lines out of
//! it. A group's `source` is either an absolute URL or a path appended to
//! the configured base URL.
//!
//! Expected shape (extra fields are ignored, odds may be strings or numbers):
//!
//! ```json
//! { "bookies": [ { "name": "Bet365", "home": "2.10", "away": 1.8 } ] }
//! ```
//!
//! Network errors, timeouts, 429 and 5xx are transient; other non-success
//! statuses and undecodable bodies are fatal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};

use super::Fetcher;
use crate::engine::progress::ProgressReporter;
use crate::types::{FetchError, ObservedOdds};

const FETCHER_NAME: &str = "http";

/// Longest body excerpt carried into an error message.
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OddsDocument {
    #[serde(default)]
    bookies: Vec<BookieLine>,
}

#[derive(Debug, Deserialize)]
struct BookieLine {
    name: String,
    #[serde(alias = "home", alias = "back", default, deserialize_with = "odds_value")]
    primary: String,
    #[serde(alias = "away", alias = "lay", default, deserialize_with = "odds_value")]
    secondary: String,
}

/// Accept `"2.10"`, `2.1` or `null` and keep the source's rendering.
fn odds_value<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Decode a response body into bookie lines, keeping document order.
pub fn parse_document(body: &str) -> std::result::Result<Vec<ObservedOdds>, FetchError> {
    let doc: OddsDocument = serde_json::from_str(body)
        .map_err(|e| FetchError::Fatal(format!("malformed odds document: {e}")))?;

    Ok(doc
        .bookies
        .into_iter()
        .filter(|line| !line.name.trim().is_empty())
        .map(|line| ObservedOdds::new(line.name.trim(), line.primary, line.secondary))
        .collect())
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("HTTP {status}: {excerpt}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FetchError::Transient(message)
    } else {
        FetchError::Fatal(message)
    }
}

fn classify_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_decode() || e.is_builder() {
        FetchError::Fatal(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct HttpFetcher {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpFetcher {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
        api_key: Option<SecretString>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build odds HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    /// Resolve a group's source into the URL to request.
    pub fn source_url(&self, source: &str) -> String {
        if source.starts_with("http://") || source.starts_with("https://") {
            return source.to_string();
        }
        let path = source
            .trim_start_matches('/')
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        group_id: &str,
        source: &str,
        progress: &ProgressReporter,
    ) -> std::result::Result<Vec<ObservedOdds>, FetchError> {
        let url = self.source_url(source);
        progress.report(0.0, format!("Requesting {url}"))?;

        let mut request = self.http.get(&url).query(&[("group", group_id)]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret().as_str());
        }

        let response = request.send().await.map_err(classify_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        progress.report(0.4, format!("HTTP {status} from source"))?;

        let body = response.text().await.map_err(classify_reqwest)?;
        progress.report(0.7, format!("Downloaded {} bytes", body.len()))?;
        debug!(group = group_id, url = %url, bytes = body.len(), "Odds document downloaded");

        let lines = parse_document(&body)?;
        progress.report(1.0, format!("Parsed {} bookies", lines.len()))?;
        info!(group = group_id, bookies = lines.len(), "Odds fetched");

        Ok(lines)
    }

    fn name(&self) -> &str {
        FETCHER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
