//! Runtime side of moodlight: platform clients, audio resolution, the chat
//! turn handler, dataset preparation and endpoint administration.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

pub mod audio;
pub mod auth;
pub mod config;
pub mod dataset;
pub mod handler;
pub mod inference;
pub mod platform;
pub mod storage;
#[cfg(test)]
mod test_support;

pub use audio::AudioResolver;
pub use auth::{AccessTokenSource, GcloudAccessToken, StaticAccessToken};
pub use config::PlatformConfig;
pub use handler::{ChatSurface, MediaElement, MoodChatHandler, StatusHandle, TurnOutcome, TurnState};
pub use inference::{EndpointClient, InferenceClient, Prediction};
pub use storage::{GcsObjectStore, ObjectStore};

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<HttpClient> {
    let builder = HttpClient::builder().timeout(HTTP_TIMEOUT);
    // Tests talk to a loopback stub; ambient proxy settings must not reroute it.
    #[cfg(test)]
    let builder = builder.no_proxy();
    builder.build().context("failed to build HTTP client")
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Flattens an error and its causes into one line, dropping repeats.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
