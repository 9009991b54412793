//! Shared plumbing for the outbound HTTP clients.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("solar-nudge/0.1"));
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

/// Reads the body, turning non-2xx statuses into errors that quote it.
pub(crate) async fn success_body(resp: reqwest::Response, what: &str) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("{what} read failed"))?;
    if !status.is_success() {
        anyhow::bail!(
            "{what} API error: HTTP {status}: {}",
            truncate(&body, MAX_ERROR_BODY_CHARS)
        );
    }
    Ok(body)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
