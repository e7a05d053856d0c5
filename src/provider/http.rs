//! Shared HTTP client and error mapping for the HTTP backends.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ProviderError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// Per-call deadlines are enforced by the caller; the client timeout is only
/// a backstop.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Headers for a JSON API, with an optional Bearer token.
pub fn bearer_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Map a non-success HTTP status onto a provider error.
///
/// Rate limiting and server errors are transient; anything else means the
/// provider answered but not usefully.
pub fn status_to_error(provider: &str, status: u16, body: &str) -> ProviderError {
    let detail = format!("HTTP {status}: {}", truncate(body, 300));
    match status {
        429 | 500..=599 => ProviderError::unreachable(provider, detail),
        _ => ProviderError::invalid_response(provider, detail),
    }
}

/// Map a transport failure onto a provider error.
pub fn transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::new(
            crate::error::ProviderErrorKind::Timeout,
            provider,
            err.to_string(),
        )
    } else if err.is_decode() {
        ProviderError::invalid_response(provider, err.to_string())
    } else {
        ProviderError::unreachable(provider, err.to_string())
    }
}

/// POST a JSON body and decode the JSON reply.
pub async fn post_json<T: DeserializeOwned>(
    provider: &str,
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<T, ProviderError> {
    debug!(provider, url, "provider request");

    let resp = shared_client()
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = resp.status().as_u16();
    let text = resp.text().await.map_err(|e| transport_error(provider, e))?;
    if !(200..300).contains(&status) {
        return Err(status_to_error(provider, status, &text));
    }
    serde_json::from_str(&text).map_err(|e| {
        ProviderError::invalid_response(provider, format!("malformed response body: {e}"))
    })
}

/// GET `url` and succeed on any 2xx status.
pub async fn get_ok(provider: &str, url: &str, headers: HeaderMap) -> Result<(), ProviderError> {
    let resp = shared_client()
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = resp.status().as_u16();
    if (200..300).contains(&status) {
        Ok(())
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(status_to_error(provider, status, &body))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
