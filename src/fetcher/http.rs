use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::warn;

use crate::config::{REQUEST_TIMEOUT_SECS, RETRY_BACKOFF_MS};
use crate::error::{AppError, Result};

/// Shared reqwest client with a fixed timeout and bounded retries.
/// Connection setup is reused across every source and the notifier.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    pub async fn get_json(&self, url: &str, headers: &[(&str, &str)], query: &[(&str, String)]) -> Result<Value> {
        self.send_json(url, |c| with_headers(c.get(url), headers).query(query))
            .await
    }

    pub async fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value> {
        self.send_json(url, |c| with_headers(c.post(url), headers).json(body))
            .await
    }

    /// Send, retrying transient failures (connect, timeout, 429, 5xx) with backoff.
    /// The body must be JSON; anything else is malformed data.
    async fn send_json<F>(&self, url: &str, build: F) -> Result<Value>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            let outcome = match build(&self.client).send().await {
                Ok(resp) => resp.error_for_status(),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(resp) => {
                    let body = resp.text().await?;
                    return serde_json::from_str(&body).map_err(|e| {
                        AppError::MalformedData(format!("non-JSON response from {}: {e}", host_of(url)))
                    });
                }
                Err(e) if is_retryable(&e) && attempt < RETRY_BACKOFF_MS.len() => {
                    let backoff = RETRY_BACKOFF_MS[attempt];
                    attempt += 1;
                    warn!(
                        "[HTTP] {} attempt {attempt} failed (status={:?}, timeout={}, connect={}), retrying in {backoff}ms",
                        host_of(url),
                        e.status(),
                        e.is_timeout(),
                        e.is_connect(),
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn with_headers(mut req: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    req
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(e: &reqwest::Error) -> bool {
    match e.status() {
        Some(status) => is_retryable_status(status),
        None => e.is_connect() || e.is_timeout(),
    }
}

/// Scheme + host only, so tokens embedded in paths never reach the logs.
fn host_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}
