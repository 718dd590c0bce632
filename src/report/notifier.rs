use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::fetcher::HttpClient;
use crate::report::assembler::text_payload;

/// Feishu custom-bot webhook. Cards first, plain text as fallback.
pub struct FeishuNotifier {
    http: HttpClient,
    webhook_url: String,
}

impl FeishuNotifier {
    pub fn new(http: HttpClient, webhook_url: String) -> Self {
        Self { http, webhook_url }
    }

    pub async fn send(&self, card: &Value, fallback_text: &str) -> Result<()> {
        match self.post(card).await {
            Ok(()) => {
                info!("[NOTIFY] card delivered");
                Ok(())
            }
            Err(e) => {
                warn!("[NOTIFY] card send failed, retrying as text: {e}");
                self.post(&text_payload(fallback_text)).await?;
                info!("[NOTIFY] text fallback delivered");
                Ok(())
            }
        }
    }

    async fn post(&self, payload: &Value) -> Result<()> {
        let resp = self
            .http
            .post_json(&self.webhook_url, &[], payload)
            .await
            .map_err(strip_url)?;
        check_webhook_response(&resp)
    }
}

/// The webhook URL is a credential; keep it out of error text.
fn strip_url(e: AppError) -> AppError {
    match e {
        AppError::Http(e) => AppError::Http(e.without_url()),
        other => other,
    }
}

/// Feishu answers 200 with a body code; anything but 0 is a rejection.
pub fn check_webhook_response(resp: &Value) -> Result<()> {
    let code = resp.get("code").or_else(|| resp.get("StatusCode"));
    let accepted = match code {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        Some(Value::String(s)) => s == "0",
        Some(_) => false,
    };
    if accepted {
        return Ok(());
    }

    let message = ["msg", "StatusMessage"]
        .iter()
        .filter_map(|k| resp.get(*k).and_then(|m| m.as_str()))
        .find(|m| !m.is_empty())
        .unwrap_or("unknown error");
    Err(AppError::Notify(format!("Feishu webhook rejected request: {message}")))
}
