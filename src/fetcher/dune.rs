use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{Config, DUNE_MAX_POLLS, DUNE_POLL_INTERVAL_SECS, DUNE_RESULT_PAGE_LIMIT};
use crate::error::{AppError, Result};
use crate::fetcher::http::HttpClient;
use crate::fetcher::{number_of, VolumeSource};
use crate::schedule::ReportWindow;
use crate::types::VolumeRow;

/// Column names accepted for the token symbol, in priority order.
pub const SYMBOL_COLUMNS: &[&str] = &["symbol", "token_symbol", "asset", "stablecoin", "project"];

/// Column names accepted for the 7-day USD volume, in priority order.
pub const VOLUME_COLUMNS: &[&str] = &[
    "volume_7d_usd",
    "volume_usd_7d",
    "transfer_volume_usd",
    "volume_usd",
    "amount_usd",
    "volume",
];

/// Outcome of one status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Completed,
}

/// 7-day transfer volume per symbol from a saved Dune query.
pub struct DuneSource {
    http: HttpClient,
    api_url: String,
    api_key: String,
    query_id: u64,
    window_params: bool,
    poll_interval: Duration,
}

impl DuneSource {
    pub fn new(http: HttpClient, cfg: &Config) -> Self {
        Self {
            http,
            api_url: cfg.dune_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.dune_api_key.clone(),
            query_id: cfg.dune_query_id,
            window_params: cfg.dune_window_params,
            poll_interval: Duration::from_secs(DUNE_POLL_INTERVAL_SECS),
        }
    }

    fn headers(&self) -> [(&str, &str); 1] {
        [("X-Dune-API-Key", self.api_key.as_str())]
    }

    async fn execute(&self, window: &ReportWindow) -> Result<String> {
        let mut body = json!({ "performance": "medium" });
        if self.window_params {
            body["query_parameters"] = json!({
                "start_date": window.start_date.to_string(),
                "end_date": window.end_date.to_string(),
            });
        }

        let url = format!("{}/query/{}/execute", self.api_url, self.query_id);
        let resp = self.http.post_json(&url, &self.headers(), &body).await?;
        let execution_id = match resp.get("execution_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(AppError::MalformedData(
                    "Dune execute response is missing execution_id".to_string(),
                ))
            }
        };
        info!("[DUNE] query {} submitted, execution_id={execution_id}", self.query_id);
        Ok(execution_id)
    }

    async fn wait_for_completion(&self, execution_id: &str) -> Result<()> {
        let url = format!("{}/execution/{execution_id}/status", self.api_url);
        for attempt in 0..DUNE_MAX_POLLS {
            let status = self.http.get_json(&url, &self.headers(), &[]).await?;
            if classify_status(&status)? == ExecutionState::Completed {
                info!("[DUNE] execution {execution_id} completed after {} polls", attempt + 1);
                return Ok(());
            }
            debug!("[DUNE] execution {execution_id} pending (poll {})", attempt + 1);
            if attempt + 1 < DUNE_MAX_POLLS {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(AppError::Upstream(format!(
            "Dune execution {execution_id} timed out after {DUNE_MAX_POLLS} polls"
        )))
    }

    async fn fetch_rows(&self, execution_id: &str) -> Result<Vec<Value>> {
        let url = format!("{}/execution/{execution_id}/results", self.api_url);
        let mut rows = Vec::new();
        let mut offset = 0u64;

        loop {
            let query = [
                ("offset", offset.to_string()),
                ("limit", DUNE_RESULT_PAGE_LIMIT.to_string()),
                ("allow_partial_results", "true".to_string()),
            ];
            let page = self.http.get_json(&url, &self.headers(), &query).await?;
            let page_rows = page
                .get("result")
                .and_then(|r| r.get("rows"))
                .and_then(|r| r.as_array())
                .ok_or_else(|| {
                    AppError::MalformedData("Dune result payload has no result.rows list".to_string())
                })?;
            rows.extend(page_rows.iter().filter(|r| r.is_object()).cloned());

            match page.get("next_offset").and_then(|o| o.as_u64()) {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }

        if rows.is_empty() {
            return Err(AppError::MalformedData("Dune query returned no rows".to_string()));
        }
        debug!("[DUNE] fetched {} result rows", rows.len());
        Ok(rows)
    }
}

impl VolumeSource for DuneSource {
    async fn fetch_volumes(&self, window: &ReportWindow) -> Result<Vec<VolumeRow>> {
        info!("[DUNE] fetching transfer volume for {window}");
        let execution_id = self.execute(window).await?;
        self.wait_for_completion(&execution_id).await?;
        let rows = self.fetch_rows(&execution_id).await?;
        extract_volume_rows(&rows)
    }
}

/// Interpret a status payload. Terminal failures become errors carrying Dune's message.
pub fn classify_status(status: &Value) -> Result<ExecutionState> {
    let state = status.get("state").and_then(|s| s.as_str()).unwrap_or("");
    match state {
        "QUERY_STATE_COMPLETED" | "QUERY_STATE_COMPLETED_PARTIAL" => Ok(ExecutionState::Completed),
        "QUERY_STATE_FAILED" | "QUERY_STATE_CANCELED" | "QUERY_STATE_EXPIRED" => {
            let message = status
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Dune query execution failed with state {state}"));
            Err(AppError::Upstream(message))
        }
        _ if status.get("is_execution_finished").and_then(|f| f.as_bool()) == Some(true) => {
            Err(AppError::Upstream(format!(
                "Dune execution finished in unexpected state: {}",
                if state.is_empty() { "unknown" } else { state }
            )))
        }
        _ => Ok(ExecutionState::Pending),
    }
}

/// Resolve column aliases into normalized rows. Rows without a usable symbol and
/// numeric volume are skipped; no usable rows at all is malformed data.
pub fn extract_volume_rows(rows: &[Value]) -> Result<Vec<VolumeRow>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(obj) = row.as_object() else { continue };
        let lowered: HashMap<String, &Value> =
            obj.iter().map(|(k, v)| (k.to_lowercase(), v)).collect();

        let Some(symbol) = first_column(&lowered, SYMBOL_COLUMNS).and_then(symbol_of) else {
            continue;
        };
        let Some(volume) = first_column(&lowered, VOLUME_COLUMNS).and_then(number_of) else {
            continue;
        };
        out.push(VolumeRow {
            symbol,
            volume_7d_usd: volume,
        });
    }

    if out.is_empty() {
        return Err(AppError::MalformedData(
            "Dune rows have no usable symbol/volume columns (expected e.g. symbol + volume_7d_usd)"
                .to_string(),
        ));
    }
    Ok(out)
}

fn first_column<'a>(row: &HashMap<String, &'a Value>, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|c| row.get(*c).copied())
        .find(|v| !v.is_null())
}

fn symbol_of(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}
