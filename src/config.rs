use std::path::PathBuf;

use crate::error::{AppError, Result};

pub const DEFILLAMA_STABLECOINS_URL: &str = "https://stablecoins.llama.fi/stablecoins";
pub const DEFILLAMA_CHART_URL: &str = "https://stablecoins.llama.fi/stablecoincharts/all";
pub const DUNE_API_URL: &str = "https://api.dune.com/api/v1";

pub const HISTORY_PATH: &str = "data/weekly_history.json";

/// Maximum records kept in the history file. Oldest entries are evicted first.
pub const MAX_HISTORY_ITEMS: usize = 52;

/// Size of the stablecoin denominator set for the transfer-volume share.
pub const DENOMINATOR_SIZE: usize = 20;

/// Per-request timeout for every outbound HTTP call (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Backoff before each retry in milliseconds. Length = number of retries (3 attempts total).
pub const RETRY_BACKOFF_MS: &[u64] = &[1_000, 2_000];

/// Dune execution status poll interval (seconds).
pub const DUNE_POLL_INTERVAL_SECS: u64 = 5;

/// Polls before a Dune execution is considered timed out.
pub const DUNE_MAX_POLLS: u32 = 120;

/// Rows requested per Dune results page.
pub const DUNE_RESULT_PAGE_LIMIT: usize = 1000;

/// Weekly run gate, evaluated in the report timezone.
pub mod schedule {
    use chrono::Weekday;

    /// Report timezone offset from UTC (Beijing time).
    pub const REPORT_UTC_OFFSET_SECS: i32 = 8 * 3600;
    pub const RUN_WEEKDAY: Weekday = Weekday::Mon;
    pub const RUN_HOUR: u32 = 7;
    pub const RUN_MINUTE: u32 = 0;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub history_path: PathBuf,
    pub dune_api_key: String,
    pub dune_query_id: u64,
    pub dune_api_url: String,
    /// Send the report window as `start_date`/`end_date` query parameters (DUNE_WINDOW_PARAMS=1)
    pub dune_window_params: bool,
    pub defillama_stablecoins_url: String,
    pub defillama_chart_url: String,
    /// Notification target. Notification is skipped when unset.
    pub feishu_webhook_url: Option<String>,
    /// Bypass the Monday 07:00 gate (FORCE_RUN=1)
    pub force_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dune_query_id = required_var("DUNE_QUERY_ID")?
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Config("DUNE_QUERY_ID must be a positive integer".to_string()))?;

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            history_path: std::env::var("HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(HISTORY_PATH)),
            dune_api_key: required_var("DUNE_API_KEY")?,
            dune_query_id,
            dune_api_url: std::env::var("DUNE_API_URL").unwrap_or_else(|_| DUNE_API_URL.to_string()),
            dune_window_params: flag_var("DUNE_WINDOW_PARAMS"),
            defillama_stablecoins_url: std::env::var("DEFILLAMA_STABLECOINS_URL")
                .unwrap_or_else(|_| DEFILLAMA_STABLECOINS_URL.to_string()),
            defillama_chart_url: std::env::var("DEFILLAMA_CHART_URL")
                .unwrap_or_else(|_| DEFILLAMA_CHART_URL.to_string()),
            feishu_webhook_url: optional_var("FEISHU_WEBHOOK_URL"),
            force_run: flag_var("FORCE_RUN"),
        })
    }

    /// Mask secrets before text leaves the process (logs, notifications).
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        let secrets = [Some(self.dune_api_key.as_str()), self.feishu_webhook_url.as_deref()];
        for secret in secrets.into_iter().flatten() {
            if !secret.is_empty() {
                out = out.replace(secret, "***");
            }
        }
        out
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| AppError::Config(format!("missing required environment variable: {name}")))
}

fn flag_var(name: &str) -> bool {
    optional_var(name).as_deref() == Some("1")
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        log_level: "debug".to_string(),
        history_path: PathBuf::from(HISTORY_PATH),
        dune_api_key: "dune-secret-key".to_string(),
        dune_query_id: 42,
        dune_api_url: DUNE_API_URL.to_string(),
        dune_window_params: false,
        defillama_stablecoins_url: DEFILLAMA_STABLECOINS_URL.to_string(),
        defillama_chart_url: DEFILLAMA_CHART_URL.to_string(),
        feishu_webhook_url: Some("https://open.feishu.cn/hook/abc123".to_string()),
        force_run: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_masks_api_key_and_webhook() {
        let cfg = test_config();
        let msg = "POST https://open.feishu.cn/hook/abc123 failed, key=dune-secret-key";
        let out = cfg.redact(msg);
        assert_eq!(out, "POST *** failed, key=***");
    }

    #[test]
    fn redact_without_webhook_only_masks_key() {
        let mut cfg = test_config();
        cfg.feishu_webhook_url = None;
        assert_eq!(cfg.redact("dune-secret-key here"), "*** here");
    }
}
