mod config;
mod engine;
mod error;
mod fetcher;
mod report;
mod runner;
mod schedule;
mod state;
mod types;

use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, MAX_HISTORY_ITEMS};
use crate::error::Result;
use crate::fetcher::{DefiLlamaSource, DuneSource, HttpClient};
use crate::report::{FailureReport, FeishuNotifier, WeeklyReport};
use crate::runner::run_once;
use crate::schedule::{report_now, should_run_now};
use crate::state::HistoryStore;

#[tokio::main]
async fn main() {
    // Values already in the environment win over .env
    dotenv::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    std::process::exit(run(cfg).await);
}

/// Returns the process exit code.
async fn run(cfg: Config) -> i32 {
    let now = report_now();
    if !should_run_now(now, cfg.force_run) {
        info!("Current time {now} is outside the Monday 07:00 (UTC+8) window, nothing to do");
        return 0;
    }

    let http = match HttpClient::new() {
        Ok(h) => h,
        Err(e) => {
            error!("Fatal error: {}", cfg.redact(&e.to_string()));
            return 1;
        }
    };

    let supply = DefiLlamaSource::new(http.clone(), &cfg);
    let volume = DuneSource::new(http.clone(), &cfg);
    let notifier = cfg
        .feishu_webhook_url
        .clone()
        .map(|url| FeishuNotifier::new(http.clone(), url));
    let mut store = HistoryStore::new(&cfg.history_path, MAX_HISTORY_ITEMS);
    info!("[HISTORY] using {}", store.path().display());

    match run_once(now, &supply, &volume, &mut store).await {
        Ok(outcome) => {
            let report = WeeklyReport::from_outcome(&outcome);
            info!(
                event = "REPORT_COMPUTED",
                missing = outcome.result.missing_symbols.len(),
                "metrics: {}",
                serde_json::to_string(&outcome.result.metrics).unwrap_or_default(),
            );
            match deliver(notifier.as_ref(), &report.card(), &report.text()).await {
                Ok(()) => {
                    info!("Weekly report completed successfully");
                    0
                }
                Err(e) => {
                    error!("[NOTIFY] report computed but not delivered: {}", cfg.redact(&e.to_string()));
                    1
                }
            }
        }
        Err(failure) => {
            let message = cfg.redact(&failure.error.to_string());
            error!(
                event = "REPORT_FAILED",
                kind = %failure.error.kind(),
                "Weekly report failed: {message}"
            );
            error!(
                "Partial metrics: {} | missing symbols: {}",
                serde_json::to_string(&failure.partial).unwrap_or_default(),
                report::format::format_missing(&failure.missing_symbols),
            );

            let report = FailureReport::new(now, message, &failure);
            if let Err(e) = deliver(notifier.as_ref(), &report.card(), &report.text()).await {
                error!("[NOTIFY] failure notification not sent: {}", cfg.redact(&e.to_string()));
            }
            1
        }
    }
}

async fn deliver(notifier: Option<&FeishuNotifier>, card: &Value, text: &str) -> Result<()> {
    match notifier {
        Some(n) => n.send(card, text).await,
        None => {
            warn!("FEISHU_WEBHOOK_URL is not set, skipping notification");
            info!("Report:\n{text}");
            Ok(())
        }
    }
}
