//! Display formatting. Runs strictly after computation and never touches stored values.

use crate::types::{MetricKind, MetricName, WowDelta};

pub const NOT_AVAILABLE: &str = "N/A";

/// Billions of USD, two decimals.
pub fn format_currency(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.2}B", v / 1e9),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_share(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_metric(name: MetricName, value: Option<f64>) -> String {
    match name.kind() {
        MetricKind::Currency => format_currency(value),
        MetricKind::Share => format_share(value),
    }
}

/// Shares move in percentage points; currency amounts in relative percent.
pub fn format_wow(name: MetricName, delta: &WowDelta) -> String {
    match (name.kind(), delta) {
        (_, WowDelta::NotAvailable) => NOT_AVAILABLE.to_string(),
        (MetricKind::Share, WowDelta::Available { delta, .. }) => format!("{:+.2}pp", delta * 100.0),
        (MetricKind::Currency, WowDelta::Available { delta_pct: Some(pct), .. }) => {
            format!("{:+.2}%", pct * 100.0)
        }
        (MetricKind::Currency, WowDelta::Available { delta_pct: None, .. }) => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_missing(symbols: &[String]) -> String {
    if symbols.is_empty() {
        "none".to_string()
    } else {
        symbols.join(", ")
    }
}
