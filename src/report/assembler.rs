use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::{json, Value};

use crate::error::RunFailure;
use crate::report::format::{format_metric, format_missing, format_wow};
use crate::runner::RunOutcome;
use crate::schedule::ReportWindow;
use crate::types::{MetricName, Metrics, WowReport};

const TIME_LABEL: &str = "Beijing time";
const SOURCES_LINE: &str = "Supply: DefiLlama; transfer volume: Dune";

/// Outbound record for a completed run.
#[derive(Debug, Clone)]
pub struct WeeklyReport {
    pub run_time: DateTime<FixedOffset>,
    pub window: ReportWindow,
    pub metrics: Metrics,
    pub wow: WowReport,
    pub missing_symbols: Vec<String>,
    pub history_warning: Option<String>,
}

/// Outbound record for a failed run: the reason plus whatever was computed.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub run_time: DateTime<FixedOffset>,
    /// Already redacted.
    pub error_message: String,
    pub window: Option<ReportWindow>,
    pub partial: Metrics,
    pub missing_symbols: Vec<String>,
}

impl WeeklyReport {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            run_time: outcome.run_time,
            window: outcome.window,
            metrics: outcome.result.metrics,
            wow: outcome.wow.clone(),
            missing_symbols: outcome.result.missing_symbols.clone(),
            history_warning: outcome.history_warning.as_ref().map(|w| w.to_string()),
        }
    }

    pub fn title(&self) -> String {
        format!("USDC weekly report {}", self.window.end_date)
    }

    fn metric_lines(&self, markdown: bool) -> Vec<String> {
        MetricName::ALL
            .iter()
            .map(|&name| {
                let value = format_metric(name, self.metrics.get(name));
                let wow = format_wow(name, &self.wow.get(name));
                if markdown {
                    format!("**{}**: {value}  \nWoW: {wow}", name.label())
                } else {
                    format!("{}: {value} | WoW {wow}", name.label())
                }
            })
            .collect()
    }

    pub fn card(&self) -> Value {
        let mut sections = vec![
            format!("**Report date ({TIME_LABEL})**: {}", self.run_time.date_naive()),
            format!("**Window ({TIME_LABEL})**: {}", self.window),
        ];
        sections.extend(self.metric_lines(true));
        sections.push(format!("**missing_symbols**: {}", format_missing(&self.missing_symbols)));
        if let Some(warning) = &self.history_warning {
            sections.push(format!("**History warning**: {warning}"));
        }
        sections.push(format!("**Data sources**: {SOURCES_LINE}"));

        card_payload("blue", &self.title(), &sections.join("\n\n"))
    }

    pub fn text(&self) -> String {
        let mut lines = vec![
            self.title(),
            format!("Report date ({TIME_LABEL}): {}", self.run_time.date_naive()),
            format!("Window ({TIME_LABEL}): {}", self.window),
        ];
        lines.extend(self.metric_lines(false));
        lines.push(format!("missing_symbols: {}", format_missing(&self.missing_symbols)));
        if let Some(warning) = &self.history_warning {
            lines.push(format!("History warning: {warning}"));
        }
        lines.push(format!("Data sources: {SOURCES_LINE}"));
        lines.join("\n")
    }
}

impl FailureReport {
    pub fn new(run_time: DateTime<FixedOffset>, error_message: String, failure: &RunFailure) -> Self {
        Self {
            run_time,
            error_message,
            window: failure.window,
            partial: failure.partial,
            missing_symbols: failure.missing_symbols.clone(),
        }
    }

    fn window_text(&self) -> String {
        self.window.map(|w| w.to_string()).unwrap_or_else(|| "N/A".to_string())
    }

    fn run_time_text(&self) -> String {
        self.run_time.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    pub fn card(&self) -> Value {
        let mut sections = vec![
            format!("**Run time ({TIME_LABEL})**: {}", self.run_time_text()),
            format!("**Window ({TIME_LABEL})**: {}", self.window_text()),
            format!("**Failure reason**: {}", self.error_message),
        ];
        sections.extend(
            MetricName::ALL
                .iter()
                .map(|&n| format!("**{}**: {}", n.label(), format_metric(n, self.partial.get(n)))),
        );
        sections.push(format!("**missing_symbols**: {}", format_missing(&self.missing_symbols)));

        card_payload("red", "USDC weekly report failed", &sections.join("\n\n"))
    }

    pub fn text(&self) -> String {
        let mut lines = vec![
            format!("USDC weekly report failed: {}", self.error_message),
            format!("Run time ({TIME_LABEL}): {}", self.run_time_text()),
        ];
        if let Some(window) = self.window {
            lines.push(format!("Window ({TIME_LABEL}): {window}"));
        }
        lines.extend(
            MetricName::ALL
                .iter()
                .map(|&n| format!("{}: {}", n.label(), format_metric(n, self.partial.get(n)))),
        );
        lines.push(format!("missing_symbols: {}", format_missing(&self.missing_symbols)));
        lines.join("\n")
    }
}

/// Feishu interactive card with a single markdown element.
fn card_payload(template: &str, title: &str, content: &str) -> Value {
    json!({
        "msg_type": "interactive",
        "card": {
            "config": { "wide_screen_mode": true },
            "header": {
                "template": template,
                "title": { "tag": "plain_text", "content": title },
            },
            "elements": [
                { "tag": "markdown", "content": content }
            ],
        },
    })
}

/// Plain-text payload used when the card is rejected.
pub fn text_payload(text: &str) -> Value {
    json!({
        "msg_type": "text",
        "content": { "text": text },
    })
}
