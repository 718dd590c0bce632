use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::schedule::ReportWindow;

// ---------------------------------------------------------------------------
// Source rows
// ---------------------------------------------------------------------------

/// One stablecoin from the supply source.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyAsset {
    pub symbol: String,
    pub circulating_usd: f64,
    pub peg_type: String,
}

/// Everything the supply source returns for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplySnapshot {
    pub assets: Vec<SupplyAsset>,
    pub total_supply_usd: f64,
}

/// 7-day transfer volume for one symbol, already de-aliased by the adapter.
/// Symbol casing is whatever the source returned.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRow {
    pub symbol: String,
    pub volume_7d_usd: f64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Absolute USD amount.
    Currency,
    /// Ratio in [0, 1].
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    TotalSupplyUsd,
    UsdcSupplyUsd,
    UsdcSupplyShare,
    UsdcTransferVolumeShare7d,
}

impl MetricName {
    /// Report order.
    pub const ALL: [MetricName; 4] = [
        MetricName::TotalSupplyUsd,
        MetricName::UsdcSupplyUsd,
        MetricName::UsdcSupplyShare,
        MetricName::UsdcTransferVolumeShare7d,
    ];

    pub fn kind(self) -> MetricKind {
        match self {
            MetricName::TotalSupplyUsd | MetricName::UsdcSupplyUsd => MetricKind::Currency,
            MetricName::UsdcSupplyShare | MetricName::UsdcTransferVolumeShare7d => MetricKind::Share,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricName::TotalSupplyUsd => "Total stablecoin supply",
            MetricName::UsdcSupplyUsd => "USDC supply",
            MetricName::UsdcSupplyShare => "USDC supply share",
            MetricName::UsdcTransferVolumeShare7d => "USDC 7d on-chain transfer volume share",
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetricName::TotalSupplyUsd => "total_supply_usd",
            MetricName::UsdcSupplyUsd => "usdc_supply_usd",
            MetricName::UsdcSupplyShare => "usdc_supply_share",
            MetricName::UsdcTransferVolumeShare7d => "usdc_transfer_volume_share_7d",
        };
        write!(f, "{s}")
    }
}

/// The four tracked metrics. `None` = unavailable for this run (serialized as `null`).
/// Values are raw, never rounded. Reading accepts numeric strings; anything else
/// non-numeric reads as unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, deserialize_with = "metric_value")]
    pub total_supply_usd: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub usdc_supply_usd: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub usdc_supply_share: Option<f64>,
    #[serde(default, deserialize_with = "metric_value")]
    pub usdc_transfer_volume_share_7d: Option<f64>,
}

fn metric_value<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(number_of).filter(|v| v.is_finite()))
}

/// JSON number or numeric string -> f64.
pub(crate) fn number_of(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

impl Metrics {
    pub fn get(&self, name: MetricName) -> Option<f64> {
        match name {
            MetricName::TotalSupplyUsd => self.total_supply_usd,
            MetricName::UsdcSupplyUsd => self.usdc_supply_usd,
            MetricName::UsdcSupplyShare => self.usdc_supply_share,
            MetricName::UsdcTransferVolumeShare7d => self.usdc_transfer_volume_share_7d,
        }
    }
}

/// Output of one metrics computation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsResult {
    pub metrics: Metrics,
    /// Denominator candidates absent or invalid in the volume rows, in denominator order.
    /// `usdc` is appended when its own volume is unknown.
    pub missing_symbols: Vec<String>,
    /// Symbols whose volume went into `denominator_volume_total`.
    pub counted_symbols: Vec<String>,
    pub denominator_volume_total: f64,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One persisted run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub run_time_beijing: DateTime<FixedOffset>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: Metrics,
    #[serde(default)]
    pub missing_symbols: Vec<String>,
}

impl HistoryRecord {
    /// Only a computed `MetricsResult` can become a record.
    pub fn new(run_time: DateTime<FixedOffset>, window: ReportWindow, result: &MetricsResult) -> Self {
        Self {
            run_time_beijing: run_time,
            start_date: window.start_date,
            end_date: window.end_date,
            metrics: result.metrics,
            missing_symbols: result.missing_symbols.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Week-over-week
// ---------------------------------------------------------------------------

/// Change of one metric against the previous run. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WowDelta {
    Available {
        previous: f64,
        current: f64,
        delta: f64,
        /// `None` when the previous value is zero.
        delta_pct: Option<f64>,
    },
    NotAvailable,
}

impl WowDelta {
    pub fn is_available(&self) -> bool {
        matches!(self, WowDelta::Available { .. })
    }
}

/// WoW deltas for all four metrics, in `MetricName::ALL` order.
#[derive(Debug, Clone, PartialEq)]
pub struct WowReport {
    pub deltas: [(MetricName, WowDelta); 4],
}

impl WowReport {
    pub fn get(&self, name: MetricName) -> WowDelta {
        self.deltas
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| *d)
            .unwrap_or(WowDelta::NotAvailable)
    }
}
