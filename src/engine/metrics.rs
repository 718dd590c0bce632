use std::collections::HashMap;

use tracing::debug;

use crate::engine::denominator::DenominatorSet;
use crate::error::{AppError, Result};
use crate::types::{Metrics, MetricsResult, VolumeRow};

pub const USDC: &str = "usdc";

/// Supply-side metrics only. Used on its own when the volume side fails.
///
/// `total_supply_usd` is reported whenever it is a finite non-negative number; the share
/// needs a strictly positive total and a known USDC supply.
pub fn supply_metrics(usdc_supply: Option<f64>, total_supply: f64) -> Metrics {
    let usdc_supply_usd = usdc_supply.filter(|v| v.is_finite() && *v >= 0.0);
    let total_supply_usd = Some(total_supply).filter(|v| v.is_finite() && *v >= 0.0);
    let usdc_supply_share = match (usdc_supply_usd, total_supply_usd) {
        (Some(usdc), Some(total)) if total > 0.0 => Some(usdc / total),
        _ => None,
    };
    Metrics {
        total_supply_usd,
        usdc_supply_usd,
        usdc_supply_share,
        usdc_transfer_volume_share_7d: None,
    }
}

/// Sum volume per lowercase symbol. Duplicate rows accumulate.
pub fn volume_by_symbol(rows: &[VolumeRow]) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::with_capacity(rows.len());
    for row in rows {
        let symbol = row.symbol.trim().to_lowercase();
        if symbol.is_empty() {
            continue;
        }
        *totals.entry(symbol).or_insert(0.0) += row.volume_7d_usd;
    }
    totals
}

fn usable_volume(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Reconcile the denominator against the volume rows and derive all four metrics.
///
/// Missing or invalid denominator symbols are recorded, not raised. Errors only when the
/// denominator is empty or neither supply figure is usable.
pub fn compute(
    denominator: &DenominatorSet,
    volume_rows: &[VolumeRow],
    usdc_supply: Option<f64>,
    total_supply: f64,
) -> Result<MetricsResult> {
    if denominator.is_empty() {
        return Err(AppError::MalformedData("denominator set is empty".to_string()));
    }

    let mut metrics = supply_metrics(usdc_supply, total_supply);
    let total_usable = metrics.total_supply_usd.is_some_and(|t| t > 0.0);
    if metrics.usdc_supply_usd.is_none() && !total_usable {
        return Err(AppError::MalformedData(format!(
            "both supply figures unusable (usdc={usdc_supply:?}, total={total_supply})"
        )));
    }

    let volumes = volume_by_symbol(volume_rows);

    let mut missing_symbols = Vec::new();
    let mut counted_symbols = Vec::new();
    let mut denominator_volume_total = 0.0;
    for symbol in denominator.symbols() {
        match volumes.get(symbol) {
            Some(&v) if usable_volume(v) => {
                denominator_volume_total += v;
                counted_symbols.push(symbol.clone());
            }
            _ => missing_symbols.push(symbol.clone()),
        }
    }

    let usdc_volume = volumes.get(USDC).copied().filter(|v| usable_volume(*v));
    if usdc_volume.is_none() && !missing_symbols.iter().any(|s| s == USDC) {
        missing_symbols.push(USDC.to_string());
    }

    metrics.usdc_transfer_volume_share_7d = match usdc_volume {
        Some(usdc) if denominator_volume_total > 0.0 => Some(usdc / denominator_volume_total),
        _ => None,
    };

    debug!(
        counted = counted_symbols.len(),
        missing = missing_symbols.len(),
        denominator_volume_total,
        "[METRICS] reconciled denominator against volume rows"
    );

    Ok(MetricsResult {
        metrics,
        missing_symbols,
        counted_symbols,
        denominator_volume_total,
    })
}
