use crate::types::{HistoryRecord, MetricName, Metrics, WowDelta, WowReport};

/// Compare one metric against its previous value.
pub fn delta(previous: Option<f64>, current: Option<f64>) -> WowDelta {
    match (previous, current) {
        (Some(previous), Some(current)) if previous.is_finite() && current.is_finite() => {
            let delta = current - previous;
            let delta_pct = (previous != 0.0).then(|| delta / previous);
            WowDelta::Available {
                previous,
                current,
                delta,
                delta_pct,
            }
        }
        _ => WowDelta::NotAvailable,
    }
}

/// WoW for all four metrics against the most recent stored run, if any.
pub fn compare(previous: Option<&HistoryRecord>, current: &Metrics) -> WowReport {
    let deltas = MetricName::ALL.map(|name| {
        let prev = previous.and_then(|r| r.metrics.get(name));
        (name, delta(prev, current.get(name)))
    });
    WowReport { deltas }
}
