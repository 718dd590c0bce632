use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::engine::metrics::USDC;
use crate::engine::{build_denominator, compute, supply_metrics, usdc_supply_usd, wow};
use crate::error::{AppError, RunFailure};
use crate::fetcher::{SupplySource, VolumeSource};
use crate::schedule::{report_window, ReportWindow};
use crate::state::{HistoryStore, HistoryWarning};
use crate::types::{HistoryRecord, Metrics, MetricsResult, WowReport};

/// Everything one successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_time: DateTime<FixedOffset>,
    pub window: ReportWindow,
    pub result: MetricsResult,
    pub wow: WowReport,
    /// Set when stored history could not be used as-is.
    pub history_warning: Option<HistoryWarning>,
}

/// Process one weekly window end to end.
///
/// Both sources are fetched concurrently and must both succeed before anything is
/// computed. History is only appended after metrics exist, so an aborted or failed
/// run leaves the store untouched.
pub async fn run_once<S, V>(
    now: DateTime<FixedOffset>,
    supply: &S,
    volume: &V,
    store: &mut HistoryStore,
) -> Result<RunOutcome, RunFailure>
where
    S: SupplySource,
    V: VolumeSource,
{
    let window = report_window(now);
    let fail = |error: AppError, partial: Metrics, missing_symbols: Vec<String>| RunFailure {
        window: Some(window),
        partial,
        missing_symbols,
        ..RunFailure::new(error)
    };

    info!("[RUN] window {window}: fetching supply and transfer volume");
    let (supply_res, volume_res) = tokio::join!(supply.fetch_supply(), volume.fetch_volumes(&window));

    let snapshot = supply_res.map_err(|e| fail(e, Metrics::default(), Vec::new()))?;
    let usdc_supply = usdc_supply_usd(&snapshot.assets);
    if usdc_supply.is_none() {
        warn!("[RUN] USDC not found among peggedUSD assets");
    }
    let partial = supply_metrics(usdc_supply, snapshot.total_supply_usd);

    let rows = volume_res.map_err(|e| fail(e, partial, Vec::new()))?;
    let denominator = build_denominator(&snapshot.assets).map_err(|e| fail(e, partial, Vec::new()))?;
    info!(
        "[RUN] denominator: {} symbols ({}), {} volume rows",
        denominator.len(),
        denominator.symbols().join(","),
        rows.len()
    );
    if !denominator.contains(USDC) {
        info!(
            "[RUN] usdc is outside the top-{} set; its volume is still measured against it",
            denominator.len()
        );
    }

    let result = compute(&denominator, &rows, usdc_supply, snapshot.total_supply_usd)
        .map_err(|e| fail(e, partial, Vec::new()))?;
    if !result.missing_symbols.is_empty() {
        warn!("[RUN] missing symbols: {}", result.missing_symbols.join(", "));
    }

    let history_warning = store
        .load()
        .map_err(|e| fail(e, result.metrics, result.missing_symbols.clone()))?;
    if let Some(w) = &history_warning {
        warn!("[HISTORY] {w}");
    }
    if store.is_empty() {
        info!("[RUN] no stored history, WoW starts next week");
    }

    let wow = wow::compare(store.previous(), &result.metrics);
    info!(
        "[RUN] WoW available for {}/{} metrics",
        wow.deltas.iter().filter(|(_, d)| d.is_available()).count(),
        wow.deltas.len()
    );
    store
        .append(HistoryRecord::new(now, window, &result))
        .map_err(|e| fail(e, result.metrics, result.missing_symbols.clone()))?;
    info!("[RUN] history updated ({} records)", store.len());

    Ok(RunOutcome {
        run_time: now,
        window,
        result,
        wow,
        history_warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    use crate::config::MAX_HISTORY_ITEMS;
    use crate::error::{ErrorKind, Result};
    use crate::schedule::report_tz;
    use crate::types::{MetricName, SupplyAsset, SupplySnapshot, VolumeRow, WowDelta};

    struct FakeSupply {
        assets: Vec<(&'static str, f64)>,
        total: f64,
        fail: bool,
    }

    impl SupplySource for FakeSupply {
        async fn fetch_supply(&self) -> Result<SupplySnapshot> {
            if self.fail {
                return Err(AppError::Upstream("DefiLlama unreachable".into()));
            }
            Ok(SupplySnapshot {
                assets: self
                    .assets
                    .iter()
                    .map(|(s, c)| SupplyAsset {
                        symbol: s.to_string(),
                        circulating_usd: *c,
                        peg_type: "peggedUSD".to_string(),
                    })
                    .collect(),
                total_supply_usd: self.total,
            })
        }
    }

    struct FakeVolume {
        rows: Vec<(&'static str, f64)>,
        fail: bool,
        calls: Cell<u32>,
    }

    impl VolumeSource for FakeVolume {
        async fn fetch_volumes(&self, _window: &ReportWindow) -> Result<Vec<VolumeRow>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(AppError::Upstream("Dune execution failed".into()));
            }
            Ok(self
                .rows
                .iter()
                .map(|(s, v)| VolumeRow {
                    symbol: s.to_string(),
                    volume_7d_usd: *v,
                })
                .collect())
        }
    }

    fn supply(usdc: f64, total: f64) -> FakeSupply {
        FakeSupply {
            assets: vec![("USDT", 140.0), ("USDC", usdc), ("DAI", 5.0)],
            total,
            fail: false,
        }
    }

    fn volume(rows: Vec<(&'static str, f64)>) -> FakeVolume {
        FakeVolume {
            rows,
            fail: false,
            calls: Cell::new(0),
        }
    }

    fn monday(day: u32) -> DateTime<FixedOffset> {
        report_tz().with_ymd_and_hms(2026, 10, day, 7, 0, 0).unwrap()
    }

    fn store_in(tmp: &TempDir) -> HistoryStore {
        HistoryStore::new(tmp.path().join("weekly_history.json"), MAX_HISTORY_ITEMS)
    }

    #[tokio::test]
    async fn first_run_writes_history_without_wow() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let vol = volume(vec![("USDT", 300.0), ("usdc", 100.0), ("DAI", 100.0)]);

        let outcome = run_once(monday(12), &supply(60.0, 200.0), &vol, &mut store).await.unwrap();

        assert_eq!(vol.calls.get(), 1);
        assert!(outcome.wow.deltas.iter().all(|(_, d)| *d == WowDelta::NotAvailable));
        assert_eq!(outcome.result.metrics.usdc_supply_share, Some(0.3));
        assert_eq!(outcome.result.metrics.usdc_transfer_volume_share_7d, Some(0.2));
        assert!(outcome.history_warning.is_none());
        assert_eq!(outcome.window.to_string(), "2026-10-05 to 2026-10-11");

        let mut reloaded = store_in(&tmp);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.previous().unwrap().metrics, outcome.result.metrics);
    }

    #[tokio::test]
    async fn second_run_reports_wow_against_previous() {
        let tmp = TempDir::new().unwrap();
        let vol = volume(vec![("usdt", 300.0), ("usdc", 100.0), ("dai", 100.0)]);

        let mut store = store_in(&tmp);
        run_once(monday(5), &supply(55.0, 100.0), &vol, &mut store).await.unwrap();

        let mut store = store_in(&tmp);
        let outcome = run_once(monday(12), &supply(60.0, 100.0), &vol, &mut store).await.unwrap();

        match outcome.wow.get(MetricName::UsdcSupplyShare) {
            WowDelta::Available { delta, delta_pct, .. } => {
                assert!((delta - 0.05).abs() < 1e-12);
                assert!((delta_pct.unwrap() - 0.0909).abs() < 1e-4);
            }
            WowDelta::NotAvailable => panic!("expected WoW on second run"),
        }
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn volume_failure_keeps_supply_metrics_and_skips_history() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let mut vol = volume(vec![]);
        vol.fail = true;

        let failure = run_once(monday(12), &supply(60.0, 200.0), &vol, &mut store).await.unwrap_err();

        assert_eq!(failure.error.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(failure.partial.total_supply_usd, Some(200.0));
        assert_eq!(failure.partial.usdc_supply_share, Some(0.3));
        assert_eq!(failure.partial.usdc_transfer_volume_share_7d, None);
        assert!(failure.window.is_some());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn supply_failure_still_waits_for_volume_and_skips_history() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let mut sup = supply(60.0, 200.0);
        sup.fail = true;
        let vol = volume(vec![("usdc", 1.0)]);

        let failure = run_once(monday(12), &sup, &vol, &mut store).await.unwrap_err();

        assert_eq!(vol.calls.get(), 1);
        assert_eq!(failure.partial, Metrics::default());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn zero_total_supply_still_completes() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let vol = volume(vec![("usdt", 300.0), ("usdc", 100.0)]);

        let outcome = run_once(monday(12), &supply(60.0, 0.0), &vol, &mut store).await.unwrap();

        assert_eq!(outcome.result.metrics.usdc_supply_share, None);
        assert_eq!(outcome.result.metrics.usdc_transfer_volume_share_7d, Some(0.25));
        assert_eq!(outcome.result.missing_symbols, vec!["dai"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn both_ratios_unavailable_is_still_recorded() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let vol = volume(vec![("frax", 10.0)]);

        let outcome = run_once(monday(12), &supply(60.0, 0.0), &vol, &mut store).await.unwrap();

        assert_eq!(outcome.result.metrics.usdc_supply_share, None);
        assert_eq!(outcome.result.metrics.usdc_transfer_volume_share_7d, None);
        assert_eq!(outcome.result.missing_symbols, vec!["usdt", "usdc", "dai"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_history_is_reported_and_replaced() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        fs::write(store.path(), "not json").unwrap();
        let vol = volume(vec![("usdt", 1.0), ("usdc", 1.0), ("dai", 1.0)]);

        let outcome = run_once(monday(12), &supply(60.0, 200.0), &vol, &mut store).await.unwrap();

        assert!(matches!(outcome.history_warning, Some(HistoryWarning::Corrupt { .. })));
        assert!(outcome.wow.deltas.iter().all(|(_, d)| !d.is_available()));
        let mut reloaded = store_in(&tmp);
        assert_eq!(reloaded.load().unwrap(), None);
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_latest_history_entry_gives_no_wow() {
        let tmp = TempDir::new().unwrap();
        let vol = volume(vec![("usdt", 300.0), ("usdc", 100.0), ("dai", 100.0)]);
        let mut store = store_in(&tmp);
        run_once(monday(5), &supply(40.0, 100.0), &vol, &mut store).await.unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let mut history: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let mut broken = history[0].clone();
        broken["end_date"] = serde_json::json!("not a date");
        history.as_array_mut().unwrap().push(broken);
        fs::write(store.path(), history.to_string()).unwrap();

        let mut store = store_in(&tmp);
        let outcome = run_once(monday(12), &supply(60.0, 100.0), &vol, &mut store).await.unwrap();

        assert_eq!(
            outcome.history_warning,
            Some(HistoryWarning::SkippedEntries { count: 1, latest: true })
        );
        assert!(outcome.wow.deltas.iter().all(|(_, d)| !d.is_available()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.previous().unwrap().end_date, outcome.window.end_date);
    }

    #[tokio::test]
    async fn bad_denominator_fails_with_partial_supply() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let sup = FakeSupply {
            assets: vec![("USDT", 140.0), ("USDC", 60.0), ("DEAD", 0.0)],
            total: 200.0,
            fail: false,
        };
        let vol = volume(vec![("usdc", 1.0)]);

        let failure = run_once(monday(12), &sup, &vol, &mut store).await.unwrap_err();

        assert_eq!(failure.error.kind(), ErrorKind::MalformedData);
        assert_eq!(failure.partial.usdc_supply_usd, Some(60.0));
        assert!(!store.path().exists());
    }
}
