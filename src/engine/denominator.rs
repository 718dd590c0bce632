use std::collections::HashSet;

use crate::config::DENOMINATOR_SIZE;
use crate::error::{AppError, Result};
use crate::types::SupplyAsset;

pub const PEGGED_USD: &str = "peggedUSD";

/// Ordered, lowercase, duplicate-free candidate symbols for the volume denominator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenominatorSet {
    symbols: Vec<String>,
}

impl DenominatorSet {
    /// Normalizes to lowercase and drops repeats, keeping first occurrence order.
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let symbols = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        Self { symbols }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

/// Top `DENOMINATOR_SIZE` USD-pegged stablecoins by circulating supply.
///
/// Sorting is stable, so equal supplies keep their source order. A symbol seen twice
/// (case-insensitive) keeps only its larger, earlier entry. Fails when there are no
/// USD-pegged assets or a selected asset has non-positive supply.
pub fn build_denominator(assets: &[SupplyAsset]) -> Result<DenominatorSet> {
    let mut usd_assets: Vec<&SupplyAsset> = assets
        .iter()
        .filter(|a| a.peg_type == PEGGED_USD && !a.symbol.trim().is_empty())
        .collect();

    if usd_assets.is_empty() {
        return Err(AppError::MalformedData(
            "no peggedUSD assets in supply response".to_string(),
        ));
    }

    usd_assets.sort_by(|a, b| b.circulating_usd.total_cmp(&a.circulating_usd));

    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(DENOMINATOR_SIZE);
    for asset in usd_assets {
        let symbol = asset.symbol.trim().to_lowercase();
        if !seen.insert(symbol.clone()) {
            continue;
        }
        if asset.circulating_usd.is_nan() || asset.circulating_usd <= 0.0 {
            return Err(AppError::MalformedData(format!(
                "top-{DENOMINATOR_SIZE} asset {symbol} has non-positive circulating supply {}",
                asset.circulating_usd
            )));
        }
        selected.push(symbol);
        if selected.len() == DENOMINATOR_SIZE {
            break;
        }
    }

    Ok(DenominatorSet::new(selected))
}

/// USDC circulating supply: the largest USD-pegged entry whose symbol is USDC.
pub fn usdc_supply_usd(assets: &[SupplyAsset]) -> Option<f64> {
    assets
        .iter()
        .filter(|a| a.peg_type == PEGGED_USD && a.symbol.trim().eq_ignore_ascii_case("usdc"))
        .map(|a| a.circulating_usd)
        .filter(|v| v.is_finite())
        .reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn asset(symbol: &str, circulating: f64) -> SupplyAsset {
        SupplyAsset {
            symbol: symbol.to_string(),
            circulating_usd: circulating,
            peg_type: PEGGED_USD.to_string(),
        }
    }

    fn pegged(symbol: &str, circulating: f64, peg: &str) -> SupplyAsset {
        SupplyAsset {
            peg_type: peg.to_string(),
            ..asset(symbol, circulating)
        }
    }

    #[test]
    fn filters_sorts_and_lowercases() {
        let assets = vec![
            asset("DAI", 5.0),
            pegged("EURC", 500.0, "peggedEUR"),
            asset("USDT", 140.0),
            asset("USDC", 60.0),
        ];
        let set = build_denominator(&assets).unwrap();
        assert_eq!(set.symbols(), &["usdt", "usdc", "dai"]);
        assert!(!set.contains("eurc"));
    }

    #[test]
    fn ties_keep_source_order() {
        let assets = vec![asset("AAA", 10.0), asset("BBB", 20.0), asset("CCC", 10.0), asset("DDD", 10.0)];
        let set = build_denominator(&assets).unwrap();
        assert_eq!(set.symbols(), &["bbb", "aaa", "ccc", "ddd"]);
    }

    #[test]
    fn caps_at_twenty() {
        let assets: Vec<_> = (0..30).map(|i| asset(&format!("S{i}"), 1000.0 - i as f64)).collect();
        let set = build_denominator(&assets).unwrap();
        assert_eq!(set.len(), DENOMINATOR_SIZE);
        assert_eq!(set.symbols()[0], "s0");
        assert_eq!(set.symbols()[19], "s19");
    }

    #[test]
    fn case_insensitive_duplicates_keep_larger() {
        let assets = vec![asset("usdc", 10.0), asset("USDC", 60.0), asset("USDT", 100.0)];
        let set = build_denominator(&assets).unwrap();
        assert_eq!(set.symbols(), &["usdt", "usdc"]);
    }

    #[test]
    fn rejects_when_no_usd_assets() {
        let assets = vec![pegged("EURC", 10.0, "peggedEUR"), asset("   ", 5.0)];
        let err = build_denominator(&assets).unwrap_err();
        assert!(matches!(err, AppError::MalformedData(_)));
    }

    #[test]
    fn rejects_non_positive_in_top_twenty() {
        let assets = vec![asset("USDT", 100.0), asset("DEAD", 0.0)];
        assert!(build_denominator(&assets).is_err());

        let assets = vec![asset("USDT", 100.0), asset("NAN", f64::NAN)];
        assert!(build_denominator(&assets).is_err());
    }

    #[test]
    fn non_positive_outside_top_twenty_is_ignored() {
        let mut assets: Vec<_> = (0..20).map(|i| asset(&format!("S{i}"), 100.0 + i as f64)).collect();
        assets.push(asset("ZERO", 0.0));
        assert_eq!(build_denominator(&assets).unwrap().len(), 20);
    }

    #[test]
    fn usdc_supply_takes_max_usd_pegged_entry() {
        let assets = vec![
            asset("USDC", 10.0),
            asset("usdc", 60.0),
            pegged("USDC", 999.0, "peggedEUR"),
            asset("USDT", 100.0),
        ];
        assert_eq!(usdc_supply_usd(&assets), Some(60.0));
        assert_eq!(usdc_supply_usd(&[asset("USDT", 1.0)]), None);
    }

    #[test]
    fn new_normalizes_and_dedups() {
        let set = DenominatorSet::new(["USDT", "usdt", " Dai ", ""]);
        assert_eq!(set.symbols(), &["usdt", "dai"]);
    }

    proptest! {
        #[test]
        fn denominator_invariants(
            supplies in proptest::collection::vec((0usize..40, 1.0f64..1e12), 1..80)
        ) {
            let assets: Vec<_> = supplies
                .iter()
                .map(|(id, c)| asset(&format!("Coin{id}"), *c))
                .collect();
            let set = build_denominator(&assets).unwrap();

            prop_assert!(set.len() <= DENOMINATOR_SIZE);
            let unique: HashSet<_> = set.symbols().iter().collect();
            prop_assert_eq!(unique.len(), set.len());
            prop_assert!(set.symbols().iter().all(|s| *s == s.to_lowercase()));

            // Each symbol's best supply, in selection order, must be non-increasing.
            let best = |sym: &str| {
                assets
                    .iter()
                    .filter(|a| a.symbol.to_lowercase() == sym)
                    .map(|a| a.circulating_usd)
                    .fold(f64::MIN, f64::max)
            };
            let picked: Vec<f64> = set.symbols().iter().map(|s| best(s)).collect();
            prop_assert!(picked.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
