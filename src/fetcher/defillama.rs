use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::http::HttpClient;
use crate::fetcher::{number_of, SupplySource};
use crate::types::{SupplyAsset, SupplySnapshot};

/// Stablecoin supply from DefiLlama: per-asset list plus the market-wide chart.
pub struct DefiLlamaSource {
    http: HttpClient,
    stablecoins_url: String,
    chart_url: String,
}

impl DefiLlamaSource {
    pub fn new(http: HttpClient, cfg: &Config) -> Self {
        Self {
            http,
            stablecoins_url: cfg.defillama_stablecoins_url.clone(),
            chart_url: cfg.defillama_chart_url.clone(),
        }
    }
}

impl SupplySource for DefiLlamaSource {
    async fn fetch_supply(&self) -> Result<SupplySnapshot> {
        info!("[SUPPLY] fetching DefiLlama stablecoin list and total supply chart");
        let (list, chart) = tokio::try_join!(
            self.http.get_json(&self.stablecoins_url, &[], &[]),
            self.http.get_json(&self.chart_url, &[], &[]),
        )?;

        let assets = parse_pegged_assets(&list)?;
        let total_supply_usd = parse_total_supply(&chart)?;
        debug!(
            assets = assets.len(),
            total_supply_usd, "[SUPPLY] DefiLlama payloads parsed"
        );
        Ok(SupplySnapshot { assets, total_supply_usd })
    }
}

/// `{"peggedAssets": [...]}` -> assets. Unparsable circulating amounts count as 0.
pub fn parse_pegged_assets(payload: &Value) -> Result<Vec<SupplyAsset>> {
    let items = payload
        .get("peggedAssets")
        .and_then(|a| a.as_array())
        .ok_or_else(|| {
            AppError::MalformedData("DefiLlama stablecoins response has no peggedAssets list".to_string())
        })?;

    Ok(items
        .iter()
        .map(|item| SupplyAsset {
            symbol: item
                .get("symbol")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .trim()
                .to_string(),
            circulating_usd: pegged_usd_circulating(item),
            peg_type: item
                .get("pegType")
                .and_then(|p| p.as_str())
                .unwrap_or("")
                .to_string(),
        })
        .collect())
}

/// `circulating` is either `{"peggedUSD": n}` or a bare number.
fn pegged_usd_circulating(item: &Value) -> f64 {
    let circulating = item.get("circulating");
    let value = match circulating {
        Some(Value::Object(map)) => map.get("peggedUSD"),
        other => other,
    };
    value.and_then(number_of).unwrap_or(0.0)
}

/// Latest chart point's `totalCirculating.peggedUSD`.
pub fn parse_total_supply(payload: &Value) -> Result<f64> {
    let latest = payload
        .as_array()
        .and_then(|points| points.last())
        .ok_or_else(|| AppError::MalformedData("DefiLlama chart response is empty or not a list".to_string()))?;

    let total = latest
        .get("totalCirculating")
        .and_then(|t| t.as_object())
        .ok_or_else(|| AppError::MalformedData("DefiLlama chart is missing totalCirculating".to_string()))?;

    total
        .get("peggedUSD")
        .and_then(number_of)
        .ok_or_else(|| AppError::MalformedData("DefiLlama chart is missing peggedUSD total supply".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_assets_in_both_circulating_shapes() {
        let payload = json!({
            "peggedAssets": [
                {"symbol": "USDT", "pegType": "peggedUSD", "circulating": {"peggedUSD": 140000000000.5}},
                {"symbol": " USDC ", "pegType": "peggedUSD", "circulating": 60000000000u64},
                {"symbol": "EURC", "pegType": "peggedEUR", "circulating": {"peggedEUR": 1.0}},
                {"symbol": "ODD", "pegType": "peggedUSD", "circulating": {"peggedUSD": "not-a-number"}},
                {"pegType": "peggedUSD"}
            ]
        });
        let assets = parse_pegged_assets(&payload).unwrap();
        assert_eq!(assets.len(), 5);
        assert_eq!(assets[0].circulating_usd, 140000000000.5);
        assert_eq!(assets[1].symbol, "USDC");
        assert_eq!(assets[1].circulating_usd, 60000000000.0);
        assert_eq!(assets[2].circulating_usd, 0.0);
        assert_eq!(assets[2].peg_type, "peggedEUR");
        assert_eq!(assets[3].circulating_usd, 0.0);
        assert_eq!(assets[4].symbol, "");
    }

    #[test]
    fn missing_pegged_assets_is_malformed() {
        let err = parse_pegged_assets(&json!({"data": []})).unwrap_err();
        assert!(matches!(err, AppError::MalformedData(_)));
    }

    #[test]
    fn total_supply_from_latest_point() {
        let chart = json!([
            {"date": "1", "totalCirculating": {"peggedUSD": 100.0}},
            {"date": "2", "totalCirculating": {"peggedUSD": 250.0, "peggedEUR": 3.0}}
        ]);
        assert_eq!(parse_total_supply(&chart).unwrap(), 250.0);
    }

    #[test]
    fn zero_total_supply_is_passed_through() {
        let chart = json!([{"totalCirculating": {"peggedUSD": 0}}]);
        assert_eq!(parse_total_supply(&chart).unwrap(), 0.0);
    }

    #[test]
    fn bad_chart_shapes_are_malformed() {
        assert!(parse_total_supply(&json!([])).is_err());
        assert!(parse_total_supply(&json!({"totalCirculating": {}})).is_err());
        assert!(parse_total_supply(&json!([{"totalCirculating": 5}])).is_err());
        assert!(parse_total_supply(&json!([{"totalCirculating": {"peggedEUR": 5}}])).is_err());
    }
}
