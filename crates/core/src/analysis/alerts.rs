use crate::analysis::indicators::{get_technical_indicators, IndicatorSet, TrendBand};
use crate::domain::{Period, TickerSnapshot};
use crate::error::AnalysisError;
use crate::market::{normalize_symbol, MarketDataProvider};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Absolute daily move, in percent of previous close.
    pub price_change_pct: f64,
    /// Volume above this multiple of average volume is a spike.
    pub volume_spike_ratio: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            price_change_pct: 5.0,
            volume_spike_ratio: 2.0,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceMove,
    VolumeSpike,
    Overbought,
    Oversold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub symbol: String,
    pub kind: AlertKind,
    /// The observed value that crossed the threshold.
    pub value: f64,
    pub message: String,
}

pub fn check_alerts(
    snapshot: &TickerSnapshot,
    indicators: Option<&IndicatorSet>,
    t: &AlertThresholds,
) -> Vec<Alert> {
    let symbol = snapshot.symbol.as_str();
    let mut out = Vec::new();

    if let (Some(price), Some(prev)) = (snapshot.current_price, snapshot.previous_close) {
        if prev > 0.0 {
            let move_pct = (price - prev) / prev * 100.0;
            if move_pct.abs() >= t.price_change_pct {
                let dir = if move_pct > 0.0 { "up" } else { "down" };
                out.push(Alert {
                    symbol: symbol.to_string(),
                    kind: AlertKind::PriceMove,
                    value: move_pct,
                    message: format!("{symbol} is {dir} {:.2}% from previous close", move_pct.abs()),
                });
            }
        }
    }

    if let (Some(volume), Some(avg)) = (snapshot.volume, snapshot.average_volume) {
        if avg > 0.0 {
            let ratio = volume / avg;
            if ratio > t.volume_spike_ratio {
                out.push(Alert {
                    symbol: symbol.to_string(),
                    kind: AlertKind::VolumeSpike,
                    value: ratio,
                    message: format!("{symbol} volume is {ratio:.1}x its average"),
                });
            }
        }
    }

    if let Some(rsi) = indicators.and_then(|i| i.rsi) {
        if rsi > t.rsi_overbought {
            out.push(Alert {
                symbol: symbol.to_string(),
                kind: AlertKind::Overbought,
                value: rsi,
                message: format!("{symbol} RSI at {rsi:.1} (overbought)"),
            });
        } else if rsi < t.rsi_oversold {
            out.push(Alert {
                symbol: symbol.to_string(),
                kind: AlertKind::Oversold,
                value: rsi,
                message: format!("{symbol} RSI at {rsi:.1} (oversold)"),
            });
        }
    }

    out
}

/// One monitoring pass over a symbol. A quote failure is an error;
/// missing indicators only drop the RSI checks.
pub async fn scan_symbol(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    thresholds: &AlertThresholds,
) -> Result<Vec<Alert>, AnalysisError> {
    let symbol = normalize_symbol(symbol);
    let band = TrendBand::default();
    let (snapshot, indicators) = tokio::join!(
        provider.get_snapshot(&symbol),
        get_technical_indicators(provider, &symbol, Period::OneMonth, &band),
    );
    let snapshot = snapshot?;
    if let Err(err) = &indicators {
        tracing::debug!(%symbol, error = %err, "no indicators for alert scan");
    }
    Ok(check_alerts(&snapshot, indicators.as_ref().ok(), thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::indicators::compute_indicators;
    use crate::market::testing::{linear_closes, series_from_closes, StaticMarketData};

    fn snapshot(price: f64, prev: f64, volume: f64, avg: f64) -> TickerSnapshot {
        TickerSnapshot {
            symbol: "TSLA".to_string(),
            current_price: Some(price),
            previous_close: Some(prev),
            volume: Some(volume),
            average_volume: Some(avg),
            ..Default::default()
        }
    }

    #[test]
    fn quiet_day_has_no_alerts() {
        let alerts = check_alerts(&snapshot(101.0, 100.0, 1_000.0, 1_000.0), None, &AlertThresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn price_move_and_volume_spike() {
        let alerts = check_alerts(&snapshot(94.0, 100.0, 2_500.0, 1_000.0), None, &AlertThresholds::default());
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::PriceMove, AlertKind::VolumeSpike]);
        assert_eq!(alerts[0].message, "TSLA is down 6.00% from previous close");
        assert_eq!(alerts[1].message, "TSLA volume is 2.5x its average");

        // exactly 2x is not a spike
        let alerts = check_alerts(&snapshot(100.0, 100.0, 2_000.0, 1_000.0), None, &AlertThresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn rsi_extremes_alert() {
        let rising = compute_indicators(&series_from_closes("TSLA", &linear_closes(30, 100.0, 1.0)), &TrendBand::default()).unwrap();
        let alerts = check_alerts(&snapshot(100.0, 100.0, 1.0, 1.0), Some(&rising), &AlertThresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Overbought);

        let falling = compute_indicators(&series_from_closes("TSLA", &linear_closes(30, 100.0, -1.0)), &TrendBand::default()).unwrap();
        let alerts = check_alerts(&snapshot(100.0, 100.0, 1.0, 1.0), Some(&falling), &AlertThresholds::default());
        assert_eq!(alerts[0].kind, AlertKind::Oversold);
    }

    #[test]
    fn thresholds_deserialize_with_defaults() {
        let t: AlertThresholds = serde_json::from_str(r#"{"price_change_pct": 2.5}"#).unwrap();
        assert_eq!(t.price_change_pct, 2.5);
        assert_eq!(t.volume_spike_ratio, 2.0);
    }

    #[tokio::test]
    async fn scan_reports_quote_failures() {
        let provider = StaticMarketData::new()
            .with_snapshot(snapshot(110.0, 100.0, 1.0, 1.0))
            .failing("GME");

        let alerts = scan_symbol(&provider, "tsla", &AlertThresholds::default()).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::PriceMove);

        assert!(scan_symbol(&provider, "GME", &AlertThresholds::default()).await.is_err());
    }
}
