use crate::analysis::indicators::{get_technical_indicators, IndicatorSet, Momentum, Trend, TrendBand};
use crate::domain::{Holding, Period, TickerSnapshot};
use crate::error::AnalysisError;
use crate::market::MarketDataProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const UNKNOWN_SECTOR: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub cost_basis: f64,
    pub current_value: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
    /// Share of total portfolio value in percent; filled in by the aggregator.
    pub portfolio_weight: f64,
    pub recommendation: Option<String>,
    pub trend: Option<Trend>,
    pub momentum: Option<Momentum>,
    pub snapshot: TickerSnapshot,
    pub indicators: Option<IndicatorSet>,
    pub indicator_error: Option<String>,
}

/// Percentage change from `base` to `value`; 0 when `base` is not positive.
pub fn pct_of(value: f64, base: f64) -> f64 {
    if base > 0.0 {
        (value - base) / base * 100.0
    } else {
        0.0
    }
}

/// Combine a holding with its fetched data. A missing quote fails the
/// holding; missing indicators only degrade it.
pub fn value_holding(
    holding: &Holding,
    snapshot: TickerSnapshot,
    indicators: Result<IndicatorSet, AnalysisError>,
) -> Result<HoldingValuation, AnalysisError> {
    let current_price = snapshot
        .current_price
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| AnalysisError::unavailable(&holding.symbol, "snapshot has no current price"))?;

    let cost_basis = holding.cost_basis();
    let current_value = holding.quantity * current_price;

    let (indicators, indicator_error) = match indicators {
        Ok(set) => (Some(set), None),
        Err(err) => (None, Some(err.to_string())),
    };

    Ok(HoldingValuation {
        symbol: holding.symbol.clone(),
        name: snapshot.name.clone().unwrap_or_else(|| holding.symbol.clone()),
        sector: snapshot
            .sector
            .clone()
            .unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
        quantity: holding.quantity,
        purchase_price: holding.purchase_price,
        current_price,
        cost_basis,
        current_value,
        gain_loss: current_value - cost_basis,
        gain_loss_pct: pct_of(current_value, cost_basis),
        portfolio_weight: 0.0,
        recommendation: snapshot.recommendation.clone(),
        trend: indicators.as_ref().map(|i| i.trend),
        momentum: indicators.as_ref().map(|i| i.momentum),
        snapshot,
        indicators,
        indicator_error,
    })
}

/// Values a single holding. Evaluations share nothing mutable, so many can
/// run at once against the same evaluator.
#[derive(Clone)]
pub struct HoldingEvaluator {
    provider: Arc<dyn MarketDataProvider>,
    period: Period,
    band: TrendBand,
}

impl HoldingEvaluator {
    pub fn new(provider: Arc<dyn MarketDataProvider>, period: Period, band: TrendBand) -> Self {
        Self {
            provider,
            period,
            band,
        }
    }

    pub async fn evaluate(&self, holding: &Holding) -> Result<HoldingValuation, AnalysisError> {
        let (snapshot, indicators) = tokio::join!(
            self.provider.get_snapshot(&holding.symbol),
            get_technical_indicators(self.provider.as_ref(), &holding.symbol, self.period, &self.band),
        );

        if let Err(err) = &indicators {
            tracing::warn!(symbol = %holding.symbol, error = %err, "indicators unavailable; valuing holding without them");
        }

        value_holding(holding, snapshot?, indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testing::{linear_closes, StaticMarketData};

    fn snapshot(price: Option<f64>, sector: Option<&str>) -> TickerSnapshot {
        TickerSnapshot {
            symbol: "AAPL".to_string(),
            name: Some("Apple Inc.".to_string()),
            sector: sector.map(str::to_string),
            current_price: price,
            ..Default::default()
        }
    }

    #[test]
    fn computes_cost_value_and_gain() {
        let h = Holding::new("AAPL", 10.0, 140.0).unwrap();
        let v = value_holding(
            &h,
            snapshot(Some(150.0), Some("Technology")),
            Err(AnalysisError::NoData {
                symbol: "AAPL".to_string(),
            }),
        )
        .unwrap();

        assert_eq!(v.cost_basis, 1400.0);
        assert_eq!(v.current_value, 1500.0);
        assert_eq!(v.gain_loss, 100.0);
        assert!((v.gain_loss_pct - 7.142857142857143).abs() < 1e-9);
        assert_eq!(format!("{:.2}", v.gain_loss_pct), "7.14");
        assert_eq!(v.sector, "Technology");
        assert_eq!(v.trend, None);
        assert_eq!(v.indicator_error.as_deref(), Some("no price data available for AAPL"));
    }

    #[test]
    fn gain_pct_guards_zero_cost() {
        assert_eq!(pct_of(10.0, 0.0), 0.0);
        assert_eq!(pct_of(10.0, -1.0), 0.0);
        assert_eq!(pct_of(0.0, 100.0), -100.0);
    }

    #[test]
    fn missing_price_fails_and_missing_sector_is_unknown() {
        let h = Holding::new("AAPL", 1.0, 1.0).unwrap();
        let err = value_holding(&h, snapshot(None, None), Err(AnalysisError::invalid("x"))).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable { .. }));

        let v = value_holding(&h, snapshot(Some(2.0), None), Err(AnalysisError::invalid("x"))).unwrap();
        assert_eq!(v.sector, UNKNOWN_SECTOR);
    }

    #[tokio::test]
    async fn evaluator_attaches_indicators() {
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("AMD", 160.0, Some("Technology"))
                .with_closes("AMD", &linear_closes(60, 100.0, 1.0)),
        );
        let evaluator = HoldingEvaluator::new(provider, Period::ThreeMonths, TrendBand::default());

        let v = evaluator.evaluate(&Holding::new("amd", 2.0, 100.0).unwrap()).await.unwrap();
        assert_eq!(v.current_value, 320.0);
        assert_eq!(v.gain_loss_pct, 60.0);
        assert!(v.indicators.is_some());
        assert_eq!(v.trend, Some(Trend::StrongUptrend));
        assert_eq!(v.indicator_error, None);
    }

    #[tokio::test]
    async fn evaluator_fails_on_snapshot_error() {
        let provider = Arc::new(StaticMarketData::new().failing("BAD"));
        let evaluator = HoldingEvaluator::new(provider, Period::ThreeMonths, TrendBand::default());
        let err = evaluator
            .evaluate(&Holding::new("BAD", 1.0, 1.0).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.symbol(), Some("BAD"));
    }
}
