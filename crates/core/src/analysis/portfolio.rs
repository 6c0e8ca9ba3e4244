use crate::analysis::rules::{self, Thresholds};
use crate::analysis::valuation::{HoldingEvaluator, HoldingValuation};
use crate::config::PortfolioSettings;
use crate::domain::holding::parse_holdings;
use crate::domain::{Holding, Period};
use crate::error::AnalysisError;
use crate::market::MarketDataProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingFailure {
    /// Position of the holding in the caller's input.
    pub index: usize,
    pub symbol: Option<String>,
    pub error: AnalysisError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_gain_loss: f64,
    pub total_return_pct: f64,
    /// Successfully evaluated holdings, in input order.
    pub holdings: Vec<HoldingValuation>,
    /// Sector -> percent of total value.
    pub sector_allocation: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
    pub failures: Vec<HoldingFailure>,
    pub generated_at: DateTime<Utc>,
}

/// Fold evaluated holdings into portfolio totals. Never fails: zero totals
/// produce a zero return and an all-zero allocation.
pub fn aggregate(
    mut holdings: Vec<HoldingValuation>,
    failures: Vec<HoldingFailure>,
    thresholds: &Thresholds,
) -> PortfolioReport {
    let total_value: f64 = holdings.iter().map(|h| h.current_value).sum();
    let total_cost: f64 = holdings.iter().map(|h| h.cost_basis).sum();
    let total_return_pct = if total_cost > 0.0 {
        (total_value - total_cost) / total_cost * 100.0
    } else {
        0.0
    };

    let mut sector_allocation = BTreeMap::<String, f64>::new();
    for h in &holdings {
        *sector_allocation.entry(h.sector.clone()).or_insert(0.0) += h.current_value;
    }
    for value in sector_allocation.values_mut() {
        *value = share_pct(*value, total_value);
    }
    for h in holdings.iter_mut() {
        h.portfolio_weight = share_pct(h.current_value, total_value);
    }

    let recommendations = rules::generate(&holdings, &sector_allocation, thresholds);

    PortfolioReport {
        total_value,
        total_cost,
        total_gain_loss: total_value - total_cost,
        total_return_pct,
        holdings,
        sector_allocation,
        recommendations,
        failures,
        generated_at: Utc::now(),
    }
}

fn share_pct(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Evaluates holdings on a bounded pool and aggregates the results.
#[derive(Clone)]
pub struct PortfolioAnalyzer {
    evaluator: HoldingEvaluator,
    max_concurrency: usize,
    holding_timeout: Duration,
    thresholds: Thresholds,
}

impl PortfolioAnalyzer {
    pub fn new(provider: Arc<dyn MarketDataProvider>, settings: &PortfolioSettings) -> Result<Self, AnalysisError> {
        let period: Period = settings.indicator_period.parse()?;
        Ok(Self {
            evaluator: HoldingEvaluator::new(provider, period, settings.trend_band),
            max_concurrency: settings.max_concurrency.max(1),
            holding_timeout: settings.holding_timeout,
            thresholds: settings.thresholds,
        })
    }

    /// Validate raw holdings item-by-item, then evaluate the valid ones.
    pub async fn analyze_portfolio(&self, raw: &[Value]) -> PortfolioReport {
        let (accepted, rejected) = parse_holdings(raw);

        let mut failures: Vec<HoldingFailure> = rejected
            .into_iter()
            .map(|(index, error)| {
                tracing::warn!(index, error = %error, "rejecting malformed holding");
                HoldingFailure {
                    index,
                    symbol: raw[index]
                        .get("symbol")
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_ascii_uppercase()),
                    error,
                }
            })
            .collect();

        let (holdings, mut eval_failures) = self.evaluate_all(accepted).await;
        failures.append(&mut eval_failures);
        failures.sort_by_key(|f| f.index);

        aggregate(holdings, failures, &self.thresholds)
    }

    pub async fn analyze_holdings(&self, holdings: Vec<Holding>) -> PortfolioReport {
        let indexed = holdings.into_iter().enumerate().collect();
        let (holdings, failures) = self.evaluate_all(indexed).await;
        aggregate(holdings, failures, &self.thresholds)
    }

    /// Fan out over the pool; waits for every holding to finish or fail.
    /// Dropping the returned future aborts all in-flight evaluations.
    async fn evaluate_all(&self, holdings: Vec<(usize, Holding)>) -> (Vec<HoldingValuation>, Vec<HoldingFailure>) {
        let total = holdings.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let timeout = self.holding_timeout;

        let mut slots: BTreeMap<usize, (String, Option<Result<HoldingValuation, AnalysisError>>)> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (index, holding) in holdings {
            slots.insert(index, (holding.symbol.clone(), None));

            let semaphore = Arc::clone(&semaphore);
            let evaluator = self.evaluator.clone();
            tasks.spawn(async move {
                let res = match semaphore.acquire_owned().await {
                    Ok(_permit) => match tokio::time::timeout(timeout, evaluator.evaluate(&holding)).await {
                        Ok(res) => res,
                        Err(_) => Err(AnalysisError::Timeout {
                            symbol: holding.symbol.clone(),
                            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        }),
                    },
                    Err(err) => Err(AnalysisError::unavailable(&holding.symbol, err)),
                };
                (index, res)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, res)) => {
                    if let Some(slot) = slots.get_mut(&index) {
                        slot.1 = Some(res);
                    }
                }
                Err(err) => tracing::error!(error = %err, "holding evaluation task failed"),
            }
        }

        let mut valuations = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, (symbol, res)) in slots {
            let res = res.unwrap_or_else(|| Err(AnalysisError::unavailable(&symbol, "evaluation task aborted")));
            match res {
                Ok(v) => valuations.push(v),
                Err(error) => {
                    tracing::warn!(index, %symbol, error = %error, "holding evaluation failed; excluded from totals");
                    failures.push(HoldingFailure {
                        index,
                        symbol: Some(symbol),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            total,
            evaluated = valuations.len(),
            failures = failures.len(),
            "portfolio evaluation finished"
        );

        (valuations, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testing::{linear_closes, StaticMarketData};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn analyzer(provider: Arc<StaticMarketData>, settings: PortfolioSettings) -> PortfolioAnalyzer {
        PortfolioAnalyzer::new(provider, &settings).unwrap()
    }

    #[tokio::test]
    async fn single_holding_end_to_end() {
        let provider = Arc::new(StaticMarketData::new().with_quote("AAPL", 150.0, Some("Technology")));
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_portfolio(&[json!({"symbol": "AAPL", "quantity": 10, "purchase_price": 140.0})])
            .await;

        assert_eq!(report.holdings.len(), 1);
        let h = &report.holdings[0];
        assert_eq!(h.cost_basis, 1400.0);
        assert_eq!(h.current_value, 1500.0);
        assert_eq!(h.gain_loss, 100.0);
        assert!((h.gain_loss_pct - 7.14).abs() < 0.01);
        assert_eq!(h.portfolio_weight, 100.0);

        assert_eq!(report.total_value, 1500.0);
        assert_eq!(report.total_cost, 1400.0);
        assert!((report.total_return_pct - 7.142857).abs() < 1e-6);
        assert_eq!(report.sector_allocation.get("Technology"), Some(&100.0));
        assert_eq!(
            report.recommendations,
            vec!["High concentration in Technology sector (100.0%). Consider diversification.".to_string()]
        );
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn failed_symbol_is_excluded_but_reported() {
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("AAPL", 150.0, Some("Technology"))
                .with_quote("XOM", 100.0, Some("Energy"))
                .failing("DEAD"),
        );
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_portfolio(&[
                json!({"symbol": "AAPL", "quantity": 10, "purchase_price": 140.0}),
                json!({"symbol": "DEAD", "quantity": 5, "purchase_price": 10.0}),
                json!({"symbol": "XOM", "quantity": 5, "purchase_price": 120.0}),
                json!({"symbol": "MSFT", "quantity": 1}),
            ])
            .await;

        let symbols: Vec<&str> = report.holdings.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "XOM"]);
        assert_eq!(report.total_value, 2000.0);
        assert_eq!(report.total_cost, 2000.0);
        assert_eq!(report.total_return_pct, 0.0);

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].symbol.as_deref(), Some("DEAD"));
        assert!(matches!(report.failures[0].error, AnalysisError::DataUnavailable { .. }));
        assert_eq!(report.failures[1].index, 3);
        assert_eq!(report.failures[1].symbol.as_deref(), Some("MSFT"));
        assert!(matches!(report.failures[1].error, AnalysisError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn empty_portfolio_has_zero_totals() {
        let provider = Arc::new(StaticMarketData::new());
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_portfolio(&[])
            .await;

        assert_eq!(report.total_value, 0.0);
        assert_eq!(report.total_cost, 0.0);
        assert_eq!(report.total_return_pct, 0.0);
        assert!(report.sector_allocation.is_empty());
        assert!(report.holdings.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn all_holdings_failing_still_returns_a_report() {
        let provider = Arc::new(StaticMarketData::new().failing("A").failing("B"));
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_holdings(vec![
                Holding::new("A", 1.0, 1.0).unwrap(),
                Holding::new("B", 1.0, 1.0).unwrap(),
            ])
            .await;
        assert_eq!(report.total_value, 0.0);
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn zero_total_value_gives_zero_allocation() {
        let h = crate::analysis::valuation::value_holding(
            &Holding::new("PENNY", 10.0, 1.0).unwrap(),
            crate::domain::TickerSnapshot {
                symbol: "PENNY".to_string(),
                current_price: Some(0.0),
                ..Default::default()
            },
            Err(AnalysisError::invalid("no series")),
        )
        .unwrap();

        let report = aggregate(vec![h], Vec::new(), &Thresholds::default());
        assert_eq!(report.total_value, 0.0);
        assert_eq!(report.total_cost, 10.0);
        assert_eq!(report.total_return_pct, -100.0);
        assert_eq!(report.sector_allocation.get("Unknown"), Some(&0.0));
        assert!(report.sector_allocation.values().all(|v| v.is_finite()));
        assert_eq!(report.holdings[0].portfolio_weight, 0.0);
    }

    #[tokio::test]
    async fn allocation_sums_to_hundred_and_keeps_input_order() {
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("AAPL", 190.0, Some("Technology"))
                .with_quote("JPM", 150.0, Some("Financial Services"))
                .with_quote("XOM", 110.0, Some("Energy"))
                .with_quote("MYST", 33.3, None)
                .with_symbol_delay("AAPL", Duration::from_millis(40)),
        );
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_holdings(vec![
                Holding::new("AAPL", 3.0, 100.0).unwrap(),
                Holding::new("JPM", 7.0, 100.0).unwrap(),
                Holding::new("XOM", 11.0, 100.0).unwrap(),
                Holding::new("MYST", 13.0, 10.0).unwrap(),
            ])
            .await;

        let symbols: Vec<&str> = report.holdings.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "JPM", "XOM", "MYST"]);

        let sum: f64 = report.sector_allocation.values().sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!(report.sector_allocation.contains_key("Unknown"));

        let expected_total: f64 = report.holdings.iter().map(|h| h.current_value).sum();
        let expected_cost: f64 = report.holdings.iter().map(|h| h.cost_basis).sum();
        assert_eq!(report.total_value, expected_total);
        assert_eq!(report.total_cost, expected_cost);
    }

    #[tokio::test]
    async fn pool_bounds_concurrent_requests() {
        let mut provider = StaticMarketData::new().with_delay(Duration::from_millis(20));
        let mut holdings = Vec::new();
        for i in 0..12 {
            let symbol = format!("S{i}");
            provider = provider.with_quote(&symbol, 10.0, Some("Technology"));
            holdings.push(Holding::new(&symbol, 1.0, 10.0).unwrap());
        }
        let provider = Arc::new(provider);

        let settings = PortfolioSettings {
            max_concurrency: 3,
            ..PortfolioSettings::default()
        };
        let report = analyzer(Arc::clone(&provider), settings).analyze_holdings(holdings).await;

        assert_eq!(report.holdings.len(), 12);
        // Each evaluation issues two requests (quote + history).
        let peak = provider.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 6, "peak in-flight requests {peak} exceeded pool bound");
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn slow_holding_times_out_alone() {
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("FAST", 10.0, None)
                .with_quote("SLOW", 10.0, None)
                .with_symbol_delay("SLOW", Duration::from_secs(5)),
        );
        let settings = PortfolioSettings {
            holding_timeout: Duration::from_millis(50),
            ..PortfolioSettings::default()
        };
        let report = analyzer(provider, settings)
            .analyze_holdings(vec![
                Holding::new("SLOW", 1.0, 10.0).unwrap(),
                Holding::new("FAST", 1.0, 10.0).unwrap(),
            ])
            .await;

        assert_eq!(report.holdings.len(), 1);
        assert_eq!(report.holdings[0].symbol, "FAST");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].error,
            AnalysisError::Timeout {
                symbol: "SLOW".to_string(),
                millis: 50,
            }
        );
    }

    #[tokio::test]
    async fn exact_limit_share_does_not_warn() {
        // 1.23 / 4.10 is 30% on paper but not in binary floating point.
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("XOM", 1.23, Some("Energy"))
                .with_quote("AAPL", 2.87, Some("Technology")),
        );
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_holdings(vec![
                Holding::new("XOM", 1.0, 1.23).unwrap(),
                Holding::new("AAPL", 1.0, 2.87).unwrap(),
            ])
            .await;

        let energy = report.sector_allocation["Energy"];
        assert!((energy - 30.0).abs() < 1e-9);
        assert_eq!(
            report.recommendations,
            vec!["High concentration in Technology sector (70.0%). Consider diversification.".to_string()]
        );
    }

    #[tokio::test]
    async fn recommendations_flow_from_indicators() {
        // A steep rally with a large gain should trigger profit-taking.
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).powf(1.5)).collect();
        let last = *closes.last().unwrap();
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("NVDA", last, Some("Technology"))
                .with_closes("NVDA", &closes)
                .with_quote("KO", 60.0, Some("Consumer Defensive"))
                .with_closes("KO", &linear_closes(60, 60.0, 0.0)),
        );
        let report = analyzer(provider, PortfolioSettings::default())
            .analyze_holdings(vec![
                Holding::new("NVDA", 1.0, 100.0).unwrap(),
                Holding::new("KO", 10.0, 60.0).unwrap(),
            ])
            .await;

        assert!(report
            .recommendations
            .iter()
            .any(|r| r.starts_with("NVDA: Consider taking partial profits")));
        assert!(!report.recommendations.iter().any(|r| r.starts_with("KO:")));
    }
}
