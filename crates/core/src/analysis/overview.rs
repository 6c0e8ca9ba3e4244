use crate::domain::{Interval, Period, PriceSeries};
use crate::error::AnalysisError;
use crate::market::MarketDataProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

/// (symbol, display name), in report order.
pub const MAJOR_INDICES: [(&str, &str); 5] = [
    ("^GSPC", "S&P 500"),
    ("^DJI", "Dow Jones"),
    ("^IXIC", "NASDAQ"),
    ("^VIX", "VIX (Volatility)"),
    ("^TNX", "10-Year Treasury Yield"),
];

const VIX_SYMBOL: &str = "^VIX";
const DEFAULT_VIX: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub symbol: String,
    pub name: String,
    pub current: f64,
    /// Session change: last close minus first open.
    pub change: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    /// Indices that could be fetched; missing ones are simply absent.
    pub indices: Vec<IndexQuote>,
    pub market_sentiment: String,
    pub timestamp: DateTime<Utc>,
}

impl MarketOverview {
    pub fn index(&self, symbol: &str) -> Option<&IndexQuote> {
        self.indices.iter().find(|q| q.symbol == symbol)
    }
}

/// Sentiment label keyed off the VIX level; a missing VIX reads as 20.
pub fn sentiment_for_vix(vix: Option<f64>) -> &'static str {
    let vix = vix.unwrap_or(DEFAULT_VIX);
    if vix < 15.0 {
        "Low volatility - Bullish"
    } else if vix <= 25.0 {
        "Normal volatility - Neutral"
    } else {
        "High volatility - Bearish"
    }
}

fn quote_from_series(symbol: &str, name: &str, series: &PriceSeries) -> Result<IndexQuote, AnalysisError> {
    let (Some(first), Some(last)) = (series.bars.first(), series.bars.last()) else {
        return Err(AnalysisError::NoData {
            symbol: symbol.to_string(),
        });
    };

    let change = last.close - first.open;
    let change_pct = if first.open != 0.0 {
        change / first.open * 100.0
    } else {
        0.0
    };

    Ok(IndexQuote {
        symbol: symbol.to_string(),
        name: name.to_string(),
        current: last.close,
        change,
        change_pct,
    })
}

/// Snapshot of the major indices. Never fails as a whole: indices that
/// cannot be fetched are logged and left out.
pub async fn get_market_overview(provider: Arc<dyn MarketDataProvider>) -> MarketOverview {
    let mut tasks = JoinSet::new();
    for (pos, &(symbol, name)) in MAJOR_INDICES.iter().enumerate() {
        let provider = Arc::clone(&provider);
        tasks.spawn(async move {
            let res = provider
                .get_price_series(symbol, Period::OneDay, Interval::OneDay)
                .await
                .and_then(|series| quote_from_series(symbol, name, &series));
            (pos, res)
        });
    }

    let mut slots: Vec<Option<IndexQuote>> = vec![None; MAJOR_INDICES.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((pos, Ok(quote))) => slots[pos] = Some(quote),
            Ok((pos, Err(err))) => {
                tracing::error!(symbol = MAJOR_INDICES[pos].0, error = %err, "index fetch failed");
            }
            Err(err) => tracing::error!(error = %err, "index fetch task failed"),
        }
    }

    let indices: Vec<IndexQuote> = slots.into_iter().flatten().collect();
    let vix = indices.iter().find(|q| q.symbol == VIX_SYMBOL).map(|q| q.current);

    MarketOverview {
        market_sentiment: sentiment_for_vix(vix).to_string(),
        indices,
        timestamp: Utc::now(),
    }
}
