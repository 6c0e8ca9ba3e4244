use crate::domain::{Interval, Period, PriceSeries, TickerSnapshot};
use crate::error::AnalysisError;

pub mod types;
pub mod yahoo;

/// In-memory provider for tests in this and downstream crates.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Source of quotes and price history. Every failure is scoped to the
/// requested symbol; implementations never panic on provider outages.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn get_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, AnalysisError>;

    /// May return an empty series; callers decide whether that is an error.
    async fn get_price_series(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<PriceSeries, AnalysisError>;
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
