use crate::domain::{Interval, Period, PriceBar, PriceSeries, TickerSnapshot};
use crate::error::AnalysisError;
use crate::market::{normalize_symbol, MarketDataProvider};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory provider for tests. Symbols listed in `failing` error on every
/// call; unknown symbols return an empty series and a `DataUnavailable` snapshot.
#[derive(Debug, Default)]
pub struct StaticMarketData {
    pub snapshots: HashMap<String, TickerSnapshot>,
    pub series: HashMap<String, PriceSeries>,
    pub failing: HashSet<String>,
    pub delay: Option<Duration>,
    pub delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, symbol: &str, price: f64, sector: Option<&str>) -> Self {
        self.snapshots.insert(
            symbol.to_string(),
            TickerSnapshot {
                symbol: symbol.to_string(),
                name: Some(format!("{symbol} Inc.")),
                sector: sector.map(str::to_string),
                current_price: Some(price),
                previous_close: Some(price),
                ..Default::default()
            },
        );
        self
    }

    /// Overrides the previous close of a quote added with `with_quote`.
    pub fn with_previous_close(mut self, symbol: &str, previous_close: f64) -> Self {
        if let Some(s) = self.snapshots.get_mut(symbol) {
            s.previous_close = Some(previous_close);
        }
        self
    }

    pub fn with_snapshot(mut self, snapshot: TickerSnapshot) -> Self {
        self.snapshots.insert(snapshot.symbol.clone(), snapshot);
        self
    }

    pub fn with_closes(mut self, symbol: &str, closes: &[f64]) -> Self {
        self.series.insert(symbol.to_string(), series_from_closes(symbol, closes));
        self
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series.insert(series.symbol.clone(), series);
        self
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_symbol_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    async fn enter(&self, symbol: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(symbol.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delays.get(symbol).copied().or(self.delay) {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for StaticMarketData {
    fn provider_name(&self) -> &'static str {
        "static"
    }

    async fn get_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, AnalysisError> {
        let symbol = normalize_symbol(symbol);
        self.enter(&symbol).await;
        if self.failing.contains(&symbol) {
            return Err(AnalysisError::unavailable(&symbol, "provider offline"));
        }
        self.snapshots
            .get(&symbol)
            .cloned()
            .ok_or_else(|| AnalysisError::unavailable(&symbol, "unknown symbol"))
    }

    async fn get_price_series(
        &self,
        symbol: &str,
        _period: Period,
        _interval: Interval,
    ) -> Result<PriceSeries, AnalysisError> {
        let symbol = normalize_symbol(symbol);
        self.enter(&symbol).await;
        if self.failing.contains(&symbol) {
            return Err(AnalysisError::unavailable(&symbol, "provider offline"));
        }
        Ok(self
            .series
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| PriceSeries::new(symbol, Vec::new())))
    }
}

/// Daily bars where open == previous close, high/low are ±1% of close and volume is flat.
pub fn series_from_closes(symbol: &str, closes: &[f64]) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_default();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            timestamp: start + ChronoDuration::days(i as i64),
            open: if i == 0 { close } else { closes[i - 1] },
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000.0,
        })
        .collect();
    PriceSeries::new(symbol, bars)
}

pub fn linear_closes(n: usize, start: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}
