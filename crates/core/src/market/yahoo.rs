use crate::config::{env_parse, Settings};
use crate::domain::{Interval, Period, PriceBar, PriceSeries, TickerSnapshot};
use crate::error::AnalysisError;
use crate::market::types::{raw, ChartEnvelope, ChartResult, QuoteSummaryEnvelope, QuoteSummaryResult};
use crate::market::{normalize_symbol, MarketDataProvider};
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
/// Hands out the session cookie that `getcrumb` and `quoteSummary` require.
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_ATTEMPTS: u32 = 1;
const SUMMARY_MODULES: &str = "assetProfile,summaryDetail,defaultKeyStatistics,financialData,price";
const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Non-success status from the provider, kept typed so callers can branch on it.
#[derive(Debug)]
struct HttpStatusError {
    status: StatusCode,
    body: String,
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market data HTTP {}: {}", self.status, self.body)
    }
}

impl std::error::Error for HttpStatusError {}

#[derive(Debug, Clone)]
pub struct YahooFinanceClient {
    http: reqwest::Client,
    base_url: String,
    cookie_url: String,
    attempts: u32,
    /// Shared by clones; cleared when the provider rejects it.
    crumb: Arc<Mutex<Option<String>>>,
}

impl YahooFinanceClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = env_parse::<u64>("MARKET_DATA_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS);
        let attempts = env_parse::<u32>("MARKET_DATA_RETRIES").unwrap_or(DEFAULT_ATTEMPTS);

        let client = Self::new(base_url, Duration::from_secs(timeout_secs), attempts)?;
        Ok(match std::env::var("MARKET_DATA_COOKIE_URL") {
            Ok(url) if !url.trim().is_empty() => client.with_cookie_url(url.trim()),
            _ => client,
        })
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration, attempts: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("failed to build market data http client")?;

        let base_url = base_url.into();
        // A non-default host (a proxy or a mock) is assumed to serve its own cookie.
        let cookie_url = if base_url.trim_end_matches('/') == DEFAULT_BASE_URL {
            DEFAULT_COOKIE_URL.to_string()
        } else {
            base_url.clone()
        };

        Ok(Self {
            http,
            base_url,
            cookie_url,
            attempts: attempts.max(1),
            crumb: Arc::new(Mutex::new(None)),
        })
    }

    pub fn with_cookie_url(mut self, url: impl Into<String>) -> Self {
        self.cookie_url = url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_once<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<(StatusCode, T)> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        // Yahoo answers 404 with a JSON error body for unknown symbols; let the
        // caller inspect it instead of failing on status alone.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(HttpStatusError { status, body: text }.into());
        }

        let parsed = serde_json::from_str::<T>(&text)
            .with_context(|| format!("market data response is not the expected JSON (HTTP {status})"))?;
        Ok((status, parsed))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<(StatusCode, T)> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url, query).await {
                Ok(out) => return Ok(out),
                Err(err) => {
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, %url, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn fetch_chart(&self, symbol: &str, range: &str, interval: &str) -> Result<Option<ChartResult>> {
        let url = self.url(&format!("/v8/finance/chart/{symbol}"));
        let (_, body) = self
            .get_json::<ChartEnvelope>(
                &url,
                &[("range", range), ("interval", interval), ("includePrePost", "false")],
            )
            .await?;

        if let Some(err) = body.chart.error {
            if err.code.eq_ignore_ascii_case("not found") {
                return Ok(None);
            }
            anyhow::bail!("chart error {}: {}", err.code, err.description);
        }

        Ok(body.chart.result.and_then(|mut r| {
            if r.is_empty() {
                None
            } else {
                Some(r.swap_remove(0))
            }
        }))
    }

    /// Cookie + crumb pair for `quoteSummary`. Cached until `refresh` is set.
    async fn crumb(&self, refresh: bool) -> Result<String> {
        let mut slot = self.crumb.lock().await;
        if refresh {
            *slot = None;
        }
        if let Some(crumb) = slot.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the Set-Cookie header of this response matters.
        if let Err(err) = self.http.get(&self.cookie_url).send().await {
            tracing::debug!(url = %self.cookie_url, error = %err, "cookie seed request failed");
        }

        let res = self
            .http
            .get(self.url("/v1/test/getcrumb"))
            .header(ACCEPT, "text/plain")
            .send()
            .await
            .context("crumb request failed")?;
        let status = res.status();
        let text = res.text().await.context("failed to read crumb response")?;
        let crumb = text.trim();
        anyhow::ensure!(
            status.is_success() && !crumb.is_empty() && !crumb.contains('<'),
            "crumb handshake failed (HTTP {status})"
        );

        tracing::debug!("market data crumb acquired");
        *slot = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    async fn fetch_summary(&self, symbol: &str) -> Result<QuoteSummaryResult> {
        match self.fetch_summary_with_crumb(symbol, false).await {
            Err(err) if is_unauthorized(&err) => {
                tracing::debug!(%symbol, "crumb rejected; refreshing");
                self.fetch_summary_with_crumb(symbol, true).await
            }
            other => other,
        }
    }

    async fn fetch_summary_with_crumb(&self, symbol: &str, refresh: bool) -> Result<QuoteSummaryResult> {
        let crumb = self.crumb(refresh).await?;
        let url = self.url(&format!("/v10/finance/quoteSummary/{symbol}"));
        let (status, body) = self
            .get_json::<QuoteSummaryEnvelope>(&url, &[("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())])
            .await?;

        if let Some(err) = body.quote_summary.error {
            anyhow::bail!("quoteSummary error {}: {} (HTTP {status})", err.code, err.description);
        }

        body.quote_summary
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
            .context("quoteSummary returned no result")
    }

    async fn snapshot(&self, symbol: &str) -> Result<TickerSnapshot> {
        let (chart, summary) = tokio::join!(self.fetch_chart(symbol, "5d", "1d"), self.fetch_summary(symbol));

        let chart = chart?.with_context(|| format!("symbol {symbol} not found"))?;
        let mut snapshot = snapshot_from_chart(symbol, &chart);

        match summary {
            Ok(summary) => merge_summary(&mut snapshot, summary),
            // Fundamentals are enrichment only; the quote above is enough to value a holding.
            Err(err) => tracing::debug!(%symbol, error = %err, "quoteSummary unavailable; snapshot without fundamentals"),
        }

        anyhow::ensure!(
            snapshot.current_price.is_some(),
            "provider returned no current price for {symbol}"
        );
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooFinanceClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn get_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, AnalysisError> {
        let symbol = normalize_symbol(symbol);
        self.snapshot(&symbol)
            .await
            .map_err(|err| AnalysisError::unavailable(&symbol, format!("{err:#}")))
    }

    async fn get_price_series(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<PriceSeries, AnalysisError> {
        let symbol = normalize_symbol(symbol);
        match self.fetch_chart(&symbol, period.as_str(), interval.as_str()).await {
            Ok(Some(chart)) => Ok(series_from_chart(&symbol, &chart)),
            Ok(None) => Ok(PriceSeries::new(symbol, Vec::new())),
            Err(err) => Err(AnalysisError::unavailable(&symbol, format!("{err:#}"))),
        }
    }
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<HttpStatusError>()
        .is_some_and(|e| e.status == StatusCode::UNAUTHORIZED)
}

fn series_from_chart(symbol: &str, chart: &ChartResult) -> PriceSeries {
    let Some(quote) = chart.indicators.quote.first() else {
        return PriceSeries::new(symbol, Vec::new());
    };

    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten().filter(|x| x.is_finite());

    let mut bars = Vec::with_capacity(chart.timestamp.len());
    for (i, ts) in chart.timestamp.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        let Some(timestamp) = Utc.timestamp_opt(*ts, 0).single() else {
            continue;
        };
        bars.push(PriceBar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: at(&quote.volume, i).unwrap_or(0.0),
        });
    }

    PriceSeries::new(symbol, bars)
}

fn snapshot_from_chart(symbol: &str, chart: &ChartResult) -> TickerSnapshot {
    let meta = &chart.meta;
    let last_close = chart
        .indicators
        .quote
        .first()
        .and_then(|q| q.close.iter().rev().find_map(|c| *c));

    TickerSnapshot {
        symbol: symbol.to_string(),
        name: meta.long_name.clone().or_else(|| meta.short_name.clone()),
        currency: meta.currency.clone(),
        exchange: meta.exchange_name.clone(),
        current_price: meta.regular_market_price.or(last_close),
        previous_close: meta.previous_close.or(meta.chart_previous_close),
        volume: meta.regular_market_volume,
        fifty_two_week_high: meta.fifty_two_week_high,
        fifty_two_week_low: meta.fifty_two_week_low,
        ..Default::default()
    }
}

fn merge_summary(s: &mut TickerSnapshot, q: QuoteSummaryResult) {
    if let Some(p) = q.asset_profile {
        s.sector = p.sector.filter(|v| !v.trim().is_empty());
        s.industry = p.industry.filter(|v| !v.trim().is_empty());
    }
    if let Some(p) = q.price {
        if s.name.is_none() {
            s.name = p.long_name.or(p.short_name);
        }
    }
    if let Some(d) = q.summary_detail {
        s.market_cap = raw(&d.market_cap);
        s.pe_ratio = raw(&d.trailing_pe);
        s.forward_pe = raw(&d.forward_pe);
        s.dividend_yield = raw(&d.dividend_yield);
        s.beta = raw(&d.beta);
        s.average_volume = raw(&d.average_volume);
        s.volume = s.volume.or(raw(&d.volume));
    }
    if let Some(k) = q.default_key_statistics {
        s.eps = raw(&k.trailing_eps);
    }
    if let Some(f) = q.financial_data {
        s.current_price = s.current_price.or(raw(&f.current_price));
        s.revenue = raw(&f.total_revenue);
        s.profit_margin = raw(&f.profit_margins);
        s.operating_margin = raw(&f.operating_margins);
        s.roe = raw(&f.return_on_equity);
        s.debt_to_equity = raw(&f.debt_to_equity);
        s.free_cashflow = raw(&f.free_cashflow);
        s.recommendation = f.recommendation_key.filter(|v| !v.trim().is_empty());
    }
}
