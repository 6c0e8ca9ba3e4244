//! Wire shapes for the Yahoo Finance chart and quoteSummary endpoints.
//! Only the fields we read are modelled; everything is defaulted because
//! the provider omits keys freely.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ChartEnvelope {
    pub chart: ChartBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartBody {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ProviderErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub indicators: ChartIndicators,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub exchange_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub chart_previous_close: Option<f64>,
    #[serde(default)]
    pub previous_close: Option<f64>,
    #[serde(default)]
    pub regular_market_volume: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_high: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_low: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartQuote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummaryEnvelope {
    pub quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSummaryBody {
    #[serde(default)]
    pub result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    pub error: Option<ProviderErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummaryResult {
    #[serde(default)]
    pub asset_profile: Option<AssetProfile>,
    #[serde(default)]
    pub summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    pub default_key_statistics: Option<KeyStatistics>,
    #[serde(default)]
    pub financial_data: Option<FinancialData>,
    #[serde(default)]
    pub price: Option<PriceModule>,
}

/// Yahoo wraps numbers as `{"raw": 1.23, "fmt": "1.23"}` (or `{}` when absent).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawNum {
    #[serde(default)]
    pub raw: Option<f64>,
}

pub fn raw(v: &Option<RawNum>) -> Option<f64> {
    v.as_ref().and_then(|n| n.raw).filter(|x| x.is_finite())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetProfile {
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDetail {
    #[serde(default)]
    pub market_cap: Option<RawNum>,
    #[serde(default, rename = "trailingPE")]
    pub trailing_pe: Option<RawNum>,
    #[serde(default, rename = "forwardPE")]
    pub forward_pe: Option<RawNum>,
    #[serde(default)]
    pub dividend_yield: Option<RawNum>,
    #[serde(default)]
    pub beta: Option<RawNum>,
    #[serde(default)]
    pub average_volume: Option<RawNum>,
    #[serde(default)]
    pub volume: Option<RawNum>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatistics {
    #[serde(default)]
    pub trailing_eps: Option<RawNum>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialData {
    #[serde(default)]
    pub current_price: Option<RawNum>,
    #[serde(default)]
    pub total_revenue: Option<RawNum>,
    #[serde(default)]
    pub profit_margins: Option<RawNum>,
    #[serde(default)]
    pub operating_margins: Option<RawNum>,
    #[serde(default)]
    pub return_on_equity: Option<RawNum>,
    #[serde(default)]
    pub debt_to_equity: Option<RawNum>,
    #[serde(default)]
    pub free_cashflow: Option<RawNum>,
    #[serde(default)]
    pub recommendation_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceModule {
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
}
