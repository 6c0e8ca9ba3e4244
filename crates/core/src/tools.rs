//! Core operations exposed as named tools for the language model.
//!
//! Every tool takes a JSON object and returns JSON. Failures come back as
//! `{"error": "..."}` so the model can explain them instead of the whole
//! turn failing.

use crate::analysis::allocation::calculate_portfolio_allocation;
use crate::analysis::indicators::{get_technical_indicators, TrendBand};
use crate::analysis::overview::get_market_overview;
use crate::analysis::portfolio::PortfolioAnalyzer;
use crate::config::PortfolioSettings;
use crate::domain::Period;
use crate::error::AnalysisError;
use crate::llm::{ToolExecutor, ToolSpec};
use crate::market::{normalize_symbol, MarketDataProvider};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const GET_STOCK_INFO: &str = "get_stock_info";
pub const ANALYZE_TECHNICAL: &str = "analyze_technical";
pub const ANALYZE_PORTFOLIO: &str = "analyze_portfolio";
pub const GET_MARKET_OVERVIEW: &str = "get_market_overview";
pub const CALCULATE_PORTFOLIO_ALLOCATION: &str = "calculate_portfolio_allocation";

#[derive(Debug, Deserialize)]
struct SymbolArgs {
    symbol: String,
    #[serde(default)]
    period: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortfolioArgs {
    holdings: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AllocationArgs {
    total_investment: f64,
    #[serde(default = "default_risk")]
    risk_tolerance: String,
    #[serde(default)]
    investment_goals: Vec<String>,
}

fn default_risk() -> String {
    "moderate".to_string()
}

#[derive(Clone)]
pub struct Toolbox {
    provider: Arc<dyn MarketDataProvider>,
    analyzer: PortfolioAnalyzer,
    band: TrendBand,
    default_period: Period,
}

impl Toolbox {
    pub fn new(provider: Arc<dyn MarketDataProvider>, settings: &PortfolioSettings) -> Result<Self, AnalysisError> {
        Ok(Self {
            analyzer: PortfolioAnalyzer::new(Arc::clone(&provider), settings)?,
            provider,
            band: settings.trend_band,
            default_period: settings.indicator_period.parse()?,
        })
    }

    pub fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: GET_STOCK_INFO,
                description: "Current quote, company profile and key fundamentals for a stock symbol.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string", "description": "Ticker symbol, e.g. AAPL"}
                    },
                    "required": ["symbol"]
                }),
            },
            ToolSpec {
                name: ANALYZE_TECHNICAL,
                description: "Technical indicators (SMA, EMA, RSI, MACD, Bollinger bands, ATR, trend, momentum) for a symbol.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string"},
                        "period": {
                            "type": "string",
                            "description": "History window: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max",
                            "default": "3mo"
                        }
                    },
                    "required": ["symbol"]
                }),
            },
            ToolSpec {
                name: ANALYZE_PORTFOLIO,
                description: "Value a portfolio of holdings, compute sector allocation and rule-based recommendations.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "holdings": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "symbol": {"type": "string"},
                                    "quantity": {"type": "number"},
                                    "purchase_price": {"type": "number"}
                                },
                                "required": ["symbol", "quantity", "purchase_price"]
                            }
                        }
                    },
                    "required": ["holdings"]
                }),
            },
            ToolSpec {
                name: GET_MARKET_OVERVIEW,
                description: "Major index levels and a volatility-based market sentiment.",
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolSpec {
                name: CALCULATE_PORTFOLIO_ALLOCATION,
                description: "Recommended stock/bond/cash split for an amount, risk tolerance and goals.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "total_investment": {"type": "number"},
                        "risk_tolerance": {"type": "string", "enum": ["conservative", "moderate", "aggressive"]},
                        "investment_goals": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["total_investment", "risk_tolerance"]
                }),
            },
        ]
    }

    pub async fn call(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        match name {
            GET_STOCK_INFO => {
                let args: SymbolArgs = parse_args(name, args)?;
                let snapshot = self.provider.get_snapshot(&normalize_symbol(&args.symbol)).await?;
                Ok(serde_json::to_value(snapshot)?)
            }
            ANALYZE_TECHNICAL => {
                let args: SymbolArgs = parse_args(name, args)?;
                let period = match args.period.as_deref() {
                    Some(p) => p.parse::<Period>()?,
                    None => self.default_period,
                };
                let set = get_technical_indicators(self.provider.as_ref(), &args.symbol, period, &self.band).await?;
                Ok(serde_json::to_value(set)?)
            }
            ANALYZE_PORTFOLIO => {
                let args: PortfolioArgs = parse_args(name, args)?;
                let report = self.analyzer.analyze_portfolio(&args.holdings).await;
                Ok(serde_json::to_value(report)?)
            }
            GET_MARKET_OVERVIEW => {
                let overview = get_market_overview(Arc::clone(&self.provider)).await;
                Ok(serde_json::to_value(overview)?)
            }
            CALCULATE_PORTFOLIO_ALLOCATION => {
                let args: AllocationArgs = parse_args(name, args)?;
                let plan = calculate_portfolio_allocation(
                    args.total_investment,
                    &args.risk_tolerance,
                    &args.investment_goals,
                )?;
                Ok(serde_json::to_value(plan)?)
            }
            other => anyhow::bail!("unknown tool `{other}`"),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> anyhow::Result<T> {
    serde_json::from_value(args).with_context(|| format!("invalid arguments for `{tool}`"))
}

#[async_trait::async_trait]
impl ToolExecutor for Toolbox {
    async fn execute(&self, name: &str, args: Value) -> Value {
        match self.call(name, args).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(tool = name, error = %format!("{err:#}"), "tool call failed");
                json!({ "error": format!("{err:#}") })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testing::{linear_closes, StaticMarketData};

    fn toolbox() -> Toolbox {
        let provider = Arc::new(
            StaticMarketData::new()
                .with_quote("AAPL", 150.0, Some("Technology"))
                .with_closes("AAPL", &linear_closes(60, 100.0, 1.0))
                .failing("DOWN"),
        );
        Toolbox::new(provider, &PortfolioSettings::default()).unwrap()
    }

    #[test]
    fn specs_cover_every_tool() {
        let names: Vec<&str> = Toolbox::specs().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                GET_STOCK_INFO,
                ANALYZE_TECHNICAL,
                ANALYZE_PORTFOLIO,
                GET_MARKET_OVERVIEW,
                CALCULATE_PORTFOLIO_ALLOCATION
            ]
        );
        for spec in Toolbox::specs() {
            assert_eq!(spec.parameters["type"], "object");
        }
    }

    #[tokio::test]
    async fn stock_info_and_technicals() {
        let tb = toolbox();
        let info = tb.execute(GET_STOCK_INFO, json!({"symbol": "aapl"})).await;
        assert_eq!(info["current_price"], 150.0);
        assert_eq!(info["sector"], "Technology");

        let tech = tb.execute(ANALYZE_TECHNICAL, json!({"symbol": "AAPL", "period": "6mo"})).await;
        assert_eq!(tech["trend"], "strong_uptrend");
        assert_eq!(tech["bars"], 60);
    }

    #[tokio::test]
    async fn failures_become_error_values() {
        let tb = toolbox();

        let v = tb.execute(GET_STOCK_INFO, json!({"symbol": "DOWN"})).await;
        assert!(v["error"].as_str().unwrap().contains("DOWN"));

        let v = tb.execute(ANALYZE_TECHNICAL, json!({"symbol": "AAPL", "period": "7w"})).await;
        assert!(v["error"].as_str().unwrap().contains("period"));

        let v = tb.execute(GET_STOCK_INFO, json!({})).await;
        assert!(v["error"].as_str().unwrap().contains("invalid arguments"));

        let v = tb.execute("buy_everything", json!({})).await;
        assert_eq!(v["error"], "unknown tool `buy_everything`");
    }

    #[tokio::test]
    async fn portfolio_and_allocation() {
        let tb = toolbox();
        let report = tb
            .execute(
                ANALYZE_PORTFOLIO,
                json!({"holdings": [{"symbol": "AAPL", "quantity": 10, "purchase_price": 140.0}]}),
            )
            .await;
        assert_eq!(report["total_value"], 1500.0);
        assert_eq!(report["sector_allocation"]["Technology"], 100.0);

        let plan = tb
            .execute(
                CALCULATE_PORTFOLIO_ALLOCATION,
                json!({"total_investment": 10000, "risk_tolerance": "conservative", "investment_goals": ["income"]}),
            )
            .await;
        assert_eq!(plan["allocation_percentages"]["bonds"], 70.0);
        assert_eq!(plan["allocation_amounts"]["bonds"], 7000.0);
    }

    #[tokio::test]
    async fn market_overview_tool_never_errors() {
        let v = toolbox().execute(GET_MARKET_OVERVIEW, json!({})).await;
        assert!(v.get("error").is_none());
        assert_eq!(v["market_sentiment"], "Normal volatility - Neutral");
    }
}
