pub mod alerts;
pub mod allocation;
pub mod indicators;
pub mod overview;
pub mod portfolio;
pub mod rules;
pub mod ta;
pub mod valuation;

pub use indicators::{get_technical_indicators, IndicatorSet, Momentum, Trend, TrendBand};
pub use portfolio::{HoldingFailure, PortfolioAnalyzer, PortfolioReport};
pub use valuation::{HoldingEvaluator, HoldingValuation};
