pub mod advisor;
pub mod analysis;
pub mod domain;
pub mod error;
pub mod llm;
pub mod market;
pub mod tools;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    use crate::analysis::indicators::TrendBand;
    use crate::analysis::rules::Thresholds;

    const DEFAULT_MAX_CONCURRENCY: usize = 5;
    const DEFAULT_HOLDING_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_INDICATOR_PERIOD: &str = "3mo";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub openrouter_api_key: Option<String>,
        pub llm_base_url: Option<String>,
        pub default_model: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub portfolio: PortfolioSettings,
    }

    /// Knobs for the portfolio fan-out and the rule tables it feeds.
    #[derive(Debug, Clone)]
    pub struct PortfolioSettings {
        pub max_concurrency: usize,
        pub holding_timeout: Duration,
        pub indicator_period: String,
        pub trend_band: TrendBand,
        pub thresholds: Thresholds,
    }

    impl Default for PortfolioSettings {
        fn default() -> Self {
            Self {
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                holding_timeout: Duration::from_secs(DEFAULT_HOLDING_TIMEOUT_SECS),
                indicator_period: DEFAULT_INDICATOR_PERIOD.to_string(),
                trend_band: TrendBand::default(),
                thresholds: Thresholds::default(),
            }
        }
    }

    impl PortfolioSettings {
        pub fn from_env() -> Self {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Zero counts and timeouts are ignored; unparsable values keep the default.
        pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
            let parse = |key: &str| get(key).map(|s| s.trim().to_string());
            let mut out = Self::default();

            if let Some(n) = parse("PORTFOLIO_MAX_CONCURRENCY").and_then(|s| s.parse::<usize>().ok()) {
                if n > 0 {
                    out.max_concurrency = n;
                }
            }
            if let Some(n) = parse("PORTFOLIO_HOLDING_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
                if n > 0 {
                    out.holding_timeout = Duration::from_secs(n);
                }
            }
            if let Some(s) = parse("INDICATOR_PERIOD") {
                if !s.is_empty() {
                    out.indicator_period = s;
                }
            }

            let float = |key: &str| parse(key).and_then(|s| s.parse::<f64>().ok());
            if let Some(v) = float("TREND_BAND_UPPER") {
                out.trend_band.upper = v;
            }
            if let Some(v) = float("TREND_BAND_LOWER") {
                out.trend_band.lower = v;
            }
            if let Some(v) = float("CONCENTRATION_LIMIT_PCT") {
                out.thresholds.concentration_pct = v;
            }
            if let Some(v) = float("PROFIT_TAKING_PCT") {
                out.thresholds.profit_taking_pct = v;
            }
            if let Some(v) = float("STOP_LOSS_PCT") {
                out.thresholds.stop_loss_pct = v;
            }

            out
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                openrouter_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
                llm_base_url: std::env::var("LLM_BASE_URL").ok(),
                default_model: std::env::var("DEFAULT_MODEL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                portfolio: PortfolioSettings::from_env(),
            })
        }

        pub fn require_openrouter_api_key(&self) -> anyhow::Result<&str> {
            self.openrouter_api_key
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .context("OPENROUTER_API_KEY is required")
        }
    }

    pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        fn settings(vars: &[(&str, &str)]) -> PortfolioSettings {
            let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            PortfolioSettings::from_lookup(|key| vars.get(key).cloned())
        }

        #[test]
        fn zero_counts_and_timeouts_keep_defaults() {
            let s = settings(&[("PORTFOLIO_MAX_CONCURRENCY", "0"), ("PORTFOLIO_HOLDING_TIMEOUT_SECS", "0")]);
            assert_eq!(s.max_concurrency, DEFAULT_MAX_CONCURRENCY);
            assert_eq!(s.holding_timeout, Duration::from_secs(DEFAULT_HOLDING_TIMEOUT_SECS));
        }

        #[test]
        fn overrides_and_bad_values() {
            let s = settings(&[
                ("PORTFOLIO_MAX_CONCURRENCY", " 8 "),
                ("PORTFOLIO_HOLDING_TIMEOUT_SECS", "12"),
                ("INDICATOR_PERIOD", "6mo"),
                ("CONCENTRATION_LIMIT_PCT", "25"),
                ("STOP_LOSS_PCT", "lots"),
            ]);
            assert_eq!(s.max_concurrency, 8);
            assert_eq!(s.holding_timeout, Duration::from_secs(12));
            assert_eq!(s.indicator_period, "6mo");
            assert_eq!(s.thresholds.concentration_pct, 25.0);
            assert_eq!(s.thresholds.stop_loss_pct, -20.0);
        }
    }
}
