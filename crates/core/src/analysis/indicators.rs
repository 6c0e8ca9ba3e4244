use crate::analysis::ta;
use crate::domain::{Interval, Period, PriceSeries};
use crate::error::AnalysisError;
use crate::market::{normalize_symbol, MarketDataProvider};
use serde::{Deserialize, Serialize};

const SHORT_TREND_WINDOW: usize = 10;
const LONG_TREND_WINDOW: usize = 30;
const RSI_WINDOW: usize = 14;
const ATR_WINDOW: usize = 14;
const VWAP_WINDOW: usize = 14;
const BOLLINGER_WINDOW: usize = 20;
const BOLLINGER_WIDTH: f64 = 2.0;
const LEVELS_WINDOW: usize = 20;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_BULLISH: f64 = 60.0;
const RSI_BEARISH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUptrend,
    Uptrend,
    Sideways,
    Downtrend,
    StrongDowntrend,
}

impl Trend {
    pub fn is_downtrend(self) -> bool {
        matches!(self, Self::Downtrend | Self::StrongDowntrend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Momentum {
    Overbought,
    Oversold,
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
}

/// Multiplicative band around the long SMA inside which a crossover only
/// counts as a plain up/down trend rather than a strong one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendBand {
    pub upper: f64,
    pub lower: f64,
}

impl Default for TrendBand {
    fn default() -> Self {
        Self {
            upper: 1.02,
            lower: 0.98,
        }
    }
}

/// Indicators derived from one price series. Window-dependent values are
/// `None` when the series is shorter than the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub bars: usize,
    pub current_price: f64,
    pub price_change_pct: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_20: Option<f64>,
    pub rsi: Option<f64>,
    /// MACD histogram (MACD line minus signal).
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_high: Option<f64>,
    pub bb_mid: Option<f64>,
    pub bb_low: Option<f64>,
    pub vwap: Option<f64>,
    pub volume_trend: Option<VolumeTrend>,
    pub atr: Option<f64>,
    /// Annualized standard deviation of daily returns, in percent.
    pub volatility: Option<f64>,
    pub support: f64,
    pub resistance: f64,
    pub trend: Trend,
    pub momentum: Momentum,
}

pub fn classify_trend(short: f64, long: f64, band: &TrendBand) -> Trend {
    if short > long * band.upper {
        Trend::StrongUptrend
    } else if short > long {
        Trend::Uptrend
    } else if short < long * band.lower {
        Trend::StrongDowntrend
    } else if short < long {
        Trend::Downtrend
    } else {
        Trend::Sideways
    }
}

/// Overbought/oversold take precedence over the looser bullish/bearish bands.
pub fn classify_momentum(rsi: Option<f64>, macd: Option<f64>) -> Momentum {
    let (Some(rsi), Some(macd)) = (rsi, macd) else {
        return Momentum::Neutral;
    };

    if rsi > RSI_OVERBOUGHT && macd > 0.0 {
        Momentum::Overbought
    } else if rsi < RSI_OVERSOLD && macd < 0.0 {
        Momentum::Oversold
    } else if rsi > RSI_BULLISH && macd > 0.0 {
        Momentum::Bullish
    } else if rsi < RSI_BEARISH && macd < 0.0 {
        Momentum::Bearish
    } else {
        Momentum::Neutral
    }
}

pub fn compute_indicators(series: &PriceSeries, band: &TrendBand) -> Result<IndicatorSet, AnalysisError> {
    let Some(last_bar) = series.bars.last() else {
        return Err(AnalysisError::NoData {
            symbol: series.symbol.clone(),
        });
    };

    let close = series.closes();
    let high = series.highs();
    let low = series.lows();
    let volume = series.volumes();

    let first = close[0];
    let current_price = last_bar.close;
    let price_change_pct = if first != 0.0 {
        (current_price - first) / first * 100.0
    } else {
        0.0
    };

    let rsi = ta::last(&ta::rsi(&close, RSI_WINDOW));
    let macd = ta::macd(&close, 12, 26, 9);
    let macd_diff = ta::last(&macd.histogram);
    let bands = ta::bollinger_last(&close, BOLLINGER_WINDOW, BOLLINGER_WIDTH);

    let volatility = ta::sample_std(&ta::pct_change(&close))
        .map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt() * 100.0);

    let tail = close.len().saturating_sub(LEVELS_WINDOW);
    let support = low[tail..].iter().copied().fold(f64::INFINITY, f64::min);
    let resistance = high[tail..].iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let trend = match (
        ta::last(&ta::sma(&close, SHORT_TREND_WINDOW)),
        ta::last(&ta::sma(&close, LONG_TREND_WINDOW)),
    ) {
        (Some(short), Some(long)) => classify_trend(short, long, band),
        _ => Trend::Sideways,
    };

    Ok(IndicatorSet {
        symbol: series.symbol.clone(),
        bars: series.len(),
        current_price,
        price_change_pct,
        sma_20: ta::last(&ta::sma(&close, 20)),
        sma_50: ta::last(&ta::sma(&close, 50)),
        ema_20: ta::last(&ta::ema(&close, 20)),
        rsi,
        macd: macd_diff,
        macd_signal: ta::last(&macd.signal),
        bb_high: bands.map(|b| b.high),
        bb_mid: bands.map(|b| b.mid),
        bb_low: bands.map(|b| b.low),
        vwap: ta::vwap_last(&high, &low, &close, &volume, VWAP_WINDOW),
        volume_trend: volume_trend(&volume),
        atr: ta::atr_last(&high, &low, &close, ATR_WINDOW),
        volatility,
        support,
        resistance,
        trend,
        momentum: classify_momentum(rsi, macd_diff),
    })
}

/// Mean of the last 5 volumes against the 15 before them.
fn volume_trend(volume: &[f64]) -> Option<VolumeTrend> {
    let n = volume.len();
    if n <= 5 {
        return None;
    }
    let recent = ta::mean(&volume[n - 5..])?;
    let prior = ta::mean(&volume[n.saturating_sub(20)..n - 5])?;
    Some(if recent > prior {
        VolumeTrend::Increasing
    } else {
        VolumeTrend::Decreasing
    })
}

/// Fetch a daily series for `symbol` over `period` and compute its indicators.
pub async fn get_technical_indicators(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    period: Period,
    band: &TrendBand,
) -> Result<IndicatorSet, AnalysisError> {
    let symbol = normalize_symbol(symbol);
    let series = provider
        .get_price_series(&symbol, period, Interval::OneDay)
        .await?;
    compute_indicators(&series, band)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testing::{linear_closes, series_from_closes, StaticMarketData};

    #[test]
    fn empty_series_is_a_distinct_failure() {
        let empty = PriceSeries::new("AAPL", Vec::new());
        assert_eq!(
            compute_indicators(&empty, &TrendBand::default()),
            Err(AnalysisError::NoData {
                symbol: "AAPL".to_string()
            })
        );
    }

    #[test]
    fn trend_band_boundaries() {
        let band = TrendBand::default();
        assert_eq!(classify_trend(102.01, 100.0, &band), Trend::StrongUptrend);
        assert_eq!(classify_trend(102.0, 100.0, &band), Trend::Uptrend);
        assert_eq!(classify_trend(100.5, 100.0, &band), Trend::Uptrend);
        assert_eq!(classify_trend(100.0, 100.0, &band), Trend::Sideways);
        assert_eq!(classify_trend(99.5, 100.0, &band), Trend::Downtrend);
        assert_eq!(classify_trend(98.0, 100.0, &band), Trend::Downtrend);
        assert_eq!(classify_trend(97.99, 100.0, &band), Trend::StrongDowntrend);
    }

    #[test]
    fn momentum_precedence() {
        assert_eq!(classify_momentum(Some(75.0), Some(1.0)), Momentum::Overbought);
        assert_eq!(classify_momentum(Some(25.0), Some(-1.0)), Momentum::Oversold);
        assert_eq!(classify_momentum(Some(65.0), Some(1.0)), Momentum::Bullish);
        assert_eq!(classify_momentum(Some(35.0), Some(-1.0)), Momentum::Bearish);
        // RSI extreme without MACD confirmation
        assert_eq!(classify_momentum(Some(75.0), Some(-1.0)), Momentum::Neutral);
        assert_eq!(classify_momentum(Some(25.0), Some(1.0)), Momentum::Neutral);
        assert_eq!(classify_momentum(Some(70.0), Some(1.0)), Momentum::Bullish);
        assert_eq!(classify_momentum(None, Some(1.0)), Momentum::Neutral);
    }

    #[test]
    fn short_history_yields_soft_nulls() {
        let series = series_from_closes("AAPL", &linear_closes(25, 100.0, 1.0));
        let ind = compute_indicators(&series, &TrendBand::default()).unwrap();

        assert_eq!(ind.bars, 25);
        assert!(ind.sma_20.is_some());
        assert!(ind.bb_mid.is_some());
        assert!(ind.rsi.is_some());
        assert_eq!(ind.sma_50, None);
        assert_eq!(ind.macd, None);
        // fewer than 30 closes: no long SMA
        assert_eq!(ind.trend, Trend::Sideways);
        assert_eq!(ind.momentum, Momentum::Neutral);
    }

    #[test]
    fn single_bar_has_basic_stats_only() {
        let series = series_from_closes("AAPL", &[50.0]);
        let ind = compute_indicators(&series, &TrendBand::default()).unwrap();
        assert_eq!(ind.current_price, 50.0);
        assert_eq!(ind.price_change_pct, 0.0);
        assert_eq!(ind.volatility, None);
        assert_eq!(ind.support, 49.5);
        assert_eq!(ind.resistance, 50.5);
        assert_eq!(ind.volume_trend, None);
    }

    #[test]
    fn steady_rally_is_strong_uptrend_and_overbought() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).powf(1.5)).collect();
        let series = series_from_closes("NVDA", &closes);
        let ind = compute_indicators(&series, &TrendBand::default()).unwrap();

        assert_eq!(ind.trend, Trend::StrongUptrend);
        assert_eq!(ind.rsi, Some(100.0));
        assert!(ind.macd.unwrap() > 0.0);
        assert_eq!(ind.momentum, Momentum::Overbought);
        assert!(ind.sma_50.is_some());
        assert!(ind.price_change_pct > 0.0);

        let expected_support = closes[40..].iter().map(|c| c * 0.99).fold(f64::INFINITY, f64::min);
        assert!((ind.support - expected_support).abs() < 1e-9);
    }

    #[test]
    fn steady_decline_is_strong_downtrend() {
        let series = series_from_closes("F", &linear_closes(60, 200.0, -2.0));
        let ind = compute_indicators(&series, &TrendBand::default()).unwrap();
        assert_eq!(ind.trend, Trend::StrongDowntrend);
        assert!(ind.trend.is_downtrend());
        assert!(ind.price_change_pct < 0.0);
    }

    #[test]
    fn volatility_is_annualized_percent() {
        // alternating +10% / -10% style moves
        let closes = [100.0, 110.0, 99.0, 108.9];
        let series = series_from_closes("X", &closes);
        let ind = compute_indicators(&series, &TrendBand::default()).unwrap();

        let returns = ta::pct_change(&closes);
        let expected = ta::sample_std(&returns).unwrap() * 252f64.sqrt() * 100.0;
        assert!((ind.volatility.unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fetches_series_through_provider() {
        let provider = StaticMarketData::new().with_closes("MSFT", &linear_closes(40, 300.0, 1.0));

        let ind = get_technical_indicators(&provider, " msft ", Period::ThreeMonths, &TrendBand::default())
            .await
            .unwrap();
        assert_eq!(ind.symbol, "MSFT");
        assert_eq!(ind.current_price, 339.0);

        let missing = get_technical_indicators(&provider, "NOPE", Period::ThreeMonths, &TrendBand::default()).await;
        assert!(matches!(missing, Err(AnalysisError::NoData { .. })));
    }
}
