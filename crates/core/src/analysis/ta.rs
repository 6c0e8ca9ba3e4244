//! Technical-analysis primitives over ordered numeric series.
//!
//! Every function returns a vector aligned with its input where a slot is
//! `None` until enough observations exist for the window. Exponential
//! averages are seeded with the first observation (no SMA warm-up), the
//! same recursion `pandas.ewm(adjust=False)` uses.

pub fn last(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten().filter(|v| v.is_finite())
}

pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }
    out
}

/// Exponentially weighted mean with smoothing factor `alpha`. Missing
/// inputs are skipped; output is withheld until `min_periods` observations.
pub fn ewm(values: &[Option<f64>], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;
    let mut seen = 0usize;

    for v in values {
        if let Some(x) = v {
            state = Some(match state {
                None => *x,
                Some(prev) => (1.0 - alpha) * prev + alpha * x,
            });
            seen += 1;
        }
        out.push(if seen >= min_periods.max(1) { state } else { None });
    }
    out
}

pub fn ema(values: &[f64], span: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ema_opt(&wrapped, span)
}

fn ema_opt(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    if span == 0 {
        return vec![None; values.len()];
    }
    ewm(values, 2.0 / (span as f64 + 1.0), span)
}

/// Wilder RSI. Needs `window` price changes, i.e. `window + 1` closes.
pub fn rsi(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; closes.len()];
    }

    let mut up = Vec::with_capacity(closes.len());
    let mut down = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        if i == 0 {
            up.push(None);
            down.push(None);
            continue;
        }
        let d = closes[i] - closes[i - 1];
        up.push(Some(d.max(0.0)));
        down.push(Some((-d).max(0.0)));
    }

    let alpha = 1.0 / window as f64;
    let up = ewm(&up, alpha, window);
    let down = ewm(&down, alpha, window);

    up.iter()
        .zip(&down)
        .map(|(u, d)| match (u, d) {
            (Some(_), Some(d)) if *d == 0.0 => Some(100.0),
            (Some(u), Some(d)) => Some(100.0 - 100.0 / (1.0 + u / d)),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Macd {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    /// line - signal
    pub histogram: Vec<Option<f64>>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast = ema(closes, fast);
    let slow = ema(closes, slow);

    let line: Vec<Option<f64>> = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_opt(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();

    Macd {
        line,
        signal,
        histogram,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub high: f64,
    pub mid: f64,
    pub low: f64,
}

/// Bollinger bands on the most recent window, population standard deviation.
pub fn bollinger_last(closes: &[f64], window: usize, width: f64) -> Option<Bands> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    let mid = mean(tail)?;
    let var = tail.iter().map(|x| (x - mid).powi(2)).sum::<f64>() / window as f64;
    let sd = var.sqrt();
    Some(Bands {
        high: mid + width * sd,
        mid,
        low: mid - width * sd,
    })
}

/// Average true range with Wilder smoothing, seeded by the mean of the first `window` ranges.
pub fn atr_last(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Option<f64> {
    let n = close.len().min(high.len()).min(low.len());
    if window == 0 || n < window {
        return None;
    }

    let tr: Vec<f64> = (0..n)
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                range
            } else {
                let pc = close[i - 1];
                range.max((high[i] - pc).abs()).max((low[i] - pc).abs())
            }
        })
        .collect();

    let w = window as f64;
    let mut atr = tr[..window].iter().sum::<f64>() / w;
    for value in &tr[window..] {
        atr = (atr * (w - 1.0) + value) / w;
    }
    Some(atr)
}

/// Rolling volume-weighted typical price over the last `window` bars.
pub fn vwap_last(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], window: usize) -> Option<f64> {
    let n = close.len().min(high.len()).min(low.len()).min(volume.len());
    if window == 0 || n < window {
        return None;
    }

    let mut pv = 0.0;
    let mut vol = 0.0;
    for i in n - window..n {
        let tp = (high[i] + low[i] + close[i]) / 3.0;
        pv += tp * volume[i];
        vol += volume[i];
    }
    if vol == 0.0 {
        return None;
    }
    Some(pv / vol)
}

/// Simple returns between consecutive values; a zero base yields no return.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
