use crate::analysis::indicators::{Momentum, Trend};
use crate::analysis::valuation::HoldingValuation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slack for float noise in computed percentage shares.
const PCT_EPSILON: f64 = 1e-9;

/// Rule cut-offs. Defaults are the long-standing advisory values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Sector share (percent) above which diversification is advised.
    pub concentration_pct: f64,
    /// Gain (percent) above which an overbought holding triggers profit-taking.
    pub profit_taking_pct: f64,
    /// Loss (negative percent) below which a downtrending holding triggers a stop.
    pub stop_loss_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            concentration_pct: 30.0,
            profit_taking_pct: 50.0,
            stop_loss_pct: -20.0,
        }
    }
}

/// Advisories for a portfolio: sector concentration warnings first (in
/// sector order), then at most one per holding (in holding order).
pub fn generate(
    holdings: &[HoldingValuation],
    sector_allocation: &BTreeMap<String, f64>,
    thresholds: &Thresholds,
) -> Vec<String> {
    let mut out = Vec::new();

    for (sector, allocation) in sector_allocation {
        if *allocation - thresholds.concentration_pct > PCT_EPSILON {
            out.push(format!(
                "High concentration in {sector} sector ({allocation:.1}%). Consider diversification."
            ));
        }
    }

    for h in holdings {
        if let Some(advice) = holding_advice(h, thresholds) {
            out.push(advice);
        }
    }

    out
}

/// First matching rule wins.
fn holding_advice(h: &HoldingValuation, t: &Thresholds) -> Option<String> {
    let pct = h.gain_loss_pct;

    if pct > t.profit_taking_pct && h.momentum == Some(Momentum::Overbought) {
        return Some(format!(
            "{}: Consider taking partial profits (up {pct:.1}%, overbought)",
            h.symbol
        ));
    }

    if pct < t.stop_loss_pct && h.trend.is_some_and(Trend::is_downtrend) {
        return Some(format!(
            "{}: Consider stop loss (down {:.1}%, downtrend)",
            h.symbol,
            pct.abs()
        ));
    }

    if h.momentum == Some(Momentum::Oversold) && h.trend == Some(Trend::Uptrend) {
        return Some(format!(
            "{}: Potential buying opportunity (oversold in uptrend)",
            h.symbol
        ));
    }

    None
}
