use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

const GOAL_SHIFT: f64 = 10.0;

const ADVISORY_NOTES: [&str; 3] = [
    "Diversify within each asset class",
    "Rebalance quarterly",
    "Consider tax-advantaged accounts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    /// Unknown profiles fall back to moderate.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Self::Conservative,
            "aggressive" => Self::Aggressive,
            _ => Self::Moderate,
        }
    }

    /// Stocks / bonds / cash, in percent.
    pub fn base_split(self) -> AssetSplit {
        let (stocks, bonds, cash) = match self {
            Self::Conservative => (30.0, 60.0, 10.0),
            Self::Moderate => (60.0, 30.0, 10.0),
            Self::Aggressive => (80.0, 15.0, 5.0),
        };
        AssetSplit { stocks, bonds, cash }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetSplit {
    pub stocks: f64,
    pub bonds: f64,
    pub cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub risk_profile: RiskTolerance,
    pub goals: Vec<String>,
    pub allocation_percentages: AssetSplit,
    pub allocation_amounts: AssetSplit,
    pub recommendations: Vec<String>,
}

pub fn calculate_portfolio_allocation(
    total_investment: f64,
    risk_tolerance: &str,
    goals: &[String],
) -> Result<AllocationPlan, AnalysisError> {
    if !total_investment.is_finite() || total_investment < 0.0 {
        return Err(AnalysisError::InvalidInput {
            index: None,
            field: Some("total_investment".to_string()),
            message: "must be a non-negative amount".to_string(),
        });
    }

    let profile = RiskTolerance::parse_lenient(risk_tolerance);
    let mut pct = profile.base_split();

    let has_goal = |g: &str| goals.iter().any(|x| x.trim().eq_ignore_ascii_case(g));
    if has_goal("growth") {
        pct.stocks += GOAL_SHIFT;
        pct.bonds -= GOAL_SHIFT;
    } else if has_goal("income") {
        pct.bonds += GOAL_SHIFT;
        pct.stocks -= GOAL_SHIFT;
    }

    let amount = |p: f64| p * total_investment / 100.0;
    Ok(AllocationPlan {
        risk_profile: profile,
        goals: goals.to_vec(),
        allocation_percentages: pct,
        allocation_amounts: AssetSplit {
            stocks: amount(pct.stocks),
            bonds: amount(pct.bonds),
            cash: amount(pct.cash),
        },
        recommendations: ADVISORY_NOTES.iter().map(|s| s.to_string()).collect(),
    })
}
