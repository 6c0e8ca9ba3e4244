use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-symbol / per-holding failure. These never abort a batch; the
/// portfolio fan-out turns them into `HoldingFailure` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    /// The provider answered but had no price history for the symbol.
    NoData { symbol: String },
    DataUnavailable { symbol: String, reason: String },
    InvalidInput {
        index: Option<usize>,
        field: Option<String>,
        message: String,
    },
    Timeout { symbol: String, millis: u64 },
}

impl AnalysisError {
    pub fn unavailable(symbol: &str, reason: impl fmt::Display) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            index: None,
            field: None,
            message: message.into(),
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::NoData { symbol }
            | Self::DataUnavailable { symbol, .. }
            | Self::Timeout { symbol, .. } => Some(symbol),
            Self::InvalidInput { .. } => None,
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData { symbol } => write!(f, "no price data available for {symbol}"),
            Self::DataUnavailable { symbol, reason } => {
                write!(f, "market data unavailable for {symbol}: {reason}")
            }
            Self::InvalidInput {
                index,
                field,
                message,
            } => {
                write!(f, "invalid input")?;
                if let Some(i) = index {
                    write!(f, " (holding #{i})")?;
                }
                if let Some(field) = field {
                    write!(f, " field `{field}`")?;
                }
                write!(f, ": {message}")
            }
            Self::Timeout { symbol, millis } => {
                let elapsed = std::time::Duration::from_millis(*millis);
                write!(f, "evaluation of {symbol} timed out after {elapsed:?}")
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message_names_the_holding_and_field() {
        let err = AnalysisError::InvalidInput {
            index: Some(2),
            field: Some("quantity".to_string()),
            message: "must be > 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid input (holding #2) field `quantity`: must be > 0"
        );
        assert_eq!(err.symbol(), None);
    }

    #[test]
    fn timeout_keeps_sub_second_precision() {
        let err = AnalysisError::Timeout {
            symbol: "AAPL".to_string(),
            millis: 50,
        };
        assert_eq!(err.to_string(), "evaluation of AAPL timed out after 50ms");

        let err = AnalysisError::Timeout {
            symbol: "AAPL".to_string(),
            millis: 30_000,
        };
        assert_eq!(err.to_string(), "evaluation of AAPL timed out after 30s");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let err = AnalysisError::NoData {
            symbol: "AAPL".to_string(),
        };
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["kind"], "no_data");
        assert_eq!(v["symbol"], "AAPL");
    }
}
