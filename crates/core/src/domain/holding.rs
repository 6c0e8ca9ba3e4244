use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REQUIRED_FIELDS: [&str; 3] = ["symbol", "quantity", "purchase_price"];

/// A validated position. Symbol is upper-cased, quantity and price are finite and > 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub purchase_price: f64,
}

impl Holding {
    pub fn new(symbol: &str, quantity: f64, purchase_price: f64) -> Result<Self, AnalysisError> {
        HoldingInput {
            symbol: Some(symbol.to_string()),
            quantity: Some(quantity),
            purchase_price: Some(purchase_price),
        }
        .validate_and_into_holding(None)
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.purchase_price
    }
}

/// Holding as it arrives from a caller, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldingInput {
    pub symbol: Option<String>,
    pub quantity: Option<f64>,
    pub purchase_price: Option<f64>,
}

impl HoldingInput {
    /// Decode one raw JSON item. Type errors are reported against the
    /// offending field so a single bad item never poisons the batch.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, AnalysisError> {
        let Some(obj) = value.as_object() else {
            return Err(invalid(index, None, "holding must be a JSON object"));
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|k| obj.get(*k).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(
                index,
                Some(missing[0]),
                &format!("missing required field(s): {}", missing.join(", ")),
            ));
        }

        let symbol = match &obj["symbol"] {
            Value::String(s) => s.clone(),
            _ => return Err(invalid(index, Some("symbol"), "must be a string")),
        };
        let quantity = obj["quantity"]
            .as_f64()
            .ok_or_else(|| invalid(index, Some("quantity"), "must be a number"))?;
        let purchase_price = obj["purchase_price"]
            .as_f64()
            .ok_or_else(|| invalid(index, Some("purchase_price"), "must be a number"))?;

        Ok(Self {
            symbol: Some(symbol),
            quantity: Some(quantity),
            purchase_price: Some(purchase_price),
        })
    }

    pub fn validate_and_into_holding(self, index: Option<usize>) -> Result<Holding, AnalysisError> {
        let err = |field: &str, message: &str| AnalysisError::InvalidInput {
            index,
            field: Some(field.to_string()),
            message: message.to_string(),
        };

        let symbol = self
            .symbol
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| err("symbol", "symbol must be non-empty"))?;

        let quantity = self
            .quantity
            .ok_or_else(|| err("quantity", "missing required field"))?;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(err(
                "quantity",
                &format!("quantity must be > 0 (got {quantity}) for {symbol}"),
            ));
        }

        let purchase_price = self
            .purchase_price
            .ok_or_else(|| err("purchase_price", "missing required field"))?;
        if !purchase_price.is_finite() || purchase_price <= 0.0 {
            return Err(err(
                "purchase_price",
                &format!("purchase_price must be > 0 (got {purchase_price}) for {symbol}"),
            ));
        }

        Ok(Holding {
            symbol,
            quantity,
            purchase_price,
        })
    }
}

/// Validate a raw batch item-by-item. Returns the accepted holdings with
/// their input position alongside the per-item rejections.
pub fn parse_holdings(values: &[Value]) -> (Vec<(usize, Holding)>, Vec<(usize, AnalysisError)>) {
    let mut accepted = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();

    for (idx, v) in values.iter().enumerate() {
        match HoldingInput::from_value(idx, v).and_then(|h| h.validate_and_into_holding(Some(idx))) {
            Ok(h) => accepted.push((idx, h)),
            Err(err) => rejected.push((idx, err)),
        }
    }

    (accepted, rejected)
}

fn invalid(index: usize, field: Option<&str>, message: &str) -> AnalysisError {
    AnalysisError::InvalidInput {
        index: Some(index),
        field: field.map(str::to_string),
        message: message.to_string(),
    }
}
