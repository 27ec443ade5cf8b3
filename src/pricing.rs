//! Price increments computed from attribute price formulas
//!
//! A configurable attribute value may carry a formula over `custom_value`
//! (what the user typed) and `price_so_far` (the price before this
//! attribute). The formula runs in the same sandbox as template formulas.

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ExprError;
use crate::expr::{evaluate, Value, Variables};

/// Errors raised while pricing an attribute value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("cannot evaluate price formula '{formula}': {source}")]
    Evaluation {
        formula: String,
        #[source]
        source: ExprError,
    },

    #[error("price formula '{formula}' produced '{value}', not a number")]
    NonNumeric { formula: String, value: String },
}

/// Price increment for one attribute value.
///
/// Without a formula the fixed `price_extra` applies. Negative results are
/// clamped to zero. Unlike template formulas, a failing price formula is an
/// error: a wrong price must not go out silently.
pub fn price_increment(
    formula: Option<&str>,
    price_extra: f64,
    custom_value: f64,
    price_so_far: f64,
) -> Result<f64, PricingError> {
    let Some(formula) = formula.map(str::trim).filter(|f| !f.is_empty()) else {
        debug!(price_extra, "no price formula, using fixed increment");
        return Ok(price_extra);
    };

    let variables: Variables = [
        ("custom_value".to_string(), Value::Number(custom_value)),
        ("price_so_far".to_string(), Value::Number(price_so_far)),
    ]
    .into_iter()
    .collect();

    let value = evaluate(formula, &variables).map_err(|source| PricingError::Evaluation {
        formula: formula.to_string(),
        source,
    })?;
    let increment = value.as_number().ok_or_else(|| PricingError::NonNumeric {
        formula: formula.to_string(),
        value: value.to_string(),
    })?;

    if increment < 0.0 {
        warn!(formula, increment, "negative price increment, using 0");
        return Ok(0.0);
    }
    debug!(formula, increment, "price increment");
    Ok(increment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_formula_uses_price_extra() {
        assert_eq!(price_increment(None, 12.5, 100.0, 50.0), Ok(12.5));
        assert_eq!(price_increment(Some("  "), 12.5, 100.0, 50.0), Ok(12.5));
    }

    #[test]
    fn test_formula_over_custom_value() {
        let result = price_increment(Some("(ceil(custom_value / 50) * 50 - 950) / 50 * 4"), 0.0, 1020.0, 0.0);
        assert_eq!(result, Ok(8.0));
    }

    #[test]
    fn test_formula_over_price_so_far() {
        assert_eq!(price_increment(Some("price_so_far * 0.2"), 0.0, 0.0, 250.0), Ok(50.0));
    }

    #[test]
    fn test_negative_increment_clamps_to_zero() {
        assert_eq!(price_increment(Some("custom_value - 100"), 0.0, 10.0, 0.0), Ok(0.0));
    }

    #[test]
    fn test_failing_formula_is_an_error() {
        let result = price_increment(Some("custom_value / 0"), 0.0, 10.0, 0.0);
        assert!(matches!(
            result,
            Err(PricingError::Evaluation {
                source: ExprError::DivisionByZero,
                ..
            })
        ));
        assert!(price_increment(Some("math.ceil(custom_value)"), 0.0, 10.0, 0.0).is_err());
    }
}
