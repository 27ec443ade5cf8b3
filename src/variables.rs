//! Variable resolution from product configuration bindings
//!
//! The configuration collaborator hands over `(attribute, value)` tuples.
//! Tuples whose attribute produces a variable carry the variable's symbolic
//! name; their values become numeric bindings when they parse as numbers.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::expr::{Value, Variables};
use crate::template::Formula;

/// One configured attribute value of a product instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeBinding {
    pub attribute: String,
    pub value: String,
    /// Symbolic variable name, for variable-producing attributes
    #[serde(default)]
    pub variable: Option<String>,
    /// Free-entry value typed by the user rather than picked from a list
    #[serde(default)]
    pub custom: bool,
}

impl AttributeBinding {
    /// A plain categorical value
    pub fn categorical(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            variable: None,
            custom: false,
        }
    }

    /// A value picked from the attribute's list that projects onto `variable`
    pub fn standard(
        attribute: impl Into<String>,
        value: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        Self {
            variable: Some(variable.into()),
            ..Self::categorical(attribute, value)
        }
    }

    /// A free-entry value for `variable`
    pub fn custom(
        attribute: impl Into<String>,
        value: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        Self {
            custom: true,
            ..Self::standard(attribute, value, variable)
        }
    }

    pub fn selection(&self) -> AttributeSelection {
        AttributeSelection::new(self.attribute.clone(), self.value.clone())
    }
}

/// An attribute value currently selected for a product instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeSelection {
    pub attribute: String,
    pub value: String,
}

impl AttributeSelection {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// A variable-producing value that was left out of the bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedVariable {
    pub variable: String,
    pub attribute: String,
    pub value: String,
}

/// Bindings plus everything that was dropped on the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub variables: Variables,
    pub dropped: Vec<DroppedVariable>,
}

/// Build the variable map for one evaluation pass.
///
/// Only names in `referenced` are bound. Custom values are applied first;
/// a standard value never overwrites a variable a custom value already set.
pub fn resolve(bindings: &[AttributeBinding], referenced: &BTreeSet<String>) -> Variables {
    resolve_with_report(bindings, referenced).variables
}

/// Like [`resolve`], also reporting non-numeric values that were dropped
pub fn resolve_with_report(bindings: &[AttributeBinding], referenced: &BTreeSet<String>) -> Resolution {
    let mut resolution = Resolution::default();

    let custom_first = bindings
        .iter()
        .filter(|b| b.custom)
        .chain(bindings.iter().filter(|b| !b.custom));

    for binding in custom_first {
        let Some(variable) = binding.variable.as_deref().map(str::trim) else {
            continue;
        };
        if variable.is_empty() || !referenced.contains(variable) {
            continue;
        }
        if resolution.variables.contains_key(variable) {
            debug!(variable, attribute = %binding.attribute, "already bound, keeping earlier value");
            continue;
        }

        match parse_number(&binding.value) {
            Some(n) => {
                debug!(variable, value = n, custom = binding.custom, "bound variable");
                resolution
                    .variables
                    .insert(variable.to_string(), Value::Number(n));
            }
            None => {
                warn!(variable, attribute = %binding.attribute, value = %binding.value, "dropping non-numeric value");
                resolution.dropped.push(DroppedVariable {
                    variable: variable.to_string(),
                    attribute: binding.attribute.clone(),
                    value: binding.value.clone(),
                });
            }
        }
    }

    resolution
}

/// Union of the names read by `formulas`
pub fn referenced_names<'a>(formulas: impl IntoIterator<Item = &'a Formula>) -> BTreeSet<String> {
    formulas
        .into_iter()
        .flat_map(Formula::referenced_names)
        .collect()
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_numeric_bindings() {
        let bindings = vec![
            AttributeBinding::custom("Width", "1500", "mmA"),
            AttributeBinding::standard("Height", " 2000.5 ", "mmB"),
            AttributeBinding::categorical("Color", "Red"),
        ];
        let vars = resolve(&bindings, &names(&["mmA", "mmB"]));
        assert_eq!(vars.get("mmA"), Some(&Value::Number(1500.0)));
        assert_eq!(vars.get("mmB"), Some(&Value::Number(2000.5)));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_unreferenced_names_are_not_bound() {
        let bindings = vec![
            AttributeBinding::custom("Width", "1500", "mmA"),
            AttributeBinding::custom("Depth", "300", "mmD"),
        ];
        let vars = resolve(&bindings, &names(&["mmA"]));
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["mmA"]);
    }

    #[test]
    fn test_custom_value_wins_over_standard() {
        let bindings = vec![
            AttributeBinding::standard("Width", "1000", "mmA"),
            AttributeBinding::custom("Width", "1234", "mmA"),
        ];
        let vars = resolve(&bindings, &names(&["mmA"]));
        assert_eq!(vars.get("mmA"), Some(&Value::Number(1234.0)));
    }

    #[test]
    fn test_non_numeric_value_is_dropped() {
        let bindings = vec![AttributeBinding::custom("Width", "N/A", "mmA")];
        let resolution = resolve_with_report(&bindings, &names(&["mmA"]));
        assert!(resolution.variables.is_empty());
        assert_eq!(
            resolution.dropped,
            vec![DroppedVariable {
                variable: "mmA".to_string(),
                attribute: "Width".to_string(),
                value: "N/A".to_string(),
            }]
        );
    }

    #[test]
    fn test_dropped_custom_value_falls_back_to_standard() {
        let bindings = vec![
            AttributeBinding::custom("Width", "", "mmA"),
            AttributeBinding::standard("Width", "900", "mmA"),
        ];
        let vars = resolve(&bindings, &names(&["mmA"]));
        assert_eq!(vars.get("mmA"), Some(&Value::Number(900.0)));
    }

    #[test]
    fn test_infinite_values_are_dropped() {
        let bindings = vec![AttributeBinding::custom("Width", "inf", "mmA")];
        assert!(resolve(&bindings, &names(&["mmA"])).is_empty());
    }

    #[test]
    fn test_referenced_names_union() {
        let formulas = vec![
            Formula::new("w", "mmA * 2"),
            Formula::new("h", "mmB + mmA"),
        ];
        assert_eq!(referenced_names(&formulas), names(&["mmA", "mmB"]));
    }
}
