//! Templates, their configured formulas and discovered declarations
//!
//! A template is a vector document with marked placeholder nodes. Extraction
//! turns each marked node into a `FormulaDeclaration`; the configured
//! `Formula` with the same name supplies the expression evaluated for it.
//!
//! # Example
//!
//! ```text
//! <text id="n1" class="formula" style="fill:#000000;font-size:4mm">{{mmA}}</text>
//! ```
//!
//! With a formula `mmA = "mmA * 2"` and a binding `mmA = 5`, node `n1` is
//! replaced by a text node reading `10`.

mod extractor;
mod registry;

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

use crate::expr::{is_builtin, parse};
use crate::style::ResolvedStyle;
use crate::variables::AttributeSelection;

pub use extractor::{find_declarations, formula_name, ExtractionReport, SkippedDeclaration};
pub(crate) use extractor::marked_nodes;
pub use registry::{TemplateError, TemplateRegistry};

/// What a template is printed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Fabrication,
    Procurement,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Fabrication => write!(f, "fabrication"),
            TemplateKind::Procurement => write!(f, "procurement"),
        }
    }
}

/// Conditional-attribute filter deciding whether a template applies
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeFilter {
    pub attribute: String,
    pub values: Vec<String>,
}

impl AttributeFilter {
    pub fn new(attribute: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            attribute: attribute.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// True when any selected value of the filtered attribute is accepted
    pub fn accepts(&self, selections: &[AttributeSelection]) -> bool {
        selections
            .iter()
            .filter(|s| s.attribute == self.attribute)
            .any(|s| self.values.iter().any(|v| *v == s.value))
    }
}

/// A configured formula: the expression evaluated for every marked node
/// carrying this name, plus optional style overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Formula {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    /// Variable names the formula reads. Derived from the expression when absent.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
}

impl Formula {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            fill: None,
            font_size: None,
            attributes: None,
        }
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    pub fn with_font_size(mut self, font_size: impl Into<String>) -> Self {
        self.font_size = Some(font_size.into());
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Names of the variables this formula reads.
    ///
    /// An expression that does not parse references nothing; it will fail
    /// again, with its own error, when evaluated.
    pub fn referenced_names(&self) -> BTreeSet<String> {
        if let Some(attributes) = &self.attributes {
            return attributes
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
        }
        match parse(&self.expression) {
            Ok(expr) => expr.names().into_iter().filter(|n| !is_builtin(n)).collect(),
            Err(_) => BTreeSet::new(),
        }
    }

    /// Apply this formula's overrides on top of a node's resolved style
    pub fn style_over(&self, base: &ResolvedStyle) -> ResolvedStyle {
        let pick = |over: &Option<String>, base: &str| {
            over.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(base)
                .to_string()
        };
        ResolvedStyle {
            fill: pick(&self.fill, &base.fill),
            font_size: pick(&self.font_size, &base.font_size),
            font_family: base.font_family.clone(),
        }
    }
}

/// A formula placeholder discovered in a template.
///
/// Unique per `(name, node_id, template)`; the style is the one resolved
/// when the node was discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaDeclaration {
    pub name: String,
    pub node_id: String,
    pub template: String,
    pub style: ResolvedStyle,
}

impl FormulaDeclaration {
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.name, &self.node_id, &self.template)
    }

    pub fn same_key(&self, other: &FormulaDeclaration) -> bool {
        self.key() == other.key()
    }
}

/// A vector template and its configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub kind: TemplateKind,
    /// Document source text
    pub source: String,
    pub filter: Option<AttributeFilter>,
    pub formulas: Vec<Formula>,
}

impl Template {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: TemplateKind,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            source: source.into(),
            filter: None,
            formulas: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_formula(mut self, formula: Formula) -> Self {
        self.formulas.push(formula);
        self
    }

    /// File name the template is attached under
    pub fn filename(&self) -> String {
        format!("{}.svg", self.name)
    }

    /// Configured formula for a placeholder name
    pub fn formula(&self, name: &str) -> Option<&Formula> {
        self.formulas.iter().find(|f| f.name == name)
    }

    /// Applicability gate: a template without a filter always applies
    pub fn applies_to(&self, selections: &[AttributeSelection]) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.accepts(selections))
    }

    /// Every variable name read by any configured formula
    pub fn referenced_names(&self) -> BTreeSet<String> {
        crate::variables::referenced_names(&self.formulas)
    }
}
