//! Document mutation: placeholders become computed text
//!
//! A template goes through the stages in [`Stage`] in order. Mutation itself
//! is two-phase: every marked node is planned against the unmodified tree
//! first, then the planned edits are applied, so no walk ever runs over a
//! tree that is being restructured.

mod position;

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::document::{Document, Element, NodeId, NodeKind};
use crate::error::{DocumentError, ExprError};
use crate::expr::{evaluate_with_limits, ParseLimits, Value, Variables};
use crate::template::{formula_name, marked_nodes, Formula, FormulaDeclaration, Template};

pub use position::{infer_position, Position};

/// Pipeline stages for one template
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Parsed,
    Extracted,
    VariablesResolved,
    Evaluated,
    Mutated,
    Serialized,
}

/// Result of every configured formula, by formula name
pub type Evaluations = BTreeMap<String, Result<Value, ExprError>>;

/// Evaluate each formula once. Failures are kept, not raised.
pub fn evaluate_formulas(formulas: &[Formula], variables: &Variables, limits: ParseLimits) -> Evaluations {
    formulas
        .iter()
        .map(|formula| {
            let result = evaluate_with_limits(&formula.expression, variables, limits);
            match &result {
                Ok(value) => debug!(formula = %formula.name, %value, "evaluated formula"),
                Err(e) => warn!(
                    formula = %formula.name,
                    expression = %formula.expression,
                    error = %e,
                    "formula evaluation failed"
                ),
            }
            (formula.name.clone(), result)
        })
        .collect()
}

/// What happened to one marked node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Replaced by a text node showing `text`
    Substituted { text: String },
    /// Left in place and flagged
    Failed { error: ExprError },
    /// No id, no name or no configured formula
    Untouched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub node_id: Option<String>,
    pub formula: Option<String>,
    pub outcome: NodeOutcome,
}

/// Per-node outcomes of one mutation, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationReport {
    pub nodes: Vec<NodeReport>,
}

impl MutationReport {
    pub fn substituted(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Substituted { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Failed { .. }))
    }

    pub fn untouched(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Untouched))
    }

    /// Outcome for the node with `id`
    pub fn outcome(&self, id: &str) -> Option<&NodeOutcome> {
        self.nodes
            .iter()
            .find(|n| n.node_id.as_deref() == Some(id))
            .map(|n| &n.outcome)
    }

    fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.nodes.iter().filter(|n| pred(&n.outcome)).count()
    }
}

/// A serialized mutated document
#[derive(Debug, Clone, PartialEq)]
pub struct MutatedDocument {
    pub svg: String,
    pub report: MutationReport,
}

enum Edit {
    Replace { node: NodeId, element: Element, text: String },
    Flag { node: NodeId, warning: Element },
}

/// Applies evaluation results to a parsed template
pub struct Mutator<'a> {
    config: &'a EngineConfig,
}

impl<'a> Mutator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Parse, evaluate and mutate a template, then serialize it.
    ///
    /// Only a document that cannot be parsed or written is an error; failing
    /// formulas end up as markers in the output.
    pub fn run(
        &self,
        template: &Template,
        declarations: &[FormulaDeclaration],
        variables: &Variables,
    ) -> Result<MutatedDocument, DocumentError> {
        let id = template.id.as_str();
        let mut doc = Document::parse(&template.source)?;
        debug!(template = id, stage = ?Stage::Parsed, "parsed template");
        debug!(
            template = id,
            stage = ?Stage::VariablesResolved,
            declarations = declarations.len(),
            variables = variables.len(),
            "inputs ready"
        );

        let evaluations = evaluate_formulas(&template.formulas, variables, self.config.parse_limits());
        debug!(template = id, stage = ?Stage::Evaluated, formulas = evaluations.len(), "evaluated formulas");

        let report = self.apply(&mut doc, template, declarations, &evaluations);
        debug!(
            template = id,
            stage = ?Stage::Mutated,
            substituted = report.substituted(),
            failed = report.failed(),
            untouched = report.untouched(),
            "mutated template"
        );

        let svg = doc.to_xml()?;
        debug!(template = id, stage = ?Stage::Serialized, bytes = svg.len(), "serialized template");
        Ok(MutatedDocument { svg, report })
    }

    /// Mutate `doc` in place from precomputed evaluations
    pub fn apply(
        &self,
        doc: &mut Document,
        template: &Template,
        declarations: &[FormulaDeclaration],
        evaluations: &Evaluations,
    ) -> MutationReport {
        let (edits, report) = self.plan(doc, template, declarations, evaluations);

        for edit in edits {
            match edit {
                Edit::Replace { node, element, text } => {
                    let replacement = doc.create_element(element, Some(&text));
                    if !doc.replace(node, replacement) {
                        warn!(template = %template.id, "cannot replace the document root");
                    }
                }
                Edit::Flag { node, warning } => {
                    if let Some(element) = doc.element_mut(node) {
                        element.add_class(&self.config.error_class);
                    }
                    if let Some(parent) = doc.parent(node) {
                        let glyph = self.config.warning_glyph.clone();
                        let marker = doc.create_element(warning, Some(&glyph));
                        doc.append_child(parent, marker);
                    }
                }
            }
        }

        if self.config.inject_error_style {
            self.inject_error_style(doc);
        }
        report
    }

    fn plan(
        &self,
        doc: &Document,
        template: &Template,
        declarations: &[FormulaDeclaration],
        evaluations: &Evaluations,
    ) -> (Vec<Edit>, MutationReport) {
        let resolver = self.config.style_resolver();
        let mut edits = Vec::new();
        let mut report = MutationReport::default();

        for node in marked_nodes(doc, &self.config.marker_class) {
            let Some(element) = doc.element(node) else {
                continue;
            };
            let node_id = element.id().map(String::from);
            let name = formula_name(doc, node, &self.config.label_attributes);

            let outcome = match (&node_id, &name) {
                (Some(node_id), Some(name)) => match evaluations.get(name) {
                    Some(Ok(value)) => {
                        let text = value.display_text();
                        let base = declarations
                            .iter()
                            .find(|d| d.name == *name && d.node_id == *node_id)
                            .map(|d| d.style.clone())
                            .unwrap_or_else(|| resolver.resolve(doc, node));
                        let style = match template.formula(name) {
                            Some(formula) => formula.style_over(&base),
                            None => base,
                        };

                        let position = infer_position(element);
                        let mut replacement = Element::new("text");
                        replacement.set_attr("id", node_id.as_str());
                        replacement.set_attr("x", position.x);
                        replacement.set_attr("y", position.y);
                        replacement.set_attr("style", style.inline());
                        replacement.set_attr("font-family", style.font_family);
                        if let Some(transform) = element.attr("transform").filter(|t| !t.trim().is_empty()) {
                            replacement.set_attr("transform", transform);
                        }

                        debug!(template = %template.id, node = %node_id, formula = %name, %text, "substituting");
                        edits.push(Edit::Replace {
                            node,
                            element: replacement,
                            text: text.clone(),
                        });
                        NodeOutcome::Substituted { text }
                    }
                    Some(Err(error)) => {
                        warn!(template = %template.id, node = %node_id, formula = %name, %error, "flagging node");
                        edits.push(Edit::Flag {
                            node,
                            warning: self.warning_marker(element),
                        });
                        NodeOutcome::Failed {
                            error: error.clone(),
                        }
                    }
                    None => {
                        debug!(template = %template.id, node = %node_id, formula = %name, "no configured formula");
                        NodeOutcome::Untouched
                    }
                },
                _ => NodeOutcome::Untouched,
            };

            report.nodes.push(NodeReport {
                node_id,
                formula: name,
                outcome,
            });
        }

        (edits, report)
    }

    fn warning_marker(&self, element: &Element) -> Element {
        let position = infer_position(element).shifted(self.config.warning_offset);
        let mut warning = Element::new("text");
        warning.set_attr("x", position.x);
        warning.set_attr("y", position.y);
        warning.set_attr("fill", self.config.warning_fill.as_str());
        warning.set_attr("font-size", self.config.warning_font_size.as_str());
        warning.set_attr("font-weight", "bold");
        warning
    }

    fn inject_error_style(&self, doc: &mut Document) {
        let rule = format!(
            ".{} {{font-style: italic; text-decoration: underline;}}",
            self.config.error_class
        );
        let style = doc.create_element(Element::new("style"), Some(&rule));
        doc.insert_child(doc.root(), 0, style);
    }
}

/// All text under the element whose id is `id`
pub fn text_of(doc: &Document, id: &str) -> Option<String> {
    doc.elements()
        .find(|n| doc.attr(*n, "id") == Some(id))
        .map(|n| {
            doc.descendants(n)
                .filter_map(|d| match &doc.node(d).kind {
                    NodeKind::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect()
        })
}
