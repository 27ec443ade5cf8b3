//! Formula discovery over parsed template documents

use std::fmt;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::document::{Document, NodeId};
use crate::template::FormulaDeclaration;

/// A marked node that did not produce a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedDeclaration {
    /// No stable id, so the node cannot be targeted later
    MissingId { name: String },
    /// No text or label yielded a formula name
    MissingName { node_id: Option<String> },
    /// The declaration already exists
    Duplicate { name: String, node_id: String },
}

impl fmt::Display for SkippedDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkippedDeclaration::MissingId { name } => {
                write!(f, "formula '{}' is on a node without id", name)
            }
            SkippedDeclaration::MissingName { node_id: Some(id) } => {
                write!(f, "node '{}' has no formula name", id)
            }
            SkippedDeclaration::MissingName { node_id: None } => {
                write!(f, "node without id has no formula name")
            }
            SkippedDeclaration::Duplicate { name, node_id } => {
                write!(f, "formula '{}' on node '{}' is already declared", name, node_id)
            }
        }
    }
}

/// Outcome of one extraction pass over a template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    pub template: String,
    /// Every declaration found in this pass, in document order
    pub declarations: Vec<FormulaDeclaration>,
    /// How many of them were not registered before
    pub added: usize,
    pub skipped: Vec<SkippedDeclaration>,
}

/// Marked nodes in document order
pub(crate) fn marked_nodes<'a>(
    doc: &'a Document,
    marker_class: &'a str,
) -> impl Iterator<Item = NodeId> + 'a {
    doc.elements()
        .filter(move |n| doc.element(*n).is_some_and(|e| e.has_class(marker_class)))
}

/// Derive the formula name of a marked node.
///
/// Candidates are the node's leading text (before its first child element),
/// then each label attribute, then the same checks over every descendant
/// element in document order. The first non-blank candidate is taken with `{{`/`}}` delimiters and surrounding
/// whitespace removed.
pub fn formula_name<S: AsRef<str>>(doc: &Document, node: NodeId, labels: &[S]) -> Option<String> {
    let candidates = |id: NodeId| {
        let text = doc.leading_text(id);
        std::iter::once(text).chain(
            labels
                .iter()
                .filter_map(move |label| doc.attr(id, label.as_ref()).map(String::from)),
        )
    };

    let candidate = std::iter::once(node)
        .chain(doc.descendant_elements(node))
        .flat_map(candidates)
        .find(|c| !c.trim().is_empty())?;

    let name = candidate.replace("{{", "").replace("}}", "");
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Collect the declarations a template document carries.
///
/// Does not touch any registry: `added` is left at zero. Nodes that cannot
/// be declared are reported in `skipped` and logged.
pub fn find_declarations(doc: &Document, template: &str, config: &EngineConfig) -> ExtractionReport {
    let resolver = config.style_resolver();
    let mut report = ExtractionReport {
        template: template.to_string(),
        ..Default::default()
    };

    for node in marked_nodes(doc, &config.marker_class) {
        let node_id = doc.element(node).and_then(|e| e.id()).map(String::from);

        let Some(name) = formula_name(doc, node, &config.label_attributes) else {
            debug!(template, node_id = ?node_id, "marked node has no formula name, skipping");
            report.skipped.push(SkippedDeclaration::MissingName { node_id });
            continue;
        };

        let Some(node_id) = node_id else {
            warn!(template, formula = %name, "marked node has no id, skipping");
            report.skipped.push(SkippedDeclaration::MissingId { name });
            continue;
        };

        let declaration = FormulaDeclaration {
            name,
            node_id,
            template: template.to_string(),
            style: resolver.resolve(doc, node),
        };

        if report.declarations.iter().any(|d| d.same_key(&declaration)) {
            debug!(template, formula = %declaration.name, node = %declaration.node_id, "duplicate marked node");
            report.skipped.push(SkippedDeclaration::Duplicate {
                name: declaration.name,
                node_id: declaration.node_id,
            });
            continue;
        }

        debug!(
            template,
            formula = %declaration.name,
            node = %declaration.node_id,
            fill = %declaration.style.fill,
            font_size = %declaration.style.font_size,
            "found formula declaration"
        );
        report.declarations.push(declaration);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LABELS: &[&str] = &["aria-label", "aria-description"];

    fn node_with_id(doc: &Document, id: &str) -> NodeId {
        doc.elements()
            .find(|n| doc.attr(*n, "id") == Some(id))
            .expect("node should exist")
    }

    #[test]
    fn test_name_from_own_text() {
        let doc = Document::parse(r#"<svg><text id="n1"> {{ mmA }} </text></svg>"#).unwrap();
        assert_eq!(formula_name(&doc, node_with_id(&doc, "n1"), LABELS), Some("mmA".to_string()));
    }

    #[test]
    fn test_name_from_label_before_descendants() {
        let doc = Document::parse(
            r#"<svg><g id="n1" aria-label="{{height}}"><text>{{width}}</text></g></svg>"#,
        )
        .unwrap();
        assert_eq!(
            formula_name(&doc, node_with_id(&doc, "n1"), LABELS),
            Some("height".to_string())
        );
    }

    #[test]
    fn test_name_from_description() {
        let doc = Document::parse(r#"<svg><path id="p" aria-description="depth" d="M 1,2"/></svg>"#)
            .unwrap();
        assert_eq!(formula_name(&doc, node_with_id(&doc, "p"), LABELS), Some("depth".to_string()));
    }

    #[test]
    fn test_name_ignores_text_after_child() {
        let doc = Document::parse(
            r#"<svg><text id="n1" class="formula"><tspan>{{mmA}}</tspan> mm</text></svg>"#,
        )
        .unwrap();
        assert_eq!(formula_name(&doc, node_with_id(&doc, "n1"), LABELS), Some("mmA".to_string()));
    }

    #[test]
    fn test_name_from_descendant() {
        let doc = Document::parse(
            r#"<svg><g id="n1"><rect/><text><tspan>{{mmB}}</tspan></text></g></svg>"#,
        )
        .unwrap();
        assert_eq!(formula_name(&doc, node_with_id(&doc, "n1"), LABELS), Some("mmB".to_string()));
    }

    #[test]
    fn test_no_name_candidate() {
        let doc = Document::parse(r#"<svg><rect id="r"/><text id="t">{{ }}</text></svg>"#).unwrap();
        assert_eq!(formula_name(&doc, node_with_id(&doc, "r"), LABELS), None);
        assert_eq!(formula_name(&doc, node_with_id(&doc, "t"), LABELS), None);
    }

    #[test]
    fn test_find_declarations_skips_and_dedups() {
        let doc = Document::parse(
            r#"<svg>
                <text id="n1" class="formula" style="fill:#000000;font-size:4mm">{{mmA}}</text>
                <text class="formula">{{mmB}}</text>
                <rect id="r1" class="formula"/>
                <text id="n1" class="formula">{{mmA}}</text>
                <text id="n2" class="formulas">{{mmC}}</text>
            </svg>"#,
        )
        .unwrap();
        let report = find_declarations(&doc, "t1", &EngineConfig::default());

        assert_eq!(report.declarations.len(), 1);
        let decl = &report.declarations[0];
        assert_eq!(decl.key(), ("mmA", "n1", "t1"));
        assert_eq!(decl.style.font_size, "4mm");
        assert_eq!(
            report.skipped,
            vec![
                SkippedDeclaration::MissingId {
                    name: "mmB".to_string()
                },
                SkippedDeclaration::MissingName {
                    node_id: Some("r1".to_string())
                },
                SkippedDeclaration::Duplicate {
                    name: "mmA".to_string(),
                    node_id: "n1".to_string()
                },
            ]
        );
    }
}
