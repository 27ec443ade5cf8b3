//! Document parser that builds the node arena from quick-xml events

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Attribute, Document, Element, Node, NodeId, NodeKind};
use crate::error::DocumentError;

pub(super) fn parse(source: &str) -> Result<Document, DocumentError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(false);

    let mut nodes: Vec<Node> = Vec::new();
    // Open elements, innermost last
    let mut stack: Vec<NodeId> = Vec::new();
    let mut root: Option<NodeId> = None;
    let mut declaration = false;

    loop {
        let event = reader.read_event().map_err(|e| DocumentError::Malformed {
            message: e.to_string(),
            position: reader.error_position() as u64,
        })?;

        match event {
            Event::Start(e) => {
                let id = push_element(&mut nodes, &stack, &mut root, &e)?;
                stack.push(id);
            }
            Event::Empty(e) => {
                push_element(&mut nodes, &stack, &mut root, &e)?;
            }
            Event::End(_) => {
                if stack.pop().is_none() {
                    return Err(DocumentError::Malformed {
                        message: "unexpected closing tag".to_string(),
                        position: reader.buffer_position() as u64,
                    });
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| DocumentError::Malformed {
                    message: format!("invalid text content: {}", err),
                    position: reader.buffer_position() as u64,
                })?;
                push_text(&mut nodes, &stack, NodeKind::Text(text.into_owned()));
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_text(&mut nodes, &stack, NodeKind::Text(text));
            }
            Event::Comment(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                if let Some(parent) = stack.last() {
                    attach(&mut nodes, *parent, NodeKind::Comment(text));
                }
            }
            Event::Decl(_) => declaration = true,
            Event::Eof => break,
            // Processing instructions and DOCTYPE are not carried over
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        let name = match &nodes[open.0].kind {
            NodeKind::Element(e) => e.name.clone(),
            _ => String::new(),
        };
        return Err(DocumentError::Unclosed { name });
    }

    let root = root.ok_or(DocumentError::Empty)?;
    Ok(Document {
        nodes,
        root,
        declaration,
    })
}

fn push_element(
    nodes: &mut Vec<Node>,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    start: &BytesStart<'_>,
) -> Result<NodeId, DocumentError> {
    let element = read_element(start)?;

    match stack.last() {
        Some(parent) => Ok(attach(nodes, *parent, NodeKind::Element(element))),
        None => {
            if root.is_some() {
                return Err(DocumentError::MultipleRoots);
            }
            nodes.push(Node::new(NodeKind::Element(element)));
            let id = NodeId(nodes.len() - 1);
            *root = Some(id);
            Ok(id)
        }
    }
}

fn read_element(start: &BytesStart<'_>) -> Result<Element, DocumentError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));

    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::Malformed {
            message: format!("invalid attribute: {}", e),
            position: 0,
        })?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::Malformed {
                message: format!("invalid value for attribute '{}': {}", name, e),
                position: 0,
            })?
            .into_owned();
        element.attributes.push(Attribute { name, value });
    }

    Ok(element)
}

/// Text is kept exactly as written, whitespace included: inside SVG text
/// content it is rendered. Text outside the root element is dropped.
fn push_text(nodes: &mut Vec<Node>, stack: &[NodeId], kind: NodeKind) {
    if let Some(parent) = stack.last() {
        attach(nodes, *parent, kind);
    }
}

fn attach(nodes: &mut Vec<Node>, parent: NodeId, kind: NodeKind) -> NodeId {
    let mut node = Node::new(kind);
    node.parent = Some(parent);
    nodes.push(node);
    let id = NodeId(nodes.len() - 1);
    nodes[parent.0].children.push(id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes_and_text() {
        let doc = parse(r#"<svg width="10"><text id="n1" style="fill:#000">{{mmA}}</text></svg>"#)
            .expect("Should parse");
        let root = doc.element(doc.root()).unwrap();
        assert_eq!(root.name, "svg");
        assert_eq!(root.attr("width"), Some("10"));

        let text = doc.children(doc.root())[0];
        assert_eq!(doc.attr(text, "style"), Some("fill:#000"));
        assert_eq!(doc.own_text(text), "{{mmA}}");
    }

    #[test]
    fn test_parse_unescapes_entities() {
        let doc = parse(r#"<svg><text aria-label="a &amp; b">x &lt; y</text></svg>"#)
            .expect("Should parse");
        let text = doc.children(doc.root())[0];
        assert_eq!(doc.attr(text, "aria-label"), Some("a & b"));
        assert_eq!(doc.own_text(text), "x < y");
    }

    #[test]
    fn test_parse_keeps_namespaced_names() {
        let doc = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape"><g inkscape:label="Layer 1"/></svg>"#,
        )
        .expect("Should parse");
        let g = doc.children(doc.root())[0];
        assert_eq!(doc.attr(g, "inkscape:label"), Some("Layer 1"));
    }

    #[test]
    fn test_parse_records_declaration() {
        let doc = parse("<?xml version=\"1.0\"?>\n<svg/>").expect("Should parse");
        assert!(doc.has_declaration());
    }

    #[test]
    fn test_parse_keeps_whitespace_text() {
        let doc = parse("<svg>\n  <g/>\n  <g/>\n</svg>").expect("Should parse");
        assert_eq!(doc.children(doc.root()).len(), 5);
        assert_eq!(doc.descendant_elements(doc.root()).count(), 2);

        let doc = parse(r#"<svg><text xml:space="preserve">  a  b </text></svg>"#).unwrap();
        let text = doc.children(doc.root())[0];
        assert_eq!(doc.own_text(text), "  a  b ");
    }

    #[test]
    fn test_mismatched_end_tag_is_malformed() {
        let result = parse("<svg><g></svg>");
        assert!(matches!(result, Err(DocumentError::Malformed { .. })));
    }

    #[test]
    fn test_unclosed_element() {
        let result = parse("<svg><g>");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(parse(""), Err(DocumentError::Empty));
        assert_eq!(parse("   "), Err(DocumentError::Empty));
    }

    #[test]
    fn test_multiple_roots() {
        assert_eq!(parse("<a/><b/>"), Err(DocumentError::MultipleRoots));
    }
}
