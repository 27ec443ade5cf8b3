//! Document serialization with quick-xml

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{Document, NodeId, NodeKind};
use crate::error::DocumentError;

enum Step {
    Open(NodeId),
    Close(NodeId),
}

/// Serialize without reformatting: the parser keeps whitespace text, and
/// inside text content that whitespace is rendered.
pub(super) fn write(doc: &Document) -> Result<String, DocumentError> {
    let mut writer = Writer::new(Vec::new());

    if doc.has_declaration() {
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        writer
            .write_event(Event::Text(BytesText::from_escaped("\n")))
            .map_err(write_error)?;
    }

    let mut stack = vec![Step::Open(doc.root())];
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(id) => match &doc.node(id).kind {
                NodeKind::Element(element) => {
                    let mut start = BytesStart::new(element.name.as_str());
                    for attr in &element.attributes {
                        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
                    }

                    let children = doc.children(id);
                    if children.is_empty() {
                        writer
                            .write_event(Event::Empty(start))
                            .map_err(write_error)?;
                    } else {
                        writer
                            .write_event(Event::Start(start))
                            .map_err(write_error)?;
                        stack.push(Step::Close(id));
                        stack.extend(children.iter().rev().map(|c| Step::Open(*c)));
                    }
                }
                NodeKind::Text(text) => {
                    writer
                        .write_event(Event::Text(BytesText::new(text)))
                        .map_err(write_error)?;
                }
                NodeKind::Comment(text) => {
                    writer
                        .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
                        .map_err(write_error)?;
                }
            },
            Step::Close(id) => {
                if let Some(element) = doc.element(id) {
                    writer
                        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
                        .map_err(write_error)?;
                }
            }
        }
    }

    String::from_utf8(writer.into_inner()).map_err(write_error)
}

fn write_error(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Write(e.to_string())
}
