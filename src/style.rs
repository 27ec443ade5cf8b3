//! Style resolution for marked template nodes
//!
//! A node's effective fill, font size and font family are looked up through
//! an ordered list of resolver steps. Each property is resolved on its own:
//! the first step that yields a non-empty value wins, and properties no step
//! can supply fall back to the resolver's defaults.

use serde::Deserialize;

use crate::document::{Document, NodeId};

/// Effective text style of a node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolvedStyle {
    pub fill: String,
    pub font_size: String,
    pub font_family: String,
}

impl Default for ResolvedStyle {
    fn default() -> Self {
        Self {
            fill: "#000000".to_string(),
            font_size: "12px".to_string(),
            font_family: "Arial".to_string(),
        }
    }
}

impl ResolvedStyle {
    /// Inline style text for a replacement node, e.g. `fill:#000000;font-size:4mm`
    pub fn inline(&self) -> String {
        format!("fill:{};font-size:{}", self.fill, self.font_size)
    }

    fn get(&self, property: StyleProperty) -> &str {
        match property {
            StyleProperty::Fill => &self.fill,
            StyleProperty::FontSize => &self.font_size,
            StyleProperty::FontFamily => &self.font_family,
        }
    }

    fn set(&mut self, property: StyleProperty, value: String) {
        match property {
            StyleProperty::Fill => self.fill = value,
            StyleProperty::FontSize => self.font_size = value,
            StyleProperty::FontFamily => self.font_family = value,
        }
    }
}

/// A resolvable presentation property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleProperty {
    Fill,
    FontSize,
    FontFamily,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 3] = [
        StyleProperty::Fill,
        StyleProperty::FontSize,
        StyleProperty::FontFamily,
    ];

    /// Name used both as presentation attribute and inline style key
    pub fn name(self) -> &'static str {
        match self {
            StyleProperty::Fill => "fill",
            StyleProperty::FontSize => "font-size",
            StyleProperty::FontFamily => "font-family",
        }
    }
}

/// One place a property value can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStep {
    /// Presentation attribute on the node itself (`fill="..."`)
    OwnAttribute,
    /// `key:value` pair in the node's `style` attribute
    OwnInlineStyle,
    /// Attribute, then inline style, of each descendant element in document order
    Descendants,
}

impl ResolverStep {
    pub const DEFAULT_ORDER: [ResolverStep; 3] = [
        ResolverStep::OwnAttribute,
        ResolverStep::OwnInlineStyle,
        ResolverStep::Descendants,
    ];
}

/// Ordered fallback chain ending in fixed defaults
#[derive(Debug, Clone)]
pub struct StyleResolver {
    steps: Vec<ResolverStep>,
    defaults: ResolvedStyle,
}

impl Default for StyleResolver {
    fn default() -> Self {
        Self::new(ResolvedStyle::default())
    }
}

impl StyleResolver {
    pub fn new(defaults: ResolvedStyle) -> Self {
        Self {
            steps: ResolverStep::DEFAULT_ORDER.to_vec(),
            defaults,
        }
    }

    pub fn with_steps(mut self, steps: Vec<ResolverStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn defaults(&self) -> &ResolvedStyle {
        &self.defaults
    }

    /// Resolve every property of `node`, defaulting what cannot be found
    pub fn resolve(&self, doc: &Document, node: NodeId) -> ResolvedStyle {
        let mut style = self.defaults.clone();
        for property in StyleProperty::ALL {
            if let Some(value) = self.lookup(doc, node, property) {
                style.set(property, value);
            }
        }
        style
    }

    /// First non-empty value for `property` along the resolver steps
    pub fn lookup(&self, doc: &Document, node: NodeId, property: StyleProperty) -> Option<String> {
        self.steps
            .iter()
            .find_map(|step| match step {
                ResolverStep::OwnAttribute => own_attribute(doc, node, property),
                ResolverStep::OwnInlineStyle => own_inline_style(doc, node, property),
                ResolverStep::Descendants => doc.descendant_elements(node).find_map(|d| {
                    own_attribute(doc, d, property).or_else(|| own_inline_style(doc, d, property))
                }),
            })
            .map(str::to_string)
    }

    /// Value of `property` in `style`, or the configured default
    pub fn or_default<'a>(&'a self, style: Option<&'a str>, property: StyleProperty) -> &'a str {
        style
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.defaults.get(property))
    }
}

/// Resolve `node` with the default step order and defaults
pub fn resolve_style(doc: &Document, node: NodeId) -> ResolvedStyle {
    StyleResolver::default().resolve(doc, node)
}

fn own_attribute(doc: &Document, node: NodeId, property: StyleProperty) -> Option<&str> {
    doc.attr(node, property.name())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn own_inline_style(doc: &Document, node: NodeId, property: StyleProperty) -> Option<&str> {
    doc.attr(node, "style")
        .and_then(|style| inline_property(style, property.name()))
}

/// Parse `key:value;...` into pairs. The first occurrence of a key wins;
/// pairs without a colon, key or value are skipped.
pub fn parse_inline_style(style: &str) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    for declaration in style.split(';') {
        let Some((key, value)) = declaration.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        if pairs.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
            continue;
        }
        pairs.push((key, value));
    }
    pairs
}

/// Look up one key in inline style text
pub fn inline_property<'a>(style: &'a str, key: &str) -> Option<&'a str> {
    parse_inline_style(style)
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}
