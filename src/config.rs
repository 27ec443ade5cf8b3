//! Engine and product configuration
//!
//! `EngineConfig` tunes how templates are read and mutated. `ProductConfig`
//! is the TOML file the command line works from: the templates of one
//! product with their formulas, plus the attribute bindings and selections
//! of one configured instance.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::expr::ParseLimits;
use crate::style::{ResolvedStyle, StyleResolver};
use crate::template::{AttributeFilter, Formula, Template, TemplateKind};
use crate::variables::{AttributeBinding, AttributeSelection};
use crate::GenerationRequest;

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse configuration TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to read template file {path}: {source}")]
    TemplateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Options for extraction and mutation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Class token marking formula placeholder nodes
    pub marker_class: String,

    /// Class token added to nodes whose formula failed
    pub error_class: String,

    /// Attributes probed for a formula name after the node's own text
    pub label_attributes: Vec<String>,

    /// Style used where nothing else resolves
    pub default_style: ResolvedStyle,

    /// Text of the warning marker placed next to failed nodes
    pub warning_glyph: String,

    /// Horizontal distance between a failed node and its warning marker
    pub warning_offset: f64,

    pub warning_fill: String,

    pub warning_font_size: String,

    /// Whether to add a `<style>` rule for the error class to mutated documents
    pub inject_error_style: bool,

    pub max_expression_depth: usize,

    pub max_expression_tokens: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = ParseLimits::default();
        Self {
            marker_class: "formula".to_string(),
            error_class: "formula-eval-error".to_string(),
            label_attributes: vec!["aria-label".to_string(), "aria-description".to_string()],
            default_style: ResolvedStyle::default(),
            warning_glyph: "!".to_string(),
            warning_offset: 10.0,
            warning_fill: "red".to_string(),
            warning_font_size: "10px".to_string(),
            inject_error_style: true,
            max_expression_depth: limits.max_depth,
            max_expression_tokens: limits.max_tokens,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placeholder marker class
    pub fn with_marker_class(mut self, class: impl Into<String>) -> Self {
        self.marker_class = class.into();
        self
    }

    /// Set the class added to failed nodes
    pub fn with_error_class(mut self, class: impl Into<String>) -> Self {
        self.error_class = class.into();
        self
    }

    /// Set the fallback style
    pub fn with_default_style(mut self, style: ResolvedStyle) -> Self {
        self.default_style = style;
        self
    }

    /// Set the warning marker text
    pub fn with_warning_glyph(mut self, glyph: impl Into<String>) -> Self {
        self.warning_glyph = glyph.into();
        self
    }

    /// Set whether the error class style rule is injected
    pub fn with_error_style(mut self, inject: bool) -> Self {
        self.inject_error_style = inject;
        self
    }

    /// Set the expression complexity bounds
    pub fn with_expression_limits(mut self, max_depth: usize, max_tokens: usize) -> Self {
        self.max_expression_depth = max_depth;
        self.max_expression_tokens = max_tokens;
        self
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_depth: self.max_expression_depth,
            max_tokens: self.max_expression_tokens,
        }
    }

    pub fn style_resolver(&self) -> StyleResolver {
        StyleResolver::new(self.default_style.clone())
    }
}

/// A template entry in a product file
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    pub id: String,
    pub name: String,
    pub kind: TemplateKind,
    /// Document path, relative to the product file
    pub file: PathBuf,
    #[serde(default)]
    pub filter: Option<AttributeFilter>,
    #[serde(default)]
    pub formulas: Vec<Formula>,
}

/// A product with its templates and one configured instance
#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
    #[serde(default)]
    pub bindings: Vec<AttributeBinding>,
    #[serde(default)]
    pub selections: Vec<AttributeSelection>,
    /// Directory template paths are resolved against
    #[serde(skip)]
    base_path: Option<PathBuf>,
}

impl ProductConfig {
    /// Load a product file; template paths resolve against its directory
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        config.base_path = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Load a product file from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve a relative path to an absolute path
    pub fn resolve_path(&self, relative: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) => base.join(relative),
            None => relative.to_path_buf(),
        }
    }

    /// Read every template document and build the templates
    pub fn load_templates(&self) -> Result<Vec<Template>, ConfigError> {
        self.templates
            .iter()
            .map(|entry| {
                let path = self.resolve_path(&entry.file);
                let source = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::TemplateFile { path, source })?;
                Ok(Template {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    kind: entry.kind,
                    source,
                    filter: entry.filter.clone(),
                    formulas: entry.formulas.clone(),
                })
            })
            .collect()
    }

    /// Generation request for this product's configured instance
    pub fn request(&self, context: impl Into<String>, kind: TemplateKind) -> GenerationRequest {
        GenerationRequest::new(context, kind)
            .with_bindings(self.bindings.iter().cloned())
            .with_selections(self.selections.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT: &str = r##"
product = "Sliding door"

[engine]
marker_class = "odoo-formula"
warning_glyph = "?"

[engine.default_style]
font_size = "3mm"

[[templates]]
id = "door"
name = "Door"
kind = "fabrication"
file = "door.svg"

[templates.filter]
attribute = "Color"
values = ["Red"]

[[templates.formulas]]
name = "width"
expression = "mmA * 2"
fill = "#ff0000"

[[templates.formulas]]
name = "height"
expression = "mmB"
attributes = ["mmB"]

[[bindings]]
attribute = "Width"
value = "1500"
variable = "mmA"
custom = true

[[bindings]]
attribute = "Color"
value = "Red"

[[selections]]
attribute = "Glass"
value = "Clear"
"##;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.marker_class, "formula");
        assert_eq!(config.error_class, "formula-eval-error");
        assert_eq!(config.warning_offset, 10.0);
        assert!(config.inject_error_style);
        assert_eq!(config.parse_limits(), ParseLimits::default());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new()
            .with_marker_class("odoo-formula")
            .with_error_class("bad")
            .with_warning_glyph("?")
            .with_error_style(false)
            .with_expression_limits(8, 32);

        assert_eq!(config.marker_class, "odoo-formula");
        assert_eq!(config.error_class, "bad");
        assert_eq!(config.warning_glyph, "?");
        assert!(!config.inject_error_style);
        assert_eq!(config.parse_limits().max_depth, 8);
        assert_eq!(config.parse_limits().max_tokens, 32);
    }

    #[test]
    fn test_parse_product_file() {
        let config = ProductConfig::from_str(PRODUCT).expect("Should parse");
        assert_eq!(config.product.as_deref(), Some("Sliding door"));
        assert_eq!(config.engine.marker_class, "odoo-formula");
        assert_eq!(config.engine.error_class, "formula-eval-error");
        assert_eq!(config.engine.default_style.font_size, "3mm");
        assert_eq!(config.engine.default_style.fill, "#000000");

        let template = &config.templates[0];
        assert_eq!(template.kind, TemplateKind::Fabrication);
        assert_eq!(template.filter.as_ref().map(|f| f.values.clone()), Some(vec!["Red".to_string()]));
        assert_eq!(template.formulas[0].fill.as_deref(), Some("#ff0000"));
        assert_eq!(template.formulas[1].attributes, Some(vec!["mmB".to_string()]));

        assert!(config.bindings[0].custom);
        assert_eq!(config.bindings[1].variable, None);
        let request = config.request("7", TemplateKind::Fabrication);
        assert_eq!(request.context, "7");
        assert_eq!(request.all_selections().len(), 3);
    }

    #[test]
    fn test_load_templates_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("door.svg"), "<svg/>").unwrap();
        let path = dir.path().join("product.toml");
        std::fs::write(&path, PRODUCT).unwrap();

        let config = ProductConfig::from_file(&path).expect("Should load");
        let templates = config.load_templates().expect("Should read templates");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].source, "<svg/>");
        assert_eq!(templates[0].filename(), "Door.svg");
    }

    #[test]
    fn test_missing_template_file() {
        let config = ProductConfig::from_str(PRODUCT).unwrap();
        assert!(matches!(
            config.load_templates(),
            Err(ConfigError::TemplateFile { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_error() {
        let result = ProductConfig::from_str("this is not valid toml {{{{");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
