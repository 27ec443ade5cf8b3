//! Template registry holding templates and their formula declarations

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::DocumentError;
use crate::template::extractor::{find_declarations, ExtractionReport, SkippedDeclaration};
use crate::template::{FormulaDeclaration, Template};

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template not found in registry
    #[error("template not found: {id}")]
    NotFound { id: String },

    /// Duplicate template registration
    #[error("duplicate template: {id}")]
    Duplicate { id: String },

    /// The template document cannot be parsed
    #[error("template {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: DocumentError,
    },
}

#[derive(Debug)]
struct TemplateEntry {
    template: Template,
    /// Guarded separately so insert-if-absent is atomic per template
    declarations: Mutex<Vec<FormulaDeclaration>>,
}

impl TemplateEntry {
    fn declarations(&self) -> MutexGuard<'_, Vec<FormulaDeclaration>> {
        self.declarations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry for templates and the declarations discovered in them
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, TemplateEntry>,
    /// Registration order, for deterministic iteration
    order: Vec<String>,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template without extracting it
    pub fn register(&mut self, template: Template) -> Result<(), TemplateError> {
        if self.templates.contains_key(&template.id) {
            return Err(TemplateError::Duplicate { id: template.id });
        }
        self.order.push(template.id.clone());
        self.templates.insert(
            template.id.clone(),
            TemplateEntry {
                template,
                declarations: Mutex::new(Vec::new()),
            },
        );
        Ok(())
    }

    /// Register a template and run extraction on it.
    ///
    /// A template whose document does not parse is not registered.
    pub fn register_and_extract(
        &mut self,
        template: Template,
        config: &EngineConfig,
    ) -> Result<ExtractionReport, TemplateError> {
        Document::parse(&template.source).map_err(|source| TemplateError::Malformed {
            id: template.id.clone(),
            source,
        })?;
        let id = template.id.clone();
        self.register(template)?;
        self.extract(&id, config)
    }

    /// Get a template by id
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id).map(|e| &e.template)
    }

    /// Check if a template exists
    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates in registration order
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.order.iter().filter_map(|id| self.get(id))
    }

    /// Snapshot of a template's declarations
    pub fn declarations(&self, id: &str) -> Result<Vec<FormulaDeclaration>, TemplateError> {
        Ok(self.entry(id)?.declarations().clone())
    }

    /// Add a declaration unless one with the same key exists.
    ///
    /// Returns whether it was inserted.
    pub fn insert_if_absent(&self, declaration: FormulaDeclaration) -> Result<bool, TemplateError> {
        let entry = self.entry(&declaration.template)?;
        let mut declarations = entry.declarations();
        if declarations.iter().any(|d| d.same_key(&declaration)) {
            return Ok(false);
        }
        declarations.push(declaration);
        Ok(true)
    }

    /// Parse a template and register every declaration it carries.
    ///
    /// Repeated runs on an unchanged template add nothing. Takes `&self`, so
    /// distinct templates can be extracted from several threads at once.
    pub fn extract(&self, id: &str, config: &EngineConfig) -> Result<ExtractionReport, TemplateError> {
        let entry = self.entry(id)?;
        let doc = Document::parse(&entry.template.source).map_err(|source| TemplateError::Malformed {
            id: id.to_string(),
            source,
        })?;

        let mut report = find_declarations(&doc, id, config);

        // Hold the lock across the whole pass so concurrent extractions of
        // the same template cannot interleave their checks.
        let mut declarations = entry.declarations();
        for declaration in &report.declarations {
            if declarations.iter().any(|d| d.same_key(declaration)) {
                debug!(template = id, formula = %declaration.name, node = %declaration.node_id, "already declared");
                report.skipped.push(SkippedDeclaration::Duplicate {
                    name: declaration.name.clone(),
                    node_id: declaration.node_id.clone(),
                });
            } else {
                declarations.push(declaration.clone());
                report.added += 1;
            }
        }

        info!(
            template = id,
            found = report.declarations.len(),
            added = report.added,
            skipped = report.skipped.len(),
            "extracted formula declarations"
        );
        Ok(report)
    }

    /// Replace a template's document and re-extract it.
    ///
    /// Existing declarations are kept; only new ones are added. A document
    /// that does not parse is rejected and the old one stays.
    pub fn update_source(
        &mut self,
        id: &str,
        source: impl Into<String>,
        config: &EngineConfig,
    ) -> Result<ExtractionReport, TemplateError> {
        let source = source.into();
        Document::parse(&source).map_err(|source| TemplateError::Malformed {
            id: id.to_string(),
            source,
        })?;

        let entry = self
            .templates
            .get_mut(id)
            .ok_or_else(|| TemplateError::NotFound { id: id.to_string() })?;
        entry.template.source = source;
        self.extract(id, config)
    }

    /// Remove a template together with all of its declarations
    pub fn remove(&mut self, id: &str) -> Option<Template> {
        let entry = self.templates.remove(id)?;
        self.order.retain(|o| o != id);
        let dropped = entry.declarations().len();
        debug!(template = id, declarations = dropped, "removed template");
        Some(entry.template)
    }

    fn entry(&self, id: &str) -> Result<&TemplateEntry, TemplateError> {
        self.templates
            .get(id)
            .ok_or_else(|| TemplateError::NotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::ResolvedStyle;
    use crate::template::TemplateKind;

    const SOURCE: &str = r#"<svg><text id="n1" class="formula">{{mmA}}</text></svg>"#;

    fn template(id: &str, source: &str) -> Template {
        Template::new(id, id, TemplateKind::Fabrication, source)
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("t1", SOURCE)).expect("Should register");
        assert!(registry.contains("t1"));
        assert!(registry.get("t1").is_some());
        assert!(registry.declarations("t1").unwrap().is_empty());
    }

    #[test]
    fn test_registry_duplicate_error() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(template("t1", SOURCE))
            .expect("First register should succeed");
        let result = registry.register(template("t1", SOURCE));
        assert!(matches!(result, Err(TemplateError::Duplicate { .. })));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let mut registry = TemplateRegistry::new();
        let config = EngineConfig::default();
        let first = registry
            .register_and_extract(template("t1", SOURCE), &config)
            .unwrap();
        assert_eq!(first.added, 1);

        let second = registry.extract("t1", &config).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped.len(), 1);
        assert_eq!(registry.declarations("t1").unwrap().len(), 1);
    }

    #[test]
    fn test_insert_if_absent() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("t1", SOURCE)).unwrap();
        let decl = FormulaDeclaration {
            name: "mmA".to_string(),
            node_id: "n1".to_string(),
            template: "t1".to_string(),
            style: ResolvedStyle::default(),
        };
        assert!(registry.insert_if_absent(decl.clone()).unwrap());
        assert!(!registry.insert_if_absent(decl.clone()).unwrap());

        let other = FormulaDeclaration {
            template: "missing".to_string(),
            ..decl
        };
        assert!(matches!(
            registry.insert_if_absent(other),
            Err(TemplateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_template_is_fatal() {
        let mut registry = TemplateRegistry::new();
        let result = registry.register_and_extract(template("t1", "<svg><g></svg>"), &EngineConfig::default());
        assert!(matches!(result, Err(TemplateError::Malformed { .. })));
        assert!(!registry.contains("t1"));
    }

    #[test]
    fn test_update_source_adds_new_declarations() {
        let mut registry = TemplateRegistry::new();
        let config = EngineConfig::default();
        registry
            .register_and_extract(template("t1", SOURCE), &config)
            .unwrap();

        let edited = r#"<svg><text id="n1" class="formula">{{mmA}}</text><text id="n2" class="formula">{{mmB}}</text></svg>"#;
        let report = registry.update_source("t1", edited, &config).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(registry.declarations("t1").unwrap().len(), 2);
    }

    #[test]
    fn test_update_source_rejects_malformed_document() {
        let mut registry = TemplateRegistry::new();
        let config = EngineConfig::default();
        registry.register(template("t1", SOURCE)).unwrap();
        let result = registry.update_source("t1", "<svg>", &config);
        assert!(matches!(result, Err(TemplateError::Malformed { .. })));
        assert_eq!(registry.get("t1").unwrap().source, SOURCE);
    }

    #[test]
    fn test_remove_cascades() {
        let mut registry = TemplateRegistry::new();
        let config = EngineConfig::default();
        registry
            .register_and_extract(template("t1", SOURCE), &config)
            .unwrap();
        assert!(registry.remove("t1").is_some());
        assert!(matches!(
            registry.declarations("t1"),
            Err(TemplateError::NotFound { .. })
        ));
        assert!(registry.remove("t1").is_none());
    }

    #[test]
    fn test_concurrent_extraction_does_not_duplicate() {
        let mut registry = TemplateRegistry::new();
        let config = EngineConfig::default();
        registry.register(template("t1", SOURCE)).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| registry.extract("t1", &config).unwrap());
            }
        });
        assert_eq!(registry.declarations("t1").unwrap().len(), 1);
    }
}
