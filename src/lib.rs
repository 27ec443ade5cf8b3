//! Blueprint Formula - formula-driven vector templates
//!
//! Templates are vector documents whose placeholder nodes carry a marker
//! class. Each placeholder names a formula; the engine evaluates the formula
//! in a small arithmetic sandbox against variables taken from a product
//! configuration, writes the result into a copy of the document and
//! rasterizes it.
//!
//! # Example
//!
//! ```rust
//! use blueprint_formula::{Engine, EngineConfig, GenerationRequest, RasterError};
//! use blueprint_formula::template::{Formula, Template, TemplateKind};
//! use blueprint_formula::variables::AttributeBinding;
//!
//! let rasterizer = |svg: &[u8]| -> Result<Vec<u8>, RasterError> { Ok(svg.to_vec()) };
//! let mut engine = Engine::new(EngineConfig::default(), rasterizer);
//!
//! let template = Template::new(
//!     "door",
//!     "Door",
//!     TemplateKind::Fabrication,
//!     r#"<svg><text id="n1" class="formula">{{mmA}}</text></svg>"#,
//! )
//! .with_formula(Formula::new("mmA", "mmA * 2"));
//! engine.add_template(template).unwrap();
//!
//! let request = GenerationRequest::new("line-1", TemplateKind::Fabrication)
//!     .with_binding(AttributeBinding::custom("Width", "5", "mmA"));
//! let generation = engine.generate(&request);
//! assert!(generation.artifacts[0].svg.contains(">10</text>"));
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod expr;
pub mod mutator;
pub mod pricing;
pub mod raster;
pub mod store;
pub mod style;
pub mod template;
pub mod variables;

pub use config::{ConfigError, EngineConfig, ProductConfig};
pub use document::Document;
pub use error::{DocumentError, ExprError};
pub use expr::{evaluate, Value, Variables};
pub use mutator::{MutationReport, Mutator, Stage};
pub use raster::{RasterError, Rasterizer};
pub use store::{ArtifactRef, ArtifactStore, StoreError};
pub use style::{resolve_style, ResolvedStyle};
pub use template::{ExtractionReport, Template, TemplateError, TemplateKind, TemplateRegistry};

use base64::Engine as _;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use variables::{AttributeBinding, AttributeSelection};

/// Errors that can occur during generation
#[derive(Debug, Error)]
pub enum EngineError {
    /// The template document cannot be read or written
    #[error("template {template}: {source}")]
    MalformedDocument {
        template: String,
        #[source]
        source: DocumentError,
    },

    /// The mutated document could not be rasterized.
    ///
    /// `document` holds the serialized mutated document, which is still usable.
    #[error("template {template}: rasterization failed: {source}")]
    Rasterization {
        template: String,
        document: String,
        #[source]
        source: RasterError,
    },

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// One generation run for one owning context
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Owning context the artifacts belong to, e.g. an order line
    pub context: String,
    pub kind: TemplateKind,
    pub bindings: Vec<AttributeBinding>,
    pub selections: Vec<AttributeSelection>,
}

impl GenerationRequest {
    pub fn new(context: impl Into<String>, kind: TemplateKind) -> Self {
        Self {
            context: context.into(),
            kind,
            bindings: Vec::new(),
            selections: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: AttributeBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_bindings(mut self, bindings: impl IntoIterator<Item = AttributeBinding>) -> Self {
        self.bindings.extend(bindings);
        self
    }

    pub fn with_selection(mut self, selection: AttributeSelection) -> Self {
        self.selections.push(selection);
        self
    }

    pub fn with_selections(mut self, selections: impl IntoIterator<Item = AttributeSelection>) -> Self {
        self.selections.extend(selections);
        self
    }

    /// Everything selected for the applicability gate: explicit selections
    /// plus the value of every binding
    pub fn all_selections(&self) -> Vec<AttributeSelection> {
        self.selections
            .iter()
            .cloned()
            .chain(self.bindings.iter().map(AttributeBinding::selection))
            .collect()
    }
}

/// A generated document and its raster image
#[derive(Debug, Clone)]
pub struct Artifact {
    pub template: String,
    /// Base file name, without extension
    pub name: String,
    pub svg: String,
    pub raster: Vec<u8>,
    pub report: MutationReport,
    /// Set once the artifact has been stored
    pub location: Option<ArtifactRef>,
}

impl Artifact {
    /// The raster image as base64, for embedding in reports
    pub fn raster_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.raster)
    }
}

/// Why a template produced no artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Template is for another kind of document
    OtherKind,
    /// Attribute filter rejected the selections
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTemplate {
    pub template: String,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub struct TemplateFailure {
    pub template: String,
    /// Stage the template was in when it failed
    pub stage: Stage,
    pub error: EngineError,
}

/// Everything one generation run produced, in template order
#[derive(Debug, Default)]
pub struct Generation {
    pub artifacts: Vec<Artifact>,
    pub skipped: Vec<SkippedTemplate>,
    pub failures: Vec<TemplateFailure>,
}

impl Generation {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

enum Outcome {
    Generated(Artifact),
    Skipped(SkippedTemplate),
    Failed(TemplateFailure),
}

/// Templates, configuration and the rasterizer, wired together
pub struct Engine {
    config: EngineConfig,
    registry: TemplateRegistry,
    rasterizer: Box<dyn Rasterizer>,
}

impl Engine {
    pub fn new(config: EngineConfig, rasterizer: impl Rasterizer + 'static) -> Self {
        Self {
            config,
            registry: TemplateRegistry::new(),
            rasterizer: Box::new(rasterizer),
        }
    }

    /// Engine with the built-in PNG rasterizer when the `raster` feature is on
    pub fn with_config(config: EngineConfig) -> Self {
        #[cfg(feature = "raster")]
        let rasterizer = raster::PngRasterizer::new();
        #[cfg(not(feature = "raster"))]
        let rasterizer = raster::Unavailable;
        Self::new(config, rasterizer)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Register a template and extract its declarations
    pub fn add_template(&mut self, template: Template) -> Result<ExtractionReport, TemplateError> {
        self.registry.register_and_extract(template, &self.config)
    }

    /// Replace a template's document and re-extract it
    pub fn update_template(
        &mut self,
        id: &str,
        source: impl Into<String>,
    ) -> Result<ExtractionReport, TemplateError> {
        self.registry.update_source(id, source, &self.config)
    }

    /// Remove a template and its declarations
    pub fn remove_template(&mut self, id: &str) -> Option<Template> {
        self.registry.remove(id)
    }

    /// Re-run extraction on every template in parallel
    pub fn extract_all(&self) -> Vec<Result<ExtractionReport, TemplateError>> {
        let ids: Vec<&str> = self.registry.templates().map(|t| t.id.as_str()).collect();
        ids.par_iter()
            .map(|id| self.registry.extract(id, &self.config))
            .collect()
    }

    /// Generate artifacts for every template of the requested kind that
    /// applies to the request's selections.
    ///
    /// Templates are processed in parallel. A template that fails does not
    /// affect the others; its failure is reported in the result.
    pub fn generate(&self, request: &GenerationRequest) -> Generation {
        let selections = request.all_selections();
        let templates: Vec<&Template> = self.registry.templates().collect();

        let outcomes: Vec<Outcome> = templates
            .par_iter()
            .map(|template| self.generate_one(template, request, &selections))
            .collect();

        let mut generation = Generation::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Generated(artifact) => generation.artifacts.push(artifact),
                Outcome::Skipped(skipped) => generation.skipped.push(skipped),
                Outcome::Failed(failure) => generation.failures.push(failure),
            }
        }

        info!(
            context = %request.context,
            kind = %request.kind,
            artifacts = generation.artifacts.len(),
            skipped = generation.skipped.len(),
            failed = generation.failures.len(),
            "generation finished"
        );
        generation
    }

    /// Generate and store artifacts, replacing everything stored before for
    /// the request's context
    pub fn generate_and_store(
        &self,
        request: &GenerationRequest,
        store: &dyn ArtifactStore,
    ) -> Result<Generation, EngineError> {
        let removed = store.remove_context(&request.context)?;
        if removed > 0 {
            info!(context = %request.context, removed, "removed superseded artifacts");
        }

        let mut generation = self.generate(request);
        for artifact in &mut generation.artifacts {
            let stored = store.store(
                &request.context,
                &artifact.name,
                artifact.svg.as_bytes(),
                &artifact.raster,
            )?;
            artifact.location = Some(stored);
        }
        Ok(generation)
    }

    fn generate_one(
        &self,
        template: &Template,
        request: &GenerationRequest,
        selections: &[AttributeSelection],
    ) -> Outcome {
        let skip = |reason: SkipReason| {
            Outcome::Skipped(SkippedTemplate {
                template: template.id.clone(),
                reason,
            })
        };
        if template.kind != request.kind {
            return skip(SkipReason::OtherKind);
        }
        if !template.applies_to(selections) {
            info!(template = %template.id, "attribute filter does not match, skipping");
            return skip(SkipReason::NotApplicable);
        }

        let fail = |stage: Stage, error: EngineError| {
            warn!(template = %template.id, ?stage, %error, "template failed");
            Outcome::Failed(TemplateFailure {
                template: template.id.clone(),
                stage,
                error,
            })
        };

        let declarations = match self.registry.declarations(&template.id) {
            Ok(declarations) => declarations,
            Err(e) => return fail(Stage::Extracted, e.into()),
        };
        let variables = variables::resolve(&request.bindings, &template.referenced_names());

        let mutated = match Mutator::new(&self.config).run(template, &declarations, &variables) {
            Ok(mutated) => mutated,
            Err(source) => {
                let stage = match source {
                    DocumentError::Write(_) => Stage::Serialized,
                    _ => Stage::Parsed,
                };
                let error = EngineError::MalformedDocument {
                    template: template.id.clone(),
                    source,
                };
                return fail(stage, error);
            }
        };

        let raster = match self.rasterizer.rasterize(mutated.svg.as_bytes()) {
            Ok(raster) => raster,
            Err(source) => {
                let error = EngineError::Rasterization {
                    template: template.id.clone(),
                    document: mutated.svg,
                    source,
                };
                return fail(Stage::Serialized, error);
            }
        };

        Outcome::Generated(Artifact {
            template: template.id.clone(),
            name: store::artifact_name(&template.id, &request.context),
            svg: mutated.svg,
            raster,
            report: mutated.report,
            location: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{AttributeFilter, Formula};

    fn echo(svg: &[u8]) -> Result<Vec<u8>, RasterError> {
        Ok(svg.to_vec())
    }

    fn engine() -> Engine {
        let mut engine = Engine::new(EngineConfig::default(), echo);
        engine
            .add_template(
                Template::new(
                    "door",
                    "Door",
                    TemplateKind::Fabrication,
                    r#"<svg><text id="n1" class="formula">{{mmA}}</text></svg>"#,
                )
                .with_formula(Formula::new("mmA", "mmA + 1")),
            )
            .unwrap();
        engine
            .add_template(
                Template::new(
                    "order",
                    "Order",
                    TemplateKind::Procurement,
                    r#"<svg><text id="n1" class="formula">{{mmA}}</text></svg>"#,
                )
                .with_formula(Formula::new("mmA", "mmA")),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_generate_selects_kind() {
        let engine = engine();
        let request = GenerationRequest::new("7", TemplateKind::Fabrication)
            .with_binding(variables::AttributeBinding::custom("Width", "41", "mmA"));
        let generation = engine.generate(&request);

        assert_eq!(generation.artifacts.len(), 1);
        let artifact = &generation.artifacts[0];
        assert_eq!(artifact.template, "door");
        assert_eq!(artifact.name, "blueprint_door_line_7_evaluated");
        assert!(artifact.svg.contains(">42</text>"));
        assert_eq!(artifact.raster, artifact.svg.as_bytes());
        assert_eq!(
            generation.skipped,
            vec![SkippedTemplate {
                template: "order".to_string(),
                reason: SkipReason::OtherKind,
            }]
        );
    }

    #[test]
    fn test_raster_failure_keeps_document() {
        let failing = |_: &[u8]| -> Result<Vec<u8>, RasterError> {
            Err(RasterError::Encode("boom".to_string()))
        };
        let mut engine = Engine::new(EngineConfig::default(), failing);
        engine
            .add_template(Template::new("t", "T", TemplateKind::Fabrication, "<svg/>"))
            .unwrap();

        let generation = engine.generate(&GenerationRequest::new("1", TemplateKind::Fabrication));
        assert!(generation.is_empty());
        let failure = &generation.failures[0];
        assert_eq!(failure.stage, Stage::Serialized);
        assert!(matches!(
            &failure.error,
            EngineError::Rasterization { document, .. } if document.contains("<svg")
        ));
    }

    #[test]
    fn test_filter_gate() {
        let mut engine = Engine::new(EngineConfig::default(), echo);
        engine
            .add_template(
                Template::new("t", "T", TemplateKind::Fabrication, "<svg/>")
                    .with_filter(AttributeFilter::new("Color", ["Red"])),
            )
            .unwrap();

        let blue = GenerationRequest::new("1", TemplateKind::Fabrication)
            .with_selection(AttributeSelection::new("Color", "Blue"));
        assert_eq!(engine.generate(&blue).skipped[0].reason, SkipReason::NotApplicable);

        let red = GenerationRequest::new("1", TemplateKind::Fabrication)
            .with_binding(AttributeBinding::categorical("Color", "Red"));
        assert_eq!(engine.generate(&red).artifacts.len(), 1);
    }

    #[test]
    fn test_raster_base64() {
        let artifact = Artifact {
            template: "t".to_string(),
            name: "n".to_string(),
            svg: String::new(),
            raster: b"png".to_vec(),
            report: MutationReport::default(),
            location: None,
        };
        assert_eq!(artifact.raster_base64(), "cG5n");
    }

    #[test]
    fn test_extract_all() {
        let engine = engine();
        let reports = engine.extract_all();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.as_ref().map(|r| r.added == 0).unwrap_or(false)));
        assert_eq!(engine.registry().declarations("door").unwrap().len(), 1);
    }
}
