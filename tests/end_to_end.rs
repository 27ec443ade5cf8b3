//! End-to-end generation through the engine

use blueprint_formula::mutator::NodeOutcome;
use blueprint_formula::store::{DirectoryStore, MemoryStore, StoreError};
use blueprint_formula::template::{AttributeFilter, Formula};
use blueprint_formula::variables::{AttributeBinding, AttributeSelection};
use blueprint_formula::{
    Document, Engine, EngineConfig, EngineError, ExprError, GenerationRequest, RasterError, SkipReason,
    Template, TemplateKind,
};
use pretty_assertions::assert_eq;

const DOOR: &str = r#"<svg><text id="n1" class="formula" style="fill:#000000;font-size:4mm">{{mmA}}</text></svg>"#;

fn echo(svg: &[u8]) -> Result<Vec<u8>, RasterError> {
    Ok(svg.to_vec())
}

fn engine_with(expression: &str) -> Engine {
    let mut engine = Engine::new(EngineConfig::default(), echo);
    engine
        .add_template(
            Template::new("door", "Door", TemplateKind::Fabrication, DOOR)
                .with_formula(Formula::new("mmA", expression)),
        )
        .expect("Should register");
    engine
}

fn width(value: &str) -> AttributeBinding {
    AttributeBinding::custom("Width", value, "mmA")
}

#[test]
fn test_substitutes_evaluated_value() {
    let engine = engine_with("mmA * 2");
    let request = GenerationRequest::new("7", TemplateKind::Fabrication).with_binding(width("5"));
    let generation = engine.generate(&request);

    assert!(generation.failures.is_empty());
    let artifact = &generation.artifacts[0];
    assert_eq!(artifact.report.substituted(), 1);
    insta::assert_snapshot!(&artifact.svg, @r###"<svg><style>.formula-eval-error {font-style: italic; text-decoration: underline;}</style><text id="n1" x="0" y="0" style="fill:#000000;font-size:4mm" font-family="Arial">10</text></svg>"###);
}

#[test]
fn test_failing_formula_leaves_marker() {
    let engine = engine_with("mmA / 0");
    let request = GenerationRequest::new("7", TemplateKind::Fabrication).with_binding(width("5"));
    let generation = engine.generate(&request);

    let artifact = &generation.artifacts[0];
    assert_eq!(
        artifact.report.outcome("n1"),
        Some(&NodeOutcome::Failed {
            error: ExprError::DivisionByZero
        })
    );

    let doc = Document::parse(&artifact.svg).expect("Output should parse");
    let root = doc.root();
    let children = doc.children(root);
    assert_eq!(children.len(), 3);
    assert_eq!(doc.element(children[0]).map(|e| e.name.as_str()), Some("style"));

    let node = children[1];
    assert_eq!(doc.attr(node, "id"), Some("n1"));
    assert_eq!(doc.attr(node, "class"), Some("formula formula-eval-error"));
    assert_eq!(doc.own_text(node), "{{mmA}}");

    let marker = children[2];
    assert_eq!(doc.own_text(marker), "!");
    assert_eq!(doc.attr(marker, "x"), Some("10"));
    assert_eq!(doc.attr(marker, "y"), Some("0"));
    assert_eq!(doc.attr(marker, "fill"), Some("red"));
    assert_eq!(doc.attr(marker, "font-size"), Some("10px"));
    assert_eq!(doc.attr(marker, "font-weight"), Some("bold"));
}

#[test]
fn test_filter_skips_template() {
    let mut engine = Engine::new(EngineConfig::default(), echo);
    engine
        .add_template(
            Template::new("door", "Door", TemplateKind::Fabrication, DOOR)
                .with_filter(AttributeFilter::new("Color", ["Red"]))
                .with_formula(Formula::new("mmA", "mmA * 2")),
        )
        .unwrap();

    let request = GenerationRequest::new("7", TemplateKind::Fabrication)
        .with_binding(width("5"))
        .with_selection(AttributeSelection::new("Color", "Blue"));
    let generation = engine.generate(&request);

    assert!(generation.artifacts.is_empty());
    assert!(generation.failures.is_empty());
    assert_eq!(generation.skipped.len(), 1);
    assert_eq!(generation.skipped[0].reason, SkipReason::NotApplicable);
}

#[test]
fn test_non_numeric_value_is_dropped() {
    let engine = engine_with("mmA * 2");
    let request = GenerationRequest::new("7", TemplateKind::Fabrication).with_binding(width("N/A"));
    let generation = engine.generate(&request);

    assert!(generation.failures.is_empty());
    let report = &generation.artifacts[0].report;
    assert!(matches!(
        report.outcome("n1"),
        Some(NodeOutcome::Failed {
            error: ExprError::UndefinedName { .. }
        })
    ));
    assert!(generation.artifacts[0].svg.contains("formula-eval-error"));
}

#[test]
fn test_custom_value_wins_over_standard() {
    let engine = engine_with("mmA");
    let request = GenerationRequest::new("7", TemplateKind::Fabrication)
        .with_binding(AttributeBinding::standard("Width", "900", "mmA"))
        .with_binding(width("1200"));
    let generation = engine.generate(&request);
    assert!(generation.artifacts[0].svg.contains(">1200</text>"));
}

#[test]
fn test_regeneration_supersedes_stored_artifacts() {
    let engine = engine_with("mmA * 2");
    let store = MemoryStore::new();

    let first = GenerationRequest::new("7", TemplateKind::Fabrication).with_binding(width("5"));
    engine.generate_and_store(&first, &store).unwrap();
    let second = GenerationRequest::new("7", TemplateKind::Fabrication).with_binding(width("6"));
    let generation = engine.generate_and_store(&second, &store).unwrap();

    assert_eq!(
        store.file_names(),
        vec![
            "blueprint_door_line_7_evaluated.png".to_string(),
            "blueprint_door_line_7_evaluated.svg".to_string(),
        ]
    );
    let svg = store.get("blueprint_door_line_7_evaluated.svg").unwrap();
    assert!(String::from_utf8(svg).unwrap().contains(">12</text>"));

    let location = generation.artifacts[0].location.as_ref().unwrap();
    assert_eq!(location.document, "blueprint_door_line_7_evaluated.svg");
}

#[test]
fn test_context_cannot_escape_store_directory() {
    let engine = engine_with("mmA");
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::new(dir.path().join("out"));

    let request = GenerationRequest::new("../x", TemplateKind::Fabrication).with_binding(width("5"));
    let result = engine.generate_and_store(&request, &store);
    assert!(matches!(
        result,
        Err(EngineError::Store(StoreError::InvalidId { .. }))
    ));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_regeneration_keeps_other_contexts() {
    let engine = engine_with("mmA");
    let store = MemoryStore::new();
    let request = |context: &str| {
        GenerationRequest::new(context, TemplateKind::Fabrication).with_binding(width("5"))
    };
    engine.generate_and_store(&request("17"), &store).unwrap();
    engine.generate_and_store(&request("7"), &store).unwrap();
    engine.generate_and_store(&request("7"), &store).unwrap();
    assert_eq!(store.file_names().len(), 4);
}

#[test]
fn test_one_failing_template_does_not_stop_others() {
    let rasterizer = |svg: &[u8]| -> Result<Vec<u8>, RasterError> {
        if String::from_utf8_lossy(svg).contains("broken") {
            Err(RasterError::Parse("broken".to_string()))
        } else {
            Ok(Vec::new())
        }
    };
    let mut engine = Engine::new(EngineConfig::default(), rasterizer);
    engine
        .add_template(Template::new("a", "A", TemplateKind::Fabrication, r#"<svg id="broken"/>"#))
        .unwrap();
    engine
        .add_template(Template::new("b", "B", TemplateKind::Fabrication, "<svg/>"))
        .unwrap();

    let generation = engine.generate(&GenerationRequest::new("1", TemplateKind::Fabrication));
    assert_eq!(generation.artifacts.len(), 1);
    assert_eq!(generation.artifacts[0].template, "b");
    assert_eq!(generation.failures.len(), 1);
    assert_eq!(generation.failures[0].template, "a");
}

#[test]
fn test_product_file_drives_generation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("door.svg"), DOOR).unwrap();
    let product = r#"
[[templates]]
id = "door"
name = "Door"
kind = "fabrication"
file = "door.svg"

[[templates.formulas]]
name = "mmA"
expression = "mmA + 100"

[[bindings]]
attribute = "Width"
value = "900"
variable = "mmA"
"#;
    let path = dir.path().join("product.toml");
    std::fs::write(&path, product).unwrap();

    let config = blueprint_formula::ProductConfig::from_file(&path).unwrap();
    let mut engine = Engine::new(config.engine.clone(), echo);
    for template in config.load_templates().unwrap() {
        engine.add_template(template).unwrap();
    }

    let generation = engine.generate(&config.request("3", TemplateKind::Fabrication));
    assert_eq!(generation.artifacts[0].name, "blueprint_door_line_3_evaluated");
    assert!(generation.artifacts[0].svg.contains(">1000</text>"));
}
