//! Blueprint Formula CLI
//!
//! Usage:
//!   blueprint-formula extract <FILE> [--config <PRODUCT>]
//!   blueprint-formula eval <EXPRESSION> [--var NAME=VALUE]...
//!   blueprint-formula generate <PRODUCT> --context <ID> [--kind <KIND>] [--out <DIR>]
//!   blueprint-formula price <FORMULA> [--custom-value N] [--price-so-far N] [--price-extra N]
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blueprint_formula::expr::{evaluate_with_limits, Value, Variables};
use blueprint_formula::pricing::{price_increment, PricingError};
use blueprint_formula::store::DirectoryStore;
use blueprint_formula::template::find_declarations;
use blueprint_formula::{Document, Engine, EngineConfig, Generation, ProductConfig, TemplateKind};

#[derive(Parser)]
#[command(name = "blueprint-formula")]
#[command(about = "Formula-driven vector templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the formula placeholders in a template document
    Extract {
        /// Template document
        file: PathBuf,

        /// Product file whose engine settings to use
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Evaluate one expression
    Eval {
        expression: String,

        /// Variable binding, e.g. --var mmA=1500
        #[arg(short, long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },

    /// Generate documents for every applicable template of a product
    Generate {
        /// Product file (TOML format)
        product: PathBuf,

        /// Owning context of the artifacts, e.g. an order line
        #[arg(long)]
        context: String,

        #[arg(short, long, value_enum, default_value_t = TemplateKind::Fabrication)]
        kind: TemplateKind,

        /// Directory to store artifacts in; without it only a summary is printed
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compute the price increment of an attribute value
    Price {
        formula: Option<String>,

        #[arg(long, default_value_t = 0.0)]
        custom_value: f64,

        #[arg(long, default_value_t = 0.0)]
        price_so_far: f64,

        #[arg(long, default_value_t = 0.0)]
        price_extra: f64,
    },
}

fn parse_var(s: &str) -> Result<(String, Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let value = match value.trim().parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(value.to_string()),
    };
    Ok((name.trim().to_string(), value))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "blueprint_formula=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Extract { file, config } => extract(&file, config.as_deref()),
        Command::Eval { expression, vars } => eval(&expression, vars),
        Command::Generate {
            product,
            context,
            kind,
            out,
        } => generate(&product, &context, kind, out.as_deref()),
        Command::Price {
            formula,
            custom_value,
            price_so_far,
            price_extra,
        } => price(formula.as_deref(), price_extra, custom_value, price_so_far),
    };

    match result {
        Ok(code) => code,
        Err(message) => {
            eprint!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn extract(file: &Path, config: Option<&Path>) -> Result<ExitCode, String> {
    let engine = match config {
        Some(path) => load_product(path)?.engine,
        None => EngineConfig::default(),
    };
    let source = fs::read_to_string(file)
        .map_err(|e| format!("Error reading file '{}': {}\n", file.display(), e))?;
    let doc = Document::parse(&source)
        .map_err(|e| format!("Error parsing '{}': {}\n", file.display(), e))?;

    let name = file.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let report = find_declarations(&doc, &name, &engine);
    for declaration in &report.declarations {
        println!(
            "{}\t{}\tfill={} font-size={} font-family={}",
            declaration.node_id,
            declaration.name,
            declaration.style.fill,
            declaration.style.font_size,
            declaration.style.font_family
        );
    }
    for skipped in &report.skipped {
        eprintln!("skipped: {}", skipped);
    }
    Ok(ExitCode::SUCCESS)
}

fn eval(expression: &str, vars: Vec<(String, Value)>) -> Result<ExitCode, String> {
    let variables: Variables = vars.into_iter().collect();
    match evaluate_with_limits(expression, &variables, EngineConfig::default().parse_limits()) {
        Ok(value) => {
            println!("{}", value);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e.format(expression, "<expression>")),
    }
}

fn generate(
    product: &Path,
    context: &str,
    kind: TemplateKind,
    out: Option<&Path>,
) -> Result<ExitCode, String> {
    let config = load_product(product)?;
    let templates = config
        .load_templates()
        .map_err(|e| format!("Error loading templates: {}\n", e))?;

    let mut engine = Engine::with_config(config.engine.clone());
    for template in templates {
        let id = template.id.clone();
        let report = engine
            .add_template(template)
            .map_err(|e| format!("Error in template '{}': {}\n", id, e))?;
        for skipped in &report.skipped {
            eprintln!("{}: skipped: {}", id, skipped);
        }
    }

    let request = config.request(context, kind);
    let generation = match out {
        Some(dir) => engine
            .generate_and_store(&request, &DirectoryStore::new(dir))
            .map_err(|e| format!("Error: {}\n", e))?,
        None => engine.generate(&request),
    };
    print_generation(&generation);

    if generation.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_generation(generation: &Generation) {
    for artifact in &generation.artifacts {
        let location = artifact
            .location
            .as_ref()
            .map(|l| l.document.clone())
            .unwrap_or_else(|| artifact.name.clone());
        println!(
            "{}\t{}\tsubstituted={} failed={}",
            artifact.template,
            location,
            artifact.report.substituted(),
            artifact.report.failed()
        );
    }
    for skipped in &generation.skipped {
        println!("{}\tskipped ({:?})", skipped.template, skipped.reason);
    }
    for failure in &generation.failures {
        eprintln!("{}\tfailed at {:?}: {}", failure.template, failure.stage, failure.error);
    }
}

fn price(
    formula: Option<&str>,
    price_extra: f64,
    custom_value: f64,
    price_so_far: f64,
) -> Result<ExitCode, String> {
    match price_increment(formula, price_extra, custom_value, price_so_far) {
        Ok(increment) => {
            println!("{}", increment);
            Ok(ExitCode::SUCCESS)
        }
        Err(PricingError::Evaluation { formula, source }) => Err(source.format(&formula, "<formula>")),
        Err(e) => Err(format!("Error: {}\n", e)),
    }
}

fn load_product(path: &Path) -> Result<ProductConfig, String> {
    ProductConfig::from_file(path)
        .map_err(|e| format!("Error loading product '{}': {}\n", path.display(), e))
}
