//! x3ml CLI: apply an X3ML mapping to an XML document and write RDF.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use x3ml::config::EngineConfig;
use x3ml::engine::Engine;
use x3ml::error::LoadError;
use x3ml::generator::GeneratorPolicy;
use x3ml::generator::policy_loader::load_policy_file;
use x3ml::graph::OutputFormat;
use x3ml::model::loader::load_mapping_file;
use x3ml::terminology::SkosTerminology;

#[derive(Parser)]
#[command(name = "x3ml", version, about = "X3ML mapping engine: XML to RDF")]
struct Cli {
    /// XML source document.
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// X3ML mapping document.
    #[arg(long, short = 'x')]
    x3ml: PathBuf,

    /// Generator policy document (only built-in generators without one).
    #[arg(long, short = 'p')]
    policy: Option<PathBuf>,

    /// SKOS vocabulary for broader/exact_match conditions (.ttl, .nt, .rdf).
    #[arg(long, short = 't')]
    terminology: Option<PathBuf>,

    /// Output file (stdout when omitted).
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Output format; overrides the config file.
    #[arg(long, short = 'f', value_enum)]
    format: Option<OutputFormat>,

    /// Deterministic UUIDs of this width (uuid:AA, uuid:AB, ...), for tests.
    #[arg(long)]
    uuid_test_size: Option<usize>,

    /// Write the XPath/value association table as JSON.
    #[arg(long)]
    assoc_table: Option<PathBuf>,

    /// Write run statistics and diagnostics as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// TOML engine configuration.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(width) = cli.uuid_test_size {
        config.uuid_test_size = Some(width);
    }
    if let Some(format) = cli.format {
        config.output_format = format;
    }
    let format = config.output_format;

    let mapping = load_mapping_file(&cli.x3ml)?;
    let policy = match &cli.policy {
        Some(path) => load_policy_file(path)?,
        None => GeneratorPolicy::default(),
    };
    let mut engine = Engine::new(mapping, policy).with_config(config);
    if let Some(path) = &cli.terminology {
        engine = engine.with_terminology(SkosTerminology::load(path)?);
    }

    let xml = std::fs::read_to_string(&cli.input).map_err(|e| LoadError::Io {
        path: cli.input.display().to_string(),
        source: e,
    })?;
    let document = roxmltree::Document::parse(&xml).map_err(|e| LoadError::Xml {
        document: cli.input.display().to_string(),
        message: e.to_string(),
    })?;
    let report = engine.execute(&document)?;

    for diagnostic in &report.diagnostics {
        let link = diagnostic.link.map(|l| format!(" link {l}")).unwrap_or_default();
        eprintln!(
            "warning: mapping {}{link} at {}: {}",
            diagnostic.mapping, diagnostic.xpath, diagnostic.message
        );
    }

    match &cli.output {
        Some(path) => {
            let file = File::create(path).into_diagnostic()?;
            report.graph.serialize(format, BufWriter::new(file))?.flush().into_diagnostic()?;
        }
        None => {
            let stdout = std::io::stdout().lock();
            report.graph.serialize(format, BufWriter::new(stdout))?.flush().into_diagnostic()?;
        }
    }

    if let Some(path) = &cli.assoc_table {
        std::fs::write(path, report.associations.to_json().into_diagnostic()?).into_diagnostic()?;
    }
    if let Some(path) = &cli.report {
        std::fs::write(path, report.to_json().into_diagnostic()?).into_diagnostic()?;
    }

    if !report.is_complete() {
        tracing::warn!(
            diagnostics = report.diagnostics.len(),
            "run completed with recovered errors; output is partial"
        );
    }
    Ok(())
}
