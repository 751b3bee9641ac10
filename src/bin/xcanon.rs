//! xcanon CLI - Command-line interface for xlang-canon
//!
//! This binary uses Clap for argument parsing. All core logic lives in the
//! library; the CLI only loads inputs, prints results and picks exit codes.
//!
//! Exit codes:
//! - `0`: success (and, for `compare`, an accepted verdict)
//! - `1`: `map` finished with failed items, or `compare` rejected the
//!   candidate in strict mode
//! - `2`: invalid input (unreadable files, bad configuration, malformed specs)

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use xlang_canon::core::pipeline::BatchResult;
use xlang_canon::{
    compare, BatchPipeline, CanonicalMapper, Config, EquivalenceResult, ParserRegistry,
    SourceFormat, TestSpecification,
};

/// Environment variable holding the log filter
const LOG_ENV: &str = "XCANON_LOG";

/// Normalize cross-language models and judge test-suite equivalence.
#[derive(Parser, Debug)]
#[command(name = "xcanon")]
#[command(version = xlang_canon::VERSION)]
#[command(about = "Normalize cross-language models and judge test-suite equivalence.")]
#[command(after_help = "Examples:
  # Canonical specifications for a legacy code base
  xcanon map legacy/ -o specs.json

  # Compare a migrated test module against the original
  xcanon compare tests/test_contact.py migrated/contact.spec.json --strict
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and map source files into canonical and test specifications
    Map {
        /// Files or directories to process
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Write the output here instead of stdout
        #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "json")]
        format: OutputFormat,

        /// Configuration file (defaults to .xcanon.json next to the first path)
        #[arg(short = 'c', long = "config", value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Compare a candidate test suite against a reference one
    Compare {
        /// Reference test specification (JSON) or test source
        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        /// Candidate test specification (JSON) or test source
        #[arg(value_name = "CANDIDATE")]
        candidate: PathBuf,

        /// Fail unless the verdict is EXACT or STRONG
        #[arg(long = "strict")]
        strict: bool,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,

        /// Configuration file; its `strict` key is honored
        #[arg(short = 'c', long = "config", value_name = "CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Map {
            paths,
            output,
            format,
            config,
        } => run_map(&paths, output.as_deref(), format, config.as_deref()),
        Command::Compare {
            reference,
            candidate,
            strict,
            format,
            config,
        } => {
            let config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            run_compare(&reference, &candidate, strict || config.strict, format)
        }
    }
}

fn run_map(
    paths: &[PathBuf],
    output: Option<&Path>,
    format: OutputFormat,
    config: Option<&Path>,
) -> anyhow::Result<i32> {
    let config = match (config, paths.first()) {
        (Some(path), _) => Config::from_file(path)?,
        (None, Some(root)) => Config::load_for(root)?,
        (None, None) => Config::default(),
    };
    debug!(?config, "loaded configuration");

    let batch = BatchPipeline::new(config).run_paths(paths);
    let rendered = match format {
        OutputFormat::Json => {
            let mut document = serde_json::to_value(batch.to_report())?;
            document["generated_at"] = json!(chrono::Utc::now().to_rfc3339());
            document["version"] = json!(xlang_canon::VERSION);
            serde_json::to_string_pretty(&document)?
        }
        OutputFormat::Text => render_batch(&batch),
    };

    emit(&rendered, output)?;
    Ok(if batch.has_errors() { 1 } else { 0 })
}

fn run_compare(
    reference: &Path,
    candidate: &Path,
    strict: bool,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let reference_spec = load_test_spec(reference)?;
    let candidate_spec = load_test_spec(candidate)?;

    let result = compare(&reference_spec, &candidate_spec)?;
    info!(
        reference = %reference.display(),
        candidate = %candidate.display(),
        level = %result.level,
        "compared"
    );

    match format {
        OutputFormat::Json => println!("{}", result.to_json()?),
        OutputFormat::Text => print!("{}", render_comparison(&result, strict)),
    }
    Ok(result.level.exit_code(strict))
}

/// Read a test specification document, or parse and map a test source
fn load_test_spec(path: &Path) -> anyhow::Result<TestSpecification> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    let format = SourceFormat::detect(path);
    let is_document = format == SourceFormat::Unknown
        && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_document {
        return TestSpecification::from_json(&content)
            .with_context(|| format!("invalid test specification {}", path.display()));
    }

    let units = ParserRegistry::with_builtin_parsers()
        .parse_path(path, &content)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    let test = units
        .iter()
        .find_map(|unit| unit.as_test())
        .ok_or_else(|| anyhow!("{} contains no test module", path.display()))?;
    if test.cases.is_empty() {
        bail!("{} contains no test cases", path.display());
    }
    Ok(CanonicalMapper::default().map_test(test)?)
}

fn emit(rendered: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

fn render_batch(batch: &BatchResult) -> String {
    let mut lines = Vec::new();

    for spec in &batch.entities {
        let tags: Vec<&str> = spec.tags().iter().map(|t| t.as_str()).collect();
        let mut line = format!(
            "entity {} ({} fields, {} actions)",
            spec.qualified_name(),
            spec.fields().len(),
            spec.actions().len()
        );
        if !tags.is_empty() {
            line.push_str(&format!(" [{}]", tags.join(", ")));
        }
        lines.push(line);
    }
    for test in &batch.tests {
        lines.push(format!(
            "tests {} ({}, {} scenarios, {} assertions)",
            test.name,
            test.test_type.as_str(),
            test.scenarios.len(),
            test.assertion_count()
        ));
    }
    for error in &batch.errors {
        let entity = error
            .entity
            .as_deref()
            .map(|e| format!(" [{}]", e))
            .unwrap_or_default();
        lines.push(format!("error {}{} ({}): {}", error.path, entity, error.category, error.message));
    }

    let summary = &batch.summary;
    lines.push(format!(
        "{} files, {} succeeded, {} failed, {} skipped",
        summary.files,
        summary.succeeded,
        summary.total_failed(),
        summary.skipped
    ));
    lines.join("\n")
}

fn render_comparison(result: &EquivalenceResult, strict: bool) -> String {
    let mut out = result.render_diff();
    if strict && !result.is_equivalent() {
        out.push_str(&format!("strict: {} is not accepted\n", result.level));
    }
    out
}
