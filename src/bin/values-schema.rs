//! Values Schema CLI
//!
//! Command-line interface for generating a JSON Schema from a Helm values file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use values_schema::{generate, GenerateOptions, SkipAutoGeneration};

/// Environment variable overriding the log filter.
const LOG_ENV: &str = "VALUES_SCHEMA_LOG";

#[derive(Parser)]
#[command(name = "values-schema")]
#[command(about = "Generate a JSON Schema from an annotated Helm values file")]
#[command(version)]
struct Cli {
    /// Values file to read
    values: PathBuf,

    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Use every paragraph of a key's comment as its description
    #[arg(long)]
    keep_full_comment: bool,

    /// Also read helm-docs `# --` comments
    #[arg(long)]
    helm_docs_compatibility_mode: bool,

    /// Keep helm-docs `@tag` lines and `-- ` prefixes in descriptions
    #[arg(long)]
    dont_strip_helm_docs_prefix: bool,

    /// Don't add a `global` property when the values file has none
    #[arg(long)]
    dont_add_global: bool,

    /// Fetch `$ref` URLs over HTTP
    #[arg(long)]
    resolve_remote: bool,

    /// Fields not to fill in automatically (type, title, description, required,
    /// default, additionalProperties)
    #[arg(long, value_delimiter = ',')]
    skip_auto_generation: Vec<String>,

    /// Clear every `required` list in the output
    #[arg(long)]
    disable_required: bool,

    /// Log debug output
    #[arg(long, short, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(long, short)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("Error: {}", e);
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), String> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))
}

fn run(cli: Cli) -> Result<(), u8> {
    let skip = SkipAutoGeneration::from_names(&cli.skip_auto_generation).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let options = GenerateOptions::new()
        .keep_full_comment(cli.keep_full_comment)
        .helm_docs_compatibility(cli.helm_docs_compatibility_mode)
        .strip_helm_docs_prefix(!cli.dont_strip_helm_docs_prefix)
        .add_global(!cli.dont_add_global)
        .resolve_remote(cli.resolve_remote)
        .skip_auto_generation(skip)
        .disable_required_properties(cli.disable_required);

    debug!(values = %cli.values.display(), "generating schema");
    let schema = generate(&cli.values, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let json_output = if cli.pretty {
        serde_json::to_string_pretty(&schema)
    } else {
        serde_json::to_string(&schema)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match cli.output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
