use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use sweepline_core::{filter_results, filter_results_lifted, Column, EngineConfig, FunctionRegistry, Key, PipelineDocument};

#[derive(Parser, Debug)]
#[command(name = "sweepline")]
#[command(about = "Run a declarative stage pipeline over a dataset", long_about = None)]
struct Args {
    /// Pipeline document (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    pipeline: PathBuf,

    /// Dataset file: a JSON array whose elements become keys 0..n
    #[arg(short, long)]
    data: PathBuf,

    /// Path to engine configuration file
    #[arg(short, long, default_value = "sweepline.toml", env = "SWEEPLINE_CONFIG")]
    config: PathBuf,

    /// Comma-separated columns to keep; numeric entries are dataset/output indices
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Print one row per context instead of one array per chain
    #[arg(long)]
    flatten: bool,

    /// Lift keys of nested objects (e.g. sub-pipeline rows) into each row
    #[arg(long)]
    lift_nested: bool,
}

fn parse_columns(tokens: &[String]) -> Vec<Column> {
    tokens
        .iter()
        .map(|token| token.trim())
        .filter(|token| !token.is_empty())
        .map(Key::parse_token)
        .collect()
}

fn load_dataset(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Dataset {} must be a JSON array", path.display()))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sweepline=info,sweepline_core=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = EngineConfig::load(&args.config)?;
    let document = PipelineDocument::load(&args.pipeline)?;
    let pipeline = document
        .build(&FunctionRegistry::with_builtins())?
        .with_config(config);
    let dataset = load_dataset(&args.data)?;

    tracing::info!(
        "Loaded pipeline {} with {} chains",
        args.pipeline.display(),
        pipeline.chains().len()
    );

    let results = pipeline.transform(&dataset)?;
    let columns = args.columns.as_deref().map(parse_columns);
    let filtered = if args.lift_nested {
        filter_results_lifted(&results, columns.as_deref(), args.flatten)
    } else {
        filter_results(&results, columns.as_deref(), args.flatten)
    };

    let rows: Vec<serde_json::Value> = match filtered {
        sweepline_core::FilteredResults::Flat(rows) => rows
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
        sweepline_core::FilteredResults::Nested(groups) => groups
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
    };

    for row in rows {
        println!("{}", row);
    }

    Ok(())
}
