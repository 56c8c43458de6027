use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use rusty_spoc::data::{load_file, LoadOptions};
use rusty_spoc::{Calculator, Resolver, SchemeBuilder};

/// Compute the statistics and reducers of a configuration on a dataset.
#[derive(Debug, Parser)]
#[command(name = "rusty-spoc", version, about)]
struct Cli {
    /// YAML or JSON configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Dataset (.csv, .json or .parquet).
    #[arg(short, long)]
    data: PathBuf,

    /// Row label of the results. Defaults to the dataset name.
    #[arg(short, long)]
    name: Option<String>,

    /// Tag the results row. Repeatable.
    #[arg(short, long = "label", value_name = "LABEL")]
    labels: Vec<String>,

    /// Keep the raw values instead of z-scoring each variable.
    #[arg(long)]
    no_normalise: bool,

    /// Use only the first N realisations.
    #[arg(long, value_name = "N")]
    observations: Option<usize>,

    /// Use only the first N variables.
    #[arg(long, value_name = "N")]
    variables: Option<usize>,

    /// Write results as CSV (.csv) or Parquet (.parquet) instead of printing them.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Write the resolved configuration back out (.yaml or .json).
    #[arg(long, value_name = "PATH")]
    export_config: Option<PathBuf>,

    /// Register a module manifest as NAME=PATH. Repeatable.
    #[arg(long = "module", value_name = "NAME=PATH")]
    modules: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut resolver = Resolver::default();
    for module in &cli.modules {
        let Some((name, path)) = module.split_once('=') else {
            bail!("--module expects NAME=PATH, got '{module}'");
        };
        resolver
            .register_manifest(name, path.as_ref())
            .with_context(|| format!("registering module '{name}'"))?;
    }

    let scheme_name = cli
        .config
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();
    let scheme = SchemeBuilder::new(&mut resolver)
        .build_file(&scheme_name, &cli.config)
        .with_context(|| format!("building configuration {}", cli.config.display()))?;

    if let Some(path) = &cli.export_config {
        match extension(path).as_str() {
            "json" => scheme.export_json(path)?,
            _ => scheme.export_yaml(path)?,
        }
        info!("Exported configuration to {}", path.display());
    }

    let options = LoadOptions {
        normalise: !cli.no_normalise,
        name: None,
        n_observations: cli.observations,
        n_variables: cli.variables,
    };
    let dataset = load_file(&cli.data, &options)?;

    let labels: Vec<&str> = cli.labels.iter().map(String::as_str).collect();
    let mut calculator = Calculator::new(dataset).with_labels(&labels);
    if let Some(name) = &cli.name {
        calculator = calculator.with_name(name);
    }
    let table = calculator.compute(&scheme);

    match &cli.output {
        Some(path) if extension(path) == "parquet" => table.export_parquet(path)?,
        Some(path) => table.export_csv(path)?,
        None if cli.json => println!("{}", table.to_json()?),
        None => println!("{table}"),
    }
    if let Some(path) = &cli.output {
        info!("Wrote {} values to {}", table.len(), path.display());
    }

    for failure in calculator.failures() {
        eprintln!(
            "excluded: {}{}: {}",
            failure.statistic,
            failure.reducer.as_deref().map(|r| format!(" / {r}")).unwrap_or_default(),
            failure.error
        );
    }
    Ok(())
}

fn extension(path: &std::path::Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}
