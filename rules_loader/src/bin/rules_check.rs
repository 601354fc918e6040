//! Validate rules systems stored in a vault directory.
//!
//! Run with: `rules-check <VAULT> check systems/dnd`

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use game_rules::SystemDefinition;
use rules_loader::{ContentSource, FsSource, LoadReport, LoaderConfig, RulesLoader};

/// Validate rules systems stored in a vault directory
#[derive(Parser)]
#[command(name = "rules-check")]
#[command(about = "Compile, evaluate and normalize authored rules systems", long_about = None)]
#[command(version)]
struct Cli {
    /// Vault root directory
    #[arg(value_name = "VAULT")]
    vault: PathBuf,

    /// Loader configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend profile (TOML), overrides the configuration file
    #[arg(short, long, value_name = "FILE")]
    backend: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load one system and report the result
    Check {
        /// Folder holding the entry module, relative to the vault
        #[arg(value_name = "FOLDER")]
        folder: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "summary")]
        format: OutputFormat,
    },

    /// List folders that contain an entry module
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Entity, attribute and expression overview
    Summary,
    /// The normalized definition as JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => LoaderConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend_profile = Some(backend);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if !cli.vault.is_dir() {
        bail!("vault directory not found: {}", cli.vault.display());
    }
    let source = Arc::new(FsSource::new(&cli.vault));

    match cli.command {
        Command::List => {
            let suffix = format!("/{}", config.entry_file);
            for descriptor in source.list_all() {
                if let Some(folder) = descriptor.path.strip_suffix(&suffix) {
                    println!("{}", folder);
                }
            }
            Ok(())
        }
        Command::Check { folder, format } => {
            let loader = RulesLoader::new(source).with_config(config);
            let report = loader.load(&folder).await;
            print_report(report, format)
        }
    }
}

fn print_report(report: LoadReport, format: OutputFormat) -> Result<()> {
    for diagnostic in &report.diagnostics {
        eprintln!("{}", diagnostic);
    }

    let stage = report.stage;
    let entry = report.entry.clone();
    let system = match report.into_result() {
        Ok(Some(system)) => system,
        Ok(None) => bail!("{}: system not loaded ({})", entry, stage),
        Err(e) => return Err(e).with_context(|| format!("{}: system failed at {}", entry, stage)),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&system)?),
        OutputFormat::Summary => print_summary(&system),
    }
    Ok(())
}

fn print_summary(system: &SystemDefinition) {
    println!("{}", system.name);
    println!("  attributes:  {}", system.attribute_names().join(", "));
    println!("  entities:    {}", system.entities.len());
    for (key, entity) in &system.entities {
        let blocks: Vec<&str> = entity.block_names().collect();
        println!(
            "    {:<16} {} fields, blocks [{}]",
            key,
            entity.frontmatter.len(),
            blocks.join(", ")
        );
    }
    println!("  expressions: {}", system.expressions.len());
    for expression in system.expressions.values() {
        println!("    {}", expression.formula);
    }
    println!(
        "  skills: {}  conditions: {}  events: {}",
        system.skills.len(),
        system.conditions.len(),
        system.events.len()
    );
}
