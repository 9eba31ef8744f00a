//! supabase-clone CLI - copy tables and views between Supabase projects.

use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use supabase_clone::existence::Presence;
use supabase_clone::{
    load_entities, CloneError, Config, DailyErrorLog, Entity, ExistenceChecker, Orchestrator,
    PostgrestStore, RetryPolicy, SchemaArtifacts, SchemaExtractor,
};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

#[derive(Parser)]
#[command(name = "supabase-clone")]
#[command(about = "Copy tables and views between Supabase projects over the REST API")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory for dated error logs (overrides logging.dir)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone every table, then every view, from the entity lists
    Run,

    /// Clone a single entity
    Table {
        /// Entity name
        name: Option<String>,

        /// Tag the entity as a view in logs and reports
        #[arg(long)]
        view: bool,
    },

    /// Report which entities exist in source and destination
    Check,

    /// Generate CREATE TABLE scripts for the destination
    Schema {
        /// Directory the scripts are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Drop existing tables before creating them
        #[arg(long)]
        drop: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CloneError> {
    let cli = Cli::parse();

    // Checked before anything touches the configuration.
    if let Commands::Table { name: None, .. } = cli.command {
        return Err(CloneError::Config(
            "missing entity name. Usage: supabase-clone table <name>".to_string(),
        ));
    }

    let config = Config::load(&cli.config)?;
    let log_dir = cli.log_dir.clone().unwrap_or_else(|| config.logging.dir.clone());
    setup_logging(&cli.verbosity, &cli.log_format, &log_dir).map_err(CloneError::Config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run => {
            let entities = load_entities(&config.entities.tables_file, &config.entities.views_file)?;
            let orchestrator = Orchestrator::new(&config)?.with_progress(cli.progress);
            let summary = until_interrupted(orchestrator.run(&entities)).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\nClone completed!");
                println!("  Run ID: {}", summary.run_id);
                println!("  Duration: {:.2}s", summary.duration_seconds);
                println!(
                    "  Entities: {}/{}",
                    summary.entities_done, summary.entities_total
                );
                println!(
                    "  Records: {}/{}",
                    summary.records_copied, summary.records_found
                );
                if !summary.failed_entities.is_empty() {
                    println!("  Failed entities: {:?}", summary.failed_entities);
                }
            }
        }
        Commands::Table { name, view } => {
            let name = name.unwrap_or_default();
            let entity = if view { Entity::view(name) } else { Entity::table(name) };
            let orchestrator = Orchestrator::new(&config)?.with_progress(cli.progress);
            let report = until_interrupted(orchestrator.clone_entity(&entity)).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Cloned {}/{} records for {} ({})",
                    report.progress.records_copied,
                    report.progress.total_records,
                    report.entity,
                    report.state
                );
                if let Some(ref err) = report.error {
                    println!("  Error: {}", err);
                }
            }
        }
        Commands::Check => {
            let entities = load_entities(&config.entities.tables_file, &config.entities.views_file)?;
            let source = PostgrestStore::new("source", &config.source)?;
            let destination = PostgrestStore::new("destination", &config.destination)?;
            let retry = RetryPolicy::from_config(&config.clone);
            let checker = ExistenceChecker::new(&source, &destination, &retry);
            let report = until_interrupted(checker.diff(&entities)).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("Entity presence (source / destination):");
                for row in &report.entities {
                    println!(
                        "  {:<40} {:<8} {}",
                        row.entity.to_string(),
                        mark(&row.source),
                        mark(&row.destination)
                    );
                }
                println!("\nSummary:");
                println!("  Entities checked: {}", report.entities.len());
                println!("  Present in source: {}", report.present_in_source);
                println!("  Present in destination: {}", report.present_in_destination);
                if !report.missing_in_destination.is_empty() {
                    println!("  Missing in destination: {}", report.missing_in_destination.join(", "));
                }
            }
        }
        Commands::Schema { out_dir, drop } => {
            let entities = load_entities(&config.entities.tables_file, &config.entities.views_file)?;
            let source = PostgrestStore::new("source", &config.source)?;
            let extractor = SchemaExtractor::new(
                &source,
                RetryPolicy::from_config(&config.clone),
                &config.schema,
            );
            let artifacts =
                until_interrupted(SchemaArtifacts::build(&extractor, &entities, drop)).await?;
            let written = artifacts.write_to(&out_dir)?;

            println!(
                "Generated schemas for {}/{} entities",
                artifacts.generated.len(),
                entities.len()
            );
            for path in &written {
                println!("  {}", path.display());
            }
            if !artifacts.skipped.is_empty() {
                println!("  No schema for: {}", artifacts.skipped.join(", "));
            }
        }
    }

    Ok(())
}

fn mark(presence: &Presence) -> &'static str {
    match presence {
        Presence::Present => "yes",
        Presence::Missing => "no",
        Presence::Unknown(_) => "error",
    }
}

/// Run `work` unless Ctrl-C arrives first.
async fn until_interrupted<T>(work: impl Future<Output = Result<T, CloneError>>) -> Result<T, CloneError> {
    tokio::select! {
        result = work => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            eprintln!("\nReceived Ctrl-C. Stopping.");
            Err(CloneError::Cancelled)
        }
    }
}

fn setup_logging(verbosity: &str, format: &str, log_dir: &Path) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    // Console output goes to stderr so --output-json stays clean on stdout.
    let console: Box<dyn Layer<Registry> + Send + Sync> = if format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(console.with_filter(level))
        .with(DailyErrorLog::new(log_dir))
        .try_init()
        .map_err(|e| e.to_string())
}
