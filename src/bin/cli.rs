//! Scorecard CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scorecard::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, EventInput, HarvestContext, ListingOptions, PipelineOptions},
    utils::http::parse_header_arg,
};
use tokio_util::sync::CancellationToken;

/// Scorecard - listing harvester and match aggregator
#[derive(Parser, Debug)]
#[command(
    name = "scorecard",
    version,
    about = "Resumable listing harvester and match scorecard aggregator"
)]
struct Cli {
    /// Storage directory for checkpoints and outputs (overrides config)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Path to config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra request header, `name: value` (repeatable)
    #[arg(long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest the paginated entity listing
    Listing {
        /// Overwrite entities.json even if the entity count dropped sharply
        #[arg(long)]
        force: bool,
    },

    /// Harvest pass distribution and age for known entities
    Details,

    /// Fold events into per-entity aggregates
    Events {
        /// Event URLs (one per line) or a JSON array of event records
        #[arg(long)]
        input: PathBuf,
    },

    /// Run full pipeline: Listing → Details → (Events)
    Pipeline {
        /// Also fold events from this file
        #[arg(long)]
        events: Option<PathBuf>,

        /// Overwrite entities.json even if the entity count dropped sharply
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration
    Validate,

    /// Show checkpoint state
    Info,
}

/// Initialize logging at the configured level; `--verbose` forces debug.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C. In-flight requests finish; no new ones start.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; finishing in-flight requests and saving checkpoint...");
            token.cancel();
        }
    });
}

fn load_config(cli: &Cli) -> Result<(Config, PathBuf)> {
    let storage_dir = cli
        .storage_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("storage"));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| storage_dir.join("config.toml"));

    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };
    if let Some(dir) = &cli.storage_dir {
        config.checkpoint.dir = dir.clone();
    }
    for arg in &cli.headers {
        let (name, value) = parse_header_arg(arg)?;
        config.http.headers.insert(name, value);
    }
    Ok((config, config_path))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(&cli)?;
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Scorecard starting...");
    if !config_path.exists() {
        log::info!("No config at {}; using defaults", config_path.display());
    }

    if let Command::Validate = cli.command {
        if config_path.exists() {
            pipeline::run_validate(&config_path)?;
        } else {
            log::warn!("{} not found; validating defaults", config_path.display());
            config.validate()?;
        }
        log::info!("All validations passed!");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctx = HarvestContext::new(config, cancel.clone())?;
    log::info!("Storage directory: {}", ctx.storage.root().display());

    match cli.command {
        Command::Listing { force } => {
            cancel_on_ctrl_c(cancel);
            pipeline::run_listing(&ctx, ListingOptions { force }).await?;
        }

        Command::Details => {
            let mut entities = pipeline::output::load_entities(&ctx.storage).await?;
            if entities.is_empty() {
                return Err(AppError::config(
                    "No entities found. Run 'listing' first.",
                ));
            }
            cancel_on_ctrl_c(cancel);
            pipeline::run_details(&ctx, &mut entities).await?;
        }

        Command::Events { input } => {
            let input = EventInput::load(&input).await?;
            cancel_on_ctrl_c(cancel);
            pipeline::run_events(&ctx, input).await?;
        }

        Command::Pipeline { events, force } => {
            let events = match events {
                Some(path) => Some(EventInput::load(&path).await?),
                None => None,
            };
            cancel_on_ctrl_c(cancel);
            pipeline::run_pipeline(&ctx, PipelineOptions { force, events }).await?;
        }

        Command::Info => {
            pipeline::run_info(&ctx).await;
        }

        Command::Validate => {}
    }

    log::info!("Done!");

    Ok(())
}
