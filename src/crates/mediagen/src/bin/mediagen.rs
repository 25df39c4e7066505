//! mediagen CLI - render pending prompts into images and songs
//!
//! Main entry point for the mediagen command-line tool.

use clap::{Parser, Subcommand};
use mediagen::cli;
use mediagen::{ArtifactStatus, ArtifactType, CheckpointMode, ConfigLoader, PromptType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediagen")]
#[command(about = "Generate images and songs for prompts in a shared SQLite database", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file, replacing the user and project files
    #[arg(short, long, global = true, env = "MEDIAGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directives, e.g. debug or mediagen=trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration, paths and the engine setup
    Validate,

    /// Create or upgrade the database schema
    Migrate,

    /// List prompts: eligible ones by default, or by status
    List {
        /// Prompt type: image or lyrics
        #[arg(short = 't', long = "type")]
        prompt_type: Option<PromptType>,
        /// Status: pending, processing, ready, error
        #[arg(short, long)]
        status: Option<ArtifactStatus>,
        /// Maximum rows
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },

    /// Show one prompt with its content
    Show {
        /// Prompt ID
        id: i64,
    },

    /// Generate media in the foreground with progress
    Generate {
        /// Prompt IDs; eligible prompts are picked when omitted
        ids: Vec<i64>,
        /// Restrict picking to one prompt type: image or lyrics
        #[arg(short = 't', long = "type")]
        prompt_type: Option<PromptType>,
        /// Maximum prompts picked per type
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Run one reclaim and generation pass, then exit
    RunOnce {
        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run generation passes on an interval until interrupted
    Serve {
        /// Seconds between passes, overriding the configuration
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Return prompts stuck in processing to pending
    Reclaim {
        /// Age in seconds after which a claim is stale
        #[arg(long)]
        older_than: Option<u64>,
    },

    /// Put errored prompts back in the queue
    Reset {
        /// Prompt IDs
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// List artifacts of a prompt, or the most recent ones
    Artifacts {
        /// Prompt ID
        prompt_id: Option<i64>,
        /// Artifact type when listing recent ones: image or audio
        #[arg(short = 't', long = "type", default_value = "image")]
        artifact_type: ArtifactType,
        /// Maximum rows when listing recent ones
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Force a WAL checkpoint
    Checkpoint {
        /// Mode: passive, full, restart, truncate
        #[arg(short, long, default_value = "passive")]
        mode: CheckpointMode,
    },

    /// Show queue depth and WAL statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_explicit_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let config = loader.load().await?;

    let level = if cli.verbose {
        Some("debug")
    } else {
        cli.log_level.as_deref()
    };
    mediagen::logging::init_logging(&config.logging, level)?;

    match cli.command {
        Commands::Validate => cli::maintenance::handle_validate(&config, &loader)?,
        Commands::Migrate => cli::maintenance::handle_migrate(&config).await?,
        Commands::List {
            prompt_type,
            status,
            limit,
        } => cli::prompt::handle_list(&config, prompt_type, status, limit).await?,
        Commands::Show { id } => cli::prompt::handle_show(&config, id).await?,
        Commands::Generate {
            ids,
            prompt_type,
            limit,
        } => cli::generate::handle_generate(&config, ids, prompt_type, limit).await?,
        Commands::RunOnce { json } => cli::generate::handle_run_once(&config, json).await?,
        Commands::Serve { interval } => {
            let shutdown = mediagen::ShutdownCoordinator::new();
            let _signal_handler = shutdown.install_signal_handlers();
            cli::generate::handle_serve(&config, interval, &shutdown).await?;
        }
        Commands::Reclaim { older_than } => {
            cli::maintenance::handle_reclaim(&config, older_than).await?
        }
        Commands::Reset { ids } => cli::prompt::handle_reset(&config, ids).await?,
        Commands::Artifacts {
            prompt_id,
            artifact_type,
            limit,
            json,
        } => match prompt_id {
            Some(id) => cli::artifact::handle_for_prompt(&config, id, json).await?,
            None => cli::artifact::handle_recent(&config, artifact_type, limit, json).await?,
        },
        Commands::Checkpoint { mode } => cli::maintenance::handle_checkpoint(&config, mode).await?,
        Commands::Stats { json } => cli::maintenance::handle_stats(&config, json).await?,
    }

    Ok(())
}
