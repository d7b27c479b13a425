//! procsync: keep local dev servers and their PM2 processes in step.
//!
//! ## Subcommands
//!
//! - `import`, `list`, `remove`: manage the project registry
//! - `start`, `stop`, `restart`: control a project's process, then reconcile
//! - `status`, `sync`: query the supervisor / apply what it reports
//! - `ports`, `conflicts`: port discovery and collision repair
//! - `watch`: reconcile periodically and print every status change

mod logging;
mod output;
mod ports;
mod projects;
mod watch;

use clap::{Parser, Subcommand};
use procsync_core::{StorageConfig, SyncEngine};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "procsync")]
#[command(about = "Reconcile dev-server projects with the PM2 process table")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to $PROCSYNC_HOME or ~/.procsync)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the project in a directory containing package.json
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Port to pass to the dev server as PORT
        #[arg(long)]
        port: Option<u16>,
    },

    /// List registered projects with their last reconciled status
    List,

    /// Unregister a project and delete its supervisor record
    Remove {
        #[arg(value_name = "PROJECT")]
        project: String,
    },

    /// Start a project's dev server
    Start {
        #[arg(value_name = "PROJECT")]
        project: String,
    },

    /// Stop a project's dev server
    Stop {
        #[arg(value_name = "PROJECT")]
        project: String,
    },

    /// Restart a project's dev server
    Restart {
        #[arg(value_name = "PROJECT")]
        project: String,
    },

    /// Query the supervisor without updating the registry
    Status {
        /// Limit to one project
        #[arg(value_name = "PROJECT")]
        project: Option<String>,
    },

    /// Reconcile every project and print what changed
    Sync,

    /// Show the ports a project's files declare
    Ports {
        /// Registered project, or a directory with --path
        #[arg(value_name = "PROJECT", required_unless_present = "path")]
        project: Option<String>,

        #[arg(long, conflicts_with = "project")]
        path: Option<PathBuf>,
    },

    /// Find projects that resolve to the same port
    Conflicts {
        /// Move every project but the first of each conflict to a free port
        #[arg(long)]
        fix: bool,
    },

    /// Reconcile on an interval and print status changes until interrupted
    Watch {
        /// Seconds between passes
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

fn open_engine(home: Option<PathBuf>) -> Result<SyncEngine, String> {
    let storage = home
        .map(StorageConfig::with_root)
        .unwrap_or_default();
    storage
        .ensure_dirs()
        .map_err(|e| format!("Failed to create {}: {}", storage.root().display(), e))?;
    SyncEngine::with_storage(storage).map_err(String::from)
}

async fn run(cli: Cli) -> Result<(), String> {
    let engine = open_engine(cli.home)?;
    let json = cli.json;

    match cli.command {
        Commands::Import { path, port } => projects::import(&engine, &path, port, json).await,
        Commands::List => projects::list(&engine, json),
        Commands::Remove { project } => projects::remove(&engine, &project, json).await,
        Commands::Start { project } => projects::start(engine, &project, json).await,
        Commands::Stop { project } => projects::stop(engine, &project, json).await,
        Commands::Restart { project } => projects::restart(engine, &project, json).await,
        Commands::Status { project } => projects::status(&engine, project.as_deref(), json).await,
        Commands::Sync => projects::sync(&engine, json).await,
        Commands::Ports { project, path } => {
            ports::detect(&engine, project.as_deref(), path.as_deref(), json).await
        }
        Commands::Conflicts { fix } => ports::conflicts(&engine, fix, json).await,
        Commands::Watch { interval } => watch::run(engine, interval, json).await,
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "procsync failed");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
