use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waypoint::db::Database;
use waypoint::graph::DependencyGraph;
use waypoint::patterns::{self, PatternConfig};
use waypoint::sync::{SyncEngine, SyncOptions, SyncStrategy};

#[derive(Parser)]
#[command(name = "wpt")]
#[command(about = "Task tracking synchronized with a markdown documentation tree")]
#[command(version)]
struct Cli {
    /// Database file (defaults to the per-user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug-level diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the documentation tree with the store
    Sync {
        /// Documentation root to scan
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Conflict strategy: dry-run, file-authoritative, store-authoritative, create-missing
        #[arg(long, default_value = "dry-run")]
        strategy: String,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Allow file-authoritative syncs to reassign file ownership
        #[arg(long)]
        force: bool,

        /// Refresh the incremental file index without reconciling entities
        #[arg(long)]
        index: bool,

        /// Ignore the checkpoint and re-read every matched file
        #[arg(long)]
        force_full: bool,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the built-in pattern presets
    Presets,
    /// Show the transitive dependency chain of a task
    Deps {
        /// Task key, canonical or slugged form
        task: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "waypoint=debug" } else { "waypoint=info" };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );

    // Logs go to stderr so stdout stays clean for reports and JSON.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Sync {
            root,
            strategy,
            dry_run,
            force,
            index,
            force_full,
            json,
        } => {
            let strategy = SyncStrategy::from_str(&strategy).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown strategy {strategy:?} (expected dry-run, file-authoritative, \
                     store-authoritative, or create-missing)"
                )
            })?;

            let db = open_database(cli.db)?;
            let config = PatternConfig::load_or_standard(&root)?;
            config.validate()?;

            let engine = SyncEngine::new(db, config);
            let options = SyncOptions {
                strategy,
                dry_run,
                force,
                index_only: index,
                force_full,
            };
            let report = engine.sync(&root, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            if report.has_problems() {
                std::process::exit(1);
            }
        }
        Commands::Presets => {
            for preset in patterns::list_presets() {
                println!("{}: {}", preset.name, preset.description);
            }
        }
        Commands::Deps { task } => {
            let db = open_database(cli.db)?;
            let canonical = waypoint::keys::normalize_task_key(&task)
                .map(|k| waypoint::keys::strip_task_slug(&k))?;

            let graph = DependencyGraph::from_edges(db.list_task_dependencies()?);
            let chain = graph.dependency_chain(&canonical);
            if chain.is_empty() {
                println!("{canonical} has no dependencies");
            } else {
                for key in &chain {
                    println!("{key}");
                }
            }
        }
    }

    Ok(())
}
