//! semagg CLI: query the aggregated view of a workspace file.
//!
//! Usage:
//!   semagg <workspace> entities
//!   semagg <workspace> search <query>
//!   semagg <workspace> hierarchy <id>
//!   semagg <workspace> surroundings <id>

use clap::{Parser, Subcommand};
use semantic_aggregator::{SemanticModelAggregator, Workspace};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "semagg",
    version,
    about = "Aggregate semantic models and query the merged view"
)]
struct Cli {
    /// Workspace file (.json, .yaml or .yml)
    workspace: PathBuf,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every aggregated entity
    Entities,
    /// Search class names
    Search {
        /// Case-insensitive pattern
        query: String,
    },
    /// Print the hierarchy of a locally aggregated entity
    Hierarchy {
        /// Entity id
        id: String,
    },
    /// Print relationships around an entity and the classes at their other ends
    Surroundings {
        /// Entity id
        id: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_entities(aggregator: &dyn SemanticModelAggregator) -> i32 {
    let mut entities: Vec<_> = aggregator.get_aggregated_entities().into_values().collect();
    entities.sort_by(|a, b| a.id().cmp(b.id()));
    print_json(&entities)
}

async fn cmd_search(aggregator: &dyn SemanticModelAggregator, query: &str) -> i32 {
    match aggregator.search(query).await {
        Ok(results) => print_json(&results),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_hierarchy(aggregator: &dyn SemanticModelAggregator, id: &str) -> i32 {
    match aggregator.get_hierarchy(id).await {
        Ok(hierarchy) => print_json(&hierarchy.unwrap_or_default()),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_surroundings(aggregator: &dyn SemanticModelAggregator, id: &str) -> i32 {
    match aggregator.get_surroundings(id).await {
        Ok(surroundings) => print_json(&surroundings),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let workspace = match Workspace::load(&cli.workspace).await {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: failed to load {}: {}", cli.workspace.display(), e);
            std::process::exit(1);
        }
    };
    let aggregator = workspace.aggregator().as_ref();

    let code = match cli.command {
        Commands::Entities => cmd_entities(aggregator),
        Commands::Search { query } => cmd_search(aggregator, &query).await,
        Commands::Hierarchy { id } => cmd_hierarchy(aggregator, &id).await,
        Commands::Surroundings { id } => cmd_surroundings(aggregator, &id).await,
    };
    std::process::exit(code);
}
