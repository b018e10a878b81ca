//! Almanac CLI
//!
//! Command-line tools for file-backed Almanac databases.
//!
//! # Commands
//!
//! - `create` - Create a database or define an object store and its indexes
//! - `inspect` - List object stores, their indexes and record counts
//! - `find` - Run a partial-match query against a store
//! - `explain` - Show the query plan chosen for a query
//! - `add` - Add a record to a store
//! - `remove` - Remove a record by id

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Almanac command-line database tools.
#[derive(Parser)]
#[command(name = "almanac")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and define an object store
    Create {
        /// Object store to define
        #[arg(short, long)]
        store: String,

        /// Index key path as comma-separated fields (repeatable)
        #[arg(short, long)]
        index: Vec<String>,

        /// Unique index key path as comma-separated fields (repeatable)
        #[arg(short, long)]
        unique: Vec<String>,
    },

    /// List object stores with their indexes and record counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Find records matching a query
    Find {
        /// Object store to query
        #[arg(short, long)]
        store: String,

        /// Query as a JSON object of field values (empty matches everything)
        #[arg(short, long, default_value = "{}")]
        query: String,

        /// Return only the first match
        #[arg(long)]
        first: bool,
    },

    /// Show the plan chosen for a query
    Explain {
        /// Object store to query
        #[arg(short, long)]
        store: String,

        /// Query as a JSON object of field values
        #[arg(short, long)]
        query: String,
    },

    /// Add a record
    Add {
        /// Object store to write to
        #[arg(short, long)]
        store: String,

        /// Record fields as a JSON object
        #[arg(short, long)]
        fields: String,
    },

    /// Remove a record by id
    Remove {
        /// Object store to write to
        #[arg(short, long)]
        store: String,

        /// Id of the record
        id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Create {
            store,
            index,
            unique,
        } => {
            let path = cli.path.ok_or("Database path required for create")?;
            commands::create::run(&path, &store, &index, &unique)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            runtime.block_on(commands::inspect::run(&path, &format))?;
        }
        Commands::Find {
            store,
            query,
            first,
        } => {
            let path = cli.path.ok_or("Database path required for find")?;
            runtime.block_on(commands::find::run(&path, &store, &query, first))?;
        }
        Commands::Explain { store, query } => {
            let path = cli.path.ok_or("Database path required for explain")?;
            commands::explain::run(&path, &store, &query)?;
        }
        Commands::Add { store, fields } => {
            let path = cli.path.ok_or("Database path required for add")?;
            runtime.block_on(commands::write::add(&path, &store, &fields))?;
        }
        Commands::Remove { store, id } => {
            let path = cli.path.ok_or("Database path required for remove")?;
            runtime.block_on(commands::write::remove(&path, &store, &id))?;
        }
        Commands::Version => {
            println!("Almanac CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
