//! Datastore CLI
//!
//! Command-line interface for a datastore: define models in a TOML schema
//! file, then insert, update, find and delete their records.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use datastore_core::{Datastore, Presenter, StoreConfig};

mod client;
mod commands;
mod output;
mod schema;

use commands::find::FindArgs;
use output::{Output, OutputFormat};
use schema::Schema;

#[derive(Parser)]
#[command(name = "datastore")]
#[command(about = "Datastore - CRUD over an embedded SQLite store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (default: ~/.config/datastore/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model schema file
    #[arg(long, global = true, default_value = "models.toml")]
    schema: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log statements and store activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CREATE TABLE statement of every model
    Tables,
    /// Insert a new record
    #[command(alias = "add")]
    Put {
        /// Model name
        model: String,
        /// Field values as field=value
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Update fields of a stored record
    Set {
        /// Model name
        model: String,
        /// Store ID of the record
        id: i64,
        /// Field values as field=value
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Find records
    #[command(alias = "ls")]
    Find {
        /// Model name
        model: String,
        /// Columns to select, comma separated
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Filter clause, e.g. "WHERE age > ?"
        #[arg(long = "where")]
        constraint: Option<String>,
        /// Parameter for each `?` in the filter, in order
        #[arg(long = "param")]
        params: Vec<String>,
        /// ORDER BY expression
        #[arg(long)]
        order: Option<String>,
        /// Maximum number of records
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Delete a stored record
    #[command(alias = "rm")]
    Delete {
        /// Model name
        model: String,
        /// Store ID of the record
        id: i64,
    },
}

/// Alerts fatal store errors on stderr
struct StderrPresenter;

impl Presenter for StderrPresenter {
    fn alert(&self, title: &str, message: &str) {
        eprintln!("{} {}", title, message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json));

    let schema = Schema::load(&cli.schema)?;
    debug!(models = schema.models().len(), "schema loaded from {:?}", cli.schema);

    // Tables only needs the schema
    if let Commands::Tables = cli.command {
        return commands::tables::list(&schema, &output);
    }

    let config = match &cli.config {
        Some(path) => StoreConfig::load_from_path(path)?,
        None => StoreConfig::load()?,
    };
    debug!(store = %config.store_name, "using store in {:?}", config.data_dir);
    let datastore = Datastore::configure_with_presenter(config, Arc::new(StderrPresenter))
        .context("Failed to configure datastore")?;

    match cli.command {
        Commands::Tables => unreachable!(), // Handled above
        Commands::Put { model, values } => {
            commands::record::put(&datastore, &schema, model, values, &output).await
        }
        Commands::Set { model, id, values } => {
            commands::record::set(&datastore, &schema, model, id, values, &output).await
        }
        Commands::Find {
            model,
            columns,
            constraint,
            params,
            order,
            limit,
        } => {
            let args = FindArgs {
                model,
                columns,
                constraint,
                params,
                order,
                limit,
            };
            commands::find::find(&datastore, &schema, args, &output).await
        }
        Commands::Delete { model, id } => {
            commands::record::delete(&datastore, &schema, model, id, &output).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "datastore_core=debug,datastore=debug"
    } else {
        "warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
