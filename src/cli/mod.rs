//! Command line front end: a scriptable version of the chat user list.

mod commands;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use entitystore::{DurabilityMode, StoreConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use commands::run;

#[derive(Parser)]
#[command(name = "entitystore")]
#[command(about = "Add, update, delete and list users in an entity store")]
pub struct Cli {
    /// Directory holding the store files
    #[arg(long, global = true, default_value = ".entitystore")]
    pub data_dir: PathBuf,

    /// Store (container) name
    #[arg(long, global = true, default_value = StoreConfig::DEFAULT_NAME)]
    pub name: String,

    /// JSON store configuration; overrides --data-dir and --name
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `entitystore=debug`
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a user; id and name are random when omitted
    Add {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete users by id
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Set the last message of a user and bump its update time
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        msg: Option<String>,
    },
    /// List users, most recently updated first
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List users matching a WHERE-style filter, e.g. "user_id > 100"
    Query {
        filter: String,
    },
}

impl Cli {
    pub fn store_config(&self) -> Result<StoreConfig> {
        match &self.config {
            Some(path) => StoreConfig::from_json_file(path)
                .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e)),
            None => Ok(StoreConfig::new(&self.name)
                .data_dir(&self.data_dir)
                .durability(DurabilityMode::Sync)),
        }
    }
}

pub fn init_logging(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter).map_err(|e| anyhow!("invalid log filter '{}': {}", filter, e))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))
}
