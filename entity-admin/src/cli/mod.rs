//! Command line interface

pub mod handler;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use handler::run;

#[derive(Parser, Debug)]
#[command(name = "entity-admin", version, about = "Save and delete entities with their relation data")]
pub struct Cli {
    /// Schema file describing entities and relations
    #[arg(long, global = true, default_value = "schema.toml")]
    pub schema: PathBuf,

    /// Settings file (defaults to <config dir>/entity-admin/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, overrides the settings file
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Run against an empty in-memory store and print the issued writes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a table for every entity in the schema
    Init,
    /// Create or update a row and reconcile its relation data
    Save(SaveArgs),
    /// Delete a row and the data of its declared relations
    Delete(DeleteArgs),
    /// Show how relations resolve to child columns
    Relations(RelationsArgs),
}

#[derive(Args, Debug)]
pub struct SaveArgs {
    #[arg(long)]
    pub entity: String,

    /// JSON file holding the payload object
    #[arg(long)]
    pub payload: PathBuf,

    /// Key of the row to update; omit to create
    #[arg(long)]
    pub id: Option<String>,

    /// Only reconcile relation data, leave the row itself alone
    #[arg(long)]
    pub relations_only: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long)]
    pub entity: String,

    #[arg(long)]
    pub id: String,

    /// Interface fields; only relations listed here are deleted
    #[arg(long, value_delimiter = ',')]
    pub fields: Option<Vec<String>>,

    /// Only delete relation data, keep the row itself
    #[arg(long)]
    pub relations_only: bool,
}

#[derive(Args, Debug)]
pub struct RelationsArgs {
    /// Limit output to one entity
    #[arg(long)]
    pub entity: Option<String>,
}
