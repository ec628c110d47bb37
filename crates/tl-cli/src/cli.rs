//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Generic-entity timelines.
///
/// Follows configured record types and keeps a per-user, newest-first
/// timeline of the records that currently qualify.
#[derive(Debug, Parser)]
#[command(name = "tl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show followed types and when each was last updated.
    Status,

    /// Show the latest timeline entries.
    Timeline {
        /// Only entries owned by this user.
        #[arg(long)]
        user: Option<String>,

        /// Only entries of this type (e.g., blog.Post).
        #[arg(long = "type", value_name = "TYPE")]
        type_name: Option<String>,

        /// Maximum number of entries (defaults to the configured feed limit).
        #[arg(long)]
        limit: Option<usize>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List timeline items for inspection.
    Items {
        /// Maximum number of rows.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Save a source record, creating it when no id is given.
    Put {
        /// Record type (e.g., blog.Post).
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Id of an existing record to update.
        #[arg(long)]
        id: Option<i64>,

        /// Field values as a JSON object.
        fields: String,
    },

    /// Delete a source record.
    Delete {
        /// Record type (e.g., blog.Post).
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Record id.
        id: i64,
    },

    /// Re-synchronize stored records with the timeline.
    Resync {
        /// Only this type; all followed types when omitted.
        #[arg(value_name = "TYPE")]
        type_name: Option<String>,
    },

    /// Show the latest timeline timestamp of a type.
    LastUpdate {
        /// Record type (e.g., blog.Post).
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Only items owned by this user.
        #[arg(long)]
        user: Option<String>,

        /// Only items before this time (ISO 8601 or relative, e.g. "2 days ago").
        #[arg(long)]
        before: Option<String>,

        /// Only items at or after this time (ISO 8601 or relative).
        #[arg(long)]
        after: Option<String>,
    },
}
