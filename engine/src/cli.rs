//! CLI interface for Vigil
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vigil security data engine
///
/// Fetches, caches and aggregates Wazuh findings for a conversational
/// security assistant.
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every source and print the aggregate
    Analyze {
        /// Free-text question, recorded as cache provenance
        query: String,
    },

    /// List registered sources and their cache keys
    Sources,

    /// Dispatch a single tool
    Tool {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List available tools
    Tools,

    /// Show which tool a question would be routed to
    Route {
        /// Free-text question
        query: String,
    },

    /// Inspect the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Result cache inspection actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached entries, newest first
    List {
        /// Number of entries to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show one cached entry
    Show {
        /// Cache key, e.g. get_wazuh_processes-agent_id=001
        key: String,
    },
}
