//! CLI parse: clap types for Triggerator. No behavior; definitions only.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Triggerator CLI - rule-driven campaign generation and activation
#[derive(Parser)]
#[command(name = "triggerator")]
#[command(about = "Generate campaign structures from feeds and switch them by rules")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (feeds with relative paths resolve against it)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use cached archives in this directory instead of the platform API
    #[arg(long)]
    pub offline: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration; with --feeds also load feeds and check columns
    Validate {
        /// Validate for updating the existing campaign
        #[arg(long)]
        update: bool,
        /// Load and join feeds and check the configured columns
        #[arg(long)]
        feeds: bool,
    },
    /// Load and join all feeds and preview the result
    Feeds {
        /// Rows to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Check a rule condition; with --evaluate show its value for every feed row
    CheckRule {
        /// Condition expression
        condition: String,
        /// Evaluate against the joined feed
        #[arg(long)]
        evaluate: bool,
    },
    /// Generate a campaign archive from the template campaign
    Generate {
        /// Update the configured campaign instead of creating a new one
        #[arg(long)]
        update: bool,
        /// Activate generated entities
        #[arg(long)]
        auto_activate: bool,
        /// Campaign start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// Campaign end date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Archive path (default: timestamped file in the destination folder)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Activate and pause entities of the live campaign by the effective rules
    Run {
        /// Send every status, even when the entity already has it
        #[arg(long)]
        force_update: bool,
        /// Show decisions without changing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
