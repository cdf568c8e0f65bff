//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lh_core::SortKey;

/// Listening history statistics.
///
/// Reads streaming service exports (Spotify, Apple Music, YouTube Music),
/// merges them into one history and reports what you actually listen to.
#[derive(Debug, Parser)]
#[command(name = "lh", version, about, long_about = None)]
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
    /// Summarize totals, top artists, tracks, albums and obsessions.
    Report {
        /// Export files or directories containing them.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,

        /// Rows per section (defaults to the configured `top_n`).
        #[arg(long)]
        top: Option<usize>,
    },

    /// Rank tracks or podcast episodes within a date range.
    Query {
        /// Export files or directories containing them.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// First day to include (YYYY-MM-DD or e.g. "30 days ago").
        #[arg(long)]
        start: Option<String>,

        /// Last day to include (YYYY-MM-DD or e.g. "7 days ago").
        #[arg(long)]
        end: Option<String>,

        /// Only count plays by this artist (repeatable).
        #[arg(long = "artist")]
        artists: Vec<String>,

        /// Only count episodes of this show (repeatable, implies --podcasts).
        #[arg(long = "show", conflicts_with = "artists")]
        shows: Vec<String>,

        /// Rank podcast episodes instead of tracks.
        #[arg(long)]
        podcasts: bool,

        /// Number of rows (1-999).
        #[arg(long)]
        top: Option<usize>,

        /// Ranking key: played, sessions or completed.
        #[arg(long, default_value_t = SortKey::Played)]
        sort: SortKey,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the top tracks of each year.
    Years {
        /// Export files or directories containing them.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only show this year.
        #[arg(long)]
        year: Option<i32>,

        /// Rows per year (defaults to the configured `top_n`).
        #[arg(long)]
        top: Option<usize>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
