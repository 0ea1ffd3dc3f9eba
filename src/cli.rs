//! Command-line interface for voicebank
//!
//! Provides argument parsing using clap derive macros.

use crate::units::Granularity;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Builds unit-selection voice databases
#[derive(Parser, Debug)]
#[command(
    name = "voicebank",
    version,
    about = "Builds unit-selection voice databases"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Voice database root directory (overrides [database] root)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: per-utterance progress, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a timeline index interval into seconds.
///
/// Supports bare numbers (seconds, `0.1`) and any duration format accepted
/// by `humantime` (`100ms`, `1s`).
fn parse_interval_secs(s: &str) -> Result<f64, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<f64>() {
        return if secs > 0.0 {
            Ok(secs)
        } else {
            Err("interval must be positive".to_string())
        };
    }
    let duration = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("interval must be positive".to_string());
    }
    Ok(duration.as_secs_f64())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Align labels with pitch marks, write the unit table and the accepted utterance list
    Units {
        /// Unit size (default: from config)
        #[arg(long, value_enum, value_name = "SIZE")]
        granularity: Option<GranularityArg>,
    },

    /// Build a timeline store
    Timeline {
        #[command(subcommand)]
        kind: TimelineKind,

        /// Spacing of index entries (default: from config). Examples: 0.1, 100ms, 1s
        #[arg(long, global = true, value_name = "DURATION", value_parser = parse_interval_secs)]
        index_interval: Option<f64>,
    },

    /// Write the feature vector file from the per-utterance feature dumps
    Features,

    /// Extract join-cost boundary frames from the parameter-frame timeline
    JoinFeatures {
        /// Weights file, relative to the working directory (default: [join_cost] weights_file, else uniform)
        #[arg(long, value_name = "FILE")]
        weights: Option<PathBuf>,
    },

    /// Precompute the pruned join-cost table
    JoinCosts {
        /// Worker threads (0 = available parallelism)
        #[arg(long, short = 'j', value_name = "N")]
        workers: Option<usize>,

        /// Percentage of candidates kept per left unit
        #[arg(long, value_name = "PERCENT")]
        retain_percent: Option<u32>,

        /// Minimum number of candidates kept per left unit
        #[arg(long, value_name = "N")]
        retain_min: Option<usize>,
    },

    /// Cross-check the written artifacts against each other
    Verify,

    /// Run every stage in order, stopping at the first failure
    Build {
        /// Worker threads for the join-cost stage (0 = available parallelism)
        #[arg(long, short = 'j', value_name = "N")]
        workers: Option<usize>,
    },

    /// Summarize a voicebank artifact
    Inspect {
        /// Artifact to read
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Timeline kinds
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineKind {
    /// One datagram per pitch period of the waveforms
    Wave,
    /// One datagram per parameter frame
    Frames,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Dump a commented configuration template
    Dump,
    /// Show the effective configuration (file + environment + flags)
    Show,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranularityArg {
    Phone,
    Halfphone,
}

impl From<GranularityArg> for Granularity {
    fn from(arg: GranularityArg) -> Self {
        match arg {
            GranularityArg::Phone => Granularity::Phone,
            GranularityArg::Halfphone => Granularity::Halfphone,
        }
    }
}
