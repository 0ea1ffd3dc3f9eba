//! voicebank - Unit-selection voice database builder
//!
//! Turns a corpus of labelled recordings into the binary artifacts a
//! concatenative synthesizer reads at runtime: timelines of pitch periods
//! and parameter frames, a unit table, per-unit feature vectors and a
//! pruned table of precomputed join costs.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
pub mod basenames;
pub mod binio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod features;
pub mod header;
pub mod joincost;
pub mod makers;
pub mod output;
pub mod timeline;
pub mod track;
pub mod units;
pub mod verify;

// Container
pub use header::ContentType;

// Stores
pub use features::{FeatureFile, FeatureFileWriter, FeatureSchema, FeatureVector};
pub use joincost::{JoinCostFunction, JoinCostTable, JoinFeatures, JoinWeights};
pub use timeline::{Datagram, TimelineReader, TimelineWriter};
pub use units::{Granularity, UnitEntry, UnitTable, UnitTableWriter};

// Error handling
pub use error::{Result, VoicebankError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
