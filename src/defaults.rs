//! Default configuration constants for voicebank.
//!
//! Shared by the config sections and the CLI so every stage agrees on the
//! same layout of a voice database directory.

/// Default sample rate of unit times and of the timelines, in Hz.
///
/// 16kHz is the rate the reference voice corpora are recorded and labelled at.
pub const SAMPLE_RATE: u32 = 16000;

/// Default spacing of timeline index entries, in seconds.
///
/// A lookup reads at most one interval's worth of datagrams before it finds
/// the requested time.
pub const INDEX_INTERVAL_SECS: f64 = 0.1;

/// Default share of right candidates kept per left unit, in percent.
pub const RETAIN_PERCENT: u32 = 10;

/// Default lower bound on the number of candidates kept per left unit.
pub const RETAIN_MIN: usize = 20;

/// Worker count meaning "use the available parallelism".
pub const AUTO_WORKERS: usize = 0;

pub const WAV_DIR: &str = "wav";
pub const WAV_EXT: &str = "wav";
pub const LAB_DIR: &str = "lab";
pub const LAB_EXT: &str = "lab";
pub const PM_DIR: &str = "pm";
pub const PM_EXT: &str = "pm";
pub const MCEP_DIR: &str = "mcep";
pub const MCEP_EXT: &str = "mcep";
pub const FEATURES_DIR: &str = "phonefeatures";
pub const FEATURES_EXT: &str = "pfeats";

/// Directory, relative to the database root, receiving every artifact.
pub const OUTPUT_DIR: &str = "mary";

/// Artifact file names inside the output directory.
pub const UNITS_FILE: &str = "units.bin";
pub const WAVE_TIMELINE_FILE: &str = "timeline_waveforms.bin";
pub const FRAME_TIMELINE_FILE: &str = "timeline_mcep.bin";
pub const FEATURES_FILE: &str = "features.bin";
pub const JOIN_FEATURES_FILE: &str = "joinCostFeatures.bin";
pub const JOIN_COSTS_FILE: &str = "joinCosts.bin";

/// Processing header stamped into timelines built by the CLI.
pub const WAVE_PROCESSING_HEADER: &str = "wave: pitch-synchronous 16-bit PCM";
pub const FRAME_PROCESSING_HEADER: &str = "mcep: pitch-synchronous parameter frames";
