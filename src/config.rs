use crate::defaults;
use crate::error::{Result, VoicebankError};
use crate::joincost::RetentionPolicy;
use crate::units::Granularity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub timeline: TimelineConfig,
    pub units: UnitsConfig,
    pub join_cost: JoinCostConfig,
}

/// Where the per-utterance source files live and where artifacts go.
///
/// Relative directories are resolved against `root`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub root: PathBuf,
    /// Utterance list; when unset, the label directory is scanned.
    pub basenames: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub wav_dir: PathBuf,
    pub wav_ext: String,
    pub lab_dir: PathBuf,
    pub lab_ext: String,
    pub pm_dir: PathBuf,
    pub pm_ext: String,
    pub mcep_dir: PathBuf,
    pub mcep_ext: String,
    pub features_dir: PathBuf,
    pub features_ext: String,
}

/// Timeline store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    pub sample_rate: u32,
    pub index_interval_secs: f64,
}

/// Unit table configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UnitsConfig {
    pub sample_rate: u32,
    pub granularity: Granularity,
}

/// Join-cost precomputation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JoinCostConfig {
    pub retain_percent: u32,
    pub retain_min: usize,
    /// 0 uses the available parallelism.
    pub workers: usize,
    /// Weights file, relative to `[database] root`; uniform linear weights when unset.
    pub weights_file: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            basenames: None,
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            wav_dir: PathBuf::from(defaults::WAV_DIR),
            wav_ext: defaults::WAV_EXT.to_string(),
            lab_dir: PathBuf::from(defaults::LAB_DIR),
            lab_ext: defaults::LAB_EXT.to_string(),
            pm_dir: PathBuf::from(defaults::PM_DIR),
            pm_ext: defaults::PM_EXT.to_string(),
            mcep_dir: PathBuf::from(defaults::MCEP_DIR),
            mcep_ext: defaults::MCEP_EXT.to_string(),
            features_dir: PathBuf::from(defaults::FEATURES_DIR),
            features_ext: defaults::FEATURES_EXT.to_string(),
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            index_interval_secs: defaults::INDEX_INTERVAL_SECS,
        }
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            granularity: Granularity::default(),
        }
    }
}

impl Default for JoinCostConfig {
    fn default() -> Self {
        Self {
            retain_percent: defaults::RETAIN_PERCENT,
            retain_min: defaults::RETAIN_MIN,
            workers: defaults::AUTO_WORKERS,
            weights_file: None,
        }
    }
}

impl DatabaseConfig {
    /// Resolves `path` against the database root unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn track(dir: PathBuf, name: &str, ext: &str) -> PathBuf {
        dir.join(format!("{name}.{}", ext.trim_start_matches('.')))
    }

    pub fn output_path(&self, file: &str) -> PathBuf {
        self.resolve(&self.output_dir).join(file)
    }

    pub fn accepted_list(&self) -> PathBuf {
        self.output_path(crate::basenames::ACCEPTED_LIST)
    }

    pub fn basenames_path(&self) -> Option<PathBuf> {
        self.basenames.as_deref().map(|p| self.resolve(p))
    }

    pub fn lab_dir(&self) -> PathBuf {
        self.resolve(&self.lab_dir)
    }

    pub fn wav_path(&self, name: &str) -> PathBuf {
        Self::track(self.resolve(&self.wav_dir), name, &self.wav_ext)
    }

    pub fn lab_path(&self, name: &str) -> PathBuf {
        Self::track(self.lab_dir(), name, &self.lab_ext)
    }

    pub fn pm_path(&self, name: &str) -> PathBuf {
        Self::track(self.resolve(&self.pm_dir), name, &self.pm_ext)
    }

    pub fn mcep_path(&self, name: &str) -> PathBuf {
        Self::track(self.resolve(&self.mcep_dir), name, &self.mcep_ext)
    }

    pub fn features_path(&self, name: &str) -> PathBuf {
        Self::track(self.resolve(&self.features_dir), name, &self.features_ext)
    }
}

impl JoinCostConfig {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            percent: self.retain_percent,
            min: self.retain_min,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoicebankError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoicebankError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| VoicebankError::ConfigParse {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoicebankError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOICEBANK_ROOT → database.root
    /// - VOICEBANK_SAMPLE_RATE → units.sample_rate and timeline.sample_rate
    /// - VOICEBANK_WORKERS → join_cost.workers
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("VOICEBANK_ROOT")
            && !root.is_empty()
        {
            self.database.root = PathBuf::from(root);
        }

        if let Ok(rate) = std::env::var("VOICEBANK_SAMPLE_RATE")
            && !rate.is_empty()
        {
            match rate.parse::<u32>() {
                Ok(rate) => {
                    self.units.sample_rate = rate;
                    self.timeline.sample_rate = rate;
                }
                Err(_) => warn!(value = %rate, "Ignoring unparsable VOICEBANK_SAMPLE_RATE"),
            }
        }

        if let Ok(workers) = std::env::var("VOICEBANK_WORKERS")
            && !workers.is_empty()
        {
            match workers.parse::<usize>() {
                Ok(workers) => self.join_cost.workers = workers,
                Err(_) => warn!(value = %workers, "Ignoring unparsable VOICEBANK_WORKERS"),
            }
        }

        self
    }

    /// Use a weights file named on the command line.
    ///
    /// Unlike `[join_cost] weights_file`, the path is taken relative to the
    /// working directory rather than to `[database] root`.
    pub fn with_weights_file(mut self, path: &Path) -> Result<Self> {
        self.join_cost.weights_file = Some(std::path::absolute(path)?);
        Ok(self)
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> VoicebankError {
            VoicebankError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.timeline.sample_rate == 0 {
            return Err(invalid("timeline.sample_rate", "must be positive"));
        }
        if self.units.sample_rate == 0 {
            return Err(invalid("units.sample_rate", "must be positive"));
        }
        let interval = self.timeline.index_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(invalid("timeline.index_interval_secs", "must be positive"));
        }
        if (interval * f64::from(self.timeline.sample_rate)).round() < 1.0 {
            return Err(invalid(
                "timeline.index_interval_secs",
                "is shorter than one sample",
            ));
        }
        if !(1..=100).contains(&self.join_cost.retain_percent) {
            return Err(invalid("join_cost.retain_percent", "must be within 1..=100"));
        }
        if self.join_cost.retain_min == 0 {
            return Err(invalid("join_cost.retain_min", "must be at least 1"));
        }
        Ok(())
    }

    /// Serialize the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoicebankError::Other(e.to_string()))
    }

    /// A commented configuration file listing every key with its default.
    pub fn dump_template() -> String {
        format!(
            r#"# voicebank configuration
#
# Relative directories are resolved against [database] root.

[database]
root = "."
# basenames = "basenames.lst"   # default: every file in lab_dir
output_dir = "{output}"
wav_dir = "{wav_dir}"
wav_ext = "{wav_ext}"
lab_dir = "{lab_dir}"
lab_ext = "{lab_ext}"
pm_dir = "{pm_dir}"
pm_ext = "{pm_ext}"
mcep_dir = "{mcep_dir}"
mcep_ext = "{mcep_ext}"
features_dir = "{features_dir}"
features_ext = "{features_ext}"

[timeline]
sample_rate = {rate}
# Spacing of index entries in seconds
index_interval_secs = {interval}

[units]
sample_rate = {rate}
# "halfphone" or "phone"
granularity = "{granularity}"

[join_cost]
# Keep max(retain_percent% of a bucket, retain_min) candidates per left unit
retain_percent = {percent}
retain_min = {min}
# 0 = one worker per available core
workers = {workers}
# weights_file = "joinCostWeights.txt"   # default: uniform linear weights
"#,
            output = defaults::OUTPUT_DIR,
            wav_dir = defaults::WAV_DIR,
            wav_ext = defaults::WAV_EXT,
            lab_dir = defaults::LAB_DIR,
            lab_ext = defaults::LAB_EXT,
            pm_dir = defaults::PM_DIR,
            pm_ext = defaults::PM_EXT,
            mcep_dir = defaults::MCEP_DIR,
            mcep_ext = defaults::MCEP_EXT,
            features_dir = defaults::FEATURES_DIR,
            features_ext = defaults::FEATURES_EXT,
            rate = defaults::SAMPLE_RATE,
            interval = defaults::INDEX_INTERVAL_SECS,
            granularity = Granularity::default(),
            percent = defaults::RETAIN_PERCENT,
            min = defaults::RETAIN_MIN,
            workers = defaults::AUTO_WORKERS,
        )
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voicebank/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voicebank").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voicebank_env() {
        remove_env("VOICEBANK_ROOT");
        remove_env("VOICEBANK_SAMPLE_RATE");
        remove_env("VOICEBANK_WORKERS");
    }

    fn write_temp(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.timeline.sample_rate, 16000);
        assert_eq!(config.timeline.index_interval_secs, 0.1);
        assert_eq!(config.units.sample_rate, 16000);
        assert_eq!(config.units.granularity, Granularity::Halfphone);
        assert_eq!(config.join_cost.retain_percent, 10);
        assert_eq!(config.join_cost.retain_min, 20);
        assert_eq!(config.join_cost.workers, 0);
        assert!(config.join_cost.weights_file.is_none());
        assert!(config.database.basenames.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [database]
            root = "/data/arctic"
            basenames = "train.lst"

            [timeline]
            sample_rate = 22050
            index_interval_secs = 0.05

            [units]
            granularity = "phone"

            [join_cost]
            retain_percent = 25
            retain_min = 5
            workers = 4
            weights_file = "weights.txt"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.database.root, PathBuf::from("/data/arctic"));
        assert_eq!(
            config.database.basenames_path(),
            Some(PathBuf::from("/data/arctic/train.lst"))
        );
        assert_eq!(config.timeline.sample_rate, 22050);
        assert_eq!(config.timeline.index_interval_secs, 0.05);
        assert_eq!(config.units.granularity, Granularity::Phone);
        assert_eq!(config.units.sample_rate, 16000);
        assert_eq!(
            config.join_cost.retention(),
            RetentionPolicy { percent: 25, min: 5 }
        );
        assert_eq!(config.join_cost.workers, 4);
    }

    #[test]
    fn test_track_paths_resolve_against_root() {
        let mut config = Config::default();
        config.database.root = PathBuf::from("/db");
        config.database.mcep_dir = PathBuf::from("/elsewhere/mcep");

        assert_eq!(config.database.lab_path("a01"), PathBuf::from("/db/lab/a01.lab"));
        assert_eq!(
            config.database.mcep_path("a01"),
            PathBuf::from("/elsewhere/mcep/a01.mcep")
        );
        assert_eq!(
            config.database.output_path("units.bin"),
            PathBuf::from("/db/mary/units.bin")
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = Config::load(Path::new("/tmp/nonexistent_voicebank_config_12345.toml"));
        assert!(matches!(
            result,
            Err(VoicebankError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_voicebank_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let temp_file = write_temp("[timeline\nsample_rate = ");
        assert!(matches!(
            Config::load(temp_file.path()),
            Err(VoicebankError::ConfigParse { .. })
        ));
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_unknown_granularity_rejected() {
        let temp_file = write_temp("[units]\ngranularity = \"diphone\"\n");
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.timeline.sample_rate = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timeline.index_interval_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timeline.index_interval_secs = 0.000_01;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.join_cost.retain_percent = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("join_cost.retain_percent"));

        let mut config = Config::default();
        config.join_cost.retain_min = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicebank_env();

        set_env("VOICEBANK_ROOT", "/corpus");
        set_env("VOICEBANK_SAMPLE_RATE", "48000");
        set_env("VOICEBANK_WORKERS", "3");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.database.root, PathBuf::from("/corpus"));
        assert_eq!(config.units.sample_rate, 48000);
        assert_eq!(config.timeline.sample_rate, 48000);
        assert_eq!(config.join_cost.workers, 3);

        clear_voicebank_env();
    }

    #[test]
    fn test_env_override_empty_or_garbage_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicebank_env();

        set_env("VOICEBANK_ROOT", "");
        set_env("VOICEBANK_WORKERS", "many");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.database.root, PathBuf::from("."));
        assert_eq!(config.join_cost.workers, 0);

        clear_voicebank_env();
    }

    #[test]
    fn test_dump_template_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::dump_template()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = Config::default();
        config.join_cost.weights_file = Some(PathBuf::from("w.txt"));
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_default_path_is_xdg_compliant() {
        if let Some(path) = Config::default_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("voicebank"));
            assert!(path_str.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_command_line_weights_ignore_the_database_root() {
        let mut config = Config::default();
        config.database.root = PathBuf::from("/data/voice");
        let config = config.with_weights_file(Path::new("weights.txt")).unwrap();
        let weights = config.join_cost.weights_file.clone().unwrap();
        assert_eq!(weights, std::env::current_dir().unwrap().join("weights.txt"));
        assert_eq!(config.database.resolve(&weights), weights);

        // the same name in the config file stays under the root
        let mut config = Config::default();
        config.database.root = PathBuf::from("/data/voice");
        config.join_cost.weights_file = Some(PathBuf::from("weights.txt"));
        let weights = config.join_cost.weights_file.as_deref().unwrap();
        assert_eq!(
            config.database.resolve(weights),
            PathBuf::from("/data/voice/weights.txt")
        );
    }
}
