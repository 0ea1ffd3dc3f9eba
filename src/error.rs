//! Error types for voicebank.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoicebankError {
    // Container / binary format errors
    #[error("Invalid file format: {message}")]
    Format { message: String },

    #[error("Wrong content type: expected {expected}, found {actual}")]
    WrongContentType { expected: String, actual: String },

    // Cross-file consistency errors
    #[error("Feature schema mismatch in utterance '{utterance}': {message}")]
    SchemaMismatch { utterance: String, message: String },

    #[error("Alignment error in utterance '{utterance}' at unit {index}: {message}")]
    Alignment {
        utterance: String,
        index: usize,
        message: String,
    },

    #[error("Invalid store state: {message}")]
    ResourceState { message: String },

    // Upstream text artifacts
    #[error("Malformed feature dump for '{utterance}' at line {line}: {message}")]
    Dump {
        utterance: String,
        line: usize,
        message: String,
    },

    #[error("Malformed track file {path}: {message}")]
    Track { path: String, message: String },

    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Audio input
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoicebankError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::ResourceState {
            message: message.into(),
        }
    }

    pub(crate) fn alignment(utterance: &str, index: usize, message: impl Into<String>) -> Self {
        Self::Alignment {
            utterance: utterance.to_string(),
            index,
            message: message.into(),
        }
    }

    /// Name of the utterance this error points at, when it carries one.
    pub fn utterance(&self) -> Option<&str> {
        match self {
            Self::SchemaMismatch { utterance, .. }
            | Self::Alignment { utterance, .. }
            | Self::Dump { utterance, .. } => Some(utterance),
            _ => None,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoicebankError>;
