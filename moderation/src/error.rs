//! Error types for the decision core.

use thiserror::Error;

/// Configuration is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("level_thresholds must be strictly increasing within (0, 1], got {0:?}")]
    LevelThresholds([f64; 4]),

    #[error("extractor weight for '{name}' must be finite and >= 0, got {weight}")]
    InvalidWeight { name: String, weight: f64 },

    #[error("extractor_weights must contain at least one positive weight")]
    NoActiveExtractors,

    #[error("unknown extractor '{0}' (known: profanity, pattern, sentiment)")]
    UnknownExtractor(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Complaint content cannot be moderated. Reprocessing will not help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("complaint body is empty")]
    Empty,

    #[error("complaint body contains no text")]
    NonText,

    #[error("complaint text too short: {chars} chars (minimum {min})")]
    TooShort { chars: usize, min: usize },

    #[error("malformed complaint markup: {0}")]
    MalformedMarkup(String),
}

/// Internal extractor failure. Never leaves the extractor: it is turned into
/// an unavailable score.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractorError {
    #[error("input is empty")]
    EmptyInput,

    #[error("input of {len} bytes exceeds limit of {limit}")]
    InputTooLarge { len: usize, limit: usize },

    #[error("pattern matcher unavailable: {0}")]
    Pattern(String),
}
