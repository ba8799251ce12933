use std::path::PathBuf;

use thiserror::Error;

/// Validation errors for domain values exposed by `tickfuse-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("instrument code cannot be empty")]
    EmptyCode,
    #[error("instrument code must contain exactly six digits: '{value}'")]
    InvalidCodeDigits { value: String },
    #[error("unknown exchange marker '{value}', expected sh/sz or SS/SH/SZ suffix")]
    UnknownExchange { value: String },

    #[error("invalid source '{value}', expected one of eastmoney, sina, yahoo")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("trading date must be YYYY-MM-DD: '{value}'")]
    InvalidTradingDate { value: String },

    #[error("index name cannot be empty for code '{code}'")]
    EmptyIndexName { code: String },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("environment variable {var} has invalid value '{value}'")]
    Env { var: &'static str, value: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
