//! Error types for the pricing core

use thiserror::Error;

use crate::types::{StrategyKind, UnitId};

/// A single unit's update failed. The ledger is left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("unit {unit}: {field} is not finite")]
    NonFiniteInput { unit: UnitId, field: &'static str },

    #[error("unit {unit}: capacity must be positive, got {capacity}")]
    InvalidCapacity { unit: UnitId, capacity: i64 },

    #[error("unit {unit}: {strategy} strategy produced a non-finite price")]
    NonFinitePrice { unit: UnitId, strategy: StrategyKind },
}

/// Configuration could not be parsed or is out of range.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures reading feature records or writing price records.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: cannot decode feature record: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: not valid UTF-8: {source}")]
    Utf8 {
        line: usize,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("cannot encode price record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FeedError {
    /// Decode failures affect one record; the stream can continue past them.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FeedError::Decode { .. } | FeedError::Utf8 { .. })
    }
}
