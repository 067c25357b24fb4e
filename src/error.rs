//! Errors reported by the engine and the mapping cache.
//!
//! None of the run-time variants are fatal: the engine delivers them on the
//! run's error channel and keeps processing every other key.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to map {key}: {cause}")]
    Map {
        key: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("failed to reduce {key}: {cause}")]
    Reduce {
        key: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("expected type {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("failed to encode to cache key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode from cache for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache persistence failed: {0}")]
    Persist(#[source] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn map(key: impl Into<String>, cause: anyhow::Error) -> Self {
        Error::Map {
            key: key.into(),
            cause,
        }
    }

    pub(crate) fn reduce(key: impl Into<String>, cause: anyhow::Error) -> Self {
        Error::Reduce {
            key: key.into(),
            cause,
        }
    }

    /// The input or reduce key the error was raised for, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Map { key, .. }
            | Error::Reduce { key, .. }
            | Error::Encode { key, .. }
            | Error::Decode { key, .. } => Some(key),
            Error::TypeMismatch { .. } | Error::Persist(_) | Error::Io(_) => None,
        }
    }
}
