//! Error types for the publish pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Error returned by [`crate::contract::ThingApi`] implementations.
///
/// Kept boxed at the trait seam so HTTP clients and test doubles can surface
/// their own error types without the core crate knowing about transports.
pub type ApiError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for [`crate::contract::ThingApi`] calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Everything that can abort a publish run.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A remote call failed (transport error or non-2xx response).
    #[error("remote call failed during {step}: {source}")]
    Api {
        step: &'static str,
        #[source]
        source: ApiError,
    },

    /// More than one remote thing carries the configured name.
    #[error("{} remote things are named {name:?} (ids: {ids:?}); set thing.id in the project config to pick one", ids.len())]
    ConflictingThings { name: String, ids: Vec<u64> },

    /// A credential is absent from both config layers and CLI overrides.
    #[error("missing credential: {0} (set it in the user config or pass it on the command line)")]
    MissingCredential(&'static str),

    /// A remote attachment carries a timestamp we cannot compare against.
    #[error("remote {field:?} timestamp for {path} is missing or unparsable: {value:?}")]
    InvalidTimestamp {
        path: String,
        field: &'static str,
        value: Option<String>,
    },

    /// A remote response lacks a field the publish flow depends on.
    #[error("{context} response is missing {field:?}")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub(crate) fn api(step: &'static str) -> impl FnOnce(ApiError) -> Self {
        move |source| PublishError::Api { step, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PublishError::Io { path, source }
    }
}
