//! Authorization error types.

use std::time::Duration;

use tollgate_core::{ConsumerKey, ModuleName};

/// Failures reported by a permission backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The lookup did not finish within the configured timeout.
    #[error("permission backend timed out after {0:?}")]
    Timeout(Duration),

    /// The backend could not be reached or failed.
    #[error("permission backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the decision cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// A cache miss could not be resolved; the decision is indeterminate.
    #[error("authorization of {consumer} in module {module} is indeterminate: {source}")]
    BackendUnavailable {
        /// Module being queried.
        module: ModuleName,
        /// Consumer being queried.
        consumer: ConsumerKey,
        /// Underlying backend failure.
        #[source]
        source: BackendError,
    },

    /// The cached service was invalidated by a module event while answering.
    /// Retrying against [`crate::DecisionCache`] resolves a fresh service.
    #[error("cached decisions of {consumer} in module {module} were invalidated")]
    Invalidated {
        /// Module being queried.
        module: ModuleName,
        /// Consumer being queried.
        consumer: ConsumerKey,
    },

    /// A module event named an unknown action.
    #[error("unknown module action: {0}")]
    UnknownModuleAction(String),
}

/// Convenience result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;
