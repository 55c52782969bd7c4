//! Error types for the Tollgate core.

/// Core error type for Tollgate infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum TollgateError {
    /// Invalid module name.
    #[error("invalid module name: {0:?} (must be non-empty and must not contain '/')")]
    InvalidModuleName(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for Tollgate operations.
pub type TollgateResult<T> = Result<T, TollgateError>;
