//! Authentication error types.

/// Reasons a Digest nonce could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    /// The nonce is not valid base64 (or does not decode to UTF-8 text).
    #[error("nonce is not base64 encoded")]
    NotBase64,

    /// The decoded nonce does not have exactly two colon-delimited tokens.
    #[error("nonce should have yielded two tokens but was {0}")]
    WrongTokenCount(usize),

    /// The expiry token is not an integer.
    #[error("nonce expiry {0:?} is not numeric")]
    NonNumericExpiry(String),
}

/// Errors reported by an identity backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// No user or consumer with that name exists.
    #[error("identity not found: {0}")]
    NotFound(String),

    /// The backend could not be reached or failed.
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while authenticating a request.
///
/// Every variant is terminal for the request; the caller should be answered
/// with a fresh challenge (see [`crate::challenge_headers`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header and no OAuth request parameters.
    #[error("missing authorization")]
    MissingAuthHeader,

    /// The `Authorization` header or OAuth parameters are malformed.
    #[error("malformed authorization: {0}")]
    MalformedHeader(String),

    /// The Digest nonce could not be decoded.
    #[error("malformed nonce: {0}")]
    MalformedNonce(#[from] NonceError),

    /// The request URL could not be rebuilt for signature verification.
    #[error("invalid request URL: {0}")]
    InvalidRequestUrl(String),

    /// The Digest realm does not match the configured realm.
    #[error("response realm name {received:?} does not match system realm name of {expected:?}")]
    UnknownRealm {
        /// Realm sent by the client.
        received: String,
        /// Realm this gateway announces.
        expected: String,
    },

    /// The nonce signature does not match the server key.
    #[error("nonce token compromised")]
    NonceTampered,

    /// The nonce was valid but has expired.
    #[error("nonce has expired")]
    NonceExpired,

    /// The Digest username is not known.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The account exists but is not active.
    #[error("account is disabled: {0}")]
    AccountDisabled(String),

    /// The Digest response or OAuth signature does not match.
    #[error("credentials do not match")]
    CredentialMismatch,

    /// The OAuth consumer key is not known.
    #[error("unknown consumer: {0}")]
    UnknownConsumer(String),

    /// The OAuth signature method is not supported.
    #[error("unsupported signature method: {0}")]
    UnsupportedSignatureMethod(String),

    /// The OAuth version is not `1.0`.
    #[error("unsupported oauth_version: {0}")]
    UnsupportedVersion(String),

    /// The OAuth timestamp is outside the accepted window.
    #[error("timestamp refused: {timestamp} is not within the window of {now}")]
    TimestampRefused {
        /// Timestamp sent by the client, in epoch seconds.
        timestamp: i64,
        /// Server time, in epoch seconds.
        now: i64,
    },

    /// The OAuth nonce has already been used.
    #[error("nonce already used")]
    NonceReplayed,

    /// The identity backend failed.
    #[error("identity backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl AuthError {
    /// Whether the failure should be answered with `stale="true"` so the
    /// client retries with a new nonce without prompting for credentials.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::NonceExpired)
    }
}
