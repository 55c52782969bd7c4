//! The authenticated caller.

use std::fmt;

use tollgate_core::ConsumerKey;

/// Scheme that authenticated a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// RFC 2617 Digest challenge/response.
    Digest,
    /// OAuth 1.0a request signing.
    OAuth,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest => f.write_str("Digest"),
            Self::OAuth => f.write_str("OAuth"),
        }
    }
}

/// Result of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Digest username or OAuth consumer key.
    pub name: String,
    /// Scheme used to authenticate.
    pub scheme: AuthScheme,
    /// Authorities reported by the identity backend.
    pub authorities: Vec<String>,
}

impl Principal {
    /// The consumer key used to partition authorization decisions.
    #[must_use]
    pub fn consumer_key(&self) -> ConsumerKey {
        ConsumerKey::new(self.name.as_str())
    }

    /// Whether the backend granted `authority` to this caller.
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}
