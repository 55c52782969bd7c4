//! HTTP Digest and OAuth 1.0a request authentication for Tollgate.
//!
//! This crate verifies inbound requests signed with either RFC 2617 Digest
//! challenge/response or two-legged OAuth 1.0a (HMAC-SHA1 or PLAINTEXT). A
//! successful verification yields a [`Principal`] naming the consumer.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tollgate_auth::{AuthContext, Authenticator, StaticIdentityBackend};
//!
//! let ctx = Arc::new(AuthContext::builder().realm("geo").server_key("s3cr3t").build());
//! let identities = StaticIdentityBackend::new().with_account("c1", "p1", ["USER"]);
//! let authenticator = Authenticator::new(ctx, Arc::new(identities));
//!
//! // Call `authenticator.authenticate(&parts, &body)` for each request and
//! // answer failures with `authenticator.challenge_headers(&err)`.
//! # let _ = authenticator;
//! ```
//!
//! # Modules
//!
//! - [`authenticator`] - Scheme dispatch over an incoming request
//! - [`canonical`] - OAuth parameter collection and base string construction
//! - [`challenge`] - `WWW-Authenticate` challenge construction
//! - [`context`] - Explicit authentication settings
//! - [`credentials`] - Identity backend and user cache traits
//! - [`digest`] - Digest header parsing and verification
//! - [`error`] - Authentication error types
//! - [`nonce`] - Digest nonce wire format
//! - [`oauth`] - OAuth signature computation and verification
//! - [`principal`] - The authenticated caller
//! - [`replay`] - OAuth nonce replay protection

pub mod authenticator;
pub mod canonical;
pub mod challenge;
pub mod context;
pub mod credentials;
pub mod digest;
pub mod error;
pub mod nonce;
pub mod oauth;
pub mod principal;
pub mod replay;

pub use authenticator::Authenticator;
pub use challenge::{challenge_headers, digest_challenge, oauth_challenge};
pub use context::AuthContext;
pub use credentials::{
    ConsumerRecord, IdentityBackend, InMemoryUserCache, NullUserCache, StaticIdentityBackend,
    UserCache, UserRecord,
};
pub use digest::{DigestCredentials, DigestVerifier, parse_digest_header};
pub use error::{AuthError, IdentityError, NonceError};
pub use nonce::{DecodedNonce, Md5NonceSigner, NonceCodec, NonceSigner};
pub use oauth::{OAuthConsumer, OAuthMessage, OAuthVerifier, SignatureMethod, sign_url};
pub use principal::{AuthScheme, Principal};
pub use replay::ReplayGuard;

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
