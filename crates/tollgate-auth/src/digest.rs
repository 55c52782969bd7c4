//! RFC 2617 Digest authentication.
//!
//! The `Authorization` header has the format:
//!
//! ```text
//! Digest username="…", realm="…", nonce="…", uri="…", response="…"[, qop=auth, nc=…, cnonce="…"]
//! ```
//!
//! Where:
//!
//! ```text
//! HA1      = md5(username:realm:password)
//! HA2      = md5(method:uri)
//! response = md5(HA1:nonce:nc:cnonce:qop:HA2)   (qop="auth")
//! response = md5(HA1:nonce:HA2)                 (no qop)
//! ```
//!
//! Verification runs in a fixed order and stops at the first failure: header
//! parsing, mandatory fields, qop fields, realm, nonce decoding, nonce
//! signature, user lookup, digest comparison (with one backend refresh for
//! cached users) and finally nonce freshness. Checking freshness last means an
//! expired nonce is only reported as stale once the credentials are known to
//! be right.

use std::sync::Arc;

use md5::{Digest, Md5};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::context::AuthContext;
use crate::credentials::{IdentityBackend, NullUserCache, UserCache, UserRecord};
use crate::error::{AuthError, IdentityError};
use crate::nonce::NonceCodec;
use crate::principal::{AuthScheme, Principal};

/// Fields of a Digest `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestCredentials {
    /// Login name.
    pub username: String,
    /// Realm the client answered for.
    pub realm: String,
    /// Server-issued nonce (base64).
    pub nonce: String,
    /// Request URI the client signed.
    pub uri: String,
    /// Client-computed response digest (hex).
    pub response: String,
    /// Quality of protection; only `auth` is supported.
    pub qop: Option<String>,
    /// Nonce count, required with `qop=auth`.
    pub nc: Option<String>,
    /// Client nonce, required with `qop=auth`.
    pub cnonce: Option<String>,
}

/// Check whether the `Authorization` header uses the Digest scheme.
#[must_use]
pub fn is_digest(auth_header: &str) -> bool {
    auth_header.starts_with("Digest ")
}

/// Parse a Digest `Authorization` header and validate its mandatory fields.
///
/// Unknown fields such as `algorithm` or `opaque` are ignored.
///
/// # Examples
///
/// ```
/// use tollgate_auth::parse_digest_header;
///
/// let creds = parse_digest_header(
///     r#"Digest username="alice", realm="R", nonce="bm9uY2U=", uri="/x", response="abc""#,
/// )
/// .unwrap();
/// assert_eq!(creds.username, "alice");
/// assert!(creds.qop.is_none());
/// ```
pub fn parse_digest_header(header: &str) -> Result<DigestCredentials, AuthError> {
    let rest = header
        .strip_prefix("Digest ")
        .ok_or_else(|| AuthError::MalformedHeader("not a Digest header".to_owned()))?;

    let mut username = None;
    let mut realm = None;
    let mut nonce = None;
    let mut uri = None;
    let mut response = None;
    let mut creds = DigestCredentials::default();

    for token in split_ignoring_quotes(rest, ',') {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let value = unquote(value.trim()).to_owned();
        match key.trim() {
            "username" => username = Some(value),
            "realm" => realm = Some(value),
            "nonce" => nonce = Some(value),
            "uri" => uri = Some(value),
            "response" => response = Some(value),
            "qop" => creds.qop = Some(value),
            "nc" => creds.nc = Some(value),
            "cnonce" => creds.cnonce = Some(value),
            _ => {}
        }
    }

    let (Some(username), Some(realm), Some(nonce), Some(uri), Some(response)) =
        (username, realm, nonce, uri, response)
    else {
        return Err(AuthError::MalformedHeader(
            "missing mandatory digest value".to_owned(),
        ));
    };
    creds.username = username;
    creds.realm = realm;
    creds.nonce = nonce;
    creds.uri = uri;
    creds.response = response;

    match creds.qop.as_deref() {
        None => {}
        Some("auth") => {
            if creds.nc.is_none() || creds.cnonce.is_none() {
                return Err(AuthError::MalformedHeader(
                    "missing mandatory digest value for qop=auth (nc or cnonce)".to_owned(),
                ));
            }
        }
        Some(other) => {
            return Err(AuthError::MalformedHeader(format!(
                "unsupported qop: {other:?}"
            )));
        }
    }

    Ok(creds)
}

/// Split `input` on `separator`, ignoring separators inside double quotes.
fn split_ignoring_quotes(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn md5_hex(data: &str) -> String {
    hex::encode(Md5::digest(data.as_bytes()))
}

/// Compute the expected Digest response for `credentials`.
///
/// `password` is the stored credential: the plain password, or `HA1` itself
/// when `password_already_encoded` is set.
pub fn compute_digest(
    credentials: &DigestCredentials,
    method: &str,
    password: &str,
    password_already_encoded: bool,
) -> Result<String, AuthError> {
    let ha1 = if password_already_encoded {
        password.to_owned()
    } else {
        md5_hex(&format!(
            "{}:{}:{password}",
            credentials.username, credentials.realm
        ))
    };
    let ha2 = md5_hex(&format!("{method}:{}", credentials.uri));

    let data = match credentials.qop.as_deref() {
        None => format!("{ha1}:{}:{ha2}", credentials.nonce),
        Some("auth") => format!(
            "{ha1}:{}:{}:{}:auth:{ha2}",
            credentials.nonce,
            credentials.nc.as_deref().unwrap_or_default(),
            credentials.cnonce.as_deref().unwrap_or_default(),
        ),
        Some(other) => {
            return Err(AuthError::MalformedHeader(format!(
                "unsupported qop: {other:?}"
            )));
        }
    };
    Ok(md5_hex(&data))
}

/// Verifies Digest `Authorization` headers.
#[derive(Debug, Clone)]
pub struct DigestVerifier {
    ctx: Arc<AuthContext>,
    identities: Arc<dyn IdentityBackend>,
    user_cache: Arc<dyn UserCache>,
}

impl DigestVerifier {
    /// Create a verifier without a user cache.
    #[must_use]
    pub fn new(ctx: Arc<AuthContext>, identities: Arc<dyn IdentityBackend>) -> Self {
        Self {
            ctx,
            identities,
            user_cache: Arc::new(NullUserCache),
        }
    }

    /// Put a user cache in front of the identity backend.
    #[must_use]
    pub fn with_user_cache(mut self, user_cache: Arc<dyn UserCache>) -> Self {
        self.user_cache = user_cache;
        self
    }

    /// Verify a Digest header for a request with the given HTTP method.
    pub fn verify(&self, method: &str, auth_header: &str) -> Result<Principal, AuthError> {
        self.verify_at(method, auth_header, crate::now_millis())
    }

    /// Verify a Digest header as if the current time were `now_ms`.
    pub fn verify_at(
        &self,
        method: &str,
        auth_header: &str,
        now_ms: i64,
    ) -> Result<Principal, AuthError> {
        let credentials = parse_digest_header(auth_header)?;

        debug!(username = %credentials.username, "Verifying Digest response");

        if credentials.realm != self.ctx.realm {
            return Err(AuthError::UnknownRealm {
                received: credentials.realm,
                expected: self.ctx.realm.clone(),
            });
        }

        let nonce = NonceCodec::decode(&credentials.nonce)?;
        if !self.ctx.codec.verify_signature(&nonce, &self.ctx.server_key) {
            debug!(username = %credentials.username, "Digest nonce signature mismatch");
            return Err(AuthError::NonceTampered);
        }

        let (mut user, from_cache) = self.lookup_user(&credentials.username)?;
        let mut expected = self.expected_response(&credentials, method, &user)?;

        if !digests_match(&expected, &credentials.response) && from_cache {
            debug!(
                username = %credentials.username,
                "Digest mismatch with cached user, reloading from backend"
            );
            user = self.load_user(&credentials.username)?;
            expected = self.expected_response(&credentials, method, &user)?;
        }

        if !digests_match(&expected, &credentials.response) {
            debug!(
                username = %credentials.username,
                expected = %expected,
                provided = %credentials.response,
                "Digest response mismatch"
            );
            return Err(AuthError::CredentialMismatch);
        }

        if nonce.is_expired_at(now_ms) {
            debug!(
                username = %credentials.username,
                expiry_time = nonce.expiry_time,
                "Digest nonce expired"
            );
            return Err(AuthError::NonceExpired);
        }

        if !user.active {
            return Err(AuthError::AccountDisabled(user.username));
        }

        debug!(username = %user.username, "Digest verification succeeded");
        Ok(Principal {
            name: user.username,
            scheme: AuthScheme::Digest,
            authorities: user.groups,
        })
    }

    fn expected_response(
        &self,
        credentials: &DigestCredentials,
        method: &str,
        user: &UserRecord,
    ) -> Result<String, AuthError> {
        compute_digest(
            credentials,
            method,
            &user.password,
            self.ctx.password_already_encoded,
        )
    }

    fn lookup_user(&self, username: &str) -> Result<(UserRecord, bool), AuthError> {
        match self.user_cache.get(username) {
            Some(user) => Ok((user, true)),
            None => Ok((self.load_user(username)?, false)),
        }
    }

    fn load_user(&self, username: &str) -> Result<UserRecord, AuthError> {
        let user = self
            .identities
            .load_user(username)
            .map_err(|e| match e {
                IdentityError::NotFound(name) => AuthError::UserNotFound(name),
                IdentityError::Unavailable(reason) => AuthError::BackendUnavailable(reason),
            })?;
        self.user_cache.put(user.clone());
        Ok(user)
    }
}

fn digests_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
