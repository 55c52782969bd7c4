//! `WWW-Authenticate` challenge construction.
//!
//! A rejected request is answered with both schemes so that either kind of
//! client can retry:
//!
//! ```text
//! WWW-Authenticate: OAuth realm="<realm>"
//! WWW-Authenticate: Digest realm="<realm>", qop="auth", nonce="<base64>"[, stale="true"]
//! ```

use http::HeaderMap;
use http::header::{HeaderValue, WWW_AUTHENTICATE};
use tracing::warn;

use crate::context::AuthContext;
use crate::error::AuthError;

/// Build a Digest challenge with a nonce valid for the configured duration.
#[must_use]
pub fn digest_challenge(ctx: &AuthContext, stale: bool) -> String {
    digest_challenge_at(ctx, crate::now_millis(), stale)
}

/// Build a Digest challenge as if the current time were `now_ms`.
///
/// # Examples
///
/// ```
/// use tollgate_auth::AuthContext;
/// use tollgate_auth::challenge::digest_challenge_at;
///
/// let ctx = AuthContext::builder().realm("geo").server_key("k").build();
/// let header = digest_challenge_at(&ctx, 0, true);
/// assert!(header.starts_with(r#"Digest realm="geo", qop="auth", nonce=""#));
/// assert!(header.ends_with(r#", stale="true""#));
/// ```
#[must_use]
pub fn digest_challenge_at(ctx: &AuthContext, now_ms: i64, stale: bool) -> String {
    let expiry_time = now_ms.saturating_add(ctx.nonce_validity_millis());
    let nonce = ctx.codec.encode(expiry_time, &ctx.server_key);

    let mut header = format!(
        r#"Digest realm="{}", qop="auth", nonce="{nonce}""#,
        ctx.realm
    );
    if stale {
        header.push_str(r#", stale="true""#);
    }
    header
}

/// Build an OAuth challenge.
#[must_use]
pub fn oauth_challenge(realm: &str) -> String {
    format!(r#"OAuth realm="{realm}""#)
}

/// Build the challenge headers answering `error`.
///
/// The Digest challenge carries `stale="true"` only when the nonce expired.
#[must_use]
pub fn challenge_headers(ctx: &AuthContext, error: &AuthError) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for challenge in [
        oauth_challenge(&ctx.realm),
        digest_challenge(ctx, error.is_stale()),
    ] {
        match HeaderValue::from_str(&challenge) {
            Ok(value) => {
                headers.append(WWW_AUTHENTICATE, value);
            }
            Err(e) => warn!(realm = %ctx.realm, error = %e, "Cannot encode challenge header"),
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::NonceCodec;

    fn ctx() -> AuthContext {
        AuthContext::builder().realm("geo").server_key("k").build()
    }

    fn nonce_of(challenge: &str) -> String {
        let start = challenge.find("nonce=\"").unwrap() + "nonce=\"".len();
        let end = start + challenge[start..].find('"').unwrap();
        challenge[start..end].to_owned()
    }

    #[test]
    fn test_should_issue_nonce_expiring_after_validity() {
        let ctx = ctx();
        let header = digest_challenge_at(&ctx, 1_000, false);
        assert!(!header.contains("stale"));

        let decoded = NonceCodec::decode(&nonce_of(&header)).unwrap();
        assert_eq!(decoded.expiry_time, 1_000 + 300_000);
        assert!(ctx.codec.verify_signature(&decoded, "k"));
    }

    #[test]
    fn test_should_format_oauth_challenge() {
        assert_eq!(oauth_challenge("geo"), r#"OAuth realm="geo""#);
    }

    #[test]
    fn test_should_emit_both_challenges_oauth_first() {
        let headers = challenge_headers(&ctx(), &AuthError::CredentialMismatch);
        let values: Vec<&str> = headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0], r#"OAuth realm="geo""#);
        assert!(values[1].starts_with("Digest "));
        assert!(!values[1].contains("stale"));
    }

    #[test]
    fn test_should_mark_stale_only_for_expired_nonce() {
        let headers = challenge_headers(&ctx(), &AuthError::NonceExpired);
        let digest = headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .find(|v| v.starts_with("Digest "))
            .unwrap();
        assert!(digest.ends_with(r#"stale="true""#));

        let headers = challenge_headers(&ctx(), &AuthError::NonceTampered);
        assert!(
            headers
                .get_all(WWW_AUTHENTICATE)
                .iter()
                .all(|v| !v.to_str().unwrap().contains("stale"))
        );
    }
}
