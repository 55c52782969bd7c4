//! End-to-end scenarios for Tollgate.
//!
//! Each scenario wires the authenticator and the decision cache together in
//! process, the same way `tollgate-server` does, and drives them with
//! requests built by a well-behaved client. No running server is needed:
//!
//! ```text
//! cargo test -p tollgate-integration
//! ```

use std::sync::{Arc, Once};
use std::time::Duration;

use tollgate_auth::canonical::{parse_form, percent_encode};
use tollgate_auth::digest::compute_digest;
use tollgate_auth::{
    AuthContext, Authenticator, DigestCredentials, InMemoryUserCache, ReplayGuard,
    StaticIdentityBackend,
};

static INIT: Once = Once::new();

/// Realm used by every scenario.
pub const REALM: &str = "tollgate-it";

/// Server key used by every scenario.
pub const SERVER_KEY: &str = "integration-secret";

/// Host the scenarios address.
pub const HOST: &str = "api.tollgate.test";

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Shared authentication settings.
#[must_use]
pub fn auth_context() -> Arc<AuthContext> {
    Arc::new(
        AuthContext::builder()
            .realm(REALM)
            .server_key(SERVER_KEY)
            .build(),
    )
}

/// An authenticator knowing `c1`/`p1` (USER) and `root`/`r00t` (ADMIN).
#[must_use]
pub fn authenticator() -> Authenticator {
    init_tracing();
    let identities = StaticIdentityBackend::new()
        .with_account("c1", "p1", ["USER"])
        .with_account("root", "r00t", ["ADMIN"]);
    Authenticator::new(auth_context(), Arc::new(identities))
        .with_user_cache(Arc::new(InMemoryUserCache::new(Duration::from_secs(60))))
        .with_replay_guard(Arc::new(ReplayGuard::new(Duration::from_secs(300))))
}

/// Current time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build a Digest `Authorization` header the way a browser would, for a
/// nonce expiring at `expiry_ms`.
#[must_use]
pub fn digest_authorization(
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
    expiry_ms: i64,
) -> String {
    let mut credentials = DigestCredentials {
        username: username.to_owned(),
        realm: REALM.to_owned(),
        nonce: auth_context().codec.encode(expiry_ms, SERVER_KEY),
        uri: uri.to_owned(),
        response: String::new(),
        qop: Some("auth".to_owned()),
        nc: Some("00000001".to_owned()),
        cnonce: Some("0a4f113b".to_owned()),
    };
    credentials.response = compute_digest(&credentials, method, password, false)
        .unwrap_or_default();
    format!(
        r#"Digest username="{}", realm="{}", nonce="{}", uri="{uri}", qop=auth, nc=00000001, cnonce="0a4f113b", response="{}""#,
        credentials.username, credentials.realm, credentials.nonce, credentials.response
    )
}

/// Move the OAuth parameters of a signed URL into an `OAuth` header.
///
/// Returns the URL without its protocol parameters and the header.
#[must_use]
pub fn oauth_header_from_signed_url(signed_url: &str) -> (String, String) {
    let (base, query) = signed_url.split_once('?').unwrap_or((signed_url, ""));
    let (protocol, rest): (Vec<_>, Vec<_>) = parse_form(query)
        .into_iter()
        .partition(|p| p.key.starts_with("oauth_"));

    let header = protocol
        .iter()
        .map(|p| format!(r#"{}="{}""#, p.key, percent_encode(&p.value)))
        .collect::<Vec<_>>()
        .join(", ");
    let header = format!(r#"OAuth realm="{REALM}", {header}"#);

    let url = if rest.is_empty() {
        base.to_owned()
    } else {
        let query = rest
            .iter()
            .map(|p| format!("{}={}", percent_encode(&p.key), percent_encode(&p.value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{base}?{query}")
    };
    (url, header)
}

/// Split a request into its head, as the server sees it.
#[must_use]
pub fn parts(request: http::Request<()>) -> http::request::Parts {
    request.into_parts().0
}

mod test_decision_cache;
mod test_digest;
mod test_oauth;
