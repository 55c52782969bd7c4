//! OAuth 1.0a signature computation and verification.
//!
//! Only two-legged requests are handled: the consumer signs with its own
//! secret and an empty token secret.
//!
//! ```text
//! HMAC-SHA1: signature = base64(HMAC-SHA1(key, base_string))
//! PLAINTEXT: signature = key
//! key       = percent_encode(consumer_secret) + "&" + percent_encode(token_secret)
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, KeyInit, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::{OAuthParameter, normalize_url, percent_encode, signature_base_string};
use crate::context::AuthContext;
use crate::credentials::IdentityBackend;
use crate::error::{AuthError, IdentityError};
use crate::principal::{AuthScheme, Principal};
use crate::replay::ReplayGuard;

type HmacSha1 = Hmac<Sha1>;

/// The only protocol version accepted.
pub const OAUTH_VERSION: &str = "1.0";

/// Supported signature methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureMethod {
    /// `HMAC-SHA1`.
    HmacSha1,
    /// `PLAINTEXT`.
    PlainText,
}

impl SignatureMethod {
    /// Wire name of the method.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::PlainText => "PLAINTEXT",
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HMAC-SHA1" => Ok(Self::HmacSha1),
            "PLAINTEXT" => Ok(Self::PlainText),
            other => Err(AuthError::UnsupportedSignatureMethod(other.to_owned())),
        }
    }
}

/// Compute a signature over `base_string`.
///
/// # Examples
///
/// ```
/// use tollgate_auth::SignatureMethod;
/// use tollgate_auth::oauth::compute_signature;
///
/// let plain = compute_signature(SignatureMethod::PlainText, "ignored", "shh", "");
/// assert_eq!(plain, "shh&");
/// ```
#[must_use]
pub fn compute_signature(
    method: SignatureMethod,
    base_string: &str,
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    match method {
        SignatureMethod::HmacSha1 => {
            let mut mac =
                HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC can accept any key length");
            mac.update(base_string.as_bytes());
            BASE64.encode(mac.finalize().into_bytes())
        }
        SignatureMethod::PlainText => key,
    }
}

/// Endpoints of an OAuth service provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProvider {
    /// Where request tokens are obtained.
    pub request_token_url: String,
    /// Where users authorize request tokens.
    pub user_authorization_url: String,
    /// Where access tokens are obtained.
    pub access_token_url: String,
}

/// A registered OAuth consumer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConsumer {
    key: String,
    secret: String,
    callback_url: Option<String>,
    service_provider: Option<ServiceProvider>,
}

impl OAuthConsumer {
    /// Create a consumer with a key and shared secret.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            callback_url: None,
            service_provider: None,
        }
    }

    /// Set the callback URL.
    #[must_use]
    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }

    /// Set the service provider endpoints.
    #[must_use]
    pub fn with_service_provider(mut self, service_provider: ServiceProvider) -> Self {
        self.service_provider = Some(service_provider);
        self
    }

    /// Consumer key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shared secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Callback URL, if any.
    #[must_use]
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    /// Service provider endpoints, if any.
    #[must_use]
    pub fn service_provider(&self) -> Option<&ServiceProvider> {
        self.service_provider.as_ref()
    }
}

/// A request to be signed or verified, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthMessage {
    /// HTTP method.
    pub method: String,
    /// Absolute request URL. Query parameters in the URL are signed too.
    pub url: String,
    /// Parameters from the header, query and form body.
    pub parameters: Vec<OAuthParameter>,
}

impl OAuthMessage {
    /// Create a message.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        parameters: Vec<OAuthParameter>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            parameters,
        }
    }

    /// First value of the named parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Whether the message carries a signature.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.parameter(crate::canonical::OAUTH_SIGNATURE).is_some()
    }

    /// Signature base string of the message.
    pub fn base_string(&self) -> Result<String, AuthError> {
        signature_base_string(&self.method, &self.url, &self.parameters)
    }

    fn require(&self, key: &str) -> Result<&str, AuthError> {
        self.parameter(key)
            .ok_or_else(|| AuthError::MalformedHeader(format!("missing parameter {key}")))
    }

    fn reject_duplicate_protocol_parameters(&self) -> Result<(), AuthError> {
        let mut seen = HashSet::new();
        for p in self.parameters.iter().filter(|p| p.key.starts_with("oauth_")) {
            if !seen.insert(p.key.as_str()) {
                return Err(AuthError::MalformedHeader(format!(
                    "duplicate parameter {}",
                    p.key
                )));
            }
        }
        Ok(())
    }
}

/// Verifies OAuth-signed requests.
#[derive(Debug, Clone)]
pub struct OAuthVerifier {
    ctx: Arc<AuthContext>,
    identities: Arc<dyn IdentityBackend>,
    replay_guard: Option<Arc<ReplayGuard>>,
}

impl OAuthVerifier {
    /// Create a verifier without replay protection.
    #[must_use]
    pub fn new(ctx: Arc<AuthContext>, identities: Arc<dyn IdentityBackend>) -> Self {
        Self {
            ctx,
            identities,
            replay_guard: None,
        }
    }

    /// Reject nonces already seen by `guard`.
    #[must_use]
    pub fn with_replay_guard(mut self, guard: Arc<ReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    /// Verify a message against the current time.
    pub fn verify(&self, message: &OAuthMessage) -> Result<Principal, AuthError> {
        self.verify_at(message, crate::now_millis() / 1000)
    }

    /// Verify a message as if the current time were `now_secs` (epoch seconds).
    pub fn verify_at(&self, message: &OAuthMessage, now_secs: i64) -> Result<Principal, AuthError> {
        message.reject_duplicate_protocol_parameters()?;

        if let Some(version) = message.parameter("oauth_version") {
            if version != OAUTH_VERSION {
                return Err(AuthError::UnsupportedVersion(version.to_owned()));
            }
        }

        let consumer_key = message.require("oauth_consumer_key")?;
        let provided = message.require(crate::canonical::OAUTH_SIGNATURE)?;
        let method: SignatureMethod = message.require("oauth_signature_method")?.parse()?;
        let nonce = message.require("oauth_nonce")?;
        let timestamp = message.require("oauth_timestamp")?;
        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::MalformedHeader(format!("invalid timestamp {timestamp:?}")))?;

        if now_secs.abs_diff(timestamp) > self.ctx.oauth_timestamp_window.as_secs() {
            return Err(AuthError::TimestampRefused {
                timestamp,
                now: now_secs,
            });
        }

        debug!(consumer_key = %consumer_key, method = %method, "Verifying OAuth signature");

        let consumer = self
            .identities
            .lookup_consumer(consumer_key)
            .map_err(|e| match e {
                IdentityError::NotFound(key) => AuthError::UnknownConsumer(key),
                IdentityError::Unavailable(reason) => AuthError::BackendUnavailable(reason),
            })?;

        let base_string = message.base_string()?;
        debug!(base_string = %base_string, "Built OAuth signature base string");

        let expected = compute_signature(method, &base_string, &consumer.secret, "");
        if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            debug!(
                consumer_key = %consumer_key,
                expected = %expected,
                provided = %provided,
                "OAuth signature mismatch"
            );
            return Err(AuthError::CredentialMismatch);
        }

        if let Some(guard) = &self.replay_guard {
            if !guard.check_and_record(consumer_key, nonce, timestamp, now_secs) {
                debug!(consumer_key = %consumer_key, nonce = %nonce, "OAuth nonce replayed");
                return Err(AuthError::NonceReplayed);
            }
        }

        debug!(consumer_key = %consumer_key, "OAuth verification succeeded");
        Ok(Principal {
            name: consumer.consumer_key,
            scheme: AuthScheme::OAuth,
            authorities: consumer.authorities,
        })
    }
}

/// Add the OAuth protocol parameters and an HMAC-SHA1 signature to `url`.
///
/// Existing query parameters are kept and signed. The result can be sent
/// as-is by a client holding `consumer_key` and `consumer_secret`.
pub fn sign_url(
    method: &str,
    url: &str,
    consumer_key: &str,
    consumer_secret: &str,
) -> Result<String, AuthError> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    sign_url_at(
        method,
        url,
        consumer_key,
        consumer_secret,
        crate::now_millis() / 1000,
        &nonce,
    )
}

/// [`sign_url`] with an explicit timestamp and nonce.
pub fn sign_url_at(
    method: &str,
    url: &str,
    consumer_key: &str,
    consumer_secret: &str,
    timestamp: i64,
    nonce: &str,
) -> Result<String, AuthError> {
    let (_, mut parameters) = normalize_url(url)?;
    let protocol = [
        ("oauth_consumer_key", consumer_key.to_owned()),
        (
            "oauth_signature_method",
            SignatureMethod::HmacSha1.as_str().to_owned(),
        ),
        ("oauth_timestamp", timestamp.to_string()),
        ("oauth_nonce", nonce.to_owned()),
        ("oauth_version", OAUTH_VERSION.to_owned()),
    ];
    parameters.extend(protocol.into_iter().map(|(k, v)| OAuthParameter::new(k, v)));

    let base_url = url.split_once('?').map_or(url, |(base, _)| base);
    let base_string = signature_base_string(method, base_url, &parameters)?;
    let signature = compute_signature(
        SignatureMethod::HmacSha1,
        &base_string,
        consumer_secret,
        "",
    );
    parameters.push(OAuthParameter::new(
        crate::canonical::OAUTH_SIGNATURE,
        signature,
    ));

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(parameters.iter().map(|p| (p.key.as_str(), p.value.as_str())))
        .finish();
    Ok(format!("{base_url}?{query}"))
}
