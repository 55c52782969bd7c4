//! Explicit authentication settings.

use std::time::Duration;

use tollgate_core::TollgateConfig;
use typed_builder::TypedBuilder;

use crate::nonce::NonceCodec;

/// Settings shared by the Digest and OAuth verifiers.
///
/// Built once at startup and passed by reference; there is no global state.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tollgate_auth::AuthContext;
///
/// let ctx = AuthContext::builder()
///     .realm("geo")
///     .server_key("s3cr3t")
///     .nonce_validity(Duration::from_secs(60))
///     .build();
/// assert_eq!(ctx.realm, "geo");
/// assert!(!ctx.password_already_encoded);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct AuthContext {
    /// Realm announced in challenges and required in Digest responses.
    #[builder(setter(into))]
    pub realm: String,

    /// Secret mixed into every nonce signature.
    #[builder(setter(into))]
    pub server_key: String,

    /// How long an issued nonce stays fresh.
    #[builder(default = Duration::from_secs(300))]
    pub nonce_validity: Duration,

    /// Whether stored passwords are already `md5(username:realm:password)`.
    #[builder(default = false)]
    pub password_already_encoded: bool,

    /// Accepted clock skew for `oauth_timestamp`.
    #[builder(default = Duration::from_secs(300))]
    pub oauth_timestamp_window: Duration,

    /// Externally visible base URL used to rebuild request URLs.
    #[builder(default, setter(strip_option, into))]
    pub public_url: Option<String>,

    /// Nonce encoder and signature checker.
    #[builder(default)]
    pub codec: NonceCodec,
}

impl AuthContext {
    /// Build the authentication settings from the process configuration.
    #[must_use]
    pub fn from_config(config: &TollgateConfig) -> Self {
        Self {
            realm: config.realm.clone(),
            server_key: config.server_key.clone(),
            nonce_validity: Duration::from_secs(config.nonce_validity_secs),
            password_already_encoded: config.password_already_encoded,
            oauth_timestamp_window: Duration::from_secs(config.oauth_timestamp_window_secs),
            public_url: config.public_url.clone(),
            codec: NonceCodec::default(),
        }
    }

    /// Nonce validity in milliseconds, saturating at `i64::MAX`.
    #[must_use]
    pub fn nonce_validity_millis(&self) -> i64 {
        i64::try_from(self.nonce_validity.as_millis()).unwrap_or(i64::MAX)
    }
}
