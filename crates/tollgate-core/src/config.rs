//! Gateway configuration.
//!
//! Provides [`TollgateConfig`] for configuring authentication and the
//! authorization decision cache. Values are loaded from environment
//! variables.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{TollgateError, TollgateResult};

/// Tollgate configuration.
///
/// All fields have defaults. Configuration can be loaded from environment
/// variables via [`TollgateConfig::from_env`].
///
/// # Examples
///
/// ```
/// use tollgate_core::TollgateConfig;
///
/// let config = TollgateConfig::default();
/// assert_eq!(config.realm, "tollgate");
/// assert_eq!(config.decision_max_age_secs, 900);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct TollgateConfig {
    /// Bind address for the HTTP server (e.g. `"0.0.0.0:8080"`).
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub listen: String,

    /// Authentication realm announced in challenges.
    #[builder(default = String::from("tollgate"))]
    pub realm: String,

    /// Secret mixed into every Digest nonce signature.
    #[builder(default = random_server_key())]
    #[serde(skip_serializing, default = "random_server_key")]
    pub server_key: String,

    /// How long an issued Digest nonce stays fresh, in seconds.
    #[builder(default = 300)]
    pub nonce_validity_secs: u64,

    /// Whether stored passwords are already `md5(username:realm:password)`.
    #[builder(default = false)]
    pub password_already_encoded: bool,

    /// Accepted clock skew for `oauth_timestamp`, in seconds.
    #[builder(default = 300)]
    pub oauth_timestamp_window_secs: u64,

    /// Whether reused OAuth nonces are rejected.
    #[builder(default = true)]
    pub oauth_replay_protection: bool,

    /// Absolute lifetime of a cached authorization service, in seconds.
    #[builder(default = 900)]
    pub decision_max_age_secs: u64,

    /// Upper bound on a single permission backend lookup, in milliseconds.
    #[builder(default = 5000)]
    pub backend_timeout_ms: u64,

    /// How long a user record stays in the Digest user cache, in seconds.
    #[builder(default = 300)]
    pub user_cache_ttl_secs: u64,

    /// Externally visible base URL (e.g. `"https://api.example.com"`), used
    /// when rebuilding request URLs for OAuth signature checks behind a proxy.
    #[builder(default)]
    pub public_url: Option<String>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            listen: String::from("0.0.0.0:8080"),
            realm: String::from("tollgate"),
            server_key: random_server_key(),
            nonce_validity_secs: 300,
            password_already_encoded: false,
            oauth_timestamp_window_secs: 300,
            oauth_replay_protection: true,
            decision_max_age_secs: 900,
            backend_timeout_ms: 5000,
            user_cache_ttl_secs: 300,
            public_url: None,
            log_level: String::from("info"),
        }
    }
}

impl TollgateConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TOLLGATE_LISTEN` | `0.0.0.0:8080` |
    /// | `TOLLGATE_REALM` | `tollgate` |
    /// | `TOLLGATE_SERVER_KEY` | random per process |
    /// | `TOLLGATE_NONCE_VALIDITY_SECS` | `300` |
    /// | `TOLLGATE_PASSWORD_ALREADY_ENCODED` | `false` |
    /// | `TOLLGATE_OAUTH_TIMESTAMP_WINDOW_SECS` | `300` |
    /// | `TOLLGATE_OAUTH_REPLAY_PROTECTION` | `true` |
    /// | `TOLLGATE_DECISION_MAX_AGE_SECS` | `900` |
    /// | `TOLLGATE_BACKEND_TIMEOUT_MS` | `5000` |
    /// | `TOLLGATE_USER_CACHE_TTL_SECS` | `300` |
    /// | `TOLLGATE_PUBLIC_URL` | unset |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// A numeric or boolean variable that does not parse is a
    /// [`TollgateError::Config`] error.
    ///
    /// # Errors
    ///
    /// Returns [`TollgateError::Config`] naming the offending variable.
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate_core::TollgateConfig;
    ///
    /// let config = TollgateConfig::from_env().unwrap();
    /// assert!(!config.listen.is_empty());
    /// ```
    pub fn from_env() -> TollgateResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration from `var`, which maps a variable name to its
    /// value the way [`std::env::var`] does.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> TollgateResult<Self> {
        let mut config = Self::default();

        if let Some(v) = var("TOLLGATE_LISTEN") {
            config.listen = v;
        }
        if let Some(v) = var("TOLLGATE_REALM") {
            config.realm = v;
        }
        if let Some(v) = var("TOLLGATE_SERVER_KEY").filter(|v| !v.is_empty()) {
            config.server_key = v;
        }
        if let Some(v) = var("TOLLGATE_NONCE_VALIDITY_SECS") {
            config.nonce_validity_secs = parse_u64("TOLLGATE_NONCE_VALIDITY_SECS", &v)?;
        }
        if let Some(v) = var("TOLLGATE_PASSWORD_ALREADY_ENCODED") {
            config.password_already_encoded = parse_bool("TOLLGATE_PASSWORD_ALREADY_ENCODED", &v)?;
        }
        if let Some(v) = var("TOLLGATE_OAUTH_TIMESTAMP_WINDOW_SECS") {
            config.oauth_timestamp_window_secs =
                parse_u64("TOLLGATE_OAUTH_TIMESTAMP_WINDOW_SECS", &v)?;
        }
        if let Some(v) = var("TOLLGATE_OAUTH_REPLAY_PROTECTION") {
            config.oauth_replay_protection = parse_bool("TOLLGATE_OAUTH_REPLAY_PROTECTION", &v)?;
        }
        if let Some(v) = var("TOLLGATE_DECISION_MAX_AGE_SECS") {
            config.decision_max_age_secs = parse_u64("TOLLGATE_DECISION_MAX_AGE_SECS", &v)?;
        }
        if let Some(v) = var("TOLLGATE_BACKEND_TIMEOUT_MS") {
            config.backend_timeout_ms = parse_u64("TOLLGATE_BACKEND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("TOLLGATE_USER_CACHE_TTL_SECS") {
            config.user_cache_ttl_secs = parse_u64("TOLLGATE_USER_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = var("TOLLGATE_PUBLIC_URL") {
            config.public_url = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.log_level = v;
        }

        Ok(config)
    }
}

fn random_server_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn parse_u64(name: &str, value: &str) -> TollgateResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| TollgateError::Config(format!("{name} must be an integer, got {value:?}")))
}

/// Parse a boolean, accepting `1`/`true` and `0`/`false` (case-insensitive).
/// An empty value is `false`.
fn parse_bool(name: &str, value: &str) -> TollgateResult<bool> {
    match value.trim() {
        "1" => Ok(true),
        "0" | "" => Ok(false),
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(TollgateError::Config(format!(
            "{name} must be true or false, got {value:?}"
        ))),
    }
}
