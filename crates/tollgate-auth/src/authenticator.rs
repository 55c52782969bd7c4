//! Scheme dispatch over an incoming HTTP request.
//!
//! A request is authenticated with Digest when its `Authorization` header
//! starts with `Digest `, and with OAuth when the header starts with `OAuth `
//! or when `oauth_signature` appears in the query or form body.

use std::sync::Arc;

use http::HeaderMap;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use tracing::debug;

use crate::canonical::{OAUTH_SIGNATURE, collect_parameters, is_oauth_header, parse_form};
use crate::challenge::challenge_headers;
use crate::context::AuthContext;
use crate::credentials::{IdentityBackend, UserCache};
use crate::digest::{DigestVerifier, is_digest};
use crate::error::AuthError;
use crate::oauth::{OAuthMessage, OAuthVerifier};
use crate::principal::Principal;
use crate::replay::ReplayGuard;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Authenticates requests with whichever scheme they use.
#[derive(Debug, Clone)]
pub struct Authenticator {
    ctx: Arc<AuthContext>,
    digest: DigestVerifier,
    oauth: OAuthVerifier,
}

impl Authenticator {
    /// Create an authenticator with no user cache and no replay protection.
    #[must_use]
    pub fn new(ctx: Arc<AuthContext>, identities: Arc<dyn IdentityBackend>) -> Self {
        Self {
            digest: DigestVerifier::new(Arc::clone(&ctx), Arc::clone(&identities)),
            oauth: OAuthVerifier::new(Arc::clone(&ctx), identities),
            ctx,
        }
    }

    /// Put a user cache in front of Digest user lookups.
    #[must_use]
    pub fn with_user_cache(mut self, user_cache: Arc<dyn UserCache>) -> Self {
        self.digest = self.digest.with_user_cache(user_cache);
        self
    }

    /// Reject reused OAuth nonces.
    #[must_use]
    pub fn with_replay_guard(mut self, guard: Arc<ReplayGuard>) -> Self {
        self.oauth = self.oauth.with_replay_guard(guard);
        self
    }

    /// The settings this authenticator was built with.
    #[must_use]
    pub fn context(&self) -> &AuthContext {
        &self.ctx
    }

    /// Authenticate a request given its head and (already collected) body.
    pub fn authenticate(
        &self,
        parts: &http::request::Parts,
        body: &[u8],
    ) -> Result<Principal, AuthError> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|v| {
                v.to_str().map_err(|_| {
                    AuthError::MalformedHeader("authorization header is not ASCII".to_owned())
                })
            })
            .transpose()?;

        if let Some(header) = auth_header {
            if is_digest(header) {
                return self.digest.verify(parts.method.as_str(), header);
            }
        }

        let oauth_header = auth_header.filter(|h| is_oauth_header(h));
        let form_body = form_body(parts, body);
        let query = parts.uri.query();

        let signed_elsewhere = [query, form_body]
            .into_iter()
            .flatten()
            .any(|encoded| parse_form(encoded).iter().any(|p| p.key == OAUTH_SIGNATURE));

        if oauth_header.is_none() && !signed_elsewhere {
            return Err(match auth_header {
                Some(_) => {
                    AuthError::MalformedHeader("unsupported authorization scheme".to_owned())
                }
                None => AuthError::MissingAuthHeader,
            });
        }

        let url = self.request_url(parts)?;
        debug!(url = %url, "Authenticating OAuth request");
        let message = OAuthMessage::new(
            parts.method.as_str(),
            url,
            collect_parameters(oauth_header, query, form_body),
        );
        self.oauth.verify(&message)
    }

    /// Challenge headers answering a failed authentication.
    #[must_use]
    pub fn challenge_headers(&self, error: &AuthError) -> HeaderMap {
        challenge_headers(&self.ctx, error)
    }

    /// Rebuild the absolute request URL without its query string.
    ///
    /// The configured public URL wins; otherwise the request URI is used if it
    /// is absolute, falling back to `http://` plus the `Host` header.
    fn request_url(&self, parts: &http::request::Parts) -> Result<String, AuthError> {
        let path = parts.uri.path();
        if let Some(public_url) = &self.ctx.public_url {
            return Ok(format!("{}{path}", public_url.trim_end_matches('/')));
        }
        if let (Some(scheme), Some(authority)) = (parts.uri.scheme_str(), parts.uri.authority()) {
            return Ok(format!("{scheme}://{authority}{path}"));
        }
        let host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AuthError::InvalidRequestUrl(parts.uri.to_string()))?;
        Ok(format!("http://{host}{path}"))
    }
}

/// The body as text when it is form encoded.
fn form_body<'a>(parts: &http::request::Parts, body: &'a [u8]) -> Option<&'a str> {
    let is_form = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        });
    if is_form {
        std::str::from_utf8(body).ok()
    } else {
        None
    }
}
