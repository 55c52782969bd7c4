//! OAuth 1.0a signature base string construction.
//!
//! ```text
//! base_string = percent_encode(UPPER(method)) + "&" +
//!               percent_encode(normalized_url) + "&" +
//!               percent_encode(normalized_parameters)
//! ```
//!
//! The request parameters are gathered from the `Authorization: OAuth`
//! header (excluding `realm`), then the query string, then a form-encoded
//! body. Normalization drops `oauth_signature`, sorts by encoded key and then
//! encoded value, and joins `key=value` pairs with `&`.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::AuthError;

/// Characters percent-encoded by OAuth.
///
/// Everything except the RFC 3986 unreserved characters (A-Z, a-z, 0-9,
/// `-`, `_`, `.`, `~`) is encoded, so a space becomes `%20`.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Name of the parameter carrying the signature.
pub const OAUTH_SIGNATURE: &str = "oauth_signature";

/// A single request parameter, in the order it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthParameter {
    /// Decoded parameter name.
    pub key: String,
    /// Decoded parameter value.
    pub value: String,
}

impl OAuthParameter {
    /// Create a parameter from decoded parts.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// OAuth percent-encode a string.
///
/// # Examples
///
/// ```
/// use tollgate_auth::canonical::percent_encode;
///
/// assert_eq!(percent_encode("a b+c~"), "a%20b%2Bc~");
/// ```
#[must_use]
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Decode a percent-encoded string, treating `+` as a space.
#[must_use]
pub fn percent_decode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Check whether the `Authorization` header uses the OAuth scheme.
#[must_use]
pub fn is_oauth_header(auth_header: &str) -> bool {
    auth_header
        .get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("OAuth "))
}

/// Decode the parameters of an `Authorization: OAuth …` header.
///
/// The `realm` parameter is not part of the signature and is skipped.
#[must_use]
pub fn decode_authorization_header(auth_header: &str) -> Vec<OAuthParameter> {
    if !is_oauth_header(auth_header) {
        return Vec::new();
    }
    auth_header[6..]
        .split(',')
        .filter_map(|element| {
            let (key, value) = element.trim().split_once('=')?;
            let key = percent_decode(key.trim());
            if key.is_empty() || key.eq_ignore_ascii_case("realm") {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some(OAuthParameter::new(key, percent_decode(value)))
        })
        .collect()
}

/// Parse an `application/x-www-form-urlencoded` string.
#[must_use]
pub fn parse_form(encoded: &str) -> Vec<OAuthParameter> {
    form_urlencoded::parse(encoded.as_bytes())
        .map(|(k, v)| OAuthParameter::new(k, v))
        .collect()
}

/// Gather request parameters in signing order: header, query, form body.
#[must_use]
pub fn collect_parameters(
    auth_header: Option<&str>,
    query: Option<&str>,
    form_body: Option<&str>,
) -> Vec<OAuthParameter> {
    let mut parameters = auth_header
        .map(decode_authorization_header)
        .unwrap_or_default();
    if let Some(query) = query {
        parameters.extend(parse_form(query));
    }
    if let Some(body) = form_body {
        parameters.extend(parse_form(body));
    }
    parameters
}

/// Normalize a request URL for signing.
///
/// The scheme and authority are lowercased, default ports (80 for http, 443
/// for https) are dropped and an empty path becomes `/`. The query and
/// fragment are removed; query parameters are returned so they can join the
/// signed parameter set.
///
/// # Examples
///
/// ```
/// use tollgate_auth::canonical::normalize_url;
///
/// let (url, params) = normalize_url("HTTP://Example.COM:80/r%20v?a=1").unwrap();
/// assert_eq!(url, "http://example.com/r%20v");
/// assert_eq!(params.len(), 1);
/// ```
pub fn normalize_url(url: &str) -> Result<(String, Vec<OAuthParameter>), AuthError> {
    let without_fragment = url.split_once('#').map_or(url, |(u, _)| u);
    let uri: http::Uri = without_fragment
        .parse()
        .map_err(|_| AuthError::InvalidRequestUrl(url.to_owned()))?;

    let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) else {
        return Err(AuthError::InvalidRequestUrl(url.to_owned()));
    };
    let scheme = scheme.to_ascii_lowercase();
    let host = authority.host().to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };

    let mut normalized = format!("{scheme}://{host}");
    if let Some(port) = authority.port_u16() {
        if Some(port) != default_port {
            normalized.push(':');
            normalized.push_str(&port.to_string());
        }
    }
    let path = uri.path();
    normalized.push_str(if path.is_empty() { "/" } else { path });

    let query_parameters = uri.query().map(parse_form).unwrap_or_default();
    Ok((normalized, query_parameters))
}

/// Build the normalized parameter string.
///
/// `oauth_signature` is excluded; the rest are encoded, sorted by key and
/// then by value, and joined as `key=value` pairs separated by `&`.
#[must_use]
pub fn normalize_parameters(parameters: &[OAuthParameter]) -> String {
    let mut encoded: Vec<(String, String)> = parameters
        .iter()
        .filter(|p| p.key != OAUTH_SIGNATURE)
        .map(|p| (percent_encode(&p.key), percent_encode(&p.value)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the signature base string for a request.
///
/// Query parameters embedded in `url` are added to `parameters`.
pub fn signature_base_string(
    method: &str,
    url: &str,
    parameters: &[OAuthParameter],
) -> Result<String, AuthError> {
    let (normalized_url, query_parameters) = normalize_url(url)?;

    let mut all = parameters.to_vec();
    all.extend(query_parameters);

    Ok(format!(
        "{}&{}&{}",
        percent_encode(&method.to_ascii_uppercase()),
        percent_encode(&normalized_url),
        percent_encode(&normalize_parameters(&all))
    ))
}
