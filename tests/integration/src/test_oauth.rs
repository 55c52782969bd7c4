//! OAuth 1.0a authentication scenarios.

#[cfg(test)]
mod tests {
    use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
    use tollgate_auth::{AuthError, AuthScheme, sign_url};

    use crate::{HOST as API_HOST, authenticator, oauth_header_from_signed_url, parts};

    fn url(path_and_query: &str) -> String {
        format!("http://{API_HOST}{path_and_query}")
    }

    fn path_of(url: &str) -> &str {
        url.strip_prefix(&format!("http://{API_HOST}")).map_or(url, |p| p)
    }

    #[test]
    fn test_should_accept_signed_query_once() {
        let authenticator = authenticator();
        let signed = sign_url("GET", &url("/modules/geo/actions/view?page=2"), "c1", "p1").unwrap();
        let request = || {
            parts(
                http::Request::get(path_of(&signed))
                    .header(HOST, API_HOST)
                    .body(())
                    .unwrap(),
            )
        };

        let principal = authenticator.authenticate(&request(), b"").unwrap();
        assert_eq!(principal.name, "c1");
        assert_eq!(principal.scheme, AuthScheme::OAuth);

        assert_eq!(
            authenticator.authenticate(&request(), b""),
            Err(AuthError::NonceReplayed)
        );
    }

    #[test]
    fn test_should_accept_authorization_header() {
        let signed = sign_url(
            "GET",
            &url("/modules/geo/groups/USER?verbose=true"),
            "root",
            "r00t",
        )
        .unwrap();
        let (unsigned_url, header) = oauth_header_from_signed_url(&signed);

        let request = parts(
            http::Request::get(path_of(&unsigned_url))
                .header(HOST, API_HOST)
                .header(AUTHORIZATION, header)
                .body(())
                .unwrap(),
        );
        let principal = authenticator().authenticate(&request, b"").unwrap();
        assert_eq!(principal.name, "root");
        assert!(principal.has_authority("ADMIN"));
    }

    #[test]
    fn test_should_accept_signed_form_body() {
        let signed = sign_url(
            "POST",
            &url("/_admin/modules/geo/events/STOP?reason=deploy"),
            "root",
            "r00t",
        )
        .unwrap();
        let (_, body) = signed.split_once('?').unwrap();

        let request = parts(
            http::Request::post("/_admin/modules/geo/events/STOP")
                .header(HOST, API_HOST)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(())
                .unwrap(),
        );
        assert!(authenticator().authenticate(&request, body.as_bytes()).is_ok());
    }

    #[test]
    fn test_should_reject_tampered_parameters() {
        let signed = sign_url("GET", &url("/modules/geo/actions/view?page=2"), "c1", "p1").unwrap();
        let tampered = signed.replace("page=2", "page=3");

        let request = parts(
            http::Request::get(path_of(&tampered))
                .header(HOST, API_HOST)
                .body(())
                .unwrap(),
        );
        assert_eq!(
            authenticator().authenticate(&request, b""),
            Err(AuthError::CredentialMismatch)
        );
    }

    #[test]
    fn test_should_reject_unknown_consumer_and_other_host() {
        let signed = sign_url("GET", &url("/modules/geo/actions/view"), "nobody", "x").unwrap();
        let request = parts(
            http::Request::get(path_of(&signed))
                .header(HOST, API_HOST)
                .body(())
                .unwrap(),
        );
        assert_eq!(
            authenticator().authenticate(&request, b""),
            Err(AuthError::UnknownConsumer("nobody".to_owned()))
        );

        let signed = sign_url("GET", &url("/modules/geo/actions/view"), "c1", "p1").unwrap();
        let request = parts(
            http::Request::get(path_of(&signed))
                .header(HOST, "evil.test")
                .body(())
                .unwrap(),
        );
        assert_eq!(
            authenticator().authenticate(&request, b""),
            Err(AuthError::CredentialMismatch)
        );
    }
}
