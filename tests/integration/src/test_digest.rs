//! Digest authentication scenarios.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
    use tollgate_auth::{AuthError, AuthScheme};

    use crate::{authenticator, digest_authorization, now_millis, parts};

    const URI: &str = "/modules/geo/actions/view";

    fn request(header: &str) -> http::request::Parts {
        parts(
            http::Request::get(URI)
                .header(AUTHORIZATION, header)
                .body(())
                .unwrap(),
        )
    }

    #[test]
    fn test_should_accept_then_report_stale_nonce() {
        let authenticator = authenticator();
        let header = digest_authorization("GET", URI, "c1", "p1", now_millis() + 200);

        let principal = authenticator.authenticate(&request(&header), b"").unwrap();
        assert_eq!(principal.name, "c1");
        assert_eq!(principal.scheme, AuthScheme::Digest);
        assert!(principal.has_authority("USER"));

        std::thread::sleep(Duration::from_millis(300));

        let err = authenticator
            .authenticate(&request(&header), b"")
            .unwrap_err();
        assert_eq!(err, AuthError::NonceExpired);

        let headers = authenticator.challenge_headers(&err);
        let challenges: Vec<_> = headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].starts_with("OAuth realm="));
        assert!(challenges[1].starts_with("Digest realm="));
        assert!(challenges[1].contains(r#"stale="true""#));
    }

    #[test]
    fn test_should_not_report_stale_for_wrong_password_on_expired_nonce() {
        let header = digest_authorization("GET", URI, "c1", "wrong", now_millis() - 1_000);
        let err = authenticator()
            .authenticate(&request(&header), b"")
            .unwrap_err();
        assert_eq!(err, AuthError::CredentialMismatch);

        let headers = authenticator().challenge_headers(&err);
        assert!(
            headers
                .get_all(WWW_AUTHENTICATE)
                .iter()
                .all(|v| !v.to_str().unwrap().contains("stale"))
        );
    }

    #[test]
    fn test_should_reject_nonce_signed_with_another_key() {
        let header = digest_authorization("GET", URI, "c1", "p1", now_millis() + 60_000);
        let forged = {
            let other = tollgate_auth::NonceCodec::default().encode(now_millis() + 60_000, "other");
            let start = header.find("nonce=\"").unwrap() + "nonce=\"".len();
            let end = start + header[start..].find('"').unwrap();
            format!("{}{other}{}", &header[..start], &header[end..])
        };
        assert_eq!(
            authenticator().authenticate(&request(&forged), b""),
            Err(AuthError::NonceTampered)
        );
    }

    #[test]
    fn test_should_reject_unknown_user_and_wrong_method() {
        let header = digest_authorization("GET", URI, "mallory", "p1", now_millis() + 60_000);
        assert_eq!(
            authenticator().authenticate(&request(&header), b""),
            Err(AuthError::UserNotFound("mallory".to_owned()))
        );

        let header = digest_authorization("POST", URI, "c1", "p1", now_millis() + 60_000);
        assert_eq!(
            authenticator().authenticate(&request(&header), b""),
            Err(AuthError::CredentialMismatch)
        );
    }
}
