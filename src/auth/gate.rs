use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::auth::User;
use crate::error::{unauthorized_error, Error};

pub const EMAIL_HEADER: &str = "x-user-email";
pub const PHONE_HEADER: &str = "x-user-phone";
pub const NAME_HEADER: &str = "x-user-name";

/// Resolves an inbound call to a verified identity.
#[async_trait]
pub trait IdentityGate {
    async fn verify(&self, headers: &HeaderMap) -> Result<User, Error>;
}

pub type DynIdentityGate = Arc<dyn IdentityGate + Send + Sync>;

/// Trusts the identity headers set by the authenticating proxy in front of
/// the service. Never expose the service without that proxy.
#[derive(Debug, Default, Clone)]
pub struct ForwardedIdentityGate;

#[async_trait]
impl IdentityGate for ForwardedIdentityGate {
    #[tracing::instrument(skip_all)]
    async fn verify(&self, headers: &HeaderMap) -> Result<User, Error> {
        let header = |name: &str| -> Option<String> {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let email = header(EMAIL_HEADER).ok_or_else(unauthorized_error)?;
        if !email.contains('@') {
            tracing::warn!("rejecting malformed forwarded email");
            return Err(unauthorized_error());
        }

        Ok(User::new(
            email,
            header(PHONE_HEADER).unwrap_or_default(),
            header(NAME_HEADER).unwrap_or_default(),
        ))
    }
}

#[test]
fn forwarded_headers_resolve_user() {
    use axum::http::HeaderValue;
    use tokio_test::block_on;

    let mut headers = HeaderMap::new();
    headers.insert(EMAIL_HEADER, HeaderValue::from_static("rider@example.com"));
    headers.insert(PHONE_HEADER, HeaderValue::from_static("9876543210"));
    headers.insert(NAME_HEADER, HeaderValue::from_static("Rider"));

    let user = block_on(ForwardedIdentityGate.verify(&headers)).unwrap();
    assert_eq!(user, User::new("rider@example.com", "9876543210", "Rider"));
}

#[test]
fn missing_or_malformed_email_is_unauthorized() {
    use crate::error::ErrorKind;
    use axum::http::HeaderValue;
    use tokio_test::block_on;

    let headers = HeaderMap::new();
    let err = block_on(ForwardedIdentityGate.verify(&headers)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    let mut headers = HeaderMap::new();
    headers.insert(EMAIL_HEADER, HeaderValue::from_static("not-an-email"));
    let err = block_on(ForwardedIdentityGate.verify(&headers)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);
}
