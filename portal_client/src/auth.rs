use std::{fmt, sync::Arc};

use portal_tokens::{
    sources::AsyncRefreshSource, AccessToken, ClientId, ClientSecret, CredentialPair,
    RefreshToken,
};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    classify,
    decode::{self, Json},
    ApiError, RequestSpec, Transport,
};

/// A sign-in redirect could not be turned into credentials
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SsoError {
    /// The redirect did not carry a required query parameter
    #[error("sign-in redirect is missing the `{0}` parameter")]
    MissingParameter(&'static str),
}

/// Extracts the credential pair from the URL the portal redirects to after sign-in
pub fn parse_redirect(redirect: &Url) -> Result<CredentialPair, SsoError> {
    let mut access_token = None;
    let mut refresh_token = None;

    for (key, value) in redirect.query_pairs() {
        match &*key {
            "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
            "refresh_token" if !value.is_empty() => refresh_token = Some(value.into_owned()),
            _ => {}
        }
    }

    let access_token = access_token.ok_or(SsoError::MissingParameter("access_token"))?;
    let refresh_token = refresh_token.ok_or(SsoError::MissingParameter("refresh_token"))?;

    Ok(CredentialPair::new(
        AccessToken::new(access_token),
        RefreshToken::new(refresh_token),
    ))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: AccessToken,
    refresh_token: RefreshToken,
}

/// Exchanges a refresh token at the portal's token endpoint
///
/// The exchange is sent straight through the transport, bypassing any
/// gateway, so that a rejected refresh can never itself wait on a refresh.
pub struct TokenEndpointRefresher<T: ?Sized> {
    transport: Arc<T>,
    token_url: Url,
    client_id: ClientId,
    client_secret: ClientSecret,
}

impl<T: ?Sized> TokenEndpointRefresher<T> {
    /// Constructs a refresher that posts to `token_url` as the given client
    pub fn new(
        transport: Arc<T>,
        token_url: Url,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Self {
        Self {
            transport,
            token_url,
            client_id,
            client_secret,
        }
    }

    /// The token endpoint
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    fn request_for(&self, current: &CredentialPair) -> RequestSpec {
        RequestSpec::post(self.token_url.clone())
            .with_query("access_token", current.access_token().as_str())
            .with_query("refresh_token", current.refresh_token().as_str())
            .with_query("client_id", self.client_id.as_str())
            .with_query("client_secret", self.client_secret.as_str())
            .with_query("grant_type", "refresh_token")
    }
}

impl<T: ?Sized> fmt::Debug for TokenEndpointRefresher<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenEndpointRefresher")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .finish()
    }
}

#[async_trait::async_trait]
impl<T> AsyncRefreshSource for TokenEndpointRefresher<T>
where
    T: Transport + ?Sized,
{
    type Error = ApiError;

    #[tracing::instrument(level = "debug", skip_all, fields(token_url = %self.token_url))]
    async fn refresh(&self, current: &CredentialPair) -> Result<CredentialPair, Self::Error> {
        let response = self
            .transport
            .send(self.request_for(current))
            .await
            .map_err(|error| classify(Some(error), None))?;

        if !response.is_success() {
            return Err(classify(None, Some(&response)));
        }

        let Json(tokens): Json<TokenResponse> = decode::decode(response.body, None)?;
        tracing::debug!("token endpoint issued new credentials");
        Ok(CredentialPair::new(tokens.access_token, tokens.refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::{
        test_util::{api_error, ok_json, FakeTransport},
        ErrorCode,
    };

    mod parse_redirect {
        use super::*;

        #[test]
        fn both_tokens_are_extracted() {
            let redirect: Url = "myapp://sso?access_token=abc&refresh_token=def&state=state"
                .parse()
                .unwrap();

            let pair = parse_redirect(&redirect).unwrap();

            assert_eq!(pair.access_token().as_str(), "abc");
            assert_eq!(pair.refresh_token().as_str(), "def");
        }

        #[test]
        fn missing_refresh_token_is_reported() {
            let redirect: Url = "myapp://sso?access_token=abc".parse().unwrap();
            assert_eq!(
                parse_redirect(&redirect),
                Err(SsoError::MissingParameter("refresh_token"))
            );
        }

        #[test]
        fn empty_access_token_counts_as_missing() {
            let redirect: Url = "myapp://sso?access_token=&refresh_token=def".parse().unwrap();
            assert_eq!(
                parse_redirect(&redirect),
                Err(SsoError::MissingParameter("access_token"))
            );
        }
    }

    mod token_endpoint_refresher {
        use super::*;

        fn refresher(transport: Arc<FakeTransport>) -> TokenEndpointRefresher<FakeTransport> {
            TokenEndpointRefresher::new(
                transport,
                "https://sandbox.playportal.io/oauth/token".parse().unwrap(),
                ClientId::from_static("client"),
                ClientSecret::from_static("secret"),
            )
        }

        fn current() -> CredentialPair {
            CredentialPair::new(
                AccessToken::from_static("old-access"),
                RefreshToken::from_static("old-refresh"),
            )
        }

        #[tokio::test]
        async fn posts_the_exchange_as_query_parameters() {
            let transport = Arc::new(FakeTransport::new(|_: &RequestSpec| {
                ok_json(json!({"access_token": "new-access", "refresh_token": "new-refresh"}))
            }));

            let pair = refresher(transport.clone()).refresh(&current()).await.unwrap();

            assert_eq!(pair.access_token().as_str(), "new-access");
            assert_eq!(pair.refresh_token().as_str(), "new-refresh");

            let requests = transport.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].method(), &reqwest::Method::POST);
            assert_eq!(
                requests[0].full_url().as_str(),
                "https://sandbox.playportal.io/oauth/token?access_token=old-access\
                 &refresh_token=old-refresh&client_id=client&client_secret=secret\
                 &grant_type=refresh_token"
            );
        }

        #[tokio::test]
        async fn rejection_is_classified() {
            let transport = Arc::new(FakeTransport::new(|_: &RequestSpec| {
                api_error(StatusCode::UNAUTHORIZED, 4011, "invalid credentials")
            }));

            let error = refresher(transport).refresh(&current()).await.unwrap_err();

            assert_eq!(error.code(), Some(ErrorCode::INVALID_CREDENTIALS));
        }

        #[tokio::test]
        async fn incomplete_response_is_a_deserialization_failure() {
            let transport = Arc::new(FakeTransport::new(|_: &RequestSpec| {
                ok_json(json!({"access_token": "new-access"}))
            }));

            let error = refresher(transport).refresh(&current()).await.unwrap_err();

            assert!(matches!(error, ApiError::Deserialization(_)), "{error:?}");
        }
    }
}
