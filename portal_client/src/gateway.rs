use std::{error, fmt, sync::Arc};

use bytes::{BufMut, BytesMut};
use portal_tokens::{
    coordinator::RefreshCoordinator, sources::AsyncRefreshSource, store::CredentialVault,
    AccessToken, AccessTokenRef,
};
use predicates::Predicate;
use reqwest::header::{self, HeaderValue};
use serde::de::DeserializeOwned;

use crate::{
    classify,
    decode::{self, FromResponse, Json},
    AnyRequest, ApiError, RequestSpec, Transport, TransportResponse,
};

/// The entry point for every authenticated call to the portal
///
/// Each request is decorated with the current access token, sent through the
/// [`Transport`], and classified. A request rejected because its access token
/// expired is parked with the [`RefreshCoordinator`] and, if the refresh
/// succeeds, replayed exactly once with the new token. The caller sees only
/// the final outcome.
///
/// If a request already carries an `Authorization` header, it is left in
/// place. The token is only attached to requests matching the gateway's
/// predicate; by default that is every request. To restrict it, provide a
/// custom predicate with [`with_predicate()`][Self::with_predicate()].
pub struct RequestGateway<T: ?Sized, S, P = AnyRequest> {
    transport: Arc<T>,
    vault: CredentialVault,
    coordinator: RefreshCoordinator<S>,
    predicate: P,
}

impl<T: ?Sized, S> RequestGateway<T, S, AnyRequest> {
    /// Constructs a gateway that attaches the access token to every request
    pub fn new(
        transport: Arc<T>,
        vault: CredentialVault,
        coordinator: RefreshCoordinator<S>,
    ) -> Self {
        Self {
            transport,
            vault,
            coordinator,
            predicate: AnyRequest,
        }
    }
}

impl<T: ?Sized, S, P> RequestGateway<T, S, P> {
    /// Replaces the predicate deciding which requests receive the access token
    pub fn with_predicate<Q>(self, predicate: Q) -> RequestGateway<T, S, Q> {
        RequestGateway {
            transport: self.transport,
            vault: self.vault,
            coordinator: self.coordinator,
            predicate,
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The credential vault the access token is read from
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// The coordinator expired calls are parked with
    pub fn coordinator(&self) -> &RefreshCoordinator<S> {
        &self.coordinator
    }

    /// Whether a full credential pair is currently stored
    pub fn is_authenticated(&self) -> bool {
        self.vault.is_authenticated()
    }
}

impl<T, S, P> RequestGateway<T, S, P>
where
    T: Transport + ?Sized,
    S: AsyncRefreshSource + 'static,
    P: Predicate<RequestSpec> + Send + Sync,
{
    /// Sends a request and decodes the whole body as `R`
    pub async fn request<R: FromResponse>(&self, spec: RequestSpec) -> Result<R, ApiError> {
        self.request_at(spec, None).await
    }

    /// Sends a request and decodes the value at `key_path` as `R`
    #[tracing::instrument(
        level = "debug",
        skip(self, spec),
        fields(method = %spec.method(), url = %spec.url()),
        err(level = "debug")
    )]
    pub async fn request_at<R: FromResponse>(
        &self,
        spec: RequestSpec,
        key_path: Option<&str>,
    ) -> Result<R, ApiError> {
        let (sent, outcome) = self.dispatch(spec.clone()).await;
        let error = match outcome {
            Ok(response) => return Ok(decode::decode(response.body, key_path)?),
            Err(error) => error,
        };

        if !error.is_expired_credential() {
            return Err(error);
        }

        tracing::debug!("access token expired, awaiting refresh");
        if !self.coordinator.wait_for_refresh(sent.as_deref()).await {
            return Err(error);
        }

        tracing::debug!("replaying request with refreshed access token");
        let (_, outcome) = self.dispatch(spec).await;
        Ok(decode::decode(outcome?.body, key_path)?)
    }

    /// Sends a request and deserializes the value at `key_path` as `D`
    pub async fn request_json<D: DeserializeOwned>(
        &self,
        spec: RequestSpec,
        key_path: Option<&str>,
    ) -> Result<D, ApiError> {
        let Json(value) = self.request_at(spec, key_path).await?;
        Ok(value)
    }

    /// Sends a request once, without parking it if the access token has expired
    pub async fn request_once<R: FromResponse>(
        &self,
        spec: RequestSpec,
        key_path: Option<&str>,
    ) -> Result<R, ApiError> {
        let (_, outcome) = self.dispatch(spec).await;
        Ok(decode::decode(outcome?.body, key_path)?)
    }

    async fn dispatch(
        &self,
        mut spec: RequestSpec,
    ) -> (Option<AccessToken>, Result<TransportResponse, ApiError>) {
        let sent = if self.predicate.eval(&spec) {
            self.attach_access_token(&mut spec)
        } else {
            None
        };

        let outcome = match self.transport.send(spec).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(classify(None, Some(&response))),
            Err(error) => Err(classify(Some(error), None)),
        };

        (sent, outcome)
    }

    fn attach_access_token(&self, spec: &mut RequestSpec) -> Option<AccessToken> {
        if spec.headers().contains_key(header::AUTHORIZATION) {
            return None;
        }

        let token = match self.vault.access_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::trace!("no access token stored, sending request without one");
                return None;
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to read access token, sending request without one"
                );
                return None;
            }
        };

        match bearer_header(&token) {
            Some(value) => {
                spec.headers_mut().insert(header::AUTHORIZATION, value);
                Some(token)
            }
            None => {
                tracing::warn!("stored access token is not a valid header value");
                None
            }
        }
    }
}

fn bearer_header(token: &AccessTokenRef) -> Option<HeaderValue> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value = HeaderValue::from_maybe_shared(header_value.freeze()).ok()?;
    value.set_sensitive(true);
    Some(value)
}

impl<T: ?Sized, S, P: Clone> Clone for RequestGateway<T, S, P> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            vault: self.vault.clone(),
            coordinator: self.coordinator.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<T, S, P> fmt::Debug for RequestGateway<T, S, P>
where
    T: fmt::Debug + ?Sized,
    S: fmt::Debug,
    P: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RequestGateway")
            .field("transport", &self.transport)
            .field("coordinator", &self.coordinator)
            .field("predicate", &format_args!("{}", self.predicate))
            .finish()
    }
}
