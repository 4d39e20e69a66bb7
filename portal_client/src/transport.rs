use std::{error, sync::Arc};

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

use crate::RequestSpec;

/// A response as received from the portal, before any interpretation
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The response headers
    pub headers: HeaderMap,
    /// The raw response body
    pub body: Bytes,
}

impl TransportResponse {
    /// Constructs a response with no headers
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Constructs a response with a JSON body
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response.headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        response
    }

    /// Whether the status is in the `2xx` range
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A failure to obtain any response at all
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn error::Error + Send + Sync + 'static>>,
}

impl TransportError {
    /// Constructs an error from a message alone
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Constructs an error from a message and its underlying cause
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync + 'static>>,
    {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The description of the failure
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Sends a [`RequestSpec`] and returns whatever came back
///
/// Implementations report a [`TransportError`] only when no response was
/// received. Error statuses are ordinary responses.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends a single request
    async fn send(&self, request: RequestSpec) -> Result<TransportResponse, TransportError>;
}

#[async_trait::async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: RequestSpec) -> Result<TransportResponse, TransportError> {
        T::send(self, request).await
    }
}

/// A [`Transport`] backed by a `reqwest` middleware stack
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ClientWithMiddleware,
}

impl ReqwestTransport {
    /// Constructs a transport around a plain client with no middleware
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client: ClientWithMiddleware::from(client),
        }
    }

    /// The underlying client
    pub fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::default())
    }
}

impl From<ClientWithMiddleware> for ReqwestTransport {
    fn from(client: ClientWithMiddleware) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RequestSpec) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }

        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::with_source("request could not be sent", err))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::with_source("response body could not be read", err))?;

        tracing::trace!(%status, bytes = body.len(), "received response");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
