use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use portal_tokens::{
    store::InMemoryCredentialStore, AccessToken, ClientId, ClientSecret, CredentialPair,
    RefreshToken,
};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    StatusCode,
};

use crate::{
    Environment, Portal, PortalConfig, RequestSpec, Transport, TransportError, TransportResponse,
};

type Handler = dyn Fn(&RequestSpec) -> Result<TransportResponse, TransportError> + Send + Sync;

/// A transport that answers from a closure and records what it was sent
pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<RequestSpec>>,
}

impl FakeTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&RequestSpec) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<RequestSpec> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn bearers(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|r| bearer(r).map(str::to_owned))
            .collect()
    }
}

impl fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FakeTransport")
            .field("requests", &self.requests().len())
            .finish()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: RequestSpec) -> Result<TransportResponse, TransportError> {
        let response = (self.handler)(&request);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        response
    }
}

pub(crate) fn bearer(request: &RequestSpec) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

pub(crate) fn ok_json(body: serde_json::Value) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse::json(StatusCode::OK, &body))
}

pub(crate) fn api_error(
    status: StatusCode,
    code: u16,
    description: &'static str,
) -> Result<TransportResponse, TransportError> {
    let mut response = TransportResponse::new(status, "");
    response
        .headers
        .insert("errorcode", HeaderValue::from(code));
    response.headers.insert(
        "errordescription",
        HeaderValue::from_static(description),
    );
    Ok(response)
}

pub(crate) fn expired() -> Result<TransportResponse, TransportError> {
    api_error(StatusCode::UNAUTHORIZED, 4010, "token refresh required")
}

/// A sandbox session signed in as `current-access`/`current-refresh`
pub(crate) fn signed_in_portal<F>(handler: F) -> (Portal<FakeTransport>, Arc<FakeTransport>)
where
    F: Fn(&RequestSpec) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
{
    let config = PortalConfig::new(
        Environment::Sandbox,
        ClientId::from_static("client"),
        ClientSecret::from_static("secret"),
        "myapp://sso",
    );
    let transport = Arc::new(FakeTransport::new(handler));
    let store = Arc::new(InMemoryCredentialStore::new());
    let portal = Portal::with_transport(config, transport.clone(), store.clone(), store);

    portal
        .vault()
        .save(&CredentialPair::new(
            AccessToken::from_static("current-access"),
            RefreshToken::from_static("current-refresh"),
        ))
        .unwrap();

    (portal, transport)
}
