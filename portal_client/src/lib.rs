//! A client for the portal API that keeps its user signed in
//!
//! Every call made through a [`RequestGateway`] carries the current access
//! token as a bearer credential. When the portal answers that the token has
//! expired (error code `4010`), the gateway parks the call with the shared
//! [`RefreshCoordinator`](portal_tokens::coordinator::RefreshCoordinator),
//! which runs exactly one refresh on behalf of every parked call and then
//! tells each of them whether to replay. A replayed call that succeeds looks,
//! to its caller, exactly like a call that succeeded the first time. If the
//! refresh fails, each caller receives its own original error and a single
//! [`Event::LoggedOut`](portal_tokens::events::Event::LoggedOut) is broadcast.
//!
//! The [`Portal`] type wires all of this together from a [`PortalConfig`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use portal_client::{Environment, Portal, PortalConfig};
//! use portal_tokens::{store::FileCredentialStore, ClientId, ClientSecret};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PortalConfig::new(
//!     Environment::Sandbox,
//!     ClientId::from_static("my-client"),
//!     ClientSecret::from_static("my-secret"),
//!     "myapp://sso",
//! );
//!
//! let portal = Portal::new(
//!     config,
//!     Arc::new(FileCredentialStore::new(".credentials.json".into())),
//!     Arc::new(FileCredentialStore::new(".settings.json".into())),
//! );
//!
//! if !portal.is_authenticated() {
//!     println!("sign in at {}", portal.sign_in_url());
//!     // … later, when the browser redirects back to the application:
//!     # let redirect: reqwest::Url = "myapp://sso?access_token=a&refresh_token=r".parse()?;
//!     portal.open_redirect(&redirect)?;
//! }
//!
//! let profile = portal.users().my_profile().await?;
//! println!("hello, {}", profile.handle);
//! # Ok(())
//! # }
//! ```
//!
//! Calls that do not fit one of the built-in endpoint groups can be made
//! directly through the gateway with a [`RequestSpec`], decoding the response
//! into any [`FromResponse`](decode::FromResponse) shape.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod auth;
mod config;
pub mod decode;
pub mod endpoints;
mod error;
mod gateway;
mod portal;
mod predicate;
mod request;
mod transport;

#[cfg(test)]
mod test_util;

pub use auth::{parse_redirect, SsoError, TokenEndpointRefresher};
pub use config::{Environment, PortalConfig, UnknownEnvironment};
pub use error::{classify, ApiError, ErrorCode, ErrorFamily};
pub use gateway::RequestGateway;
pub use portal::{Portal, PortalGateway};
pub use predicate::{AnyRequest, HttpsOnly};
pub use request::RequestSpec;
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};
