//! Facilities for keeping a portal user's credentials alive
//!
//! This library owns the lifecycle of the access/refresh credential pair that a
//! portal client attaches to its outbound calls. It is deliberately transport
//! agnostic: the HTTP side lives in `portal_client`, which plugs into the
//! contracts defined here.
//!
//! The pieces, from the bottom up:
//!
//! * A [`CredentialStore`][store::CredentialStore] persists string values under
//!   string keys. The [`CredentialVault`][store::CredentialVault] layers the
//!   credential pair on top of it so that the pair is always written and read
//!   as a unit.
//! * An [`EventBus`][events::EventBus] broadcasts lifecycle events (a user
//!   authenticated, a user was logged out, the application is running for the
//!   first time) to any interested subscriber.
//! * An [`AsyncRefreshSource`][sources::AsyncRefreshSource] exchanges the current
//!   pair for a fresh one.
//! * The [`RefreshCoordinator`][coordinator::RefreshCoordinator] makes sure that
//!   only a single refresh is ever in flight, parks every caller whose request
//!   was rejected for an expired credential, and wakes them all once the
//!   refresh settles.
//!
//! ```
//! use std::sync::Arc;
//!
//! use portal_tokens::{
//!     events::{Event, EventBus},
//!     store::{CredentialVault, InMemoryCredentialStore},
//!     AccessToken, CredentialPair, RefreshToken,
//! };
//!
//! let events = EventBus::new();
//! let vault = CredentialVault::new(Arc::new(InMemoryCredentialStore::new()), "PPSDK");
//! events.subscribe(vault.clone());
//!
//! events.publish(Event::Authenticated(CredentialPair::new(
//!     AccessToken::from_static("access"),
//!     RefreshToken::from_static("refresh"),
//! )));
//!
//! assert!(vault.is_authenticated());
//! ```
//!
//! # Features
//!
//! * `file` (default): Provides a durable [`FileCredentialStore`][store::FileCredentialStore]
//!   backed by a JSON document on the local filesystem.

#![cfg_attr(docsrs, feature(doc_cfg))]
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

mod braids;
pub mod coordinator;
mod credentials;
pub mod events;
pub mod sources;
pub mod store;

pub use braids::*;
pub use credentials::CredentialPair;
