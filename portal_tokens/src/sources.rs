//! Credential refresh sources

use crate::CredentialPair;
use async_trait::async_trait;
use std::error;

/// An asynchronous source of fresh credentials
///
/// Implementations perform the network exchange of a (possibly expired) pair
/// for a new one. They are driven by the
/// [`RefreshCoordinator`](crate::coordinator::RefreshCoordinator), which
/// guarantees that only one call is outstanding at a time.
#[async_trait]
pub trait AsyncRefreshSource: Send + Sync {
    /// The error type returned in the event that the exchange fails
    type Error: error::Error + Send + Sync + 'static;

    /// Exchanges `current` for a new credential pair
    ///
    /// Implementations should not retry on their own. A failed refresh is
    /// terminal for the current pair.
    async fn refresh(&self, current: &CredentialPair) -> Result<CredentialPair, Self::Error>;
}
