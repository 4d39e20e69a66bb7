use serde::{Deserialize, Serialize};

use crate::{AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// The access/refresh credential pair of an authenticated user
///
/// Holding both halves is what it means to be authenticated. The pair is only
/// ever persisted as a unit through a [`CredentialVault`](crate::store::CredentialVault).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    access_token: AccessToken,
    refresh_token: RefreshToken,
}

impl CredentialPair {
    /// Constructs a new credential pair
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the refresh token
    #[inline]
    pub fn refresh_token(&self) -> &RefreshTokenRef {
        &self.refresh_token
    }

    /// Splits the pair into its two halves
    pub fn into_parts(self) -> (AccessToken, RefreshToken) {
        (self.access_token, self.refresh_token)
    }
}
