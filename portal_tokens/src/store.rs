//! Durable storage for credentials

use std::{
    fmt, io,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

use crate::{
    events::{Event, EventSubscriber},
    AccessToken, CredentialPair, RefreshToken,
};

#[cfg(feature = "file")]
mod file;
mod in_memory;

#[cfg(feature = "file")]
#[cfg_attr(docsrs, doc(cfg(feature = "file")))]
pub use file::FileCredentialStore;
pub use in_memory::InMemoryCredentialStore;

/// An error while reading from or writing to a credential store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be accessed
    #[error("unable to access credential storage")]
    Io(#[from] io::Error),
    /// The backing storage holds data that could not be understood
    #[cfg(feature = "file")]
    #[error("credential storage is corrupt")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable, application-scoped storage of string values
///
/// Every read and write must go to the backing storage itself; a store must not
/// serve values from a cache that could disagree with what another instance of
/// the store (or a later process) would observe. Implementations serialize their
/// own accesses.
pub trait CredentialStore: fmt::Debug + Send + Sync {
    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any prior value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the value stored under `key`
    ///
    /// Returns whether a value was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key)
    }
}

/// The credential pair, as persisted in a [`CredentialStore`]
///
/// The two halves live under `<prefix>-accessToken` and
/// `<prefix>-refreshToken`. The vault serializes its own reads and writes so
/// that no reader can observe one half of an old pair next to one half of a
/// new one. Clones share that serialization.
///
/// The vault is also an [`EventSubscriber`]: it persists the pair carried by
/// [`Event::Authenticated`] and forgets the pair on [`Event::LoggedOut`] and
/// [`Event::FirstRun`].
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    access_key: Arc<str>,
    refresh_key: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl CredentialVault {
    /// Constructs a vault over `store`, namespacing its keys with `prefix`
    pub fn new(store: Arc<dyn CredentialStore>, prefix: &str) -> Self {
        Self {
            store,
            access_key: format!("{prefix}-accessToken").into(),
            refresh_key: format!("{prefix}-refreshToken").into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Reads the current access token, if any
    pub fn access_token(&self) -> Result<Option<AccessToken>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.store.get(&self.access_key)?.map(AccessToken::new))
    }

    /// Reads the current refresh token, if any
    pub fn refresh_token(&self) -> Result<Option<RefreshToken>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.store.get(&self.refresh_key)?.map(RefreshToken::new))
    }

    /// Reads the current credential pair
    ///
    /// Returns `None` unless both halves are present.
    pub fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let access = self.store.get(&self.access_key)?;
        let refresh = self.store.get(&self.refresh_key)?;
        Ok(access
            .zip(refresh)
            .map(|(a, r)| CredentialPair::new(AccessToken::new(a), RefreshToken::new(r))))
    }

    /// Persists `pair`, replacing any prior pair
    ///
    /// If either half cannot be written, both halves are removed so that the
    /// store never holds a mixed pair.
    pub fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let written = self
            .store
            .set(&self.access_key, pair.access_token().as_str())
            .and_then(|()| {
                self.store
                    .set(&self.refresh_key, pair.refresh_token().as_str())
            });

        if let Err(error) = written {
            tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "unable to persist credential pair, discarding both halves"
            );
            for key in [&self.access_key, &self.refresh_key] {
                if let Err(error) = self.store.delete(key) {
                    tracing::warn!(
                        error = (&error as &dyn std::error::Error),
                        key = &**key,
                        "unable to discard partially written credential"
                    );
                }
            }
            return Err(error);
        }

        tracing::trace!("persisted credential pair");
        Ok(())
    }

    /// Removes both halves of the pair
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let had_access = self.store.delete(&self.access_key)?;
        let had_refresh = self.store.delete(&self.refresh_key)?;
        tracing::debug!(had_access, had_refresh, "cleared stored credentials");
        Ok(())
    }

    /// Whether both halves of the pair are present
    ///
    /// A storage error is reported as not authenticated.
    pub fn is_authenticated(&self) -> bool {
        match self.load() {
            Ok(pair) => pair.is_some(),
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn std::error::Error),
                    "unable to read stored credentials"
                );
                false
            }
        }
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("store", &self.store)
            .field("access_key", &self.access_key)
            .field("refresh_key", &self.refresh_key)
            .finish()
    }
}

impl EventSubscriber for CredentialVault {
    fn on_event(&self, event: &Event) {
        let result = match event {
            Event::Authenticated(pair) => self.save(pair),
            Event::LoggedOut(_) | Event::FirstRun => self.clear(),
        };

        if let Err(error) = result {
            tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "unable to apply lifecycle event to stored credentials"
            );
        }
    }
}
