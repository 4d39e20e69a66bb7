//! Single-flight coordination of credential refreshes
//!
//! When the portal rejects a call because its access token has expired, the
//! caller parks itself with the [`RefreshCoordinator`] and waits for a verdict.
//! The first caller to arrive while the coordinator is idle starts the refresh;
//! everyone who arrives before that refresh settles simply joins the queue.
//! Once the refresh settles, every parked caller receives the same verdict:
//! `true` means "retry with the new credential", `false` means "give up and
//! report your original error".
//!
//! ```text
//!            expired call                      refresh succeeded
//!   Idle ───────────────────▶ Refreshing ─────────────────────────▶ Idle
//!     ▲                        │   ▲  │      (save pair, wake all: true)
//!     │                        └───┘  │
//!     │               more expired    │      refresh failed
//!     │               calls queue     └───────────────────────────▶ Idle
//!     │                                      (clear pair, wake all: false,
//!     └── reset (logout) ◀─ any state          publish LoggedOut)
//! ```

use std::{
    error, fmt, mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::{
    events::{Event, EventBus, EventSubscriber},
    sources::AsyncRefreshSource,
    store::{CredentialVault, StoreError},
    AccessTokenRef, CredentialPair,
};

/// An error that ended a refresh attempt
#[derive(Debug, Error)]
pub enum RefreshError {
    /// There was no credential pair to refresh
    #[error("no stored credentials to refresh")]
    MissingCredentials,
    /// The refresh source rejected the exchange
    #[error("credential refresh was rejected")]
    Source(#[source] Box<dyn error::Error + Send + Sync + 'static>),
    /// The refreshed pair could not be read or persisted
    #[error("unable to access stored credentials during refresh")]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    generation: u64,
    pending: Vec<oneshot::Sender<bool>>,
}

struct Inner<S> {
    source: S,
    vault: CredentialVault,
    events: EventBus,
    state: Mutex<RefreshState>,
}

impl<S> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the single in-flight refresh and the queue of callers awaiting it
///
/// Clones share the same state. The refresh itself runs on a spawned task, so a
/// caller that stops waiting does not abandon the refresh on behalf of
/// everyone else. This requires a Tokio runtime.
pub struct RefreshCoordinator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for RefreshCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for RefreshCoordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("RefreshCoordinator")
            .field("source", &self.inner.source)
            .field("vault", &self.inner.vault)
            .field("refreshing", &state.refreshing)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl<S> RefreshCoordinator<S>
where
    S: AsyncRefreshSource + 'static,
{
    /// Constructs a new, idle coordinator
    ///
    /// Refreshed pairs are written to `vault`; a failed refresh is announced on
    /// `events`.
    pub fn new(source: S, vault: CredentialVault, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                vault,
                events,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Parks the caller until a refresh settles
    ///
    /// `rejected` is the access token that the portal just rejected, if one was
    /// sent. Returns `true` if the caller should retry its request with the
    /// current credentials and `false` if it should give up.
    ///
    /// If no refresh is running and the stored access token already differs from
    /// `rejected`, some earlier refresh has outpaced this caller; it is told to
    /// retry immediately. If there are no stored credentials at all, there is
    /// nothing to refresh and the caller is told to give up.
    pub async fn wait_for_refresh(&self, rejected: Option<&AccessTokenRef>) -> bool {
        let verdict = {
            let mut state = self.inner.lock_state();

            if !state.refreshing {
                match self.inner.vault.load() {
                    Ok(Some(current)) => {
                        let superseded =
                            rejected.map_or(true, |r| r.as_str() != current.access_token().as_str());
                        if superseded {
                            tracing::debug!("stored access token already replaced, retrying");
                            return true;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("no stored credentials to refresh");
                        return false;
                    }
                    Err(error) => {
                        tracing::warn!(
                            error = (&error as &dyn error::Error),
                            "unable to read stored credentials before refresh"
                        );
                        return false;
                    }
                }
            }

            let (tx, rx) = oneshot::channel();
            state.pending.push(tx);

            if !state.refreshing {
                state.refreshing = true;
                let generation = state.generation;
                tracing::debug!(generation, "starting credential refresh");
                tokio::spawn(run_refresh(self.inner.clone(), generation));
            } else {
                tracing::trace!(
                    pending = state.pending.len(),
                    "refresh already in flight, queued"
                );
            }

            rx
        };

        verdict.await.unwrap_or(false)
    }
}

impl<S> RefreshCoordinator<S> {
    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_state().refreshing
    }

    /// The number of callers currently parked awaiting a refresh
    pub fn pending_count(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Forces the coordinator back to idle
    ///
    /// Every parked caller is told to give up. The outcome of a refresh that is
    /// still in flight is discarded when it eventually settles.
    pub fn reset(&self) {
        let pending = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.refreshing = false;
            mem::take(&mut state.pending)
        };

        if !pending.is_empty() {
            tracing::debug!(pending = pending.len(), "failing parked callers on reset");
        }

        for waiter in pending {
            let _ = waiter.send(false);
        }
    }
}

impl<S: Send + Sync> EventSubscriber for RefreshCoordinator<S> {
    fn on_event(&self, event: &Event) {
        match event {
            Event::LoggedOut(_) | Event::FirstRun => self.reset(),
            Event::Authenticated(_) => {}
        }
    }
}

async fn run_refresh<S: AsyncRefreshSource>(inner: Arc<Inner<S>>, generation: u64) {
    let outcome = refresh_once(&inner).await;

    let (pending, outcome) = {
        let mut state = inner.lock_state();
        if state.generation != generation {
            tracing::debug!(generation, "discarding outcome of superseded refresh");
            return;
        }

        // The vault is updated before the lock is released so that no caller can
        // observe an idle coordinator next to a stale pair.
        let outcome = match outcome {
            Ok(pair) => inner
                .vault
                .save(&pair)
                .map_err(RefreshError::from),
            Err(error) => Err(error),
        };

        if outcome.is_err() {
            if let Err(error) = inner.vault.clear() {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to clear stored credentials after failed refresh"
                );
            }
        }

        state.refreshing = false;
        (mem::take(&mut state.pending), outcome)
    };

    let succeeded = outcome.is_ok();
    let waiters = pending.len();
    for waiter in pending {
        // A waiter that went away still consumed its verdict.
        let _ = waiter.send(succeeded);
    }

    match outcome {
        Ok(()) => {
            tracing::info!(waiters, "credentials refreshed");
        }
        Err(error) => {
            tracing::warn!(
                error = (&error as &dyn error::Error),
                waiters,
                "credential refresh failed, logging out"
            );
            inner.events.publish(Event::LoggedOut(Some(Arc::new(error))));
        }
    }
}

async fn refresh_once<S: AsyncRefreshSource>(
    inner: &Inner<S>,
) -> Result<CredentialPair, RefreshError> {
    let current = inner
        .vault
        .load()?
        .ok_or(RefreshError::MissingCredentials)?;

    inner
        .source
        .refresh(&current)
        .await
        .map_err(|error| RefreshError::Source(Box::new(error)))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{store::InMemoryCredentialStore, AccessToken, RefreshToken};

    #[derive(Debug, Error)]
    #[error("authority said no")]
    struct Rejected;

    #[derive(Debug)]
    struct GatedSource {
        calls: AtomicUsize,
        returned: AtomicUsize,
        gate: Notify,
        succeed: bool,
    }

    impl GatedSource {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                gate: Notify::new(),
                succeed,
            })
        }

        fn release(&self) {
            self.gate.notify_one();
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AsyncRefreshSource for Arc<GatedSource> {
        type Error = Rejected;

        async fn refresh(&self, current: &CredentialPair) -> Result<CredentialPair, Rejected> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.returned.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                assert_eq!(current.refresh_token().as_str(), "old-refresh");
                Ok(new_pair())
            } else {
                Err(Rejected)
            }
        }
    }

    fn old_pair() -> CredentialPair {
        CredentialPair::new(
            AccessToken::from_static("old-access"),
            RefreshToken::from_static("old-refresh"),
        )
    }

    fn new_pair() -> CredentialPair {
        CredentialPair::new(
            AccessToken::from_static("new-access"),
            RefreshToken::from_static("new-refresh"),
        )
    }

    struct Harness {
        coordinator: RefreshCoordinator<Arc<GatedSource>>,
        source: Arc<GatedSource>,
        vault: CredentialVault,
        logouts: Arc<Mutex<Vec<String>>>,
    }

    fn harness(succeed: bool) -> Harness {
        let vault = CredentialVault::new(Arc::new(InMemoryCredentialStore::new()), "test");
        vault.save(&old_pair()).unwrap();

        let events = EventBus::new();
        let logouts = Arc::new(Mutex::new(Vec::new()));
        let seen = logouts.clone();
        events.subscribe(move |event: &Event| {
            if let Event::LoggedOut(error) = event {
                let message = error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                seen.lock().unwrap().push(message);
            }
        });

        let source = GatedSource::new(succeed);
        let coordinator = RefreshCoordinator::new(source.clone(), vault.clone(), events);

        Harness {
            coordinator,
            source,
            vault,
            logouts,
        }
    }

    async fn wait_until_parked<S>(coordinator: &RefreshCoordinator<S>, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.pending_count() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("callers never parked");
    }

    /// Yields until `counter` reaches `count`
    ///
    /// On a current-thread runtime the refresh task runs to completion without
    /// yielding once its source returns, so observing `returned` means the
    /// outcome has been applied or discarded.
    async fn wait_for(counter: &AtomicUsize, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("refresh source never reached the expected point");
    }

    fn park_callers(
        coordinator: &RefreshCoordinator<Arc<GatedSource>>,
        count: usize,
    ) -> Vec<tokio::task::JoinHandle<bool>> {
        (0..count)
            .map(|_| {
                let coordinator = coordinator.clone();
                let rejected = AccessToken::from_static("old-access");
                tokio::spawn(async move { coordinator.wait_for_refresh(Some(&rejected)).await })
            })
            .collect()
    }

    mod when_refresh_succeeds {
        use super::*;

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn concurrent_callers_share_a_single_refresh() {
            let h = harness(true);
            let callers = park_callers(&h.coordinator, 8);

            wait_until_parked(&h.coordinator, 8).await;
            assert!(h.coordinator.is_refreshing());
            h.source.release();

            for caller in callers {
                assert!(caller.await.unwrap());
            }
            assert_eq!(h.source.calls(), 1);
            assert!(!h.coordinator.is_refreshing());
            assert_eq!(h.coordinator.pending_count(), 0);
        }

        #[tokio::test]
        async fn refreshed_pair_is_persisted() {
            let h = harness(true);
            let callers = park_callers(&h.coordinator, 1);

            wait_until_parked(&h.coordinator, 1).await;
            h.source.release();
            for caller in callers {
                assert!(caller.await.unwrap());
            }

            assert_eq!(h.vault.load().unwrap(), Some(new_pair()));
            assert!(h.logouts.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn late_caller_with_superseded_token_retries_without_refreshing() {
            let h = harness(true);
            let callers = park_callers(&h.coordinator, 1);
            wait_until_parked(&h.coordinator, 1).await;
            h.source.release();
            for caller in callers {
                assert!(caller.await.unwrap());
            }

            let stale = AccessToken::from_static("old-access");
            assert!(h.coordinator.wait_for_refresh(Some(&stale)).await);
            assert_eq!(h.source.calls(), 1);
        }
    }

    mod when_refresh_fails {
        use super::*;

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn every_caller_is_told_to_give_up() {
            let h = harness(false);
            let callers = park_callers(&h.coordinator, 5);

            wait_until_parked(&h.coordinator, 5).await;
            h.source.release();

            for caller in callers {
                assert!(!caller.await.unwrap());
            }
            assert_eq!(h.source.calls(), 1);
        }

        #[tokio::test]
        async fn credentials_are_cleared_and_one_logout_is_published() {
            let h = harness(false);
            let callers = park_callers(&h.coordinator, 3);

            wait_until_parked(&h.coordinator, 3).await;
            h.source.release();
            for caller in callers {
                assert!(!caller.await.unwrap());
            }

            assert_eq!(h.vault.load().unwrap(), None);
            assert_eq!(
                *h.logouts.lock().unwrap(),
                vec!["credential refresh was rejected".to_owned()]
            );
        }

        #[tokio::test]
        async fn later_caller_gives_up_without_another_refresh() {
            let h = harness(false);
            let callers = park_callers(&h.coordinator, 1);
            wait_until_parked(&h.coordinator, 1).await;
            h.source.release();
            for caller in callers {
                caller.await.unwrap();
            }

            let stale = AccessToken::from_static("old-access");
            assert!(!h.coordinator.wait_for_refresh(Some(&stale)).await);
            assert_eq!(h.source.calls(), 1);
            assert_eq!(h.logouts.lock().unwrap().len(), 1);
        }
    }

    mod when_a_caller_stops_waiting {
        use super::*;

        #[tokio::test]
        async fn remaining_callers_still_receive_a_verdict() {
            let h = harness(true);
            let mut callers = park_callers(&h.coordinator, 3);

            wait_until_parked(&h.coordinator, 3).await;
            let abandoned = callers.remove(0);
            abandoned.abort();
            let _ = abandoned.await;

            h.source.release();
            for caller in callers {
                assert!(caller.await.unwrap());
            }
            assert_eq!(h.source.calls(), 1);
            assert_eq!(h.vault.load().unwrap(), Some(new_pair()));
        }
    }

    mod when_reset_during_refresh {
        use super::*;

        #[tokio::test(flavor = "current_thread")]
        async fn parked_callers_give_up_and_refresh_outcome_is_discarded() {
            let h = harness(true);
            let callers = park_callers(&h.coordinator, 2);

            wait_until_parked(&h.coordinator, 2).await;
            wait_for(&h.source.calls, 1).await;
            h.vault.clear().unwrap();
            h.coordinator.on_event(&Event::LoggedOut(None));

            for caller in callers {
                assert!(!caller.await.unwrap());
            }
            assert!(!h.coordinator.is_refreshing());

            h.source.release();
            wait_for(&h.source.returned, 1).await;

            assert_eq!(h.vault.load().unwrap(), None);
            assert!(h.logouts.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn without_stored_credentials_callers_give_up_immediately() {
        let h = harness(true);
        h.vault.clear().unwrap();

        assert!(!h.coordinator.wait_for_refresh(None).await);
        assert_eq!(h.source.calls(), 0);
    }
}
