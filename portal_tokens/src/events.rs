//! Broadcast of credential lifecycle events

use std::{
    error, fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
};

use crate::CredentialPair;

/// A credential lifecycle event
#[derive(Clone, Debug)]
pub enum Event {
    /// A user obtained a credential pair through sign-in
    Authenticated(CredentialPair),
    /// The user's credentials are gone
    ///
    /// Carries the error that forced the logout, if any. A deliberate logout
    /// carries `None`.
    LoggedOut(Option<Arc<dyn error::Error + Send + Sync>>),
    /// The application is running for the first time since installation, so
    /// anything left in durable storage belongs to a previous install
    FirstRun,
}

/// A party interested in lifecycle events
///
/// Handlers run synchronously on the publishing thread and should return
/// quickly.
pub trait EventSubscriber: Send + Sync {
    /// Handles a single event
    fn on_event(&self, event: &Event);
}

impl<F> EventSubscriber for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Identifies a subscription so that it can later be removed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>,
}

/// A publish/subscribe channel for [`Event`]s
///
/// Events are delivered synchronously, in subscription order, to every party
/// subscribed at the moment of publication. No history is retained. A
/// subscriber that panics is logged and skipped; delivery to the remaining
/// subscribers continues. Clones share the same set of subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Subscribers>>,
}

impl EventBus {
    /// Constructs a new bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber
    pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionId
    where
        S: EventSubscriber + 'static,
    {
        self.subscribe_arc(Arc::new(subscriber))
    }

    /// Adds a shared subscriber
    pub fn subscribe_arc(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.entries.push((id, subscriber));
        tracing::trace!(subscription = id.0, "added event subscriber");
        id
    }

    /// Removes a subscriber
    ///
    /// Returns whether the subscription was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(i, _)| *i != id);
        before != subscribers.entries.len()
    }

    /// The number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Delivers `event` to every current subscriber
    pub fn publish(&self, event: Event) {
        let snapshot: Vec<_> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone();

        tracing::debug!(
            event = event_name(&event),
            subscribers = snapshot.len(),
            "publishing lifecycle event"
        );

        for (id, subscriber) in snapshot {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event)));
            if delivered.is_err() {
                tracing::error!(
                    subscription = id.0,
                    event = event_name(&event),
                    "event subscriber panicked"
                );
            }
        }
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::Authenticated(_) => "authenticated",
        Event::LoggedOut(_) => "logged_out",
        Event::FirstRun => "first_run",
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
