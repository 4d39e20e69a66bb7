use std::{error, fmt, sync::Arc};

use portal_tokens::{
    coordinator::RefreshCoordinator,
    events::{Event, EventBus, SubscriptionId},
    store::{CredentialStore, CredentialVault},
};
use reqwest::Url;

use crate::{
    endpoints::{Buckets, Leaderboard, Users},
    parse_redirect, ApiError, PortalConfig, ReqwestTransport, RequestGateway, RequestSpec,
    SsoError, TokenEndpointRefresher, Transport,
};

/// The gateway type assembled by a [`Portal`]
pub type PortalGateway<T> = RequestGateway<T, TokenEndpointRefresher<T>>;

/// A signed-in (or signing-in) session with the portal
///
/// Construction wires the credential vault and the refresh coordinator to a
/// shared [`EventBus`], so that signing in stores the new credentials and a
/// logout, whether deliberate or forced by a failed refresh, clears them and
/// fails any parked calls. Applications may subscribe to the same bus through
/// [`events()`][Self::events()].
///
/// On construction the settings store is checked for a marker recording that
/// the application has run before. If it is absent, the marker is written and
/// [`Event::FirstRun`] is published, which discards any credentials left
/// behind by a previous installation.
pub struct Portal<T: ?Sized = ReqwestTransport> {
    config: PortalConfig,
    events: EventBus,
    vault: CredentialVault,
    gateway: PortalGateway<T>,
    subscriptions: [SubscriptionId; 2],
}

impl Portal<ReqwestTransport> {
    /// Constructs a session that talks to the portal over HTTPS
    ///
    /// Credentials are kept in `credentials`; the first-run marker is kept in
    /// `settings`. The two may be the same store.
    pub fn new(
        config: PortalConfig,
        credentials: Arc<dyn CredentialStore>,
        settings: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::with_transport(
            config,
            Arc::new(ReqwestTransport::default()),
            credentials,
            settings,
        )
    }
}

impl<T> Portal<T>
where
    T: Transport + ?Sized + 'static,
{
    /// Constructs a session that sends its requests through `transport`
    pub fn with_transport(
        config: PortalConfig,
        transport: Arc<T>,
        credentials: Arc<dyn CredentialStore>,
        settings: Arc<dyn CredentialStore>,
    ) -> Self {
        let events = EventBus::new();
        let vault = CredentialVault::new(credentials, config.storage_prefix());

        let refresher = TokenEndpointRefresher::new(
            transport.clone(),
            config.endpoint("/oauth/token"),
            config.client_id().clone(),
            config.client_secret().to_owned(),
        );
        let coordinator = RefreshCoordinator::new(refresher, vault.clone(), events.clone());

        let subscriptions = [
            events.subscribe(vault.clone()),
            events.subscribe(coordinator.clone()),
        ];

        let portal = Self {
            gateway: RequestGateway::new(transport, vault.clone(), coordinator),
            config,
            events,
            vault,
            subscriptions,
        };

        portal.check_first_run(&*settings);
        portal
    }

    fn check_first_run(&self, settings: &dyn CredentialStore) {
        let marker = format!("{}-firstRun", self.config.client_id());

        match settings.get(&marker) {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(error) = settings.set(&marker, "true") {
                    tracing::warn!(
                        error = (&error as &dyn error::Error),
                        "unable to record first run"
                    );
                }
                tracing::info!("first run, discarding credentials from any previous install");
                self.events.publish(Event::FirstRun);
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to read first-run marker"
                );
            }
        }
    }

    /// The gateway through which authenticated calls are made
    pub fn gateway(&self) -> &PortalGateway<T> {
        &self.gateway
    }

    /// Accepts the redirect the portal sent after sign-in
    ///
    /// The credentials it carries are published as [`Event::Authenticated`]
    /// and thereby stored.
    pub fn open_redirect(&self, redirect: &Url) -> Result<(), SsoError> {
        let pair = parse_redirect(redirect)?;
        tracing::info!("signed in through redirect");
        self.events.publish(Event::Authenticated(pair));
        Ok(())
    }

    /// Ends the session
    ///
    /// The portal is asked to revoke the refresh token. Whatever the portal
    /// answers, the stored credentials are cleared, parked calls are failed,
    /// and [`Event::LoggedOut`] is published; an error from the portal is
    /// then returned to the caller.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let refresh_token = self.vault.refresh_token().unwrap_or_else(|error| {
            tracing::warn!(
                error = (&error as &dyn error::Error),
                "unable to read refresh token for logout"
            );
            None
        });

        let outcome = match refresh_token {
            Some(refresh_token) => {
                let spec = RequestSpec::post(self.config.endpoint("/oauth/logout"))
                    .with_json_body(serde_json::json!({
                        "refresh_token": refresh_token.as_str(),
                    }));
                self.gateway.request_once::<()>(spec, None).await
            }
            None => Ok(()),
        };

        self.events.publish(Event::LoggedOut(None));
        outcome
    }

    /// The user endpoints
    pub fn users(&self) -> Users<'_, T> {
        Users::new(self)
    }

    /// The leaderboard endpoints
    pub fn leaderboard(&self) -> Leaderboard<'_, T> {
        Leaderboard::new(self)
    }

    /// The data bucket endpoints
    pub fn buckets(&self) -> Buckets<'_, T> {
        Buckets::new(self)
    }
}

impl<T: ?Sized> Portal<T> {
    /// The configuration
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// The bus on which lifecycle events are published
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The vault holding the session's credentials
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Whether both tokens are stored
    pub fn is_authenticated(&self) -> bool {
        self.vault.is_authenticated()
    }

    /// The URL a user visits to sign in
    pub fn sign_in_url(&self) -> Url {
        self.config.sign_in_url()
    }
}

impl<T: ?Sized> Drop for Portal<T> {
    fn drop(&mut self) {
        for id in self.subscriptions {
            self.events.unsubscribe(id);
        }
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Debug for Portal<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Portal")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("gateway", &self.gateway)
            .finish()
    }
}
