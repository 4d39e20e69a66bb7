use std::{fmt, str::FromStr};

use portal_tokens::{ClientId, ClientSecret, ClientSecretRef};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The portal deployment an application talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// The sandbox, for development against test accounts
    #[default]
    Sandbox,
    /// The portal's own development deployment
    Develop,
    /// The production deployment
    Production,
}

impl Environment {
    /// The API host for this environment
    pub fn host(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.playportal.io",
            Self::Develop => "https://develop-api.goplayportal.com",
            Self::Production => "https://api.playportal.io",
        }
    }

    /// The API host for this environment, as a URL
    pub fn api_host(self) -> Url {
        Url::parse(self.host()).expect("environment hosts are valid URLs")
    }
}

/// An environment name was not recognized
#[derive(Debug, Error)]
#[error("unknown environment `{0}`, expected sandbox, develop, or production")]
pub struct UnknownEnvironment(String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "develop" => Ok(Self::Develop),
            "production" => Ok(Self::Production),
            _ => Err(UnknownEnvironment(s.to_owned())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Sandbox => "sandbox",
            Self::Develop => "develop",
            Self::Production => "production",
        })
    }
}

/// Everything needed to identify an application to the portal
#[derive(Clone, Debug)]
pub struct PortalConfig {
    environment: Environment,
    api_host: Url,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_uri: String,
    storage_prefix: String,
}

impl PortalConfig {
    /// The storage prefix used unless another is configured
    pub const DEFAULT_STORAGE_PREFIX: &'static str = "PPSDK";

    /// Constructs a configuration for an application registered in `environment`
    pub fn new(
        environment: Environment,
        client_id: ClientId,
        client_secret: ClientSecret,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            api_host: environment.api_host(),
            client_id,
            client_secret,
            redirect_uri: redirect_uri.into(),
            storage_prefix: Self::DEFAULT_STORAGE_PREFIX.to_owned(),
        }
    }

    /// Sends requests to `api_host` instead of the environment's default host
    pub fn with_api_host(mut self, api_host: Url) -> Self {
        self.api_host = api_host;
        self
    }

    /// Changes the prefix under which credentials are stored
    pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = prefix.into();
        self
    }

    /// The environment
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// The API host requests are sent to
    pub fn api_host(&self) -> &Url {
        &self.api_host
    }

    /// The application's client ID
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// The application's client secret
    pub fn client_secret(&self) -> &ClientSecretRef {
        &self.client_secret
    }

    /// Where the portal redirects after sign-in
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// The prefix under which credentials are stored
    pub fn storage_prefix(&self) -> &str {
        &self.storage_prefix
    }

    /// The URL of `path` on the API host
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.api_host.clone();
        url.set_path(path);
        url
    }

    /// The URL a user visits to sign in
    pub fn sign_in_url(&self) -> Url {
        let mut url = self.endpoint("/oauth/signin");
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("client_secret", self.client_secret.as_str())
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "implicit")
            .append_pair("state", "state")
            .append_pair(
                "app_login",
                if self.environment == Environment::Sandbox {
                    "false"
                } else {
                    "true"
                },
            );
        url
    }
}
