use std::{io, path::PathBuf, sync::Arc};

use clap::Parser;
use portal_client::{Environment, Portal, PortalConfig};
use portal_tokens::{events::Event, store::FileCredentialStore, ClientId, ClientSecret};

#[derive(Debug, Parser)]
struct Opts {
    /// The portal environment the application is registered in
    #[clap(short, long, env = "PORTAL_ENVIRONMENT", default_value = "sandbox")]
    environment: Environment,

    /// The client ID of the application
    #[clap(short, long, env = "PORTAL_CLIENT_ID")]
    client_id: ClientId,

    /// The client secret of the application
    #[clap(short = 's', long, env = "PORTAL_CLIENT_SECRET", hide_env_values = true)]
    client_secret: ClientSecret,

    /// Where the portal redirects after sign-in
    #[clap(short, long, env = "PORTAL_REDIRECT_URI")]
    redirect_uri: String,

    /// The local file used to store credentials
    #[clap(short = 'f', long, env, default_value = ".credentials.json")]
    credentials_file: PathBuf,

    /// The local file used to store application settings
    #[clap(long, env, default_value = ".settings.json")]
    settings_file: PathBuf,

    /// Sign out once the profile has been fetched
    #[clap(long)]
    logout: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let config = PortalConfig::new(
        opts.environment,
        opts.client_id,
        opts.client_secret,
        opts.redirect_uri,
    );

    let portal = Portal::new(
        config,
        Arc::new(FileCredentialStore::new(opts.credentials_file)),
        Arc::new(FileCredentialStore::new(opts.settings_file)),
    );

    portal.events().subscribe(|event: &Event| match event {
        Event::Authenticated(_) => tracing::info!("signed in"),
        Event::LoggedOut(Some(error)) => tracing::warn!(%error, "signed out"),
        Event::LoggedOut(None) => tracing::info!("signed out"),
        Event::FirstRun => tracing::info!("welcome"),
    });

    if !portal.is_authenticated() {
        println!("Sign in at:\n\n    {}\n", portal.sign_in_url());
        println!("Then paste the URL you were redirected to:");

        let mut redirect = String::new();
        io::stdin().read_line(&mut redirect)?;
        portal.open_redirect(&redirect.trim().parse()?)?;
    }

    let profile = portal.users().my_profile().await?;
    println!(
        "Signed in as {} ({:?}, {})",
        profile.handle, profile.account_type, profile.country
    );

    let friends = portal.users().my_friends().await?;
    for friend in friends {
        println!("  friend: {}", friend.handle);
    }

    if opts.logout {
        portal.logout().await?;
    }

    Ok(())
}
