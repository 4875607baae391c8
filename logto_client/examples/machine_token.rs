use std::{path::PathBuf, sync::Arc, time::Duration};

use aliri_clock::{Clock, System};
use clap::Parser;
use logto_client::{storage::FileStorage, LogtoClient, LogtoConfig};
use logto_core::{AppId, AppSecret, Resource};
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The Logto endpoint
    #[arg(short, long, env = "LOGTO_ENDPOINT")]
    endpoint: String,

    /// The ID of the machine-to-machine application
    #[arg(short, long, env = "LOGTO_APP_ID")]
    app_id: String,

    /// The secret of the machine-to-machine application
    #[arg(short = 's', long, env = "LOGTO_APP_SECRET", hide_env_values = true)]
    app_secret: String,

    /// The API resource to request tokens for
    #[arg(short, long, env = "LOGTO_RESOURCE")]
    resource: String,

    /// The local file used to keep the session
    #[arg(short = 'f', long, env, default_value = ".logto-session.json")]
    session_file: PathBuf,
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

    let resource = Resource::new(opts.resource);
    let config = LogtoConfig::new(opts.endpoint, AppId::new(opts.app_id))
        .with_app_secret(AppSecret::new(opts.app_secret))
        .with_resources(vec![resource.clone()]);

    let storage = Arc::new(FileStorage::new(opts.session_file));
    let client = LogtoClient::new(config, storage).await?;

    let mut interval = time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;

        let token = client.get_machine_access_token(&resource).await?;
        let remaining = token.expires_at().0.saturating_sub(System.now().0);

        if remaining < 60 {
            tracing::warn!(remaining, expiry = token.expires_at().0, "pulled token");
        } else {
            tracing::debug!(
                token = format_args!("{:#?}", token.token()),
                remaining,
                expiry = token.expires_at().0,
                "pulled token"
            );
        }
    }
}
