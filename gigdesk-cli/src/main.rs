//! Gigdesk server binary

use clap::Parser;
use gigdesk_api::{serve, ApiState, ServerConfig};
use gigdesk_core::{
    auth::{AuthGuard, PlaintextVerifier},
    marketplace::{Marketplace, MarketplaceConfig},
    session::SessionRegistry,
    store::RecordStore,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gigdesk", about = "Minimal gig marketplace backend with escrow settlement")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Directory holding the durable record collections
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting gigdesk with data dir {}", args.data_dir.display());

    let store = Arc::new(RecordStore::open(&args.data_dir)?);
    let sessions = Arc::new(SessionRegistry::new());
    let market = Arc::new(Marketplace::new(
        MarketplaceConfig::default(),
        store.clone(),
        sessions.clone(),
        Arc::new(PlaintextVerifier),
    ));
    market.ensure_admin().await?;
    let guard = Arc::new(AuthGuard::new(store.clone(), sessions));

    serve(
        ServerConfig {
            listen: args.listen,
        },
        ApiState { market, guard },
        store,
    )
    .await
}
