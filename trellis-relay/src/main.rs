use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis_relay::{Registry, RelayState, router};

#[derive(Parser)]
#[command(name = "trellis-relay", version, about = "Signaling relay for trellis mesh sessions")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trellis_relay=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let args = Args::parse();

    let (registry_tx, registry_rx) = mpsc::channel(256);
    tokio::spawn(Registry::new(registry_rx).run());

    let app = router(RelayState { registry_tx });

    info!("Relay listening on {}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
