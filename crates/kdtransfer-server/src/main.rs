//! Standalone signalling server binary, mirroring the original
//! implementation's split between a client and a server command.

use anyhow::Context;
use kdtransfer_core::config::Config;
use kdtransfer_core::signalling::SignallingServer;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::load().context("failed to load configuration")?;
    let addr = format!("0.0.0.0:{}", config.signalling_server_port);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind signalling server on {addr}"))?;
    info!(%addr, "signalling server listening");

    let server = SignallingServer::new();
    server.run(listener).await.context("signalling server stopped")
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,kdtransfer=info,kdtransfer_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
