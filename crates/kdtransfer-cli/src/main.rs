//! KDTransfer CLI - peer-to-peer file transfer over a signalling server.
//!
//! ## Quick Start
//!
//! ```bash
//! # On the receiving machine
//! kdtransfer recv
//!
//! # On the sending machine
//! kdtransfer send --file ./document.pdf --peer <peer-id>
//! ```

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Recv(args) => commands::recv::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,kdtransfer=info,kdtransfer_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
