//! `kdtransfer recv` — registers with the signalling server, waits for
//! incoming transfers, and exits cleanly when the user types `disconnect`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use kdtransfer_core::transfer::receiver::{register, run_accept_loop, run_signalling_listener};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use super::RecvArgs;

/// Run the recv command.
pub async fn run(args: RecvArgs) -> Result<()> {
    let config = super::load_config();
    let download_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));

    let (signalling_stream, peer_id) = register(&config, args.passphrase.as_deref())
        .await
        .context("failed to register with signalling server")?;

    println!("your peer id is: {peer_id}");
    println!("waiting for a transfer... type \"disconnect\" and press enter to exit");

    let pending_salt = Arc::new(Mutex::new(None));

    tokio::spawn(run_signalling_listener(signalling_stream, pending_salt.clone()));

    let listener = TcpListener::bind(("0.0.0.0", config.tcp_port))
        .await
        .with_context(|| format!("failed to bind receiver TCP port {}", config.tcp_port))?;

    let accept_handle = tokio::spawn(run_accept_loop(
        listener,
        args.passphrase.clone(),
        pending_salt,
        download_dir,
    ));

    wait_for_disconnect().await?;

    accept_handle.abort();
    println!("disconnected");
    Ok(())
}

/// Block on stdin, in a dedicated blocking task, until the user types
/// `disconnect`. Runs off the Tokio reactor so it never stalls other
/// in-flight transfers.
async fn wait_for_disconnect() -> Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::task::spawn_blocking(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("disconnect") {
                break;
            }
        }
        let _ = tx.send(());
    });

    rx.await.context("stdin reader task ended unexpectedly")
}
