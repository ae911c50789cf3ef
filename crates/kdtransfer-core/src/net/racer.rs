//! Races TCP dials against a set of candidate addresses and returns
//! whichever connects first.
//!
//! Each candidate gets its own dial attempt, capped at
//! [`PER_ATTEMPT_TIMEOUT`]. The whole race is capped at
//! [`OVERALL_TIMEOUT`]. The first successful connection is handed back
//! through a capacity-1 channel; every other in-flight or late-arriving
//! connection is dropped, which closes its socket.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Per-candidate dial timeout.
pub const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Overall race timeout, regardless of how many candidates remain.
pub const OVERALL_TIMEOUT: Duration = Duration::from_secs(3);

/// Dial every address in `candidates` concurrently and return the stream
/// of whichever connects first.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if no candidate connects within
/// [`OVERALL_TIMEOUT`], or [`Error::Transport`] if `candidates` is empty
/// or every dial fails before the deadline.
pub async fn race_connections(candidates: &[String]) -> Result<TcpStream> {
    if candidates.is_empty() {
        return Err(Error::Transport(
            "no candidate addresses to race".to_string(),
        ));
    }

    let (tx, mut rx) = mpsc::channel::<TcpStream>(1);

    for addr in candidates.iter().cloned() {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Ok(Ok(stream)) = timeout(PER_ATTEMPT_TIMEOUT, TcpStream::connect(&addr)).await
            {
                // Err here just means a faster winner already arrived and the
                // receiver was dropped; this loser's stream is closed on drop.
                let _ = tx.send(stream).await;
            }
        });
    }
    drop(tx);

    match timeout(OVERALL_TIMEOUT, rx.recv()).await {
        Ok(Some(stream)) => Ok(stream),
        Ok(None) => Err(Error::Transport(
            "all dial attempts failed".to_string(),
        )),
        Err(_) => Err(Error::Timeout(OVERALL_TIMEOUT)),
    }
}
