//! Receiver side of a file transfer: registers with the signalling
//! server, then accepts direct peer connections and writes incoming
//! files to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{build_peer_info, maybe_open};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::net::local_addresses;
use crate::protocol::{self, OpCode, PeerInfo};

/// Salt carried by the most recently received `InfoForward`, shared
/// between the signalling listener and the peer accept loop so that an
/// incoming direct connection can be decrypted with the sender's key.
pub type PendingSalt = Arc<Mutex<Option<String>>>;

/// Registers this process with the signalling server, advertising its
/// enumerated local addresses.
///
/// # Errors
///
/// Returns [`Error::Transport`] if the connection fails, or
/// [`Error::Protocol`] if the server's reply is malformed.
pub async fn register(config: &Config, passphrase: Option<&str>) -> Result<(TcpStream, String)> {
    let addrs = local_addresses(config.tcp_port)
        .map_err(|e| Error::Transport(format!("failed to enumerate local addresses: {e}")))?;
    register_with_addrs(config, passphrase, addrs).await
}

/// As [`register`], but advertises the caller-supplied `addrs` instead of
/// enumerating local interfaces. Exists mainly so integration tests can
/// run over `127.0.0.1` without tripping the loopback filter in
/// [`crate::net::local_addresses`].
///
/// # Errors
///
/// Same as [`register`].
pub async fn register_with_addrs(
    config: &Config,
    passphrase: Option<&str>,
    addrs: Vec<String>,
) -> Result<(TcpStream, String)> {
    let info = build_peer_info(addrs, passphrase)?;

    let mut stream = TcpStream::connect(config.signalling_server_addr())
        .await
        .map_err(|e| Error::Transport(format!("failed to connect to signalling server: {e}")))?;

    let payload = serde_json::to_vec(&info)
        .map_err(|e| Error::Protocol(format!("failed to serialize Hello payload: {e}")))?;
    protocol::write_frame(&mut stream, OpCode::Hello, &payload).await?;

    let mut buf = Vec::new();
    let op = protocol::read_frame(&mut stream, &mut buf, protocol::TOTAL_TCP_SIZE).await?;
    if op != OpCode::ServerAck {
        return Err(Error::Protocol(format!(
            "expected ServerAck after Hello, got {op:?}"
        )));
    }
    let id = String::from_utf8(buf)
        .map_err(|e| Error::Protocol(format!("assigned id is not valid UTF-8: {e}")))?;

    Ok((stream, id))
}

/// Drive the signalling connection after registration: records the salt
/// from each `InfoForward` so the next direct connection can decrypt its
/// frames, and returns once the connection closes or the caller sends `Bye`.
pub async fn run_signalling_listener(mut stream: TcpStream, pending_salt: PendingSalt) {
    loop {
        let mut buf = Vec::new();
        let op = match protocol::read_frame(&mut stream, &mut buf, protocol::TOTAL_TCP_SIZE).await
        {
            Ok(op) => op,
            Err(_) => return,
        };

        match op {
            OpCode::InfoForward => {
                if let Ok(info) = serde_json::from_slice::<PeerInfo>(&buf) {
                    *pending_salt.lock().await = Some(info.salt_data);
                }
            }
            OpCode::Error => {
                warn!(message = %String::from_utf8_lossy(&buf), "signalling server reported an error");
            }
            OpCode::Bye => return,
            _ => {}
        }
    }
}

/// Accept direct peer connections on `listener` until it errors, writing
/// each completed transfer into `download_dir`.
///
/// # Errors
///
/// Returns an error only if `accept` itself fails; per-connection errors
/// are logged and do not stop the loop.
pub async fn run_accept_loop(
    listener: TcpListener,
    passphrase: Option<String>,
    pending_salt: PendingSalt,
    download_dir: PathBuf,
) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let passphrase = passphrase.clone();
        let pending_salt = pending_salt.clone();
        let download_dir = download_dir.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_peer_connection(stream, passphrase.as_deref(), &pending_salt, &download_dir)
                    .await
            {
                warn!(%addr, error = %e, "peer connection ended with error");
            }
        });
    }
}

async fn handle_peer_connection(
    mut stream: TcpStream,
    passphrase: Option<&str>,
    pending_salt: &PendingSalt,
    download_dir: &Path,
) -> Result<()> {
    let salt = pending_salt.lock().await.take().unwrap_or_default();

    let mut buf = Vec::new();
    let op = protocol::read_frame(&mut stream, &mut buf, protocol::TOTAL_TCP_SIZE).await?;
    if op != OpCode::TransferStart {
        return Err(Error::Protocol(format!(
            "expected TransferStart in IDLE state, got {op:?}"
        )));
    }

    let start_payload = maybe_open(&buf, passphrase, &salt)?;
    let start = protocol::parse_transfer_start(&start_payload)
        .ok_or_else(|| Error::Protocol("malformed TransferStart payload".to_string()))?;

    let safe_name = sanitize_filename(&start.filename)?;
    let dest_path = download_dir.join(&safe_name);

    let mut file = tokio::fs::File::create(&dest_path)
        .await
        .map_err(|e| Error::Filesystem(format!("cannot create {}: {e}", dest_path.display())))?;

    let start_time = Instant::now();
    let mut chunks_seen = 0u32;

    loop {
        let mut buf = Vec::new();
        let op = protocol::read_frame(&mut stream, &mut buf, protocol::TOTAL_TCP_SIZE).await?;

        match op {
            OpCode::TransferData => {
                let payload = maybe_open(&buf, passphrase, &salt)?;
                let (tid, _chunk_index, chunk_bytes) = protocol::parse_transfer_data(&payload)
                    .ok_or_else(|| Error::Protocol("malformed TransferData payload".to_string()))?;
                if tid != start.transfer_id {
                    return Err(Error::Protocol(format!(
                        "TransferData for unknown transfer {tid}"
                    )));
                }
                file.write_all(chunk_bytes)
                    .await
                    .map_err(|e| Error::Filesystem(format!("write error: {e}")))?;
                chunks_seen += 1;
            }
            OpCode::TransferEnd => {
                let payload = maybe_open(&buf, passphrase, &salt)?;
                let tid = protocol::parse_transfer_end(&payload)
                    .ok_or_else(|| Error::Protocol("malformed TransferEnd payload".to_string()))?;
                if tid != start.transfer_id {
                    return Err(Error::Protocol(format!(
                        "TransferEnd for unknown transfer {tid}"
                    )));
                }
                file.flush()
                    .await
                    .map_err(|e| Error::Filesystem(format!("flush error: {e}")))?;
                info!(
                    transfer_id = tid,
                    chunks_seen,
                    duration = ?start_time.elapsed(),
                    path = %dest_path.display(),
                    "transfer complete"
                );
                return Ok(());
            }
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected opcode {other:?} in RECEIVING state"
                )));
            }
        }
    }
}

/// Reject filenames carrying path separators or absolute-path prefixes.
/// The advertised name is attacker-controlled wire data; a malicious
/// sender could otherwise write outside the download directory.
fn sanitize_filename(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::Protocol("empty filename".to_string()));
    }

    let mut components = Path::new(name).components();
    let is_plain_single_component = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );

    if !is_plain_single_component || name.contains('/') || name.contains('\\') {
        return Err(Error::Protocol(format!(
            "rejected unsafe filename: {name}"
        )));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_filenames() {
        assert!(sanitize_filename("hello.txt").is_ok());
        assert!(sanitize_filename("archive.tar.gz").is_ok());
    }

    #[test]
    fn rejects_path_separators_and_absolute_paths() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("/etc/passwd").is_err());
        assert!(sanitize_filename("a/b").is_err());
        assert!(sanitize_filename("a\\b").is_err());
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename(".").is_err());
        assert!(sanitize_filename("..").is_err());
    }
}
