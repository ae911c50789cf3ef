//! Sender side of a file transfer: looks up the receiver, races direct
//! connections against its advertised addresses, and streams the file.

use std::path::Path;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::info;

use super::{build_peer_info, maybe_seal, resolve_peer_addrs, transfer_id};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::net::{local_addresses, race_connections};
use crate::protocol::{self, LookupRequest, OpCode, PeerInfo, TCP_CHUNK_SIZE};

/// Parameters for a single send operation.
pub struct SendRequest<'a> {
    /// Configuration (signalling server address, local ports).
    pub config: &'a Config,
    /// The receiver's peer id, as printed by `kdtransfer recv`.
    pub peer_id: String,
    /// Path to the file to send.
    pub file_path: &'a Path,
    /// Optional shared passphrase; `None` disables encryption entirely.
    pub passphrase: Option<String>,
}

/// Outcome of a successful send.
#[derive(Debug)]
pub struct SendOutcome {
    /// Id assigned to this transfer.
    pub transfer_id: u32,
    /// Number of bytes sent.
    pub bytes_sent: u64,
    /// Wall-clock duration of the transfer, from `TransferStart` to `TransferEnd`.
    pub duration: std::time::Duration,
}

/// Run the full sender sequence described for `TransferStart` through
/// `TransferEnd`: lookup, race, stream, and finalize.
///
/// # Errors
///
/// Returns [`Error::Server`] if the signalling server reports the peer
/// id is unknown, [`Error::Crypto`] on key derivation or AEAD failure,
/// [`Error::Transport`] if no direct connection can be established, and
/// [`Error::Filesystem`] if the source file can't be read.
pub async fn send_file(req: SendRequest<'_>) -> Result<SendOutcome> {
    let metadata = tokio::fs::metadata(req.file_path)
        .await
        .map_err(|e| Error::Filesystem(format!("cannot stat {}: {e}", req.file_path.display())))?;
    let file_size = metadata.len();

    let own_addrs = local_addresses(req.config.tcp_port)
        .map_err(|e| Error::Transport(format!("failed to enumerate local addresses: {e}")))?;
    let sender_info = build_peer_info(own_addrs.clone(), req.passphrase.as_deref())?;

    let mut signalling = TcpStream::connect(req.config.signalling_server_addr())
        .await
        .map_err(|e| Error::Transport(format!("failed to connect to signalling server: {e}")))?;

    hello(&mut signalling, &sender_info).await?;

    let target_info = lookup(&mut signalling, &req.peer_id, &sender_info).await?;

    let candidates = resolve_peer_addrs(&target_info, req.passphrase.as_deref())?;
    let mut stream = race_connections(&candidates).await?;

    let filename = req
        .file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Filesystem("file path has no valid filename".to_string()))?
        .to_string();

    let own_addr = own_addrs.first().cloned().unwrap_or_default();
    let tid = transfer_id(&filename, &own_addr);
    #[allow(clippy::cast_possible_truncation)]
    let num_chunks = file_size.div_ceil(TCP_CHUNK_SIZE as u64) as u32;

    let start = Instant::now();

    let start_payload = protocol::encode_transfer_start(tid, &filename, file_size, num_chunks)?;
    let start_payload = maybe_seal(start_payload, req.passphrase.as_deref(), &sender_info.salt_data)?;
    protocol::write_frame(&mut stream, OpCode::TransferStart, &start_payload).await?;

    let mut file = tokio::fs::File::open(req.file_path)
        .await
        .map_err(|e| Error::Filesystem(format!("cannot open {}: {e}", req.file_path.display())))?;

    let mut read_buf = vec![0u8; TCP_CHUNK_SIZE];
    let mut chunk_index = 0u32;
    let mut bytes_sent = 0u64;

    loop {
        let n = file
            .read(&mut read_buf)
            .await
            .map_err(|e| Error::Filesystem(format!("read error: {e}")))?;
        if n == 0 {
            break;
        }

        let chunk_bytes = maybe_seal(
            read_buf[..n].to_vec(),
            req.passphrase.as_deref(),
            &sender_info.salt_data,
        )?;
        let payload = protocol::encode_transfer_data(tid, chunk_index, &chunk_bytes);
        protocol::write_frame(&mut stream, OpCode::TransferData, &payload).await?;

        bytes_sent += n as u64;
        chunk_index += 1;
    }

    let end_payload = protocol::encode_transfer_end(tid);
    let end_payload = maybe_seal(end_payload, req.passphrase.as_deref(), &sender_info.salt_data)?;
    protocol::write_frame(&mut stream, OpCode::TransferEnd, &end_payload).await?;

    let duration = start.elapsed();
    info!(transfer_id = tid, bytes_sent, ?duration, "transfer complete");

    Ok(SendOutcome {
        transfer_id: tid,
        bytes_sent,
        duration,
    })
}

async fn hello(stream: &mut TcpStream, info: &PeerInfo) -> Result<()> {
    let payload = serde_json::to_vec(info)
        .map_err(|e| Error::Protocol(format!("failed to serialize Hello payload: {e}")))?;
    protocol::write_frame(stream, OpCode::Hello, &payload).await?;

    let mut buf = Vec::new();
    let op = protocol::read_frame(stream, &mut buf, protocol::TOTAL_TCP_SIZE).await?;
    if op != OpCode::ServerAck {
        return Err(Error::Protocol(format!(
            "expected ServerAck after Hello, got {op:?}"
        )));
    }
    Ok(())
}

async fn lookup(stream: &mut TcpStream, peer_id: &str, sender_info: &PeerInfo) -> Result<PeerInfo> {
    let request = LookupRequest {
        peer_id: peer_id.to_string(),
        sender_info: sender_info.clone(),
    };
    let payload = serde_json::to_vec(&request)
        .map_err(|e| Error::Protocol(format!("failed to serialize LookupRequest: {e}")))?;
    protocol::write_frame(stream, OpCode::LookupRequest, &payload).await?;

    let mut buf = Vec::new();
    let op = protocol::read_frame(stream, &mut buf, protocol::TOTAL_TCP_SIZE).await?;

    match op {
        OpCode::LookupAck => serde_json::from_slice(&buf)
            .map_err(|e| Error::Protocol(format!("malformed LookupAck payload: {e}"))),
        OpCode::Error => Err(Error::Server(String::from_utf8_lossy(&buf).into_owned())),
        other => Err(Error::Protocol(format!(
            "unexpected opcode {other:?} in reply to LookupRequest"
        ))),
    }
}
