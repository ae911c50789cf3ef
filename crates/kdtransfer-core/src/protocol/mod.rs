//! KDTransfer wire protocol: framing and the payload formats carried inside.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────┬───────────────────┬─────────────────────┐
//! │  OpCode  │   Payload Length  │       Payload        │
//! │  1 byte  │   4 bytes (BE)    │   variable length    │
//! └──────────┴───────────────────┴─────────────────────┘
//! ```
//!
//! The framing is identical for signalling and direct peer-to-peer traffic.
//! All integers are big-endian. The outer frame header is never encrypted;
//! only certain payloads are, per [`crate::crypto`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of the frame header: 1 opcode byte + 4 length bytes.
pub const HEADER_SIZE: usize = 5;

/// Chunk size for direct TCP transfers: 256 KiB minus the 8-byte
/// transferID/chunkIndex header, so that a full `TransferData` frame
/// never exceeds [`TOTAL_TCP_SIZE`].
pub const TCP_CHUNK_SIZE: usize = 256 * 1024 - 8;

/// Chunk size for a hypothetical WebRTC transport. Not implemented by this
/// crate; kept for wire/constant compatibility with peers that might use it.
pub const WEBRTC_CHUNK_SIZE: usize = 16 * 1024 - 8;

/// Upper bound on a direct-connection frame payload: large enough to hold
/// one maximum-size `TransferData` chunk plus its 8-byte header.
pub const TOTAL_TCP_SIZE: usize = 256 * 1024;

/// Wire opcodes. Stable and part of the external contract — never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// client → server: register with a [`PeerInfo`] descriptor.
    Hello = 1,
    /// server → client: registration accepted, payload is the assigned peer id.
    ServerAck = 2,
    /// client → server: look up a peer id, carrying the requester's descriptor.
    LookupRequest = 3,
    /// server → client: the target's descriptor, in response to `LookupRequest`.
    LookupAck = 4,
    /// either direction: graceful disconnect notice.
    Bye = 5,
    /// server → client: an application-level error (e.g. peer not found).
    Error = 6,
    /// sender → receiver: begin a file transfer.
    TransferStart = 7,
    /// sender → receiver: one chunk of file data.
    TransferData = 8,
    /// sender → receiver: the file transfer is complete.
    TransferEnd = 9,
    /// server → receiver: forwards the sender's descriptor after a lookup.
    InfoForward = 10,
}

impl OpCode {
    /// Parse an opcode from its wire byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Hello),
            2 => Some(Self::ServerAck),
            3 => Some(Self::LookupRequest),
            4 => Some(Self::LookupAck),
            5 => Some(Self::Bye),
            6 => Some(Self::Error),
            7 => Some(Self::TransferStart),
            8 => Some(Self::TransferData),
            9 => Some(Self::TransferEnd),
            10 => Some(Self::InfoForward),
            _ => None,
        }
    }
}

/// A reachability descriptor exchanged via the signalling server.
///
/// When a passphrase is configured, every entry of `local_addr` is the
/// base64 of an AEAD-encrypted address and `salt_data` carries the salt
/// the recipient needs to derive the matching key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Salt used to derive the encryption key for this descriptor's addresses.
    #[serde(rename = "saltData", default)]
    pub salt_data: String,
    /// Connection type of the advertising peer.
    #[serde(rename = "type", default = "PeerType::default")]
    pub peer_type: PeerType,
    /// Local (LAN) addresses, "host:port", possibly encrypted.
    #[serde(rename = "localAddr", default)]
    pub local_addr: Vec<String>,
    /// Public (STUN-discovered) addresses. Always empty in this
    /// implementation — STUN discovery is out of scope — but the field
    /// must round-trip for interoperability.
    #[serde(rename = "publicAddr", default)]
    pub public_addr: Vec<String>,
}

/// The connection type a [`PeerInfo`] advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerType {
    /// A native TCP-capable client (the only type this crate produces).
    Native,
    /// A browser-based peer reachable only via WebRTC.
    Browser,
}

impl Default for PeerType {
    fn default() -> Self {
        Self::Native
    }
}

/// Payload of a `LookupRequest` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupRequest {
    /// The peer id being looked up.
    #[serde(rename = "peerID")]
    pub peer_id: String,
    /// The requester's own descriptor, forwarded to the target on success.
    #[serde(rename = "senderInfo")]
    pub sender_info: PeerInfo,
}

/// Parsed `TransferStart` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStart {
    /// Transient id identifying this transfer.
    pub transfer_id: u32,
    /// Advertised filename (untrusted; callers must sanitize before use).
    pub filename: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Number of `TransferData` frames the receiver should expect.
    pub num_chunks: u32,
}

/// Encode a frame (opcode + big-endian length + payload) into `buf`,
/// reusing its storage. Returns the total number of bytes written.
///
/// # Errors
///
/// Returns [`Error::Framing`] if the payload exceeds `u32::MAX` bytes.
pub fn encode_frame(op: OpCode, payload: &[u8], buf: &mut Vec<u8>) -> Result<usize> {
    if payload.len() > u32::MAX as usize {
        return Err(Error::Framing("payload too large to encode".to_string()));
    }

    buf.clear();
    buf.reserve(HEADER_SIZE + payload.len());
    buf.push(op as u8);
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);

    Ok(buf.len())
}

/// Read a complete frame from an async stream into `buf`.
///
/// Reads exactly [`HEADER_SIZE`] header bytes, then exactly the payload
/// length the header declares. `buf` is resized to hold the payload and
/// the caller gets back the parsed opcode. Fails if the declared length
/// exceeds `max_payload` (framing error, not merely a buffer-too-small
/// condition — the connection must be treated as protocol-violating).
///
/// # Errors
///
/// Returns [`Error::Framing`] on a short read, an unknown opcode, or an
/// oversize frame; returns [`Error::Io`] on an underlying I/O failure.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max_payload: usize) -> Result<OpCode>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| map_read_error(e, "short read on frame header"))?;

    let op = OpCode::from_byte(header[0])
        .ok_or_else(|| Error::Framing(format!("unknown opcode: {}", header[0])))?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    if len > max_payload {
        return Err(Error::Framing(format!(
            "frame payload of {len} bytes exceeds buffer capacity of {max_payload}"
        )));
    }

    buf.clear();
    buf.resize(len, 0);
    if len > 0 {
        reader
            .read_exact(buf)
            .await
            .map_err(|e| map_read_error(e, "short read on frame payload"))?;
    }

    Ok(op)
}

fn map_read_error(e: std::io::Error, context: &str) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Framing(format!("{context}: connection closed"))
    } else {
        Error::Io(e)
    }
}

/// Write a complete frame to an async stream.
///
/// # Errors
///
/// Returns [`Error::Framing`] if the payload is too large to encode, or
/// [`Error::Io`] if the write fails.
pub async fn write_frame<W>(writer: &mut W, op: OpCode, payload: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let mut scratch = Vec::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(op, payload, &mut scratch)?;
    writer.write_all(&scratch).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode a `TransferStart` payload: `[transferID u32][filenameLen
/// u16][filename][fileSize u64][numChunks u32]`.
///
/// # Errors
///
/// Returns [`Error::Framing`] if `filename` is longer than 65535 bytes.
pub fn encode_transfer_start(
    transfer_id: u32,
    filename: &str,
    file_size: u64,
    num_chunks: u32,
) -> Result<Vec<u8>> {
    let name_bytes = filename.as_bytes();
    if name_bytes.len() > u16::MAX as usize {
        return Err(Error::Framing(format!(
            "filename of {} bytes exceeds the 65535 byte limit",
            name_bytes.len()
        )));
    }

    let mut payload = Vec::with_capacity(6 + name_bytes.len() + 12);
    payload.extend_from_slice(&transfer_id.to_be_bytes());
    #[allow(clippy::cast_possible_truncation)]
    payload.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
    payload.extend_from_slice(name_bytes);
    payload.extend_from_slice(&file_size.to_be_bytes());
    payload.extend_from_slice(&num_chunks.to_be_bytes());

    Ok(payload)
}

/// Parse a `TransferStart` payload.
///
/// Returns `None` if `payload` is too short to contain a well-formed
/// message; callers MUST treat that as a protocol error rather than
/// silently accepting a zeroed-out transfer.
#[must_use]
pub fn parse_transfer_start(payload: &[u8]) -> Option<TransferStart> {
    if payload.len() < 6 {
        return None;
    }

    let transfer_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let name_len = u16::from_be_bytes([payload[4], payload[5]]) as usize;

    if payload.len() < 6 + name_len + 12 {
        return None;
    }

    let name_start = 6;
    let name_end = name_start + name_len;
    let filename = String::from_utf8_lossy(&payload[name_start..name_end]).into_owned();

    let size_start = name_end;
    let file_size = u64::from_be_bytes(payload[size_start..size_start + 8].try_into().ok()?);

    let chunks_start = size_start + 8;
    let num_chunks = u32::from_be_bytes(payload[chunks_start..chunks_start + 4].try_into().ok()?);

    Some(TransferStart {
        transfer_id,
        filename,
        file_size,
        num_chunks,
    })
}

/// Encode a `TransferData` payload: `[transferID u32][chunkIndex
/// u32][chunkBytes]`.
#[must_use]
pub fn encode_transfer_data(transfer_id: u32, chunk_index: u32, chunk: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + chunk.len());
    payload.extend_from_slice(&transfer_id.to_be_bytes());
    payload.extend_from_slice(&chunk_index.to_be_bytes());
    payload.extend_from_slice(chunk);
    payload
}

/// Parse a `TransferData` payload. Returns `(transferID, chunkIndex,
/// chunkBytes)`; `chunkBytes` may be empty. Returns `None` if the payload
/// is shorter than the 8-byte header.
#[must_use]
pub fn parse_transfer_data(payload: &[u8]) -> Option<(u32, u32, &[u8])> {
    if payload.len() < 8 {
        return None;
    }

    let transfer_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let chunk_index = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

    Some((transfer_id, chunk_index, &payload[8..]))
}

/// Encode a `TransferEnd` payload: the 4-byte transferID.
#[must_use]
pub fn encode_transfer_end(transfer_id: u32) -> Vec<u8> {
    transfer_id.to_be_bytes().to_vec()
}

/// Parse a `TransferEnd` payload. Returns `None` if shorter than 4 bytes.
#[must_use]
pub fn parse_transfer_end(payload: &[u8]) -> Option<u32> {
    if payload.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip_via_encode_and_manual_parse() {
        let mut buf = Vec::new();
        let n = encode_frame(OpCode::Hello, b"hello", &mut buf).unwrap();
        assert_eq!(n, HEADER_SIZE + 5);
        assert_eq!(buf[0], OpCode::Hello as u8);
        assert_eq!(&buf[1..5], &5u32.to_be_bytes());
        assert_eq!(&buf[5..], b"hello");
    }

    #[test]
    fn empty_payload_frame() {
        let mut buf = Vec::new();
        encode_frame(OpCode::Bye, &[], &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[1..5], &0u32.to_be_bytes());
    }

    #[tokio::test]
    async fn read_frame_round_trips_with_write_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, OpCode::LookupAck, b"{}")
            .await
            .unwrap();

        let mut buf = Vec::new();
        let op = read_frame(&mut server, &mut buf, TOTAL_TCP_SIZE).await.unwrap();
        assert_eq!(op, OpCode::LookupAck);
        assert_eq!(buf, b"{}");
    }

    #[tokio::test]
    async fn read_frame_rejects_oversize_payload() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, OpCode::TransferData, &[0u8; 100])
            .await
            .unwrap();

        let mut buf = Vec::new();
        let err = read_frame(&mut server, &mut buf, 10).await.unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[tokio::test]
    async fn read_frame_rejects_unknown_opcode() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(&[255, 0, 0, 0, 0]).await.unwrap();

        let mut buf = Vec::new();
        let err = read_frame(&mut server, &mut buf, TOTAL_TCP_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[tokio::test]
    async fn read_frame_surfaces_eof_mid_header_as_framing_error() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);

        let mut buf = Vec::new();
        let err = read_frame(&mut server, &mut buf, TOTAL_TCP_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[test]
    fn transfer_start_round_trips() {
        let payload = encode_transfer_start(42, "hello.txt", 5, 1).unwrap();
        let parsed = parse_transfer_start(&payload).unwrap();
        assert_eq!(
            parsed,
            TransferStart {
                transfer_id: 42,
                filename: "hello.txt".to_string(),
                file_size: 5,
                num_chunks: 1,
            }
        );
    }

    #[test]
    fn transfer_start_rejects_truncated_payload() {
        let payload = encode_transfer_start(1, "file.bin", 100, 1).unwrap();
        assert!(parse_transfer_start(&payload[..payload.len() - 1]).is_none());
        assert!(parse_transfer_start(&[]).is_none());
    }

    #[test]
    fn transfer_start_accepts_max_filename_length_and_rejects_overflow() {
        let max_name = "a".repeat(u16::MAX as usize);
        assert!(encode_transfer_start(1, &max_name, 0, 0).is_ok());

        let too_long = "a".repeat(u16::MAX as usize + 1);
        assert!(encode_transfer_start(1, &too_long, 0, 0).is_err());
    }

    #[test]
    fn transfer_data_round_trips_including_empty_chunk() {
        let payload = encode_transfer_data(7, 3, b"chunk");
        let (tid, idx, bytes) = parse_transfer_data(&payload).unwrap();
        assert_eq!((tid, idx, bytes), (7, 3, b"chunk".as_slice()));

        let empty_payload = encode_transfer_data(7, 0, &[]);
        let (_, _, bytes) = parse_transfer_data(&empty_payload).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn transfer_data_rejects_short_payload() {
        assert!(parse_transfer_data(&[0u8; 7]).is_none());
    }

    #[test]
    fn transfer_end_round_trips() {
        let payload = encode_transfer_end(99);
        assert_eq!(parse_transfer_end(&payload), Some(99));
        assert_eq!(parse_transfer_end(&[0, 0]), None);
    }

    #[test]
    fn peer_info_serializes_with_expected_field_names() {
        let info = PeerInfo {
            salt_data: "salt".to_string(),
            peer_type: PeerType::Native,
            local_addr: vec!["127.0.0.1:2502".to_string()],
            public_addr: vec![],
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"saltData\":\"salt\""));
        assert!(json.contains("\"localAddr\":[\"127.0.0.1:2502\"]"));
        assert!(json.contains("\"publicAddr\":[]"));

        let round_tripped: PeerInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped.local_addr, info.local_addr);
    }
}
