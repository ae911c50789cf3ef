//! The peer transfer engine: drives the per-transfer state machine on
//! both the sending and receiving side of a direct peer connection.

pub mod receiver;
pub mod sender;

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::crypto;
use crate::error::{Error, Result};
use crate::protocol::{PeerInfo, PeerType};

/// Build a [`PeerInfo`] advertising `addrs`, encrypting each entry under
/// a freshly generated salt when `passphrase` is set.
pub(crate) fn build_peer_info(addrs: Vec<String>, passphrase: Option<&str>) -> Result<PeerInfo> {
    let Some(passphrase) = passphrase else {
        return Ok(PeerInfo {
            salt_data: String::new(),
            peer_type: PeerType::Native,
            local_addr: addrs,
            public_addr: vec![],
        });
    };

    let salt = crypto::generate_random_salt();
    let key = crypto::derive_key(passphrase, &salt);

    let encrypted = addrs
        .iter()
        .map(|addr| crypto::seal(&key, addr.as_bytes()).map(|sealed| BASE64.encode(sealed)))
        .collect::<Result<Vec<_>>>()?;

    Ok(PeerInfo {
        salt_data: salt,
        peer_type: PeerType::Native,
        local_addr: encrypted,
        public_addr: vec![],
    })
}

/// Recover the plaintext addresses advertised by `info`, decrypting each
/// entry when `passphrase` is set.
pub(crate) fn resolve_peer_addrs(info: &PeerInfo, passphrase: Option<&str>) -> Result<Vec<String>> {
    let Some(passphrase) = passphrase else {
        return Ok(info.local_addr.clone());
    };

    let key = crypto::derive_key(passphrase, &info.salt_data);

    info.local_addr
        .iter()
        .map(|encoded| {
            let sealed = BASE64
                .decode(encoded)
                .map_err(|e| Error::Crypto(format!("malformed base64 address: {e}")))?;
            let plaintext = crypto::open(&key, &sealed)?;
            String::from_utf8(plaintext)
                .map_err(|e| Error::Crypto(format!("decrypted address is not valid UTF-8: {e}")))
        })
        .collect()
}

/// Seal `payload` under `passphrase` if set, otherwise return it unchanged.
pub(crate) fn maybe_seal(payload: Vec<u8>, passphrase: Option<&str>, salt: &str) -> Result<Vec<u8>> {
    match passphrase {
        Some(passphrase) => {
            let key = crypto::derive_key(passphrase, salt);
            crypto::seal(&key, &payload)
        }
        None => Ok(payload),
    }
}

/// Open `payload` under `passphrase` if set, otherwise return it unchanged.
pub(crate) fn maybe_open(payload: &[u8], passphrase: Option<&str>, salt: &str) -> Result<Vec<u8>> {
    match passphrase {
        Some(passphrase) => {
            let key = crypto::derive_key(passphrase, salt);
            crypto::open(&key, payload)
        }
        None => Ok(payload.to_vec()),
    }
}

/// Derive a transfer id from the filename, the sender's local address,
/// and the current time. Not a cryptographic identity — just a
/// low-collision transient label scoped to one receiver's lifetime.
#[must_use]
pub fn transfer_id(filename: &str, sender_local_addr: &str) -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let input = format!("{filename}-{sender_local_addr}-{nanos}");
    let digest = Sha256::digest(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// State held per in-flight transfer.
#[derive(Debug)]
pub struct Transfer {
    /// Transient id identifying this transfer.
    pub transfer_id: u32,
    /// Advertised filename (already sanitized for receiver-side use).
    pub filename: String,
    /// Total file size in bytes, as advertised by `TransferStart`.
    pub file_size: u64,
    /// Number of `TransferData` frames expected.
    pub num_chunks: u32,
    /// Number of `TransferData` frames seen so far.
    pub chunks_seen: u32,
}
