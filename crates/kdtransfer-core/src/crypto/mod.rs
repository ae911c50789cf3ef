//! Passphrase-derived symmetric encryption for peer descriptors.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 from a user passphrase and a
//! per-registration salt, then used with AES-256-GCM to seal the local
//! addresses a peer advertises through the signalling server. A random
//! 12-byte nonce is generated per message and prepended to the
//! ciphertext, so `seal`'s output can be handed directly to `open`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// PBKDF2 iteration count. Matches the original implementation's choice;
/// changing it would break interoperability with existing salts.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derived key length in bytes (AES-256 key size).
const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Length of the random id portion of a generated salt.
const SALT_ID_LEN: usize = 8;

/// Derive a 32-byte AES-256 key from `passphrase` and `salt_data` using
/// PBKDF2-HMAC-SHA256. The actual PBKDF2 salt is `SHA256(salt_data)`,
/// not `salt_data` itself, so arbitrarily long salt strings are
/// normalized to a fixed-size input.
#[must_use]
pub fn derive_key(passphrase: &str, salt_data: &str) -> [u8; KEY_LEN] {
    let salt = Sha256::digest(salt_data.as_bytes());

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        salt.as_slice(),
        PBKDF2_ITERATIONS,
        &mut key,
    );
    key
}

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext`.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if the underlying AEAD seal operation fails.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("AEAD seal failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.append(&mut ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext` blob produced by [`seal`].
///
/// # Errors
///
/// Returns [`Error::Crypto`] if `sealed` is shorter than the nonce length
/// or the AEAD open operation fails (wrong key, or tampered data).
pub fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(Error::Crypto(
            "sealed data shorter than the nonce length".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| Error::Crypto(format!("AEAD open failed: {e}")))
}

/// Generate a fresh salt: an 8-character lowercase-alphanumeric id
/// followed by the current UTC timestamp, e.g. `a1b2c3d4-1706627200`.
#[must_use]
pub fn generate_random_salt() -> String {
    let id = generate_id(SALT_ID_LEN);
    let timestamp = chrono::Utc::now().timestamp();
    format!("{id}-{timestamp}")
}

/// Generate an `n`-character lowercase-alphanumeric id. Used both for
/// salts and, by the signalling server, for peer ids.
#[must_use]
pub fn generate_id(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .take(n)
        .collect()
}
