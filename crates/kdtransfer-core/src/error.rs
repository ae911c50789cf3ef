//! Error types for KDTransfer.
//!
//! One variant per abstract error kind named in the wire protocol and
//! transfer engine design: framing, protocol sequencing, lookup, crypto,
//! transport, and filesystem failures.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for KDTransfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for KDTransfer.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed frame: short read, oversize payload, or unknown opcode.
    #[error("framing error: {0}")]
    Framing(String),

    /// Message arrived out of sequence for the connection's state machine.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A signalling lookup targeted a peer id that isn't registered.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Key derivation or AEAD seal/open failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Dialing a peer, racing candidates, or writing to a socket failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Opening, creating, or writing the transferred file failed.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// An operation exceeded its deadline (race, outbox enqueue, write).
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The signalling server reported an application-level error.
    #[error("server error: {0}")]
    Server(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
