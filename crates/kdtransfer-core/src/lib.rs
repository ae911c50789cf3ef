//! Core library for KDTransfer: a peer-to-peer file transfer tool that
//! rendezvouses through a signalling server.
//!
//! This crate implements the wire protocol and framing
//! ([`protocol`]), passphrase-derived AEAD encryption ([`crypto`]),
//! local address enumeration and connection racing ([`net`]), the
//! rendezvous signalling server ([`signalling`]), and the sender/receiver
//! transfer engines ([`transfer`]). It emits [`tracing`] events but never
//! initializes a subscriber — that is left to the binaries that link it.

pub mod config;
pub mod crypto;
pub mod error;
pub mod net;
pub mod protocol;
pub mod signalling;
pub mod transfer;

pub use config::Config;
pub use error::{Error, Result};
