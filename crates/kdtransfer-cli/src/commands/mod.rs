//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod recv;
pub mod send;

/// KDTransfer - peer-to-peer file transfer over a signalling server
#[derive(Parser)]
#[command(name = "kdtransfer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Send a file to a peer by id
    Send(SendArgs),

    /// Wait to receive a file
    Recv(RecvArgs),
}

/// Arguments for the `send` command.
#[derive(Parser)]
pub struct SendArgs {
    /// Path of the file to send
    #[arg(long, required = true)]
    pub file: PathBuf,

    /// Peer id of the receiver, as printed by `kdtransfer recv`
    #[arg(long, required = true)]
    pub peer: String,

    /// Shared passphrase; when set, the transfer is encrypted end-to-end
    #[arg(long)]
    pub passphrase: Option<String>,
}

/// Arguments for the `recv` command.
#[derive(Parser)]
pub struct RecvArgs {
    /// Shared passphrase; must match the sender's for decryption to succeed
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Directory to write received files into (defaults to the current directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Load configuration with graceful fallback to defaults, matching
/// every other long-running command in this binary.
pub fn load_config() -> kdtransfer_core::Config {
    kdtransfer_core::Config::load().unwrap_or_default()
}
