//! `kdtransfer send` — sends a file to a peer by id.

use anyhow::{bail, Context, Result};
use kdtransfer_core::transfer::sender::{send_file, SendRequest};

use super::SendArgs;

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    validate(&args)?;

    let config = super::load_config();

    println!("sending {} to {}...", args.file.display(), args.peer);

    let outcome = send_file(SendRequest {
        config: &config,
        peer_id: args.peer.clone(),
        file_path: &args.file,
        passphrase: args.passphrase.clone(),
    })
    .await
    .with_context(|| format!("failed to send {} to {}", args.file.display(), args.peer))?;

    println!(
        "transfer {} complete: {} bytes in {:.2}s",
        outcome.transfer_id,
        outcome.bytes_sent,
        outcome.duration.as_secs_f64()
    );

    Ok(())
}

/// Validate required flags before constructing a client, the way the
/// original implementation's CLI layer checked its arguments up front
/// rather than letting a deep transfer-engine error stand in for a
/// simple usage mistake.
fn validate(args: &SendArgs) -> Result<()> {
    if args.peer.trim().is_empty() {
        bail!("--peer must not be empty");
    }
    if !args.file.exists() {
        bail!("file not found: {}", args.file.display());
    }
    if !args.file.is_file() {
        bail!("not a regular file: {}", args.file.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_empty_peer_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"data").unwrap();

        let args = SendArgs {
            file,
            peer: "  ".to_string(),
            passphrase: None,
        };
        assert!(validate(&args).is_err());
    }

    #[test]
    fn rejects_missing_file() {
        let args = SendArgs {
            file: PathBuf::from("/nonexistent/path/to/file.txt"),
            peer: "aaaa1111".to_string(),
            passphrase: None,
        };
        assert!(validate(&args).is_err());
    }

    #[test]
    fn accepts_valid_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"data").unwrap();

        let args = SendArgs {
            file,
            peer: "aaaa1111".to_string(),
            passphrase: None,
        };
        assert!(validate(&args).is_ok());
    }
}
