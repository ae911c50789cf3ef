//! End-to-end integration tests wiring the signalling server, receiver,
//! and sender together over real `127.0.0.1:0` sockets.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kdtransfer_core::config::Config;
use kdtransfer_core::signalling::SignallingServer;
use kdtransfer_core::transfer::receiver;
use kdtransfer_core::transfer::sender::{send_file, SendRequest};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

async fn spawn_signalling_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = SignallingServer::new();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    port
}

async fn spawn_receiver(config: &Config, passphrase: Option<String>, download_dir: PathBuf) -> String {
    let own_addr = vec![format!("127.0.0.1:{}", config.tcp_port)];
    let (signalling_stream, peer_id) =
        receiver::register_with_addrs(config, passphrase.as_deref(), own_addr)
            .await
            .unwrap();

    let pending_salt = Arc::new(Mutex::new(None));
    tokio::spawn(receiver::run_signalling_listener(
        signalling_stream,
        pending_salt.clone(),
    ));

    let listener = TcpListener::bind(("127.0.0.1", config.tcp_port)).await.unwrap();
    tokio::spawn(receiver::run_accept_loop(
        listener,
        passphrase,
        pending_salt,
        download_dir,
    ));

    peer_id
}

async fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn unencrypted_transfer_round_trips_file_contents() {
    let signalling_port = spawn_signalling_server().await;
    let tcp_port = free_tcp_port().await;
    let config = Config {
        signalling_server_host: "127.0.0.1".to_string(),
        signalling_server_port: signalling_port,
        tcp_port,
        udp_port: 0,
    };

    let download_dir = tempfile::tempdir().unwrap();
    let peer_id = spawn_receiver(&config, None, download_dir.path().to_path_buf()).await;

    let upload_dir = tempfile::tempdir().unwrap();
    let file_path = upload_dir.path().join("hello.txt");
    tokio::fs::write(&file_path, b"Hello").await.unwrap();

    let outcome = send_file(SendRequest {
        config: &config,
        peer_id,
        file_path: &file_path,
        passphrase: None,
    })
    .await
    .unwrap();

    assert_eq!(outcome.bytes_sent, 5);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let received = tokio::fs::read(download_dir.path().join("hello.txt"))
        .await
        .unwrap();
    assert_eq!(received, b"Hello");
}

#[tokio::test]
async fn encrypted_transfer_round_trips_file_contents() {
    let signalling_port = spawn_signalling_server().await;
    let tcp_port = free_tcp_port().await;
    let config = Config {
        signalling_server_host: "127.0.0.1".to_string(),
        signalling_server_port: signalling_port,
        tcp_port,
        udp_port: 0,
    };

    let passphrase = Some("correct horse battery staple".to_string());

    let download_dir = tempfile::tempdir().unwrap();
    let peer_id = spawn_receiver(&config, passphrase.clone(), download_dir.path().to_path_buf()).await;

    let upload_dir = tempfile::tempdir().unwrap();
    let file_path = upload_dir.path().join("secret.bin");
    let contents: Vec<u8> = (0..10_000u32).map(|n| (n % 251) as u8).collect();
    tokio::fs::write(&file_path, &contents).await.unwrap();

    let outcome = send_file(SendRequest {
        config: &config,
        peer_id,
        file_path: &file_path,
        passphrase,
    })
    .await
    .unwrap();

    assert_eq!(outcome.bytes_sent, contents.len() as u64);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let received = tokio::fs::read(download_dir.path().join("secret.bin"))
        .await
        .unwrap();
    assert_eq!(received, contents);
}

#[tokio::test]
async fn empty_file_transfers_with_zero_chunks() {
    let signalling_port = spawn_signalling_server().await;
    let tcp_port = free_tcp_port().await;
    let config = Config {
        signalling_server_host: "127.0.0.1".to_string(),
        signalling_server_port: signalling_port,
        tcp_port,
        udp_port: 0,
    };

    let download_dir = tempfile::tempdir().unwrap();
    let peer_id = spawn_receiver(&config, None, download_dir.path().to_path_buf()).await;

    let upload_dir = tempfile::tempdir().unwrap();
    let file_path = upload_dir.path().join("empty.txt");
    tokio::fs::write(&file_path, b"").await.unwrap();

    let outcome = send_file(SendRequest {
        config: &config,
        peer_id,
        file_path: &file_path,
        passphrase: None,
    })
    .await
    .unwrap();

    assert_eq!(outcome.bytes_sent, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let received = tokio::fs::read(download_dir.path().join("empty.txt"))
        .await
        .unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
async fn lookup_of_unregistered_peer_surfaces_server_error() {
    let signalling_port = spawn_signalling_server().await;
    let tcp_port = free_tcp_port().await;
    let config = Config {
        signalling_server_host: "127.0.0.1".to_string(),
        signalling_server_port: signalling_port,
        tcp_port,
        udp_port: 0,
    };

    let upload_dir = tempfile::tempdir().unwrap();
    let file_path = upload_dir.path().join("orphan.txt");
    tokio::fs::write(&file_path, b"data").await.unwrap();

    let err = send_file(SendRequest {
        config: &config,
        peer_id: "zzzzzzzz".to_string(),
        file_path: &file_path,
        passphrase: None,
    })
    .await
    .unwrap_err();

    assert!(matches!(err, kdtransfer_core::Error::Server(_)));
}
