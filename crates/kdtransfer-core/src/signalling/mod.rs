//! The rendezvous signalling server: registers peers, stores their
//! reachability descriptors, and brokers peer-lookup requests.
//!
//! Each accepted connection runs on its own task and moves through
//! `INIT -> REGISTERED -> CLOSED`. A registered peer gets a dedicated
//! writer task that owns the write half of its socket — the *only* code
//! path allowed to touch it after registration — fed by a bounded
//! outbox queue that lookup handlers enqueue into.

mod buffer_pool;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::crypto::generate_id;
use crate::error::{Error, Result};
use crate::protocol::{self, LookupRequest, OpCode, PeerInfo};
use buffer_pool::BufferPool;

/// Outbox capacity per registered peer.
const OUTBOX_CAPACITY: usize = 64;

/// Read buffer size drawn from the pool for each frame.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Deadline for the writer task to flush a single message.
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline for enqueuing a direct reply to the requester (fatal if missed).
const REPLY_ENQUEUE_DEADLINE: Duration = Duration::from_secs(1);

/// Deadline for enqueuing an `InfoForward` to the lookup target (best-effort).
const FORWARD_ENQUEUE_DEADLINE: Duration = Duration::from_secs(1);

/// Length of a generated peer id.
const PEER_ID_LEN: usize = 8;

/// Number of times to retry id generation on collision before giving up.
const ID_GENERATION_RETRIES: u32 = 16;

/// A message queued for a peer's writer task.
type OutboundMessage = (OpCode, Vec<u8>);

struct RegisteredPeer {
    info: PeerInfo,
    outbox: mpsc::Sender<OutboundMessage>,
}

/// Shared, lock-free map from peer id to its registration state.
type PeerMap = DashMap<String, RegisteredPeer>;

/// The signalling server. Cheaply cloneable; all clones share the same
/// peer map and buffer pool.
#[derive(Clone)]
pub struct SignallingServer {
    peers: Arc<PeerMap>,
    buffers: Arc<BufferPool>,
}

impl Default for SignallingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignallingServer {
    /// Construct a new server with an empty peer map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
            buffers: Arc::new(BufferPool::new(READ_BUFFER_SIZE)),
        }
    }

    /// Number of currently registered peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Accept connections from `listener` until it errors, spawning one
    /// task per connection. Runs forever; callers typically `tokio::spawn`
    /// this or call it directly from `main`.
    ///
    /// # Errors
    ///
    /// Returns an error if `accept` itself fails (e.g. out of file
    /// descriptors). Per-connection errors are logged, not propagated.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            debug!(%addr, "accepted signalling connection");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!(%addr, error = %e, "signalling connection closed with error");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (mut reader, writer) = tokio::io::split(stream);

        let (id, outbox_tx, writer_rx) = self.register(&mut reader).await?;

        tokio::spawn(run_writer(id.clone(), writer, writer_rx));

        info!(peer_id = %id, "peer registered");

        let result = self.serve(&id, &mut reader, &outbox_tx).await;
        self.peers.remove(&id);
        info!(peer_id = %id, "peer deregistered");
        result
    }

    /// Read the INIT-state Hello, assign an id, and register the peer
    /// with a freshly created outbox channel. Returns the assigned id,
    /// the sending half (for lookup replies), and the receiving half
    /// (for the writer task to drain).
    async fn register(
        &self,
        reader: &mut ReadHalf<TcpStream>,
    ) -> Result<(String, mpsc::Sender<OutboundMessage>, mpsc::Receiver<OutboundMessage>)> {
        let mut buf = self.buffers.get();
        let op = protocol::read_frame(reader, &mut buf, protocol::TOTAL_TCP_SIZE).await?;

        if op != OpCode::Hello {
            return Err(Error::Protocol(format!(
                "expected Hello in INIT state, got {op:?}"
            )));
        }

        let info: PeerInfo = serde_json::from_slice(&buf)
            .map_err(|e| Error::Protocol(format!("malformed Hello payload: {e}")))?;
        self.buffers.put(buf);

        let id = self.generate_unique_id()?;
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.peers.insert(
            id.clone(),
            RegisteredPeer {
                info,
                outbox: tx.clone(),
            },
        );

        Ok((id, tx, rx))
    }

    fn generate_unique_id(&self) -> Result<String> {
        for _ in 0..ID_GENERATION_RETRIES {
            let candidate = generate_id(PEER_ID_LEN);
            if !self.peers.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::Protocol(
            "exhausted retries generating a unique peer id".to_string(),
        ))
    }

    async fn serve(
        &self,
        id: &str,
        reader: &mut ReadHalf<TcpStream>,
        outbox_tx: &mpsc::Sender<OutboundMessage>,
    ) -> Result<()> {
        send_server_ack(outbox_tx, id).await?;

        loop {
            let mut buf = self.buffers.get();
            let op = match protocol::read_frame(reader, &mut buf, protocol::TOTAL_TCP_SIZE).await {
                Ok(op) => op,
                Err(Error::Framing(_)) => {
                    debug!(peer_id = %id, "connection closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match op {
                OpCode::LookupRequest => {
                    self.handle_lookup(id, &buf, outbox_tx).await?;
                }
                OpCode::Bye => {
                    debug!(peer_id = %id, "peer said bye");
                    self.buffers.put(buf);
                    return Ok(());
                }
                OpCode::Hello => {
                    return Err(Error::Protocol("duplicate Hello after registration".to_string()));
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected opcode {other:?} in REGISTERED state"
                    )));
                }
            }

            self.buffers.put(buf);
        }
    }

    async fn handle_lookup(
        &self,
        requester_id: &str,
        payload: &[u8],
        requester_outbox: &mpsc::Sender<OutboundMessage>,
    ) -> Result<()> {
        let request: LookupRequest = serde_json::from_slice(payload)
            .map_err(|e| Error::Protocol(format!("malformed LookupRequest payload: {e}")))?;

        let target = self.peers.get(&request.peer_id).map(|e| e.info.clone());

        let Some(target_info) = target else {
            enqueue_with_deadline(
                requester_outbox,
                OpCode::Error,
                b"peer not found".to_vec(),
                REPLY_ENQUEUE_DEADLINE,
            )
            .await
            .map_err(|_| Error::Lookup(format!("peer not found: {}", request.peer_id)))?;
            return Ok(());
        };

        let ack_payload = serde_json::to_vec(&target_info)
            .map_err(|e| Error::Protocol(format!("failed to serialize LookupAck: {e}")))?;
        enqueue_with_deadline(
            requester_outbox,
            OpCode::LookupAck,
            ack_payload,
            REPLY_ENQUEUE_DEADLINE,
        )
        .await
        .map_err(|_| Error::Timeout(REPLY_ENQUEUE_DEADLINE))?;

        if let Some(target_peer) = self.peers.get(&request.peer_id) {
            let forward_payload = serde_json::to_vec(&request.sender_info)
                .map_err(|e| Error::Protocol(format!("failed to serialize InfoForward: {e}")))?;
            let target_outbox = target_peer.outbox.clone();
            drop(target_peer);

            if enqueue_with_deadline(
                &target_outbox,
                OpCode::InfoForward,
                forward_payload,
                FORWARD_ENQUEUE_DEADLINE,
            )
            .await
            .is_err()
            {
                warn!(
                    target = %request.peer_id,
                    requester = %requester_id,
                    "InfoForward enqueue timed out, dropping"
                );
            }
        }

        Ok(())
    }
}

async fn send_server_ack(outbox_tx: &mpsc::Sender<OutboundMessage>, id: &str) -> Result<()> {
    enqueue_with_deadline(
        outbox_tx,
        OpCode::ServerAck,
        id.as_bytes().to_vec(),
        REPLY_ENQUEUE_DEADLINE,
    )
    .await
    .map_err(|_| Error::Timeout(REPLY_ENQUEUE_DEADLINE))
}

async fn enqueue_with_deadline(
    outbox: &mpsc::Sender<OutboundMessage>,
    op: OpCode,
    payload: Vec<u8>,
    deadline: Duration,
) -> std::result::Result<(), ()> {
    timeout(deadline, outbox.send((op, payload)))
        .await
        .map_err(|_| ())?
        .map_err(|_| ())
}

async fn run_writer(
    peer_id: String,
    mut writer: WriteHalf<TcpStream>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    while let Some((op, payload)) = rx.recv().await {
        let write = protocol::write_frame(&mut writer, op, &payload);
        match timeout(WRITE_DEADLINE, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(peer_id = %peer_id, error = %e, "writer failed, closing peer connection");
                break;
            }
            Err(_) => {
                warn!(peer_id = %peer_id, "write deadline exceeded, closing peer connection");
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}
