//! Comm server: TCP transport between the arena and the agents
//!
//! Every accepted connection gets its own reader task. Frames are newline
//! delimited JSON [`AgentMessage`]s; each decoded message is dispatched on its
//! own task so that a slow dispatch never blocks the reader. The first frame
//! of a connection must arrive within [`HANDSHAKE_TIMEOUT`].

use crate::error::CommError;
use log::debug;
use shared::protocol::{decode_line, AgentMessage};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
pub const LOG_ENTRY_BUFFER: usize = 100;

/// Events reported by the comm server to its owner
#[derive(Debug)]
pub enum CommEvent {
    Log(String),
    Warn(String),
    Error(String),
    Disconnected {
        connection: Connection,
        error: CommError,
    },
}

/// Write side of an agent connection
///
/// Cheap to clone; clones share the socket. Two handles are equal when they
/// refer to the same accepted connection.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    id: u64,
    peer: SocketAddr,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: AtomicBool,
}

impl Connection {
    fn new(id: u64, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                peer,
                writer: Mutex::new(Some(writer)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Writes `bytes` as is. Errors are returned, never retried.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), CommError> {
        let mut writer = self.inner.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(CommError::Closed);
        };

        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shuts the socket down. Returns false if it was already closed.
    pub async fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        if let Some(mut stream) = self.inner.writer.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        true
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

pub type DispatchFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Receiver of the decoded agent messages
///
/// `sequence` numbers the frames of one connection in the order they were
/// read, so that a receiver can restore it after the concurrent dispatch.
pub trait AgentMessageDispatcher: Send + Sync + 'static {
    fn dispatch_agent_message(
        self: Arc<Self>,
        message: AgentMessage,
        connection: Connection,
        sequence: u64,
    ) -> DispatchFuture;
}

/// Queues an event without ever waiting; drops it when the buffer is full
fn log_event(events: &mpsc::Sender<CommEvent>, event: CommEvent) {
    if events.try_send(event).is_err() {
        eprintln!("[commserver] Log dropped because buffer full");
    }
}

pub struct CommServer {
    address: String,
    events: mpsc::Sender<CommEvent>,
    next_connection_id: Arc<AtomicU64>,
}

impl CommServer {
    ///Returns the server and the receiving end of its event stream
    pub fn new(address: &str) -> (Self, mpsc::Receiver<CommEvent>) {
        let (events, events_rx) = mpsc::channel(LOG_ENTRY_BUFFER);

        (
            Self {
                address: address.to_string(),
                events,
                next_connection_id: Arc::new(AtomicU64::new(1)),
            },
            events_rx,
        )
    }

    /// Binds the listener and starts accepting connections in the background.
    ///
    /// Returns as soon as the socket is bound, with the bound address.
    pub async fn listen<D: AgentMessageDispatcher>(&self, dispatcher: Arc<D>) -> Result<SocketAddr, CommError> {
        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|source| CommError::Bind {
                address: self.address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| CommError::Bind {
            address: self.address.clone(),
            source,
        })?;

        let events = self.events.clone();
        let next_connection_id = Arc::clone(&self.next_connection_id);

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let id = next_connection_id.fetch_add(1, Ordering::SeqCst);
                        log_event(&events, CommEvent::Log(format!("Agent connected from {}", peer)));

                        tokio::spawn(handle_connection(
                            stream,
                            id,
                            peer,
                            Arc::clone(&dispatcher),
                            events.clone(),
                        ));
                    }
                    Err(e) => {
                        log_event(&events, CommEvent::Error(format!("Failed to accept connection; {}", e)));
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Sends `bytes` to `connection`; no connection means nothing to do.
    pub async fn send(&self, bytes: &[u8], connection: Option<&Connection>) -> Result<(), CommError> {
        match connection {
            Some(connection) => connection.send(bytes).await,
            None => Ok(()),
        }
    }
}

async fn handle_connection<D: AgentMessageDispatcher>(
    stream: TcpStream,
    id: u64,
    peer: SocketAddr,
    dispatcher: Arc<D>,
    events: mpsc::Sender<CommEvent>,
) {
    let (read_half, write_half) = stream.into_split();
    let connection = Connection::new(id, peer, write_half);
    let mut reader = BufReader::new(read_half);
    let mut buffer = Vec::new();
    let mut got_data = false;
    let mut sequence = 0u64;

    let error = loop {
        buffer.clear();

        let read = if got_data {
            reader.read_until(b'\n', &mut buffer).await
        } else {
            match timeout(HANDSHAKE_TIMEOUT, reader.read_until(b'\n', &mut buffer)).await {
                Ok(read) => read,
                Err(_) => break CommError::HandshakeTimeout(HANDSHAKE_TIMEOUT),
            }
        };

        match read {
            Ok(0) => break CommError::Eof,
            Ok(_) => {
                // Any frame cancels the handshake deadline
                got_data = true;

                if buffer.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }
                debug!("[{}] {}", peer, String::from_utf8_lossy(&buffer).trim_end());

                match decode_line::<AgentMessage>(&buffer) {
                    Ok(message) => {
                        sequence += 1;
                        tokio::spawn(Arc::clone(&dispatcher).dispatch_agent_message(
                            message,
                            connection.clone(),
                            sequence,
                        ));
                    }
                    Err(e) => {
                        log_event(
                            &events,
                            CommEvent::Error(format!(
                                "Failed to unmarshal incoming JSON; {}; string \"{}\"; raw {:?}",
                                e,
                                String::from_utf8_lossy(&buffer).trim_end(),
                                buffer
                            )),
                        );
                    }
                }
            }
            Err(e) => break CommError::Io(e),
        }
    };

    connection.close().await;

    // Disconnections are never dropped
    let _ = events.send(CommEvent::Disconnected { connection, error }).await;
}
