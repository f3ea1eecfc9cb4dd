//! Relay network layer: TCP accept loop, per-connection tasks and routing
//!
//! The relay runs inside the host process. It assigns every accepted
//! connection a fresh [`ConnectionId`], announces it with a `relay-hello`
//! frame and then only moves opaque frames: inbound payloads go up to the
//! host loop as [`RelayEvent`]s, outbound messages are fanned out to
//! connection queues by [`Target`].

use crate::directory::{Frame, Peer, SessionDirectory};
use log::{debug, error, info, warn};
use shared::framing::{read_frame, write_frame, FrameError};
use shared::protocol::RelayControl;
use shared::{ConnectionId, Target, WireMessage};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind relay on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("relay I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Events sent from connection tasks to the host loop
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected { id: ConnectionId, addr: SocketAddr },
    Message { from: ConnectionId, data: Vec<u8> },
    /// Raised once per connection that closed while attached
    Disconnected { id: ConnectionId },
}

type Directory = Arc<RwLock<SessionDirectory>>;

pub struct RelayServer {
    local_addr: SocketAddr,
    directory: Directory,
    accept_task: JoinHandle<()>,
    closed: bool,
}

impl RelayServer {
    /// Binds the listener and starts accepting connections
    pub async fn bind(
        addr: &str,
        max_peers: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RelayEvent>), RelayError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!("Relay listening on {} (max {} peers)", local_addr, max_peers);

        let directory = Arc::new(RwLock::new(SessionDirectory::new(max_peers)));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let accept_task = Self::spawn_acceptor(listener, Arc::clone(&directory), event_tx);

        Ok((
            Self {
                local_addr,
                directory,
                accept_task,
                closed: false,
            },
            event_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn peer_count(&self) -> usize {
        self.directory.read().await.len()
    }

    pub async fn peer_ids(&self) -> Vec<ConnectionId> {
        self.directory.read().await.ids()
    }

    /// Spawns task that accepts connections until the relay closes
    fn spawn_acceptor(
        listener: TcpListener,
        directory: Directory,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) =
                            Self::admit(stream, addr, Arc::clone(&directory), events.clone()).await
                        {
                            warn!("Failed to admit connection from {}: {}", addr, e);
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Greets a new connection and wires up its reader and writer
    async fn admit(
        stream: TcpStream,
        addr: SocketAddr,
        directory: Directory,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Result<(), RelayError> {
        if directory.read().await.is_full() {
            warn!("Relay full, refusing connection from {}", addr);
            return Ok(());
        }

        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();

        let id = ConnectionId::generate();
        let hello = serde_json::to_vec(&RelayControl::RelayHello {
            connection_id: id.clone(),
        })
        .map_err(io::Error::from)?;
        write_frame(&mut write_half, &hello).await?;

        // Holding the write lock keeps the reader's detach behind the attach.
        let mut guard = directory.write().await;
        if guard.is_full() {
            warn!("Relay filled up, dropping connection from {}", addr);
            return Ok(());
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let mut peer = Peer::new(id.clone(), addr, frame_tx);
        let _ = events.send(RelayEvent::Connected {
            id: id.clone(),
            addr,
        });

        tokio::spawn(Self::write_loop(id.clone(), write_half, frame_rx));
        peer.set_reader(tokio::spawn(Self::read_loop(
            id,
            read_half,
            Arc::clone(&directory),
            events,
        )));
        if let Err(mut rejected) = guard.attach(peer) {
            rejected.stop_reading();
        }
        Ok(())
    }

    async fn read_loop(
        id: ConnectionId,
        mut reader: OwnedReadHalf,
        directory: Directory,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(data)) => {
                    if events.send(RelayEvent::Message { from: id.clone(), data }).is_err() {
                        debug!("Host loop gone, stopping reader for {}", id);
                        return;
                    }
                }
                Ok(None) => {
                    debug!("Connection {} closed by peer", id);
                    break;
                }
                Err(e) => {
                    warn!("Connection {} failed: {}", id, e);
                    break;
                }
            }
        }

        let detached = directory.write().await.detach(&id);
        if detached.is_some() {
            let _ = events.send(RelayEvent::Disconnected { id });
        }
    }

    async fn write_loop(
        id: ConnectionId,
        mut writer: OwnedWriteHalf,
        mut frames: mpsc::UnboundedReceiver<Frame>,
    ) {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                warn!("Failed to write to {}: {}", id, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    }

    /// Delivers `message` to every connection `target` names.
    ///
    /// Returns how many connections it was queued for. Unknown ids are
    /// dropped silently.
    pub async fn route(&self, target: &Target, message: &WireMessage) -> usize {
        let frame: Frame = match message.to_bytes() {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                error!("Failed to encode {}: {}", message.kind(), e);
                return 0;
            }
        };

        let directory = self.directory.read().await;
        directory
            .recipients(target)
            .into_iter()
            .filter(|peer| peer.send(Arc::clone(&frame)))
            .count()
    }

    /// Stops accepting and closes every connection. Safe to call repeatedly.
    pub async fn close_all(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.accept_task.abort();

        let peers = self.directory.write().await.drain();
        info!("Relay closing {} connections", peers.len());
        for mut peer in peers {
            peer.stop_reading();
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn read_hello(stream: &mut TcpStream) -> ConnectionId {
        let frame = read_frame(stream).await.unwrap().unwrap();
        match serde_json::from_slice::<RelayControl>(&frame).unwrap() {
            RelayControl::RelayHello { connection_id } => connection_id,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<RelayEvent>) -> RelayEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("relay event channel closed")
    }

    #[tokio::test]
    async fn test_hello_then_connected_event() {
        let (relay, mut events) = RelayServer::bind("127.0.0.1:0", 4).await.unwrap();
        let mut stream = TcpStream::connect(relay.local_addr()).await.unwrap();

        let id = read_hello(&mut stream).await;
        assert_eq!(id.as_str().len(), shared::protocol::CONNECTION_ID_LEN);
        match next_event(&mut events).await {
            RelayEvent::Connected { id: connected, .. } => assert_eq!(connected, id),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(relay.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_inbound_frames_and_disconnect() {
        let (relay, mut events) = RelayServer::bind("127.0.0.1:0", 4).await.unwrap();
        let mut stream = TcpStream::connect(relay.local_addr()).await.unwrap();
        let id = read_hello(&mut stream).await;
        next_event(&mut events).await;

        write_frame(&mut stream, br#"{"type":"x"}"#).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::Message {
                from: id.clone(),
                data: br#"{"type":"x"}"#.to_vec()
            }
        );

        drop(stream);
        assert_eq!(next_event(&mut events).await, RelayEvent::Disconnected { id });
        assert_eq!(relay.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_route_single_and_unknown() {
        let (relay, mut events) = RelayServer::bind("127.0.0.1:0", 4).await.unwrap();
        let mut stream = TcpStream::connect(relay.local_addr()).await.unwrap();
        let id = read_hello(&mut stream).await;
        next_event(&mut events).await;

        let message = WireMessage::PlayerLeft {
            socket_id: ConnectionId::from("someone"),
        };
        assert_eq!(relay.route(&Target::Single(id), &message).await, 1);
        assert_eq!(
            relay
                .route(&Target::Single(ConnectionId::from("nobody")), &message)
                .await,
            0
        );

        let frame = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(frame, message.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn test_connections_over_capacity_are_closed() {
        let (relay, mut events) = RelayServer::bind("127.0.0.1:0", 1).await.unwrap();
        let mut first = TcpStream::connect(relay.local_addr()).await.unwrap();
        read_hello(&mut first).await;
        next_event(&mut events).await;

        let mut second = TcpStream::connect(relay.local_addr()).await.unwrap();
        let result = timeout(Duration::from_secs(2), read_frame(&mut second))
            .await
            .unwrap();
        assert!(matches!(result, Ok(None) | Err(_)));
        assert_eq!(relay.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let (mut relay, mut events) = RelayServer::bind("127.0.0.1:0", 4).await.unwrap();
        let mut stream = TcpStream::connect(relay.local_addr()).await.unwrap();
        read_hello(&mut stream).await;
        next_event(&mut events).await;

        relay.close_all().await;
        relay.close_all().await;
        assert_eq!(relay.peer_count().await, 0);

        let result = timeout(Duration::from_secs(2), read_frame(&mut stream))
            .await
            .unwrap();
        assert!(matches!(result, Ok(None) | Err(_)));
    }
}
