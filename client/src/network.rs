//! Client side of the relay connection
//!
//! Dials the host's relay, waits for the `relay-hello` greeting that carries
//! this connection's id, then runs a reader and a writer task. Inbound frames
//! surface as [`ConnectionEvent`]s; a closed or failed socket surfaces exactly
//! once as [`ConnectionEvent::Closed`].

use log::{debug, info, warn};
use shared::framing::{read_frame, write_frame, FrameError};
use shared::protocol::RelayControl;
use shared::{ConnectionId, WireMessage, CONNECT_TIMEOUT};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("timed out connecting to {0}")]
    Timeout(String),
    #[error("could not reach {addr}: {source}")]
    Unreachable { addr: String, source: io::Error },
    #[error("relay closed the connection before greeting")]
    NoGreeting,
    #[error("unexpected greeting from relay: {0}")]
    BadGreeting(#[from] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Message(Vec<u8>),
    Closed,
}

pub struct RelayConnection {
    id: ConnectionId,
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl RelayConnection {
    /// Connects with the default timeout
    pub async fn connect(
        addr: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>), ConnectError> {
        Self::connect_with_timeout(addr, CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        addr: &str,
        limit: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>), ConnectError> {
        info!("Connecting to {}...", addr);
        let (stream, id) = timeout(limit, Self::handshake(addr))
            .await
            .map_err(|_| ConnectError::Timeout(addr.to_string()))??;
        info!("Relay assigned connection id {}", id);

        let (read_half, write_half) = stream.into_split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::write_loop(write_half, frame_rx));
        let reader = tokio::spawn(Self::read_loop(read_half, event_tx));

        Ok((
            Self {
                id,
                outgoing: Some(frame_tx),
                reader,
            },
            event_rx,
        ))
    }

    async fn handshake(addr: &str) -> Result<(TcpStream, ConnectionId), ConnectError> {
        let mut stream =
            TcpStream::connect(addr)
                .await
                .map_err(|source| ConnectError::Unreachable {
                    addr: addr.to_string(),
                    source,
                })?;
        stream.set_nodelay(true).map_err(FrameError::from)?;

        let hello = read_frame(&mut stream).await?.ok_or(ConnectError::NoGreeting)?;
        let RelayControl::RelayHello { connection_id } =
            serde_json::from_slice::<RelayControl>(&hello)?;
        Ok((stream, connection_id))
    }

    async fn read_loop(mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<ConnectionEvent>) {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(data)) => {
                    if events.send(ConnectionEvent::Message(data)).is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    info!("Host closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Connection to host failed: {}", e);
                    break;
                }
            }
        }
        let _ = events.send(ConnectionEvent::Closed);
    }

    async fn write_loop(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                warn!("Failed to send to host: {}", e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.outgoing.is_some()
    }

    /// Queues a message for the host; false once closed
    pub fn send(&self, message: &WireMessage) -> bool {
        let Some(outgoing) = &self.outgoing else {
            debug!("Connection closed, dropping {}", message.kind());
            return false;
        };
        match message.to_bytes() {
            Ok(bytes) => outgoing.send(bytes).is_ok(),
            Err(e) => {
                warn!("Failed to encode {}: {}", message.kind(), e);
                false
            }
        }
    }

    /// Flushes queued messages and closes. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.outgoing.take().is_some() {
            self.reader.abort();
            debug!("Connection {} closed locally", self.id);
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.close();
    }
}
