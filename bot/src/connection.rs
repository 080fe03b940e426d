//! Transport abstraction consumed by the session loops
//!
//! A [`Connection`] is an authenticated session with the game server. The
//! loops only ever see this trait; [`crate::tcp`] provides the framed TCP
//! implementation and [`MemoryConnection`] an in-process one.

use crate::auth::Token;
use shared::codec::CodecError;
use shared::Packet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The server ended the session, during the handshake or afterwards.
    #[error("disconnected: {reason}")]
    Disconnected { reason: String },
    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("unexpected {0} message during handshake")]
    UnexpectedPacket(&'static str),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ConnectionError::Disconnected { .. })
    }
}

pub trait Connection: Send + Sync + 'static {
    /// Waits for the next inbound message.
    ///
    /// Returns [`ConnectionError::Disconnected`] when the peer ends the
    /// session and [`ConnectionError::Closed`] once [`close`](Self::close)
    /// was called, including while a receive is pending.
    fn receive(&self) -> impl Future<Output = Result<Packet, ConnectionError>> + Send;

    fn send(&self, packet: &Packet) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Closes the connection. Calling it again is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    fn is_closed(&self) -> bool;
}

/// Opens and authenticates a [`Connection`].
pub trait Connector: Send + Sync {
    type Conn: Connection;

    fn connect(
        &self,
        address: &str,
        token: &Token,
    ) -> impl Future<Output = Result<Self::Conn, ConnectionError>> + Send;
}

/// Resolves once the watched flag becomes true or its sender is gone.
pub(crate) async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

/// In-process connection driven by a [`MemoryPeer`].
pub struct MemoryConnection {
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Packet, ConnectionError>>>,
    outbound: mpsc::UnboundedSender<Packet>,
    closed: watch::Sender<bool>,
    close_calls: AtomicUsize,
}

/// The server side of a [`MemoryConnection`].
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Result<Packet, ConnectionError>>,
    outbound: mpsc::UnboundedReceiver<Packet>,
    closed: watch::Receiver<bool>,
}

impl MemoryConnection {
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        (
            MemoryConnection {
                inbound: Mutex::new(inbound_rx),
                outbound: outbound_tx,
                closed: closed_tx,
                close_calls: AtomicUsize::new(0),
            },
            MemoryPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
                closed: closed_rx,
            },
        )
    }

    /// Number of times `close` was invoked, including repeated calls.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Connection for MemoryConnection {
    async fn receive(&self) -> Result<Packet, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let closed = self.closed.subscribe();
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            message = inbound.recv() => match message {
                Some(result) => result,
                None => Err(ConnectionError::Disconnected {
                    reason: "peer went away".to_string(),
                }),
            },
            _ = wait_closed(closed) => Err(ConnectionError::Closed),
        }
    }

    async fn send(&self, packet: &Packet) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.outbound
            .send(packet.clone())
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.send_replace(true);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl MemoryPeer {
    /// Queues a message for the client to receive. Returns false if the client side is gone.
    pub fn push(&self, packet: Packet) -> bool {
        self.inbound.send(Ok(packet)).is_ok()
    }

    /// Ends the session from the server side.
    pub fn disconnect(&self, reason: &str) -> bool {
        self.inbound
            .send(Err(ConnectionError::Disconnected {
                reason: reason.to_string(),
            }))
            .is_ok()
    }

    /// Next message the client sent, or None once the client side is dropped.
    pub async fn next_sent(&mut self) -> Option<Packet> {
        self.outbound.recv().await
    }

    pub async fn wait_closed(&self) {
        wait_closed(self.closed.clone()).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
