//! Framed TCP implementation of [`Connection`]
//!
//! Messages travel as length-prefixed bincode frames (see [`shared::codec`]).
//! The handshake is a single `Login` answered by `LoginAccepted` or
//! `Disconnect`.

use crate::auth::Token;
use crate::connection::{wait_closed, Connection, ConnectionError, Connector};
use log::{debug, info};
use shared::codec::{self, CodecError};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;

pub struct TcpConnection {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: watch::Sender<bool>,
    peer_addr: SocketAddr,
    runtime_id: u64,
}

impl TcpConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Runtime id the server assigned to this client at login.
    pub fn runtime_id(&self) -> u64 {
        self.runtime_id
    }
}

impl Connection for TcpConnection {
    async fn receive(&self) -> Result<Packet, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let closed = self.closed.subscribe();
        let mut reader = self.reader.lock().await;
        tokio::select! {
            result = codec::read_packet(&mut *reader) => match result {
                Ok(Packet::Disconnect { reason }) => Err(ConnectionError::Disconnected { reason }),
                Ok(packet) => Ok(packet),
                Err(_) if self.is_closed() => Err(ConnectionError::Closed),
                Err(CodecError::Closed) => Err(ConnectionError::Disconnected {
                    reason: "connection closed by server".to_string(),
                }),
                Err(e) => Err(e.into()),
            },
            _ = wait_closed(closed) => Err(ConnectionError::Closed),
        }
    }

    async fn send(&self, packet: &Packet) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        // A write stuck on a full socket buffer gives up as soon as the
        // connection is closed, releasing the writer lock with it.
        let closed = self.closed.subscribe();
        tokio::select! {
            result = async {
                let mut writer = self.writer.lock().await;
                codec::write_packet(&mut *writer, packet).await
            } => result.map_err(ConnectionError::from),
            _ = wait_closed(closed) => Err(ConnectionError::Closed),
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        debug!("Closing connection to {}", self.peer_addr);
        // Pending sends have been told to stop; if one still holds the writer
        // the socket is released when the connection is dropped.
        let Ok(mut writer) = self.writer.try_lock() else {
            debug!("Writer busy, skipping shutdown of {}", self.peer_addr);
            return Ok(());
        };
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

pub struct TcpConnector {
    handshake_timeout: Duration,
}

impl TcpConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, address: &str, token: &Token) -> Result<TcpConnection, ConnectionError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let (mut reader, mut writer) = stream.into_split();

        let login = Packet::Login {
            client_version: PROTOCOL_VERSION,
            token: token.access_token.clone(),
        };
        codec::write_packet(&mut writer, &login).await?;

        let reply = timeout(self.handshake_timeout, codec::read_packet(&mut reader))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)?;

        let runtime_id = match reply {
            Ok(Packet::LoginAccepted { runtime_id }) => runtime_id,
            Ok(Packet::Disconnect { reason }) => {
                return Err(ConnectionError::Disconnected { reason });
            }
            Ok(other) => return Err(ConnectionError::UnexpectedPacket(other.kind_name())),
            Err(CodecError::Closed) => {
                return Err(ConnectionError::Disconnected {
                    reason: "connection closed during handshake".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!("Logged in to {} as runtime id {}", peer_addr, runtime_id);
        let (closed, _) = watch::channel(false);

        Ok(TcpConnection {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
            peer_addr,
            runtime_id,
        })
    }
}
