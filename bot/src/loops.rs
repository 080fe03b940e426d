//! The two long-lived tasks of a session
//!
//! [`ReceiveLoop`] pulls messages off the connection and hands them to the
//! dispatcher one at a time, in arrival order. [`SendLoop`] owns the outbound
//! side: it waits for the shutdown signal, closes the connection when it
//! arrives, and drives the heartbeat extension point.
//!
//! Closing the connection is the only way to stop the receive side: a pending
//! receive returns [`ConnectionError::Closed`] and the loop winds down.

use crate::connection::{Connection, ConnectionError};
use crate::dispatcher::Dispatcher;
use crate::registry::EntityRegistry;
use crate::session::SessionError;
use log::{debug, error, info, warn};
use shared::Packet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Running,
    Stopping,
    Stopped,
}

/// What the receive loop hands back after a local shutdown
#[derive(Debug)]
pub struct ReceiveOutcome {
    pub registry: EntityRegistry,
    pub dispatched: u64,
}

pub struct ReceiveLoop<C> {
    connection: Arc<C>,
    dispatcher: Dispatcher,
    state: ReceiveState,
    dispatched: u64,
}

impl<C: Connection> ReceiveLoop<C> {
    pub fn new(connection: Arc<C>, dispatcher: Dispatcher) -> Self {
        Self {
            connection,
            dispatcher,
            state: ReceiveState::Running,
            dispatched: 0,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Runs until the connection closes.
    ///
    /// A server-side disconnect is fatal and comes back as
    /// [`SessionError::Disconnected`]; any other receive error is the expected
    /// unwind after a local close.
    pub async fn run(mut self) -> Result<ReceiveOutcome, SessionError> {
        info!("RX event loop started");

        while self.state == ReceiveState::Running {
            match self.connection.receive().await {
                Ok(packet) => {
                    self.dispatcher.dispatch(packet);
                    self.dispatched += 1;
                }
                Err(ConnectionError::Disconnected { reason }) => {
                    error!(target: "bot::disconnect", "Disconnected: {}", reason);
                    self.state = ReceiveState::Stopped;
                    return Err(SessionError::Disconnected { reason });
                }
                Err(e) => {
                    debug!("RX event loop ending: {}", e);
                    self.state = ReceiveState::Stopped;
                }
            }
        }

        info!("RX event loop stopped after {} messages", self.dispatched);
        Ok(ReceiveOutcome {
            dispatched: self.dispatched,
            registry: self.dispatcher.into_registry(),
        })
    }
}

/// Source of periodic outbound traffic.
pub trait Heartbeat: Send + 'static {
    /// Called on every heartbeat tick; `None` sends nothing.
    fn next_message(&mut self) -> Option<Packet>;
}

/// Heartbeat that never sends anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Heartbeat for Silent {
    fn next_message(&mut self) -> Option<Packet> {
        None
    }
}

pub struct SendLoop<C, H = Silent> {
    connection: Arc<C>,
    shutdown: mpsc::Receiver<()>,
    heartbeat: H,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    state: SendState,
}

impl<C: Connection, H: Heartbeat> SendLoop<C, H> {
    pub fn new(
        connection: Arc<C>,
        shutdown: mpsc::Receiver<()>,
        heartbeat: H,
        poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            connection,
            shutdown,
            heartbeat,
            poll_interval,
            heartbeat_interval,
            state: SendState::Running,
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub async fn run(mut self) -> SendState {
        info!("TX event loop started");

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.state == SendState::Running {
            tokio::select! {
                // A dropped sender means nobody can ask for shutdown any more.
                _ = self.shutdown.recv() => {
                    info!(target: "bot::shutdown", "Closing event loop");
                    self.state = SendState::Stopping;
                    if let Err(e) = self.connection.close().await {
                        warn!("Error closing connection: {}", e);
                    }
                    self.state = SendState::Stopped;
                }

                _ = heartbeat.tick() => {
                    if let Some(packet) = self.heartbeat.next_message() {
                        if let Err(e) = self.connection.send(&packet).await {
                            error!("Error sending {}: {}", packet.kind_name(), e);
                        }
                    }
                }

                _ = poll.tick() => {
                    if self.connection.is_closed() {
                        debug!("Connection closed elsewhere, stopping TX event loop");
                        self.state = SendState::Stopped;
                    }
                }
            }
        }

        info!("TX event loop stopped");
        self.state
    }
}
