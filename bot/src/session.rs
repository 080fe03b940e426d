//! Session supervisor
//!
//! Owns the whole lifetime of one connection:
//! - connects and authenticates, retrying forever with a flat backoff
//! - forwards the interrupt trigger into the one-shot shutdown signal, then
//!   closes the connection directly
//! - runs the receive and send loops as separate tasks and waits for both
//! - closes the connection on every way out

use crate::auth::Token;
use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionError, Connector};
use crate::dispatcher::Dispatcher;
use crate::lang::Translator;
use crate::loops::{Heartbeat, ReceiveLoop, SendLoop, Silent};
use crate::registry::EntityRegistry;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::sleep;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server ended a live session. Not recovered.
    #[error("disconnected by server: {reason}")]
    Disconnected { reason: String },
    #[error("session task failed: {0}")]
    Task(#[from] JoinError),
}

/// Summary of a session that ended by local request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub connect_attempts: u32,
    pub messages_dispatched: u64,
    pub entities_visible: usize,
}

pub struct Session<K, H = Silent> {
    connector: K,
    config: SessionConfig,
    translator: Arc<dyn Translator>,
    token: Token,
    heartbeat: H,
}

impl<K: Connector> Session<K, Silent> {
    pub fn new(
        connector: K,
        config: SessionConfig,
        translator: Arc<dyn Translator>,
        token: Token,
    ) -> Self {
        Self {
            connector,
            config,
            translator,
            token,
            heartbeat: Silent,
        }
    }
}

impl<K: Connector, H: Heartbeat> Session<K, H> {
    /// Replaces the heartbeat driven by the send loop.
    pub fn with_heartbeat<H2: Heartbeat>(self, heartbeat: H2) -> Session<K, H2> {
        Session {
            connector: self.connector,
            config: self.config,
            translator: self.translator,
            token: self.token,
            heartbeat,
        }
    }

    /// Connects, then runs both loops until `shutdown` resolves or the server
    /// disconnects.
    pub async fn run_until<F>(self, shutdown: F) -> Result<SessionReport, SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (connection, connect_attempts) = self.connect_with_retry().await;
        let connection = Arc::new(connection);

        let result = self.drive(Arc::clone(&connection), shutdown).await;

        if let Err(e) = connection.close().await {
            debug!("Error closing connection: {}", e);
        }

        let (messages_dispatched, entities_visible) = result?;
        info!(target: "bot::shutdown", "Goodbye");

        Ok(SessionReport {
            connect_attempts,
            messages_dispatched,
            entities_visible,
        })
    }

    /// Keeps dialing until a connection is established. Returns it with the
    /// number of attempts made.
    pub async fn connect_with_retry(&self) -> (K::Conn, u32) {
        let address = &self.config.server_address;
        info!("Connecting to {}", address);

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.connector.connect(address, &self.token).await {
                Ok(connection) => {
                    info!("Connected to {} after {} attempt(s)", address, attempts);
                    return (connection, attempts);
                }
                Err(ConnectionError::Disconnected { reason }) => {
                    let reason = self.translator.translate(&self.config.locale, &reason, &[]);
                    error!(target: "bot::disconnect", "Disconnected: {}", reason);
                }
                Err(e) => {
                    error!("Error handling connection: {}", e);
                }
            }

            warn!(
                target: "bot::retry",
                "Retrying connection in {:?} (attempt {} failed)",
                self.config.retry_delay,
                attempts
            );
            sleep(self.config.retry_delay).await;
        }
    }

    async fn drive<F>(
        self,
        connection: Arc<K::Conn>,
        shutdown: F,
    ) -> Result<(u64, usize), SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let interrupt = tokio::spawn(forward_shutdown(
            shutdown,
            shutdown_tx,
            Arc::clone(&connection),
            self.config.shutdown_timeout,
        ));

        info!("Bot started and connected");

        let dispatcher = Dispatcher::new(EntityRegistry::new(), self.translator, &self.config.locale);
        let rx_loop = ReceiveLoop::new(Arc::clone(&connection), dispatcher);
        let rx_handle = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                let result = rx_loop.run().await;
                // Wakes the send loop if the receive side ended first.
                if let Err(e) = connection.close().await {
                    debug!("Error closing connection after RX event loop: {}", e);
                }
                result
            })
        };

        let tx_loop = SendLoop::new(
            Arc::clone(&connection),
            shutdown_rx,
            self.heartbeat,
            self.config.poll_interval,
            self.config.heartbeat_interval,
        );
        let tx_handle = tokio::spawn(tx_loop.run());

        let (rx_result, tx_result) = tokio::join!(rx_handle, tx_handle);

        interrupt.abort();
        let _ = interrupt.await;

        let tx_state = tx_result?;
        debug!("TX event loop finished in state {:?}", tx_state);

        let outcome = rx_result??;
        Ok((outcome.dispatched, outcome.registry.len()))
    }
}

/// Waits for `trigger`, hands the shutdown signal to the send loop, then
/// closes the connection.
///
/// The close runs whether or not the hand-off made it within `timeout`, so a
/// send loop stuck on a write is still released.
async fn forward_shutdown<C, F>(
    trigger: F,
    shutdown: mpsc::Sender<()>,
    connection: Arc<C>,
    timeout: Duration,
) where
    C: Connection,
    F: Future<Output = ()>,
{
    trigger.await;
    info!(target: "bot::shutdown", "Closing bot");

    if let Err(e) = shutdown.send_timeout((), timeout).await {
        error!(target: "bot::shutdown", "Timeout waiting close ({}), forcing connection closed", e);
    }
    if let Err(e) = connection.close().await {
        warn!("Error closing connection: {}", e);
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
///
/// If no handler can be installed it never resolves, so the session only ends
/// through the server.
pub async fn interrupt_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("Failed to listen for Ctrl-C: {}", e);
                            terminate.recv().await;
                        }
                    }
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{wait_closed, MemoryConnection, MemoryPeer};
    use crate::lang::Passthrough;
    use shared::{Packet, Vec3};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{oneshot, watch};
    use tokio::time::timeout;

    /// Fails `failures` times, then hands out the prepared connection.
    ///
    /// The connection can only be handed out once; any later attempt fails.
    struct ScriptedConnector {
        failures: u32,
        attempts: Arc<AtomicU32>,
        refusals: Arc<AtomicU32>,
        connection: Mutex<Option<MemoryConnection>>,
    }

    impl ScriptedConnector {
        fn new(failures: u32) -> (Self, MemoryPeer) {
            let (connection, peer) = MemoryConnection::pair();
            (
                Self {
                    failures,
                    attempts: Arc::new(AtomicU32::new(0)),
                    refusals: Arc::new(AtomicU32::new(0)),
                    connection: Mutex::new(Some(connection)),
                },
                peer,
            )
        }
    }

    impl Connector for ScriptedConnector {
        type Conn = MemoryConnection;

        async fn connect(
            &self,
            _address: &str,
            _token: &Token,
        ) -> Result<MemoryConnection, ConnectionError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                self.refusals.fetch_add(1, Ordering::SeqCst);
                return if attempt % 2 == 1 {
                    Err(ConnectionError::Disconnected {
                        reason: "disconnectionScreen.serverFull".to_string(),
                    })
                } else {
                    Err(ConnectionError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "refused",
                    )))
                };
            }
            self.connection
                .lock()
                .unwrap()
                .take()
                .ok_or(ConnectionError::Closed)
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            retry_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        }
    }

    fn session(connector: ScriptedConnector) -> Session<ScriptedConnector> {
        Session::new(connector, config(), Arc::new(Passthrough), Token::new("tkn"))
    }

    #[tokio::test]
    async fn test_retries_transient_failures_then_connects_once() {
        let (connector, _peer) = ScriptedConnector::new(2);
        let session = session(connector);

        let (_conn, attempts) = timeout(Duration::from_secs(2), session.connect_with_retry())
            .await
            .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(session.connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(session.connector.refusals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_two_retries_then_both_loops_run_once() {
        let (connector, mut peer) = ScriptedConnector::new(2);
        let attempts = Arc::clone(&connector.attempts);
        let refusals = Arc::clone(&connector.refusals);
        peer.push(Packet::RemoveEntity { runtime_id: 4 });
        peer.push(Packet::RemoveEntity { runtime_id: 5 });

        let mut config = config();
        config.heartbeat_interval = Duration::from_millis(20);
        let session = Session::new(connector, config, Arc::new(Passthrough), Token::new("tkn"))
            .with_heartbeat(Ping);
        let run = tokio::spawn(session.run_until(tokio::time::sleep(Duration::from_millis(150))));

        // The send loop is up once heartbeats arrive.
        let sent = timeout(Duration::from_secs(1), peer.next_sent())
            .await
            .unwrap();
        assert_eq!(sent, Some(Packet::Heartbeat { timestamp: 1 }));

        let report = timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // One retry notice per refusal, and no reconnect after the loops started.
        assert_eq!(refusals.load(Ordering::SeqCst), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(report.connect_attempts, 3);
        assert_eq!(report.messages_dispatched, 2);
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_closes_connection() {
        let (connector, peer) = ScriptedConnector::new(2);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        peer.push(Packet::AddPlayer {
            username: "Alice".to_string(),
            runtime_id: 1,
            unique_id: 100,
            position: Vec3::ZERO,
        });
        peer.push(Packet::AddPlayer {
            username: "Bob".to_string(),
            runtime_id: 2,
            unique_id: 200,
            position: Vec3::ZERO,
        });
        peer.push(Packet::RemoveEntity { runtime_id: 1 });

        let run = tokio::spawn(session(connector).run_until(async move {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();

        let report = timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            report,
            SessionReport {
                connect_attempts: 3,
                messages_dispatched: 3,
                entities_visible: 1,
            }
        );
        timeout(Duration::from_millis(100), peer.wait_closed())
            .await
            .expect("connection should be closed");
    }

    struct Ping;

    impl Heartbeat for Ping {
        fn next_message(&mut self) -> Option<Packet> {
            Some(Packet::Heartbeat { timestamp: 1 })
        }
    }

    #[tokio::test]
    async fn test_custom_heartbeat_reaches_server() {
        let (connector, mut peer) = ScriptedConnector::new(0);
        let mut config = config();
        config.heartbeat_interval = Duration::from_millis(20);
        let session = Session::new(connector, config, Arc::new(Passthrough), Token::new("tkn"))
            .with_heartbeat(Ping);

        let run = tokio::spawn(session.run_until(tokio::time::sleep(Duration::from_millis(200))));

        let sent = timeout(Duration::from_secs(1), peer.next_sent())
            .await
            .unwrap();
        assert_eq!(sent, Some(Packet::Heartbeat { timestamp: 1 }));

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.messages_dispatched, 0);
    }

    /// Connection whose writes hang until it is closed.
    struct StalledConnection {
        closed: watch::Sender<bool>,
    }

    impl Connection for StalledConnection {
        async fn receive(&self) -> Result<Packet, ConnectionError> {
            wait_closed(self.closed.subscribe()).await;
            Err(ConnectionError::Closed)
        }

        async fn send(&self, _packet: &Packet) -> Result<(), ConnectionError> {
            wait_closed(self.closed.subscribe()).await;
            Err(ConnectionError::Closed)
        }

        async fn close(&self) -> Result<(), ConnectionError> {
            self.closed.send_replace(true);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            *self.closed.borrow()
        }
    }

    struct StalledConnector;

    impl Connector for StalledConnector {
        type Conn = StalledConnection;

        async fn connect(
            &self,
            _address: &str,
            _token: &Token,
        ) -> Result<StalledConnection, ConnectionError> {
            let (closed, _) = watch::channel(false);
            Ok(StalledConnection { closed })
        }
    }

    #[tokio::test]
    async fn test_interrupt_releases_send_loop_stuck_on_write() {
        let mut config = config();
        config.heartbeat_interval = Duration::from_millis(20);
        config.shutdown_timeout = Duration::from_millis(100);
        let session = Session::new(
            StalledConnector,
            config,
            Arc::new(Passthrough),
            Token::new("tkn"),
        )
        .with_heartbeat(Ping);

        let report = timeout(
            Duration::from_secs(2),
            session.run_until(tokio::time::sleep(Duration::from_millis(100))),
        )
        .await
        .expect("session should end after the interrupt")
        .unwrap();

        assert_eq!(report.connect_attempts, 1);
        assert_eq!(report.messages_dispatched, 0);
    }

    #[tokio::test]
    async fn test_server_disconnect_is_fatal() {
        let (connector, peer) = ScriptedConnector::new(0);
        peer.push(Packet::RemoveEntity { runtime_id: 9 });
        peer.disconnect("kicked");

        let result = timeout(
            Duration::from_secs(2),
            session(connector).run_until(std::future::pending()),
        )
        .await
        .unwrap();

        match result {
            Err(SessionError::Disconnected { reason }) => assert_eq!(reason, "kicked"),
            other => panic!("Expected fatal disconnect, got {:?}", other),
        }
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_forward_shutdown_delivers_signal_and_closes() {
        let (conn, _peer) = MemoryConnection::pair();
        let conn = Arc::new(conn);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        forward_shutdown(
            async {},
            shutdown_tx,
            Arc::clone(&conn),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(shutdown_rx.recv().await, Some(()));
        assert!(conn.is_closed());
        assert_eq!(conn.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_forward_shutdown_force_closes_when_signal_is_stuck() {
        let (conn, peer) = MemoryConnection::pair();
        let conn = Arc::new(conn);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
        // Nobody drains the slot, so the hand-off cannot complete.
        shutdown_tx.try_send(()).unwrap();

        forward_shutdown(
            async {},
            shutdown_tx,
            Arc::clone(&conn),
            Duration::from_millis(20),
        )
        .await;

        assert!(conn.is_closed());
        assert!(peer.is_closed());
    }
}
