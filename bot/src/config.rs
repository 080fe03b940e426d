use std::time::Duration;

pub const DEFAULT_SERVER: &str = "127.0.0.1:19132";
pub const DEFAULT_LOCALE: &str = "pt_BR";

/// Settings read once at startup and shared by the supervisor and both loops
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote `host:port` of the game server
    pub server_address: String,
    /// Locale passed to the translator for chat templates
    pub locale: String,
    /// Flat delay between connection attempts
    pub retry_delay: Duration,
    /// How often the send loop wakes to check for shutdown
    pub poll_interval: Duration,
    /// Period of the heartbeat extension point
    pub heartbeat_interval: Duration,
    /// How long the interrupt handler waits to hand off the shutdown signal
    pub shutdown_timeout: Duration,
    /// Upper bound on the login handshake
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            retry_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}
