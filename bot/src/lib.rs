//! # Headless Bot Library
//!
//! A long-running, unattended client session for a multiplayer game server.
//! The bot logs in, mirrors the players it can see, reports chat and
//! roster/join/leave/death events to the log, and shuts down cleanly on Ctrl-C
//! or SIGTERM.
//!
//! ## Architecture Overview
//!
//! One session is one [`connection::Connection`] driven by two tasks:
//!
//! - **Receive loop** ([`loops::ReceiveLoop`]): awaits the next inbound
//!   message and hands it to the [`dispatcher::Dispatcher`], strictly in
//!   arrival order. The dispatcher is the only writer of the
//!   [`registry::EntityRegistry`], so the registry needs no lock.
//! - **Send loop** ([`loops::SendLoop`]): wakes on a short poll interval,
//!   carries the heartbeat extension point, and closes the connection when the
//!   shutdown signal arrives.
//!
//! The [`session::Session`] supervisor connects (retrying forever with a flat
//! delay), spawns both loops, turns the OS interrupt into the shutdown signal,
//! and closes the connection on every exit path.
//!
//! ### Shutdown
//! Closing the connection is the single cancellation primitive. The send loop
//! closes it on request, which makes the pending receive fail with
//! [`connection::ConnectionError::Closed`] and the receive loop return
//! normally. After handing off the shutdown signal (bounded by a timeout)
//! the interrupt handler closes the connection itself, so a send loop stuck
//! on a write is released too.
//!
//! ### Failure Policy
//! - Failed connection attempts are logged and retried, without limit.
//! - A server-side disconnect during a live session is fatal:
//!   [`session::SessionError::Disconnected`] propagates to `main`, which exits
//!   with a non-zero status. There is no automatic reconnect.
//! - Messages about unknown entities are ignored.
//!
//! ## Module Organization
//!
//! - `registry`: the entity mirror
//! - `dispatcher`: per-message-kind handling and operator observations
//! - `connection`: the transport traits plus an in-memory implementation
//! - `tcp`: framed TCP transport with the login handshake
//! - `loops`: receive and send loops
//! - `session`: the supervisor and interrupt handling
//! - `lang`: chat template translation
//! - `auth`: token cache and interactive prompt
//! - `config`: session settings
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use bot::auth::Token;
//! use bot::config::SessionConfig;
//! use bot::lang::Passthrough;
//! use bot::session::{interrupt_signal, Session};
//! use bot::tcp::TcpConnector;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(
//!         TcpConnector::new(Duration::from_secs(10)),
//!         SessionConfig::default(),
//!         Arc::new(Passthrough),
//!         Token::new("my-token"),
//!     );
//!
//!     let report = session.run_until(interrupt_signal()).await?;
//!     println!("saw {} messages", report.messages_dispatched);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod lang;
pub mod loops;
pub mod registry;
pub mod session;
pub mod tcp;
pub mod utils;
