//! Confab is a client for a real-time conversation service.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`transport`] abstracts the framed channel and provides the WebSocket
//!   implementation.
//! - [`connection`] owns the channel lifecycle: connect timeout, heartbeat,
//!   reconnect with backoff and the connection event stream.
//! - [`core`] holds the transcript, the outbound dispatcher that reconciles
//!   optimistic sends, the bootstrap request, configuration and the
//!   [`core::session::Session`] facade that wires them together.
//! - [`api`] defines the wire payloads exchanged with the service.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], a
//! line-oriented front end over [`core::session::Session`].

pub mod api;
pub mod cli;
pub mod connection;
pub mod core;
pub mod transport;
pub mod utils;
