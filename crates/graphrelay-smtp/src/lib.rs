//! # graphrelay-smtp
//!
//! A server-side SMTP protocol engine implementing the receiving half of
//! RFC 5321.
//!
//! ## Features
//!
//! - **Pluggable sessions**: A [`Backend`] creates one [`Session`] per
//!   connection and receives every transaction event
//! - **Command sequencing**: MAIL before HELO, RCPT before MAIL and DATA
//!   before RCPT are answered with `503` without reaching the session
//! - **Authentication**: AUTH PLAIN (with or without initial response) and
//!   AUTH LOGIN
//! - **Extensions**: SIZE, 8BITMIME, PIPELINING
//! - **Limits**: Message size, line length, recipient count and idle timeout
//!
//! ## Quick Start
//!
//! ```ignore
//! use graphrelay_smtp::{Backend, Server, ServerConfig};
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//!
//! let server = Server::new(MyBackend::default(), ServerConfig::new("relay.local"));
//! let listener = TcpListener::bind("0.0.0.0:2525").await?;
//! server.serve(listener, CancellationToken::new()).await?;
//! ```
//!
//! ## Command Flow
//!
//! ```text
//! 220 greeting
//!   └─ EHLO ──→ [AUTH] ──→ MAIL ──→ RCPT+ ──→ DATA ──→ 250
//!                              ↑                      │
//!                              └──────────────────────┘
//! QUIT ──→ Session::logout ──→ 221
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: Traits implemented by the application
//! - [`command`]: Command-line parsing
//! - [`connection`]: Per-connection state machine and stream framing
//! - [`parser`]: Path, parameter and SASL decoding helpers
//! - [`server`]: Listener and configuration
//! - [`types`]: Addresses, extensions and replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod server;
pub mod types;

pub use backend::{Backend, Session};
pub use command::Command;
pub use connection::Connection;
pub use error::{Error, Result};
pub use server::{Server, ServerConfig};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
