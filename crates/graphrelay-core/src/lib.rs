//! # graphrelay-core
//!
//! Relay logic behind the `graphrelay` SMTP listener.
//!
//! This crate provides:
//! - **Sessions** - SMTP transaction state per connection, backed by a
//!   shared [`TransactionStore`]
//! - **Reclamation** - Background eviction of abandoned transactions
//! - **Transformation** - MIME to Microsoft Graph message conversion
//!   (bodies, charsets, inline images, attachments, Bcc inference)
//! - **Delivery** - Graph `sendMail` with client-credentials tokens and
//!   bounded retry
//! - **Configuration** - TOML configuration model

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod graph;
pub mod session;
pub mod store;
pub mod transform;

pub use config::{Config, GraphConfig, ListenerConfig, ServiceConfig};
pub use error::{Error, Result};
pub use graph::{DeliveryError, GraphClient, MailSender, RetryPolicy, SendMailRequest};
pub use session::{RelayBackend, RelaySession};
pub use store::{EmailTransaction, TransactionKey, TransactionStore};
pub use transform::transform;
