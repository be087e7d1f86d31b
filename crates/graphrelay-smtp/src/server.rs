//! TCP listener and per-connection task spawning.

use crate::backend::Backend;
use crate::connection::Connection;
use crate::error::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Default maximum message size (25 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 25 * 1024 * 1024;

/// Protocol limits and identity for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hostname announced in the greeting and EHLO reply.
    pub hostname: String,
    /// Largest accepted DATA body, after dot-unstuffing.
    pub max_message_bytes: usize,
    /// Longest accepted command line including CRLF.
    pub max_line_length: usize,
    /// Recipients accepted per transaction.
    pub max_recipients: usize,
    /// Idle time allowed between commands.
    pub command_timeout: Duration,
    /// Time allowed to receive a complete DATA body.
    pub data_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_line_length: 2000,
            max_recipients: 100,
            command_timeout: Duration::from_secs(300),
            data_timeout: Duration::from_secs(600),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Sets the maximum number of recipients per transaction.
    #[must_use]
    pub const fn with_max_recipients(mut self, count: usize) -> Self {
        self.max_recipients = count;
        self
    }

    /// Sets the maximum command line length.
    #[must_use]
    pub const fn with_max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Sets the idle timeout between commands.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// SMTP server dispatching connections to a [`Backend`].
pub struct Server<B> {
    backend: Arc<B>,
    config: Arc<ServerConfig>,
}

impl<B> Clone for Server<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
        }
    }
}

impl<B: Backend> Server<B> {
    /// Creates a server.
    #[must_use]
    pub fn new(backend: B, config: ServerConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts connections until `shutdown` is cancelled, then waits for
    /// every connection task to finish.
    ///
    /// Each connection runs on its own task. Idle connections receive a
    /// 421 reply when `shutdown` fires; a command already being handled,
    /// such as QUIT delivering mail, runs to completion first.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!(addr = %listener.local_addr()?, "SMTP server listening");
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Accepted connection");
                        let server = self.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            server.handle(stream, Some(peer), shutdown).await;
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                () = shutdown.cancelled() => break,
            }
        }

        drop(listener);
        connections.close();
        info!(open = connections.len(), "SMTP listener stopped, draining connections");
        connections.wait().await;
        info!("All connections closed");
        Ok(())
    }

    /// Serves one connection over any transport to completion.
    pub async fn handle<T>(&self, transport: T, peer: Option<SocketAddr>, shutdown: CancellationToken)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let session = self.backend.new_session(peer);
        let connection = Connection::new(transport, session, Arc::clone(&self.config), peer);
        match connection.run(shutdown).await {
            Ok(()) => debug!(?peer, "Connection closed"),
            Err(e) => error!(?peer, error = %e, "Connection failed"),
        }
    }
}
