//! Per-connection SMTP state machine.

mod stream;

pub use stream::{DataBody, Line, SmtpStream};

use crate::backend::Session;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{decode_auth_plain, decode_sasl_line};
use crate::server::ServerConfig;
use crate::types::{AuthMechanism, Extension, Reply, ReplyCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Protocol state tracked by the engine.
#[derive(Debug, Default)]
struct Envelope {
    greeted: bool,
    authenticated: bool,
    has_sender: bool,
    recipients: usize,
}

impl Envelope {
    const fn clear_transaction(&mut self) {
        self.has_sender = false;
        self.recipients = 0;
    }
}

/// Whether the command loop keeps going.
enum Flow {
    Continue,
    Close,
}

/// One client connection driving a [`Session`].
pub struct Connection<S, T> {
    stream: SmtpStream<T>,
    session: S,
    config: Arc<ServerConfig>,
    peer: Option<SocketAddr>,
    envelope: Envelope,
}

impl<S: Session, T: AsyncRead + AsyncWrite + Unpin + Send> Connection<S, T> {
    /// Creates a connection over a transport.
    pub fn new(
        transport: T,
        session: S,
        config: Arc<ServerConfig>,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            stream: SmtpStream::new(transport),
            session,
            config,
            peer,
            envelope: Envelope::default(),
        }
    }

    /// Runs the command loop until QUIT, disconnect, timeout or shutdown.
    ///
    /// The session's `logout` runs only on QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.stream
            .write_reply(&Reply::single(
                ReplyCode::SERVICE_READY,
                format!("{} ESMTP Service Ready", self.config.hostname),
            ))
            .await?;

        loop {
            let line = tokio::select! {
                () = shutdown.cancelled() => {
                    self.stream.write_reply(&Reply::single(
                        ReplyCode::SERVICE_UNAVAILABLE,
                        "4.3.2 Service shutting down",
                    )).await?;
                    return Ok(());
                }
                line = self.read_line() => line,
            };

            let line = match line {
                Ok(Line::Text(line)) => line,
                Ok(Line::TooLong) => {
                    self.stream
                        .write_reply(&Reply::single(ReplyCode::SYNTAX_ERROR, "5.5.6 Line too long"))
                        .await?;
                    continue;
                }
                Ok(Line::Eof) => {
                    debug!(peer = ?self.peer, "Client disconnected");
                    return Ok(());
                }
                Err(e @ Error::Timeout) => {
                    info!(peer = ?self.peer, "Closing idle connection");
                    self.stream.write_reply(&e.to_reply()).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    debug!(peer = ?self.peer, error = %e, "Rejected command");
                    self.stream.write_reply(&e.to_reply()).await?;
                    continue;
                }
            };

            debug!(peer = ?self.peer, verb = command.verb(), "SMTP command");
            match self.dispatch(command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => return Ok(()),
                Err(e @ Error::Timeout) => {
                    info!(peer = ?self.peer, "Client timed out mid-command");
                    self.stream.write_reply(&e.to_reply()).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_line(&mut self) -> Result<Line> {
        tokio::time::timeout(
            self.config.command_timeout,
            self.stream.read_line(self.config.max_line_length),
        )
        .await
        .map_err(|_| Error::Timeout)?
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow> {
        let reply = match command {
            Command::Helo { hostname } => self.greet(&hostname, false).await,
            Command::Ehlo { hostname } => self.greet(&hostname, true).await,
            Command::Auth {
                mechanism,
                initial_response,
            } => match self.authenticate(mechanism, initial_response).await? {
                Some(reply) => reply,
                None => return Ok(Flow::Close),
            },
            Command::MailFrom { from, size, .. } => {
                if !self.envelope.greeted {
                    bad_sequence("5.5.1 Send HELO/EHLO first")
                } else if self.envelope.has_sender {
                    bad_sequence("5.5.1 Nested MAIL command")
                } else if size.is_some_and(|size| size > self.config.max_message_bytes) {
                    size_exceeded()
                } else {
                    match self.session.mail(&from).await {
                        Ok(()) => {
                            self.envelope.has_sender = true;
                            Reply::ok("2.1.0 Sender OK")
                        }
                        Err(reply) => reply,
                    }
                }
            }
            Command::RcptTo { to } => {
                if !self.envelope.has_sender {
                    bad_sequence("5.5.1 Need MAIL command first")
                } else if self.envelope.recipients >= self.config.max_recipients {
                    Reply::single(ReplyCode::INSUFFICIENT_STORAGE, "4.5.3 Too many recipients")
                } else {
                    match self.session.rcpt(&to).await {
                        Ok(()) => {
                            self.envelope.recipients += 1;
                            Reply::ok("2.1.5 Recipient OK")
                        }
                        Err(reply) => reply,
                    }
                }
            }
            Command::Data => {
                if !self.envelope.has_sender {
                    bad_sequence("5.5.1 Need MAIL command first")
                } else if self.envelope.recipients == 0 {
                    bad_sequence("5.5.1 Need RCPT command first")
                } else {
                    match self.receive_data().await? {
                        Some(reply) => reply,
                        None => return Ok(Flow::Close),
                    }
                }
            }
            Command::Rset => {
                self.session.reset().await;
                self.envelope.clear_transaction();
                Reply::ok("2.0.0 Reset OK")
            }
            Command::Vrfy { .. } => Reply::single(
                ReplyCode::CANNOT_VERIFY,
                "2.5.0 Cannot VRFY user, but will accept message",
            ),
            Command::Noop => Reply::ok("2.0.0 OK"),
            Command::Quit => {
                let reply = match self.session.logout().await {
                    Ok(()) => Reply::single(ReplyCode::CLOSING, "2.0.0 Bye"),
                    Err(reply) => reply,
                };
                self.stream.write_reply(&reply).await?;
                return Ok(Flow::Close);
            }
        };

        if reply.is_error() {
            debug!(peer = ?self.peer, code = %reply.code, "Command refused");
        }
        self.stream.write_reply(&reply).await?;
        Ok(Flow::Continue)
    }

    async fn greet(&mut self, client: &str, extended: bool) -> Reply {
        if self.envelope.has_sender {
            self.session.reset().await;
        }
        self.envelope.clear_transaction();
        self.envelope.greeted = true;
        info!(peer = ?self.peer, client, extended, "Client greeted");

        let greeting = format!("{} Hello {client}", self.config.hostname);
        if !extended {
            return Reply::ok(greeting);
        }

        let extensions = [
            Extension::Auth(vec![AuthMechanism::Plain, AuthMechanism::Login]),
            Extension::Size(Some(self.config.max_message_bytes)),
            Extension::EightBitMime,
            Extension::Pipelining,
        ];
        let mut lines = vec![greeting];
        lines.extend(extensions.iter().map(ToString::to_string));
        Reply::new(ReplyCode::OK, lines)
    }

    /// Runs the SASL exchange. Returns `None` if the client disconnected.
    async fn authenticate(
        &mut self,
        mechanism: AuthMechanism,
        initial_response: Option<String>,
    ) -> Result<Option<Reply>> {
        if !self.envelope.greeted {
            return Ok(Some(bad_sequence("5.5.1 Send HELO/EHLO first")));
        }
        if self.envelope.authenticated {
            return Ok(Some(bad_sequence("5.5.1 Already authenticated")));
        }
        if self.envelope.has_sender {
            return Ok(Some(bad_sequence("5.5.1 AUTH not permitted during a mail transaction")));
        }

        let credentials = match mechanism {
            AuthMechanism::Plain => {
                let response = match initial_response {
                    Some(response) => response,
                    None => match self.challenge("").await? {
                        Some(response) => response,
                        None => return Ok(None),
                    },
                };
                if response == "*" {
                    return Ok(Some(auth_cancelled()));
                }
                decode_auth_plain(&response)
            }
            AuthMechanism::Login => {
                let username = match initial_response {
                    Some(response) => response,
                    None => match self.challenge("VXNlcm5hbWU6").await? {
                        Some(response) => response,
                        None => return Ok(None),
                    },
                };
                if username == "*" {
                    return Ok(Some(auth_cancelled()));
                }
                let Some(password) = self.challenge("UGFzc3dvcmQ6").await? else {
                    return Ok(None);
                };
                if password == "*" {
                    return Ok(Some(auth_cancelled()));
                }
                decode_sasl_line(&username)
                    .and_then(|user| decode_sasl_line(&password).map(|pass| (user, pass)))
            }
        };

        let (username, password) = match credentials {
            Ok(credentials) => credentials,
            Err(e) => return Ok(Some(e.to_reply())),
        };

        Ok(Some(match self.session.auth(&username, &password).await {
            Ok(()) => {
                self.envelope.authenticated = true;
                info!(peer = ?self.peer, username = %username, mechanism = mechanism.as_str(), "Client authenticated");
                Reply::single(ReplyCode::AUTH_SUCCESS, "2.7.0 Authentication successful")
            }
            Err(reply) => {
                warn!(peer = ?self.peer, username = %username, "Authentication rejected");
                reply
            }
        }))
    }

    /// Sends a 334 challenge and reads the client's answer.
    async fn challenge(&mut self, prompt: &str) -> Result<Option<String>> {
        self.stream
            .write_reply(&Reply::single(ReplyCode::AUTH_CONTINUE, prompt))
            .await?;
        match self.read_line().await? {
            Line::Text(line) => Ok(Some(line)),
            Line::TooLong => Ok(Some(String::new())),
            Line::Eof => Ok(None),
        }
    }

    /// Collects DATA and hands it to the session. Returns `None` if the
    /// client disconnected mid-message.
    async fn receive_data(&mut self) -> Result<Option<Reply>> {
        self.stream
            .write_reply(&Reply::single(
                ReplyCode::START_DATA,
                "Start mail input; end with <CRLF>.<CRLF>",
            ))
            .await?;

        let body = tokio::time::timeout(
            self.config.data_timeout,
            self.stream.read_data(self.config.max_message_bytes),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        self.envelope.clear_transaction();
        match body {
            DataBody::Complete(bytes) => {
                debug!(peer = ?self.peer, bytes = bytes.len(), "Message received");
                Ok(Some(match self.session.data(bytes.as_slice()).await {
                    Ok(()) => Reply::ok("2.0.0 Message accepted"),
                    Err(reply) => reply,
                }))
            }
            DataBody::TooLarge => {
                warn!(peer = ?self.peer, limit = self.config.max_message_bytes, "Message too large");
                self.session.reset().await;
                Ok(Some(size_exceeded()))
            }
            DataBody::Eof => {
                warn!(peer = ?self.peer, "Client disconnected during DATA");
                Ok(None)
            }
        }
    }
}

fn bad_sequence(message: &str) -> Reply {
    Reply::single(ReplyCode::BAD_SEQUENCE, message)
}

fn size_exceeded() -> Reply {
    Reply::single(
        ReplyCode::EXCEEDED_STORAGE,
        "5.3.4 Message size exceeds fixed maximum message size",
    )
}

fn auth_cancelled() -> Reply {
    Reply::single(ReplyCode::PARAMETER_ERROR, "5.7.0 Authentication cancelled")
}
