//! Per-connection relay sessions.
//!
//! A [`RelaySession`] aggregates one or more transactions in the shared
//! [`TransactionStore`] and hands each completed one to the transformer
//! and the Graph sender when the client says QUIT.

use crate::error::{Error, Result};
use crate::graph::{MailSender, RetryPolicy, SendMailRequest};
use crate::store::{EmailTransaction, TransactionKey, TransactionStore};
use crate::transform::transform;
use graphrelay_mime::{Headers, split_header_body};
use graphrelay_smtp::{Address, Backend, Reply, Session};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Creates a [`RelaySession`] for every accepted connection.
pub struct RelayBackend<M> {
    store: Arc<TransactionStore>,
    sender: Arc<M>,
    retry: RetryPolicy,
}

impl<M> Clone for RelayBackend<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sender: Arc::clone(&self.sender),
            retry: self.retry,
        }
    }
}

impl<M: MailSender> RelayBackend<M> {
    /// Creates a backend sharing `store` between all sessions.
    #[must_use]
    pub fn new(store: Arc<TransactionStore>, sender: M) -> Self {
        Self {
            store,
            sender: Arc::new(sender),
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the delivery retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the shared store.
    #[must_use]
    pub const fn store(&self) -> &Arc<TransactionStore> {
        &self.store
    }

    /// Opens a session directly, without a connection.
    #[must_use]
    pub fn session(&self, peer: Option<SocketAddr>) -> RelaySession<M> {
        RelaySession {
            id: Uuid::new_v4(),
            peer,
            store: Arc::clone(&self.store),
            sender: Arc::clone(&self.sender),
            retry: self.retry,
            current: None,
            completed: Vec::new(),
        }
    }
}

impl<M: MailSender> Backend for RelayBackend<M> {
    type Session = RelaySession<M>;

    fn new_session(&self, peer: Option<SocketAddr>) -> Self::Session {
        let session = self.session(peer);
        info!(session = %session.id, ?peer, "Session opened");
        session
    }
}

/// State of one SMTP connection.
pub struct RelaySession<M> {
    id: Uuid,
    peer: Option<SocketAddr>,
    store: Arc<TransactionStore>,
    sender: Arc<M>,
    retry: RetryPolicy,
    /// Transaction opened by the latest MAIL.
    current: Option<TransactionKey>,
    /// Transactions that received DATA before a later MAIL.
    completed: Vec<TransactionKey>,
}

impl<M: MailSender> RelaySession<M> {
    /// Session id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Key of the transaction opened by the latest MAIL, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&TransactionKey> {
        self.current.as_ref()
    }

    /// Starts a transaction for `from`.
    ///
    /// A previous transaction without DATA is discarded; one that already
    /// received DATA is kept for delivery at logout.
    pub fn open(&mut self, from: &str) {
        self.retire_current();

        let key = TransactionKey::new(self.id, from);
        self.store.insert(key.clone(), EmailTransaction::new(from));
        info!(session = %self.id, from, "MAIL");
        self.current = Some(key);
    }

    /// Adds a recipient to the current transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolSequence`] if no transaction is open.
    pub fn add_recipient(&mut self, to: &str) -> Result<()> {
        let key = self
            .current
            .as_ref()
            .ok_or(Error::ProtocolSequence("Need MAIL command"))?;
        let added = self
            .store
            .with_transaction(key, |tx| tx.add_recipient(to))
            .ok_or(Error::ProtocolSequence("Transaction expired, send MAIL again"))?;
        info!(session = %self.id, to, duplicate = !added, "RCPT");
        Ok(())
    }

    /// Reads message data into the current transaction and re-keys it by
    /// Subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolSequence`] without a transaction or
    /// recipient, and [`Error::StreamRead`] if reading fails.
    pub async fn receive<R: AsyncRead + Unpin>(&mut self, mut reader: R) -> Result<()> {
        let key = self
            .current
            .clone()
            .ok_or(Error::ProtocolSequence("Need MAIL command"))?;
        let recipients = self
            .store
            .with_transaction(&key, |tx| tx.recipients().len())
            .unwrap_or(0);
        if recipients == 0 {
            return Err(Error::ProtocolSequence("Need RCPT command"));
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let subject = peek_subject(&data);
        let size = data.len();

        self.store
            .with_transaction(&key, |tx| tx.append(data))
            .ok_or(Error::ProtocolSequence("Transaction expired, send MAIL again"))?;

        if let Some(subject) = subject.filter(|s| key.subject() != Some(s.as_str())) {
            let renamed = key.with_subject(subject);
            if self.store.rekey(&key, renamed.clone()) {
                self.current = Some(renamed);
            }
        }

        info!(session = %self.id, bytes = size, "DATA");
        Ok(())
    }

    /// Deletes the current transaction, with or without DATA, and returns
    /// the session to idle. Transactions queued by an earlier MAIL are kept.
    pub fn discard(&mut self) {
        if let Some(current) = self.current.take() {
            self.store.remove(&current);
            debug!(session = %self.id, transaction = %current, "Discarded current transaction");
        }
        info!(session = %self.id, "RSET");
    }

    /// Queues the current transaction if it has data, otherwise deletes it.
    fn retire_current(&mut self) {
        let Some(previous) = self.current.take() else {
            return;
        };
        let has_data = self
            .store
            .with_transaction(&previous, |tx| tx.has_data())
            .unwrap_or(false);
        if has_data {
            self.completed.push(previous);
        } else {
            self.store.remove(&previous);
            debug!(session = %self.id, transaction = %previous, "Discarded incomplete transaction");
        }
    }

    /// Delivers every completed transaction plus the current one, in
    /// arrival order, and removes their rows.
    ///
    /// # Errors
    ///
    /// Returns the first failure; every failure is logged.
    pub async fn finish(&mut self) -> Result<()> {
        let keys: Vec<TransactionKey> = self.completed.drain(..).chain(self.current.take()).collect();
        info!(session = %self.id, peer = ?self.peer, transactions = keys.len(), "QUIT");

        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.deliver(&key).await {
                error!(session = %self.id, transaction = %key, error = %e, "Failed to relay message");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn deliver(&self, key: &TransactionKey) -> Result<()> {
        let transaction = self
            .store
            .remove(key)
            .ok_or_else(|| Error::Incomplete(key.to_string()))?;
        if !transaction.has_data() {
            return Err(Error::Incomplete(key.to_string()));
        }

        let message = transform(&transaction.content(), transaction.recipients())?;
        let request = SendMailRequest::new(message);
        self.retry
            .send(self.sender.as_ref(), transaction.sender(), &request)
            .await?;

        info!(
            session = %self.id,
            from = transaction.sender(),
            recipients = transaction.recipients().len(),
            subject = %request.message.subject,
            "Message relayed"
        );
        Ok(())
    }
}

/// Extracts the decoded Subject from the header block of raw data.
fn peek_subject(data: &[u8]) -> Option<String> {
    let (header, _) = split_header_body(data);
    Headers::parse(&String::from_utf8_lossy(header))
        .ok()?
        .get_decoded("subject")
}

impl<M: MailSender> Session for RelaySession<M> {
    async fn auth(&mut self, username: &str, _password: &str) -> std::result::Result<(), Reply> {
        info!(session = %self.id, username, "AUTH accepted");
        Ok(())
    }

    async fn mail(&mut self, from: &Address) -> std::result::Result<(), Reply> {
        self.open(from.as_str());
        Ok(())
    }

    async fn rcpt(&mut self, to: &Address) -> std::result::Result<(), Reply> {
        self.add_recipient(to.as_str()).map_err(|e| e.to_reply())
    }

    async fn data<R: AsyncRead + Unpin + Send>(&mut self, reader: R) -> std::result::Result<(), Reply> {
        self.receive(reader).await.map_err(|e| {
            warn!(session = %self.id, error = %e, "DATA rejected");
            e.to_reply()
        })
    }

    async fn reset(&mut self) {
        self.discard();
    }

    async fn logout(&mut self) -> std::result::Result<(), Reply> {
        self.finish().await.map_err(|e| e.to_reply())
    }
}
