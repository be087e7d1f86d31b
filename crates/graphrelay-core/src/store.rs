//! Shared in-memory transaction store with abandonment reclamation.
//!
//! Every session writes its transactions here. All edits happen under one
//! coarse lock that is never held across an `.await`. A background task
//! deletes rows that have not been touched for longer than the
//! abandonment threshold, which covers clients that disconnect mid-DATA.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the reclaimer wakes up.
pub const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Idle time after which a row counts as abandoned.
pub const ABANDON_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Identifies a transaction within the store.
///
/// The opening sequence number survives re-keying, so two sequential
/// transactions in one session with the same sender and subject never
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    session: Uuid,
    sender: String,
    sequence: u64,
    opened_at: DateTime<Utc>,
    subject: Option<String>,
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

impl TransactionKey {
    /// Creates a key for a transaction opened now.
    #[must_use]
    pub fn new(session: Uuid, sender: impl Into<String>) -> Self {
        Self {
            session,
            sender: sender.into(),
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            opened_at: Utc::now(),
            subject: None,
        }
    }

    /// Returns the same key with the subject filled in.
    #[must_use]
    pub fn with_subject(&self, subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..self.clone()
        }
    }

    /// Owning session.
    #[must_use]
    pub const fn session(&self) -> Uuid {
        self.session
    }

    /// Envelope sender.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// When MAIL opened the transaction.
    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Subject, once DATA has been parsed.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.session,
            self.sender,
            self.subject.as_deref().unwrap_or_default()
        )
    }
}

/// Accumulated state of one MAIL..DATA cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailTransaction {
    from: String,
    to: Vec<String>,
    segments: Vec<Vec<u8>>,
}

impl EmailTransaction {
    /// Starts a transaction for an envelope sender.
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Self::default()
        }
    }

    /// Envelope sender.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.from
    }

    /// Envelope recipients in arrival order.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    /// Adds a recipient unless an address differing only in case is
    /// already present. Returns true if it was added.
    pub fn add_recipient(&mut self, address: impl Into<String>) -> bool {
        let address = address.into();
        if self.to.iter().any(|known| known.eq_ignore_ascii_case(&address)) {
            return false;
        }
        self.to.push(address);
        true
    }

    /// Appends one chunk of message data.
    pub fn append(&mut self, segment: Vec<u8>) {
        self.segments.push(segment);
    }

    /// Returns true once any DATA has been received.
    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Concatenates all data segments in arrival order.
    #[must_use]
    pub fn content(&self) -> Vec<u8> {
        self.segments.concat()
    }
}

#[derive(Debug)]
struct Row {
    transaction: EmailTransaction,
    touched: Instant,
}

/// Shared transaction table.
#[derive(Debug, Default)]
pub struct TransactionStore {
    rows: Mutex<HashMap<TransactionKey, Row>>,
}

impl TransactionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<TransactionKey, Row>> {
        // Every edit leaves the map consistent, so a poisoned lock is usable.
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a transaction, replacing any row with the same key.
    pub fn insert(&self, key: TransactionKey, transaction: EmailTransaction) {
        self.rows().insert(
            key,
            Row {
                transaction,
                touched: Instant::now(),
            },
        );
    }

    /// Runs `f` on a transaction and refreshes its timestamp.
    ///
    /// Returns `None` if the key is absent.
    pub fn with_transaction<R>(
        &self,
        key: &TransactionKey,
        f: impl FnOnce(&mut EmailTransaction) -> R,
    ) -> Option<R> {
        let mut rows = self.rows();
        let row = rows.get_mut(key)?;
        row.touched = Instant::now();
        Some(f(&mut row.transaction))
    }

    /// Moves a row to a new key, refreshing its timestamp.
    ///
    /// Returns false if `old` is absent.
    pub fn rekey(&self, old: &TransactionKey, new: TransactionKey) -> bool {
        let mut rows = self.rows();
        let Some(mut row) = rows.remove(old) else {
            return false;
        };
        row.touched = Instant::now();
        rows.insert(new, row);
        true
    }

    /// Removes and returns a transaction.
    pub fn remove(&self, key: &TransactionKey) -> Option<EmailTransaction> {
        self.rows().remove(key).map(|row| row.transaction)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &TransactionKey) -> bool {
        self.rows().contains_key(key)
    }

    /// Number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// Returns true if no rows are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Deletes rows idle for longer than `threshold`. Returns how many were
    /// deleted.
    pub fn reclaim(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|key, row| {
            let keep = now.duration_since(row.touched) <= threshold;
            if !keep {
                warn!(transaction = %key, "Reclaiming abandoned transaction");
            }
            keep
        });
        before - rows.len()
    }

    /// Spawns the reclamation task. It stops when `shutdown` is cancelled.
    pub fn spawn_reclaimer(
        self: &Arc<Self>,
        interval: Duration,
        threshold: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reclaimed = store.reclaim(threshold);
                        if reclaimed > 0 {
                            info!(reclaimed, remaining = store.len(), "Reclaimed abandoned transactions");
                        } else {
                            debug!(rows = store.len(), "Reclaimer tick");
                        }
                    }
                    () = shutdown.cancelled() => {
                        debug!("Reclaimer stopped");
                        return;
                    }
                }
            }
        })
    }
}
