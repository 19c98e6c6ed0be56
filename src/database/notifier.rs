//! Change notification for live queries
//!
//! Every committed write publishes the set of tables it touched. Each live
//! subscription watching one of those tables re-runs its query against the
//! committed state and receives the full result as a new snapshot.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_util::Stream;
use rusqlite::Connection;
use tokio::sync::mpsc;

use crate::error::Result;

/// Logical tables of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Teachers,
    Students,
    DebateSessions,
    SpeechRecordings,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Teachers => "teachers",
            Table::Students => "students",
            Table::DebateSessions => "debate_sessions",
            Table::SpeechRecordings => "speech_recordings",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            Table::Teachers => 1,
            Table::Students => 1 << 1,
            Table::DebateSessions => 1 << 2,
            Table::SpeechRecordings => 1 << 3,
        }
    }
}

/// A small set of tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSet(u8);

impl TableSet {
    pub fn empty() -> Self {
        TableSet(0)
    }

    pub fn of(tables: &[Table]) -> Self {
        tables.iter().fold(TableSet::empty(), |set, t| set.with(*t))
    }

    pub fn with(self, table: Table) -> Self {
        TableSet(self.0 | table.bit())
    }

    pub fn insert(&mut self, table: Table) {
        self.0 |= table.bit();
    }

    pub fn contains(&self, table: Table) -> bool {
        self.0 & table.bit() != 0
    }

    pub fn intersects(&self, other: TableSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

type Refresh = Box<dyn Fn(&Connection) -> Result<bool> + Send + Sync>;

struct Subscription {
    tables: TableSet,
    /// Re-runs the bound query and pushes the snapshot. Returns false once
    /// the receiving side is gone.
    refresh: Refresh,
}

#[derive(Default)]
struct Registry {
    subscriptions: DashMap<u64, Subscription>,
    next_id: AtomicU64,
}

/// Registry of live subscriptions
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<Registry>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Register a live query. The current snapshot is queued immediately.
    ///
    /// Callers must hold the writer lock so no commit can slip in between the
    /// initial snapshot and registration.
    pub(crate) fn register<T, Q>(
        &self,
        conn: &Connection,
        tables: TableSet,
        query: Q,
    ) -> Result<Observation<T>>
    where
        T: Send + 'static,
        Q: Fn(&Connection) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let initial = query(conn)?;
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, the send cannot fail.
        let _ = tx.send(initial);

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let refresh: Refresh = Box::new(move |conn: &Connection| {
            if tx.is_closed() {
                return Ok(false);
            }
            let snapshot = query(conn)?;
            Ok(tx.send(snapshot).is_ok())
        });
        self.inner
            .subscriptions
            .insert(id, Subscription { tables, refresh });
        log::debug!("Registered observation {} ({} live)", id, self.subscriber_count());

        Ok(Observation {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
            cancelled: false,
        })
    }

    /// Re-evaluate every subscription watching one of `changed`.
    ///
    /// Must be called after commit, with the writer lock still held, so
    /// snapshots reach each subscriber in commit order.
    pub(crate) fn publish(&self, conn: &Connection, changed: TableSet) {
        if changed.is_empty() || self.inner.subscriptions.is_empty() {
            return;
        }

        let mut closed = Vec::new();
        for entry in self.inner.subscriptions.iter() {
            if !entry.tables.intersects(changed) {
                continue;
            }
            match (entry.refresh)(conn) {
                Ok(true) => {}
                Ok(false) => closed.push(*entry.key()),
                Err(e) => log::warn!("Failed to refresh observation {}: {}", entry.key(), e),
            }
        }

        for id in closed {
            self.inner.subscriptions.remove(&id);
            log::debug!("Dropped closed observation {}", id);
        }
    }
}

/// A live query result. Yields the current snapshot first, then one full
/// snapshot per commit that touched a watched table.
///
/// Delivery is unbounded: every snapshot stays queued until it is read, so a
/// subscriber that stops reading holds one full result set per commit. Call
/// `latest` to drop the backlog, or `cancel` (or drop the observation) to stop
/// receiving.
pub struct Observation<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<Vec<T>>,
    registry: Weak<Registry>,
    cancelled: bool,
}

impl<T> Observation<T> {
    /// Wait for the next snapshot. `None` once cancelled or the store is gone.
    pub async fn recv(&mut self) -> Option<Vec<T>> {
        self.rx.recv().await
    }

    /// Next already-delivered snapshot, without waiting
    pub fn try_recv(&mut self) -> Option<Vec<T>> {
        self.rx.try_recv().ok()
    }

    /// Snapshots delivered but not yet read
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Skip to the newest delivered snapshot, discarding older ones
    pub fn latest(&mut self) -> Option<Vec<T>> {
        let mut newest = None;
        while let Ok(snapshot) = self.rx.try_recv() {
            newest = Some(snapshot);
        }
        newest
    }

    /// Stop listening. Safe to call more than once.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        if let Some(registry) = self.registry.upgrade() {
            registry.subscriptions.remove(&self.id);
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        log::debug!("Cancelled observation {}", self.id);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T> Drop for Observation<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

// No field is ever pinned.
impl<T> Unpin for Observation<T> {}

impl<T> Stream for Observation<T> {
    type Item = Vec<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
