// Database Manager for the debate feedback store
// Owns the SQLite connections, serializes writes and publishes changes

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use rusqlite::{Connection, OpenFlags};

use super::entity::{self, Entity};
use super::migrations;
use super::notifier::{ChangeNotifier, Observation, Table, TableSet};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Database manager that owns the SQLite connections.
///
/// All writes go through one writer connection, one transaction at a time.
/// Reads use a separate read-only connection which, in WAL mode, always sees
/// the last committed state and never a transaction in flight.
pub struct DatabaseManager {
    writer: ConnectionLock,
    reader: ConnectionLock,
    notifier: ChangeNotifier,
    db_path: PathBuf,
}

/// Mutex around a connection that remembers which thread holds it, so a
/// store call made from inside another one on the same thread fails with
/// `NestedTransaction` instead of blocking forever.
struct ConnectionLock {
    name: &'static str,
    conn: Mutex<Connection>,
    holder: Mutex<Option<ThreadId>>,
}

struct HeldConnection<'a> {
    conn: MutexGuard<'a, Connection>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl ConnectionLock {
    fn new(name: &'static str, conn: Connection) -> Self {
        Self {
            name,
            conn: Mutex::new(conn),
            holder: Mutex::new(None),
        }
    }

    fn acquire(&self) -> Result<HeldConnection<'_>> {
        let me = thread::current().id();
        let reentered = *self.holder.lock().map_err(|_| StoreError::Poisoned(self.name))? == Some(me);
        if reentered {
            return Err(StoreError::NestedTransaction(self.name));
        }

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned(self.name))?;
        *self.holder.lock().map_err(|_| StoreError::Poisoned(self.name))? = Some(me);
        Ok(HeldConnection {
            conn,
            holder: &self.holder,
        })
    }
}

impl Drop for HeldConnection<'_> {
    fn drop(&mut self) {
        // Cleared before the connection guard is released
        if let Ok(mut holder) = self.holder.lock() {
            *holder = None;
        }
    }
}

/// A write transaction in progress.
///
/// Handed to the closure passed to `with_transaction`. It commits when the
/// closure returns `Ok` and rolls back on any error. It offers no way to open
/// a nested transaction.
pub struct WriteScope<'a> {
    conn: &'a Connection,
    touched: TableSet,
}

impl<'a> WriteScope<'a> {
    /// The connection inside the transaction, for reads that must see
    /// uncommitted writes of this scope
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Mark a table as changed so observers re-run after commit
    pub fn touch(&mut self, table: Table) {
        self.touched.insert(table);
    }

    pub fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        entity::get(self.conn, id)
    }

    pub fn exists(&self, table: Table, id: &str) -> Result<bool> {
        entity::exists(self.conn, table, id)
    }

    pub fn upsert<E: Entity>(&mut self, value: &E) -> Result<()> {
        if entity::upsert(self.conn, value)? > 0 {
            self.touch(E::TABLE);
        }
        Ok(())
    }

    /// Full-row replace of an existing row. `NotFound` when the id is absent.
    pub fn update<E: Entity>(&mut self, value: &E) -> Result<()> {
        if entity::update(self.conn, value)? == 0 {
            return Err(StoreError::not_found(E::NAME, value.id()));
        }
        self.touch(E::TABLE);
        Ok(())
    }

    pub fn delete_by_id(&mut self, table: Table, id: &str) -> Result<usize> {
        self.delete_where(table, "id", id)
    }

    pub fn delete_where(&mut self, table: Table, column: &'static str, value: &str) -> Result<usize> {
        let deleted = entity::delete_where(self.conn, table, column, value)?;
        if deleted > 0 {
            self.touch(table);
        }
        Ok(deleted)
    }

    pub fn delete_all(&mut self, table: Table) -> Result<usize> {
        let deleted = entity::delete_all(self.conn, table)?;
        if deleted > 0 {
            self.touch(table);
        }
        Ok(deleted)
    }
}

impl DatabaseManager {
    /// Create a new DatabaseManager with the database at the specified path
    pub fn new(db_path: PathBuf) -> Result<Self> {
        Self::open(&StoreConfig::at(db_path))
    }

    /// Open (or create) the database described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = config.db_path.clone();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = match Self::open_writer(&db_path, config) {
            Err(StoreError::SchemaMismatch { expected, found }) if config.reset_on_schema_mismatch => {
                log::warn!(
                    "Schema mismatch at {:?} (expected {}, found {}), resetting local store",
                    db_path,
                    expected,
                    found
                );
                Self::destroy(&db_path)?;
                Self::open_writer(&db_path, config)?
            }
            other => other?,
        };

        let reader = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
        )?;
        reader.busy_timeout(config.busy_timeout())?;

        log::info!("Database initialized at: {:?}", db_path);

        Ok(Self {
            writer: ConnectionLock::new("writer", writer),
            reader: ConnectionLock::new("reader", reader),
            notifier: ChangeNotifier::new(),
            db_path,
        })
    }

    fn open_writer(db_path: &Path, config: &StoreConfig) -> Result<Connection> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(config.busy_timeout())?;

        // WAL lets the reader connection see the last commit while a write is open
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        log::debug!("Journal mode: {}", mode);

        conn.execute("PRAGMA foreign_keys = ON", [])?;

        migrations::run_migrations(&conn)?;
        Ok(conn)
    }

    /// Delete the database file and its WAL side files. The explicit reset
    /// for a `SchemaMismatch`.
    pub fn destroy(db_path: &Path) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = db_path.as_os_str().to_owned();
            path.push(suffix);
            match std::fs::remove_file(&path) {
                Ok(()) => log::info!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Execute a read against the last committed state.
    ///
    /// Reads are allowed inside a write transaction and see the state before
    /// it. A read started from inside another read fails with `NestedTransaction`.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let reader = self.reader.acquire()?;
        f(&reader.conn)
    }

    /// Run `f` inside a single write transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls everything back and is
    /// returned unchanged. Observers are notified only after a successful
    /// commit, once per commit. Any write or `observe` call made from inside
    /// `f` fails with `NestedTransaction`.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteScope<'_>) -> Result<T>,
    {
        let mut writer = self.writer.acquire()?;
        let tx = writer.conn.transaction()?;

        let (out, touched) = {
            let mut scope = WriteScope {
                conn: &tx,
                touched: TableSet::empty(),
            };
            let out = f(&mut scope)?;
            (out, scope.touched)
        };

        tx.commit()?;
        self.notifier.publish(&writer.conn, touched);
        Ok(out)
    }

    /// Register a live query over `tables`.
    ///
    /// Holds the writer lock while taking the first snapshot so that no
    /// commit is missed or delivered twice.
    pub fn observe<T, Q>(&self, tables: TableSet, query: Q) -> Result<Observation<T>>
    where
        T: Send + 'static,
        Q: Fn(&Connection) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let writer = self.writer.acquire()?;
        self.notifier.register(&writer.conn, tables, query)
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}
