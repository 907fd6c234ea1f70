//! SQLite connection management for run databases
//!
//! The collector owns one read-write connection per run file ([`RunWriter`]).
//! The dashboard reads the same file through a small pool of read-only
//! connections ([`SqliteStore`]) so concurrent live sessions do not queue up
//! behind a single connection.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::migrations::run_migrations;
use super::queries;
use super::MetricsStore;
use crate::error::{Result, ScopeError};
use crate::types::{EpisodeRecord, StepRecord, DEFAULT_QUERY_TIMEOUT_MS};

/// Default number of read connections per store
pub const DEFAULT_POOL_SIZE: usize = 4;

/// How long a reader waits on the collector's write lock by default
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS);

/// Read-write handle used by the training-side collector
pub struct RunWriter {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl RunWriter {
    /// Open or create a run database and bring its schema up to date
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            "#,
        )?;
        run_migrations(&conn)?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn append_step(&self, step: &StepRecord) -> Result<()> {
        let conn = self.conn.lock();
        queries::insert_step(&conn, step)
    }

    pub fn append_episode(&self, episode: &EpisodeRecord) -> Result<()> {
        let conn = self.conn.lock();
        queries::insert_episode(&conn, episode)
    }

    /// Execute a function with a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read-only metrics store over a collector run database
pub struct SqliteStore {
    path: PathBuf,
    pool: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
}

impl SqliteStore {
    /// Open an existing run database with the default pool size
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    /// Open an existing run database with `pool_size` read connections
    pub fn with_pool_size(path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        Self::with_options(path, pool_size, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open an existing run database.
    ///
    /// `busy_timeout` bounds how long a read waits on the collector's write
    /// lock. Keep it at or below the caller's query timeout, otherwise a read
    /// abandoned by the caller keeps a blocking thread busy after it gave up.
    pub fn with_options(
        path: impl AsRef<Path>,
        pool_size: usize,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ScopeError::AdapterUnavailable(format!(
                "Run database not found: {}",
                path.display()
            )));
        }

        let mut pool = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            pool.push(Arc::new(Mutex::new(Self::create_connection(
                &path,
                busy_timeout,
            )?)));
        }

        Ok(Self {
            path,
            pool,
            next: AtomicUsize::new(0),
        })
    }

    /// Create a read-only connection with reader pragmas
    fn create_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        // The collector may hold the write lock while flushing a batch
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            r#"
            PRAGMA query_only=ON;
            PRAGMA cache_size=-8000;
            "#,
        )?;

        Ok(conn)
    }

    /// Get a connection from the pool (round-robin)
    fn get(&self) -> Arc<Mutex<Connection>> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[idx].clone()
    }

    /// Execute a function with a connection from the pool
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn_arc = self.get();
        let conn = conn_arc.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

impl MetricsStore for SqliteStore {
    fn recent_steps(&self, n: usize) -> Result<Vec<StepRecord>> {
        self.with_connection(|conn| queries::recent_steps(conn, n))
    }

    fn recent_episodes(&self, n: usize) -> Result<Vec<EpisodeRecord>> {
        self.with_connection(|conn| queries::recent_episodes(conn, n))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
