pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub use error::{DbError, Result};
pub use queries::ReadingFilter;

const WRITE_ATTEMPTS: u32 = 5;
const WRITE_BACKOFF_MS: u64 = 25;

#[derive(Debug, Clone)]
pub struct DbOptions {
    /// Read-only connections served round-robin next to the single writer.
    pub reader_pool_size: usize,
    /// Per-attempt bound on the in-process connection lock and SQLite's busy
    /// handler. A write retries up to five times with backoff in between, so
    /// its total wait can reach roughly five times this plus the backoff.
    pub timeout: Duration,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            reader_pool_size: 4,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Shared storage handle: one writer, a pool of readers.
///
/// Every mutation funnels through the writer connection, so SQLite never
/// sees two write transactions from this process at once. WAL mode lets the
/// readers run concurrently with it and only ever see committed rows.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
    timeout: Duration,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, DbOptions::default())
    }

    pub fn open_with(path: &Path, options: DbOptions) -> Result<Self> {
        let mut writer = Connection::open(path)?;
        writer.busy_timeout(options.timeout)?;
        let mode: String =
            writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!("journal_mode is {}, readers may block on the writer", mode);
        }
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&mut writer)?;

        let pool_size = options.reader_pool_size.max(1);
        let mut readers = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(options.timeout)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            pool_size
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
            timeout: options.timeout,
        })
    }

    /// Run a read-only closure on the next reader connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .try_lock_for(self.timeout)
            .ok_or(DbError::LockTimeout(self.timeout, "reader"))?;
        f(&*conn)
    }

    /// Run a mutating closure on the writer connection.
    ///
    /// The closure may run more than once: busy/locked failures are retried
    /// with exponential backoff, so it must not have side effects outside
    /// the transaction it opens.
    pub fn with_conn_mut<F, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> Result<T>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = {
                let mut conn = self
                    .writer
                    .try_lock_for(self.timeout)
                    .ok_or(DbError::LockTimeout(self.timeout, "writer"))?;
                f(&mut *conn)
            };

            match result {
                Err(DbError::Busy(e)) if attempts < WRITE_ATTEMPTS => {
                    let wait_ms = WRITE_BACKOFF_MS * 2_u64.pow(attempts - 1);
                    warn!(
                        "Write failed (attempt {}/{}), retrying in {}ms: {}",
                        attempts, WRITE_ATTEMPTS, wait_ms, e
                    );
                    std::thread::sleep(Duration::from_millis(wait_ms));
                }
                other => return other,
            }
        }
    }

    /// Close every connection, reporting the first failure.
    pub fn close(self) -> Result<()> {
        let mut first_err = None;
        for conn in std::iter::once(self.writer).chain(self.readers) {
            if let Err((_, e)) = conn.into_inner().close() {
                warn!("Failed to close connection: {}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => {
                info!("Database closed");
                Ok(())
            }
        }
    }
}
