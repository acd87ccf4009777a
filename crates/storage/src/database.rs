#![forbid(unsafe_code)]

use crate::{StoreConfig, StoreError};
use rusqlite::{Connection, Params, Row};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Ddl,
    Insert,
    Update,
    Delete,
    Select,
}

impl StatementKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ddl => "ddl",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
        }
    }
}

/// Counts of successfully executed statements per kind, plus failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SqlStats {
    pub ddl: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub selects: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ddl: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    selects: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(&self, kind: StatementKind) {
        let counter = match kind {
            StatementKind::Ddl => &self.ddl,
            StatementKind::Insert => &self.inserts,
            StatementKind::Update => &self.updates,
            StatementKind::Delete => &self.deletes,
            StatementKind::Select => &self.selects,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SqlStats {
        SqlStats {
            ddl: self.ddl.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            selects: self.selects.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// The single shared store connection. Every statement is its own implicit
/// unit of work; nothing here opens a transaction.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    counters: Counters,
}

impl Database {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = match config.db_path() {
            Some(db_path) => {
                if let Some(dir) = config.storage_dir() {
                    std::fs::create_dir_all(dir)?;
                }
                let conn = Connection::open(&db_path)?;
                conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
                tracing::debug!(path = %db_path.display(), "opened record database");
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self {
            conn: Mutex::new(conn),
            counters: Counters::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn stats(&self) -> SqlStats {
        self.counters.snapshot()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn execute<P: Params>(
        &self,
        kind: StatementKind,
        sql: &str,
        params: P,
    ) -> Result<usize, StoreError> {
        tracing::trace!(target: "rr_storage::sql", kind = kind.as_str(), sql, "execute");
        let result = self.conn().execute(sql, params);
        match result {
            Ok(changed) => {
                self.counters.bump(kind);
                Ok(changed)
            }
            Err(err) => Err(self.report(kind, sql, err)),
        }
    }

    pub(crate) fn query<T, P, F>(&self, sql: &str, params: P, mut map: F) -> Result<Vec<T>, StoreError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> Result<T, StoreError>,
    {
        tracing::trace!(target: "rr_storage::sql", kind = "select", sql, "query");
        let conn = self.conn();
        let run = || -> Result<Vec<T>, StoreError> {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(map(row)?);
            }
            Ok(out)
        };
        match run() {
            Ok(out) => {
                self.counters.bump(StatementKind::Select);
                Ok(out)
            }
            Err(StoreError::Sql(err)) => Err(self.report(StatementKind::Select, sql, err)),
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(sql, error = %err, "row decoding failed");
                Err(err)
            }
        }
    }

    fn report(&self, kind: StatementKind, sql: &str, err: rusqlite::Error) -> StoreError {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(kind = kind.as_str(), sql, error = %err, "statement failed");
        StoreError::Sql(err)
    }
}
