use chrono::{DateTime, Utc};
use postwatch_core::{ErrorRecovery, RecoveryStrategy, SeenRecord, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, SqliteConnection};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        handle TEXT NOT NULL,
        link TEXT NOT NULL,
        alerted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(handle, link)
    )
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// SQLite primary result codes (extended codes carry these in the low byte)
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_CORRUPT: i64 = 11;
const SQLITE_CANTOPEN: i64 = 14;
const SQLITE_NOTADB: i64 = 26;

/// Durable record of every (handle, permalink) pair that has been alerted.
///
/// No connection outlives a call: each operation opens the file, does its
/// work and closes it again, so any number of workers (or processes) can use
/// the same store. The `UNIQUE(handle, link)` constraint is what guarantees a
/// post is only ever marked once.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl SeenStore {
    /// Opens (creating if needed) the store at `path` and ensures the schema.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();

        let store = Self { path, options };
        store.run_migrations().await?;
        info!(path = %store.path.display(), "Alert store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(SCHEMA).execute(&mut conn).await;
        close(conn).await;
        result.map_err(|e| StoreError::MigrationFailed {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    pub async fn already_notified(&self, handle: &str, permalink: &str) -> Result<bool, StoreError> {
        self.with_contention_retry(move || async move {
            let mut conn = self.connect().await?;
            let row = sqlx::query("SELECT 1 FROM posts WHERE handle = ? AND link = ?")
                .bind(handle)
                .bind(permalink)
                .fetch_optional(&mut conn)
                .await;
            close(conn).await;
            Ok::<_, StoreError>(row.map_err(map_sqlx_error)?.is_some())
        })
        .await
    }

    /// Records the pair. A second mark of the same pair, from this or any
    /// other worker, fails with [`StoreError::AlreadyExists`].
    pub async fn mark_notified(&self, handle: &str, permalink: &str) -> Result<(), StoreError> {
        self.with_contention_retry(move || async move {
            let mut conn = self.connect().await?;
            let result = sqlx::query("INSERT INTO posts (handle, link, alerted_at) VALUES (?, ?, ?)")
                .bind(handle)
                .bind(permalink)
                .bind(Utc::now())
                .execute(&mut conn)
                .await;
            close(conn).await;

            match result {
                Ok(_) => {
                    debug!(handle, permalink, "Marked post as alerted");
                    Ok(())
                }
                Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists {
                    handle: handle.to_string(),
                    permalink: permalink.to_string(),
                }),
                Err(e) => Err(map_sqlx_error(e)),
            }
        })
        .await
    }

    pub async fn record(
        &self,
        handle: &str,
        permalink: &str,
    ) -> Result<Option<SeenRecord>, StoreError> {
        self.with_contention_retry(move || async move {
            let mut conn = self.connect().await?;
            let row = sqlx::query(
                "SELECT id, handle, link, alerted_at FROM posts WHERE handle = ? AND link = ?",
            )
            .bind(handle)
            .bind(permalink)
            .fetch_optional(&mut conn)
            .await;
            close(conn).await;

            row.and_then(|row| row.as_ref().map(to_record).transpose())
                .map_err(map_sqlx_error)
        })
        .await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        self.with_contention_retry(move || async move {
            let mut conn = self.connect().await?;
            let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
                .fetch_one(&mut conn)
                .await;
            close(conn).await;
            count.map_err(map_sqlx_error)
        })
        .await
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(map_sqlx_error)
    }

    async fn with_contention_retry<F, Fut, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        ErrorRecovery::apply_strategy(RecoveryStrategy::store_contention(), operation)
            .await
            .into_result(|| StoreError::DatabaseLocked)
    }
}

async fn close(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        debug!("Closing store connection failed: {}", e);
    }
}

fn to_record(row: &SqliteRow) -> Result<SeenRecord, sqlx::Error> {
    let alerted_at: DateTime<Utc> = row.try_get("alerted_at")?;
    Ok(SeenRecord {
        id: row.try_get("id")?,
        handle: row.try_get("handle")?,
        permalink: row.try_get("link")?,
        alerted_at,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

fn primary_code(err: &sqlx::Error) -> Option<i64> {
    let code = err.as_database_error()?.code()?;
    code.parse::<i64>().ok().map(|c| c & 0xff)
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match primary_code(&err) {
        Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => return StoreError::DatabaseLocked,
        Some(SQLITE_CORRUPT) | Some(SQLITE_NOTADB) => return StoreError::CorruptDatabase,
        Some(SQLITE_CANTOPEN) => {
            return StoreError::ConnectionFailed {
                reason: err.to_string(),
            }
        }
        _ => {}
    }
    match err {
        sqlx::Error::Io(e) => StoreError::ConnectionFailed {
            reason: e.to_string(),
        },
        other => StoreError::Sql(other),
    }
}
