// crates/stockrx-ops/src/db/pool.rs
// Async connection pool using deadpool-sqlite
//
// # Async Database Access Patterns
//
// ## Preferred Pattern: pool.run()
// Use `pool.run()` for reconciliation and patch code: it handles error
// conversion to `StockrxError` automatically:
// ```ignore
// let report = pool
//     .run(move |conn| check_integrity(conn, EntityKind::Inventory, id))
//     .await?;
// ```
//
// ## Lower-Level: pool.interact()
// Use `pool.interact()` when you need `anyhow::Result` instead of
// `StockrxError`, e.g. in migrations or CLI glue:
// ```ignore
// let count = pool.interact(move |conn| {
//     Ok(conn.query_row("SELECT COUNT(*) FROM inventories", [], |r| r.get(0))?)
// }).await?;
// ```
//
// ## Common Pitfalls
//
// 1. **Don't block the async runtime**: Always go through `run()` or
//    `interact()`; the closure runs on a blocking thread.
//
// 2. **Type inference**: add explicit types when the closure's error type is
//    ambiguous: `Ok::<_, rusqlite::Error>(result)`
//
// 3. **Capturing variables**: clone `Arc` values before the closure.
//
// 4. **In-memory testing**: shared cache URI (`file:stockrx_<uuid>?mode=memory&cache=shared`)
//    so every pooled connection sees the same database.

use crate::error::StockrxError;
use crate::utils::path_to_string;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Check if a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED.
///
/// SQLITE_BUSY ("database is locked") occurs with file-based databases under write contention.
/// SQLITE_LOCKED ("database table is locked") occurs with shared-cache in-memory databases
/// when another connection holds a write lock on the same table.
fn is_rusqlite_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Check if a StockrxError wraps a SQLite contention error.
fn is_stockrx_contention(err: &StockrxError) -> bool {
    match err {
        StockrxError::Db(rusqlite_err) => is_rusqlite_contention(rusqlite_err),
        _ => false,
    }
}

/// Retry delays for SQLite contention backoff (100ms, 500ms, 2s).
const RETRY_DELAYS: [std::time::Duration; 3] = [
    std::time::Duration::from_millis(100),
    std::time::Duration::from_millis(500),
    std::time::Duration::from_millis(2000),
];

/// Generic retry-with-backoff for async operations that may encounter SQLite contention.
async fn retry_with_backoff<F, Fut, R, E>(
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if is_retryable(&e) {
                    tracing::warn!(
                        "SQLite contention on attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        RETRY_DELAYS.len(),
                        delay
                    );
                    tokio::time::sleep(*delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }

    // Final attempt (no retry after this)
    op().await
}

/// Pooled access to the StockRx database.
pub struct DatabasePool {
    pool: Pool,
}

impl DatabasePool {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// Only a database file created here is restricted to its owner; an
    /// existing file keeps its mode.
    pub async fn open(path: &Path) -> Result<Self> {
        ensure_parent_directory(path)?;
        let created = (!path.exists()).then(|| path.to_path_buf());
        let pool = build_pool(&path_to_string(path), FILE_PRAGMAS, created)?;
        Self::migrated(pool).await
    }

    /// Open a fresh in-memory database.
    ///
    /// Every pooled connection shares one cache through a uniquely named URI;
    /// a plain `:memory:` would give each connection its own empty store.
    pub async fn open_in_memory() -> Result<Self> {
        let uri = format!(
            "file:stockrx_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        );
        let pool = build_pool(&uri, MEMORY_PRAGMAS, None)?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: Pool) -> Result<Self> {
        let db_pool = Self { pool };
        db_pool
            .interact(|conn| {
                super::schema::run_all_migrations(conn)?;
                if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                    tracing::debug!("PRAGMA optimize skipped: {}", e);
                }
                Ok(())
            })
            .await?;
        Ok(db_pool)
    }

    /// Run a closure with a connection from the pool.
    ///
    /// The closure runs on a blocking thread pool, so it won't block the
    /// async runtime.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Like `interact` but logs failures at warn level and swallows them.
    /// Use for best-effort writes such as the execution audit log.
    pub async fn try_interact_warn<F, R>(&self, label: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let label = label.to_string();
        match self.interact(move |conn| f(conn)).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("{}: {}", label, e);
                None
            }
        }
    }

    /// Run a closure returning any error convertible into `StockrxError`.
    pub async fn run<F, R, E>(&self, f: F) -> Result<R, StockrxError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<StockrxError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| StockrxError::Other(format!("Failed to get connection: {}", e)))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(|e| StockrxError::Other(format!("Database error: {}", e)))?
    }

    /// Like [`run`](Self::run) but with retry on SQLite contention errors.
    ///
    /// Uses exponential backoff (100ms, 500ms, 2000ms) for up to 3 retries.
    /// The closure must be `Clone` to support retries.
    pub async fn run_with_retry<F, R, E>(&self, f: F) -> Result<R, StockrxError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + Clone + 'static,
        R: Send + 'static,
        E: Into<StockrxError> + Send + 'static,
    {
        retry_with_backoff(
            || {
                let f_clone = f.clone();
                self.run(f_clone)
            },
            is_stockrx_contention,
        )
        .await
    }
}

/// Create the parent directory if it is missing.
///
/// A directory created here is owner-only (0o700 on Unix). Existing
/// directories are left as they are: `--db` may point into a shared location.
fn ensure_parent_directory(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent)?;
    #[cfg(unix)]
    {
        let mut perms = std::fs::metadata(parent)?.permissions();
        perms.set_mode(0o700);
        std::fs::set_permissions(parent, perms)?;
    }
    Ok(())
}

/// Applied to every file-backed connection
const FILE_PRAGMAS: &str = "PRAGMA journal_mode=WAL; \
     PRAGMA foreign_keys=ON; \
     PRAGMA busy_timeout=5000; \
     PRAGMA synchronous=NORMAL; \
     PRAGMA journal_size_limit=32768;";

const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;";

fn build_pool(conn_str: &str, pragmas: &'static str, new_file: Option<PathBuf>) -> Result<Pool> {
    Config::new(conn_str)
        .builder(Runtime::Tokio1)
        .context("Failed to create pool builder")?
        .max_size(4)
        .post_create(connection_hook(pragmas, new_file))
        .build()
        .context("Failed to build connection pool")
}

/// Applies `pragmas` to every new connection. A `new_file` is made private
/// to the owner (0o600 on Unix).
fn connection_hook(pragmas: &'static str, new_file: Option<PathBuf>) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let new_file = new_file.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                conn.execute_batch(pragmas)?;
                #[cfg(unix)]
                if let Some(file) = new_file.as_deref()
                    && let Ok(metadata) = std::fs::metadata(file)
                {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(file, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }
                #[cfg(not(unix))]
                let _ = new_file;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}
