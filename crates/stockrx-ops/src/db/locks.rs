// crates/stockrx-ops/src/db/locks.rs
// Per-patch advisory locks
//
// A lock is one row in `patch_locks` keyed by patch name. It prevents two
// mutating runs of the same patch from interleaving batches; it is not a
// distributed mutex across databases.

use crate::error::{Result, StockrxError};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};

/// Current holder of a patch lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLock {
    pub patch_name: String,
    pub holder: String,
    pub acquired_at: String,
}

/// How a lock was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    Acquired,
    /// The previous holder's lock was older than the stale threshold.
    TookOverStale { previous_holder: String },
}

pub fn current_lock_sync(
    conn: &Connection,
    patch_name: &str,
) -> rusqlite::Result<Option<PatchLock>> {
    conn.query_row(
        "SELECT patch_name, holder, acquired_at FROM patch_locks WHERE patch_name = ?",
        [patch_name],
        |row| {
            Ok(PatchLock {
                patch_name: row.get(0)?,
                holder: row.get(1)?,
                acquired_at: row.get(2)?,
            })
        },
    )
    .optional()
}

fn is_stale(acquired_at: &str, now: DateTime<Utc>, stale_after: Duration) -> bool {
    match DateTime::parse_from_rfc3339(acquired_at) {
        Ok(ts) => now.signed_duration_since(ts.with_timezone(&Utc)) > stale_after,
        // Unreadable timestamps can never be proven fresh
        Err(_) => true,
    }
}

/// Acquire the lock for `patch_name` on behalf of `holder`.
///
/// Fails with `LockHeld` when another holder owns a fresh lock. A stale lock
/// is taken over with a compare-and-swap on (holder, acquired_at) so two
/// processes racing for the same stale lock cannot both win.
pub fn acquire_patch_lock_sync(
    conn: &Connection,
    patch_name: &str,
    holder: &str,
    stale_after: Duration,
) -> Result<LockAcquisition> {
    let now = Utc::now();
    let now_str = now.to_rfc3339();

    let inserted = conn.execute(
        "INSERT INTO patch_locks (patch_name, holder, acquired_at) VALUES (?, ?, ?)
         ON CONFLICT(patch_name) DO NOTHING",
        params![patch_name, holder, now_str],
    )?;
    if inserted == 1 {
        return Ok(LockAcquisition::Acquired);
    }

    let Some(existing) = current_lock_sync(conn, patch_name)? else {
        // Released between our insert and read; retry once
        conn.execute(
            "INSERT INTO patch_locks (patch_name, holder, acquired_at) VALUES (?, ?, ?)",
            params![patch_name, holder, now_str],
        )?;
        return Ok(LockAcquisition::Acquired);
    };

    if !is_stale(&existing.acquired_at, now, stale_after) {
        return Err(StockrxError::LockHeld {
            name: patch_name.to_string(),
            holder: existing.holder,
            acquired_at: existing.acquired_at,
        });
    }

    let swapped = conn.execute(
        "UPDATE patch_locks SET holder = ?, acquired_at = ?
         WHERE patch_name = ? AND holder = ? AND acquired_at = ?",
        params![
            holder,
            now_str,
            patch_name,
            existing.holder,
            existing.acquired_at
        ],
    )?;
    if swapped == 0 {
        return Err(StockrxError::LockHeld {
            name: patch_name.to_string(),
            holder: "another process".to_string(),
            acquired_at: now_str,
        });
    }

    tracing::warn!(
        patch = patch_name,
        previous_holder = %existing.holder,
        acquired_at = %existing.acquired_at,
        "Took over stale patch lock"
    );
    Ok(LockAcquisition::TookOverStale {
        previous_holder: existing.holder,
    })
}

/// Release the lock if `holder` still owns it. Returns whether a row was removed.
pub fn release_patch_lock_sync(
    conn: &Connection,
    patch_name: &str,
    holder: &str,
) -> rusqlite::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM patch_locks WHERE patch_name = ? AND holder = ?",
        params![patch_name, holder],
    )?;
    Ok(removed > 0)
}
