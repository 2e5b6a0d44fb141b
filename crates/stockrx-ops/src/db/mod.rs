// crates/stockrx-ops/src/db/mod.rs
// Database layer: pooled rusqlite access, schema, audit log and patch locks

pub mod executions;
pub mod locks;
pub mod migration_helpers;
pub mod pool;
pub mod savepoint;
mod schema;

#[cfg(test)]
pub(crate) mod test_support;

pub use executions::{
    ExecutionRecord, ExecutionSummary, execution_counts_by_status_sync, finish_execution_sync,
    get_execution_sync, recent_executions_sync, start_execution_sync,
};
pub use locks::{
    LockAcquisition, PatchLock, acquire_patch_lock_sync, current_lock_sync,
    release_patch_lock_sync,
};
pub use pool::DatabasePool;
pub use savepoint::with_savepoint;
pub use schema::run_all_migrations;
