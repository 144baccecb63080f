//! The transaction services a running statement may call.
//!
//! The kernel never owns a transaction. It borrows one through the
//! [`Transaction`] trait for cancellation polling and undo logging, plus a
//! [`Database`] descriptor naming where the statement runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;
use crate::value::Value;

/// Cancellation flag shared between a running statement and whoever may
/// want to stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Services the hosting transaction provides. Implementations are shared by
/// every thread of a statement.
pub trait Transaction: Send + Sync {
    /// Polled by `CheckCancel` actions.
    fn is_canceled_statement(&self) -> bool;
    /// Records one undo tuple. Callers hold the statement latch.
    fn store_undo_log(&self, tuple: Vec<Value>) -> Result<()>;
    /// Called once before a batch of undo tuples.
    fn prepare_undo_log(&self) -> Result<()>;
    /// Drops undo tuples recorded so far by this statement.
    fn clear_undo_log(&self) -> Result<()>;
    /// Announces bulk insertion into `table`.
    fn start_batch_insert(&self, table: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    pub id: u32,
    pub name: String,
}

impl Database {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(0, "main")
    }
}

/// A transaction keeping its undo log in memory.
#[derive(Debug, Default)]
pub struct MemoryTransaction {
    cancel: CancelToken,
    undo_log: Mutex<Vec<Vec<Value>>>,
    prepared: Mutex<usize>,
    batch_tables: Mutex<Vec<String>>,
}

impl MemoryTransaction {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self { cancel, ..Self::default() }
    }
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
    pub fn undo_log(&self) -> Result<Vec<Vec<Value>>> {
        Ok(self.undo_log.lock()?.clone())
    }
    /// How many times `prepare_undo_log` was called.
    pub fn prepared(&self) -> Result<usize> {
        Ok(*self.prepared.lock()?)
    }
    pub fn batch_tables(&self) -> Result<Vec<String>> {
        Ok(self.batch_tables.lock()?.clone())
    }
}

impl Transaction for MemoryTransaction {
    fn is_canceled_statement(&self) -> bool {
        self.cancel.is_cancelled()
    }
    fn store_undo_log(&self, tuple: Vec<Value>) -> Result<()> {
        self.undo_log.lock()?.push(tuple);
        Ok(())
    }
    fn prepare_undo_log(&self) -> Result<()> {
        *self.prepared.lock()? += 1;
        Ok(())
    }
    fn clear_undo_log(&self) -> Result<()> {
        self.undo_log.lock()?.clear();
        Ok(())
    }
    fn start_batch_insert(&self, table: &str) -> Result<()> {
        debug!(table, "batch insert started");
        self.batch_tables.lock()?.push(table.to_owned());
        Ok(())
    }
}
