//! Row lock release.
//!
//! Index scans lock every row they report. When set operators discover that a
//! row can no longer reach the final result they hand it back through a
//! [`Locker`]; the lock manager itself lives outside this crate.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Mutex;

use seahash::SeaHasher;
use tracing::trace;

use crate::error::{KernelError, Result};
use crate::rowset::{RowId, RowSet};

pub trait Locker: Send + Sync {
    /// False when the transaction runs without row locks, in which case
    /// callers skip computing unlock sets altogether.
    fn is_need_lock(&self) -> bool;
    fn unlock(&self, rows: &RowSet) -> Result<()>;
    fn unlock_row(&self, row: RowId) -> Result<()> {
        self.unlock(&RowSet::from([row]))
    }
}

/// A counting in-memory lock table. A row locked twice must be unlocked
/// twice; unlocking a row that holds no lock is an error.
#[derive(Debug, Default)]
pub struct LockTable {
    no_lock: bool,
    counts: Mutex<HashMap<RowId, u32, BuildHasherDefault<SeaHasher>>>,
    released: Mutex<Vec<RowSet>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }
    /// A table whose transaction does not need locking.
    pub fn without_locking() -> Self {
        Self { no_lock: true, ..Self::default() }
    }
    pub fn lock(&self, row: RowId) -> Result<()> {
        *self.counts.lock()?.entry(row).or_default() += 1;
        Ok(())
    }
    pub fn lock_all(&self, rows: &RowSet) -> Result<()> {
        let mut counts = self.counts.lock()?;
        for row in rows.iter() {
            *counts.entry(row).or_default() += 1;
        }
        Ok(())
    }
    pub fn count(&self, row: RowId) -> Result<u32> {
        Ok(self.counts.lock()?.get(&row).copied().unwrap_or(0))
    }
    /// Rows holding at least one lock.
    pub fn locked_rows(&self) -> Result<RowSet> {
        Ok(self.counts.lock()?.keys().copied().collect())
    }
    /// Every unlock call in order, for inspection.
    pub fn released(&self) -> Result<Vec<RowSet>> {
        Ok(self.released.lock()?.clone())
    }
}

impl Locker for LockTable {
    fn is_need_lock(&self) -> bool {
        !self.no_lock
    }
    fn unlock(&self, rows: &RowSet) -> Result<()> {
        let mut counts = self.counts.lock()?;
        // check first so a failing call leaves the table untouched
        if let Some(row) = rows.iter().find(|row| !counts.contains_key(row)) {
            return Err(KernelError::Lock(format!("row {row} is not locked")));
        }
        for row in rows.iter() {
            if let Some(count) = counts.get_mut(&row) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(&row);
                }
            }
        }
        trace!(rows = rows.len(), "rows unlocked");
        self.released.lock()?.push(rows.clone());
        Ok(())
    }
}
