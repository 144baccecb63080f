//! Threaded interface for submitting and controlling statements.
//!
//! A thread-per-statement runner: the caller hands over a plan builder, the
//! statement is built and executed on a background thread with its own
//! [`ExecutionContext`], and the caller may cancel it by id while it runs.
//! Cancellation is cooperative; it is observed by `CheckCancel` actions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::arena::NodeId;
use crate::config::ThreadSettings;
use crate::context::{ExecutionContext, Row};
use crate::error::{KernelError, Result};
use crate::executor::Executor;
use crate::transaction::{CancelToken, Database, MemoryTransaction};

/// Opaque statement identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(u64);

/// Builds a plan into a fresh context and names its root.
pub type PlanBuilder = Box<dyn FnOnce(&mut ExecutionContext) -> Result<NodeId> + Send>;

/// Handle to a running or completed statement.
#[derive(Debug)]
pub struct StatementHandle {
    pub id: StatementId,
    cancel: CancelToken,
    started: Instant,
    join: Option<JoinHandle<Result<Vec<Row>>>>,
}

impl StatementHandle {
    /// Requests cancellation. The statement stops at its next cancel check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
    /// Waits for the statement and returns its output rows.
    pub fn join(mut self) -> Result<Vec<Row>> {
        let handle = self.join.take().ok_or_else(|| KernelError::unexpected("statement joined twice"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(KernelError::ThreadPanicked(format!("statement {}", self.id.0))),
        }
    }
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Registry managing statement lifecycles.
pub struct StatementInterface {
    database: Database,
    thread_settings: ThreadSettings,
    next_id: Mutex<u64>,
    active: Arc<Mutex<HashMap<StatementId, CancelToken>>>,
}

impl StatementInterface {
    pub fn new(database: Database, thread_settings: ThreadSettings) -> Self {
        Self { database, thread_settings, next_id: Mutex::new(0), active: Arc::default() }
    }

    fn allocate_id(&self) -> Result<StatementId> {
        let mut next = self.next_id.lock()?;
        *next += 1;
        Ok(StatementId(*next))
    }

    fn context(&self, cancel: CancelToken) -> ExecutionContext {
        ExecutionContext::with_settings(
            Arc::new(MemoryTransaction::with_cancel(cancel)),
            self.database.clone(),
            self.thread_settings.clone(),
        )
    }

    /// Builds and runs a statement on a background thread.
    pub fn start(&self, builder: PlanBuilder) -> Result<StatementHandle> {
        let id = self.allocate_id()?;
        let cancel = CancelToken::new();
        self.active.lock()?.insert(id, cancel.clone());

        let mut ctx = self.context(cancel.clone());
        let active = Arc::clone(&self.active);
        let spawned = std::thread::Builder::new()
            .name(format!("statement-{}", id.0))
            .stack_size(self.thread_settings.stack_size)
            .spawn(move || {
                let result = builder(&mut ctx).and_then(|root| Executor::new(&mut ctx).run(root));
                if let Ok(mut active) = active.lock() {
                    active.remove(&id);
                }
                debug!(statement = id.0, ok = result.is_ok(), "statement thread done");
                result
            });
        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                self.active.lock()?.remove(&id);
                warn!(statement = id.0, error = %e, "statement thread failed to spawn");
                return Err(e.into());
            }
        };
        info!(statement = id.0, "statement submitted");
        Ok(StatementHandle { id, cancel, started: Instant::now(), join: Some(join) })
    }

    /// Builds and runs a statement on the calling thread.
    pub fn run_sync(&self, builder: PlanBuilder) -> Result<Vec<Row>> {
        let mut ctx = self.context(CancelToken::new());
        let root = builder(&mut ctx)?;
        Executor::new(&mut ctx).run(root)
    }

    /// Cancels a running statement by id.
    pub fn cancel(&self, id: StatementId) -> Result<bool> {
        Ok(match self.active.lock()?.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        })
    }

    pub fn active(&self) -> Result<usize> {
        Ok(self.active.lock()?.len())
    }
}
