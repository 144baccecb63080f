//! Driving a plan.
//!
//! [`ExecutionContext::next`] and [`ExecutionContext::execute`] pull rows
//! through one node and its action list; [`Executor`] runs a whole statement
//! from its root node and collects the output.

use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::action::Status;
use crate::arena::NodeId;
use crate::context::{ExecutionContext, Row};
use crate::error::{KernelError, Result};
use crate::explain::Explain;
use crate::holder::acquire;
use crate::node::{Node, explain_node};

impl ExecutionContext {
    /// Produces the next row of `node` and runs its action list on it.
    /// Rows the list rejects with `False` still count as a step; `Continue`
    /// discards the row and pulls another; `Break` ends the iteration.
    pub fn next(&mut self, node: &mut dyn Node) -> Result<bool> {
        node.undone_action(self)?;
        while node.next(self)? {
            match node.do_action(self)? {
                Status::Success => return Ok(true),
                Status::False => {
                    trace!("row rejected");
                    return Ok(true);
                }
                Status::Continue => node.undone_action(self)?,
                Status::Break => {
                    trace!("iteration broken");
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }

    /// Start-up list, every row, then `finish`. On failure the node is
    /// terminated before the error is returned.
    pub fn execute(&mut self, node: &mut dyn Node) -> Result<()> {
        if let Err(e) = self.run_to_end(node) {
            if let Err(secondary) = node.terminate(self) {
                debug!(error = %secondary, "terminate after failure failed");
            }
            return Err(e);
        }
        Ok(())
    }

    fn run_to_end(&mut self, node: &mut dyn Node) -> Result<()> {
        if node.start_up(self)? != Status::Break {
            while self.next(node)? {}
        }
        node.finish(self)
    }
}

/// Runs statements against one context.
pub struct Executor<'a> {
    ctx: &'a mut ExecutionContext,
    explain_data: bool,
}

impl<'a> Executor<'a> {
    pub fn new(ctx: &'a mut ExecutionContext) -> Self {
        Self { ctx, explain_data: false }
    }
    pub fn explain_data(mut self, yes: bool) -> Self {
        self.explain_data = yes;
        self
    }

    pub fn explain(&self, root: NodeId) -> String {
        let mut explain = Explain::new(self.explain_data);
        explain_node(&*self.ctx, root, &mut explain);
        explain.into_string()
    }

    /// Initializes, executes and terminates the plan under `root` and
    /// returns the rows sent to the output sink.
    pub fn run(&mut self, root: NodeId) -> Result<Vec<Row>> {
        let node = self
            .ctx
            .get_node(root)?
            .ok_or(KernelError::Unresolved { kind: "node", id: root.index() })?;
        let mut node = acquire(&node, "node", root.index())?;
        let started = Instant::now();
        info!(root = root.index(), database = %self.ctx.get_database().name, "statement started");

        if let Err(e) = node.initialize(self.ctx) {
            if let Err(secondary) = node.terminate(self.ctx) {
                debug!(error = %secondary, "terminate after failed initialize failed");
            }
            warn!(error = %e, "statement failed to initialize");
            return Err(e);
        }
        if let Err(e) = self.ctx.execute(&mut **node) {
            if e.is_cancel() {
                info!("statement cancelled");
            } else {
                warn!(error = %e, "statement failed");
            }
            // rows of a failed statement, including those of threads joined
            // while it was torn down, are dropped
            let discarded = self.ctx.take_output().map(|rows| rows.len()).unwrap_or_default();
            debug!(rows = discarded, "output discarded");
            return Err(e);
        }
        node.terminate(self.ctx)?;

        let rows = self.ctx.take_output()?;
        info!(ms = started.elapsed().as_millis() as u64, rows = rows.len(), "statement complete");
        Ok(rows)
    }
}
