use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::NodeId;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::NodeHolder;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterateMode {
    /// Pull a single row from the child.
    Once,
    /// Run the child to exhaustion.
    All,
    /// Like `All`, then rewind the child for the next outer row.
    NestedAll,
}

/// Runs a child node as a sub-plan from inside an action list.
#[derive(Debug)]
pub struct Iterate {
    mode: IterateMode,
    node: NodeHolder,
    no_undone: bool,
    state: ActionState,
}

impl Iterate {
    pub fn new(mode: IterateMode, node: NodeId) -> Self {
        Self { mode, node: NodeHolder::new(node), no_undone: false, state: ActionState::default() }
    }
    pub fn once(node: NodeId) -> Self {
        Self::new(IterateMode::Once, node)
    }
    pub fn all(node: NodeId) -> Self {
        Self::new(IterateMode::All, node)
    }
    pub fn nested_all(node: NodeId) -> Self {
        Self::new(IterateMode::NestedAll, node)
    }
    /// Keeps the child's position when the outer row is undone.
    pub fn no_undone(mut self, yes: bool) -> Self {
        self.no_undone = yes;
        self
    }
}

impl Action for Iterate {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put(match self.mode {
            IterateMode::Once => "iterate once",
            IterateMode::All => "iterate all",
            IterateMode::NestedAll => "iterate nested all",
        });
        explain.push_indent();
        explain.new_line();
        crate::node::explain_node(ctx, self.node.id(), explain);
        explain.pop_indent();
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.node.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.node.terminate(ctx)
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if self.state.is_done() {
            return Ok(self.state.status());
        }
        let mut node = self.node.lock()?;
        match self.mode {
            IterateMode::Once => {
                if node.start_up(ctx)? != Status::Break {
                    let found = ctx.next(&mut **node)?;
                    trace!(node = self.node.id().index(), found, "iterate once");
                }
            }
            IterateMode::All => ctx.execute(&mut **node)?,
            IterateMode::NestedAll => {
                ctx.execute(&mut **node)?;
                node.reset(ctx)?;
                node.undone_action(ctx)?;
            }
        }
        Ok(self.state.done(Status::Success))
    }
    fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if self.mode == IterateMode::Once && self.node.is_initialized() {
            self.node.lock()?.finish(ctx)?;
        }
        Ok(())
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.state.clear();
        if self.node.is_initialized() {
            self.node.lock()?.reset(ctx)?;
        }
        Ok(())
    }
    fn undone(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.state.clear();
        if !self.no_undone && self.node.is_initialized() {
            let mut node = self.node.lock()?;
            node.reset(ctx)?;
            node.undone_action(ctx)?;
        }
        Ok(())
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Iterate { mode: self.mode, node: self.node.id(), no_undone: self.no_undone }
    }
}
