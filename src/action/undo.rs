//! Undo logging. Both actions touch the transaction's shared log and run
//! under the statement latch.

use tracing::trace;

use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::VarId;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::ArrayHolder;

#[derive(Debug)]
pub struct StoreUndoLog {
    tuple: ArrayHolder,
    state: ActionState,
}

impl StoreUndoLog {
    pub fn new(tuple: VarId) -> Self {
        Self { tuple: ArrayHolder::new(tuple), state: ActionState::default() }
    }
}

impl Action for StoreUndoLog {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("store undo log ");
        self.tuple.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.tuple.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.tuple.terminate(ctx)
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            // read the tuple before taking the latch
            let tuple = self.tuple.values()?;
            trace!(columns = tuple.len(), "undo tuple stored");
            let _latch = ctx.get_latch()?;
            ctx.get_transaction().store_undo_log(tuple)?;
            self.state.done(Status::Success);
        }
        Ok(self.state.status())
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::StoreUndoLog { tuple: self.tuple.id() }
    }
}

#[derive(Debug, Default)]
pub struct PrepareUndoLog {
    state: ActionState,
}

impl PrepareUndoLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Action for PrepareUndoLog {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("prepare undo log");
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            let _latch = ctx.get_latch()?;
            ctx.get_transaction().prepare_undo_log()?;
            self.state.done(Status::Success);
        }
        Ok(self.state.status())
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::PrepareUndoLog
    }
}
