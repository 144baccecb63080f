use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::{LockerId, VarId};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::{DataHolder, LockerHolder};

/// Releases the lock on one row id, typically after a filter rejected it.
/// A null row id is ignored.
#[derive(Debug)]
pub struct UnlockRow {
    locker: LockerHolder,
    row: DataHolder,
    state: ActionState,
}

impl UnlockRow {
    pub fn new(locker: LockerId, row: VarId) -> Self {
        Self { locker: LockerHolder::new(locker), row: DataHolder::new(row), state: ActionState::default() }
    }
}

impl Action for UnlockRow {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("unlock ");
        self.row.explain(explain);
        explain.put(" by ");
        self.locker.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.locker.initialize(ctx)?;
        self.row.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.locker.terminate(ctx)?;
        self.row.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            let locker = self.locker.get()?;
            if locker.is_need_lock() {
                if let Some(row) = self.row.value()?.as_row_id() {
                    locker.unlock_row(row)?;
                }
            }
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
        ActionArchive::UnlockRow { locker: self.locker.id(), row: self.row.id() }
    }
}
