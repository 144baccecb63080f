use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::VarId;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::{ArrayHolder, DataHolder};

/// `target := source`. Undoing the row sets the target back to null.
#[derive(Debug)]
pub struct Assign {
    source: DataHolder,
    target: DataHolder,
    state: ActionState,
}

impl Assign {
    pub fn new(source: VarId, target: VarId) -> Self {
        Self {
            source: DataHolder::new(source),
            target: DataHolder::new(target),
            state: ActionState::default(),
        }
    }
}

impl Action for Assign {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("assign ");
        self.target.explain(explain);
        explain.put(" := ");
        self.source.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.source.initialize(ctx)?;
        self.target.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.source.terminate(ctx)?;
        self.target.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            let value = self.source.value()?;
            self.target.assign(value)?;
            self.state.done(Status::Success);
        }
        Ok(self.state.status())
    }
    fn undone(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        if self.state.is_done() && self.target.is_initialized() {
            self.target.set_null()?;
        }
        self.state.clear();
        Ok(())
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Assign { source: self.source.id(), target: self.target.id() }
    }
}

#[derive(Debug)]
pub struct SetNull {
    target: DataHolder,
    state: ActionState,
}

impl SetNull {
    pub fn new(target: VarId) -> Self {
        Self { target: DataHolder::new(target), state: ActionState::default() }
    }
}

impl Action for SetNull {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("set null ");
        self.target.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.target.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.target.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            self.target.set_null()?;
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
        ActionArchive::SetNull { target: self.target.id() }
    }
}

/// Delivers the current values of an array variable to the output sink.
#[derive(Debug)]
pub struct Output {
    tuple: ArrayHolder,
    state: ActionState,
}

impl Output {
    pub fn new(tuple: VarId) -> Self {
        Self { tuple: ArrayHolder::new(tuple), state: ActionState::default() }
    }
}

impl Action for Output {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("output ");
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
            ctx.put_output(self.tuple.values()?)?;
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
        ActionArchive::Output { tuple: self.tuple.id() }
    }
}
