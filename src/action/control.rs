//! Flow control inside an action list.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{Action, ActionState, Boolean, ListControl, Status, explain_action};
use crate::archive::ActionArchive;
use crate::arena::ActionId;
use crate::context::ExecutionContext;
use crate::error::{KernelError, Result};
use crate::explain::Explain;
use crate::holder::ActionHolder;

// ------------- CheckCancel -------------
/// Raises `Cancelled` once the transaction asks the statement to stop.
/// Polled on every call, done flag or not.
#[derive(Debug, Default)]
pub struct CheckCancel {
    state: ActionState,
}

impl CheckCancel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Action for CheckCancel {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("check cancel");
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if ctx.get_transaction().is_canceled_statement() {
            debug!("statement cancel observed");
            return Err(KernelError::Cancelled);
        }
        Ok(self.state.done(Status::Success))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::CheckCancel
    }
}

// ------------- Throw -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThrowKind {
    /// A scalar subquery produced more than one row.
    ArbitraryElementNotAllowed,
    Message(String),
}

#[derive(Debug)]
pub struct Throw {
    error: ThrowKind,
    state: ActionState,
}

impl Throw {
    pub fn new(error: ThrowKind) -> Self {
        Self { error, state: ActionState::default() }
    }
}

impl Action for Throw {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        match &self.error {
            ThrowKind::ArbitraryElementNotAllowed => explain.put("throw arbitrary element not allowed"),
            ThrowKind::Message(message) => explain.put(format!("throw '{message}'")),
        };
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        Err(match &self.error {
            ThrowKind::ArbitraryElementNotAllowed => KernelError::ArbitraryElementNotAllowed,
            ThrowKind::Message(message) => KernelError::Thrown(message.clone()),
        })
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Throw { error: self.error.clone() }
    }
}

// ------------- Conditional -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// Falls through when the predicate is True.
    If,
    /// Falls through unless the predicate is True.
    Unless,
    /// Always jumps; closes the then-branch of an `If` with an else part.
    Goto,
}

/// A branch inside an action list. Jump targets are list positions fixed
/// when the plan is built (see [`NodeBase::push_else`](crate::node::NodeBase::push_else)).
#[derive(Debug)]
pub struct Conditional {
    kind: ConditionKind,
    predicate: Option<ActionHolder>,
    else_position: Option<usize>,
    end_position: Option<usize>,
    // whether the last evaluation falls through
    taken: bool,
    state: ActionState,
}

impl Conditional {
    pub fn if_(predicate: ActionId) -> Self {
        Self::new(ConditionKind::If, Some(predicate))
    }
    pub fn unless(predicate: ActionId) -> Self {
        Self::new(ConditionKind::Unless, Some(predicate))
    }
    pub fn goto() -> Self {
        Self::new(ConditionKind::Goto, None)
    }
    pub fn new(kind: ConditionKind, predicate: Option<ActionId>) -> Self {
        Self {
            kind,
            predicate: predicate.map(ActionHolder::new),
            else_position: None,
            end_position: None,
            taken: false,
            state: ActionState::default(),
        }
    }
    pub(crate) fn with_positions(mut self, else_position: Option<usize>, end_position: Option<usize>) -> Self {
        self.else_position = else_position;
        self.end_position = end_position;
        self
    }
    pub fn kind(&self) -> ConditionKind {
        self.kind
    }
    pub fn set_else(&mut self, position: usize) {
        self.else_position = Some(position);
    }
    pub fn set_end(&mut self, position: usize) {
        self.end_position = Some(position);
    }

    fn evaluate(&self, ctx: &mut ExecutionContext, control: &mut ListControl) -> Result<bool> {
        let Some(predicate) = &self.predicate else {
            return Ok(false);
        };
        let mut action = predicate.lock()?;
        let truth = match action.execute(ctx, control)? {
            Status::Success => Boolean::True,
            _ => action.predicate_value().unwrap_or(Boolean::False),
        };
        Ok(match self.kind {
            ConditionKind::If => truth.is_true(),
            ConditionKind::Unless => !truth.is_true(),
            ConditionKind::Goto => false,
        })
    }

    fn target(&self) -> Result<usize> {
        let position = match self.kind {
            ConditionKind::Goto => self.end_position,
            _ => self.else_position.or(self.end_position),
        };
        position.ok_or_else(|| KernelError::unexpected("branch without end position"))
    }
}

impl Action for Conditional {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        match self.kind {
            ConditionKind::If => explain.put("if "),
            ConditionKind::Unless => explain.put("unless "),
            ConditionKind::Goto => explain.put("goto"),
        };
        if let Some(predicate) = &self.predicate {
            explain_action(ctx, predicate.id(), explain);
        }
        if let Some(end) = self.end_position {
            explain.put(format!(" [end {end}]"));
        }
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if let Some(predicate) = &mut self.predicate {
            predicate.initialize(ctx)?;
        }
        Ok(())
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if let Some(predicate) = &mut self.predicate {
            predicate.terminate(ctx)?;
        }
        Ok(())
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            self.taken = self.evaluate(ctx, control)?;
            self.state.done(Status::Success);
        }
        // replayed on every pass so that a re-run list takes the same branch
        if !self.taken {
            control.jump_to(self.target()?);
        }
        Ok(Status::Success)
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.state.clear();
        if let Some(predicate) = self.predicate.as_ref().filter(|p| p.is_initialized()) {
            predicate.lock()?.reset(ctx)?;
        }
        Ok(())
    }
    fn undone(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.state.clear();
        if let Some(predicate) = self.predicate.as_ref().filter(|p| p.is_initialized()) {
            predicate.lock()?.undone(ctx)?;
        }
        Ok(())
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn as_conditional(&mut self) -> Option<&mut Conditional> {
        Some(self)
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Conditional {
            kind: self.kind,
            predicate: self.predicate.as_ref().map(|p| p.id()),
            else_position: self.else_position,
            end_position: self.end_position,
        }
    }
}

// ------------- Signal -------------
/// `Continue` (skip to the next row) or `Break` (stop the node).
#[derive(Debug)]
pub struct Signal {
    status: Status,
    state: ActionState,
}

impl Signal {
    pub fn continue_() -> Self {
        Self::new(Status::Continue)
    }
    pub fn break_() -> Self {
        Self::new(Status::Break)
    }
    pub fn new(status: Status) -> Self {
        Self { status, state: ActionState::default() }
    }
}

impl Action for Signal {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put(match self.status {
            Status::Continue => "continue",
            Status::Break => "break",
            Status::False => "false",
            Status::Success => "nop",
        });
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        Ok(self.state.done(self.status))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::Signal { status: self.status }
    }
}
