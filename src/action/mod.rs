//! Per-row instructions.
//!
//! Every node carries an [`ActionList`] that runs once for each row the node
//! produces. Actions report a [`Status`]; anything but `Success` stops the
//! list for the current row. Each action remembers that it already ran for
//! the current row (its done flag), so running a list twice for the same row
//! repeats no side effect. `reset` and `undone` clear that flag between rows.

pub mod assign;
pub mod bitset;
pub mod control;
pub mod file;
pub mod iterate;
pub mod parallel;
pub mod predicate;
pub mod undo;
pub mod unlock;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::archive::{ActionArchive, ClassId};
use crate::arena::ActionId;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::{acquire, ActionHolder};

pub use self::control::Conditional;
pub use self::predicate::Boolean;

/// Outcome of one action for the current row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Go on with the next action.
    #[default]
    Success,
    /// The row fails here; the rest of the list is skipped.
    False,
    /// Drop the row and fetch the next one.
    Continue,
    /// Stop iterating the node altogether.
    Break,
}

/// The done flag and the status it remembers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionState {
    done: bool,
    status: Status,
}

impl ActionState {
    pub fn is_done(&self) -> bool {
        self.done
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn done(&mut self, status: Status) -> Status {
        self.done = true;
        self.status = status;
        status
    }
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Position of the running action inside its list, and where to go next.
#[derive(Debug)]
pub struct ListControl {
    position: usize,
    jump: Option<usize>,
}

impl ListControl {
    fn at(position: usize) -> Self {
        Self { position, jump: None }
    }
    pub fn position(&self) -> usize {
        self.position
    }
    /// Continues the list at `position` instead of the next action.
    /// Positions past the end finish the list.
    pub fn jump_to(&mut self, position: usize) {
        self.jump = Some(position);
    }
    fn next_position(&self) -> usize {
        self.jump.unwrap_or(self.position + 1)
    }
}

pub trait Action: Send {
    fn class_id(&self) -> ClassId {
        self.archive().class_id()
    }
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain);
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()>;
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()>;
    fn execute(&mut self, ctx: &mut ExecutionContext, control: &mut ListControl) -> Result<Status>;
    fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    /// Prepares for the next row.
    fn reset(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        self.state_mut().clear();
        Ok(())
    }
    /// Rolls back whatever the action did for the current row.
    fn undone(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        self.state_mut().clear();
        Ok(())
    }
    fn state(&self) -> &ActionState;
    fn state_mut(&mut self) -> &mut ActionState;
    fn is_done(&self) -> bool {
        self.state().is_done()
    }
    /// The tri-valued result of a predicate, `None` for other actions.
    fn predicate_value(&self) -> Option<Boolean> {
        None
    }
    fn as_conditional(&mut self) -> Option<&mut Conditional> {
        None
    }
    fn archive(&self) -> ActionArchive;
}

/// Writes one action's explanation, looking it up by id so that plans can be
/// explained before they are initialized.
pub fn explain_action(ctx: &ExecutionContext, id: ActionId, explain: &mut Explain) {
    let action = match ctx.get_action(id) {
        Ok(Some(action)) => action,
        _ => {
            explain.put(format!("<unknown action#{}>", id.index()));
            return;
        }
    };
    match acquire(&action, "action", id.index()) {
        Ok(action) => action.explain(ctx, explain),
        Err(_) => {
            explain.put(format!("action#{}", id.index()));
        }
    }
}

// ------------- ActionList -------------
/// Ordered actions of a node. Insertion order is execution order.
#[derive(Debug, Default)]
pub struct ActionList {
    holders: Vec<ActionHolder>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_ids(ids: &[ActionId]) -> Self {
        Self { holders: ids.iter().map(|id| ActionHolder::new(*id)).collect() }
    }
    pub fn add(&mut self, id: ActionId) {
        self.holders.push(ActionHolder::new(id));
    }
    pub fn len(&self) -> usize {
        self.holders.len()
    }
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
    pub fn ids(&self) -> Vec<ActionId> {
        self.holders.iter().map(|h| h.id()).collect()
    }
    pub fn contains(&self, id: ActionId) -> bool {
        self.holders.iter().any(|h| h.id() == id)
    }

    pub fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        for holder in &mut self.holders {
            holder.initialize(ctx)?;
        }
        Ok(())
    }

    /// Releases every action. All are visited; the first failure is reported.
    pub fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        let mut first = Ok(());
        for holder in &mut self.holders {
            if let Err(e) = holder.terminate(ctx) {
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        first
    }

    /// Runs the list for the current row. Every action guards itself with its
    /// done flag, so running a list a second time for the same row only
    /// replays statuses and jumps.
    pub fn execute(&self, ctx: &mut ExecutionContext) -> Result<Status> {
        let mut position = 0;
        while let Some(holder) = self.holders.get(position) {
            let mut control = ListControl::at(position);
            match holder.execute(ctx, &mut control)? {
                Status::Success => position = control.next_position(),
                status => {
                    trace!(action = holder.id().index(), ?status, "action list stopped");
                    return Ok(status);
                }
            }
        }
        Ok(Status::Success)
    }

    // lists are finished and reset even when initialize never completed
    fn resolved(&self) -> impl Iterator<Item = &ActionHolder> {
        self.holders.iter().filter(|h| h.is_initialized())
    }

    pub fn finish(&self, ctx: &mut ExecutionContext) -> Result<()> {
        for holder in self.resolved() {
            holder.lock()?.finish(ctx)?;
        }
        Ok(())
    }
    pub fn reset(&self, ctx: &mut ExecutionContext) -> Result<()> {
        for holder in self.resolved() {
            holder.lock()?.reset(ctx)?;
        }
        Ok(())
    }
    pub fn undone(&self, ctx: &mut ExecutionContext) -> Result<()> {
        for holder in self.resolved() {
            holder.lock()?.undone(ctx)?;
        }
        Ok(())
    }

    pub fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        for holder in &self.holders {
            explain.new_line();
            explain_action(ctx, holder.id(), explain);
        }
    }
}
