//! Row producers.
//!
//! A [`Node`] yields rows one `next` at a time into variables it was given
//! when the plan was built. Every node embeds a [`NodeBase`] carrying the
//! action lists run per row and the lifecycle state:
//!
//! `Created -> Initialized -> Opened -> Exhausted -> Finished -> Terminated`
//!
//! The source is opened lazily by the first `next`, so initializing a node
//! never touches data. `finish` drops the cursor but keeps bindings, which
//! makes the next `next` start over; `terminate` also drops the bindings.

pub mod file_scan;
pub mod once;
pub mod rowset_scan;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::action::{ActionList, Conditional, Status};
use crate::archive::{ClassId, NodeArchive};
use crate::arena::{ActionId, NodeId, VarId};
use crate::context::ExecutionContext;
use crate::error::{KernelError, Result};
use crate::explain::Explain;
use crate::holder::{DataHolder, acquire};

pub use self::file_scan::FileScan;
pub use self::once::{Empty, Once};
pub use self::rowset_scan::RowSetScan;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NodeState {
    #[default]
    Created,
    /// Bound but not opened.
    Initialized,
    Opened,
    Exhausted,
    Finished,
    Terminated,
}

pub trait Node: Send {
    fn class_id(&self) -> ClassId {
        self.archive().class_id()
    }
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain);
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()>;
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()>;
    /// Advances one row; false once the source is exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext) -> Result<bool>;
    /// Rewinds the source to its beginning.
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()>;
    fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()>;
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;
    fn archive(&self) -> NodeArchive;

    fn start_up(&mut self, ctx: &mut ExecutionContext) -> Result<Status> {
        self.base().start_up(ctx)
    }
    fn do_action(&mut self, ctx: &mut ExecutionContext) -> Result<Status> {
        self.base().do_action(ctx)
    }
    fn undone_action(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base().undone_action(ctx)
    }
    fn state(&self) -> NodeState {
        self.base().state()
    }
}

/// Writes one node's explanation, looked up by id.
pub fn explain_node(ctx: &ExecutionContext, id: NodeId, explain: &mut Explain) {
    let node = match ctx.get_node(id) {
        Ok(Some(node)) => node,
        _ => {
            explain.put(format!("<unknown node#{}>", id.index()));
            return;
        }
    };
    match acquire(&node, "node", id.index()) {
        Ok(node) => node.explain(ctx, explain),
        Err(_) => {
            explain.put(format!("node#{}", id.index()));
        }
    };
}

/// Constructor-time configuration shared by every node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBaseArchive {
    pub start_up: Vec<ActionId>,
    pub actions: Vec<ActionId>,
    pub registered: Vec<ActionId>,
    pub used: Vec<VarId>,
    pub reset_pairs: Vec<(VarId, VarId)>,
}

#[derive(Debug, Default)]
pub struct NodeBase {
    start_up: ActionList,
    actions: ActionList,
    // every action whose per-row state must be undone between rows
    registered: ActionList,
    // set back to null before each row
    used: Vec<DataHolder>,
    // (target, source): target := source before each row
    reset_pairs: Vec<(DataHolder, DataHolder)>,
    // open If/Unless/Goto while the plan is built
    controls: Vec<ActionId>,
    state: NodeState,
}

impl NodeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_archive(archive: &NodeBaseArchive) -> Self {
        Self {
            start_up: ActionList::from_ids(&archive.start_up),
            actions: ActionList::from_ids(&archive.actions),
            registered: ActionList::from_ids(&archive.registered),
            used: archive.used.iter().map(|id| DataHolder::new(*id)).collect(),
            reset_pairs: archive
                .reset_pairs
                .iter()
                .map(|(target, source)| (DataHolder::new(*target), DataHolder::new(*source)))
                .collect(),
            controls: Vec::new(),
            state: NodeState::Created,
        }
    }

    pub fn archive(&self) -> NodeBaseArchive {
        NodeBaseArchive {
            start_up: self.start_up.ids(),
            actions: self.actions.ids(),
            registered: self.registered.ids(),
            used: self.used.iter().map(|h| h.id()).collect(),
            reset_pairs: self.reset_pairs.iter().map(|(t, s)| (t.id(), s.id())).collect(),
        }
    }

    // ------------- building -------------
    pub fn add_start_up(&mut self, id: ActionId) {
        self.start_up.add(id);
    }
    /// Appends to the per-row list and registers the action for undo.
    pub fn add_action(&mut self, id: ActionId) {
        self.actions.add(id);
        self.register_action(id);
    }
    /// Registers an action reached only indirectly (through a combinator or
    /// a branch) so that it is undone between rows.
    pub fn register_action(&mut self, id: ActionId) {
        if !self.registered.contains(id) {
            self.registered.add(id);
        }
    }
    pub fn use_variable(&mut self, id: VarId) {
        self.used.push(DataHolder::new(id));
    }
    pub fn reset_variable(&mut self, target: VarId, source: VarId) {
        self.reset_pairs.push((DataHolder::new(target), DataHolder::new(source)));
    }
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Opens an `If` block; actions added until the matching `push_else` or
    /// `push_end_if` run only when the predicate is True.
    pub fn push_if(&mut self, ctx: &ExecutionContext, predicate: ActionId) -> Result<ActionId> {
        self.push_control(ctx, Conditional::if_(predicate))
    }
    pub fn push_unless(&mut self, ctx: &ExecutionContext, predicate: ActionId) -> Result<ActionId> {
        self.push_control(ctx, Conditional::unless(predicate))
    }
    pub fn push_else(&mut self, ctx: &ExecutionContext) -> Result<()> {
        let open = self.pop_control()?;
        let goto = ctx.register_action(Conditional::goto())?;
        self.add_action(goto);
        let position = self.actions.len();
        with_conditional(ctx, open, |c| c.set_else(position))?;
        self.controls.push(goto);
        Ok(())
    }
    pub fn push_end_if(&mut self, ctx: &ExecutionContext) -> Result<()> {
        let open = self.pop_control()?;
        let position = self.actions.len();
        with_conditional(ctx, open, |c| c.set_end(position))
    }

    fn push_control(&mut self, ctx: &ExecutionContext, control: Conditional) -> Result<ActionId> {
        let id = ctx.register_action(control)?;
        self.add_action(id);
        self.controls.push(id);
        Ok(id)
    }
    fn pop_control(&mut self) -> Result<ActionId> {
        self.controls.pop().ok_or_else(|| KernelError::unexpected("no open branch"))
    }

    // ------------- lifecycle -------------
    pub fn state(&self) -> NodeState {
        self.state
    }
    pub fn set_state(&mut self, state: NodeState) {
        trace!(?state, "node state");
        self.state = state;
    }
    pub fn is_bound(&self) -> bool {
        !matches!(self.state, NodeState::Created | NodeState::Terminated)
    }
    /// Fails unless the node was initialized and not terminated since.
    pub fn check_bound(&self) -> Result<()> {
        if self.is_bound() {
            Ok(())
        } else {
            Err(KernelError::unexpected(format!("node used while {:?}", self.state)))
        }
    }

    pub fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if !self.controls.is_empty() {
            return Err(KernelError::unexpected("branch left open at initialize"));
        }
        self.start_up.initialize(ctx)?;
        self.actions.initialize(ctx)?;
        self.registered.initialize(ctx)?;
        for holder in &mut self.used {
            holder.initialize(ctx)?;
        }
        for (target, source) in &mut self.reset_pairs {
            target.initialize(ctx)?;
            source.initialize(ctx)?;
        }
        if !self.is_bound() {
            self.state = NodeState::Initialized;
        }
        Ok(())
    }

    pub fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        let mut first = self.start_up.terminate(ctx);
        for result in [self.actions.terminate(ctx), self.registered.terminate(ctx)] {
            if first.is_ok() {
                first = result;
            }
        }
        let holders = self.used.iter_mut().chain(
            self.reset_pairs.iter_mut().flat_map(|(target, source)| [target, source]),
        );
        for holder in holders {
            let result = holder.terminate(ctx);
            if first.is_ok() {
                first = result;
            }
        }
        self.state = NodeState::Terminated;
        first
    }

    pub fn start_up(&self, ctx: &mut ExecutionContext) -> Result<Status> {
        self.check_bound()?;
        self.start_up.execute(ctx)
    }
    pub fn do_action(&self, ctx: &mut ExecutionContext) -> Result<Status> {
        self.actions.execute(ctx)
    }

    /// Undoes the registered actions and restores per-row variables.
    pub fn undone_action(&self, ctx: &mut ExecutionContext) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.registered.undone(ctx)?;
        for holder in &self.used {
            holder.set_null()?;
        }
        for (target, source) in &self.reset_pairs {
            target.assign(source.value()?)?;
        }
        Ok(())
    }
    pub fn reset_action(&self, ctx: &mut ExecutionContext) -> Result<()> {
        self.registered.reset(ctx)
    }

    /// Back to the unopened state, ready to iterate from the start.
    pub fn rewind(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.check_bound()?;
        self.reset_action(ctx)?;
        self.state = NodeState::Initialized;
        Ok(())
    }

    pub fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.start_up.finish(ctx)?;
        self.actions.finish(ctx)?;
        self.state = NodeState::Finished;
        Ok(())
    }

    pub fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        explain.push_indent();
        if !self.start_up.is_empty() {
            explain.new_line().put("start up:");
            explain.push_indent();
            self.start_up.explain(ctx, explain);
            explain.pop_indent();
        }
        if !self.actions.is_empty() {
            explain.new_line().put("actions:");
            explain.push_indent();
            self.actions.explain(ctx, explain);
            explain.pop_indent();
        }
        explain.pop_indent();
    }
}

fn with_conditional(ctx: &ExecutionContext, id: ActionId, f: impl FnOnce(&mut Conditional)) -> Result<()> {
    let action = ctx
        .get_action(id)?
        .ok_or(KernelError::Unresolved { kind: "action", id: id.index() })?;
    let mut action = acquire(&action, "action", id.index())?;
    let conditional = action
        .as_conditional()
        .ok_or_else(|| KernelError::unexpected(format!("action #{} is not a branch", id.index())))?;
    f(conditional);
    Ok(())
}
