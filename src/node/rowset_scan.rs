use tracing::trace;

use crate::archive::NodeArchive;
use crate::arena::VarId;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::{DataHolder, RowSetHolder};
use crate::node::{Node, NodeBase, NodeBaseArchive, NodeState};
use crate::rowset::RowCursor;
use crate::value::Value;

/// Iterates the row ids of a row-set variable in ascending order, writing
/// each into the output variable. The set is copied when the scan opens, so
/// later changes to the variable do not disturb a running scan.
#[derive(Debug)]
pub struct RowSetScan {
    base: NodeBase,
    rowset: RowSetHolder,
    output: DataHolder,
    cursor: Option<RowCursor>,
}

impl RowSetScan {
    pub fn new(rowset: VarId, output: VarId) -> Self {
        Self::with_base(NodeBase::new(), rowset, output)
    }
    pub fn with_base(base: NodeBase, rowset: VarId, output: VarId) -> Self {
        Self { base, rowset: RowSetHolder::new(rowset), output: DataHolder::new(output), cursor: None }
    }
    pub(crate) fn from_archive(base: &NodeBaseArchive, rowset: VarId, output: VarId) -> Self {
        Self::with_base(NodeBase::from_archive(base), rowset, output)
    }
}

impl Node for RowSetScan {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("rowset scan ");
        self.rowset.explain(explain);
        if explain.is_data() {
            explain.put(" -> ");
            self.output.explain(explain);
        }
        self.base.explain(ctx, explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.rowset.initialize(ctx)?;
        self.output.initialize(ctx)?;
        self.base.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.cursor = None;
        self.rowset.terminate(ctx)?;
        self.output.terminate(ctx)?;
        self.base.terminate(ctx)
    }
    fn next(&mut self, _ctx: &mut ExecutionContext) -> Result<bool> {
        self.base.check_bound()?;
        match self.base.state() {
            NodeState::Exhausted => return Ok(false),
            NodeState::Initialized | NodeState::Finished => {
                let rows = self.rowset.snapshot()?;
                trace!(rows = rows.len(), "rowset scan opened");
                self.cursor = Some(rows.into_iter());
                self.base.set_state(NodeState::Opened);
            }
            _ => {}
        }
        match self.cursor.as_mut().and_then(Iterator::next) {
            Some(row) => {
                self.output.assign(Value::Unsigned(row))?;
                Ok(true)
            }
            None => {
                self.cursor = None;
                self.base.set_state(NodeState::Exhausted);
                Ok(false)
            }
        }
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.cursor = None;
        self.base.rewind(ctx)
    }
    fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.cursor = None;
        self.base.finish(ctx)
    }
    fn base(&self) -> &NodeBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }
    fn archive(&self) -> NodeArchive {
        NodeArchive::RowSetScan {
            base: self.base.archive(),
            rowset: self.rowset.id(),
            output: self.output.id(),
        }
    }
}
