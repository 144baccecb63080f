use crate::archive::NodeArchive;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::node::{Node, NodeBase, NodeBaseArchive, NodeState};

/// Produces exactly one row, with no output of its own. Its action list
/// does the work, as in `INSERT ... VALUES` or a scalar select.
#[derive(Debug, Default)]
pub struct Once {
    base: NodeBase,
}

impl Once {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_base(base: NodeBase) -> Self {
        Self { base }
    }
    pub(crate) fn from_archive(base: &NodeBaseArchive) -> Self {
        Self::with_base(NodeBase::from_archive(base))
    }
}

impl Node for Once {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("once");
        self.base.explain(ctx, explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.terminate(ctx)
    }
    fn next(&mut self, _ctx: &mut ExecutionContext) -> Result<bool> {
        self.base.check_bound()?;
        match self.base.state() {
            NodeState::Initialized | NodeState::Finished => {
                self.base.set_state(NodeState::Opened);
                Ok(true)
            }
            _ => {
                self.base.set_state(NodeState::Exhausted);
                Ok(false)
            }
        }
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.rewind(ctx)
    }
    fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.finish(ctx)
    }
    fn base(&self) -> &NodeBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }
    fn archive(&self) -> NodeArchive {
        NodeArchive::Once { base: self.base.archive() }
    }
}

/// Produces no rows. Start-up actions still run.
#[derive(Debug, Default)]
pub struct Empty {
    base: NodeBase,
}

impl Empty {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_base(base: NodeBase) -> Self {
        Self { base }
    }
    pub(crate) fn from_archive(base: &NodeBaseArchive) -> Self {
        Self::with_base(NodeBase::from_archive(base))
    }
}

impl Node for Empty {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("empty");
        self.base.explain(ctx, explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.terminate(ctx)
    }
    fn next(&mut self, _ctx: &mut ExecutionContext) -> Result<bool> {
        self.base.check_bound()?;
        if self.base.state() != NodeState::Exhausted {
            self.base.set_state(NodeState::Exhausted);
        }
        Ok(false)
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.rewind(ctx)
    }
    fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.finish(ctx)
    }
    fn base(&self) -> &NodeBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }
    fn archive(&self) -> NodeArchive {
        NodeArchive::Empty { base: self.base.archive() }
    }
}
