use tracing::debug;

use crate::archive::NodeArchive;
use crate::arena::{FileId, VarId};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::{ArrayHolder, FileHolder};
use crate::node::{Node, NodeBase, NodeBaseArchive, NodeState};

/// Sequential scan over a file, one tuple per row.
#[derive(Debug)]
pub struct FileScan {
    base: NodeBase,
    file: FileHolder,
    tuple: ArrayHolder,
}

impl FileScan {
    pub fn new(file: FileId, tuple: VarId) -> Self {
        Self::with_base(NodeBase::new(), file, tuple)
    }
    pub fn with_base(base: NodeBase, file: FileId, tuple: VarId) -> Self {
        Self { base, file: FileHolder::new(file), tuple: ArrayHolder::new(tuple) }
    }
    pub(crate) fn from_archive(base: &NodeBaseArchive, file: FileId, tuple: VarId) -> Self {
        Self::with_base(NodeBase::from_archive(base), file, tuple)
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_initialized() {
            let mut file = self.file.lock()?;
            if file.is_opened() {
                file.close()?;
            }
        }
        Ok(())
    }
}

impl Node for FileScan {
    fn explain(&self, ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("file scan ");
        self.file.explain(explain);
        if explain.is_data() {
            explain.put(" -> ");
            self.tuple.explain(explain);
        }
        self.base.explain(ctx, explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.file.initialize(ctx)?;
        self.tuple.initialize(ctx)?;
        self.base.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.close()?;
        self.file.terminate(ctx)?;
        self.tuple.terminate(ctx)?;
        self.base.terminate(ctx)
    }
    fn next(&mut self, _ctx: &mut ExecutionContext) -> Result<bool> {
        self.base.check_bound()?;
        let mut file = self.file.lock()?;
        match self.base.state() {
            NodeState::Exhausted => return Ok(false),
            NodeState::Initialized | NodeState::Finished => {
                if file.is_opened() {
                    file.rewind()?;
                } else {
                    file.open()?;
                }
                debug!(file = self.file.id().index(), "file scan opened");
                self.base.set_state(NodeState::Opened);
            }
            _ => {}
        }
        let mut buffer = Vec::with_capacity(self.tuple.count()?);
        if file.get_data(&mut buffer)? {
            self.tuple.assign(buffer)?;
            Ok(true)
        } else {
            self.base.set_state(NodeState::Exhausted);
            Ok(false)
        }
    }
    fn reset(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.base.rewind(ctx)
    }
    fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.close()?;
        self.base.finish(ctx)
    }
    fn base(&self) -> &NodeBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }
    fn archive(&self) -> NodeArchive {
        NodeArchive::FileScan { base: self.base.archive(), file: self.file.id(), tuple: self.tuple.id() }
    }
}
