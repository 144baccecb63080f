use tracing::debug;

use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::{FileId, VarId};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::{ArrayHolder, DataHolder, FileHolder};

/// Keyed lookup. `False` when no tuple matches the key.
#[derive(Debug)]
pub struct FileFetch {
    file: FileHolder,
    key: DataHolder,
    tuple: ArrayHolder,
    state: ActionState,
}

impl FileFetch {
    pub fn new(file: FileId, key: VarId, tuple: VarId) -> Self {
        Self {
            file: FileHolder::new(file),
            key: DataHolder::new(key),
            tuple: ArrayHolder::new(tuple),
            state: ActionState::default(),
        }
    }
}

impl Action for FileFetch {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("fetch ");
        self.file.explain(explain);
        explain.put(" by ");
        self.key.explain(explain);
        explain.put(" into ");
        self.tuple.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.file.initialize(ctx)?;
        self.key.initialize(ctx)?;
        self.tuple.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if self.file.is_initialized() {
            let mut file = self.file.lock()?;
            if file.is_opened() {
                file.close()?;
            }
        }
        self.file.terminate(ctx)?;
        self.key.terminate(ctx)?;
        self.tuple.terminate(ctx)
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            let key = self.key.value()?;
            let mut buffer = Vec::new();
            let found = {
                let mut file = self.file.lock()?;
                if !file.is_opened() {
                    file.open()?;
                }
                file.get(&key, &mut buffer)?
            };
            if found {
                self.tuple.assign(buffer)?;
            }
            self.state.done(if found { Status::Success } else { Status::False });
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
        ActionArchive::FileFetch { file: self.file.id(), key: self.key.id(), tuple: self.tuple.id() }
    }
}

/// Appends the tuple to a file. With a batch table set, the transaction is
/// told about the bulk insert before the first tuple.
#[derive(Debug)]
pub struct FilePut {
    file: FileHolder,
    tuple: ArrayHolder,
    batch_table: Option<String>,
    batch_started: bool,
    state: ActionState,
}

impl FilePut {
    pub fn new(file: FileId, tuple: VarId) -> Self {
        Self {
            file: FileHolder::new(file),
            tuple: ArrayHolder::new(tuple),
            batch_table: None,
            batch_started: false,
            state: ActionState::default(),
        }
    }
    pub fn batch(mut self, table: impl Into<String>) -> Self {
        self.batch_table = Some(table.into());
        self
    }
}

impl Action for FilePut {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("put ");
        self.tuple.explain(explain);
        explain.put(" into ");
        self.file.explain(explain);
        if let Some(table) = &self.batch_table {
            explain.put(format!(" batch {table}"));
        }
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.file.initialize(ctx)?;
        self.tuple.initialize(ctx)
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.batch_started = false;
        self.file.terminate(ctx)?;
        self.tuple.terminate(ctx)
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if !self.state.is_done() {
            if let Some(table) = self.batch_table.as_deref().filter(|_| !self.batch_started) {
                let _latch = ctx.get_latch()?;
                ctx.get_transaction().start_batch_insert(table)?;
                self.batch_started = true;
            }
            let tuple = self.tuple.values()?;
            let mut file = self.file.lock()?;
            if !file.is_opened() {
                file.open()?;
            }
            file.put(&tuple)?;
            self.state.done(Status::Success);
        }
        Ok(self.state.status())
    }
    fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        if self.file.is_initialized() {
            let mut file = self.file.lock()?;
            if file.is_opened() {
                debug!(file = self.file.id().index(), "closing file after put");
                file.close()?;
            }
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
        ActionArchive::FilePut {
            file: self.file.id(),
            tuple: self.tuple.id(),
            batch_table: self.batch_table.clone(),
        }
    }
}
