//! Per-statement execution state.
//!
//! An [`ExecutionContext`] owns every object a compiled plan refers to. Nodes,
//! actions, threads, lockers and file sources live in typed arenas inside a
//! [`Shared`] block that all threads of the statement see; variables live in a
//! [`DataSpace`] that is private to one thread of execution. A sub-plan thread
//! gets a forked context: same `Shared`, but its own data space whose
//! variables are copied from the parent on first use.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

// cheap hashing for small integer keys
use seahash::SeaHasher;
use tracing::trace;

use crate::action::Action;
use crate::arena::{
    ActionId, ActionKind, Arena, FileId, FileKind, LockerId, LockerKind, NodeId, NodeKind,
    ThreadId, ThreadKind, VarId,
};
use crate::config::ThreadSettings;
use crate::error::{KernelError, Result};
use crate::file::FileAccess;
use crate::locker::Locker;
use crate::node::Node;
use crate::rowset::RowSet;
use crate::thread::Thread;
use crate::transaction::{Database, Transaction};
use crate::value::Value;

pub type DataRef = Arc<Mutex<Value>>;
pub type NodeRef = Arc<Mutex<Box<dyn Node>>>;
pub type ActionRef = Arc<Mutex<Box<dyn Action>>>;
pub type ThreadRef = Arc<Mutex<Thread>>;
pub type LockerRef = Arc<dyn Locker>;
pub type FileRef = Arc<Mutex<Box<dyn FileAccess>>>;

/// One tuple delivered to the output sink.
pub type Row = Vec<Value>;

type SeaMap<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;

// ------------- Data space -------------
#[derive(Clone, Debug)]
pub(crate) enum Slot {
    Scalar(DataRef),
    Array(Vec<VarId>),
}

#[derive(Debug, Default)]
struct Private {
    copies: SeaMap<VarId, DataRef>,
    copied: RowSet,
    returned: RowSet,
}

/// Variables visible to one thread of execution.
#[derive(Debug, Default)]
pub struct DataSpace {
    slots: Vec<Slot>,
    // present in sub-contexts only; `slots` then belongs to the parent
    private: Option<Private>,
}

impl DataSpace {
    fn forked(slots: Vec<Slot>, returned: RowSet) -> Self {
        Self { slots, private: Some(Private { returned, ..Private::default() }) }
    }

    fn add(&mut self, slot: Slot) -> Result<VarId> {
        if self.private.is_some() {
            return Err(KernelError::NotSupported("adding variables to a sub-context"));
        }
        self.slots.push(slot);
        Ok(VarId::new((self.slots.len() - 1) as u32))
    }

    fn slot(&self, id: VarId) -> Option<&Slot> {
        self.slots.get(id.index() as usize)
    }

    fn scalar(&mut self, id: VarId, latch: &Mutex<()>) -> Result<Option<DataRef>> {
        let Some(Slot::Scalar(source)) = self.slots.get(id.index() as usize) else {
            return Ok(None);
        };
        let Some(private) = self.private.as_mut() else {
            return Ok(Some(Arc::clone(source)));
        };
        if let Some(copy) = private.copies.get(&id) {
            return Ok(Some(Arc::clone(copy)));
        }
        let value = {
            let _latch = latch.lock()?;
            source.lock()?.clone()
        };
        let copy = Arc::new(Mutex::new(value));
        private.copies.insert(id, Arc::clone(&copy));
        private.copied.insert(id.index());
        Ok(Some(copy))
    }

    fn array(&mut self, id: VarId, latch: &Mutex<()>) -> Result<Option<Vec<DataRef>>> {
        let Some(Slot::Array(elements)) = self.slot(id) else {
            return Ok(None);
        };
        let elements = elements.clone();
        let mut resolved = Vec::with_capacity(elements.len());
        for element in elements {
            match self.scalar(element, latch)? {
                Some(data) => resolved.push(data),
                None => return Ok(None),
            }
        }
        Ok(Some(resolved))
    }

    /// The slots a child of this space inherits: our own private copies
    /// shadow the parent's variables.
    fn snapshot(&self) -> Vec<Slot> {
        let Some(private) = &self.private else {
            return self.slots.clone();
        };
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match private.copies.get(&VarId::new(i as u32)) {
                Some(copy) => Slot::Scalar(Arc::clone(copy)),
                None => slot.clone(),
            })
            .collect()
    }

    fn parent_of(&self, index: u32) -> Result<&DataRef> {
        match self.slots.get(index as usize) {
            Some(Slot::Scalar(source)) => Ok(source),
            _ => Err(KernelError::unexpected(format!("variable #{index} is not a scalar"))),
        }
    }

    fn reset_data(&self, latch: &Mutex<()>) -> Result<()> {
        let Some(private) = &self.private else {
            return Ok(());
        };
        for index in private.copied.iter() {
            let Some(copy) = private.copies.get(&VarId::new(index)) else { continue };
            let source = self.parent_of(index)?;
            let _latch = latch.lock()?;
            let value = source.lock()?.clone();
            *copy.lock()? = value;
        }
        Ok(())
    }

    fn return_data(&self, latch: &Mutex<()>) -> Result<()> {
        let Some(private) = &self.private else {
            return Ok(());
        };
        for index in private.returned.iter() {
            let Some(copy) = private.copies.get(&VarId::new(index)) else { continue };
            let target = self.parent_of(index)?;
            let _latch = latch.lock()?;
            let value = copy.lock()?.clone();
            *target.lock()? = value;
        }
        Ok(())
    }
}

// ------------- Shared -------------
/// State shared by every thread of one statement.
pub struct Shared {
    nodes: RwLock<Arena<NodeKind, NodeRef>>,
    actions: RwLock<Arena<ActionKind, ActionRef>>,
    threads: RwLock<Arena<ThreadKind, ThreadRef>>,
    lockers: RwLock<Arena<LockerKind, LockerRef>>,
    files: RwLock<Arena<FileKind, FileRef>>,
    transaction: Arc<dyn Transaction>,
    database: Database,
    latch: Mutex<()>,
    output: Mutex<Vec<Row>>,
    thread_settings: ThreadSettings,
}

// ------------- Context -------------
pub struct ExecutionContext {
    shared: Arc<Shared>,
    data: DataSpace,
}

impl ExecutionContext {
    pub fn new(transaction: Arc<dyn Transaction>, database: Database) -> Self {
        Self::with_settings(transaction, database, ThreadSettings::default())
    }

    pub fn with_settings(
        transaction: Arc<dyn Transaction>,
        database: Database,
        thread_settings: ThreadSettings,
    ) -> Self {
        let shared = Shared {
            nodes: RwLock::default(),
            actions: RwLock::default(),
            threads: RwLock::default(),
            lockers: RwLock::default(),
            files: RwLock::default(),
            transaction,
            database,
            latch: Mutex::new(()),
            output: Mutex::default(),
            thread_settings,
        };
        Self { shared: Arc::new(shared), data: DataSpace::default() }
    }

    /// A context for a sub-plan thread. Variables listed in `return_data` are
    /// written back to this context by [`ExecutionContext::return_data`].
    pub fn fork(&self, return_data: &[VarId]) -> Self {
        let returned = return_data.iter().map(|id| id.index()).collect();
        Self {
            shared: Arc::clone(&self.shared),
            data: DataSpace::forked(self.data.snapshot(), returned),
        }
    }

    pub fn is_sub_context(&self) -> bool {
        self.data.private.is_some()
    }

    // ------------- registration -------------
    pub fn register_node(&self, node: impl Node + 'static) -> Result<NodeId> {
        self.register_boxed_node(Box::new(node))
    }
    pub fn register_boxed_node(&self, node: Box<dyn Node>) -> Result<NodeId> {
        Ok(self.shared.nodes.write()?.keep(Arc::new(Mutex::new(node))))
    }
    pub fn register_action(&self, action: impl Action + 'static) -> Result<ActionId> {
        self.register_boxed_action(Box::new(action))
    }
    pub fn register_boxed_action(&self, action: Box<dyn Action>) -> Result<ActionId> {
        Ok(self.shared.actions.write()?.keep(Arc::new(Mutex::new(action))))
    }
    pub fn register_thread(&self, thread: Thread) -> Result<ThreadId> {
        Ok(self.shared.threads.write()?.keep(Arc::new(Mutex::new(thread))))
    }
    pub fn register_locker(&self, locker: LockerRef) -> Result<LockerId> {
        Ok(self.shared.lockers.write()?.keep(locker))
    }
    pub fn register_file(&self, file: impl FileAccess + 'static) -> Result<FileId> {
        let file: Box<dyn FileAccess> = Box::new(file);
        Ok(self.shared.files.write()?.keep(Arc::new(Mutex::new(file))))
    }

    /// Id the next registered action will receive. Lets a plan builder wire
    /// forward references.
    pub fn next_action_id(&self) -> Result<ActionId> {
        Ok(self.shared.actions.read()?.next_id())
    }

    // ------------- lookup -------------
    pub fn get_node(&self, id: NodeId) -> Result<Option<NodeRef>> {
        Ok(self.shared.nodes.read()?.get(id).cloned())
    }
    pub fn get_action(&self, id: ActionId) -> Result<Option<ActionRef>> {
        Ok(self.shared.actions.read()?.get(id).cloned())
    }
    pub fn get_thread(&self, id: ThreadId) -> Result<Option<ThreadRef>> {
        Ok(self.shared.threads.read()?.get(id).cloned())
    }
    pub fn get_locker(&self, id: LockerId) -> Result<Option<LockerRef>> {
        Ok(self.shared.lockers.read()?.get(id).cloned())
    }
    pub fn get_file(&self, id: FileId) -> Result<Option<FileRef>> {
        Ok(self.shared.files.read()?.get(id).cloned())
    }

    pub fn node_ids(&self) -> Result<Vec<NodeId>> {
        Ok(self.shared.nodes.read()?.iter().map(|(id, _)| id).collect())
    }
    pub fn action_ids(&self) -> Result<Vec<ActionId>> {
        Ok(self.shared.actions.read()?.iter().map(|(id, _)| id).collect())
    }
    pub fn thread_ids(&self) -> Result<Vec<ThreadId>> {
        Ok(self.shared.threads.read()?.iter().map(|(id, _)| id).collect())
    }

    // ------------- shared services -------------
    pub fn get_transaction(&self) -> &Arc<dyn Transaction> {
        &self.shared.transaction
    }
    pub fn get_database(&self) -> &Database {
        &self.shared.database
    }
    /// The statement latch. Never acquire it while holding a variable lock.
    pub fn get_latch(&self) -> Result<MutexGuard<'_, ()>> {
        Ok(self.shared.latch.lock()?)
    }
    pub fn thread_settings(&self) -> &ThreadSettings {
        &self.shared.thread_settings
    }
    pub fn put_output(&self, row: Row) -> Result<()> {
        trace!(columns = row.len(), "output row");
        self.shared.output.lock()?.push(row);
        Ok(())
    }
    pub fn take_output(&self) -> Result<Vec<Row>> {
        Ok(std::mem::take(&mut *self.shared.output.lock()?))
    }

    // ------------- data -------------
    pub fn add_variable(&mut self, value: impl Into<Value>) -> Result<VarId> {
        self.data.add(Slot::Scalar(Arc::new(Mutex::new(value.into()))))
    }
    /// An array variable whose elements alias the given scalars.
    pub fn add_array(&mut self, elements: &[VarId]) -> Result<VarId> {
        for element in elements {
            if !matches!(self.data.slot(*element), Some(Slot::Scalar(_))) {
                return Err(KernelError::unexpected(format!(
                    "array element {element} is not a scalar variable"
                )));
            }
        }
        self.data.add(Slot::Array(elements.to_vec()))
    }
    /// Registers a new scalar holding the current value of `id`.
    pub fn copy_variable(&mut self, id: VarId) -> Result<VarId> {
        let value = match self.get_variable(id)? {
            Some(data) => data.lock()?.clone(),
            None => return Err(KernelError::Unresolved { kind: "data", id: id.index() }),
        };
        self.add_variable(value)
    }
    pub fn is_array(&self, id: VarId) -> bool {
        matches!(self.data.slot(id), Some(Slot::Array(_)))
    }
    pub fn variable_count(&self) -> usize {
        self.data.slots.len()
    }
    pub fn get_variable(&mut self, id: VarId) -> Result<Option<DataRef>> {
        self.data.scalar(id, &self.shared.latch)
    }
    pub fn get_array(&mut self, id: VarId) -> Result<Option<Vec<DataRef>>> {
        self.data.array(id, &self.shared.latch)
    }
    /// Current value of a variable, for callers outside the plan.
    pub fn value(&mut self, id: VarId) -> Result<Value> {
        match self.get_variable(id)? {
            Some(data) => Ok(data.lock()?.clone()),
            None => Err(KernelError::Unresolved { kind: "data", id: id.index() }),
        }
    }
    pub fn set_value(&mut self, id: VarId, value: impl Into<Value>) -> Result<()> {
        match self.get_variable(id)? {
            Some(data) => {
                *data.lock()? = value.into();
                Ok(())
            }
            None => Err(KernelError::Unresolved { kind: "data", id: id.index() }),
        }
    }
    pub(crate) fn array_elements(&self, id: VarId) -> Option<Vec<VarId>> {
        match self.data.slot(id) {
            Some(Slot::Array(elements)) => Some(elements.clone()),
            _ => None,
        }
    }

    /// Refreshes every variable this sub-context copied from its parent.
    /// A no-op on a top-level context.
    pub fn reset_data(&mut self) -> Result<()> {
        self.data.reset_data(&self.shared.latch)
    }
    /// Writes the return variables back to the parent context.
    pub fn return_data(&mut self) -> Result<()> {
        self.data.return_data(&self.shared.latch)
    }
}
