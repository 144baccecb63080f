//! Id-based handles onto objects registered in an [`ExecutionContext`].
//!
//! A holder is built from an integer id when the plan is compiled (or restored
//! from an archive). `initialize` resolves the id into a live reference exactly
//! once, `terminate` drops it again. The context always owns the referenced
//! object; a holder only ever caches an `Arc` clone.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::action::{Action, ListControl, Status};
use crate::arena::{ActionKind, FileKind, Id, LockerKind, NodeKind, ThreadKind, Variable};
use crate::context::{ActionRef, DataRef, ExecutionContext, FileRef, LockerRef, NodeRef, ThreadRef};
use crate::error::{KernelError, Result};
use crate::explain::Explain;
use crate::rowset::RowSet;
use crate::value::Value;

/// Locks a registered object without waiting. Objects are only ever driven by
/// one caller at a time, so contention means the plan refers to an object that
/// is already on the call stack.
pub(crate) fn acquire<'a, T: ?Sized>(
    cell: &'a Mutex<T>,
    kind: &'static str,
    id: u32,
) -> Result<MutexGuard<'a, T>> {
    match cell.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(e)) => Err(KernelError::Lock(e.to_string())),
        Err(TryLockError::WouldBlock) => Err(KernelError::unexpected(format!(
            "{kind} #{id} is already executing"
        ))),
    }
}

/// How one holder flavor finds its target.
pub trait Binding {
    type Space;
    type Target: Clone;
    const KIND: &'static str;
    fn lookup(ctx: &mut ExecutionContext, id: Id<Self::Space>) -> Result<Option<Self::Target>>;
    fn on_resolve(_id: u32, _target: &Self::Target, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn on_release(_id: u32, _target: &Self::Target, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
}

pub struct Holder<B: Binding> {
    id: Id<B::Space>,
    target: Option<B::Target>,
}

impl<B: Binding> Holder<B> {
    pub fn new(id: Id<B::Space>) -> Self {
        Self { id, target: None }
    }
    pub fn id(&self) -> Id<B::Space> {
        self.id
    }
    pub fn is_initialized(&self) -> bool {
        self.target.is_some()
    }
    pub fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if self.target.is_some() {
            return Ok(());
        }
        let target = B::lookup(ctx, self.id)?.ok_or(KernelError::Unresolved {
            kind: B::KIND,
            id: self.id.index(),
        })?;
        B::on_resolve(self.id.index(), &target, ctx)?;
        self.target = Some(target);
        Ok(())
    }
    pub fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if let Some(target) = self.target.take() {
            B::on_release(self.id.index(), &target, ctx)?;
        }
        Ok(())
    }
    /// The resolved reference. Using a holder before `initialize` is a plan
    /// construction bug, reported as `Unexpected`.
    pub fn get(&self) -> Result<&B::Target> {
        self.target.as_ref().ok_or_else(|| {
            KernelError::unexpected(format!(
                "{} #{} used before initialize",
                B::KIND,
                self.id.index()
            ))
        })
    }
    pub fn explain(&self, explain: &mut Explain) {
        explain.put(format!("{}#{}", B::KIND, self.id.index()));
    }
}

impl<B: Binding> fmt::Debug for Holder<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", B::KIND, self.id.index())?;
        if self.target.is_some() {
            write!(f, "*")?;
        }
        Ok(())
    }
}

// ------------- Scalar -------------
pub enum Scalar {}
impl Binding for Scalar {
    type Space = Variable;
    type Target = DataRef;
    const KIND: &'static str = "data";
    fn lookup(ctx: &mut ExecutionContext, id: Id<Variable>) -> Result<Option<DataRef>> {
        ctx.get_variable(id)
    }
}
pub type DataHolder = Holder<Scalar>;

impl DataHolder {
    pub fn value(&self) -> Result<Value> {
        Ok(self.get()?.lock()?.clone())
    }
    pub fn assign(&self, value: Value) -> Result<()> {
        *self.get()?.lock()? = value;
        Ok(())
    }
    pub fn set_null(&self) -> Result<()> {
        let mut data = self.get()?.lock()?;
        *data = data.null_like();
        Ok(())
    }
    pub fn is_null(&self) -> Result<bool> {
        Ok(self.get()?.lock()?.is_null())
    }
}

// ------------- Tuple -------------
pub enum Tuple {}
impl Binding for Tuple {
    type Space = Variable;
    type Target = Vec<DataRef>;
    const KIND: &'static str = "array";
    fn lookup(ctx: &mut ExecutionContext, id: Id<Variable>) -> Result<Option<Vec<DataRef>>> {
        ctx.get_array(id)
    }
}
pub type ArrayHolder = Holder<Tuple>;

impl ArrayHolder {
    pub fn count(&self) -> Result<usize> {
        Ok(self.get()?.len())
    }
    pub fn values(&self) -> Result<Vec<Value>> {
        self.get()?
            .iter()
            .map(|element| Ok(element.lock()?.clone()))
            .collect()
    }
    /// Assigns element-wise; a shorter source leaves the remaining elements null.
    pub fn assign(&self, values: Vec<Value>) -> Result<()> {
        let elements = self.get()?;
        let mut values = values.into_iter();
        for element in elements {
            *element.lock()? = values.next().unwrap_or_default();
        }
        Ok(())
    }
}

// ------------- Bits -------------
pub enum Bits {}
impl Binding for Bits {
    type Space = Variable;
    type Target = DataRef;
    const KIND: &'static str = "bitset";
    fn lookup(ctx: &mut ExecutionContext, id: Id<Variable>) -> Result<Option<DataRef>> {
        ctx.get_variable(id)
    }
    fn on_resolve(_id: u32, target: &DataRef, _ctx: &mut ExecutionContext) -> Result<()> {
        let data = target.lock()?;
        match &*data {
            Value::RowSet(_) => Ok(()),
            other => Err(KernelError::unexpected(format!(
                "bitset variable holds {}",
                other.type_name()
            ))),
        }
    }
}
pub type RowSetHolder = Holder<Bits>;

impl RowSetHolder {
    pub fn with<R>(&self, f: impl FnOnce(&RowSet) -> R) -> Result<R> {
        let data = self.get()?.lock()?;
        match &*data {
            Value::RowSet(rows) => Ok(f(rows)),
            other => Err(not_a_rowset(other)),
        }
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut RowSet) -> R) -> Result<R> {
        let mut data = self.get()?.lock()?;
        match &mut *data {
            Value::RowSet(rows) => Ok(f(rows)),
            other => Err(not_a_rowset(other)),
        }
    }
    pub fn snapshot(&self) -> Result<RowSet> {
        self.with(RowSet::clone)
    }
    /// Runs `f` with this set mutable and `other` readable. Both holders may
    /// name the same variable, in which case `other` is a copy.
    pub fn combine_with<R>(
        &self,
        other: &RowSetHolder,
        f: impl FnOnce(&mut RowSet, &RowSet) -> R,
    ) -> Result<R> {
        if Arc::ptr_eq(self.get()?, other.get()?) {
            let copy = other.snapshot()?;
            return self.with_mut(|rows| f(rows, &copy));
        }
        let mine = other.get()?.lock()?;
        let Value::RowSet(operand) = &*mine else {
            return Err(not_a_rowset(&mine));
        };
        self.with_mut(|rows| f(rows, operand))
    }
}

fn not_a_rowset(value: &Value) -> KernelError {
    KernelError::unexpected(format!("bitset variable holds {}", value.type_name()))
}

// ------------- Action -------------
pub enum ActionBinding {}
impl Binding for ActionBinding {
    type Space = ActionKind;
    type Target = ActionRef;
    const KIND: &'static str = "action";
    fn lookup(ctx: &mut ExecutionContext, id: Id<ActionKind>) -> Result<Option<ActionRef>> {
        ctx.get_action(id)
    }
    fn on_resolve(id: u32, target: &ActionRef, ctx: &mut ExecutionContext) -> Result<()> {
        acquire(target, Self::KIND, id)?.initialize(ctx)
    }
    fn on_release(id: u32, target: &ActionRef, ctx: &mut ExecutionContext) -> Result<()> {
        acquire(target, Self::KIND, id)?.terminate(ctx)
    }
}
pub type ActionHolder = Holder<ActionBinding>;

impl ActionHolder {
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Action>>> {
        acquire(self.get()?, ActionBinding::KIND, self.id().index())
    }
    pub fn execute(&self, ctx: &mut ExecutionContext, control: &mut ListControl) -> Result<Status> {
        self.lock()?.execute(ctx, control)
    }
}

// ------------- Node -------------
pub enum NodeBinding {}
impl Binding for NodeBinding {
    type Space = NodeKind;
    type Target = NodeRef;
    const KIND: &'static str = "node";
    fn lookup(ctx: &mut ExecutionContext, id: Id<NodeKind>) -> Result<Option<NodeRef>> {
        ctx.get_node(id)
    }
    fn on_resolve(id: u32, target: &NodeRef, ctx: &mut ExecutionContext) -> Result<()> {
        acquire(target, Self::KIND, id)?.initialize(ctx)
    }
    fn on_release(id: u32, target: &NodeRef, ctx: &mut ExecutionContext) -> Result<()> {
        acquire(target, Self::KIND, id)?.terminate(ctx)
    }
}
pub type NodeHolder = Holder<NodeBinding>;

impl NodeHolder {
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn crate::node::Node>>> {
        acquire(self.get()?, NodeBinding::KIND, self.id().index())
    }
}

// ------------- Thread -------------
pub enum ThreadBinding {}
impl Binding for ThreadBinding {
    type Space = ThreadKind;
    type Target = ThreadRef;
    const KIND: &'static str = "thread";
    fn lookup(ctx: &mut ExecutionContext, id: Id<ThreadKind>) -> Result<Option<ThreadRef>> {
        ctx.get_thread(id)
    }
}
pub type ThreadHolder = Holder<ThreadBinding>;

impl ThreadHolder {
    pub fn lock(&self) -> Result<MutexGuard<'_, crate::thread::Thread>> {
        acquire(self.get()?, ThreadBinding::KIND, self.id().index())
    }
}

// ------------- Locker -------------
pub enum LockerBinding {}
impl Binding for LockerBinding {
    type Space = LockerKind;
    type Target = LockerRef;
    const KIND: &'static str = "locker";
    fn lookup(ctx: &mut ExecutionContext, id: Id<LockerKind>) -> Result<Option<LockerRef>> {
        ctx.get_locker(id)
    }
}
pub type LockerHolder = Holder<LockerBinding>;

// ------------- File -------------
pub enum FileBinding {}
impl Binding for FileBinding {
    type Space = FileKind;
    type Target = FileRef;
    const KIND: &'static str = "file";
    fn lookup(ctx: &mut ExecutionContext, id: Id<FileKind>) -> Result<Option<FileRef>> {
        ctx.get_file(id)
    }
}
pub type FileHolder = Holder<FileBinding>;

impl FileHolder {
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn crate::file::FileAccess>>> {
        acquire(self.get()?, FileBinding::KIND, self.id().index())
    }
}
