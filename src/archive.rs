//! Frozen plans.
//!
//! Every node and action can describe its constructor-time configuration as
//! an archive record: the ids it refers to plus literal parameters, never
//! runtime state. A [`PlanArchive`] collects the records of a whole context
//! and restores them into a fresh one with every id unchanged. Lockers and
//! file sources are runtime capabilities; they are not archived and must be
//! registered again, in the same order, before the restored plan runs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::assign::{Assign, Output, SetNull};
use crate::action::bitset::{BitSet, SetOp};
use crate::action::control::{CheckCancel, ConditionKind, Conditional, Signal, Throw, ThrowKind};
use crate::action::file::{FileFetch, FilePut};
use crate::action::iterate::{Iterate, IterateMode};
use crate::action::parallel::{ThreadCommand, ThreadControl};
use crate::action::predicate::{CombinatorKind, Combinator, CompareOp, Comparison, Like, NullCheck};
use crate::action::undo::{PrepareUndoLog, StoreUndoLog};
use crate::action::unlock::UnlockRow;
use crate::action::{Action, Status};
use crate::arena::{ActionId, FileId, LockerId, NodeId, ThreadId, VarId};
use crate::context::ExecutionContext;
use crate::error::{KernelError, Result};
use crate::holder::acquire;
use crate::node::{Empty, FileScan, Node, NodeBaseArchive, Once, RowSetScan};
use crate::thread::{Thread, ThreadArchive};
use crate::value::Value;

// ------------- ClassId -------------
/// Stable class number of every concrete node and action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ClassId {
    RowSetScan = 1,
    FileScan = 2,
    Once = 3,
    Empty = 4,

    Assign = 100,
    SetNull = 101,
    Output = 102,

    Equals = 110,
    LessThanEquals = 111,
    GreaterThanEquals = 112,
    LessThan = 113,
    GreaterThan = 114,
    NotEquals = 115,
    IsNull = 116,
    IsNotNull = 117,
    Like = 118,
    And = 119,
    Or = 120,
    Not = 121,

    Intersect = 130,
    Union = 131,
    Difference = 132,
    Collection = 133,
    IntersectUnlock = 134,
    UnionUnlock = 135,
    DifferenceUnlock = 136,

    CheckCancel = 140,
    Throw = 141,
    If = 142,
    Unless = 143,
    Goto = 144,
    Continue = 145,
    Break = 146,

    IterateOnce = 150,
    IterateAll = 151,
    IterateNestedAll = 152,

    UnlockRow = 160,
    StoreUndoLog = 161,
    PrepareUndoLog = 162,
    FileFetch = 163,
    FilePut = 164,

    StartThread = 170,
    Join = 171,
    CheckExitStatus = 172,
}

impl ClassId {
    const ALL: [ClassId; 44] = [
        ClassId::RowSetScan,
        ClassId::FileScan,
        ClassId::Once,
        ClassId::Empty,
        ClassId::Assign,
        ClassId::SetNull,
        ClassId::Output,
        ClassId::Equals,
        ClassId::LessThanEquals,
        ClassId::GreaterThanEquals,
        ClassId::LessThan,
        ClassId::GreaterThan,
        ClassId::NotEquals,
        ClassId::IsNull,
        ClassId::IsNotNull,
        ClassId::Like,
        ClassId::And,
        ClassId::Or,
        ClassId::Not,
        ClassId::Intersect,
        ClassId::Union,
        ClassId::Difference,
        ClassId::Collection,
        ClassId::IntersectUnlock,
        ClassId::UnionUnlock,
        ClassId::DifferenceUnlock,
        ClassId::CheckCancel,
        ClassId::Throw,
        ClassId::If,
        ClassId::Unless,
        ClassId::Goto,
        ClassId::Continue,
        ClassId::Break,
        ClassId::IterateOnce,
        ClassId::IterateAll,
        ClassId::IterateNestedAll,
        ClassId::UnlockRow,
        ClassId::StoreUndoLog,
        ClassId::PrepareUndoLog,
        ClassId::FileFetch,
        ClassId::FilePut,
        ClassId::StartThread,
        ClassId::Join,
        ClassId::CheckExitStatus,
    ];
}

impl From<ClassId> for u16 {
    fn from(class: ClassId) -> u16 {
        class as u16
    }
}

impl TryFrom<u16> for ClassId {
    type Error = String;
    fn try_from(value: u16) -> std::result::Result<Self, String> {
        ClassId::ALL
            .into_iter()
            .find(|class| *class as u16 == value)
            .ok_or_else(|| format!("unknown class id {value}"))
    }
}

// ------------- records -------------
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeArchive {
    RowSetScan { base: NodeBaseArchive, rowset: VarId, output: VarId },
    FileScan { base: NodeBaseArchive, file: FileId, tuple: VarId },
    Once { base: NodeBaseArchive },
    Empty { base: NodeBaseArchive },
}

impl NodeArchive {
    pub fn class_id(&self) -> ClassId {
        match self {
            NodeArchive::RowSetScan { .. } => ClassId::RowSetScan,
            NodeArchive::FileScan { .. } => ClassId::FileScan,
            NodeArchive::Once { .. } => ClassId::Once,
            NodeArchive::Empty { .. } => ClassId::Empty,
        }
    }
    pub fn instantiate(&self) -> Box<dyn Node> {
        match self {
            NodeArchive::RowSetScan { base, rowset, output } => {
                Box::new(RowSetScan::from_archive(base, *rowset, *output))
            }
            NodeArchive::FileScan { base, file, tuple } => {
                Box::new(FileScan::from_archive(base, *file, *tuple))
            }
            NodeArchive::Once { base } => Box::new(Once::from_archive(base)),
            NodeArchive::Empty { base } => Box::new(Empty::from_archive(base)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionArchive {
    Assign { source: VarId, target: VarId },
    SetNull { target: VarId },
    Output { tuple: VarId },
    Comparison { op: CompareOp, left: VarId, right: VarId },
    NullCheck { negated: bool, operand: VarId },
    Like { operand: VarId, pattern: String, escape: Option<char>, case_insensitive: bool },
    Combinator { kind: CombinatorKind, operands: Vec<ActionId> },
    BitSet { op: SetOp, result: VarId, operand: VarId, locker: Option<LockerId> },
    Collect { result: VarId, row: VarId },
    CheckCancel,
    Throw { error: ThrowKind },
    Conditional {
        kind: ConditionKind,
        predicate: Option<ActionId>,
        else_position: Option<usize>,
        end_position: Option<usize>,
    },
    Signal { status: Status },
    Iterate { mode: IterateMode, node: NodeId, no_undone: bool },
    UnlockRow { locker: LockerId, row: VarId },
    StoreUndoLog { tuple: VarId },
    PrepareUndoLog,
    FileFetch { file: FileId, key: VarId, tuple: VarId },
    FilePut { file: FileId, tuple: VarId, batch_table: Option<String> },
    ThreadControl { command: ThreadCommand, thread: ThreadId },
}

impl ActionArchive {
    pub fn class_id(&self) -> ClassId {
        match self {
            ActionArchive::Assign { .. } => ClassId::Assign,
            ActionArchive::SetNull { .. } => ClassId::SetNull,
            ActionArchive::Output { .. } => ClassId::Output,
            ActionArchive::Comparison { op, .. } => match op {
                CompareOp::Equals => ClassId::Equals,
                CompareOp::LessThanEquals => ClassId::LessThanEquals,
                CompareOp::GreaterThanEquals => ClassId::GreaterThanEquals,
                CompareOp::LessThan => ClassId::LessThan,
                CompareOp::GreaterThan => ClassId::GreaterThan,
                CompareOp::NotEquals => ClassId::NotEquals,
            },
            ActionArchive::NullCheck { negated: false, .. } => ClassId::IsNull,
            ActionArchive::NullCheck { negated: true, .. } => ClassId::IsNotNull,
            ActionArchive::Like { .. } => ClassId::Like,
            ActionArchive::Combinator { kind, .. } => match kind {
                CombinatorKind::And => ClassId::And,
                CombinatorKind::Or => ClassId::Or,
                CombinatorKind::Not => ClassId::Not,
            },
            ActionArchive::BitSet { op, locker, .. } => match (op, locker.is_some()) {
                (SetOp::Intersect, false) => ClassId::Intersect,
                (SetOp::Union, false) => ClassId::Union,
                (SetOp::Difference, false) => ClassId::Difference,
                (SetOp::Intersect, true) => ClassId::IntersectUnlock,
                (SetOp::Union, true) => ClassId::UnionUnlock,
                (SetOp::Difference, true) => ClassId::DifferenceUnlock,
            },
            ActionArchive::Collect { .. } => ClassId::Collection,
            ActionArchive::CheckCancel => ClassId::CheckCancel,
            ActionArchive::Throw { .. } => ClassId::Throw,
            ActionArchive::Conditional { kind, .. } => match kind {
                ConditionKind::If => ClassId::If,
                ConditionKind::Unless => ClassId::Unless,
                ConditionKind::Goto => ClassId::Goto,
            },
            ActionArchive::Signal { status: Status::Break } => ClassId::Break,
            ActionArchive::Signal { .. } => ClassId::Continue,
            ActionArchive::Iterate { mode, .. } => match mode {
                IterateMode::Once => ClassId::IterateOnce,
                IterateMode::All => ClassId::IterateAll,
                IterateMode::NestedAll => ClassId::IterateNestedAll,
            },
            ActionArchive::UnlockRow { .. } => ClassId::UnlockRow,
            ActionArchive::StoreUndoLog { .. } => ClassId::StoreUndoLog,
            ActionArchive::PrepareUndoLog => ClassId::PrepareUndoLog,
            ActionArchive::FileFetch { .. } => ClassId::FileFetch,
            ActionArchive::FilePut { .. } => ClassId::FilePut,
            ActionArchive::ThreadControl { command, .. } => match command {
                ThreadCommand::Start => ClassId::StartThread,
                ThreadCommand::Join => ClassId::Join,
                ThreadCommand::CheckExitStatus => ClassId::CheckExitStatus,
            },
        }
    }

    pub fn instantiate(&self) -> Box<dyn Action> {
        match self.clone() {
            ActionArchive::Assign { source, target } => Box::new(Assign::new(source, target)),
            ActionArchive::SetNull { target } => Box::new(SetNull::new(target)),
            ActionArchive::Output { tuple } => Box::new(Output::new(tuple)),
            ActionArchive::Comparison { op, left, right } => Box::new(Comparison::new(op, left, right)),
            ActionArchive::NullCheck { negated, operand } => Box::new(NullCheck::new(negated, operand)),
            ActionArchive::Like { operand, pattern, escape, case_insensitive } => {
                let like = Like::new(operand, pattern).case_insensitive(case_insensitive);
                Box::new(match escape {
                    Some(escape) => like.escape(escape),
                    None => like,
                })
            }
            ActionArchive::Combinator { kind, operands } => Box::new(Combinator::new(kind, &operands)),
            ActionArchive::BitSet { op, result, operand, locker } => {
                Box::new(BitSet::with_locker(op, result, operand, locker))
            }
            ActionArchive::Collect { result, row } => Box::new(BitSet::collect(result, row)),
            ActionArchive::CheckCancel => Box::new(CheckCancel::new()),
            ActionArchive::Throw { error } => Box::new(Throw::new(error)),
            ActionArchive::Conditional { kind, predicate, else_position, end_position } => {
                Box::new(Conditional::new(kind, predicate).with_positions(else_position, end_position))
            }
            ActionArchive::Signal { status } => Box::new(Signal::new(status)),
            ActionArchive::Iterate { mode, node, no_undone } => {
                Box::new(Iterate::new(mode, node).no_undone(no_undone))
            }
            ActionArchive::UnlockRow { locker, row } => Box::new(UnlockRow::new(locker, row)),
            ActionArchive::StoreUndoLog { tuple } => Box::new(StoreUndoLog::new(tuple)),
            ActionArchive::PrepareUndoLog => Box::new(PrepareUndoLog::new()),
            ActionArchive::FileFetch { file, key, tuple } => Box::new(FileFetch::new(file, key, tuple)),
            ActionArchive::FilePut { file, tuple, batch_table } => {
                let put = FilePut::new(file, tuple);
                Box::new(match batch_table {
                    Some(table) => put.batch(table),
                    None => put,
                })
            }
            ActionArchive::ThreadControl { command, thread } => {
                Box::new(ThreadControl::new(command, thread))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VariableArchive {
    Scalar(Value),
    Array(Vec<VarId>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: NodeId,
    pub class: ClassId,
    pub record: NodeArchive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub id: ActionId,
    pub class: ClassId,
    pub record: ActionArchive,
}

// ------------- PlanArchive -------------
/// All variables, nodes, actions and threads of one context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanArchive {
    pub variables: Vec<VariableArchive>,
    pub nodes: Vec<NodeEntry>,
    pub actions: Vec<ActionEntry>,
    pub threads: Vec<ThreadArchive>,
}

impl PlanArchive {
    pub fn capture(ctx: &mut ExecutionContext) -> Result<Self> {
        let mut archive = PlanArchive::default();
        for index in 0..ctx.variable_count() {
            let id = VarId::new(index as u32);
            archive.variables.push(match ctx.array_elements(id) {
                Some(elements) => VariableArchive::Array(elements),
                None => VariableArchive::Scalar(ctx.value(id)?),
            });
        }
        for id in ctx.node_ids()? {
            if let Some(node) = ctx.get_node(id)? {
                let record = acquire(&node, "node", id.index())?.archive();
                archive.nodes.push(NodeEntry { id, class: record.class_id(), record });
            }
        }
        for id in ctx.action_ids()? {
            if let Some(action) = ctx.get_action(id)? {
                let record = acquire(&action, "action", id.index())?.archive();
                archive.actions.push(ActionEntry { id, class: record.class_id(), record });
            }
        }
        for id in ctx.thread_ids()? {
            if let Some(thread) = ctx.get_thread(id)? {
                archive.threads.push(acquire(&thread, "thread", id.index())?.archive());
            }
        }
        debug!(
            variables = archive.variables.len(),
            nodes = archive.nodes.len(),
            actions = archive.actions.len(),
            "plan captured"
        );
        Ok(archive)
    }

    /// Registers every archived object into `ctx`, which must not hold any
    /// variables, nodes, actions or threads yet.
    pub fn restore(&self, ctx: &mut ExecutionContext) -> Result<()> {
        if ctx.variable_count() > 0
            || !ctx.node_ids()?.is_empty()
            || !ctx.action_ids()?.is_empty()
            || !ctx.thread_ids()?.is_empty()
        {
            return Err(KernelError::Archive("restore needs an empty context".into()));
        }
        for (index, variable) in self.variables.iter().enumerate() {
            let id = match variable {
                VariableArchive::Scalar(value) => ctx.add_variable(value.clone())?,
                VariableArchive::Array(elements) => ctx.add_array(elements)?,
            };
            expect_id("variable", index as u32, id.index())?;
        }
        for entry in &self.nodes {
            check_class(entry.class, entry.record.class_id())?;
            let id = ctx.register_boxed_node(entry.record.instantiate())?;
            expect_id("node", entry.id.index(), id.index())?;
        }
        for entry in &self.actions {
            check_class(entry.class, entry.record.class_id())?;
            let id = ctx.register_boxed_action(entry.record.instantiate())?;
            expect_id("action", entry.id.index(), id.index())?;
        }
        for thread in &self.threads {
            ctx.register_thread(Thread::new(thread.list.clone(), thread.return_data.clone()))?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

fn expect_id(kind: &str, expected: u32, got: u32) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(KernelError::Archive(format!("{kind} restored as #{got}, archived as #{expected}")))
    }
}

fn check_class(archived: ClassId, record: ClassId) -> Result<()> {
    if archived == record {
        Ok(())
    } else {
        Err(KernelError::Archive(format!("class {archived:?} does not match record {record:?}")))
    }
}
