//! Row-set operators.
//!
//! Index scans each produce a [`RowSet`]; these actions fold them into a
//! running result. When a [`Locker`](crate::locker::Locker) is attached, rows
//! that can no longer reach the result are unlocked before the result is
//! mutated, using the operand values as they were before the combine.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::{LockerId, VarId};
use crate::context::{ExecutionContext, LockerRef};
use crate::error::{KernelError, Result};
use crate::explain::Explain;
use crate::holder::{DataHolder, LockerHolder, RowSetHolder};
use crate::rowset::RowSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOp {
    Intersect,
    Union,
    Difference,
}

/// What distinguishes one set operator from another.
struct OpTable {
    name: &'static str,
    /// False when the combine cannot change an empty result.
    need_combine: fn(&RowSet) -> bool,
    /// Status when the combine is skipped.
    combine_empty: Status,
    combine: fn(&mut RowSet, &RowSet),
    /// Status after combining.
    status: fn(&RowSet) -> Status,
    /// Rows to release, computed from the operands before combining.
    unlock: fn(&RowSet, &RowSet) -> Vec<RowSet>,
}

fn any_or_false(rows: &RowSet) -> Status {
    if rows.any() { Status::Success } else { Status::False }
}

const INTERSECT: OpTable = OpTable {
    name: "intersect",
    need_combine: RowSet::any,
    combine_empty: Status::False,
    combine: |result, my| *result &= my,
    status: any_or_false,
    // rows in exactly one operand leave; the survivors were locked twice
    unlock: |result, my| vec![result ^ my, result & my],
};

const UNION: OpTable = OpTable {
    name: "union",
    need_combine: |_| true,
    combine_empty: Status::Success,
    combine: |result, my| *result |= my,
    status: |_| Status::Success,
    unlock: |result, my| vec![result & my],
};

const DIFFERENCE: OpTable = OpTable {
    name: "difference",
    need_combine: RowSet::any,
    combine_empty: Status::False,
    combine: |result, my| *result -= my,
    status: any_or_false,
    // the intersection is released once for the duplicate lock, and the
    // whole subtracted operand once more
    unlock: |result, my| vec![result & my, my.clone()],
};

impl SetOp {
    fn table(self) -> &'static OpTable {
        match self {
            SetOp::Intersect => &INTERSECT,
            SetOp::Union => &UNION,
            SetOp::Difference => &DIFFERENCE,
        }
    }
    pub fn name(self) -> &'static str {
        self.table().name
    }
}

#[derive(Debug)]
enum Operation {
    Combine { op: SetOp, operand: RowSetHolder, locker: Option<LockerHolder> },
    /// Sets the bit of a scalar row id.
    Collect { row: DataHolder },
}

/// One row-set operator writing into `result`.
#[derive(Debug)]
pub struct BitSet {
    result: RowSetHolder,
    operation: Operation,
    state: ActionState,
}

impl BitSet {
    pub fn new(op: SetOp, result: VarId, operand: VarId) -> Self {
        Self::with_locker(op, result, operand, None)
    }
    pub fn intersect(result: VarId, operand: VarId) -> Self {
        Self::new(SetOp::Intersect, result, operand)
    }
    pub fn union(result: VarId, operand: VarId) -> Self {
        Self::new(SetOp::Union, result, operand)
    }
    pub fn difference(result: VarId, operand: VarId) -> Self {
        Self::new(SetOp::Difference, result, operand)
    }
    pub fn with_locker(op: SetOp, result: VarId, operand: VarId, locker: Option<LockerId>) -> Self {
        Self {
            result: RowSetHolder::new(result),
            operation: Operation::Combine {
                op,
                operand: RowSetHolder::new(operand),
                locker: locker.map(LockerHolder::new),
            },
            state: ActionState::default(),
        }
    }
    pub fn collect(result: VarId, row: VarId) -> Self {
        Self {
            result: RowSetHolder::new(result),
            operation: Operation::Collect { row: DataHolder::new(row) },
            state: ActionState::default(),
        }
    }

    fn combine(&self, op: SetOp, operand: &RowSetHolder, locker: Option<&LockerRef>) -> Result<Status> {
        let table = op.table();
        if let Some(locker) = locker.filter(|l| l.is_need_lock()) {
            let releases = self.result.combine_with(operand, |result, my| (table.unlock)(result, my))?;
            for rows in releases.iter().filter(|rows| rows.any()) {
                locker.unlock(rows)?;
            }
            trace!(op = table.name, calls = releases.len(), "released rows before combine");
        }
        self.result.combine_with(operand, |result, my| {
            if !(table.need_combine)(result) {
                return table.combine_empty;
            }
            (table.combine)(result, my);
            (table.status)(result)
        })
    }
}

impl Action for BitSet {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        match &self.operation {
            Operation::Combine { op, operand, locker } => {
                explain.put(format!("bitset {} ", op.name()));
                self.result.explain(explain);
                explain.put(", ");
                operand.explain(explain);
                if let Some(locker) = locker {
                    explain.put(" unlock ");
                    locker.explain(explain);
                }
            }
            Operation::Collect { row } => {
                explain.put("bitset collect ");
                self.result.explain(explain);
                explain.put(", ");
                row.explain(explain);
            }
        }
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.result.initialize(ctx)?;
        match &mut self.operation {
            Operation::Combine { operand, locker, .. } => {
                operand.initialize(ctx)?;
                if let Some(locker) = locker {
                    locker.initialize(ctx)?;
                }
            }
            Operation::Collect { row } => row.initialize(ctx)?,
        }
        Ok(())
    }
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.result.terminate(ctx)?;
        match &mut self.operation {
            Operation::Combine { operand, locker, .. } => {
                operand.terminate(ctx)?;
                if let Some(locker) = locker {
                    locker.terminate(ctx)?;
                }
            }
            Operation::Collect { row } => row.terminate(ctx)?,
        }
        Ok(())
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if self.state.is_done() {
            return Ok(self.state.status());
        }
        let status = match &self.operation {
            Operation::Combine { op, operand, locker } => {
                let locker = locker.as_ref().map(|l| l.get()).transpose()?;
                self.combine(*op, operand, locker)?
            }
            Operation::Collect { row } => {
                let value = row.value()?;
                if !value.is_null() {
                    let id = value.as_row_id().ok_or_else(|| KernelError::InvalidArgumentType {
                        predicate: "bitset collect",
                        found: value.type_name().into(),
                    })?;
                    self.result.with_mut(|rows| rows.insert(id))?;
                }
                Status::Success
            }
        };
        Ok(self.state.done(status))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        match &self.operation {
            Operation::Combine { op, operand, locker } => ActionArchive::BitSet {
                op: *op,
                result: self.result.id(),
                operand: operand.id(),
                locker: locker.as_ref().map(|l| l.id()),
            },
            Operation::Collect { row } => {
                ActionArchive::Collect { result: self.result.id(), row: row.id() }
            }
        }
    }
}
