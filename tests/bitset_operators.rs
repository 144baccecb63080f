use std::sync::Arc;

use plankernel::action::bitset::{BitSet, SetOp};
use plankernel::action::{ActionList, Status};
use plankernel::arena::VarId;
use plankernel::context::ExecutionContext;
use plankernel::error::KernelError;
use plankernel::locker::{LockTable, Locker};
use plankernel::rowset::RowSet;
use plankernel::transaction::{Database, MemoryTransaction};
use plankernel::value::Value;
use proptest::prelude::*;

fn context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(MemoryTransaction::new()), Database::default())
}

fn rows(ctx: &mut ExecutionContext, id: VarId) -> RowSet {
    match ctx.value(id).expect("variable") {
        Value::RowSet(rows) => rows,
        other => panic!("expected a row set, got {other:?}"),
    }
}

/// Combines `r` with `m` through one operator, optionally coupled to a lock
/// table, and returns the status and the resulting set.
fn combine(op: SetOp, r: &RowSet, m: &RowSet, locks: Option<&Arc<LockTable>>) -> (Status, RowSet) {
    let mut ctx = context();
    let result = ctx.add_variable(r.clone()).unwrap();
    let operand = ctx.add_variable(m.clone()).unwrap();
    let locker = locks.map(|locks| {
        let locker: Arc<dyn Locker> = locks.clone();
        ctx.register_locker(locker).unwrap()
    });
    let id = ctx.register_action(BitSet::with_locker(op, result, operand, locker)).unwrap();
    let mut list = ActionList::from_ids(&[id]);
    list.initialize(&mut ctx).expect("initialize");
    let status = list.execute(&mut ctx).expect("execute");
    (status, rows(&mut ctx, result))
}

/// A lock table where every row of every operand holds one lock per operand.
fn locked(sets: &[&RowSet]) -> Arc<LockTable> {
    let locks = Arc::new(LockTable::new());
    for rows in sets {
        locks.lock_all(rows).unwrap();
    }
    locks
}

#[test]
fn operator_scenarios() {
    let r = RowSet::from([1, 2, 3]);
    let m = RowSet::from([2, 3, 4]);
    assert_eq!(combine(SetOp::Intersect, &r, &m, None), (Status::Success, RowSet::from([2, 3])));
    assert_eq!(combine(SetOp::Union, &r, &m, None), (Status::Success, RowSet::from([1, 2, 3, 4])));
    assert_eq!(combine(SetOp::Difference, &r, &m, None), (Status::Success, RowSet::from([1])));
    assert_eq!(
        combine(SetOp::Difference, &RowSet::from([2, 3]), &m, None),
        (Status::False, RowSet::new())
    );
}

#[test]
fn empty_result_short_circuits() {
    let empty = RowSet::new();
    let m = RowSet::from([5, 6]);
    // nothing to intersect with or subtract from
    assert_eq!(combine(SetOp::Intersect, &empty, &m, None), (Status::False, RowSet::new()));
    assert_eq!(combine(SetOp::Difference, &empty, &m, None), (Status::False, RowSet::new()));
    // a union always proceeds
    assert_eq!(combine(SetOp::Union, &empty, &m, None), (Status::Success, m.clone()));
    assert_eq!(combine(SetOp::Union, &empty, &empty, None), (Status::Success, RowSet::new()));
}

#[test]
fn intersect_releases_excluded_rows_and_one_duplicate_lock() {
    let r = RowSet::from([1, 2, 3]);
    let m = RowSet::from([2, 3, 4]);
    let locks = locked(&[&r, &m]);
    let (status, result) = combine(SetOp::Intersect, &r, &m, Some(&locks));
    assert_eq!(status, Status::Success);
    assert_eq!(locks.released().unwrap(), vec![RowSet::from([1, 4]), RowSet::from([2, 3])]);
    // exactly the surviving rows stay locked, once each
    assert_eq!(locks.locked_rows().unwrap(), result);
    for row in result.iter() {
        assert_eq!(locks.count(row).unwrap(), 1);
    }
}

#[test]
fn union_releases_the_intersection_once() {
    let r = RowSet::from([1, 2, 3]);
    let m = RowSet::from([2, 3, 4]);
    let locks = locked(&[&r, &m]);
    let (status, result) = combine(SetOp::Union, &r, &m, Some(&locks));
    assert_eq!(status, Status::Success);
    assert_eq!(locks.released().unwrap(), vec![RowSet::from([2, 3])]);
    assert_eq!(locks.locked_rows().unwrap(), result);
    assert!(result.iter().all(|row| locks.count(row).unwrap() == 1));
}

#[test]
fn difference_releases_the_subtracted_operand() {
    let r = RowSet::from([1, 2, 3]);
    let m = RowSet::from([2, 3, 4]);
    let locks = locked(&[&r, &m]);
    let (status, result) = combine(SetOp::Difference, &r, &m, Some(&locks));
    assert_eq!(status, Status::Success);
    assert_eq!(locks.released().unwrap(), vec![RowSet::from([2, 3]), RowSet::from([2, 3, 4])]);
    assert_eq!(locks.locked_rows().unwrap(), RowSet::from([1]));
}

#[test]
fn empty_unlock_sets_are_not_sent() {
    let r = RowSet::from([7, 8]);
    let locks = locked(&[&r, &r]);
    combine(SetOp::Intersect, &r, &r.clone(), Some(&locks));
    // the operands agree, so only the duplicate lock is released
    assert_eq!(locks.released().unwrap(), vec![RowSet::from([7, 8])]);
}

#[test]
fn a_locker_without_locking_is_never_called() {
    let locks = Arc::new(LockTable::without_locking());
    let (status, _) = combine(SetOp::Intersect, &RowSet::from([1]), &RowSet::from([2]), Some(&locks));
    assert_eq!(status, Status::False);
    assert!(locks.released().unwrap().is_empty());
}

#[test]
fn unlock_failure_leaves_the_result_untouched() {
    let mut ctx = context();
    let result = ctx.add_variable(RowSet::from([1, 2])).unwrap();
    let operand = ctx.add_variable(RowSet::from([2, 3])).unwrap();
    // nothing was locked, so the first release is refused
    let locker: Arc<dyn Locker> = Arc::new(LockTable::new());
    let locker = ctx.register_locker(locker).unwrap();
    let id = ctx
        .register_action(BitSet::with_locker(SetOp::Intersect, result, operand, Some(locker)))
        .unwrap();
    let mut list = ActionList::from_ids(&[id]);
    list.initialize(&mut ctx).unwrap();
    let err = list.execute(&mut ctx).unwrap_err();
    assert!(matches!(err, KernelError::Lock(_)), "{err}");
    assert_eq!(rows(&mut ctx, result), RowSet::from([1, 2]));
}

#[test]
fn execute_is_idempotent_until_reset() {
    let mut ctx = context();
    let result = ctx.add_variable(RowSet::from([1])).unwrap();
    let operand = ctx.add_variable(RowSet::from([2])).unwrap();
    let r = RowSet::from([1]);
    let m = RowSet::from([2]);
    let locks = locked(&[&r, &m, &m]);
    let locker: Arc<dyn Locker> = locks.clone();
    let locker = ctx.register_locker(locker).unwrap();
    let id = ctx
        .register_action(BitSet::with_locker(SetOp::Union, result, operand, Some(locker)))
        .unwrap();
    let mut list = ActionList::from_ids(&[id]);
    list.initialize(&mut ctx).unwrap();

    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    // the operand changes, but the action already ran for this row
    ctx.set_value(operand, RowSet::from([1, 9])).unwrap();
    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    assert_eq!(rows(&mut ctx, result), RowSet::from([1, 2]));
    assert!(locks.released().unwrap().is_empty());

    list.reset(&mut ctx).unwrap();
    locks.lock(1).unwrap();
    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    assert_eq!(rows(&mut ctx, result), RowSet::from([1, 2, 9]));
    assert_eq!(locks.released().unwrap(), vec![RowSet::from([1])]);
}

#[test]
fn operand_may_be_the_result_itself() {
    let mut ctx = context();
    let result = ctx.add_variable(RowSet::from([4, 5])).unwrap();
    let id = ctx.register_action(BitSet::intersect(result, result)).unwrap();
    let mut list = ActionList::from_ids(&[id]);
    list.initialize(&mut ctx).unwrap();
    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    assert_eq!(rows(&mut ctx, result), RowSet::from([4, 5]));
}

#[test]
fn collect_sets_single_bits() {
    let mut ctx = context();
    let result = ctx.add_variable(RowSet::new()).unwrap();
    let row = ctx.add_variable(Value::Unsigned(7)).unwrap();
    let id = ctx.register_action(BitSet::collect(result, row)).unwrap();
    let mut list = ActionList::from_ids(&[id]);
    list.initialize(&mut ctx).unwrap();

    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    list.reset(&mut ctx).unwrap();
    ctx.set_value(row, Value::Integer(11)).unwrap();
    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    list.reset(&mut ctx).unwrap();
    // a null row id is skipped
    ctx.set_value(row, Value::Null).unwrap();
    assert_eq!(list.execute(&mut ctx).unwrap(), Status::Success);
    assert_eq!(rows(&mut ctx, result), RowSet::from([7, 11]));

    list.reset(&mut ctx).unwrap();
    ctx.set_value(row, "seven").unwrap();
    let err = list.execute(&mut ctx).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArgumentType { .. }), "{err}");
}

#[test]
fn result_must_hold_a_row_set() {
    let mut ctx = context();
    let result = ctx.add_variable(Value::Integer(3)).unwrap();
    let operand = ctx.add_variable(RowSet::new()).unwrap();
    let id = ctx.register_action(BitSet::union(result, operand)).unwrap();
    let mut list = ActionList::from_ids(&[id]);
    let err = list.initialize(&mut ctx).unwrap_err();
    assert!(err.is_fatal(), "{err}");
}

#[test]
fn unknown_locker_is_unresolved() {
    let mut ctx = context();
    let result = ctx.add_variable(RowSet::new()).unwrap();
    let operand = ctx.add_variable(RowSet::new()).unwrap();
    let missing = plankernel::arena::LockerId::new(3);
    let id = ctx
        .register_action(BitSet::with_locker(SetOp::Union, result, operand, Some(missing)))
        .unwrap();
    let mut list = ActionList::from_ids(&[id]);
    let err = list.initialize(&mut ctx).unwrap_err();
    assert!(matches!(err, KernelError::Unresolved { kind: "locker", id: 3 }), "{err}");
}

fn row_set() -> impl Strategy<Value = RowSet> {
    prop::collection::vec(0u32..64, 0..24).prop_map(RowSet::from)
}

proptest! {
    #[test]
    fn intersect_succeeds_iff_operands_overlap(r in row_set(), m in row_set()) {
        let (status, result) = combine(SetOp::Intersect, &r, &m, None);
        prop_assert_eq!(status == Status::Success, (&r & &m).any());
        prop_assert_eq!(result, &r & &m);
    }

    #[test]
    fn union_always_succeeds(r in row_set(), m in row_set()) {
        let (status, result) = combine(SetOp::Union, &r, &m, None);
        prop_assert_eq!(status, Status::Success);
        prop_assert_eq!(result, &r | &m);
    }

    #[test]
    fn difference_succeeds_iff_rows_remain(r in row_set(), m in row_set()) {
        let (status, result) = combine(SetOp::Difference, &r, &m, None);
        prop_assert_eq!(status == Status::Success, (&r - &m).any());
        prop_assert_eq!(result, &r - &m);
    }

    #[test]
    fn intersect_release_is_complete(r in row_set(), m in row_set()) {
        let locks = locked(&[&r, &m]);
        let (_, result) = combine(SetOp::Intersect, &r, &m, Some(&locks));
        let released: RowSet = locks.released().unwrap().iter().flat_map(|rows| rows.to_vec()).collect();
        prop_assert_eq!(released, &r | &m);
        // excluded rows are fully released and survivors keep one lock
        prop_assert_eq!(locks.locked_rows().unwrap(), result.clone());
        for row in result.iter() {
            prop_assert_eq!(locks.count(row).unwrap(), 1);
        }
    }
}
