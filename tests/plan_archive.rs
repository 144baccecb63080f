use std::sync::Arc;

use plankernel::action::assign::{Assign, Output};
use plankernel::action::bitset::{BitSet, SetOp};
use plankernel::action::predicate::{CompareOp, Comparison};
use plankernel::archive::PlanArchive;
use plankernel::arena::{LockerId, NodeId};
use plankernel::context::ExecutionContext;
use plankernel::error::KernelError;
use plankernel::executor::Executor;
use plankernel::locker::{LockTable, Locker};
use plankernel::node::{NodeBase, RowSetScan};
use plankernel::rowset::RowSet;
use plankernel::thread::Thread;
use plankernel::transaction::{Database, MemoryTransaction};
use plankernel::value::Value;

fn context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(MemoryTransaction::new()), Database::default())
}

// rows above 1 of {1, 2, 3}, plus an idle thread
fn filtered_scan(ctx: &mut ExecutionContext) -> NodeId {
    let rows = ctx.add_variable(RowSet::from([1, 2, 3])).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let threshold = ctx.add_variable(Value::Unsigned(1)).unwrap();
    let tuple = ctx.add_array(&[row]).unwrap();
    let copy = ctx.add_variable(Value::Null).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(Comparison::new(CompareOp::GreaterThan, row, threshold)).unwrap());
    base.add_action(ctx.register_action(Output::new(tuple)).unwrap());
    let assign = ctx.register_action(Assign::new(row, copy)).unwrap();
    ctx.register_thread(Thread::new(vec![assign], vec![copy])).unwrap();
    ctx.register_node(RowSetScan::with_base(base, rows, row)).unwrap()
}

fn expected() -> Vec<Vec<Value>> {
    vec![vec![Value::Unsigned(2)], vec![Value::Unsigned(3)]]
}

#[test]
fn captured_plan_survives_json() {
    let mut ctx = context();
    filtered_scan(&mut ctx);
    let archive = PlanArchive::capture(&mut ctx).unwrap();
    assert_eq!(archive.variables.len(), 5);
    assert_eq!(archive.nodes.len(), 1);
    assert_eq!(archive.actions.len(), 3);
    assert_eq!(archive.threads.len(), 1);

    let json = archive.to_json().unwrap();
    assert_eq!(PlanArchive::from_json(&json).unwrap(), archive);
}

#[test]
fn restored_plan_runs_like_the_original() {
    let mut original = context();
    let root = filtered_scan(&mut original);
    let json = PlanArchive::capture(&mut original).unwrap().to_json().unwrap();
    assert_eq!(Executor::new(&mut original).run(root).unwrap(), expected());

    let mut restored = context();
    PlanArchive::from_json(&json).unwrap().restore(&mut restored).unwrap();
    assert_eq!(restored.node_ids().unwrap(), vec![root]);
    assert_eq!(restored.thread_ids().unwrap().len(), 1);
    assert_eq!(
        Executor::new(&mut restored).explain(root),
        Executor::new(&mut original).explain(root)
    );
    assert_eq!(Executor::new(&mut restored).run(root).unwrap(), expected());
}

#[test]
fn restore_needs_an_empty_context() {
    let mut ctx = context();
    filtered_scan(&mut ctx);
    let archive = PlanArchive::capture(&mut ctx).unwrap();
    let err = archive.restore(&mut ctx).unwrap_err();
    assert!(matches!(err, KernelError::Archive(_)), "{err}");

    let mut busy = context();
    busy.add_variable(1i64).unwrap();
    assert!(archive.restore(&mut busy).is_err());
}

#[test]
fn malformed_json_is_an_archive_error() {
    let err = PlanArchive::from_json("{\"variables\": 3}").unwrap_err();
    assert!(matches!(err, KernelError::Archive(_)), "{err}");
}

#[test]
fn lockers_are_registered_again_after_restore() {
    let mut ctx = context();
    let result = ctx.add_variable(RowSet::from([1, 2, 3])).unwrap();
    let operand = ctx.add_variable(RowSet::from([2, 3])).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let tuple = ctx.add_array(&[row]).unwrap();
    let locker: Arc<dyn Locker> = Arc::new(LockTable::without_locking());
    let locker = ctx.register_locker(locker).unwrap();
    let mut base = NodeBase::new();
    base.add_start_up(
        ctx.register_action(BitSet::with_locker(SetOp::Intersect, result, operand, Some(locker))).unwrap(),
    );
    base.add_action(ctx.register_action(Output::new(tuple)).unwrap());
    let root = ctx.register_node(RowSetScan::with_base(base, result, row)).unwrap();
    let archive = PlanArchive::capture(&mut ctx).unwrap();

    let mut restored = context();
    archive.restore(&mut restored).unwrap();
    let err = Executor::new(&mut restored).run(root).unwrap_err();
    assert!(matches!(err, KernelError::Unresolved { kind: "locker", id: 0 }), "{err}");

    let locker: Arc<dyn Locker> = Arc::new(LockTable::without_locking());
    assert_eq!(restored.register_locker(locker).unwrap(), LockerId::new(0));
    assert_eq!(Executor::new(&mut restored).run(root).unwrap(), expected());
}
