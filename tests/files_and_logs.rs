use std::sync::Arc;

use plankernel::action::assign::Output;
use plankernel::action::control::CheckCancel;
use plankernel::action::file::{FileFetch, FilePut};
use plankernel::action::undo::{PrepareUndoLog, StoreUndoLog};
use plankernel::action::unlock::UnlockRow;
use plankernel::arena::FileId;
use plankernel::context::ExecutionContext;
use plankernel::error::KernelError;
use plankernel::executor::Executor;
use plankernel::file::{FileAccess, MemoryFile};
use plankernel::locker::{LockTable, Locker};
use plankernel::node::{FileScan, NodeBase, Once, RowSetScan};
use plankernel::rowset::RowSet;
use plankernel::transaction::{CancelToken, Database, MemoryTransaction, Transaction};
use plankernel::value::Value;

fn setup() -> (ExecutionContext, Arc<MemoryTransaction>) {
    let transaction = Arc::new(MemoryTransaction::new());
    let ctx = ExecutionContext::new(transaction.clone(), Database::default());
    (ctx, transaction)
}

fn customers() -> MemoryFile {
    MemoryFile::new(vec![
        vec![Value::Integer(1), Value::from("ada")],
        vec![Value::Integer(2), Value::from("grace")],
    ])
}

fn with_file<T>(ctx: &ExecutionContext, id: FileId, f: impl FnOnce(&dyn FileAccess) -> T) -> T {
    let file = ctx.get_file(id).expect("file lookup").expect("file registered");
    let file = file.lock().expect("file lock");
    f(&**file)
}

#[test]
fn file_scan_reads_every_tuple_and_closes() {
    let (mut ctx, _) = setup();
    let file = ctx.register_file(customers()).unwrap();
    let id = ctx.add_variable(Value::Null).unwrap();
    let name = ctx.add_variable(Value::Null).unwrap();
    let tuple = ctx.add_array(&[id, name]).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(Output::new(tuple)).unwrap());
    let root = ctx.register_node(FileScan::with_base(base, file, tuple)).unwrap();

    let rows = Executor::new(&mut ctx).run(root).unwrap();
    assert_eq!(rows, customers().tuples().to_vec());
    assert!(!with_file(&ctx, file, |f| f.is_opened()));
}

#[test]
fn file_scan_runs_again_after_finish() {
    let (mut ctx, _) = setup();
    let file = ctx.register_file(customers()).unwrap();
    let id = ctx.add_variable(Value::Null).unwrap();
    let name = ctx.add_variable(Value::Null).unwrap();
    let tuple = ctx.add_array(&[id, name]).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(Output::new(tuple)).unwrap());
    let root = ctx.register_node(FileScan::with_base(base, file, tuple)).unwrap();

    assert_eq!(Executor::new(&mut ctx).run(root).unwrap().len(), 2);
    assert_eq!(Executor::new(&mut ctx).run(root).unwrap().len(), 2);
}

fn fetch(key: Value) -> Vec<Vec<Value>> {
    let (mut ctx, _) = setup();
    let file = ctx.register_file(customers()).unwrap();
    let key = ctx.add_variable(key).unwrap();
    let id = ctx.add_variable(Value::Null).unwrap();
    let name = ctx.add_variable(Value::Null).unwrap();
    let tuple = ctx.add_array(&[id, name]).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(FileFetch::new(file, key, tuple)).unwrap());
    base.add_action(ctx.register_action(Output::new(tuple)).unwrap());
    let root = ctx.register_node(Once::with_base(base)).unwrap();
    let rows = Executor::new(&mut ctx).run(root).unwrap();
    assert!(!with_file(&ctx, file, |f| f.is_opened()), "fetch closes on terminate");
    rows
}

#[test]
fn fetch_by_key() {
    assert_eq!(fetch(Value::Integer(2)), vec![vec![Value::Integer(2), Value::from("grace")]]);
    // a miss rejects the row, so nothing reaches the output
    assert!(fetch(Value::Integer(5)).is_empty());
    assert!(fetch(Value::Null).is_empty());
}

#[test]
fn put_starts_one_batch_and_closes_the_file() {
    let (mut ctx, transaction) = setup();
    let file = ctx.register_file(MemoryFile::default()).unwrap();
    let rows = ctx.add_variable(RowSet::from([4, 5, 6])).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let tuple = ctx.add_array(&[row]).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(FilePut::new(file, tuple).batch("orders")).unwrap());
    let root = ctx.register_node(RowSetScan::with_base(base, rows, row)).unwrap();

    assert!(Executor::new(&mut ctx).run(root).unwrap().is_empty());
    assert_eq!(transaction.batch_tables().unwrap(), vec!["orders".to_owned()]);
    with_file(&ctx, file, |f| {
        assert!(!f.is_opened());
        assert_eq!(f.property("count"), Some(Value::Integer(3)));
    });
}

#[test]
fn file_operations_need_an_open_file() {
    let mut file = customers();
    let mut buffer = Vec::new();
    assert!(file.get_data(&mut buffer).is_err());
    assert!(file.put(&[Value::Integer(3)]).is_err());
    file.open().unwrap();
    assert!(file.get_data(&mut buffer).unwrap());
    assert_eq!(buffer[1], Value::from("ada"));
    file.set_property("owner", Value::from("sales"));
    assert_eq!(file.property("owner"), Some(Value::from("sales")));
    assert_eq!(file.property("missing"), None);
}

#[test]
fn undo_log_records_each_row_after_one_prepare() {
    let (mut ctx, transaction) = setup();
    let rows = ctx.add_variable(RowSet::from([1, 2])).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let label = ctx.add_variable("old").unwrap();
    let tuple = ctx.add_array(&[row, label]).unwrap();
    let mut base = NodeBase::new();
    base.add_start_up(ctx.register_action(PrepareUndoLog::new()).unwrap());
    base.add_action(ctx.register_action(StoreUndoLog::new(tuple)).unwrap());
    let root = ctx.register_node(RowSetScan::with_base(base, rows, row)).unwrap();

    Executor::new(&mut ctx).run(root).unwrap();
    assert_eq!(transaction.prepared().unwrap(), 1);
    assert_eq!(
        transaction.undo_log().unwrap(),
        vec![
            vec![Value::Unsigned(1), Value::from("old")],
            vec![Value::Unsigned(2), Value::from("old")],
        ]
    );
    transaction.clear_undo_log().unwrap();
    assert!(transaction.undo_log().unwrap().is_empty());
}

fn unlock_plan(locks: Arc<LockTable>, rows: RowSet) {
    let (mut ctx, _) = setup();
    let rows = ctx.add_variable(rows).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let locker: Arc<dyn Locker> = locks;
    let locker = ctx.register_locker(locker).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(UnlockRow::new(locker, row)).unwrap());
    let root = ctx.register_node(RowSetScan::with_base(base, rows, row)).unwrap();
    Executor::new(&mut ctx).run(root).unwrap();
}

#[test]
fn unlock_row_releases_each_scanned_row() {
    let locks = Arc::new(LockTable::new());
    locks.lock_all(&RowSet::from([1, 2, 3])).unwrap();
    locks.lock(2).unwrap();
    unlock_plan(locks.clone(), RowSet::from([1, 2, 3]));
    assert_eq!(locks.locked_rows().unwrap(), RowSet::from([2]));
    assert_eq!(locks.count(2).unwrap(), 1);
    assert_eq!(
        locks.released().unwrap(),
        vec![RowSet::from([1]), RowSet::from([2]), RowSet::from([3])]
    );
}

#[test]
fn unlock_row_skips_null_rows_and_lockless_transactions() {
    let locks = Arc::new(LockTable::new());
    locks.lock(1).unwrap();
    let (mut ctx, _) = setup();
    let row = ctx.add_variable(Value::Null).unwrap();
    let locker: Arc<dyn Locker> = locks.clone();
    let locker = ctx.register_locker(locker).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(UnlockRow::new(locker, row)).unwrap());
    let root = ctx.register_node(Once::with_base(base)).unwrap();
    Executor::new(&mut ctx).run(root).unwrap();
    assert!(locks.released().unwrap().is_empty());
    assert_eq!(locks.count(1).unwrap(), 1);

    let lockless = Arc::new(LockTable::without_locking());
    unlock_plan(lockless.clone(), RowSet::from([7, 8]));
    assert!(lockless.released().unwrap().is_empty());
}

#[test]
fn unlocking_an_unlocked_row_fails_the_statement() {
    let locks = Arc::new(LockTable::new());
    let (mut ctx, _) = setup();
    let rows = ctx.add_variable(RowSet::from([9])).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let locker: Arc<dyn Locker> = locks;
    let locker = ctx.register_locker(locker).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(UnlockRow::new(locker, row)).unwrap());
    let root = ctx.register_node(RowSetScan::with_base(base, rows, row)).unwrap();
    let err = Executor::new(&mut ctx).run(root).unwrap_err();
    assert!(matches!(err, KernelError::Lock(_)), "{err}");
}

#[test]
fn cancelled_statement_stops_at_the_next_check() {
    let token = CancelToken::new();
    let transaction = Arc::new(MemoryTransaction::with_cancel(token.clone()));
    let mut ctx = ExecutionContext::new(transaction, Database::default());
    let rows = ctx.add_variable(RowSet::from([1, 2, 3])).unwrap();
    let row = ctx.add_variable(Value::Null).unwrap();
    let tuple = ctx.add_array(&[row]).unwrap();
    let mut base = NodeBase::new();
    base.add_action(ctx.register_action(CheckCancel::new()).unwrap());
    base.add_action(ctx.register_action(Output::new(tuple)).unwrap());
    let root = ctx.register_node(RowSetScan::with_base(base, rows, row)).unwrap();

    assert_eq!(Executor::new(&mut ctx).run(root).unwrap().len(), 3);
    token.cancel();
    let err = Executor::new(&mut ctx).run(root).unwrap_err();
    assert!(err.is_cancel());
    assert!(!err.is_fatal());
}
