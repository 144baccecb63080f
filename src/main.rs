//! Runs a small demonstration plan.
//!
//! Three index results are intersected while the rows that drop out are
//! unlocked, the surviving rows are scanned and filtered, and what passes the
//! filter is printed. Settings come from `plankernel.toml` (or the path given
//! as the first argument) and `PLANKERNEL__` environment variables.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use plankernel::action::assign::Output;
use plankernel::action::bitset::{BitSet, SetOp};
use plankernel::action::control::CheckCancel;
use plankernel::action::predicate::{CompareOp, Comparison};
use plankernel::arena::NodeId;
use plankernel::config::Settings;
use plankernel::context::ExecutionContext;
use plankernel::error::Result;
use plankernel::executor::Executor;
use plankernel::locker::{LockTable, Locker};
use plankernel::node::{NodeBase, RowSetScan};
use plankernel::rowset::RowSet;
use plankernel::transaction::{Database, MemoryTransaction};
use plankernel::value::Value;

fn build(ctx: &mut ExecutionContext, locks: &Arc<LockTable>) -> Result<NodeId> {
    let by_color = RowSet::from([1, 2, 3, 5, 8, 13, 21]);
    let by_size = RowSet::from([2, 3, 5, 7, 11, 13, 17, 21]);
    let by_region = RowSet::from([3, 5, 13, 21, 34]);
    // every index scan locked what it reported
    for rows in [&by_color, &by_size, &by_region] {
        locks.lock_all(rows)?;
    }

    let result = ctx.add_variable(by_color)?;
    let size = ctx.add_variable(by_size)?;
    let region = ctx.add_variable(by_region)?;
    let row = ctx.add_variable(Value::Null)?;
    let threshold = ctx.add_variable(Value::Unsigned(4))?;
    let tuple = ctx.add_array(&[row])?;
    let locker: Arc<dyn Locker> = locks.clone();
    let locker = ctx.register_locker(locker)?;

    let mut base = NodeBase::new();
    for operand in [size, region] {
        let combine = BitSet::with_locker(SetOp::Intersect, result, operand, Some(locker));
        base.add_start_up(ctx.register_action(combine)?);
    }
    base.add_action(ctx.register_action(CheckCancel::new())?);
    base.add_action(ctx.register_action(Comparison::new(CompareOp::GreaterThan, row, threshold))?);
    base.add_action(ctx.register_action(Output::new(tuple))?);
    ctx.register_node(RowSetScan::with_base(base, result, row))
}

fn main() -> Result<()> {
    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log.filter))
        .init();

    let mut ctx = ExecutionContext::with_settings(
        Arc::new(MemoryTransaction::new()),
        Database::default(),
        settings.thread.clone(),
    );
    let locks = Arc::new(LockTable::new());
    let root = build(&mut ctx, &locks)?;

    let mut executor = Executor::new(&mut ctx).explain_data(settings.explain.data);
    println!("{}", executor.explain(root));
    let rows = executor.run(root)?;
    for row in &rows {
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        println!("{}", cells.join(", "));
    }
    let locked = locks.locked_rows()?;
    info!(rows = rows.len(), %locked, "demo complete");
    Ok(())
}
