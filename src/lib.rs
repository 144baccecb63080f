//! Plankernel – the execution runtime for compiled query plans.
//!
//! A compiled plan is a tree of *nodes* that produce rows on demand, each
//! carrying a list of *actions* run once per produced row:
//! * A [`node::Node`] yields one row per `next` into variables chosen when
//!   the plan was built (row-set scans, file scans, single-row sources).
//! * An [`action::Action`] is a per-row instruction: assignment, filter
//!   predicate, row-set combination, branching, cancellation check, or the
//!   control of a sub-plan [`thread::Thread`].
//! * A [`holder::Holder`] is a typed id that resolves to an object registered
//!   in the [`context::ExecutionContext`] at `initialize` and lets go of it
//!   at `terminate`.
//!
//! Evaluation is pull driven and single threaded. Parallelism only happens
//! where a plan explicitly starts a sub-plan thread, which runs on its own
//! OS thread with a private copy of the variables it reads.
//!
//! ## Modules
//! * [`arena`] – Typed ids and the append-only keepers behind them.
//! * [`value`] and [`rowset`] – Runtime values and sets of row identifiers.
//! * [`context`] – Registered objects, variables and shared statement services.
//! * [`holder`] – Id to object binding with an explicit lifecycle.
//! * [`action`] – Per-row instructions and the [`action::ActionList`].
//! * [`node`] – Row producers and the shared [`node::NodeBase`].
//! * [`executor`] – Driving a node and running whole statements.
//! * [`thread`] – Sub-plans on native threads.
//! * [`locker`], [`file`], [`transaction`] – Capabilities supplied by the
//!   surrounding storage engine, with in-memory implementations.
//! * [`archive`] – Freezing a plan into JSON and restoring it.
//! * [`interface`] – Running statements in the background and cancelling them.
//! * [`config`] – Layered settings.
//!
//! ## Row-Set Combination
//! Index scans each produce a [`rowset::RowSet`]. The [`action::bitset`]
//! operators fold them into a running result (intersect, union, difference,
//! collect). With a [`locker::Locker`] attached, rows that can no longer
//! reach the result are unlocked before the result is mutated.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use plankernel::action::assign::Output;
//! use plankernel::action::bitset::BitSet;
//! use plankernel::context::ExecutionContext;
//! use plankernel::executor::Executor;
//! use plankernel::node::{NodeBase, RowSetScan};
//! use plankernel::rowset::RowSet;
//! use plankernel::transaction::{Database, MemoryTransaction};
//! use plankernel::value::Value;
//!
//! let mut ctx = ExecutionContext::new(Arc::new(MemoryTransaction::new()), Database::default());
//! let result = ctx.add_variable(RowSet::from([1, 2, 3]))?;
//! let index = ctx.add_variable(RowSet::from([2, 3, 4]))?;
//! let row = ctx.add_variable(Value::Null)?;
//! let tuple = ctx.add_array(&[row])?;
//!
//! let mut base = NodeBase::new();
//! base.add_start_up(ctx.register_action(BitSet::intersect(result, index))?);
//! base.add_action(ctx.register_action(Output::new(tuple))?);
//! let scan = ctx.register_node(RowSetScan::with_base(base, result, row))?;
//!
//! let rows = Executor::new(&mut ctx).run(scan)?;
//! assert_eq!(rows, vec![vec![Value::Unsigned(2)], vec![Value::Unsigned(3)]]);
//! # Ok::<(), plankernel::error::KernelError>(())
//! ```
//!
//! ## Configuration
//! [`config::Settings`] layers built-in defaults, an optional
//! `plankernel.toml` and `PLANKERNEL__`-prefixed environment variables.
//! Logging goes through `tracing`; installing a subscriber is left to the
//! binary.

pub mod action;
pub mod archive;
pub mod arena;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod explain;
pub mod file;
pub mod holder;
pub mod interface;
pub mod locker;
pub mod node;
pub mod rowset;
pub mod thread;
pub mod transaction;
pub mod value;
