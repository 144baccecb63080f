use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use plankernel::action::assign::{Assign, Output};
use plankernel::action::control::{CheckCancel, Throw, ThrowKind};
use plankernel::action::parallel::ThreadControl;
use plankernel::action::{Action, ActionState, ListControl, Status};
use plankernel::archive::ActionArchive;
use plankernel::arena::ThreadId;
use plankernel::config::ThreadSettings;
use plankernel::context::ExecutionContext;
use plankernel::error::{KernelError, Result};
use plankernel::executor::Executor;
use plankernel::explain::Explain;
use plankernel::node::{NodeBase, Once};
use plankernel::thread::{Thread, ThreadState};
use plankernel::transaction::{CancelToken, Database, MemoryTransaction};
use plankernel::value::Value;

fn context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(MemoryTransaction::new()), Database::default())
}

fn with_thread<T>(ctx: &ExecutionContext, id: ThreadId, f: impl FnOnce(&mut Thread) -> T) -> T {
    let thread = ctx.get_thread(id).expect("thread lookup").expect("thread registered");
    let mut thread = thread.lock().expect("thread lock");
    f(&mut thread)
}

/// Panics when executed.
#[derive(Debug, Default)]
struct Explode {
    state: ActionState,
}

impl Action for Explode {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("explode");
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        panic!("boom");
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::CheckCancel
    }
}

/// Blocks until the test lets it through.
#[derive(Debug)]
struct Gate {
    open: Receiver<()>,
    state: ActionState,
}

impl Action for Gate {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("gate");
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        self.open.recv().map_err(|_| KernelError::unexpected("gate dropped"))?;
        Ok(self.state.done(Status::Success))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::CheckCancel
    }
}

#[test]
fn returned_variables_flow_back_at_join() {
    let mut ctx = context();
    let source = ctx.add_variable(5i64).unwrap();
    let returned = ctx.add_variable(0i64).unwrap();
    let private = ctx.add_variable(0i64).unwrap();
    let list = vec![
        ctx.register_action(Assign::new(source, returned)).unwrap(),
        ctx.register_action(Assign::new(source, private)).unwrap(),
    ];
    let thread = ctx.register_thread(Thread::new(list, vec![returned])).unwrap();

    with_thread(&ctx, thread, |t| {
        assert_eq!(t.state(), ThreadState::Created);
        t.start(&ctx).unwrap();
        assert!(t.start(&ctx).is_err(), "started twice");
        assert_eq!(t.join().unwrap(), Status::Success);
        assert_eq!(t.state(), ThreadState::Joined);
        assert!(t.join().is_err(), "joined twice");
    });
    assert_eq!(ctx.value(returned).unwrap(), Value::Integer(5));
    assert_eq!(ctx.value(private).unwrap(), Value::Integer(0));
}

#[test]
fn forked_contexts_keep_their_own_variables() {
    let mut ctx = context();
    let source = ctx.add_variable(5i64).unwrap();
    let copy = ctx.copy_variable(source).unwrap();
    ctx.set_value(copy, 9i64).unwrap();
    assert_eq!(ctx.value(source).unwrap(), Value::Integer(5));
    assert_eq!(ctx.value(copy).unwrap(), Value::Integer(9));
    assert!(ctx.copy_variable(plankernel::arena::VarId::new(50)).is_err());

    assert!(!ctx.is_sub_context());
    let mut sub = ctx.fork(&[]);
    assert!(sub.is_sub_context());
    sub.set_value(source, 7i64).unwrap();
    assert_eq!(ctx.value(source).unwrap(), Value::Integer(5));
    assert!(sub.add_variable(1i64).is_err());
}

#[test]
fn a_failed_statement_joins_its_running_thread() {
    let mut ctx = context();
    let (open, gate) = mpsc::channel();
    let answer = ctx.add_variable(42i64).unwrap();
    let tuple = ctx.add_array(&[answer]).unwrap();
    let list = vec![
        ctx.register_action(Gate { open: gate, state: ActionState::default() }).unwrap(),
        ctx.register_action(Output::new(tuple)).unwrap(),
    ];
    let thread = ctx.register_thread(Thread::new(list, Vec::new())).unwrap();

    let mut base = NodeBase::new();
    base.add_start_up(ctx.register_action(ThreadControl::start(thread)).unwrap());
    base.add_start_up(ctx.register_action(Throw::new(ThrowKind::Message("abort".into()))).unwrap());
    base.add_start_up(ctx.register_action(ThreadControl::join(thread)).unwrap());
    let root = ctx.register_node(Once::with_base(base)).unwrap();

    let opener = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        open.send(()).ok();
    });
    let err = Executor::new(&mut ctx).run(root).unwrap_err();
    assert!(matches!(err, KernelError::Thrown(ref message) if message == "abort"), "{err}");
    // the thread ended before run returned, and its row went with the statement
    assert_eq!(with_thread(&ctx, thread, |t| t.state()), ThreadState::Joined);
    opener.join().unwrap();
    assert!(ctx.take_output().unwrap().is_empty());
}

#[test]
fn join_before_start_is_an_error() {
    let mut thread = Thread::new(Vec::new(), Vec::new());
    assert!(thread.join().is_err());
}

#[test]
fn thread_actions_inside_a_plan() {
    let mut ctx = context();
    let source = ctx.add_variable("done").unwrap();
    let target = ctx.add_variable(Value::Null).unwrap();
    let assign = ctx.register_action(Assign::new(source, target)).unwrap();
    let thread = ctx.register_thread(Thread::new(vec![assign], vec![target])).unwrap();

    let mut base = NodeBase::new();
    base.add_start_up(ctx.register_action(ThreadControl::start(thread)).unwrap());
    base.add_start_up(ctx.register_action(ThreadControl::join(thread)).unwrap());
    let root = ctx.register_node(Once::with_base(base)).unwrap();
    Executor::new(&mut ctx).run(root).unwrap();
    assert_eq!(ctx.value(target).unwrap(), Value::from("done"));
}

#[test]
fn check_exit_status_polls_without_blocking() {
    let ctx = context();
    let (open, gate) = mpsc::channel();
    let gate = ctx.register_action(Gate { open: gate, state: ActionState::default() }).unwrap();
    let thread = ctx.register_thread(Thread::new(vec![gate], Vec::new())).unwrap();

    with_thread(&ctx, thread, |t| {
        t.start(&ctx).unwrap();
        assert_eq!(t.check_exit_status().unwrap(), Status::False);
        assert_eq!(t.state(), ThreadState::Running);
        open.send(()).unwrap();
        let mut status = Status::False;
        for _ in 0..500 {
            status = t.check_exit_status().unwrap();
            if status != Status::False {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(status, Status::Success);
        assert_eq!(t.state(), ThreadState::Joined);
    });
}

#[test]
fn cancellation_is_absorbed_at_join() {
    let token = CancelToken::new();
    token.cancel();
    let ctx = ExecutionContext::new(Arc::new(MemoryTransaction::with_cancel(token)), Database::default());
    let check = ctx.register_action(CheckCancel::new()).unwrap();
    let thread = ctx.register_thread(Thread::new(vec![check], Vec::new())).unwrap();
    with_thread(&ctx, thread, |t| {
        t.start(&ctx).unwrap();
        assert_eq!(t.join().unwrap(), Status::Success);
    });
}

#[test]
fn other_errors_surface_at_join() {
    let ctx = context();
    let throw = ctx.register_action(Throw::new(ThrowKind::Message("bad row".into()))).unwrap();
    let thread = ctx.register_thread(Thread::new(vec![throw], Vec::new())).unwrap();
    let err = with_thread(&ctx, thread, |t| {
        t.start(&ctx).unwrap();
        t.join().unwrap_err()
    });
    assert!(matches!(err, KernelError::Thrown(ref message) if message == "bad row"), "{err}");
}

#[test]
fn a_panic_becomes_thread_panicked() {
    let ctx = context();
    let explode = ctx.register_action(Explode::default()).unwrap();
    let thread = ctx.register_thread(Thread::new(vec![explode], Vec::new())).unwrap();
    let err = with_thread(&ctx, thread, |t| {
        t.start(&ctx).unwrap();
        t.join().unwrap_err()
    });
    assert!(matches!(err, KernelError::ThreadPanicked(ref message) if message.contains("boom")), "{err}");
}

#[test]
fn unknown_thread_is_unresolved() {
    let mut ctx = context();
    let mut base = NodeBase::new();
    base.add_start_up(ctx.register_action(ThreadControl::start(ThreadId::new(7))).unwrap());
    let root = ctx.register_node(Once::with_base(base)).unwrap();
    let err = Executor::new(&mut ctx).run(root).unwrap_err();
    assert!(matches!(err, KernelError::Unresolved { kind: "thread", id: 7 }), "{err}");
}

#[test]
fn threads_are_named_after_the_database() {
    let settings = ThreadSettings { stack_size: 256 * 1024, name_prefix: "worker".into() };
    let ctx = ExecutionContext::with_settings(
        Arc::new(MemoryTransaction::new()),
        Database::new(3, "sales"),
        settings,
    );
    let (seen_tx, seen) = mpsc::channel();
    let reporter = ctx.register_action(NameReporter { seen: seen_tx, state: ActionState::default() }).unwrap();
    let thread = ctx.register_thread(Thread::new(vec![reporter], Vec::new())).unwrap();
    with_thread(&ctx, thread, |t| {
        t.start(&ctx).unwrap();
        t.join().unwrap();
    });
    assert_eq!(seen.recv().unwrap().as_deref(), Some("worker-3"));
}

/// Reports the name of the thread it runs on.
#[derive(Debug)]
struct NameReporter {
    seen: mpsc::Sender<Option<String>>,
    state: ActionState,
}

impl Action for NameReporter {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put("thread name");
    }
    fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn terminate(&mut self, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self, _ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        let name = std::thread::current().name().map(str::to_owned);
        self.seen.send(name).map_err(|_| KernelError::unexpected("name receiver gone"))?;
        Ok(self.state.done(Status::Success))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::CheckCancel
    }
}
