//! Actions driving sub-plan threads.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionState, ListControl, Status};
use crate::archive::ActionArchive;
use crate::arena::ThreadId;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::explain::Explain;
use crate::holder::ThreadHolder;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadCommand {
    Start,
    Join,
    /// Non-blocking join; `False` while the thread still runs.
    CheckExitStatus,
}

#[derive(Debug)]
pub struct ThreadControl {
    command: ThreadCommand,
    thread: ThreadHolder,
    state: ActionState,
}

impl ThreadControl {
    pub fn new(command: ThreadCommand, thread: ThreadId) -> Self {
        Self { command, thread: ThreadHolder::new(thread), state: ActionState::default() }
    }
    pub fn start(thread: ThreadId) -> Self {
        Self::new(ThreadCommand::Start, thread)
    }
    pub fn join(thread: ThreadId) -> Self {
        Self::new(ThreadCommand::Join, thread)
    }
    pub fn check_exit_status(thread: ThreadId) -> Self {
        Self::new(ThreadCommand::CheckExitStatus, thread)
    }
}

impl Action for ThreadControl {
    fn explain(&self, _ctx: &ExecutionContext, explain: &mut Explain) {
        explain.put(match self.command {
            ThreadCommand::Start => "start ",
            ThreadCommand::Join => "join ",
            ThreadCommand::CheckExitStatus => "check exit status ",
        });
        self.thread.explain(explain);
    }
    fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        self.thread.initialize(ctx)
    }
    /// A thread still running here belongs to a statement that failed
    /// before its join; it is joined before the binding is released.
    fn terminate(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        if self.thread.is_initialized() {
            self.thread.lock()?.reap();
        }
        self.thread.terminate(ctx)
    }
    fn execute(&mut self, ctx: &mut ExecutionContext, _control: &mut ListControl) -> Result<Status> {
        if self.state.is_done() {
            return Ok(self.state.status());
        }
        let status = {
            let mut thread = self.thread.lock()?;
            match self.command {
                ThreadCommand::Start => {
                    thread.start(ctx)?;
                    Status::Success
                }
                ThreadCommand::Join => thread.join()?,
                ThreadCommand::CheckExitStatus => thread.check_exit_status()?,
            }
        };
        // a running thread is polled again on the next call
        if status == Status::False {
            return Ok(status);
        }
        Ok(self.state.done(status))
    }
    fn state(&self) -> &ActionState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ActionState {
        &mut self.state
    }
    fn archive(&self) -> ActionArchive {
        ActionArchive::ThreadControl { command: self.command, thread: self.thread.id() }
    }
}
