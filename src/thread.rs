//! Sub-plans running on their own OS thread.
//!
//! A [`Thread`] owns the ids of an action list. `start` forks the execution
//! context (same registered objects, private variables), spawns a native
//! thread that runs the list to completion, and keeps the join handle. The
//! outcome travels back as a `Result` and is translated exactly once, at join.

use std::any::Any;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{ActionList, Status};
use crate::arena::{ActionId, VarId};
use crate::context::ExecutionContext;
use crate::error::{KernelError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Created,
    Running,
    Joined,
}

#[derive(Debug)]
pub struct Thread {
    list: Vec<ActionId>,
    return_data: Vec<VarId>,
    handle: Option<JoinHandle<Result<()>>>,
    state: ThreadState,
}

/// Constructor-time configuration of a thread.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadArchive {
    pub list: Vec<ActionId>,
    pub return_data: Vec<VarId>,
}

impl Thread {
    /// `return_data` names variables copied back to the starting context
    /// once the list has run.
    pub fn new(list: Vec<ActionId>, return_data: Vec<VarId>) -> Self {
        Self { list, return_data, handle: None, state: ThreadState::Created }
    }
    pub fn state(&self) -> ThreadState {
        self.state
    }
    pub fn archive(&self) -> ThreadArchive {
        ThreadArchive { list: self.list.clone(), return_data: self.return_data.clone() }
    }

    pub fn start(&mut self, ctx: &ExecutionContext) -> Result<()> {
        if self.state != ThreadState::Created {
            return Err(KernelError::unexpected("a thread can only be started once"));
        }
        let mut sub = ctx.fork(&self.return_data);
        let list = self.list.clone();
        let settings = ctx.thread_settings();
        let name = format!("{}-{}", settings.name_prefix, ctx.get_database().id);
        let handle = std::thread::Builder::new()
            .name(name)
            .stack_size(settings.stack_size)
            .spawn(move || run(&mut sub, &list))?;
        debug!(actions = self.list.len(), "thread started");
        self.handle = Some(handle);
        self.state = ThreadState::Running;
        Ok(())
    }

    /// Blocks until the thread ends and maps its outcome: normal completion
    /// and cancellation give `Success`, any other error is returned as is,
    /// and a panic becomes `ThreadPanicked`. A thread is joined once.
    pub fn join(&mut self) -> Result<Status> {
        let Some(handle) = self.handle.take() else {
            return Err(KernelError::unexpected(match self.state {
                ThreadState::Created => "thread joined before start",
                _ => "thread joined twice",
            }));
        };
        self.state = ThreadState::Joined;
        outcome(handle.join())
    }

    /// Joins a thread left running by a failed statement, discarding its
    /// outcome. Does nothing unless the thread is running.
    pub fn reap(&mut self) {
        if self.state != ThreadState::Running {
            return;
        }
        match self.join() {
            Ok(_) => debug!("abandoned thread joined"),
            Err(e) => debug!(error = %e, "abandoned thread failed"),
        }
    }

    /// Joins when the thread has already ended, otherwise answers `False`
    /// without blocking.
    pub fn check_exit_status(&mut self) -> Result<Status> {
        if self.handle.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(Status::False);
        }
        self.join()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.state == ThreadState::Running {
            warn!("thread dropped without join, joining");
            self.reap();
        }
    }
}

// The body of the native thread.
fn run(sub: &mut ExecutionContext, ids: &[ActionId]) -> Result<()> {
    let mut list = ActionList::from_ids(ids);
    let result = (|| {
        sub.reset_data()?;
        list.initialize(sub)?;
        list.execute(sub)?;
        sub.return_data()?;
        list.finish(sub)?;
        list.terminate(sub)
    })();
    if let Err(e) = result {
        if let Err(secondary) = list.terminate(sub) {
            debug!(error = %secondary, "cleanup after thread failure failed");
        }
        return Err(e);
    }
    Ok(())
}

fn outcome(joined: std::thread::Result<Result<()>>) -> Result<Status> {
    match joined {
        Ok(Ok(())) => Ok(Status::Success),
        Ok(Err(e)) if e.is_cancel() => {
            info!("cancellation absorbed at thread join");
            Ok(Status::Success)
        }
        Ok(Err(e)) => Err(e),
        Err(payload) => Err(KernelError::ThreadPanicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}
