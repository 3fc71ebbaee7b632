//! Loop execution context and its start/stop/wait/detach state machine.
//!
//! At most one execution context is attached to an engine. An inline run
//! attaches a context without a thread; an async run attaches one together
//! with the join handle of the thread driving it. The state reported by
//! [`LoopController::state`] is derived from the attached context:
//!
//! ```text
//! Idle ──start──▶ Running ──request_stop──▶ StopRequested
//!                    │                            │
//!                    └──────── loop exits ────────┴──▶ Stopped ──wait/detach──▶ Idle
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::error::{panic_message, EngineError, EngineResult};

/// Token that signals cooperative cancellation to a frame loop.
///
/// Cloning a token creates another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Observable state of the engine's frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No execution context attached.
    Idle,
    Running,
    /// Stop was signalled; the loop exits at its next iteration.
    StopRequested,
    /// The loop exited; an async context waits to be joined or detached.
    Stopped,
}

/// State shared between the controller and the code driving one loop.
#[derive(Debug, Default)]
pub(crate) struct ExecutionContext {
    token: StopToken,
    finished: AtomicBool,
    /// Result of the joined loop thread, published for every waiter
    outcome: Mutex<Option<EngineResult<()>>>,
    joined: Condvar,
}

impl ExecutionContext {
    pub fn token(&self) -> &StopToken {
        &self.token
    }

    /// Mark the loop as exited (teardown included).
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn state(&self) -> LoopState {
        if self.finished.load(Ordering::Acquire) {
            LoopState::Stopped
        } else if self.token.is_cancelled() {
            LoopState::StopRequested
        } else {
            LoopState::Running
        }
    }

    fn publish(&self, result: EngineResult<()>) {
        *self.outcome.lock() = Some(result);
        self.joined.notify_all();
    }

    /// Block until the joining waiter publishes the loop result.
    fn outcome(&self) -> EngineResult<()> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.joined.wait(&mut outcome);
        }
    }
}

type LoopThread = JoinHandle<EngineResult<()>>;

enum Driver {
    /// Run on the caller's thread by `run`
    Inline,
    /// Background thread nobody is waiting on yet
    Spawned(LoopThread),
    /// A waiter has taken the handle and is joining it
    Joining,
}

struct Attached {
    context: Arc<ExecutionContext>,
    driver: Driver,
    /// Thread driving the loop, `None` for inline runs
    loop_thread: Option<ThreadId>,
}

enum Waiter {
    Join(Arc<ExecutionContext>, LoopThread),
    Follow(Arc<ExecutionContext>),
}

#[derive(Default)]
pub(crate) struct LoopController {
    slot: Mutex<Option<Attached>>,
}

impl LoopController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a context for a loop run on the caller's thread.
    pub fn attach_inline(&self) -> EngineResult<Arc<ExecutionContext>> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let context = Arc::new(ExecutionContext::default());
        *slot = Some(Attached {
            context: Arc::clone(&context),
            driver: Driver::Inline,
            loop_thread: None,
        });
        Ok(context)
    }

    /// Attach a context and start the thread that drives it.
    ///
    /// `spawn` runs under the controller lock, so no other start can slip in
    /// between the check and the attach.
    pub fn attach_spawned<S>(&self, spawn: S) -> EngineResult<()>
    where
        S: FnOnce(Arc<ExecutionContext>) -> std::io::Result<LoopThread>,
    {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let context = Arc::new(ExecutionContext::default());
        let thread = spawn(Arc::clone(&context))?;
        *slot = Some(Attached {
            context,
            loop_thread: Some(thread.thread().id()),
            driver: Driver::Spawned(thread),
        });
        Ok(())
    }

    /// Detach `context` if it is still the attached one.
    pub fn release(&self, context: &Arc<ExecutionContext>) {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|attached| Arc::ptr_eq(&attached.context, context))
        {
            *slot = None;
        }
    }

    /// Signal the attached context to stop. Does not block.
    pub fn request_stop(&self) {
        if let Some(attached) = self.slot.lock().as_ref() {
            attached.context.token.cancel();
        }
    }

    /// Block until the attached async loop exits and return its result.
    ///
    /// Concurrent waiters all block until the loop exits and all receive its
    /// result. The first one joins the thread; the others wait for it to
    /// publish the outcome.
    pub fn wait(&self) -> EngineResult<()> {
        let waiter = {
            let mut slot = self.slot.lock();
            let Some(attached) = slot.as_mut() else {
                return Ok(());
            };
            if attached.loop_thread == Some(thread::current().id()) {
                return Err(EngineError::WaitFromLoopThread);
            }
            match std::mem::replace(&mut attached.driver, Driver::Joining) {
                Driver::Spawned(thread) => Waiter::Join(Arc::clone(&attached.context), thread),
                Driver::Joining => Waiter::Follow(Arc::clone(&attached.context)),
                Driver::Inline => {
                    attached.driver = Driver::Inline;
                    return Ok(());
                }
            }
        };

        match waiter {
            Waiter::Join(context, thread) => {
                let result = thread.join().unwrap_or_else(|payload| {
                    Err(EngineError::LoopPanicked(panic_message(payload.as_ref())))
                });
                context.publish(result.clone());
                self.release(&context);
                result
            }
            Waiter::Follow(context) => context.outcome(),
        }
    }

    /// Give up the join obligation. The loop keeps running on its own.
    ///
    /// Inline contexts are owned by the caller running them and stay attached,
    /// as do contexts a waiter is already joining.
    pub fn detach(&self) {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|attached| matches!(attached.driver, Driver::Spawned(_)))
        {
            // Dropping the join handle detaches the thread.
            *slot = None;
        }
    }

    pub fn state(&self) -> LoopState {
        self.slot
            .lock()
            .as_ref()
            .map_or(LoopState::Idle, |attached| attached.context.state())
    }
}
