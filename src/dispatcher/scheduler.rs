//! Single-threaded trampoline that drives every continuation of a request.
//!
//! # Overview
//!
//! Continuations never call each other directly. Firing a [`Next`](super::Next)
//! pushes a task onto the *immediate* queue and returns, so the native stack
//! stays flat no matter how long the handler chain is. Work that must wait
//! for "the next turn" goes to the *deferred* queue instead.
//!
//! [`Scheduler::run`] drains the immediate queue first; only when it is empty
//! does it pop a deferred task, and each deferred task starts a new tick.
//! The recursion guard in the dispatch loops counts continuations per tick.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

type Task = Box<dyn FnOnce()>;

pub(crate) struct SchedulerInner {
    now: RefCell<VecDeque<Task>>,
    later: RefCell<VecDeque<Task>>,
    ticks: Cell<u64>,
}

/// Task queue owned by one request (or one test) and drained by [`Scheduler::run`].
///
/// Cloning is cheap; clones share the same queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// Create an empty scheduler at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                now: RefCell::new(VecDeque::new()),
                later: RefCell::new(VecDeque::new()),
                ticks: Cell::new(0),
            }),
        }
    }

    /// Queue `task` for a later tick.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.later.borrow_mut().push_back(Box::new(task));
    }

    /// Number of deferred tasks started so far.
    #[must_use]
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.get()
    }

    /// Whether both queues are empty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.now.borrow().is_empty() && self.inner.later.borrow().is_empty()
    }

    /// Run queued tasks until both queues are empty.
    pub fn run(&self) {
        loop {
            let immediate = self.inner.now.borrow_mut().pop_front();
            if let Some(task) = immediate {
                task();
                continue;
            }
            let deferred = self.inner.later.borrow_mut().pop_front();
            match deferred {
                Some(task) => {
                    self.inner.ticks.set(self.inner.ticks.get() + 1);
                    task();
                }
                None => break,
            }
        }
    }

    pub(crate) fn push_now(&self, task: impl FnOnce() + 'static) {
        self.inner.now.borrow_mut().push_back(Box::new(task));
    }

    pub(crate) fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("ticks", &self.ticks())
            .field("now", &self.inner.now.borrow().len())
            .field("later", &self.inner.later.borrow().len())
            .finish()
    }
}

/// Non-owning handle held by continuations so queued work never keeps the
/// scheduler alive on its own.
#[derive(Clone)]
pub(crate) struct WeakScheduler {
    inner: Weak<SchedulerInner>,
}

impl WeakScheduler {
    pub(crate) fn upgrade(&self) -> Option<Scheduler> {
        self.inner.upgrade().map(|inner| Scheduler { inner })
    }
}

/// Continuations a dispatch loop may run in one tick before it defers.
pub const MAX_SYNC_CONTINUATIONS: u32 = 100;

/// Per-loop counter of continuations run within the current tick.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SyncGuard {
    count: u32,
    tick: u64,
}

impl SyncGuard {
    pub(crate) fn new(tick: u64) -> Self {
        Self { count: 0, tick }
    }

    /// Count one continuation at `tick`; `true` means the loop must defer.
    pub(crate) fn exceeded(&mut self, tick: u64) -> bool {
        if tick != self.tick {
            self.tick = tick;
            self.count = 0;
        }
        self.count += 1;
        self.count > MAX_SYNC_CONTINUATIONS
    }
}
