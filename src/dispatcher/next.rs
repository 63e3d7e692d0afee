//! Continuations handed to handlers.
//!
//! A [`Next`] fires at most once. Firing it queues the resumption on the
//! scheduler rather than running it inline. When the last handle to an
//! unfired continuation goes away, it fires `Finished` instead, which tells
//! the owning loop that the request was completed without advancing. That is
//! what lets `done` fire exactly once on every path.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::cell::RefCell;
use std::rc::Rc;

use tracing::error;

use super::scheduler::{Scheduler, WeakScheduler};
use crate::error::{Error, Signal};
use crate::server::Exchange;

/// How a continuation was resolved.
#[derive(Debug)]
pub(crate) enum Resume {
    /// `next(signal)` was called.
    Next(Option<Signal>),
    /// The continuation was dropped without being called.
    Finished,
}

pub(crate) type Continuation = Box<dyn FnOnce(Resume)>;

pub(crate) struct Link {
    scheduler: WeakScheduler,
    exchange: Exchange,
    resume: RefCell<Option<Continuation>>,
}

impl Link {
    /// Queue the continuation with `outcome`. Returns `false` if it had
    /// already fired.
    pub(crate) fn fire(&self, outcome: Resume) -> bool {
        let Some(resume) = self.resume.borrow_mut().take() else {
            return false;
        };
        // Without a scheduler the request is being torn down; dropping the
        // continuation releases whatever it captured.
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.push_now(move || resume(outcome));
        }
        true
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.fire(Resume::Finished);
    }
}

/// Continuation passed to every handler, error handler and param hook.
///
/// Calling one of the consuming methods advances the chain. Dropping it
/// without a call means "this request is handled".
pub struct Next {
    link: Rc<Link>,
}

impl Next {
    pub(crate) fn new(scheduler: &Scheduler, exchange: Exchange, resume: Continuation) -> Self {
        Self::from_weak(scheduler.downgrade(), exchange, resume)
    }

    pub(crate) fn from_weak(
        scheduler: WeakScheduler,
        exchange: Exchange,
        resume: Continuation,
    ) -> Self {
        Self {
            link: Rc::new(Link {
                scheduler,
                exchange,
                resume: RefCell::new(Some(resume)),
            }),
        }
    }

    /// Continue with the next matching layer.
    pub fn call(self) {
        self.resume(None);
    }

    /// Continue in error mode.
    pub fn fail(self, err: impl Into<Error>) {
        self.resume(Some(Signal::Error(err.into())));
    }

    /// Skip the remaining layers of the current Route.
    pub fn skip_route(self) {
        self.resume(Some(Signal::SkipRoute));
    }

    /// Leave the current Router without an error.
    pub fn skip_router(self) {
        self.resume(Some(Signal::SkipRouter));
    }

    /// Resume the owning loop with an explicit signal; `None` is the same
    /// as [`call`](Self::call).
    pub fn resume(self, signal: Option<Signal>) {
        self.link.fire(Resume::Next(signal));
    }

    /// Mark the request handled. Equivalent to dropping `self`.
    pub fn finish(self) {
        self.link.fire(Resume::Finished);
    }

    /// Handle to the request/response pair, for continuations that run on a
    /// later tick.
    #[must_use]
    pub fn exchange(&self) -> Exchange {
        self.link.exchange.clone()
    }

    /// Scheduler driving this request, if it is still alive.
    #[must_use]
    pub fn scheduler(&self) -> Option<Scheduler> {
        self.link.scheduler.upgrade()
    }

    /// Hand `self` to `task` on a later scheduler tick.
    pub fn defer(self, task: impl FnOnce(Next) + 'static) {
        if let Some(scheduler) = self.scheduler() {
            scheduler.defer(move || task(self));
        }
    }

    pub(crate) fn deliver(self, outcome: Resume) {
        self.link.fire(outcome);
    }

    pub(crate) fn weak_scheduler(&self) -> WeakScheduler {
        self.link.scheduler.clone()
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("pending", &self.link.resume.borrow().is_some())
            .finish()
    }
}

/// Run user code that owns `next`, converting an `Err` return or a panic into
/// `next(err)`.
///
/// The guard keeps the link alive across the call, so a continuation the
/// handler dropped is only reported as `Finished` once we know the handler
/// did not fail.
pub(crate) fn invoke_guarded<F>(next: Next, what: &str, f: F)
where
    F: FnOnce(Next) -> Result<(), Error>,
{
    let guard = Rc::clone(&next.link);
    let failure = match catch_unwind(AssertUnwindSafe(|| f(next))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(handler = %what, panic_message = %message, "Handler panicked");
            Some(Error::Panic(message))
        }
    };
    if let Some(err) = failure {
        let message = err.to_string();
        if !guard.fire(Resume::Next(Some(Signal::Error(err)))) {
            error!(
                handler = %what,
                error = %message,
                "Handler failed after its continuation was already used"
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, Continuation) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let cont: Continuation = Box::new(move |outcome| {
            let text = match outcome {
                Resume::Finished => "finished".to_string(),
                Resume::Next(None) => "next".to_string(),
                Resume::Next(Some(Signal::SkipRoute)) => "route".to_string(),
                Resume::Next(Some(Signal::SkipRouter)) => "router".to_string(),
                Resume::Next(Some(Signal::Error(e))) => format!("error:{e}"),
            };
            l.borrow_mut().push(text);
        });
        (log, cont)
    }

    #[test]
    fn test_call_is_queued_not_inline() {
        let sched = Scheduler::new();
        let (log, cont) = recorder();
        let next = Next::new(&sched, Exchange::default(), cont);
        next.call();
        assert!(log.borrow().is_empty());
        sched.run();
        assert_eq!(*log.borrow(), vec!["next"]);
    }

    #[test]
    fn test_drop_fires_finished_once() {
        let sched = Scheduler::new();
        let (log, cont) = recorder();
        drop(Next::new(&sched, Exchange::default(), cont));
        sched.run();
        assert_eq!(*log.borrow(), vec!["finished"]);
    }

    #[test]
    fn test_err_return_becomes_error_signal() {
        let sched = Scheduler::new();
        let (log, cont) = recorder();
        let next = Next::new(&sched, Exchange::default(), cont);
        invoke_guarded(next, "failing", |_next| {
            Err(Error::Config("boom".into()))
        });
        sched.run();
        assert_eq!(*log.borrow(), vec!["error:configuration error: boom"]);
    }

    #[test]
    fn test_panic_becomes_error_signal() {
        let sched = Scheduler::new();
        let (log, cont) = recorder();
        let next = Next::new(&sched, Exchange::default(), cont);
        invoke_guarded(next, "panicking", |_next| panic!("kaboom"));
        sched.run();
        assert_eq!(*log.borrow(), vec!["error:handler panicked: kaboom"]);
    }

    #[test]
    fn test_error_after_call_does_not_fire_twice() {
        let sched = Scheduler::new();
        let (log, cont) = recorder();
        let next = Next::new(&sched, Exchange::default(), cont);
        invoke_guarded(next, "late", |next| {
            next.call();
            Err(Error::Config("late".into()))
        });
        sched.run();
        assert_eq!(*log.borrow(), vec!["next"]);
    }

    #[test]
    fn test_defer_runs_on_later_tick() {
        let sched = Scheduler::new();
        let (log, cont) = recorder();
        let next = Next::new(&sched, Exchange::default(), cont);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let sc = sched.clone();
        next.defer(move |next| {
            s.set(sc.ticks());
            next.call();
        });
        sched.run();
        assert_eq!(seen.get(), 1);
        assert_eq!(*log.borrow(), vec!["next"]);
    }
}
