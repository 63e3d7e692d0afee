//! # Dispatcher Module
//!
//! Execution machinery shared by routers and routes.
//!
//! ## Overview
//!
//! - [`Scheduler`]: a single-threaded trampoline with an immediate queue and
//!   a deferred ("next tick") queue.
//! - [`Next`]: the one-shot continuation every handler receives.
//! - [`Handler`], [`ErrorHandler`], [`ParamHook`]: the user-facing traits,
//!   plus [`from_fn`], [`error_fn`] and [`hook_fn`] closure adapters.
//!
//! ## Execution model
//!
//! A request never runs on more than one thread. All continuations of a
//! request are queued on its scheduler, so a chain of thousands of
//! synchronous handlers runs in constant native stack depth. Handlers that
//! need to wait call [`Next::defer`] or stash the continuation and fire it
//! from a later scheduler task.

mod handler;
mod next;
mod scheduler;

pub use handler::{
    error_fn, from_fn, hook_fn, Callback, ErrorHandler, FnErrorHandler, FnHandler, FnParamHook,
    Handler, ParamHook,
};
pub use next::Next;
pub use scheduler::{Scheduler, MAX_SYNC_CONTINUATIONS};

pub(crate) use next::{invoke_guarded, Resume};
pub(crate) use scheduler::{SyncGuard, WeakScheduler};
