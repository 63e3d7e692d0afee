//! Parameter hooks.
//!
//! Before a matched layer runs, every named capture that has hooks
//! registered on the router runs them in order. Each hook must resume its
//! continuation before the next hook (or the next name) starts.
//!
//! Results are memoised per request and name. When the same name comes up
//! again with the same value, or after a hook for it failed with anything
//! but `SkipRoute`, the hooks are not re-run. The stored value is put back on
//! the request and the stored signal is raised again. The memo lives on the
//! [`Exchange`], so nested routers matching the same segment share it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use super::core::Router;
use super::params::ParamKey;
use crate::dispatcher::{invoke_guarded, Next, ParamHook, Resume, WeakScheduler};
use crate::error::Signal;
use crate::server::Exchange;

/// What happened the first time a name was processed in this request.
#[derive(Debug, Clone)]
pub(crate) struct ParamMemo {
    matched: String,
    value: Option<String>,
    error: Option<Signal>,
}

impl ParamMemo {
    fn reusable_for(&self, value: &str) -> bool {
        self.matched == value
            || self
                .error
                .as_ref()
                .is_some_and(|e| !matches!(e, Signal::SkipRoute))
    }
}

pub(crate) type ParamMemos = HashMap<Arc<str>, ParamMemo>;

struct Current {
    name: Arc<str>,
    value: String,
    hooks: Vec<Arc<dyn ParamHook>>,
    index: usize,
}

struct ParamRun {
    router: Router,
    keys: Vec<Arc<str>>,
    next_key: usize,
    current: Option<Current>,
    exchange: Exchange,
    scheduler: WeakScheduler,
    done: Option<Box<dyn FnOnce(Resume)>>,
}

/// Run the hooks for `keys`, then call `done`.
///
/// `done` receives `Next(None)` when every hook passed, `Next(Some(signal))`
/// when one failed or skipped, and `Finished` when a hook ended the request.
/// With nothing to run, `done` is called before this returns.
pub(crate) fn process_params(
    router: &Router,
    keys: Vec<Arc<str>>,
    exchange: Exchange,
    scheduler: WeakScheduler,
    done: Box<dyn FnOnce(Resume)>,
) {
    if keys.is_empty() || !router.has_param_hooks() {
        done(Resume::Next(None));
        return;
    }
    let run = Rc::new(RefCell::new(ParamRun {
        router: router.clone(),
        keys,
        next_key: 0,
        current: None,
        exchange,
        scheduler,
        done: Some(done),
    }));
    param(&run, None);
}

fn finish(run: &Rc<RefCell<ParamRun>>, outcome: Resume) {
    let done = run.borrow_mut().done.take();
    if let Some(done) = done {
        done(outcome);
    }
}

/// Advance to the next name that needs its hooks run.
fn param(run: &Rc<RefCell<ParamRun>>, err: Option<Signal>) {
    if err.is_some() {
        return finish(run, Resume::Next(err));
    }

    loop {
        let mut state = run.borrow_mut();
        let Some(name) = state.keys.get(state.next_key).cloned() else {
            drop(state);
            return finish(run, Resume::Next(None));
        };
        state.next_key += 1;

        let hooks = match state.router.param_hooks(&name) {
            Some(hooks) if !hooks.is_empty() => hooks.to_vec(),
            _ => continue,
        };
        let value = match state
            .exchange
            .with(|req, _| req.params.get(&name).map(str::to_owned))
        {
            Ok(Some(value)) => value,
            _ => continue,
        };

        let memos = state.exchange.param_memos();
        let memo = memos.borrow().get(&name).cloned();
        if let Some(memo) = memo.filter(|m| m.reusable_for(&value)) {
            debug!(param = %name, value = %value, "param hooks already ran");
            let key = ParamKey::Name(Arc::clone(&name));
            state.exchange.enter("restore param", |req, _| match memo.value {
                Some(stored) => req.params.set(key, stored),
                None => {
                    req.params.remove(&key);
                }
            });
            if memo.error.is_some() {
                drop(state);
                return finish(run, Resume::Next(memo.error));
            }
            continue;
        }

        memos.borrow_mut().insert(
            Arc::clone(&name),
            ParamMemo {
                matched: value.clone(),
                value: Some(value.clone()),
                error: None,
            },
        );
        state.current = Some(Current {
            name,
            value,
            hooks,
            index: 0,
        });
        drop(state);
        return hook_step(run, None);
    }
}

/// Run the next hook of the current name, recording the outcome of the
/// previous one.
fn hook_step(run: &Rc<RefCell<ParamRun>>, err: Option<Signal>) {
    let mut state = run.borrow_mut();
    let exchange = state.exchange.clone();
    let Some(current) = state.current.as_mut() else {
        drop(state);
        return param(run, err);
    };
    let name = Arc::clone(&current.name);
    let value = current.value.clone();
    let hook = current.hooks.get(current.index).cloned();
    current.index += 1;

    let now = exchange
        .with(|req, _| req.params.get(&name).map(str::to_owned))
        .ok()
        .flatten();
    if let Some(memo) = exchange.param_memos().borrow_mut().get_mut(&name) {
        memo.value = now;
        if err.is_some() {
            memo.error = err.clone();
        }
    }

    if err.is_some() {
        drop(state);
        return param(run, err);
    }
    let Some(hook) = hook else {
        drop(state);
        return param(run, None);
    };

    let scheduler = state.scheduler.clone();
    drop(state);

    let resume_run = Rc::clone(run);
    let next = Next::from_weak(
        scheduler,
        exchange.clone(),
        Box::new(move |outcome| match outcome {
            Resume::Next(signal) => hook_step(&resume_run, signal),
            Resume::Finished => finish(&resume_run, Resume::Finished),
        }),
    );
    debug!(param = %name, value = %value, "running param hook");
    exchange.enter("param hook", |req, res| {
        invoke_guarded(next, "param hook", |next| {
            hook.call(req, res, next, &value, &name)
        });
    });
}
