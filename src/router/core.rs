//! Router core: the layer stack and its dispatch loop.
//!
//! # Dispatch
//!
//! A dispatch walks the stack in registration order. For each continuation
//! it:
//!
//! 1. undoes the URL rewrite of the previous middleware layer,
//! 2. scans forward for the next layer whose pattern matches the pathname
//!    (route layers additionally need the method, and are skipped while an
//!    error is pending),
//! 3. runs the parameter hooks for the layer's named captures,
//! 4. hands the request to the route, or trims the mount prefix from `url`,
//!    extends `base_url`, and calls the middleware.
//!
//! When nothing is left the router restores the `base_url` and `params` it
//! was entered with and resumes its caller exactly once. An `OPTIONS`
//! request that nothing handled gets an automatic `Allow` response built
//! from the routes whose path matched.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{debug, warn};

use super::hooks;
use super::layer::{Endpoint, Layer};
use super::matcher::MatchOptions;
use super::params::{ParamKey, Params};
use super::route::Route;
use crate::config::RouterOptions;
use crate::dispatcher::{
    Callback, ErrorHandler, Handler, Next, ParamHook, Resume, Scheduler, SyncGuard,
    WeakScheduler,
};
use crate::error::{Error, Signal};
use crate::server::{Exchange, Outcome, Request, Response};

#[derive(Clone, Default)]
struct RouterInner {
    stack: Vec<Layer>,
    params: HashMap<Arc<str>, Vec<Arc<dyn ParamHook>>>,
    options: RouterOptions,
}

/// Ordered stack of middleware, routes and mounted routers.
///
/// Registration takes `&mut self`; dispatch takes `&self` and never mutates
/// the stack, so one router can serve any number of requests. Cloning is
/// cheap. Registering on a router after a clone of it was mounted elsewhere
/// leaves the mounted copy unchanged.
///
/// ```rust
/// use stackrouter::{from_fn, Request, Router};
///
/// let mut api = Router::new();
/// api.get("/users/:id", from_fn(|req, res, _next| {
///     let id = req.param("id").unwrap_or_default().to_string();
///     res.send(format!("user {id}"));
///     Ok(())
/// }))?;
///
/// let mut app = Router::new();
/// app.mount("/api", api)?;
///
/// let served = app.serve(Request::new("GET", "/api/users/7")?);
/// assert_eq!(served.response.body_text(), "user 7");
/// # Ok::<(), stackrouter::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct Router {
    inner: Arc<RouterInner>,
}

macro_rules! router_verb {
    ($fn_name:ident, $route_fn:ident) => {
        #[doc = concat!("Shorthand for `route(path)?.", stringify!($route_fn), "(handler)`.")]
        pub fn $fn_name<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, Error> {
            self.route(path)?.$route_fn(handler);
            Ok(self)
        }
    };
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                options,
                ..RouterInner::default()
            }),
        }
    }

    /// Matching and parameter options this router was built with.
    #[must_use]
    pub fn settings(&self) -> &RouterOptions {
        &self.inner.options
    }

    /// Registered layers in order.
    #[must_use]
    pub fn stack(&self) -> &[Layer] {
        &self.inner.stack
    }

    /// Mount `callbacks` under `path`, one prefix-mode layer each.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an empty list, [`Error::Pattern`] when `path`
    /// does not compile.
    pub fn use_at(
        &mut self,
        path: &str,
        callbacks: impl IntoIterator<Item = Callback>,
    ) -> Result<&mut Self, Error> {
        let options = MatchOptions::prefix(self.inner.options.case_sensitive);
        let mut layers = Vec::new();
        for callback in callbacks {
            debug!(path = %path, handler = %callback.name(), "use");
            layers.push(Layer::new(path, options, Endpoint::Middleware(callback))?);
        }
        if layers.is_empty() {
            return Err(Error::Config(format!(
                "use_at(\"{path}\") requires at least one handler"
            )));
        }
        Arc::make_mut(&mut self.inner).stack.extend(layers);
        Ok(self)
    }

    /// Mount `callbacks` at `/`.
    pub fn use_all(
        &mut self,
        callbacks: impl IntoIterator<Item = Callback>,
    ) -> Result<&mut Self, Error> {
        self.use_at("/", callbacks)
    }

    /// Mount one handler at `/`.
    pub fn use_handler<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.push_root(Callback::handler(handler))
    }

    /// Mount one error handler at `/`.
    pub fn use_error<H: ErrorHandler>(&mut self, handler: H) -> &mut Self {
        self.push_root(Callback::error(handler))
    }

    /// Mount one handler (usually another [`Router`]) under `path`.
    pub fn mount<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, Error> {
        self.use_at(path, [Callback::handler(handler)])
    }

    fn push_root(&mut self, callback: Callback) -> &mut Self {
        debug!(path = "/", handler = %callback.name(), "use");
        Arc::make_mut(&mut self.inner)
            .stack
            .push(Layer::at_root(callback));
        self
    }

    /// Declare a route for `path` and return it for method registration.
    ///
    /// # Errors
    ///
    /// [`Error::Pattern`] when `path` does not compile.
    pub fn route(&mut self, path: &str) -> Result<&mut Route, Error> {
        let options = MatchOptions::exact(
            self.inner.options.case_sensitive,
            self.inner.options.strict,
        );
        let layer = Layer::new(path, options, Endpoint::Route(Route::new(path)))?;
        let stack = &mut Arc::make_mut(&mut self.inner).stack;
        stack.push(layer);
        match stack.last_mut().map(Layer::endpoint_mut) {
            Some(Endpoint::Route(route)) => Ok(route),
            _ => Err(Error::Config(format!("route \"{path}\" was not registered"))),
        }
    }

    router_verb!(get, get);
    router_verb!(post, post);
    router_verb!(put, put);
    router_verb!(delete, delete);
    router_verb!(patch, patch);
    router_verb!(head, head);
    router_verb!(options, options);
    router_verb!(trace, trace);
    router_verb!(connect, connect);
    router_verb!(all, all);

    /// Register a hook for the named path parameter.
    ///
    /// Hooks for one name run in registration order, at most once per
    /// request and value.
    pub fn param<H: ParamHook>(&mut self, name: &str, hook: H) -> &mut Self {
        let name = match name.strip_prefix(':') {
            Some(stripped) => {
                warn!(
                    param = %name,
                    replacement = %stripped,
                    "leading ':' in param hook name is deprecated"
                );
                stripped
            }
            None => name,
        };
        Arc::make_mut(&mut self.inner)
            .params
            .entry(Arc::from(name))
            .or_default()
            .push(Arc::new(hook));
        self
    }

    pub(crate) fn has_param_hooks(&self) -> bool {
        !self.inner.params.is_empty()
    }

    pub(crate) fn param_hooks(&self, name: &str) -> Option<&[Arc<dyn ParamHook>]> {
        self.inner.params.get(name).map(Vec::as_slice)
    }

    /// Dispatch the request in `exchange`, calling `done` exactly once when
    /// the router is finished with it.
    ///
    /// Work is queued on `scheduler`; nothing runs until the caller drives
    /// [`Scheduler::run`].
    pub fn dispatch(
        &self,
        exchange: &Exchange,
        scheduler: &Scheduler,
        done: impl FnOnce(Outcome) + 'static,
    ) {
        let mut done = Some(done);
        let started = exchange.with(|req, _| {
            if let Some(done) = done.take() {
                let done: Box<dyn FnOnce(Resume)> = Box::new(move |outcome| {
                    done(match outcome {
                        Resume::Finished => Outcome::Handled,
                        Resume::Next(Some(Signal::Error(err))) => Outcome::Failed(err),
                        Resume::Next(_) => Outcome::Unhandled,
                    });
                });
                self.start(req, exchange.clone(), scheduler, done);
            }
        });
        if let Err(err) = started {
            if let Some(done) = done.take() {
                done(Outcome::Failed(err));
            }
        }
    }

    fn start(
        &self,
        req: &mut Request,
        exchange: Exchange,
        scheduler: &Scheduler,
        done: Box<dyn FnOnce(Resume)>,
    ) {
        debug!(
            request_id = %req.id,
            method = %req.method,
            url = %req.url,
            base_url = %req.base_url,
            layers = self.inner.stack.len(),
            "dispatching"
        );
        if req.original_url.is_empty() {
            req.original_url = req.url.clone();
        }
        let frame = Rc::new(RefCell::new(RouterFrame {
            router: self.clone(),
            exchange,
            scheduler: scheduler.downgrade(),
            idx: 0,
            removed: String::new(),
            slash_added: false,
            guard: SyncGuard::new(scheduler.ticks()),
            protohost: req.protohost().to_string(),
            parent_url: req.base_url.clone(),
            parent_params: req.params.clone(),
            allow: (req.method == Method::OPTIONS).then(Vec::new),
            done: Some(done),
        }));
        scheduler.push_now(move || RouterFrame::step(&frame, None));
    }
}

impl Handler for Router {
    fn handle(&self, req: &mut Request, _res: &mut Response, next: Next) -> Result<(), Error> {
        let Some(scheduler) = next.scheduler() else {
            return Ok(());
        };
        let exchange = next.exchange();
        self.start(
            req,
            exchange,
            &scheduler,
            Box::new(move |outcome| next.deliver(outcome)),
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "router"
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<&str> = self.inner.params.keys().map(AsRef::as_ref).collect();
        params.sort_unstable();
        f.debug_struct("Router")
            .field("options", &self.inner.options)
            .field("stack", &self.inner.stack)
            .field("params", &params)
            .finish()
    }
}

/// State of one router for one request.
struct RouterFrame {
    router: Router,
    exchange: Exchange,
    scheduler: WeakScheduler,
    idx: usize,
    /// Prefix trimmed from `url` for the layer currently running.
    removed: String,
    /// Whether a `/` was prepended to `url` after trimming.
    slash_added: bool,
    guard: SyncGuard,
    protohost: String,
    parent_url: String,
    parent_params: Params,
    /// Methods of path-matching routes, collected for `OPTIONS` only.
    allow: Option<Vec<Method>>,
    done: Option<Box<dyn FnOnce(Resume)>>,
}

impl RouterFrame {
    fn continuation(this: &Rc<RefCell<Self>>, frame: &Self) -> Next {
        let resume_frame = Rc::clone(this);
        Next::from_weak(
            frame.scheduler.clone(),
            frame.exchange.clone(),
            Box::new(move |outcome| match outcome {
                Resume::Next(signal) => Self::step(&resume_frame, signal),
                Resume::Finished => Self::complete(&resume_frame, Resume::Finished),
            }),
        )
    }

    /// Put back the part of `url` the last middleware layer had trimmed.
    fn unmount(&mut self, req: &mut Request) {
        if self.slash_added {
            req.url = req.url.get(1..).unwrap_or_default().to_string();
            self.slash_added = false;
        }
        if !self.removed.is_empty() {
            let rest = req.url.get(self.protohost.len()..).unwrap_or_default();
            req.url = format!("{}{}{}", self.protohost, self.removed, rest);
            req.base_url.clone_from(&self.parent_url);
            self.removed.clear();
        }
    }

    fn step(this: &Rc<RefCell<Self>>, signal: Option<Signal>) {
        let (mut layer_error, abort) = match signal {
            None | Some(Signal::SkipRoute) => (None, false),
            Some(Signal::SkipRouter) => (None, true),
            Some(Signal::Error(err)) => (Some(err), false),
        };

        let mut frame = this.borrow_mut();
        let Some(scheduler) = frame.scheduler.upgrade() else {
            return;
        };
        let exchange = frame.exchange.clone();
        let request = exchange.with(|req, _| {
            frame.unmount(req);
            (req.pathname(), req.method.clone())
        });

        if abort {
            drop(frame);
            let this = Rc::clone(this);
            scheduler.defer(move || Self::complete(&this, Resume::Next(None)));
            return;
        }

        let router = frame.router.clone();
        let stack = &router.inner.stack;
        if frame.idx >= stack.len() {
            drop(frame);
            let this = Rc::clone(this);
            scheduler.defer(move || {
                Self::complete(&this, Resume::Next(layer_error.map(Signal::Error)));
            });
            return;
        }

        if frame.guard.exceeded(scheduler.ticks()) {
            warn!(
                layer = frame.idx,
                "synchronous continuation limit reached, deferring"
            );
            drop(frame);
            let this = Rc::clone(this);
            scheduler.defer(move || Self::step(&this, layer_error.map(Signal::Error)));
            return;
        }

        let (path, method) = match request {
            Ok((Ok(path), method)) => (path, method),
            Ok((Err(err), _)) | Err(err) => {
                drop(frame);
                let err = layer_error.unwrap_or(err);
                return Self::complete(this, Resume::Next(Some(Signal::Error(err))));
            }
        };

        let mut found = None;
        while let Some(layer) = stack.get(frame.idx) {
            frame.idx += 1;
            let matched = match layer.matches(&path) {
                Ok(Some(matched)) => matched,
                Ok(None) => continue,
                Err(err) => {
                    layer_error.get_or_insert(err);
                    continue;
                }
            };
            if let Some(route) = layer.route() {
                if layer_error.is_some() {
                    continue;
                }
                let handles = route.handles_method(&method);
                if !handles && method == Method::OPTIONS {
                    if let Some(allow) = frame.allow.as_mut() {
                        for m in route.supported_methods() {
                            if !allow.contains(&m) {
                                allow.push(m);
                            }
                        }
                    }
                }
                if !handles && method != Method::HEAD {
                    continue;
                }
            }
            found = Some((layer, matched));
            break;
        }

        let Some((layer, matched)) = found else {
            drop(frame);
            return Self::complete(this, Resume::Next(layer_error.map(Signal::Error)));
        };

        debug!(
            layer = %layer.path(),
            matched = %matched.path,
            path = %path,
            "layer matched"
        );

        let params = if router.inner.options.merge_params {
            Params::merge(matched.params, &frame.parent_params)
        } else {
            matched.params
        };
        exchange.enter("bind params", |req, _| req.params = params);

        let keys: Vec<Arc<str>> = layer
            .matcher()
            .keys()
            .iter()
            .filter_map(|key| match key {
                ParamKey::Name(name) => Some(Arc::clone(name)),
                ParamKey::Index(_) => None,
            })
            .collect();
        let weak = frame.scheduler.clone();
        let index = frame.idx - 1;
        drop(frame);

        let resume_frame = Rc::clone(this);
        let layer_path = matched.path;
        hooks::process_params(
            &router,
            keys,
            exchange,
            weak,
            Box::new(move |outcome| match outcome {
                Resume::Finished => Self::complete(&resume_frame, Resume::Finished),
                Resume::Next(Some(signal)) => {
                    let signal = layer_error.map_or(signal, Signal::Error);
                    Self::step(&resume_frame, Some(signal));
                }
                Resume::Next(None) => {
                    Self::run_layer(&resume_frame, index, layer_error, &layer_path, &path);
                }
            }),
        );
    }

    fn run_layer(
        this: &Rc<RefCell<Self>>,
        index: usize,
        layer_error: Option<Error>,
        layer_path: &str,
        path: &str,
    ) {
        let mut frame = this.borrow_mut();
        let router = frame.router.clone();
        let Some(layer) = router.inner.stack.get(index) else {
            return;
        };
        let exchange = frame.exchange.clone();

        let callback = match layer.endpoint() {
            Endpoint::Route(route) => {
                let next = Self::continuation(this, &frame);
                drop(frame);
                exchange.enter("route dispatch", |req, _| route.dispatch(req, next));
                return;
            }
            Endpoint::Middleware(callback) => callback,
        };

        if !layer_path.is_empty() {
            let boundary = path
                .strip_prefix(layer_path)
                .map(|rest| rest.chars().next());
            let at_boundary = matches!(boundary, Some(None | Some('/' | '.')));
            if !at_boundary {
                let scheduler = frame.scheduler.upgrade();
                drop(frame);
                if let Some(scheduler) = scheduler {
                    let this = Rc::clone(this);
                    scheduler.push_now(move || Self::step(&this, layer_error.map(Signal::Error)));
                }
                return;
            }

            frame.removed = layer_path.to_string();
            exchange.enter("trim prefix", |req, _| {
                let start = frame.protohost.len() + frame.removed.len();
                let rest = req.url.get(start..).unwrap_or_default();
                req.url = format!("{}{}", frame.protohost, rest);
                if frame.protohost.is_empty() && !req.url.starts_with('/') {
                    req.url.insert(0, '/');
                    frame.slash_added = true;
                }
                let mount = frame.removed.strip_suffix('/').unwrap_or(&frame.removed);
                req.base_url = format!("{}{}", frame.parent_url, mount);
                debug!(
                    prefix = %frame.removed,
                    url = %req.url,
                    base_url = %req.base_url,
                    "trimmed mount prefix"
                );
            });
        }

        let next = Self::continuation(this, &frame);
        drop(frame);
        exchange.enter("middleware", |req, res| {
            callback.invoke(layer_error, req, res, next);
        });
    }

    /// Restore the entry state and resume the caller. Later calls are no-ops.
    fn complete(this: &Rc<RefCell<Self>>, outcome: Resume) {
        let mut frame = this.borrow_mut();
        let Some(done) = frame.done.take() else {
            return;
        };
        let allow = frame.allow.take().unwrap_or_default();
        let exchange = frame.exchange.clone();
        let parent_url = std::mem::take(&mut frame.parent_url);
        let parent_params = std::mem::take(&mut frame.parent_params);
        drop(frame);

        let mut outcome = outcome;
        if matches!(outcome, Resume::Next(None)) && !allow.is_empty() {
            let header = allow
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(",");
            debug!(allow = %header, "automatic OPTIONS response");
            outcome = match exchange.with(|_, res| send_options(res, &header)) {
                Ok(Ok(())) => Resume::Finished,
                Ok(Err(err)) | Err(err) => Resume::Next(Some(Signal::Error(err))),
            };
        }

        exchange.enter("restore", |req, _| {
            req.base_url = parent_url;
            req.params = parent_params;
        });
        done(outcome);
    }
}

fn send_options(res: &mut Response, allow: &str) -> Result<(), Error> {
    if res.is_finished() {
        return Ok(());
    }
    res.set_status(StatusCode::OK);
    res.set_header("Allow", allow)?;
    res.set_header("Content-Length", "0")?;
    res.end();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::from_fn;

    fn noop() -> impl Handler {
        from_fn(|_req, _res, next| {
            next.call();
            Ok(())
        })
    }

    #[test]
    fn test_use_at_rejects_empty_list() {
        let mut router = Router::new();
        let err = router.use_at("/x", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(router.stack().is_empty());
    }

    #[test]
    fn test_use_at_registers_one_layer_per_callback() {
        let mut router = Router::new();
        router
            .use_at("/x", [Callback::handler(noop()), Callback::handler(noop())])
            .unwrap();
        assert_eq!(router.stack().len(), 2);
        assert!(router.stack().iter().all(|l| l.path() == "/x"));
    }

    #[test]
    fn test_verb_shortcut_creates_route() {
        let mut router = Router::new();
        router.get("/a", noop()).unwrap().post("/b", noop()).unwrap();
        let routes: Vec<_> = router
            .stack()
            .iter()
            .filter_map(Layer::route)
            .map(|r| (r.path().to_string(), r.supported_methods()))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("/a".to_string(), vec![Method::GET, Method::HEAD]),
                ("/b".to_string(), vec![Method::POST]),
            ]
        );
    }

    #[test]
    fn test_param_strips_leading_colon() {
        let mut router = Router::new();
        router.param(
            ":id",
            crate::dispatcher::hook_fn(|_req, _res, next, _value, _name| {
                next.call();
                Ok(())
            }),
        );
        assert!(router.param_hooks("id").is_some());
        assert!(router.param_hooks(":id").is_none());
    }

    #[test]
    fn test_mounted_copy_is_unaffected_by_later_registration() {
        let mut child = Router::new();
        child.get("/a", noop()).unwrap();
        let mut parent = Router::new();
        parent.mount("/c", child.clone()).unwrap();
        child.get("/b", noop()).unwrap();
        assert_eq!(child.stack().len(), 2);
        assert_eq!(parent.stack().len(), 1);
    }

    #[test]
    fn test_bad_pattern_is_reported() {
        let mut router = Router::new();
        assert!(matches!(
            router.route("/a/(unclosed"),
            Err(Error::Pattern { .. })
        ));
    }
}
