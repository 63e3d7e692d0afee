//! Method dispatch for one declared path.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use http::Method;
use tracing::{debug, error};

use super::layer::Layer;
use crate::dispatcher::{
    Callback, ErrorHandler, Handler, Next, Resume, SyncGuard, WeakScheduler,
};
use crate::error::{Error, Signal};
use crate::server::{Exchange, Request, Response};

#[derive(Clone)]
struct RouteInner {
    path: Arc<str>,
    stack: Vec<Layer>,
    methods: Vec<Method>,
    all: bool,
}

/// Ordered, method-tagged handlers for one path.
///
/// Built through `&mut` registration calls, then shared read-only. Clones
/// are cheap; registering on a clone copies the layer list first.
#[derive(Clone)]
pub struct Route {
    inner: Arc<RouteInner>,
}

macro_rules! verb {
    ($(#[$doc:meta])* $fn_name:ident, $method:expr) => {
        $(#[$doc])*
        pub fn $fn_name<H: Handler>(&mut self, handler: H) -> &mut Self {
            self.on($method, [Callback::handler(handler)])
        }
    };
}

impl Route {
    #[must_use]
    pub fn new(path: &str) -> Self {
        debug!(path = %path, "new route");
        Self {
            inner: Arc::new(RouteInner {
                path: Arc::from(path),
                stack: Vec::new(),
                methods: Vec::new(),
                all: false,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.stack.is_empty()
    }

    /// Append `callbacks` for `method`, in order.
    pub fn on(
        &mut self,
        method: Method,
        callbacks: impl IntoIterator<Item = Callback>,
    ) -> &mut Self {
        let inner = Arc::make_mut(&mut self.inner);
        for callback in callbacks {
            debug!(method = %method, path = %inner.path, handler = %callback.name(), "route layer");
            if !inner.methods.contains(&method) {
                inner.methods.push(method.clone());
            }
            inner
                .stack
                .push(Layer::for_method(Some(method.clone()), callback));
        }
        self
    }

    /// Append `callbacks` for every method.
    pub fn on_all(&mut self, callbacks: impl IntoIterator<Item = Callback>) -> &mut Self {
        let inner = Arc::make_mut(&mut self.inner);
        for callback in callbacks {
            inner.all = true;
            inner.stack.push(Layer::for_method(None, callback));
        }
        self
    }

    /// Handler for every method.
    pub fn all<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.on_all([Callback::handler(handler)])
    }

    /// Error handler scoped to `method`.
    pub fn on_error<H: ErrorHandler>(&mut self, method: Method, handler: H) -> &mut Self {
        self.on(method, [Callback::error(handler)])
    }

    verb!(get, Method::GET);
    verb!(post, Method::POST);
    verb!(put, Method::PUT);
    verb!(delete, Method::DELETE);
    verb!(patch, Method::PATCH);
    verb!(
        /// Explicit HEAD handler; without one, HEAD runs the GET handlers.
        head,
        Method::HEAD
    );
    verb!(options, Method::OPTIONS);
    verb!(trace, Method::TRACE);
    verb!(connect, Method::CONNECT);

    fn has_method(&self, method: &Method) -> bool {
        self.inner.methods.contains(method)
    }

    /// Method actually dispatched: HEAD falls back to GET unless HEAD was
    /// registered explicitly.
    fn effective_method(&self, method: &Method) -> Method {
        if *method == Method::HEAD && !self.has_method(&Method::HEAD) {
            Method::GET
        } else {
            method.clone()
        }
    }

    /// Whether a request with `method` would run any layer here.
    #[must_use]
    pub fn handles_method(&self, method: &Method) -> bool {
        self.inner.all || self.has_method(&self.effective_method(method))
    }

    /// Registered methods in registration order, plus HEAD when GET is
    /// present.
    #[must_use]
    pub fn supported_methods(&self) -> Vec<Method> {
        let mut methods = self.inner.methods.clone();
        if self.has_method(&Method::GET) && !self.has_method(&Method::HEAD) {
            methods.push(Method::HEAD);
        }
        methods
    }

    /// Run the layers registered for the request's method, then resume `done`.
    ///
    /// `SkipRoute` from a layer resumes `done` with no error; `SkipRouter` is
    /// passed up unchanged. An empty route resumes `done` immediately.
    pub fn dispatch(&self, req: &mut Request, done: Next) {
        if self.inner.stack.is_empty() {
            done.call();
            return;
        }
        let Some(scheduler) = done.scheduler() else {
            return;
        };

        let method = self.effective_method(&req.method);
        req.route = Some(Arc::clone(&self.inner.path));
        debug!(
            request_id = %req.id,
            method = %req.method,
            route = %self.inner.path,
            "dispatching route"
        );

        let frame = Rc::new(RefCell::new(RouteFrame {
            route: self.clone(),
            method,
            idx: 0,
            guard: SyncGuard::new(scheduler.ticks()),
            exchange: done.exchange(),
            scheduler: done.weak_scheduler(),
            done: Some(done),
        }));
        scheduler.push_now(move || RouteFrame::step(&frame, None));
    }
}

impl Handler for Route {
    fn handle(&self, req: &mut Request, _res: &mut Response, next: Next) -> Result<(), Error> {
        self.dispatch(req, next);
        Ok(())
    }

    fn name(&self) -> &str {
        "route"
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.inner.path)
            .field("methods", &self.inner.methods)
            .field("all", &self.inner.all)
            .field("layers", &self.inner.stack.len())
            .finish()
    }
}

struct RouteFrame {
    route: Route,
    method: Method,
    idx: usize,
    guard: SyncGuard,
    exchange: Exchange,
    scheduler: WeakScheduler,
    done: Option<Next>,
}

impl RouteFrame {
    fn finish(&mut self, outcome: Resume) {
        if let Some(done) = self.done.take() {
            done.deliver(outcome);
        }
    }

    fn resume(this: &Rc<RefCell<Self>>, outcome: Resume) {
        match outcome {
            Resume::Next(signal) => Self::step(this, signal),
            Resume::Finished => this.borrow_mut().finish(Resume::Finished),
        }
    }

    fn step(this: &Rc<RefCell<Self>>, signal: Option<Signal>) {
        let mut frame = this.borrow_mut();
        let err = match signal {
            Some(Signal::SkipRoute) => return frame.finish(Resume::Next(None)),
            Some(Signal::SkipRouter) => {
                return frame.finish(Resume::Next(Some(Signal::SkipRouter)))
            }
            Some(Signal::Error(err)) => Some(err),
            None => None,
        };

        let Some(scheduler) = frame.scheduler.upgrade() else {
            return;
        };
        if frame.guard.exceeded(scheduler.ticks()) {
            drop(frame);
            let this = Rc::clone(this);
            scheduler.defer(move || RouteFrame::step(&this, err.map(Signal::Error)));
            return;
        }

        let route = frame.route.clone();
        let stack = &route.inner.stack;
        // Route layers are always built by `Layer::for_method`, so every one
        // carries a middleware callback; only the method filter can skip.
        let callback = loop {
            let Some(layer) = stack.get(frame.idx) else {
                return frame.finish(Resume::Next(err.map(Signal::Error)));
            };
            frame.idx += 1;
            if let (true, Some(callback)) = (layer.accepts_method(&frame.method), layer.callback()) {
                break callback;
            }
        };

        let exchange = frame.exchange.clone();
        let weak = frame.scheduler.clone();
        drop(frame);

        let resume_frame = Rc::clone(this);
        let next = Next::from_weak(
            weak,
            exchange.clone(),
            Box::new(move |outcome| RouteFrame::resume(&resume_frame, outcome)),
        );
        if let Err(e) = exchange.with(|req, res| callback.invoke(err, req, res, next)) {
            error!(route = %route.path(), error = %e, "route layer could not borrow the exchange");
        }
    }
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
    fn test_supported_methods_adds_head_for_get() {
        let mut route = Route::new("/x");
        route.get(noop()).post(noop());
        assert_eq!(
            route.supported_methods(),
            vec![Method::GET, Method::POST, Method::HEAD]
        );
    }

    #[test]
    fn test_explicit_head_is_not_duplicated() {
        let mut route = Route::new("/x");
        route.head(noop()).get(noop());
        assert_eq!(route.supported_methods(), vec![Method::HEAD, Method::GET]);
    }

    #[test]
    fn test_handles_method_with_head_alias() {
        let mut route = Route::new("/x");
        route.get(noop());
        assert!(route.handles_method(&Method::GET));
        assert!(route.handles_method(&Method::HEAD));
        assert!(!route.handles_method(&Method::POST));

        let mut only_head = Route::new("/y");
        only_head.head(noop());
        assert!(only_head.handles_method(&Method::HEAD));
        assert!(!only_head.handles_method(&Method::GET));
    }

    #[test]
    fn test_all_handles_every_method() {
        let mut route = Route::new("/x");
        route.all(noop());
        assert!(route.handles_method(&Method::DELETE));
        assert!(route.supported_methods().is_empty());
    }

    #[test]
    fn test_duplicate_verb_registered_once() {
        let mut route = Route::new("/x");
        route.post(noop()).post(noop());
        assert_eq!(route.len(), 2);
        assert_eq!(route.supported_methods(), vec![Method::POST]);
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let mut route = Route::new("/x");
        route.get(noop());
        let snapshot = route.clone();
        route.post(noop());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(route.len(), 2);
    }
}
