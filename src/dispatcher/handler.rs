//! Handler traits and closure adapters.
//!
//! Three shapes of user code plug into a stack:
//!
//! | Trait | Signature | Runs when |
//! |-------|-----------|-----------|
//! | [`Handler`] | `(req, res, next)` | no error is pending |
//! | [`ErrorHandler`] | `(err, req, res, next)` | an error is pending |
//! | [`ParamHook`] | `(req, res, next, value, name)` | a named capture with hooks is bound |
//!
//! Returning `Err` (or panicking) is the same as calling `next.fail(err)`.

use std::fmt;
use std::sync::Arc;

use super::next::{invoke_guarded, Next};
use crate::error::Error;
use crate::server::{Request, Response};

/// Ordinary middleware or endpoint.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error>;

    /// Name used in log events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Error-handling middleware.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle_error(
        &self,
        err: Error,
        req: &mut Request,
        res: &mut Response,
        next: Next,
    ) -> Result<(), Error>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Hook run once per request and value for a named path parameter.
pub trait ParamHook: Send + Sync + 'static {
    fn call(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next,
        value: &str,
        name: &str,
    ) -> Result<(), Error>;
}

/// [`Handler`] built from a closure by [`from_fn`].
pub struct FnHandler<F>(F);

/// Wrap a closure as a [`Handler`].
///
/// ```rust
/// use stackrouter::{from_fn, Router};
///
/// let mut router = Router::new();
/// router.use_handler(from_fn(|_req, res, _next| {
///     res.send("hello");
///     Ok(())
/// }));
/// ```
pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut Request, &mut Response, Next) -> Result<(), Error> + Send + Sync + 'static,
{
    FnHandler(f)
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Request, &mut Response, Next) -> Result<(), Error> + Send + Sync + 'static,
{
    fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error> {
        (self.0)(req, res, next)
    }

    fn name(&self) -> &str {
        "<closure>"
    }
}

/// [`ErrorHandler`] built from a closure by [`error_fn`].
pub struct FnErrorHandler<F>(F);

/// Wrap a closure as an [`ErrorHandler`].
pub fn error_fn<F>(f: F) -> FnErrorHandler<F>
where
    F: Fn(Error, &mut Request, &mut Response, Next) -> Result<(), Error> + Send + Sync + 'static,
{
    FnErrorHandler(f)
}

impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(Error, &mut Request, &mut Response, Next) -> Result<(), Error> + Send + Sync + 'static,
{
    fn handle_error(
        &self,
        err: Error,
        req: &mut Request,
        res: &mut Response,
        next: Next,
    ) -> Result<(), Error> {
        (self.0)(err, req, res, next)
    }

    fn name(&self) -> &str {
        "<error closure>"
    }
}

/// [`ParamHook`] built from a closure by [`hook_fn`].
pub struct FnParamHook<F>(F);

/// Wrap a closure as a [`ParamHook`].
pub fn hook_fn<F>(f: F) -> FnParamHook<F>
where
    F: Fn(&mut Request, &mut Response, Next, &str, &str) -> Result<(), Error>
        + Send
        + Sync
        + 'static,
{
    FnParamHook(f)
}

impl<F> ParamHook for FnParamHook<F>
where
    F: Fn(&mut Request, &mut Response, Next, &str, &str) -> Result<(), Error>
        + Send
        + Sync
        + 'static,
{
    fn call(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next,
        value: &str,
        name: &str,
    ) -> Result<(), Error> {
        (self.0)(req, res, next, value, name)
    }
}

/// Entry in a stack: either kind of handler.
#[derive(Clone)]
pub enum Callback {
    Handler(Arc<dyn Handler>),
    ErrorHandler(Arc<dyn ErrorHandler>),
}

impl Callback {
    pub fn handler(h: impl Handler) -> Self {
        Callback::Handler(Arc::new(h))
    }

    pub fn error(h: impl ErrorHandler) -> Self {
        Callback::ErrorHandler(Arc::new(h))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Callback::Handler(h) => h.name(),
            Callback::ErrorHandler(h) => h.name(),
        }
    }

    /// Run the callback for the current state of the chain.
    ///
    /// An ordinary handler passes a pending error straight through, and an
    /// error handler with nothing pending passes straight to the next layer.
    pub(crate) fn invoke(
        &self,
        pending: Option<Error>,
        req: &mut Request,
        res: &mut Response,
        next: Next,
    ) {
        match (self, pending) {
            (Callback::Handler(h), None) => {
                invoke_guarded(next, h.name(), |next| h.handle(req, res, next));
            }
            (Callback::Handler(_), Some(err)) => next.fail(err),
            (Callback::ErrorHandler(h), Some(err)) => {
                invoke_guarded(next, h.name(), |next| h.handle_error(err, req, res, next));
            }
            (Callback::ErrorHandler(_), None) => next.call(),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Handler(h) => f.debug_tuple("Handler").field(&h.name()).finish(),
            Callback::ErrorHandler(h) => f.debug_tuple("ErrorHandler").field(&h.name()).finish(),
        }
    }
}
