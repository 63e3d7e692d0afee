//! Request/response pair shared by every continuation of one dispatch.

pub mod request;
pub mod response;
pub mod service;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use request::{Request, RequestId};
pub use response::Response;
pub use service::{Outcome, Served};

use tracing::error;

use crate::error::Error;
use crate::router::hooks::ParamMemos;

/// Owned request and response.
#[derive(Debug, Default)]
pub struct Parts {
    pub request: Request,
    pub response: Response,
}

/// Handle to the request/response pair of one dispatch.
///
/// Continuations run one at a time on the scheduler, and the engine borrows
/// the pair only while a handler runs. A handler that keeps its [`Next`]
/// for a later tick can reach the pair again through
/// [`Next::exchange`](crate::dispatcher::Next::exchange).
#[derive(Clone, Default)]
pub struct Exchange {
    inner: Rc<RefCell<Parts>>,
    memos: Rc<RefCell<ParamMemos>>,
}

impl Exchange {
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self::from_parts(request, Response::new())
    }

    #[must_use]
    pub fn from_parts(request: Request, response: Response) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Parts { request, response })),
            memos: Rc::default(),
        }
    }

    /// Run `f` with mutable access to both halves.
    ///
    /// Fails with [`Error::ExchangeBusy`] when called from inside a running
    /// handler, which already holds the pair.
    pub fn with<R>(&self, f: impl FnOnce(&mut Request, &mut Response) -> R) -> Result<R, Error> {
        let mut parts = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::ExchangeBusy)?;
        let Parts { request, response } = &mut *parts;
        Ok(f(request, response))
    }

    /// Move the pair out, leaving defaults behind.
    pub fn take(&self) -> Result<(Request, Response), Error> {
        let mut parts = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Error::ExchangeBusy)?;
        let Parts { request, response } = std::mem::take(&mut *parts);
        Ok((request, response))
    }

    /// Like [`with`](Self::with), but a busy exchange is logged rather than
    /// returned.
    pub(crate) fn enter<R>(
        &self,
        site: &str,
        f: impl FnOnce(&mut Request, &mut Response) -> R,
    ) -> Option<R> {
        match self.with(f) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(site = %site, error = %err, "exchange unavailable");
                None
            }
        }
    }

    /// Param hook results for this request, shared by nested routers.
    pub(crate) fn param_memos(&self) -> &Rc<RefCell<ParamMemos>> {
        &self.memos
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(parts) => f
                .debug_struct("Exchange")
                .field("method", &parts.request.method)
                .field("url", &parts.request.url)
                .finish(),
            Err(_) => f.write_str("Exchange(<borrowed>)"),
        }
    }
}
