//! Running one request to completion.
//!
//! [`Router::serve`] is the synchronous front door: it owns a fresh
//! [`Scheduler`], drains it, and then does what a final handler would for
//! requests nothing answered.

use std::cell::RefCell;
use std::rc::Rc;

use http::StatusCode;
use tracing::{debug, info, warn};

use super::{Exchange, Request, Response};
use crate::dispatcher::Scheduler;
use crate::error::Error;
use crate::router::Router;

/// How a dispatch ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A handler ended the request.
    Handled,
    /// The stack was exhausted without an answer.
    Unhandled,
    /// An error escaped the outermost router.
    Failed(Error),
}

/// Result of [`Router::serve`].
#[derive(Debug)]
pub struct Served {
    pub request: Request,
    pub response: Response,
    /// `None` when a handler kept its continuation and never resumed it.
    pub outcome: Option<Outcome>,
}

impl Served {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status
    }
}

impl Router {
    /// Dispatch `request`, drain the scheduler, and finalise the response.
    ///
    /// Unhandled requests become `404 Cannot <METHOD> <path>`. Escaped errors
    /// become [`Error::status`] with the error message as body, unless a
    /// handler already finished the response.
    pub fn serve(&self, request: Request) -> Served {
        let scheduler = Scheduler::new();
        let exchange = Exchange::new(request);
        let outcome = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&outcome);
        self.dispatch(&exchange, &scheduler, move |done| {
            *slot.borrow_mut() = Some(done);
        });
        scheduler.run();

        let outcome = outcome.borrow_mut().take();
        let (request, mut response) = match exchange.take() {
            Ok(parts) => parts,
            Err(err) => {
                warn!(error = %err, "exchange still borrowed after dispatch");
                (Request::default(), Response::new())
            }
        };

        match &outcome {
            Some(Outcome::Unhandled) if !response.is_finished() => {
                let path = request.pathname().unwrap_or_else(|_| request.url.clone());
                debug!(request_id = %request.id, method = %request.method, path = %path, "no handler");
                response.set_status(StatusCode::NOT_FOUND);
                response.send(format!("Cannot {} {}", request.method, path));
            }
            Some(Outcome::Failed(err)) if !response.is_finished() => {
                let status = err.status();
                if status.is_server_error() {
                    warn!(request_id = %request.id, error = %err, status = status.as_u16(), "request failed");
                } else {
                    debug!(request_id = %request.id, error = %err, status = status.as_u16(), "request rejected");
                }
                response.set_status(status);
                response.send(err.to_string());
            }
            Some(_) => {}
            None => warn!(request_id = %request.id, "request stalled without a response"),
        }

        info!(
            request_id = %request.id,
            method = %request.method,
            url = %request.original_url,
            status = response.status.as_u16(),
            ticks = scheduler.ticks(),
            "request served"
        );

        Served {
            request,
            response,
            outcome,
        }
    }
}
