//! # stackrouter
//!
//! **stackrouter** is an Express-style request dispatch engine: an ordered
//! stack of middleware, nested routers and method-specific routes that a
//! request walks through one continuation at a time.
//!
//! ## Overview
//!
//! A [`Router`] holds a stack of layers. Each layer pairs a path pattern with
//! either a middleware callback or a [`Route`]. Dispatch scans the stack for
//! the next layer whose path matches, hands the request to it together with a
//! [`Next`] continuation, and resumes scanning when the continuation fires.
//!
//! - Middleware mounted at a prefix sees the url with the prefix removed and
//!   `base_url` extended; both are restored when it calls `next`.
//! - An error passed to `next` switches the chain into error mode, where only
//!   [`ErrorHandler`]s run.
//! - `next.skip_route()` leaves the current route, `next.skip_router()` leaves
//!   the current router.
//! - Parameter hooks registered with [`Router::param`] run once per request
//!   and value before the first layer that captured the parameter.
//! - `OPTIONS` requests nothing answered get an automatic `Allow` response.
//!
//! ## Architecture
//!
//! - **[`router`]** - path matching, layers, routes and the router dispatch loop
//! - **[`dispatcher`]** - scheduler trampoline, continuations and handler traits
//! - **[`server`]** - request, response and the synchronous [`Router::serve`] entry
//! - **[`middleware`]** - collaborator middleware (init, query, cookies, CORS)
//! - **[`config`]** - router options and application settings from YAML/TOML
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - the `stackrouter` binary
//!
//! ## Quick Start
//!
//! ```rust
//! use stackrouter::{from_fn, Request, Router};
//!
//! let mut users = Router::new();
//! users
//!     .get("/:id", from_fn(|req, res, _next| {
//!         res.send(format!("user {}", req.param("id").unwrap_or_default()));
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let mut app = Router::new();
//! app.mount("/users", users).unwrap();
//!
//! let served = app.serve(Request::new("GET", "/users/42").unwrap());
//! assert_eq!(served.response.body_text(), "user 42");
//! ```
//!
//! ## Execution model
//!
//! Dispatch is single-threaded per request. Continuations are queued on a
//! [`Scheduler`], so arbitrarily long synchronous chains never grow the native
//! stack, and every 100 synchronous continuations the router yields to the
//! scheduler's deferred queue.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod server;

pub use config::{load_config, AppConfig, RouterOptions};
pub use dispatcher::{
    error_fn, from_fn, hook_fn, Callback, ErrorHandler, Handler, Next, ParamHook, Scheduler,
};
pub use error::{Error, Signal};
pub use router::{Route, Router};
pub use server::{Exchange, Outcome, Request, Response, Served};
