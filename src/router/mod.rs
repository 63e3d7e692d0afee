//! # Router Module
//!
//! Path matching, routes and the router dispatch loop.
//!
//! ## Overview
//!
//! - [`PathMatcher`] compiles a pattern such as `/users/:id(\\d+)/*` into a
//!   regex, either anchored at both ends (routes) or as a prefix that must end
//!   on a `/` or `.` boundary (mounted middleware).
//! - [`Layer`] pairs one matcher with one [`Endpoint`].
//! - [`Route`] holds the method-tagged handlers for one path.
//! - [`Router`] is the ordered stack; it is itself a
//!   [`Handler`](crate::Handler), so routers nest.
//!
//! ## Mounting
//!
//! While a middleware mounted at `/api` runs, the request sees `url` with
//! `/api` removed and `base_url` extended by `/api`. Both are put back before
//! the router moves on, and the router's caller gets `base_url` and `params`
//! back exactly as it passed them in.
//!
//! ## Example
//!
//! ```rust
//! use stackrouter::{from_fn, Request, Router};
//!
//! let mut router = Router::new();
//! router.get("/a/:id", from_fn(|req, res, _next| {
//!     res.send(req.param("id").unwrap_or_default().to_string());
//!     Ok(())
//! }))?;
//!
//! let served = router.serve(Request::new("GET", "/a/42")?);
//! assert_eq!(served.response.body_text(), "42");
//! # Ok::<(), stackrouter::Error>(())
//! ```

mod core;
pub(crate) mod hooks;
mod layer;
mod matcher;
mod params;
mod route;

pub use core::Router;
pub use layer::{Endpoint, Layer};
pub use matcher::{decode_param, MatchOptions, PathMatch, PathMatcher};
pub use params::{ParamKey, Params, MAX_INLINE_PARAMS};
pub use route::Route;
