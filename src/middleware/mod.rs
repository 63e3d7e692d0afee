//! Collaborator middleware.
//!
//! Ordinary [`Handler`](crate::Handler)s that applications commonly put in
//! front of their routes. None of them is needed by the router itself.
//!
//! - [`init`]: `X-Powered-By` and per-request [`Locals`]
//! - [`query`]: query string into a [`Query`] extension
//! - [`cookie_parser`]: `Cookie` header into [`Cookies`] and [`SignedCookies`]
//! - [`cors`]: CORS response headers and preflight answers

mod cookies;
mod cors;
mod init;
mod query;

pub use cookies::{
    cookie_parser, sign_cookie, unsign_cookie, CookieParser, CookieValue, Cookies, SignedCookies,
    SignedValue,
};
pub use cors::{cors, Cors, CorsConfigError, CorsOptions, CorsOptionsBuilder, OriginPolicy};
pub use init::{init, Init, Locals};
pub use query::{query, Query, QueryParser};
