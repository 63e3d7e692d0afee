//! Error and control-flow signal types shared by the dispatch engine.
//!
//! Two kinds of values travel through a continuation:
//!
//! - [`Error`] is an ordinary failure. While one is pending, only error
//!   handlers run and Route layers are skipped.
//! - [`Signal`] wraps an error or one of the two control sentinels. `SkipRoute`
//!   leaves the current Route and `SkipRouter` leaves the current Router.

use std::sync::Arc;

use http::StatusCode;

/// Failure raised while building or dispatching a router.
///
/// Cloneable so it can be memoised per parameter name and re-raised for every
/// later layer that depends on the same value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The request url could not be turned into a pathname.
    #[error("invalid request path `{0}`")]
    InvalidPath(String),

    /// A route pattern could not be compiled.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    Pattern {
        /// Pattern source as registered
        pattern: String,
        /// What the compiler rejected
        reason: String,
    },

    /// A captured path segment was not valid percent-encoding.
    #[error("Failed to decode param '{0}'")]
    ParamDecode(String),

    /// A header name or value was rejected by `http`.
    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    /// Router or middleware configuration was rejected.
    #[error("configuration error: {0}")]
    Config(String),

    /// A handler or hook panicked; carries the panic message.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// The request/response pair was already borrowed by a running handler.
    #[error("exchange is already borrowed by a running handler")]
    ExchangeBusy,

    /// An error with an explicit HTTP status.
    #[error("{message}")]
    Http {
        /// Status the final handler responds with
        status: StatusCode,
        /// Response body
        message: String,
    },

    /// Any other failure raised by application code.
    #[error("{0}")]
    Handler(Arc<anyhow::Error>),
}

impl Error {
    /// Build an error that finalises the response with `status`.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary application error.
    pub fn other(err: impl Into<anyhow::Error>) -> Self {
        Error::Handler(Arc::new(err.into()))
    }

    /// HTTP status the final handler uses when this error escapes the router.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidPath(_) | Error::ParamDecode(_) => StatusCode::BAD_REQUEST,
            Error::Http { status, .. } => *status,
            Error::Pattern { .. }
            | Error::InvalidHeader(_)
            | Error::Config(_)
            | Error::Panic(_)
            | Error::ExchangeBusy
            | Error::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Handler(Arc::new(err))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Error::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeader(err.to_string())
    }
}

/// Value handed to a continuation.
#[derive(Debug, Clone)]
pub enum Signal {
    /// An ordinary error; only error handlers see it.
    Error(Error),
    /// Skip the remaining layers of the current Route.
    SkipRoute,
    /// Leave the current Router with no error.
    SkipRouter,
}

impl Signal {
    /// The carried error, if this is an ordinary error.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Signal::Error(err) => Some(err),
            Signal::SkipRoute | Signal::SkipRouter => None,
        }
    }
}

impl From<Error> for Signal {
    fn from(err: Error) -> Self {
        Signal::Error(err)
    }
}
