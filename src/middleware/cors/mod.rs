//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! [`cors`] returns a [`Handler`] that computes the CORS response headers
//! for each request.
//!
//! - For `OPTIONS` (preflight) it sets origin, credentials, allowed methods,
//!   allowed headers, max-age and exposed headers, then ends the request with
//!   `options_success_status` unless `preflight_continue` is set.
//! - For every other method it sets origin, credentials and exposed headers,
//!   then continues.
//!
//! Origin handling depends on the [`OriginPolicy`]:
//!
//! | Policy | `Access-Control-Allow-Origin` | `Vary: Origin` |
//! |--------|-------------------------------|----------------|
//! | `Any` | `*` | no |
//! | `Fixed` | the configured origin | yes |
//! | `List`, `Regex` | the request origin when allowed, else omitted | yes |
//! | `Custom` | the request origin when the validator accepts it | yes |
//! | `Disabled` | request passes through untouched | no |
//!
//! A `Custom` validator that rejects the origin also skips every other CORS
//! header.

mod builder;
mod error;

pub use builder::CorsOptionsBuilder;
pub use error::CorsConfigError;

use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use regex::Regex;
use tracing::debug;

use crate::config::CorsSettings;
use crate::dispatcher::{Handler, Next};
use crate::error::Error;
use crate::server::{Request, Response};

/// Which origins get CORS headers.
#[derive(Clone)]
pub enum OriginPolicy {
    /// Any origin, answered with `*`
    Any,
    /// One fixed origin, always sent
    Fixed(String),
    /// Exact-match allow list
    List(Vec<String>),
    /// Regex allow list
    Regex(Vec<Regex>),
    /// Custom validation function
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
    /// No CORS handling
    Disabled,
}

impl fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginPolicy::Any => write!(f, "Any"),
            OriginPolicy::Fixed(origin) => f.debug_tuple("Fixed").field(origin).finish(),
            OriginPolicy::List(origins) => f.debug_tuple("List").field(origins).finish(),
            OriginPolicy::Regex(patterns) => f
                .debug_tuple("Regex")
                .field(&patterns.iter().map(Regex::as_str).collect::<Vec<_>>())
                .finish(),
            OriginPolicy::Custom(_) => write!(f, "Custom(<function>)"),
            OriginPolicy::Disabled => write!(f, "Disabled"),
        }
    }
}

enum OriginDecision {
    Skip,
    Headers { allow: Option<String>, vary: bool },
}

impl OriginPolicy {
    fn decide(&self, request_origin: Option<&str>) -> OriginDecision {
        let reflect_if = |allowed: bool| OriginDecision::Headers {
            allow: request_origin.filter(|_| allowed).map(str::to_owned),
            vary: true,
        };
        match self {
            OriginPolicy::Any => OriginDecision::Headers {
                allow: Some("*".to_string()),
                vary: false,
            },
            OriginPolicy::Fixed(origin) => OriginDecision::Headers {
                allow: Some(origin.clone()),
                vary: true,
            },
            OriginPolicy::List(origins) => {
                reflect_if(request_origin.is_some_and(|o| origins.iter().any(|a| a == o)))
            }
            OriginPolicy::Regex(patterns) => {
                reflect_if(request_origin.is_some_and(|o| patterns.iter().any(|re| re.is_match(o))))
            }
            OriginPolicy::Custom(validator) => {
                if validator(request_origin.unwrap_or_default()) {
                    reflect_if(true)
                } else {
                    OriginDecision::Skip
                }
            }
            OriginPolicy::Disabled => OriginDecision::Skip,
        }
    }
}

/// Validated CORS configuration. Build with [`CorsOptionsBuilder`].
#[derive(Debug, Clone)]
pub struct CorsOptions {
    pub(crate) origin: OriginPolicy,
    pub(crate) methods: Vec<Method>,
    pub(crate) allowed_headers: Option<Vec<String>>,
    pub(crate) exposed_headers: Vec<String>,
    pub(crate) credentials: bool,
    pub(crate) max_age: Option<u64>,
    pub(crate) preflight_continue: bool,
    pub(crate) options_success_status: StatusCode,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: OriginPolicy::Any,
            methods: vec![
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ],
            allowed_headers: None,
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: None,
            preflight_continue: false,
            options_success_status: StatusCode::NO_CONTENT,
        }
    }
}

impl CorsOptions {
    #[must_use]
    pub fn builder() -> CorsOptionsBuilder {
        CorsOptionsBuilder::new()
    }

    /// Options from the `app.cors` section of the configuration file.
    ///
    /// An empty origin list or one containing `*` allows any origin; a single
    /// origin is sent as-is; several are an allow list.
    ///
    /// # Errors
    ///
    /// Same as [`CorsOptionsBuilder::build`], plus
    /// [`CorsConfigError::InvalidMethod`] for unknown method names.
    pub fn from_settings(settings: &CorsSettings) -> Result<Self, CorsConfigError> {
        let mut builder = CorsOptionsBuilder::new()
            .credentials(settings.credentials)
            .preflight_continue(settings.preflight_continue);

        builder = match settings.origins.as_slice() {
            [] => builder.any_origin(),
            origins if origins.iter().any(|o| o == "*") => builder.any_origin(),
            [single] => builder.origin(single),
            many => {
                let refs: Vec<&str> = many.iter().map(String::as_str).collect();
                builder.origins(&refs)
            }
        };

        if let Some(methods) = &settings.methods {
            let parsed = methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                        CorsConfigError::InvalidMethod { method: m.clone() }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.methods(&parsed);
        }
        if let Some(headers) = &settings.allowed_headers {
            let refs: Vec<&str> = headers.iter().map(String::as_str).collect();
            builder = builder.allowed_headers(&refs);
        }
        if !settings.exposed_headers.is_empty() {
            let refs: Vec<&str> = settings.exposed_headers.iter().map(String::as_str).collect();
            builder = builder.exposed_headers(&refs);
        }
        if let Some(age) = settings.max_age {
            builder = builder.max_age(age);
        }
        if let Some(status) = settings.options_success_status {
            builder = builder.options_success_status(status);
        }
        builder.build()
    }

    #[must_use]
    pub fn origin_policy(&self) -> &OriginPolicy {
        &self.origin
    }
}

/// CORS middleware; see the module docs for the header rules.
#[derive(Debug, Clone)]
pub struct Cors {
    options: CorsOptions,
}

/// Build the CORS middleware.
#[must_use]
pub fn cors(options: CorsOptions) -> Cors {
    Cors { options }
}

impl Cors {
    fn allowed_headers(&self, req: &Request, res: &mut Response) -> Result<(), Error> {
        let value = match &self.options.allowed_headers {
            Some(headers) => headers.join(","),
            None => {
                res.vary("Access-Control-Request-Headers")?;
                req.header_str("access-control-request-headers")
                    .unwrap_or_default()
                    .to_string()
            }
        };
        if !value.is_empty() {
            res.set_header("Access-Control-Allow-Headers", &value)?;
        }
        Ok(())
    }

    fn exposed_headers(&self, res: &mut Response) -> Result<(), Error> {
        if !self.options.exposed_headers.is_empty() {
            res.set_header(
                "Access-Control-Expose-Headers",
                &self.options.exposed_headers.join(","),
            )?;
        }
        Ok(())
    }
}

impl Handler for Cors {
    fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error> {
        let decision = self.options.origin.decide(req.header_str("origin"));
        let OriginDecision::Headers { allow, vary } = decision else {
            next.call();
            return Ok(());
        };

        if let Some(origin) = &allow {
            res.set_header("Access-Control-Allow-Origin", origin)?;
        }
        if vary {
            res.vary("Origin")?;
        }
        if self.options.credentials {
            res.set_header("Access-Control-Allow-Credentials", "true")?;
        }

        if req.method != Method::OPTIONS {
            self.exposed_headers(res)?;
            next.call();
            return Ok(());
        }

        let methods = self
            .options
            .methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",");
        if !methods.is_empty() {
            res.set_header("Access-Control-Allow-Methods", &methods)?;
        }
        self.allowed_headers(req, res)?;
        if let Some(age) = self.options.max_age {
            res.set_header("Access-Control-Max-Age", &age.to_string())?;
        }
        self.exposed_headers(res)?;

        if self.options.preflight_continue {
            next.call();
        } else {
            debug!(
                origin = allow.as_deref().unwrap_or(""),
                status = self.options.options_success_status.as_u16(),
                "CORS preflight answered"
            );
            res.set_status(self.options.options_success_status);
            res.set_header("Content-Length", "0")?;
            res.end();
            next.finish();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cors"
    }
}
