use std::sync::Arc;

use http::{Method, StatusCode};
use regex::Regex;

use super::{CorsConfigError, CorsOptions, OriginPolicy};

enum PendingOrigin {
    Policy(OriginPolicy),
    Patterns(Vec<String>),
}

/// Builder for [`CorsOptions`] with a fluent API
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use stackrouter::middleware::CorsOptionsBuilder;
///
/// let options = CorsOptionsBuilder::new()
///     .origins(&["https://example.com", "https://api.example.com"])
///     .methods(&[Method::GET, Method::POST])
///     .allowed_headers(&["Content-Type", "Authorization"])
///     .credentials(true)
///     .exposed_headers(&["X-Total-Count"])
///     .max_age(3600)
///     .build()?;
/// # Ok::<(), stackrouter::middleware::CorsConfigError>(())
/// ```
pub struct CorsOptionsBuilder {
    origin: PendingOrigin,
    methods: Vec<Method>,
    allowed_headers: Option<Vec<String>>,
    exposed_headers: Vec<String>,
    credentials: bool,
    max_age: Option<u64>,
    preflight_continue: bool,
    options_success_status: u16,
}

impl CorsOptionsBuilder {
    /// Start from the permissive defaults: any origin, the common methods,
    /// allowed headers reflected from the preflight, 204 preflight status.
    #[must_use]
    pub fn new() -> Self {
        let defaults = CorsOptions::default();
        Self {
            origin: PendingOrigin::Policy(defaults.origin),
            methods: defaults.methods,
            allowed_headers: defaults.allowed_headers,
            exposed_headers: defaults.exposed_headers,
            credentials: defaults.credentials,
            max_age: defaults.max_age,
            preflight_continue: defaults.preflight_continue,
            options_success_status: defaults.options_success_status.as_u16(),
        }
    }

    /// Allow any origin (`Access-Control-Allow-Origin: *`).
    #[must_use]
    pub fn any_origin(mut self) -> Self {
        self.origin = PendingOrigin::Policy(OriginPolicy::Any);
        self
    }

    /// Always answer with this one origin; `"*"` is the same as
    /// [`any_origin`](Self::any_origin).
    #[must_use]
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = PendingOrigin::Policy(if origin == "*" {
            OriginPolicy::Any
        } else {
            OriginPolicy::Fixed(origin.to_string())
        });
        self
    }

    /// Reflect the request origin when it is in `origins`.
    #[must_use]
    pub fn origins(mut self, origins: &[&str]) -> Self {
        self.origin = PendingOrigin::Policy(OriginPolicy::List(
            origins.iter().map(|s| (*s).to_string()).collect(),
        ));
        self
    }

    /// Reflect the request origin when it matches any of `patterns`.
    /// Patterns are compiled by [`build`](Self::build).
    #[must_use]
    pub fn origin_patterns(mut self, patterns: &[&str]) -> Self {
        self.origin =
            PendingOrigin::Patterns(patterns.iter().map(|s| (*s).to_string()).collect());
        self
    }

    /// Decide per request. `validator` gets the request origin (empty when
    /// absent); `false` skips CORS handling for the request entirely.
    #[must_use]
    pub fn origin_fn<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.origin = PendingOrigin::Policy(OriginPolicy::Custom(Arc::new(validator)));
        self
    }

    /// Pass every request through untouched.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.origin = PendingOrigin::Policy(OriginPolicy::Disabled);
        self
    }

    #[must_use]
    pub fn methods(mut self, methods: &[Method]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    /// Fixed `Access-Control-Allow-Headers`. Without this, the preflight's
    /// `Access-Control-Request-Headers` is echoed back.
    #[must_use]
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = Some(headers.iter().map(|s| (*s).to_string()).collect());
        self
    }

    #[must_use]
    pub fn exposed_headers(mut self, headers: &[&str]) -> Self {
        self.exposed_headers = headers.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    /// Preflight cache duration in seconds.
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Hand preflight requests on to the next layer instead of ending them.
    #[must_use]
    pub fn preflight_continue(mut self, pass: bool) -> Self {
        self.preflight_continue = pass;
        self
    }

    #[must_use]
    pub fn options_success_status(mut self, status: u16) -> Self {
        self.options_success_status = status;
        self
    }

    /// Validate and produce the options.
    ///
    /// # Errors
    ///
    /// - [`CorsConfigError::WildcardWithCredentials`] for `*` with credentials
    /// - [`CorsConfigError::InvalidOriginPattern`] for a pattern that does
    ///   not compile
    /// - [`CorsConfigError::InvalidStatus`] for an out-of-range status
    pub fn build(self) -> Result<CorsOptions, CorsConfigError> {
        let origin = match self.origin {
            PendingOrigin::Policy(policy) => policy,
            PendingOrigin::Patterns(patterns) => {
                let compiled = patterns
                    .iter()
                    .map(|p| {
                        Regex::new(p).map_err(|e| CorsConfigError::InvalidOriginPattern {
                            pattern: p.clone(),
                            reason: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                OriginPolicy::Regex(compiled)
            }
        };

        if self.credentials && matches!(origin, OriginPolicy::Any) {
            return Err(CorsConfigError::WildcardWithCredentials);
        }

        let options_success_status = StatusCode::from_u16(self.options_success_status)
            .map_err(|_| CorsConfigError::InvalidStatus(self.options_success_status))?;

        Ok(CorsOptions {
            origin,
            methods: self.methods,
            allowed_headers: self.allowed_headers,
            exposed_headers: self.exposed_headers,
            credentials: self.credentials,
            max_age: self.max_age,
            preflight_continue: self.preflight_continue,
            options_success_status,
        })
    }
}

impl Default for CorsOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
