use std::fmt;

/// CORS configuration error
///
/// Returned by `CorsOptionsBuilder::build()` and `CorsOptions::from_settings()`
/// when the configuration cannot produce a valid policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    /// Wildcard origin (`*`) cannot be used with credentials
    ///
    /// Browsers reject `Access-Control-Allow-Origin: *` on credentialed
    /// requests, so the combination is refused up front.
    WildcardWithCredentials,
    /// An origin pattern is not a valid regex
    InvalidOriginPattern {
        /// The pattern as given
        pattern: String,
        /// Compiler message
        reason: String,
    },
    /// A configured method name is not a valid HTTP method
    InvalidMethod {
        /// The method as given
        method: String,
    },
    /// `options_success_status` is not a valid HTTP status code
    InvalidStatus(u16),
}

impl fmt::Display for CorsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorsConfigError::WildcardWithCredentials => {
                write!(
                    f,
                    "CORS configuration error: Cannot use wildcard origin (*) with credentials. \
                    When credentials are enabled, you must specify exact origins."
                )
            }
            CorsConfigError::InvalidOriginPattern { pattern, reason } => {
                write!(
                    f,
                    "CORS configuration error: Invalid origin pattern '{pattern}': {reason}"
                )
            }
            CorsConfigError::InvalidMethod { method } => {
                write!(f, "CORS configuration error: Invalid HTTP method '{method}'")
            }
            CorsConfigError::InvalidStatus(status) => {
                write!(
                    f,
                    "CORS configuration error: Invalid options success status {status}"
                )
            }
        }
    }
}

impl std::error::Error for CorsConfigError {}
