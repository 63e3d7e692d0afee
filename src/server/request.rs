//! Request side of an exchange.
//!
//! The dispatch loops rewrite `url`, `base_url` and `params` while a request
//! travels through mounted routers, and restore them on the way out.
//! `original_url` is never touched after construction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};

use crate::error::Error;
use crate::router::Params;

/// Request identifier backed by a ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an incoming `X-Request-Id` when it is a valid ULID.
    #[must_use]
    pub fn from_header_or_new(value: Option<&str>) -> Self {
        value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(RequestId)
    }
}

/// Incoming request as seen by handlers.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    /// Upper-cased request method
    pub method: Method,
    /// Path (and query) relative to the current mount point
    pub url: String,
    /// Url as received, never rewritten
    pub original_url: String,
    /// Prefix consumed by enclosing mounts, without a trailing slash
    pub base_url: String,
    /// Captures of the layer currently running
    pub params: Params,
    pub headers: HeaderMap,
    /// Path of the matched route, set when a Route starts dispatching
    pub route: Option<Arc<str>>,
    /// Typed per-request values set by middleware (query, cookies, locals)
    pub extensions: Extensions,
}

impl Request {
    /// Build a request; the method is upper-cased so `get` and `GET` are the same verb.
    pub fn new(method: &str, url: impl Into<String>) -> Result<Self, Error> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::Config(format!("invalid method `{method}`: {e}")))?;
        Ok(Self::with_method(method, url))
    }

    #[must_use]
    pub fn with_method(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: RequestId::new(),
            method,
            original_url: url.clone(),
            url,
            base_url: String::new(),
            params: Params::new(),
            headers: HeaderMap::new(),
            route: None,
            extensions: Extensions::new(),
        }
    }

    /// Append a header, builder style.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// First value of header `name` as text.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Named path parameter.
    #[must_use]
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Path component of `url`, without query or fragment.
    ///
    /// Absolute-form urls (`http://host/path`) must parse with `url`, else
    /// [`Error::InvalidPath`]. The path itself is the raw text after
    /// [`protohost`](Self::protohost), undecoded and with dot-segments kept,
    /// so prefix trimming cuts the same bytes the matcher saw.
    pub fn pathname(&self) -> Result<String, Error> {
        let raw = self.url.as_str();
        if raw.is_empty() {
            return Err(Error::InvalidPath(String::new()));
        }
        if raw.starts_with('/') || !raw.contains("://") {
            return Ok(raw_path(raw).to_string());
        }
        let parsed =
            url::Url::parse(raw).map_err(|e| Error::InvalidPath(format!("{raw}: {e}")))?;
        match raw.get(self.protohost().len()..) {
            Some(rest) if rest.starts_with('/') => Ok(raw_path(rest).to_string()),
            _ => Ok(parsed.path().to_string()),
        }
    }

    /// Query string of `url`, without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        let raw = self.url.as_str();
        let start = raw.find('?')? + 1;
        let end = raw[start..].find('#').map_or(raw.len(), |i| start + i);
        Some(&raw[start..end])
    }

    /// Scheme and authority of an absolute-form url, empty otherwise.
    ///
    /// Prefix trimming operates on the part after this, so a mounted router
    /// sees `http://host/rest` instead of `http://host/mount/rest`.
    #[must_use]
    pub fn protohost(&self) -> &str {
        let raw = self.url.as_str();
        if raw.is_empty() || raw.starts_with('/') {
            return "";
        }
        let path_len = raw.find('?').unwrap_or(raw.len());
        let Some(fqdn) = raw[..path_len].find("://") else {
            return "";
        };
        match raw[fqdn + 3..].find('/') {
            Some(slash) => &raw[..fqdn + 3 + slash],
            None => "",
        }
    }
}

fn raw_path(raw: &str) -> &str {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    &raw[..end]
}

impl Default for Request {
    fn default() -> Self {
        Self::with_method(Method::GET, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_is_upper_cased() {
        let req = Request::new("get", "/").unwrap();
        assert_eq!(req.method, Method::GET);
        let req = Request::new("purge", "/").unwrap();
        assert_eq!(req.method.as_str(), "PURGE");
    }

    #[test]
    fn test_pathname_strips_query_and_fragment() {
        let req = Request::new("GET", "/users/7?limit=10#top").unwrap();
        assert_eq!(req.pathname().unwrap(), "/users/7");
        assert_eq!(req.query_string(), Some("limit=10"));
    }

    #[test]
    fn test_pathname_absolute_form() {
        let req = Request::new("GET", "http://example.com/a/b?x=1").unwrap();
        assert_eq!(req.pathname().unwrap(), "/a/b");
        assert_eq!(req.protohost(), "http://example.com");
    }

    #[test]
    fn test_pathname_absolute_form_keeps_raw_segments() {
        let req = Request::new("GET", "http://example.com/x/../a%7eb/c#frag").unwrap();
        assert_eq!(req.pathname().unwrap(), "/x/../a%7eb/c");
    }

    #[test]
    fn test_pathname_rejects_empty_and_broken_urls() {
        let mut req = Request::default();
        req.url = String::new();
        assert!(matches!(req.pathname(), Err(Error::InvalidPath(_))));
        req.url = "http://[::1/x".into();
        assert!(matches!(req.pathname(), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_protohost_without_path_is_empty() {
        let req = Request::new("GET", "http://example.com").unwrap();
        assert_eq!(req.protohost(), "");
        let req = Request::new("GET", "/x?next=http://a/b").unwrap();
        assert_eq!(req.protohost(), "");
    }

    #[test]
    fn test_request_id_from_header() {
        let id = RequestId::new();
        let parsed = RequestId::from_header_or_new(Some(&id.to_string()));
        assert_eq!(parsed, id);
        let fresh = RequestId::from_header_or_new(Some("not-a-ulid"));
        assert_ne!(fresh, id);
    }
}
