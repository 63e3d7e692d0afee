//! Response side of an exchange.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::error::Error;

/// Response under construction.
///
/// Handlers write status, headers and body; [`Response::send`] or
/// [`Response::end`] marks it finished, which the final handler respects.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    finished: bool,
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            finished: false,
        }
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Set (replace) a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Add `field` to the `Vary` header unless it is already listed.
    ///
    /// A `Vary: *` header is left alone.
    pub fn vary(&mut self, field: &str) -> Result<&mut Self, Error> {
        let current = self.header_str(VARY.as_str()).unwrap_or("").to_string();
        let listed: Vec<&str> = current
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if listed.contains(&"*") {
            return Ok(self);
        }
        let mut fields: Vec<String> = listed.iter().map(|s| (*s).to_string()).collect();
        for wanted in field.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if wanted == "*" {
                fields = vec!["*".to_string()];
                break;
            }
            if !fields.iter().any(|f| f.eq_ignore_ascii_case(wanted)) {
                fields.push(wanted.to_string());
            }
        }
        self.headers
            .insert(VARY, HeaderValue::from_str(&fields.join(", "))?);
        Ok(self)
    }

    /// Write `body`, set `Content-Length` (and a text content type when none
    /// is set) and finish the response.
    pub fn send(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        self.finished = true;
    }

    /// Serialize `value` as the JSON body and finish the response.
    pub fn json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value).map_err(Error::other)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.send(body);
        Ok(())
    }

    /// Finish without touching the body.
    pub fn end(&mut self) {
        self.finished = true;
    }

    #[must_use]
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Body as UTF-8 text, lossy.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_sets_length_and_finishes() {
        let mut res = Response::new();
        res.send("hello");
        assert!(res.is_finished());
        assert_eq!(res.header_str("content-length"), Some("5"));
        assert_eq!(res.body_text(), "hello");
    }

    #[test]
    fn test_vary_appends_once() {
        let mut res = Response::new();
        res.vary("Origin").unwrap();
        res.vary("origin").unwrap();
        res.vary("Access-Control-Request-Headers").unwrap();
        assert_eq!(
            res.header_str("vary"),
            Some("Origin, Access-Control-Request-Headers")
        );
    }

    #[test]
    fn test_vary_star_wins() {
        let mut res = Response::new();
        res.set_header("Vary", "*").unwrap();
        res.vary("Origin").unwrap();
        assert_eq!(res.header_str("vary"), Some("*"));
    }

    #[test]
    fn test_json_body() {
        let mut res = Response::new();
        res.json(&serde_json::json!({"ok": true})).unwrap();
        assert_eq!(res.header_str("content-type"), Some("application/json"));
        assert_eq!(res.body_text(), r#"{"ok":true}"#);
    }
}
