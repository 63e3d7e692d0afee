//! Query string parsing.

use tracing::debug;

use crate::dispatcher::{Handler, Next};
use crate::error::Error;
use crate::server::{Request, Response};

/// Decoded query string, stored in [`Request::extensions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parse an `application/x-www-form-urlencoded` string (no leading `?`).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect()
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(String, String)> for Query {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Middleware returned by [`query`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

/// Parse the request's query string into a [`Query`] extension, unless an
/// earlier layer already did.
#[must_use]
pub fn query() -> QueryParser {
    QueryParser
}

impl Handler for QueryParser {
    fn handle(&self, req: &mut Request, _res: &mut Response, next: Next) -> Result<(), Error> {
        if req.extensions.get::<Query>().is_none() {
            let parsed = Query::parse(req.query_string().unwrap_or_default());
            debug!(request_id = %req.id, params = parsed.len(), "parsed query string");
            req.extensions.insert(parsed);
        }
        next.call();
        Ok(())
    }

    fn name(&self) -> &str {
        "query"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decodes_and_keeps_repeats() {
        let q = Query::parse("a=1&b=hello%20world&a=2&c=x+y&flag");
        assert_eq!(q.get("a"), Some("1"));
        assert_eq!(q.get_all("a"), vec!["1", "2"]);
        assert_eq!(q.get("b"), Some("hello world"));
        assert_eq!(q.get("c"), Some("x y"));
        assert_eq!(q.get("flag"), Some(""));
        assert_eq!(q.get("missing"), None);
        assert_eq!(q.len(), 5);
    }

    #[test]
    fn test_empty() {
        assert!(Query::parse("").is_empty());
    }
}
