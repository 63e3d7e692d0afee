//! Route pattern compiler.
//!
//! # Pattern syntax
//!
//! | Pattern | Meaning |
//! |---------|---------|
//! | `/users` | literal |
//! | `/users/:id` | named capture, one segment |
//! | `/files/:id(\d+)` | named capture with a custom regex |
//! | `/page/(\d+)` | unnamed capture, positional key `0`, `1`, ... |
//! | `/:id?` `/:path+` `/:path*` | optional, one-or-more, zero-or-more |
//! | `/:file.:ext` | `.` delimits segments like `/` |
//! | `/assets/*` | wildcard, positional |
//! | `\:` | escaped literal |
//!
//! A capture preceded by `/` or `.` owns that delimiter, so `/:id?` also
//! makes the slash optional.
//!
//! # Modes
//!
//! With `end` set the whole path must be consumed. Without it (mounted
//! middleware) the match must stop on a segment boundary: the next character
//! is `/`, `.`, or the end of the path. The `regex` crate has no lookahead,
//! so prefix mode wraps the pattern in an outer group followed by the
//! boundary and reports the group as the matched portion.
//!
//! Captured values are percent-decoded. A malformed escape is an error
//! (status 400), not a non-match.

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use super::params::{ParamKey, Params};
use crate::error::Error;

/// Flags fixed when a pattern is compiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Case-sensitive literals
    pub sensitive: bool,
    /// Trailing slash is significant
    pub strict: bool,
    /// Whole path must match (routes) rather than a prefix (middleware)
    pub end: bool,
}

impl MatchOptions {
    /// Options for a mounted middleware layer.
    #[must_use]
    pub fn prefix(sensitive: bool) -> Self {
        Self {
            sensitive,
            strict: false,
            end: false,
        }
    }

    /// Options for a route layer.
    #[must_use]
    pub fn exact(sensitive: bool, strict: bool) -> Self {
        Self {
            sensitive,
            strict,
            end: true,
        }
    }
}

/// Successful match of a path against a [`PathMatcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// Portion of the path the pattern consumed; empty for the root prefix
    pub path: String,
    pub params: Params,
}

#[derive(Clone)]
enum Kind {
    /// `/` in prefix mode: every path, nothing consumed
    Root,
    /// `*`: the whole path as positional `0`
    Star,
    Pattern { regex: Regex, group: usize },
}

/// Compiled route pattern.
#[derive(Clone)]
pub struct PathMatcher {
    source: Arc<str>,
    options: MatchOptions,
    keys: Arc<[ParamKey]>,
    kind: Kind,
}

impl PathMatcher {
    /// Compile `pattern`.
    pub fn compile(pattern: &str, options: MatchOptions) -> Result<Self, Error> {
        if pattern == "/" && !options.end {
            return Ok(Self::root());
        }
        if pattern == "*" {
            return Ok(Self {
                source: Arc::from(pattern),
                options,
                keys: Arc::from(vec![ParamKey::Index(0)]),
                kind: Kind::Star,
            });
        }

        let fail = |reason: String| Error::Pattern {
            pattern: pattern.to_string(),
            reason,
        };

        let (body, trailing) = if !options.strict && pattern.ends_with('/') && !pattern.ends_with("\\/")
        {
            (&pattern[..pattern.len() - 1], "/?")
        } else if options.strict {
            (pattern, "")
        } else {
            (pattern, "/?")
        };
        let (translated, keys) = translate(body).map_err(fail)?;

        let (source, group) = if options.end {
            (format!("^(?:{translated}){trailing}$"), 0)
        } else {
            (format!("^({translated}{trailing})(?:[/.]|$)"), 1)
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.sensitive)
            .build()
            .map_err(|e| fail(e.to_string()))?;

        Ok(Self {
            source: Arc::from(pattern),
            options,
            keys: Arc::from(keys),
            kind: Kind::Pattern { regex, group },
        })
    }

    /// Prefix matcher for `/`; accepts every path and consumes nothing.
    #[must_use]
    pub fn root() -> Self {
        Self {
            source: Arc::from("/"),
            options: MatchOptions::prefix(false),
            keys: Arc::from(Vec::new()),
            kind: Kind::Root,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Capture keys in pattern order.
    #[must_use]
    pub fn keys(&self) -> &[ParamKey] {
        &self.keys
    }

    /// Test `path`.
    pub fn matches(&self, path: &str) -> Result<Option<PathMatch>, Error> {
        match &self.kind {
            Kind::Root => Ok(Some(PathMatch::default())),
            Kind::Star => {
                let mut params = Params::new();
                params.set(ParamKey::Index(0), decode_param(path)?);
                Ok(Some(PathMatch {
                    path: path.to_string(),
                    params,
                }))
            }
            Kind::Pattern { regex, group } => {
                let Some(caps) = regex.captures(path) else {
                    return Ok(None);
                };
                let matched = caps.get(*group).map_or("", |m| m.as_str());
                let mut params = Params::new();
                for (i, key) in self.keys.iter().enumerate() {
                    if let Some(value) = caps.get(group + i + 1) {
                        params.set(key.clone(), decode_param(value.as_str())?);
                    }
                }
                Ok(Some(PathMatch {
                    path: matched.to_string(),
                    params,
                }))
            }
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regex = match &self.kind {
            Kind::Root => "<root>",
            Kind::Star => "<star>",
            Kind::Pattern { regex, .. } => regex.as_str(),
        };
        f.debug_struct("PathMatcher")
            .field("source", &self.source)
            .field("options", &self.options)
            .field("regex", &regex)
            .finish()
    }
}

/// Percent-decode a captured value.
pub fn decode_param(value: &str) -> Result<String, Error> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1..i + 3).is_some_and(|h| {
                h.iter().all(u8::is_ascii_hexdigit)
            });
            if !valid {
                return Err(Error::ParamDecode(value.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|_| Error::ParamDecode(value.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    One,
    Optional,
    OneOrMore,
    ZeroOrMore,
}

struct Capture {
    key: ParamKey,
    pattern: Option<String>,
    modifier: Modifier,
}

/// Translate pattern syntax into a regex body and its capture keys.
fn translate(pattern: &str) -> Result<(String, Vec<ParamKey>), String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut keys = Vec::new();
    let mut positional = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| "dangling escape at end of pattern".to_string())?;
                push_literal(&mut out, *escaped);
                i += 2;
            }
            '/' | '.' if matches!(chars.get(i + 1), Some(':') | Some('(')) => {
                let (capture, end) = parse_capture(&chars, i + 1, &mut positional)?;
                emit(&mut out, Some(c), &capture);
                keys.push(capture.key);
                i = end;
            }
            ':' | '(' => {
                let (capture, end) = parse_capture(&chars, i, &mut positional)?;
                emit(&mut out, None, &capture);
                keys.push(capture.key);
                i = end;
            }
            '*' => {
                keys.push(ParamKey::Index(positional));
                positional += 1;
                out.push_str("(.*)");
                i += 1;
            }
            other => {
                push_literal(&mut out, other);
                i += 1;
            }
        }
    }
    Ok((out, keys))
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Parse `:name`, `:name(re)` or `(re)` starting at `start`, plus an
/// optional modifier. Returns the capture and the index after it.
fn parse_capture(
    chars: &[char],
    start: usize,
    positional: &mut usize,
) -> Result<(Capture, usize), String> {
    let mut i = start;
    let mut name = None;

    if chars[i] == ':' {
        i += 1;
        let begin = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        if i == begin {
            return Err(format!("missing parameter name at offset {start}"));
        }
        name = Some(chars[begin..i].iter().collect::<String>());
    }

    let mut pattern = None;
    if chars.get(i) == Some(&'(') {
        let (group, end) = read_group(chars, i)?;
        pattern = Some(group);
        i = end;
    }

    let key = match name {
        Some(name) => ParamKey::Name(Arc::from(name)),
        None => {
            let key = ParamKey::Index(*positional);
            *positional += 1;
            key
        }
    };

    let modifier = match chars.get(i) {
        Some('?') => Modifier::Optional,
        Some('+') => Modifier::OneOrMore,
        Some('*') => Modifier::ZeroOrMore,
        _ => Modifier::One,
    };
    if modifier != Modifier::One {
        i += 1;
    }

    Ok((
        Capture {
            key,
            pattern,
            modifier,
        },
        i,
    ))
}

/// Read a balanced `( ... )` group starting at `open`. Inner capturing groups
/// become non-capturing so capture indices line up with keys.
fn read_group(chars: &[char], open: usize) -> Result<(String, usize), String> {
    let mut depth = 0usize;
    let mut i = open;
    let mut body = String::new();

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| "dangling escape inside group".to_string())?;
                body.push('\\');
                body.push(*escaped);
                i += 2;
                continue;
            }
            '(' => {
                depth += 1;
                if depth > 1 {
                    match chars.get(i + 1) {
                        Some('?') => {
                            if matches!(chars.get(i + 2), Some('P') | Some('<')) {
                                return Err("named groups are not allowed inside a parameter".into());
                            }
                            body.push('(');
                        }
                        _ => body.push_str("(?:"),
                    }
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    if body.is_empty() {
                        return Err(format!("empty group at offset {open}"));
                    }
                    return Ok((body, i + 1));
                }
                body.push(')');
            }
            other => body.push(other),
        }
        i += 1;
    }
    Err(format!("unbalanced group at offset {open}"))
}

fn emit(out: &mut String, prefix: Option<char>, capture: &Capture) {
    let pre = match prefix {
        Some('.') => "\\.",
        Some(_) => "/",
        None => "",
    };
    let default = if prefix == Some('.') {
        "[^/.]+?"
    } else {
        "[^/]+?"
    };
    let p = capture.pattern.as_deref().unwrap_or(default);
    match capture.modifier {
        Modifier::One => out.push_str(&format!("{pre}({p})")),
        Modifier::Optional => out.push_str(&format!("(?:{pre}({p}))?")),
        Modifier::OneOrMore => out.push_str(&format!("{pre}((?:{p})(?:{pre}(?:{p}))*)")),
        Modifier::ZeroOrMore => out.push_str(&format!("(?:{pre}((?:{p})(?:{pre}(?:{p}))*))?")),
    }
}
