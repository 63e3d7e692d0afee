//! Cookie parsing with optional signature verification.
//!
//! Signed values have the form `s:<value>.<signature>` where the signature is
//! the unpadded standard base64 of HMAC-SHA256(secret, value). Values of the
//! form `j:<json>` are decoded as JSON.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::dispatcher::{Handler, Next};
use crate::error::Error;
use crate::server::{Request, Response};

type HmacSha256 = Hmac<Sha256>;

/// One parsed cookie value.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieValue {
    Text(String),
    /// A `j:` value whose JSON parsed to something truthy
    Json(serde_json::Value),
}

impl CookieValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CookieValue::Text(s) => Some(s),
            CookieValue::Json(_) => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            CookieValue::Json(v) => Some(v),
            CookieValue::Text(_) => None,
        }
    }
}

/// Unsigned cookies, stored in [`Request::extensions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cookies(HashMap<String, CookieValue>);

impl Cookies {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CookieValue> {
        self.0.get(name)
    }

    /// Text value of `name`; `None` for JSON cookies.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(CookieValue::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of verifying one signed cookie.
#[derive(Debug, Clone, PartialEq)]
pub enum SignedValue {
    Valid(CookieValue),
    /// Signature did not match any secret
    Invalid,
}

/// Cookies that carried an `s:` signature, stored in [`Request::extensions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignedCookies(HashMap<String, SignedValue>);

impl SignedCookies {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SignedValue> {
        self.0.get(name)
    }

    /// Verified text value of `name`.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            SignedValue::Valid(value) => value.as_str(),
            SignedValue::Invalid => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sign `value` with `secret`, producing `<value>.<signature>`.
///
/// Prefix the result with `s:` when storing it in a cookie.
#[must_use]
pub fn sign_cookie(value: &str, secret: &str) -> String {
    let signature = mac_for(value, secret)
        .map(|mac| STANDARD_NO_PAD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{value}.{signature}")
}

/// HMAC takes keys of any length; `None` never happens in practice.
fn mac_for(value: &str, secret: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(value.as_bytes());
    Some(mac)
}

/// Check `<value>.<signature>` against `secret`; the value on success.
#[must_use]
pub fn unsign_cookie(input: &str, secret: &str) -> Option<String> {
    let (value, signature) = input.rsplit_once('.')?;
    let provided = STANDARD_NO_PAD.decode(signature).ok()?;
    mac_for(value, secret)?
        .verify_slice(&provided)
        .ok()
        .map(|()| value.to_string())
}

/// Split a `Cookie` header into raw name/value pairs.
///
/// The first occurrence of a name wins, surrounding quotes are removed and
/// values are percent-decoded when that succeeds.
fn parse_header(header: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for part in header.split(';') {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || pairs.iter().any(|(n, _)| n == name) {
            continue;
        }
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        let decoded = if value.contains('%') {
            urlencoding::decode(value)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| value.to_string())
        } else {
            value.to_string()
        };
        pairs.push((name.to_string(), decoded));
    }
    pairs
}

/// Decode a `j:` value; `None` leaves the raw text in place.
fn json_cookie(raw: &str) -> Option<serde_json::Value> {
    let body = raw.strip_prefix("j:")?;
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    is_truthy(&value).then_some(value)
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

fn to_value(raw: String) -> CookieValue {
    match json_cookie(&raw) {
        Some(json) => CookieValue::Json(json),
        None => CookieValue::Text(raw),
    }
}

/// Middleware returned by [`cookie_parser`].
#[derive(Debug, Clone, Default)]
pub struct CookieParser {
    secrets: Vec<String>,
}

/// Parse the `Cookie` header into [`Cookies`] and, when `secrets` is not
/// empty, verify `s:` values into [`SignedCookies`].
///
/// Secrets are tried in order, so older secrets can stay in the list while a
/// new one is rolled out.
pub fn cookie_parser<I, S>(secrets: I) -> CookieParser
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CookieParser {
        secrets: secrets.into_iter().map(Into::into).collect(),
    }
}

impl CookieParser {
    fn unsign(&self, signed: &str) -> SignedValue {
        self.secrets
            .iter()
            .find_map(|secret| unsign_cookie(signed, secret))
            .map_or(SignedValue::Invalid, |value| SignedValue::Valid(to_value(value)))
    }

    fn parse(&self, header: &str) -> (Cookies, SignedCookies) {
        let mut cookies = HashMap::new();
        let mut signed = HashMap::new();
        for (name, raw) in parse_header(header) {
            let signed_part = if self.secrets.is_empty() {
                None
            } else {
                raw.strip_prefix("s:").map(str::to_owned)
            };
            match signed_part {
                Some(rest) => {
                    signed.insert(name, self.unsign(&rest));
                }
                None => {
                    cookies.insert(name, to_value(raw));
                }
            }
        }
        (Cookies(cookies), SignedCookies(signed))
    }
}

impl Handler for CookieParser {
    fn handle(&self, req: &mut Request, _res: &mut Response, next: Next) -> Result<(), Error> {
        if req.extensions.get::<Cookies>().is_some() {
            next.call();
            return Ok(());
        }
        let (cookies, signed) = match req.header_str("cookie") {
            Some(header) => self.parse(header),
            None => (Cookies::default(), SignedCookies::default()),
        };
        debug!(
            request_id = %req.id,
            cookies = cookies.len(),
            signed = signed.len(),
            "parsed cookies"
        );
        req.extensions.insert(cookies);
        req.extensions.insert(signed);
        next.call();
        Ok(())
    }

    fn name(&self) -> &str {
        "cookie_parser"
    }
}
