use std::collections::HashMap;

use crate::dispatcher::{Handler, Next};
use crate::error::Error;
use crate::server::{Request, Response};

/// Per-request values shared between handlers, stored in
/// [`Request::extensions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locals(pub HashMap<String, serde_json::Value>);

impl Locals {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }
}

/// Middleware returned by [`init`].
#[derive(Debug, Clone, Copy)]
pub struct Init {
    powered_by: bool,
}

/// First layer of an application stack: optionally advertises the engine in
/// `X-Powered-By` and gives the request an empty [`Locals`].
#[must_use]
pub fn init(powered_by: bool) -> Init {
    Init { powered_by }
}

impl Handler for Init {
    fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> Result<(), Error> {
        if self.powered_by {
            res.set_header("X-Powered-By", "stackrouter")?;
        }
        if req.extensions.get::<Locals>().is_none() {
            req.extensions.insert(Locals::default());
        }
        next.call();
        Ok(())
    }

    fn name(&self) -> &str {
        "init"
    }
}
