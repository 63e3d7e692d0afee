//! # Configuration Module
//!
//! Router options and application settings, loaded from a YAML or TOML file
//! and overridable from the environment.
//!
//! ## File format
//!
//! ```yaml
//! router:
//!   case_sensitive: false
//!   strict: false
//!   merge_params: true
//! app:
//!   x_powered_by: true
//!   cookie_secrets: ["first", "older"]
//!   cors:
//!     origins: ["https://app.example.com"]
//!     credentials: true
//!     max_age: 600
//! ```
//!
//! The same keys work in TOML. The format is picked from the file extension
//! (`.yaml`/`.yml` or `.toml`).
//!
//! ## Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `STACKROUTER_CASE_SENSITIVE` | `router.case_sensitive` |
//! | `STACKROUTER_STRICT` | `router.strict` |
//! | `STACKROUTER_MERGE_PARAMS` | `router.merge_params` |
//!
//! Accepted values are `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`;
//! anything else leaves the file value in place.

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Matching and parameter options of one router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// `/Foo` and `/foo` are different paths.
    pub case_sensitive: bool,
    /// A trailing slash on a route pattern is significant.
    pub strict: bool,
    /// Parameters captured by the enclosing router stay visible.
    pub merge_params: bool,
}

impl RouterOptions {
    /// Override fields from `STACKROUTER_*` variables.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_flag("STACKROUTER_CASE_SENSITIVE") {
            self.case_sensitive = v;
        }
        if let Some(v) = env_flag("STACKROUTER_STRICT") {
            self.strict = v;
        }
        if let Some(v) = env_flag("STACKROUTER_MERGE_PARAMS") {
            self.merge_params = v;
        }
    }
}

/// CORS section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Allowed origins; empty or `["*"]` allows any.
    pub origins: Vec<String>,
    pub credentials: bool,
    pub methods: Option<Vec<String>>,
    /// Allowed request headers; unset reflects the preflight request.
    pub allowed_headers: Option<Vec<String>>,
    pub exposed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds.
    pub max_age: Option<u64>,
    pub preflight_continue: bool,
    pub options_success_status: Option<u16>,
}

/// Settings for the collaborator middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Send `X-Powered-By`.
    pub x_powered_by: bool,
    /// Secrets for signed cookies; the first one signs, all of them verify.
    pub cookie_secrets: Vec<String>,
    pub cors: Option<CorsSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            x_powered_by: true,
            cookie_secrets: Vec::new(),
            cors: None,
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub router: RouterOptions,
    pub app: AppSettings,
}

impl AppConfig {
    /// Apply environment overrides on top of the loaded values.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        self.router.apply_env();
        self
    }
}

/// Load an [`AppConfig`] from `path`.
///
/// # Errors
///
/// Fails when the file cannot be read, does not parse, or has an extension
/// other than `.yaml`, `.yml` or `.toml`.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let config: AppConfig = match extension.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?,
        Some("toml") => toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?,
        _ => bail!(
            "Unsupported config format for {} (expected .yaml, .yml or .toml)",
            path.display()
        ),
    };
    Ok(config)
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
