use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use http::StatusCode;
use serde_json::json;
use tracing::info;

use crate::config::{load_config, AppConfig};
use crate::dispatcher::{error_fn, from_fn, hook_fn};
use crate::error::Error;
use crate::middleware::{cookie_parser, cors, init, query, CorsOptions, Locals, Query};
use crate::router::Router;
use crate::server::{Outcome, Request};

/// Command-line interface for stackrouter
#[derive(Parser)]
#[command(name = "stackrouter")]
#[command(about = "Express-style request dispatch engine", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch one request through the demonstration application
    Probe {
        /// Path to a YAML or TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Request method, e.g. GET
        method: String,

        /// Request url, e.g. /users/42?verbose=1
        url: String,

        /// Request header as NAME:VALUE (repeatable)
        #[arg(long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
    },
}

/// Split a `NAME:VALUE` argument.
///
/// # Errors
///
/// Fails when there is no `:` or the name is empty.
pub fn parse_header_arg(arg: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("header `{arg}` is not NAME:VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("header `{arg}` has an empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// The application `probe` dispatches into.
///
/// ```text
/// init, query, cookie_parser, [cors]
/// GET  /health
/// /users (mounted router, `:id` hook)
///   GET  /:id
///   GET  /:id/greeting
/// error handler
/// ```
///
/// # Errors
///
/// Fails when the CORS section of `config` is invalid.
pub fn demo_app(config: &AppConfig) -> anyhow::Result<Router> {
    let mut app = Router::with_options(config.router);
    app.use_handler(init(config.app.x_powered_by))
        .use_handler(query())
        .use_handler(cookie_parser(config.app.cookie_secrets.clone()));
    if let Some(settings) = &config.app.cors {
        let options = CorsOptions::from_settings(settings).context("invalid cors settings")?;
        app.use_handler(cors(options));
    }

    app.get(
        "/health",
        from_fn(|_req, res, _next| res.json(&json!({ "status": "ok" }))),
    )?;

    let mut users = Router::with_options(config.router);
    users.param(
        "id",
        hook_fn(|req, _res, next, value, _name| {
            if value.chars().all(|c| c.is_ascii_digit()) {
                if let Some(locals) = req.extensions.get_mut::<Locals>() {
                    locals.insert("user", json!({ "id": value, "name": format!("user-{value}") }));
                }
                next.call();
            } else {
                next.fail(Error::http(StatusCode::NOT_FOUND, format!("no user {value}")));
            }
            Ok(())
        }),
    );
    users.get(
        "/:id",
        from_fn(|req, res, _next| {
            let user = req
                .extensions
                .get::<Locals>()
                .and_then(|l| l.get("user"))
                .cloned()
                .unwrap_or_default();
            res.json(&user)
        }),
    )?;
    users.get(
        "/:id/greeting",
        from_fn(|req, res, _next| {
            let greeting = req
                .extensions
                .get::<Query>()
                .and_then(|q| q.get("greeting"))
                .unwrap_or("hello")
                .to_string();
            res.send(format!("{greeting}, user {}", req.param("id").unwrap_or_default()));
            Ok(())
        }),
    )?;
    app.mount("/users", users)?;

    app.use_error(error_fn(|err, req, res, _next| {
        res.set_status(err.status());
        res.json(&json!({ "error": err.to_string(), "path": req.original_url }))
    }));
    Ok(app)
}

fn probe(
    config: Option<&PathBuf>,
    method: &str,
    url: &str,
    headers: &[String],
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    }
    .apply_env();
    let app = demo_app(&config)?;

    let mut request = Request::new(method, url)?;
    for arg in headers {
        let (name, value) = parse_header_arg(arg)?;
        request = request.header(&name, &value)?;
    }

    let served = app.serve(request);
    let outcome = match &served.outcome {
        Some(Outcome::Handled) => "handled",
        Some(Outcome::Unhandled) => "unhandled",
        Some(Outcome::Failed(_)) => "failed",
        None => "stalled",
    };
    info!(outcome, status = served.status().as_u16(), "probe finished");

    println!("{}", served.status());
    for (name, value) in &served.response.headers {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();
    println!("{}", served.response.body_text());
    Ok(())
}

/// Execute the parsed command.
///
/// # Errors
///
/// Propagates configuration, header and application build failures.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Probe {
            config,
            method,
            url,
            headers,
        } => probe(config.as_ref(), method, url, headers),
    }
}
