//! # CLI Module
//!
//! Command-line front end of the `stackrouter` binary.
//!
//! ## Commands
//!
//! ### `probe`
//!
//! Build the demonstration application from a configuration file, dispatch
//! one request through it and print the response:
//!
//! ```bash
//! stackrouter probe --config app.yaml GET /users/42 --header "cookie:session=abc"
//! ```
//!
//! Options:
//! - `--config <FILE>` - YAML or TOML configuration (optional)
//! - `--header <NAME:VALUE>` - Request header, repeatable
//!
//! Logging is configured from `STACKROUTER_LOG_*` variables before the
//! command runs.

mod commands;

pub use commands::{demo_app, parse_header_arg, run_cli, Cli, Commands};
