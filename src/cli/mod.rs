//! CLI module for fnctl
//!
//! Provides command-line interface for:
//! - deploy: Package and deploy functions to a stage
//! - run: Serve functions locally with hot reloading

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command, ProjectArgs};
pub use commands::{deploy, run, run_command, serve};
pub use config::{AwsConfig, BundlerConfig, Config, RuntimeConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{deploy_report, write_error, write_response};
