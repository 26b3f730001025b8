//! CLI: daemon launcher, calendar settings, lock inspection
//!
//! This crate provides the `absence` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::{ClientError, ClientResult};
