//! Subcommand implementations.

pub mod config;
pub mod locks;
pub mod serve;
pub mod settings;
pub mod status;
