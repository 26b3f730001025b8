//! Secret references in configuration values and CLI arguments.
//!
//! A client id or secret may be given as:
//!
//! - `pass::path/in/store`: first line of `pass show path/in/store`
//! - `env::VAR_NAME`: the value of `$VAR_NAME`
//! - anything else: used verbatim

use crate::error::{ClientError, ClientResult};

/// True if `value` is a `pass::` or `env::` reference.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("pass::") || value.starts_with("env::")
}

/// Expands a secret reference, or returns plain values unchanged.
pub fn resolve(value: &str) -> ClientResult<String> {
    if let Some(entry) = value.strip_prefix("pass::") {
        from_pass(entry)
    } else if let Some(var) = value.strip_prefix("env::") {
        std::env::var(var)
            .map_err(|_| ClientError::Secret(format!("environment variable `{}` is not set", var)))
    } else {
        Ok(value.to_string())
    }
}

fn from_pass(entry: &str) -> ClientResult<String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(entry)
        .output()
        .map_err(|e| ClientError::Secret(format!("failed to run `pass show {}`: {}", entry, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ClientError::Secret(format!(
            "`pass show {}` failed ({}): {}",
            entry,
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| ClientError::Secret(format!("`pass show {}` printed nothing", entry)))
}
