//! Run-mode directive resolution
//!
//! Every worker script declares how it runs on its first line:
//!
//! ```text
//! # 0      -> continuous, launched once and kept alive
//! # 30     -> recurrent, relaunched 30 seconds after each completion
//! ```
//!
//! A missing or malformed directive is an error for that application. It is
//! never defaulted: guessing wrong either busy-loops a script or never runs it.

use std::path::Path;

use crate::domain::RunMode;
use crate::error::{RapidError, Result};

/// Comment prefix that introduces the directive
pub const DIRECTIVE_PREFIX: char = '#';

/// Parse the directive on the first line of a worker artifact
pub fn parse_directive(content: &str) -> Result<RunMode> {
    let first_line = content
        .lines()
        .next()
        .map(|line| line.trim_start_matches('\u{feff}'))
        .ok_or_else(|| RapidError::Directive("artifact is empty".to_string()))?;

    let value = first_line
        .strip_prefix(DIRECTIVE_PREFIX)
        .ok_or_else(|| {
            RapidError::Directive(format!(
                "first line {:?} does not start with '{}'",
                first_line, DIRECTIVE_PREFIX
            ))
        })?
        .trim();

    if value.is_empty() {
        return Err(RapidError::Directive("interval directive is empty".to_string()));
    }

    let secs: u64 = value
        .parse()
        .map_err(|e| RapidError::Directive(format!("invalid interval {:?}: {}", value, e)))?;

    Ok(RunMode::from_interval_secs(secs))
}

/// Read a worker artifact from disk and resolve its run mode
pub async fn resolve_run_mode(path: &Path) -> Result<RunMode> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RapidError::Directive(format!("cannot read {}: {}", path.display(), e)))?;

    parse_directive(&content)
        .map_err(|e| RapidError::Directive(format!("{}: {}", path.display(), e)))
}
