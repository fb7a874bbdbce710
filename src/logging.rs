//! Tracing subscriber setup for the `harvest` binary.
//!
//! `RUST_LOG` wins when set; otherwise `[logging].level` applies. Logs go to
//! stderr so `harvest export` can stream JSON on stdout.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, before any work starts.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}

/// Crate logs at `level`, everything else at `warn`.
fn default_directives(level: &str) -> String {
    format!("blog_harvest={level},harvest={level},warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_crate() {
        assert_eq!(
            default_directives("debug"),
            "blog_harvest=debug,harvest=debug,warn"
        );
        assert!(EnvFilter::try_new(default_directives("info")).is_ok());
    }
}
