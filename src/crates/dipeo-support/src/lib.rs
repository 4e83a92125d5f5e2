//! Ambient stack shared across the DiPeO execution core: error-context
//! helpers, env-driven configuration, structured logging, and async
//! retry. None of this is DiPeO-specific; it is carried from the
//! teacher's `tooling` crate because the ambient stack stays even where
//! a spec's Non-goals exclude specific features.
//!
//! # Modules
//!
//! - `config` - `ConfigBuilder` trait + environment variable loading
//! - `error` - error context and chain formatting
//! - `async_utils` - retry policies and timeout wrappers for async operations
//! - `logging` - structured logging helpers built on `tracing`

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by this crate's own helpers (env parsing, validation).
#[derive(Debug, Error)]
pub enum SupportError {
    #[error("configuration error: {0}")]
    General(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SupportError>;

/// Execution-level knobs toggled by environment variables (§4.4, §5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// §4.4: strict mode fails fast on resolution ambiguity; loose mode
    /// falls back to raw bodies and prefers continuity.
    pub strict_mode: bool,
    /// §5: default `bounded(n)` width when a node declares no explicit
    /// concurrency policy but the scheduler needs a budget.
    pub default_bounded_concurrency: usize,
    /// §6: bounded lifecycle-event queue size before drop-oldest kicks in.
    pub event_buffer_size: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            default_bounded_concurrency: 4,
            event_buffer_size: 100,
        }
    }
}

impl config::ConfigBuilder for ExecutionOptions {
    fn validate(&self) -> Result<()> {
        if self.default_bounded_concurrency == 0 {
            return Err(SupportError::General(
                "default_bounded_concurrency must be non-zero".into(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(SupportError::General(
                "event_buffer_size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> Result<Self> {
        use config::{get_env_bool, get_env_parse_or};
        let opts = Self {
            strict_mode: get_env_bool(&format!("{prefix}STRICT_MODE"))?.unwrap_or(false),
            default_bounded_concurrency: get_env_parse_or(
                &format!("{prefix}BOUNDED_CONCURRENCY"),
                4,
            )?,
            event_buffer_size: get_env_parse_or(&format!("{prefix}EVENT_BUFFER_SIZE"), 100)?,
        };
        opts.validate()?;
        Ok(opts)
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        *self = other;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ConfigBuilder;

    #[test]
    fn defaults_are_valid() {
        assert!(ExecutionOptions::default().validate().is_ok());
    }

    #[test]
    fn from_env_reads_prefixed_vars() {
        std::env::set_var("DIPEO_TEST_STRICT_MODE", "true");
        let opts = ExecutionOptions::from_env("DIPEO_TEST_").unwrap();
        assert!(opts.strict_mode);
        std::env::remove_var("DIPEO_TEST_STRICT_MODE");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut opts = ExecutionOptions::default();
        opts.default_bounded_concurrency = 0;
        assert!(opts.validate().is_err());
    }
}
