//! Isolate configuration.
//!
//! Holds thread parameters and the limits the transfer layer enforces. Can be
//! built in code with the builder methods or loaded from a JSON document;
//! missing fields fall back to [`IsolateConfig::default`].

use crate::error::{IsolateError, IsolateResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default stack size of an isolate thread (8 MiB).
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;
/// Default maximum nesting depth of one copied value.
pub const DEFAULT_MAX_TRANSFER_DEPTH: usize = 1000;
/// Default maximum encoded size of one copied value (64 MiB).
pub const DEFAULT_MAX_TRANSFER_BYTES: usize = 64 * 1024 * 1024;
/// Default total ArrayBuffer budget of one isolate (256 MiB).
pub const DEFAULT_MAX_ARRAY_BUFFER_BYTES: usize = 256 * 1024 * 1024;

/// Configuration of one isolate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolateConfig {
    /// Name used for the thread and in log output
    pub name: Option<String>,
    /// Stack size of the isolate thread in bytes
    pub stack_size: usize,
    /// Maximum nesting depth when copying values out of this isolate
    pub max_transfer_depth: usize,
    /// Maximum encoded size when copying values out of this isolate
    pub max_transfer_bytes: usize,
    /// Total bytes all ArrayBuffers in this isolate may hold
    pub max_array_buffer_bytes: usize,
    /// Timeout applied by callers that do not pass one, in milliseconds
    pub default_timeout_ms: Option<u64>,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            name: None,
            stack_size: DEFAULT_STACK_SIZE,
            max_transfer_depth: DEFAULT_MAX_TRANSFER_DEPTH,
            max_transfer_bytes: DEFAULT_MAX_TRANSFER_BYTES,
            max_array_buffer_bytes: DEFAULT_MAX_ARRAY_BUFFER_BYTES,
            default_timeout_ms: None,
        }
    }
}

impl IsolateConfig {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(text: &str) -> IsolateResult<Self> {
        let config: IsolateConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the isolate name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the thread stack size.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Set the maximum copy depth.
    pub fn with_max_transfer_depth(mut self, depth: usize) -> Self {
        self.max_transfer_depth = depth;
        self
    }

    /// Set the maximum encoded copy size.
    pub fn with_max_transfer_bytes(mut self, bytes: usize) -> Self {
        self.max_transfer_bytes = bytes;
        self
    }

    /// Set the ArrayBuffer budget.
    pub fn with_max_array_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_array_buffer_bytes = bytes;
        self
    }

    /// Set the default caller timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Default caller timeout, if any.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings no isolate can run with.
    pub fn validate(&self) -> IsolateResult<()> {
        if self.stack_size < 64 * 1024 {
            return Err(IsolateError::Config(format!(
                "stack_size must be at least 65536 bytes, got {}",
                self.stack_size
            )));
        }
        if self.max_transfer_depth == 0 {
            return Err(IsolateError::Config(
                "max_transfer_depth must be positive".to_string(),
            ));
        }
        if self.max_transfer_bytes == 0 {
            return Err(IsolateError::Config(
                "max_transfer_bytes must be positive".to_string(),
            ));
        }
        if let Some(name) = &self.name {
            if name.contains('\0') {
                return Err(IsolateError::Config(
                    "name must not contain NUL bytes".to_string(),
                ));
            }
        }
        Ok(())
    }
}
