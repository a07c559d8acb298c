//! Error types for the isolate shell.

use crate::value::Value;
use core_types::IsolateId;
use std::time::Duration;
use thiserror::Error;

/// A value thrown inside an isolate.
///
/// Only meaningful in the isolate whose heap the value points into; crossing
/// a boundary requires copying it first.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception(pub Value);

impl Exception {
    /// The thrown value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the thrown value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Exception {
    fn from(value: Value) -> Self {
        Exception(value)
    }
}

/// Result of an operation that may throw inside an isolate.
pub type JsResult<T> = Result<T, Exception>;

/// Errors that can occur while driving an isolate from outside.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IsolateError {
    /// The isolate was disposed before or while the call was made
    #[error("Isolate is disposed ({0})")]
    Disposed(IsolateId),

    /// The isolate thread could not be started
    #[error("Failed to spawn isolate thread: {0}")]
    Spawn(String),

    /// Configuration was rejected
    #[error("Invalid isolate configuration: {0}")]
    Config(String),

    /// Blocking call from an isolate into itself
    #[error("Cannot block on {0} from its own thread")]
    SameThread(IsolateId),

    /// Blocking call would close a wait cycle
    #[error("Deadlock detected: {from} is waiting for {to}, which is already waiting on it")]
    Deadlock {
        /// Isolate issuing the call
        from: IsolateId,
        /// Isolate being called
        to: IsolateId,
    },

    /// Caller gave up waiting
    #[error("Operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The task panicked on the isolate thread
    #[error("Isolate task panicked: {0}")]
    TaskPanicked(String),
}

impl From<serde_json::Error> for IsolateError {
    fn from(e: serde_json::Error) -> Self {
        IsolateError::Config(e.to_string())
    }
}

/// Result type alias for isolate operations
pub type IsolateResult<T> = Result<T, IsolateError>;
