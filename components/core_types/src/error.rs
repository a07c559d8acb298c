//! JavaScript error types and error handling.
//!
//! This module provides error types that correspond to JavaScript's built-in
//! error types, along with stack trace information.

use crate::{SourcePosition, StackFrame};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of JavaScript error.
///
/// These correspond to JavaScript's built-in error constructors. Anything
/// thrown with a different constructor name is a [`ErrorKind::CustomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Plain `Error`
    Error,
    /// Syntax error in JavaScript code
    SyntaxError,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Reference to an undefined variable
    ReferenceError,
    /// Value out of allowed range
    RangeError,
    /// Error in eval() function
    EvalError,
    /// Error in URI handling functions
    URIError,
    /// User-defined subclass; the real name travels separately
    CustomError,
    /// Internal engine error
    InternalError,
}

impl ErrorKind {
    /// Every kind that has its own constructor in a realm.
    pub const CONSTRUCTORS: [ErrorKind; 7] = [
        ErrorKind::Error,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::ReferenceError,
        ErrorKind::RangeError,
        ErrorKind::EvalError,
        ErrorKind::URIError,
    ];

    /// Constructor name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error | ErrorKind::CustomError => "Error",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::URIError => "URIError",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Classify a constructor name.
    pub fn from_name(name: &str) -> ErrorKind {
        match name {
            "Error" => ErrorKind::Error,
            "SyntaxError" => ErrorKind::SyntaxError,
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "EvalError" => ErrorKind::EvalError,
            "URIError" => ErrorKind::URIError,
            "InternalError" => ErrorKind::InternalError,
            _ => ErrorKind::CustomError,
        }
    }
}

/// A JavaScript error with message and stack trace.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind};
///
/// let error = JsError {
///     kind: ErrorKind::TypeError,
///     message: "undefined is not a function".to_string(),
///     stack: vec![],
///     source_position: None,
/// };
///
/// assert_eq!(error.message, "undefined is not a function");
/// ```
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{}: {message}", kind.name())]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Stack trace (call stack at the time of the error)
    pub stack: Vec<StackFrame>,
    /// Source position where the error occurred
    pub source_position: Option<SourcePosition>,
}

impl JsError {
    /// Create an error without stack or position.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        JsError {
            kind,
            message: message.into(),
            stack: vec![],
            source_position: None,
        }
    }

    /// Create a syntax error at a given position.
    pub fn syntax(message: impl Into<String>, position: SourcePosition) -> Self {
        JsError {
            kind: ErrorKind::SyntaxError,
            message: message.into(),
            stack: vec![],
            source_position: Some(position),
        }
    }

    /// Render `Name: message` followed by one line per frame.
    pub fn stack_string(&self) -> String {
        let mut out = self.to_string();
        for frame in &self.stack {
            out.push('\n');
            out.push_str(&frame.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names_round_trip() {
        for kind in ErrorKind::CONSTRUCTORS {
            assert_eq!(ErrorKind::from_name(kind.name()), kind);
        }
        assert_eq!(ErrorKind::from_name("MyError"), ErrorKind::CustomError);
    }

    #[test]
    fn test_js_error_display() {
        let error = JsError::new(ErrorKind::RangeError, "too big");
        assert_eq!(error.to_string(), "RangeError: too big");
    }
}
