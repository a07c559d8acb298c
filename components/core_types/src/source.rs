//! Source position and stack frame types for JavaScript error tracking.
//!
//! This module provides types for tracking source locations and call stacks
//! in JavaScript execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a position in source code.
///
/// Used for error reporting and by the compiler to tag tokens.
///
/// # Examples
///
/// ```
/// use core_types::SourcePosition;
///
/// let pos = SourcePosition {
///     line: 10,
///     column: 5,
///     offset: 150,
/// };
///
/// assert_eq!(pos.line, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
    /// Byte offset from the start of the source file
    pub offset: usize,
}

impl SourcePosition {
    /// Position of the first character of a source.
    pub fn start() -> Self {
        SourcePosition {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Represents a single frame in a JavaScript call stack.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     function_name: Some("myFunction".to_string()),
///     source_url: Some("file:///main.js".to_string()),
///     line: 25,
///     column: 10,
/// };
///
/// assert_eq!(frame.to_string(), "    at myFunction (file:///main.js:25:10)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Name of the function, or None for anonymous functions
    pub function_name: Option<String>,
    /// URL or file path of the source, or None if not available
    pub source_url: Option<String>,
    /// Line number where the call occurred
    pub line: u32,
    /// Column number where the call occurred
    pub column: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.source_url.as_deref().unwrap_or("<anonymous>");
        match &self.function_name {
            Some(name) => write!(f, "    at {} ({}:{}:{})", name, url, self.line, self.column),
            None => write!(f, "    at {}:{}:{}", url, self.line, self.column),
        }
    }
}
