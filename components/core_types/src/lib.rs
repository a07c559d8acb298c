//! Core types shared by every isolate component.
//!
//! This crate provides the foundational types used across the isolate
//! runtime: isolate identity, JavaScript error categories, and source
//! location tracking.
//!
//! # Overview
//!
//! - [`IsolateId`] - Process-unique identity of an isolate
//! - [`JsError`] - JavaScript errors with stack traces
//! - [`ErrorKind`] - Built-in JavaScript error constructors
//! - [`SourcePosition`] - Source code location
//! - [`StackFrame`] - Call stack frame information
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, IsolateId, JsError};
//!
//! let first = IsolateId::next();
//! let second = IsolateId::next();
//! assert_ne!(first, second);
//!
//! let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
//! assert_eq!(error.to_string(), "TypeError: undefined is not a function");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod id;
mod source;

pub use error::{ErrorKind, JsError};
pub use id::IsolateId;
pub use source::{SourcePosition, StackFrame};
