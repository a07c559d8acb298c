//! Isolate shell: independent heaps running on dedicated threads.
//!
//! An isolate is a realm (global object plus intrinsics) and an object heap
//! owned by one OS thread. Nothing inside it is shared with the host or with
//! other isolates; the only way in is to submit a closure through an
//! [`IsolateHandle`], which runs it with the isolate's [`Scope`].
//!
//! # Overview
//!
//! - [`IsolateHandle`] - Create, drive and dispose isolates
//! - [`Scope`] - Object model API available on the isolate thread
//! - [`Value`] / [`ObjectId`] - Values local to one heap
//! - [`ViewKind`] - Closed set of binary view kinds
//! - [`IsolateConfig`] - Thread parameters and transfer limits
//!
//! # Examples
//!
//! ```
//! use isolate::{IsolateConfig, IsolateHandle, Value};
//!
//! let isolate = IsolateHandle::new(IsolateConfig::default()).unwrap();
//! let keys = isolate
//!     .run_sync(|scope| {
//!         let obj = scope.new_object();
//!         scope.set(obj, "answer", Value::from(42)).unwrap();
//!         scope.own_keys(obj).unwrap()
//!     })
//!     .unwrap();
//! assert_eq!(keys, vec!["answer".to_string()]);
//! isolate.dispose().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod directory;
pub mod error;
pub mod handle;
pub mod heap;
pub mod realm;
pub mod runner;
pub mod scope;
pub mod typed_array;
pub mod value;

pub use config::IsolateConfig;
pub use directory::live_isolates;
pub use error::{Exception, IsolateError, IsolateResult, JsResult};
pub use handle::IsolateHandle;
pub use heap::{ArrayElements, CallInfo, ObjectId, ObjectKind, ViewData};
pub use realm::Intrinsics;
pub use runner::current_isolate;
pub use scope::{array_index, Scope, MAX_STRING_LENGTH};
pub use typed_array::ViewKind;
pub use value::Value;

pub use core_types::{ErrorKind, IsolateId, JsError};
