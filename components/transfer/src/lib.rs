//! Moving values between isolates.
//!
//! Nothing an isolate allocates may be touched from outside it. This crate
//! provides the three ways values still get across:
//!
//! - **Copy**: [`encode`] turns a value into an [`IsolatedValue`] tree (or a
//!   [`TransferBuffer`]) and [`decode`] rebuilds an independent graph in the
//!   receiving isolate. Shared sub-objects and cycles survive.
//! - **Reference**: a [`ReferenceHandle`] names a value that stays in its
//!   owner; `get`, `set`, `delete`, `apply` and `copy` run on the owner
//!   thread and marshal their results back.
//! - **Transferable**: primitives, references and pre-serialized copies pass
//!   through as they are; see [`transfer`] and [`receive`].
//!
//! A copy can also move ArrayBuffers instead of duplicating them (see
//! [`CopyOptions`]); the source buffers are detached.
//!
//! # Examples
//!
//! ```
//! use isolate::{IsolateConfig, IsolateHandle};
//! use transfer::{IsolateTransferExt, TransferMode, Transferred};
//!
//! let isolate = IsolateHandle::new(IsolateConfig::default()).unwrap();
//! let global = isolate.global_reference().unwrap();
//! global
//!     .set_sync("greeting", Transferred::primitive("hi".into()).unwrap())
//!     .unwrap();
//! let got = global.get_sync("greeting", TransferMode::Copy).unwrap();
//! assert_eq!(got.to_isolated().unwrap(), Some("hi".into()));
//! isolate.dispose().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod codec;
pub mod error;
pub mod marshal;
pub mod reference;
pub mod typed_view;
pub mod value;

pub use buffer::TransferBuffer;
pub use codec::{
    decode, decode_buffer, encode, encode_to_buffer, encode_to_buffer_with, encode_with, CopyOptions,
};
pub use error::{TransferError, NON_ERROR_THROWN};
pub use marshal::{receive, transfer, transfer_with, TransferMode, Transferred};
pub use reference::{
    register_buffer_prototype, register_buffer_prototype_in, ApplyOptions, IsolateTransferExt,
    ReferenceHandle, ReferenceTable,
};
pub use typed_view::EncodedView;
pub use value::IsolatedValue;
