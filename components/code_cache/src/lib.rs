//! Compilation cache for scripts and modules.
//!
//! Sources are parsed and compiled to a [`CompiledUnit`]: top-level
//! declarations, dependency specifiers, exports and a [`BytecodeChunk`].
//! A unit can be serialized into a [`CacheBlob`]. Feeding that blob back on
//! a later compile skips parsing and code generation when it is still valid
//! for the source and engine; an invalid blob is reported through
//! [`CacheStatus`] and never fails the compile.
//!
//! # Examples
//!
//! ```
//! use code_cache::{CodeCacheManager, CompileOptions, UnitKind};
//!
//! let mut manager = CodeCacheManager::default();
//! let first = manager
//!     .compile("let x = 1;", UnitKind::Script, CompileOptions::default().produce_cached_data())
//!     .unwrap();
//! let blob = first.cached_data.unwrap();
//!
//! let second = manager
//!     .compile("let x = 1;", UnitKind::Script, CompileOptions::default().with_cached_data(blob))
//!     .unwrap();
//! assert_eq!(second.cached_data_rejected(), Some(false));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ast;
pub mod blob;
pub mod bytecode;
pub mod codegen;
pub mod compiler;
pub mod isolate_ext;
pub mod lexer;
pub mod manager;
pub mod parser;

pub use blob::{engine_fingerprint, source_digest, CacheBlob, CacheRejection};
pub use bytecode::{BytecodeChunk, ChunkError, Constant, Opcode};
pub use codegen::BytecodeGenerator;
pub use compiler::{compile_unit, CompiledUnit, Declaration, DeclarationKind, UnitKind};
pub use isolate_ext::{code_cache, CompileError, IsolateCompileExt};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse, Parser};
pub use manager::{
    CachePolicy, CacheStatus, CodeCacheConfig, CodeCacheManager, CompileOptions, CompiledArtifact,
};
