//! Compiling on an isolate's thread.
//!
//! Each isolate keeps its own [`CodeCacheManager`] in a scope slot, created
//! on first use with the default configuration.

use crate::compiler::UnitKind;
use crate::manager::{CodeCacheConfig, CodeCacheManager, CompileOptions, CompiledArtifact};
use core_types::JsError;
use isolate::{IsolateError, IsolateHandle, Scope};
use std::future::Future;
use thiserror::Error;

/// Failure of a compile routed through an isolate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The source does not compile
    #[error(transparent)]
    Syntax(#[from] JsError),

    /// The isolate could not run the compile
    #[error(transparent)]
    Isolate(#[from] IsolateError),
}

/// The isolate's manager, created on first use.
pub fn code_cache(scope: &mut Scope) -> &mut CodeCacheManager {
    scope.slot_or_insert_with(CodeCacheManager::default)
}

fn compile_in(
    scope: &mut Scope,
    source: &str,
    kind: UnitKind,
    options: CompileOptions,
) -> Result<CompiledArtifact, JsError> {
    code_cache(scope).compile(source, kind, options)
}

/// Compile entry points added to [`IsolateHandle`].
pub trait IsolateCompileExt {
    /// Replace the isolate's code cache configuration.
    fn configure_code_cache(&self, config: CodeCacheConfig) -> Result<(), CompileError>;

    /// Compile a script on the isolate thread, blocking.
    fn compile_script_sync(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> Result<CompiledArtifact, CompileError>;

    /// Compile a module on the isolate thread, blocking.
    fn compile_module_sync(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> Result<CompiledArtifact, CompileError>;

    /// Compile a script on the isolate thread.
    fn compile_script(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> impl Future<Output = Result<CompiledArtifact, CompileError>> + Send;

    /// Compile a module on the isolate thread.
    fn compile_module(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> impl Future<Output = Result<CompiledArtifact, CompileError>> + Send;
}

fn compile_sync(
    handle: &IsolateHandle,
    source: String,
    kind: UnitKind,
    options: CompileOptions,
) -> Result<CompiledArtifact, CompileError> {
    let artifact = handle.run_sync(move |scope| compile_in(scope, &source, kind, options))?;
    Ok(artifact?)
}

async fn compile_async(
    handle: IsolateHandle,
    source: String,
    kind: UnitKind,
    options: CompileOptions,
) -> Result<CompiledArtifact, CompileError> {
    let artifact = handle
        .run_async(move |scope| compile_in(scope, &source, kind, options))
        .await?;
    Ok(artifact?)
}

impl IsolateCompileExt for IsolateHandle {
    fn configure_code_cache(&self, config: CodeCacheConfig) -> Result<(), CompileError> {
        self.run_sync(move |scope| code_cache(scope).set_config(config))?;
        Ok(())
    }

    fn compile_script_sync(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> Result<CompiledArtifact, CompileError> {
        compile_sync(self, source.into(), UnitKind::Script, options)
    }

    fn compile_module_sync(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> Result<CompiledArtifact, CompileError> {
        compile_sync(self, source.into(), UnitKind::Module, options)
    }

    fn compile_script(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> impl Future<Output = Result<CompiledArtifact, CompileError>> + Send {
        compile_async(self.clone(), source.into(), UnitKind::Script, options)
    }

    fn compile_module(
        &self,
        source: impl Into<String>,
        options: CompileOptions,
    ) -> impl Future<Output = Result<CompiledArtifact, CompileError>> + Send {
        compile_async(self.clone(), source.into(), UnitKind::Module, options)
    }
}
