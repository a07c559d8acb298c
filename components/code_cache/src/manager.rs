//! Compilation with cached data.
//!
//! [`CodeCacheManager::compile`] accepts an optional blob from an earlier
//! compilation and optionally produces a new one. Whatever is wrong with a
//! supplied blob, compilation itself never fails because of it: the blob is
//! rejected (and the rejection logged), the source is compiled from scratch,
//! and the caller learns about it through [`CacheStatus`].

use crate::blob::{source_digest, CacheBlob, CacheRejection, Digest32};
use crate::compiler::{compile_unit, CompiledUnit, UnitKind};
use core_types::{JsError, StackFrame};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// When a consumed blob is written out again on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Always hand back a blob when one is requested
    Always,
    /// Scripts get their blob back; modules that consumed a valid blob do not
    #[default]
    ScriptsOnly,
    /// Never hand back a blob after consuming a valid one
    Never,
}

impl CachePolicy {
    /// Whether a unit of `kind` that consumed valid cached data still
    /// produces a blob when asked to.
    pub fn reemits(&self, kind: UnitKind) -> bool {
        match self {
            CachePolicy::Always => true,
            CachePolicy::ScriptsOnly => kind == UnitKind::Script,
            CachePolicy::Never => false,
        }
    }
}

/// Configuration for one [`CodeCacheManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeCacheConfig {
    /// Re-emit policy for consumed blobs
    pub policy: CachePolicy,
    /// Compiled units kept in memory, keyed by source; `0` disables
    pub source_cache_capacity: usize,
}

impl Default for CodeCacheConfig {
    fn default() -> Self {
        CodeCacheConfig {
            policy: CachePolicy::default(),
            source_cache_capacity: 64,
        }
    }
}

impl CodeCacheConfig {
    /// Set the re-emit policy.
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the in-memory source cache size.
    pub fn with_source_cache_capacity(mut self, capacity: usize) -> Self {
        self.source_cache_capacity = capacity;
        self
    }

    /// Parse from a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Per-call compile options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Produce a blob for later runs
    pub produce_cached_data: bool,
    /// Blob from an earlier run
    pub cached_data: Option<CacheBlob>,
    /// Name used in syntax error locations
    pub filename: Option<String>,
}

impl CompileOptions {
    /// Request a blob.
    pub fn produce_cached_data(mut self) -> Self {
        self.produce_cached_data = true;
        self
    }

    /// Supply a blob.
    pub fn with_cached_data(mut self, blob: CacheBlob) -> Self {
        self.cached_data = Some(blob);
        self
    }

    /// Set the file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// What happened to the supplied blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// No blob was supplied
    NotApplicable,
    /// The blob was valid and used
    Accepted,
    /// The blob was unusable and the source was compiled from scratch
    Rejected(CacheRejection),
}

impl CacheStatus {
    /// `None` when no blob was supplied, `Some(true)` when it was rejected,
    /// `Some(false)` when it was used.
    pub fn cached_data_rejected(&self) -> Option<bool> {
        match self {
            CacheStatus::NotApplicable => None,
            CacheStatus::Accepted => Some(false),
            CacheStatus::Rejected(_) => Some(true),
        }
    }
}

/// Result of [`CodeCacheManager::compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    /// Compiled unit, shared with the manager's source cache
    pub unit: Arc<CompiledUnit>,
    /// File name from the options
    pub filename: Option<String>,
    /// Blob for later runs, when one was requested and produced
    pub cached_data: Option<CacheBlob>,
    /// Fate of the supplied blob
    pub status: CacheStatus,
}

impl CompiledArtifact {
    /// Script or module.
    pub fn kind(&self) -> UnitKind {
        self.unit.kind
    }

    /// See [`CacheStatus::cached_data_rejected`].
    pub fn cached_data_rejected(&self) -> Option<bool> {
        self.status.cached_data_rejected()
    }
}

type SourceKey = (UnitKind, Digest32);

/// Compiles sources and manages their cached data.
#[derive(Debug, Default)]
pub struct CodeCacheManager {
    config: CodeCacheConfig,
    sources: IndexMap<SourceKey, Arc<CompiledUnit>>,
}

impl CodeCacheManager {
    /// Create a manager.
    pub fn new(config: CodeCacheConfig) -> Self {
        CodeCacheManager {
            config,
            sources: IndexMap::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CodeCacheConfig {
        &self.config
    }

    /// Replace the configuration, trimming the source cache if it shrank.
    pub fn set_config(&mut self, config: CodeCacheConfig) {
        self.config = config;
        self.evict();
    }

    /// Units currently held in the source cache.
    pub fn cached_sources(&self) -> usize {
        self.sources.len()
    }

    /// Drop every cached unit.
    pub fn clear(&mut self) {
        self.sources.clear();
    }

    /// Compile `source` as `kind`.
    pub fn compile(
        &mut self,
        source: &str,
        kind: UnitKind,
        options: CompileOptions,
    ) -> Result<CompiledArtifact, JsError> {
        let CompileOptions {
            produce_cached_data,
            cached_data,
            filename,
        } = options;
        let digest = source_digest(kind, source);

        let (status, consumed) = match &cached_data {
            None => (CacheStatus::NotApplicable, None),
            Some(blob) => match blob.validate(kind, &digest) {
                Ok(unit) => {
                    trace!(kind = kind.name(), bytes = blob.len(), "cached data accepted");
                    (CacheStatus::Accepted, Some(Arc::new(unit)))
                }
                Err(reason) => {
                    warn!(
                        kind = kind.name(),
                        filename = filename.as_deref().unwrap_or("<anonymous>"),
                        %reason,
                        "cached data rejected"
                    );
                    (CacheStatus::Rejected(reason), None)
                }
            },
        };

        let unit = match consumed {
            Some(unit) => {
                self.remember((kind, digest), unit.clone());
                unit
            }
            None => self.compile_fresh(source, kind, digest, filename.as_deref())?,
        };

        let cached_data = if !produce_cached_data {
            None
        } else if status == CacheStatus::Accepted {
            if self.config.policy.reemits(kind) {
                cached_data
            } else {
                None
            }
        } else {
            match CacheBlob::produce(&unit, &digest) {
                Ok(blob) => {
                    debug!(kind = kind.name(), bytes = blob.len(), "cached data produced");
                    Some(blob)
                }
                Err(err) => {
                    warn!(kind = kind.name(), error = %err, "failed to produce cached data");
                    None
                }
            }
        };

        Ok(CompiledArtifact {
            unit,
            filename,
            cached_data,
            status,
        })
    }

    fn compile_fresh(
        &mut self,
        source: &str,
        kind: UnitKind,
        digest: Digest32,
        filename: Option<&str>,
    ) -> Result<Arc<CompiledUnit>, JsError> {
        if let Some(unit) = self.sources.get(&(kind, digest)) {
            trace!(kind = kind.name(), "source cache hit");
            return Ok(unit.clone());
        }
        let unit = compile_unit(source, kind).map_err(|err| locate(err, filename))?;
        let unit = Arc::new(unit);
        self.remember((kind, digest), unit.clone());
        Ok(unit)
    }

    fn remember(&mut self, key: SourceKey, unit: Arc<CompiledUnit>) {
        if self.config.source_cache_capacity == 0 {
            return;
        }
        self.sources.insert(key, unit);
        self.evict();
    }

    /// Oldest entries go first.
    fn evict(&mut self) {
        while self.sources.len() > self.config.source_cache_capacity {
            self.sources.shift_remove_index(0);
        }
    }
}

/// Attach the file name to a syntax error as its only frame.
fn locate(mut err: JsError, filename: Option<&str>) -> JsError {
    if let Some(position) = err.source_position {
        err.stack.push(StackFrame {
            function_name: None,
            source_url: filename.map(str::to_string),
            line: position.line,
            column: position.column,
        });
    }
    err
}
