//! Cache blob format.
//!
//! ```text
//! magic "ISCC" | format u16 LE | kind u8 | engine sha256 | source sha256 | payload sha256 | payload
//! payload: unit info length u32 LE | bincode unit info | bytecode chunk
//! ```
//!
//! The unit info holds the declarations, dependency specifiers and exports;
//! the rest of the payload is the top-level [`BytecodeChunk`] in its own
//! encoding. A blob is only accepted when every header field matches the
//! running engine and the source being compiled, the payload hashes to the
//! recorded checksum, and the bytecode decodes to a consistent chunk.

use crate::bytecode::{BytecodeChunk, CHUNK_VERSION};
use crate::compiler::{CompiledUnit, Declaration, UnitKind};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Blob magic.
pub const CACHE_MAGIC: [u8; 4] = *b"ISCC";

/// Blob format version.
pub const CACHE_FORMAT_VERSION: u16 = 2;

const DIGEST_LEN: usize = 32;
const KIND_OFFSET: usize = 6;
const ENGINE_OFFSET: usize = 7;
const SOURCE_OFFSET: usize = ENGINE_OFFSET + DIGEST_LEN;
const CHECKSUM_OFFSET: usize = SOURCE_OFFSET + DIGEST_LEN;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = CHECKSUM_OFFSET + DIGEST_LEN;

/// A SHA-256 digest.
pub type Digest32 = [u8; DIGEST_LEN];

static ENGINE_FINGERPRINT: Lazy<Digest32> = Lazy::new(|| {
    let mut hasher = Sha256::new();
    hasher.update(env!("CARGO_PKG_NAME").as_bytes());
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update(CACHE_FORMAT_VERSION.to_le_bytes());
    hasher.update([CHUNK_VERSION]);
    hasher.update(usize::BITS.to_le_bytes());
    hasher.update(if cfg!(target_endian = "little") { b"le" } else { b"be" });
    hasher.finalize().into()
});

/// Digest identifying the engine build that can read a blob.
pub fn engine_fingerprint() -> Digest32 {
    *ENGINE_FINGERPRINT
}

/// Digest of `source` compiled as `kind`.
pub fn source_digest(kind: UnitKind, source: &str) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(kind.name().as_bytes());
    hasher.update([0u8]);
    hasher.update(source.as_bytes());
    hasher.finalize().into()
}

fn checksum(payload: &[u8]) -> Digest32 {
    Sha256::digest(payload).into()
}

/// Why a supplied blob was not used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheRejection {
    /// Shorter than the header
    #[error("cache data too short ({0} bytes)")]
    TooShort(usize),

    /// Not a cache blob
    #[error("cache data has a bad magic number")]
    BadMagic,

    /// Written by another format version
    #[error("cache format version {found} does not match {expected}")]
    VersionMismatch {
        /// Version in the blob
        found: u16,
        /// Version this build reads
        expected: u16,
    },

    /// Written by another engine build
    #[error("cache data was produced by a different engine")]
    EngineMismatch,

    /// Script blob offered for a module or the other way round
    #[error("cache data is for a {found}, not a {expected}")]
    KindMismatch {
        /// Kind being compiled
        expected: &'static str,
        /// Kind recorded in the blob
        found: &'static str,
    },

    /// Produced from different source text
    #[error("cache data does not match the source")]
    SourceMismatch,

    /// Payload bytes were altered
    #[error("cache data checksum mismatch")]
    ChecksumMismatch,

    /// Header is fine but the payload does not decode
    #[error("cache payload is malformed: {0}")]
    MalformedPayload(String),
}

/// Unit fields stored next to the bytecode.
#[derive(Serialize, Deserialize)]
struct UnitInfo {
    kind: UnitKind,
    declarations: Vec<Declaration>,
    dependency_specifiers: Vec<String>,
    exports: Vec<String>,
}

/// Serialized compilation result.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheBlob {
    bytes: Vec<u8>,
}

impl fmt::Debug for CacheBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBlob")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl CacheBlob {
    /// Serialize `unit` for the source with digest `source`.
    pub(crate) fn produce(unit: &CompiledUnit, source: &Digest32) -> Result<CacheBlob, bincode::Error> {
        let info = bincode::serialize(&UnitInfo {
            kind: unit.kind,
            declarations: unit.declarations.clone(),
            dependency_specifiers: unit.dependency_specifiers.clone(),
            exports: unit.exports.clone(),
        })?;
        let chunk = unit.chunk.to_bytes();
        let mut payload = Vec::with_capacity(4 + info.len() + chunk.len());
        payload.extend_from_slice(&(info.len() as u32).to_le_bytes());
        payload.extend_from_slice(&info);
        payload.extend_from_slice(&chunk);
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&CACHE_MAGIC);
        bytes.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
        bytes.push(unit.kind.tag());
        bytes.extend_from_slice(&engine_fingerprint());
        bytes.extend_from_slice(source);
        bytes.extend_from_slice(&checksum(&payload));
        bytes.extend_from_slice(&payload);
        Ok(CacheBlob { bytes })
    }

    /// Wrap bytes from storage. Nothing is checked until the blob is used.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> CacheBlob {
        CacheBlob {
            bytes: bytes.into(),
        }
    }

    /// Raw bytes for storage.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the blob to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }

    /// Read a blob from `path`.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<CacheBlob> {
        std::fs::read(path).map(CacheBlob::from_bytes)
    }

    /// Check the blob against `kind` and `source` and decode its unit.
    pub(crate) fn validate(&self, kind: UnitKind, source: &Digest32) -> Result<CompiledUnit, CacheRejection> {
        let bytes = &self.bytes;
        if bytes.len() < HEADER_LEN {
            return Err(CacheRejection::TooShort(bytes.len()));
        }
        if bytes[..4] != CACHE_MAGIC {
            return Err(CacheRejection::BadMagic);
        }
        let found = u16::from_le_bytes([bytes[4], bytes[5]]);
        if found != CACHE_FORMAT_VERSION {
            return Err(CacheRejection::VersionMismatch {
                found,
                expected: CACHE_FORMAT_VERSION,
            });
        }
        if bytes[ENGINE_OFFSET..SOURCE_OFFSET] != engine_fingerprint() {
            return Err(CacheRejection::EngineMismatch);
        }
        let recorded = UnitKind::from_tag(bytes[KIND_OFFSET]).ok_or_else(|| {
            CacheRejection::MalformedPayload(format!("unknown unit kind {}", bytes[KIND_OFFSET]))
        })?;
        if recorded != kind {
            return Err(CacheRejection::KindMismatch {
                expected: kind.name(),
                found: recorded.name(),
            });
        }
        if bytes[SOURCE_OFFSET..CHECKSUM_OFFSET] != source[..] {
            return Err(CacheRejection::SourceMismatch);
        }
        let payload = &bytes[HEADER_LEN..];
        if bytes[CHECKSUM_OFFSET..HEADER_LEN] != checksum(payload) {
            return Err(CacheRejection::ChecksumMismatch);
        }
        decode_payload(payload, kind)
    }
}

fn decode_payload(payload: &[u8], kind: UnitKind) -> Result<CompiledUnit, CacheRejection> {
    let malformed = CacheRejection::MalformedPayload;
    if payload.len() < 4 {
        return Err(malformed("payload has no unit info length".to_string()));
    }
    let (length, rest) = payload.split_at(4);
    let length = u32::from_le_bytes([length[0], length[1], length[2], length[3]]) as usize;
    if length > rest.len() {
        return Err(malformed(format!(
            "unit info length {} exceeds payload",
            length
        )));
    }
    let (info, chunk) = rest.split_at(length);
    let info: UnitInfo = bincode::deserialize(info).map_err(|e| malformed(e.to_string()))?;
    if info.kind != kind {
        return Err(malformed("payload kind disagrees with header".to_string()));
    }
    let chunk = BytecodeChunk::from_bytes(chunk).map_err(|e| malformed(e.to_string()))?;
    Ok(CompiledUnit {
        kind: info.kind,
        declarations: info.declarations,
        dependency_specifiers: info.dependency_specifiers,
        exports: info.exports,
        chunk,
    })
}
