//! Serialized, shareable form of an [`IsolatedValue`].
//!
//! Layout: magic `ISVT`, one format version byte, then the bincode payload
//! of the value tree. The bytes hold no heap pointers and never change after
//! construction, so a buffer can be decoded any number of times into any
//! isolate on any thread.
//!
//! A buffer also holds clones of the reference handles named in its payload,
//! so their targets stay retained for as long as the buffer lives.

use crate::error::TransferError;
use crate::reference::ReferenceHandle;
use crate::value::IsolatedValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"ISVT";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 5;

static TOTAL_EXTERNAL_SIZE: AtomicUsize = AtomicUsize::new(0);

struct Storage {
    bytes: Vec<u8>,
    references: Vec<ReferenceHandle>,
}

impl Storage {
    fn new(bytes: Vec<u8>, references: Vec<ReferenceHandle>) -> Self {
        TOTAL_EXTERNAL_SIZE.fetch_add(bytes.len(), Ordering::Relaxed);
        Storage { bytes, references }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        TOTAL_EXTERNAL_SIZE.fetch_sub(self.bytes.len(), Ordering::Relaxed);
    }
}

/// Immutable serialized value, cheap to clone and safe to share.
#[derive(Clone)]
pub struct TransferBuffer {
    storage: Arc<Storage>,
}

impl TransferBuffer {
    /// Serialize a value tree.
    pub fn from_value(value: &IsolatedValue) -> Result<Self, TransferError> {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bincode::serialize_into(&mut bytes, value)
            .map_err(|e| TransferError::CorruptData(e.to_string()))?;
        Ok(TransferBuffer {
            storage: Arc::new(Storage::new(bytes, value.references())),
        })
    }

    /// Wrap bytes produced by [`TransferBuffer::as_bytes`], checking the header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TransferError> {
        if bytes.len() < HEADER_LEN {
            return Err(TransferError::CorruptData(
                "Too few bytes for transfer header".to_string(),
            ));
        }
        if &bytes[0..4] != MAGIC {
            return Err(TransferError::CorruptData("Invalid magic number".to_string()));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(TransferError::CorruptData(format!(
                "Unsupported version: {}",
                bytes[4]
            )));
        }
        // A payload that fails to parse here fails again in to_value.
        let references = bincode::deserialize::<IsolatedValue>(&bytes[HEADER_LEN..])
            .map(|value| value.references())
            .unwrap_or_default();
        Ok(TransferBuffer {
            storage: Arc::new(Storage::new(bytes, references)),
        })
    }

    /// Deserialize the value tree.
    pub fn to_value(&self) -> Result<IsolatedValue, TransferError> {
        bincode::deserialize(&self.storage.bytes[HEADER_LEN..])
            .map_err(|e| TransferError::CorruptData(e.to_string()))
    }

    /// Reference handles kept alive by this buffer.
    pub(crate) fn references(&self) -> &[ReferenceHandle] {
        &self.storage.references
    }

    /// Serialized bytes including the header.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.storage.bytes.len()
    }

    /// Always false; a valid buffer carries at least its header.
    pub fn is_empty(&self) -> bool {
        self.storage.bytes.is_empty()
    }

    /// Bytes held by all live transfer buffers in the process.
    pub fn total_external_size() -> usize {
        TOTAL_EXTERNAL_SIZE.load(Ordering::Relaxed)
    }
}

impl PartialEq for TransferBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage) || self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("len", &self.len())
            .field("references", &self.storage.references.len())
            .finish()
    }
}

impl Serialize for TransferBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for TransferBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        TransferBuffer::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}
