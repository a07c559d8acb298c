//! Buffer/typed-view bridge.
//!
//! Copies binary views bit for bit. The backing ArrayBuffer is encoded as a
//! sub-object of the view, so two views over one buffer still share a
//! buffer after decode.

use crate::codec::{Decoder, Encoder};
use crate::error::TransferError;
use crate::value::IsolatedValue;
use isolate::{ObjectId, Value, ViewKind};
use serde::{Deserialize, Serialize};

/// Encoded binary view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedView {
    /// Backing buffer: an `ArrayBuffer` leaf or a back-reference to one
    pub buffer: IsolatedValue,
    /// View kind
    pub kind: ViewKind,
    /// Start of the view in the buffer
    pub byte_offset: usize,
    /// Length of the view in bytes
    pub byte_length: usize,
    /// Element size, repeated for validation
    pub element_width: usize,
    /// Whether the view carried the source isolate's buffer-like prototype
    pub buffer_like: bool,
}

impl EncodedView {
    /// Number of elements covered.
    pub fn length(&self) -> usize {
        self.byte_length / self.kind.element_width()
    }

    /// Check the layout fields for internal consistency.
    pub fn validate(&self) -> Result<(), TransferError> {
        let width = self.kind.element_width();
        if self.element_width != width {
            return Err(TransferError::CorruptData(format!(
                "{} element width {} does not match {}",
                self.kind.name(),
                self.element_width,
                width
            )));
        }
        if self.byte_offset % width != 0 || self.byte_length % width != 0 {
            return Err(TransferError::CorruptData(format!(
                "{} at offset {} with length {} is not aligned to {} bytes",
                self.kind.name(),
                self.byte_offset,
                self.byte_length,
                width
            )));
        }
        if self.buffer_like && self.kind != ViewKind::Uint8 {
            return Err(TransferError::CorruptData(format!(
                "{} cannot be buffer-like",
                self.kind.name()
            )));
        }
        Ok(())
    }
}

/// Encode the view `view`; the caller encodes its extra properties.
pub(crate) fn encode_view(
    encoder: &mut Encoder<'_>,
    view: ObjectId,
) -> Result<EncodedView, TransferError> {
    let scope = &*encoder.scope;
    let data = scope
        .view_data(view)
        .ok_or_else(|| TransferError::UnserializableValue("#<Object>".to_string()))?;
    if scope.is_detached(data.buffer) {
        return Err(TransferError::UnserializableValue(format!(
            "{} over a detached ArrayBuffer",
            data.kind.name()
        )));
    }
    let buffer_like = data.kind == ViewKind::Uint8
        && scope.buffer_prototype().is_some()
        && scope.object(view).prototype == scope.buffer_prototype();

    let buffer = encoder.encode_object(data.buffer)?;
    Ok(EncodedView {
        buffer,
        kind: data.kind,
        byte_offset: data.byte_offset,
        byte_length: data.byte_length,
        element_width: data.kind.element_width(),
        buffer_like,
    })
}

/// Rebuild a view in the decoder's isolate and return it.
///
/// Buffer-like views get the destination's registered buffer prototype when
/// there is one, and the realm's `Uint8Array.prototype` otherwise.
pub(crate) fn decode_view(
    decoder: &mut Decoder<'_>,
    view: &EncodedView,
) -> Result<ObjectId, TransferError> {
    view.validate()?;
    let slot = decoder.reserve();
    let buffer = match decoder.decode_value(&view.buffer)? {
        Value::Object(id) if decoder.scope.is_array_buffer(id) => id,
        _ => {
            return Err(TransferError::CorruptData(format!(
                "{} payload does not reference an ArrayBuffer",
                view.kind.name()
            )));
        }
    };
    let buffer_len = decoder.scope.array_buffer_len(buffer);
    if view
        .byte_offset
        .checked_add(view.byte_length)
        .map_or(true, |end| end > buffer_len)
    {
        return Err(TransferError::CorruptData(format!(
            "{} range {}..{} is outside a buffer of {} bytes",
            view.kind.name(),
            view.byte_offset,
            view.byte_offset.saturating_add(view.byte_length),
            buffer_len
        )));
    }
    let created = decoder
        .scope
        .new_view(view.kind, buffer, view.byte_offset, view.byte_length);
    let id = decoder.check(created)?;
    if view.buffer_like {
        if let Some(prototype) = decoder.scope.buffer_prototype() {
            decoder.scope.set_prototype(id, Some(prototype));
        }
    }
    decoder.fill(slot, Value::Object(id));
    Ok(id)
}
