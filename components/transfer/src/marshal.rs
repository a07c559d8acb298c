//! Transfer modes and the `transfer`/`receive` pair.

use crate::buffer::TransferBuffer;
use crate::codec::{self, CopyOptions};
use crate::error::TransferError;
use crate::reference::ReferenceHandle;
use crate::value::IsolatedValue;
use isolate::{Scope, Value};
use serde::{Deserialize, Serialize};

/// How a value crosses an isolate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    /// Deep copy
    Copy,
    /// Opaque handle to the value, which stays where it is
    Reference,
    /// Primitives, references and external copies only
    #[default]
    Transferable,
}

/// A value in flight between isolates.
#[derive(Debug, Clone, PartialEq)]
pub enum Transferred {
    /// Serialized copy (or primitive)
    Buffer(TransferBuffer),
    /// Handle to a value in its owner isolate
    Reference(ReferenceHandle),
}

impl Transferred {
    /// Copy payload, if this is a buffer.
    pub fn to_isolated(&self) -> Result<Option<IsolatedValue>, TransferError> {
        match self {
            Transferred::Buffer(buffer) => buffer.to_value().map(Some),
            Transferred::Reference(_) => Ok(None),
        }
    }

    /// Reference payload, if this is a reference.
    pub fn as_reference(&self) -> Option<&ReferenceHandle> {
        match self {
            Transferred::Reference(handle) => Some(handle),
            Transferred::Buffer(_) => None,
        }
    }

    /// A primitive ready to send.
    pub fn primitive(value: IsolatedValue) -> Result<Self, TransferError> {
        if !value.is_primitive() {
            return Err(TransferError::NonTransferable);
        }
        TransferBuffer::from_value(&value).map(Transferred::Buffer)
    }
}

impl From<ReferenceHandle> for Transferred {
    fn from(handle: ReferenceHandle) -> Self {
        Transferred::Reference(handle)
    }
}

impl From<TransferBuffer> for Transferred {
    fn from(buffer: TransferBuffer) -> Self {
        Transferred::Buffer(buffer)
    }
}

/// Prepare `value` from `scope` for another isolate.
pub fn transfer(scope: &mut Scope, value: &Value, mode: TransferMode) -> Result<Transferred, TransferError> {
    transfer_with(scope, value, mode, &CopyOptions::default())
}

/// [`transfer`], moving ArrayBuffers per `options` when `mode` copies.
///
/// The other modes never copy, so a non-empty transfer list is rejected
/// for them rather than ignored.
pub fn transfer_with(
    scope: &mut Scope,
    value: &Value,
    mode: TransferMode,
    options: &CopyOptions,
) -> Result<Transferred, TransferError> {
    if mode != TransferMode::Copy && *options != CopyOptions::default() {
        return Err(TransferError::UnserializableValue(
            "A transfer list requires copy mode".to_string(),
        ));
    }
    match mode {
        TransferMode::Copy => {
            codec::encode_to_buffer_with(scope, value, options).map(Transferred::Buffer)
        }
        TransferMode::Reference => Ok(Transferred::Reference(ReferenceHandle::new(
            scope,
            value.clone(),
        ))),
        TransferMode::Transferable => {
            if value.is_primitive() || scope.host_data::<TransferBuffer>(value).is_some() {
                return codec::encode_to_buffer(scope, value).map(Transferred::Buffer);
            }
            match scope.host_data::<ReferenceHandle>(value) {
                Some(handle) => Ok(Transferred::Reference((*handle).clone())),
                None => Err(TransferError::NonTransferable),
            }
        }
    }
}

/// Materialize a transferred value inside `scope`.
///
/// A reference owned by `scope`'s isolate resolves to the original value;
/// any other reference becomes a reference object.
pub fn receive(scope: &mut Scope, value: &Transferred) -> Result<Value, TransferError> {
    match value {
        Transferred::Buffer(buffer) => codec::decode_buffer(scope, buffer),
        Transferred::Reference(handle) => handle.clone().into_value(scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isolate::{IsolateConfig, IsolateId};

    fn scope() -> Scope {
        Scope::new(IsolateId::next(), IsolateConfig::default())
    }

    #[test]
    fn test_transferable_accepts_primitives() {
        let mut scope = scope();
        let sent = transfer(&mut scope, &Value::from(3), TransferMode::default()).unwrap();
        assert_eq!(receive(&mut scope, &sent).unwrap(), Value::from(3));
    }

    #[test]
    fn test_transferable_rejects_plain_objects() {
        let mut scope = scope();
        let obj = scope.new_object();
        assert_eq!(
            transfer(&mut scope, &Value::Object(obj), TransferMode::Transferable),
            Err(TransferError::NonTransferable)
        );
    }

    #[test]
    fn test_reference_mode_round_trips_identity() {
        let mut scope = scope();
        let obj = scope.new_object();
        let sent = transfer(&mut scope, &Value::Object(obj), TransferMode::Reference).unwrap();
        assert_eq!(receive(&mut scope, &sent).unwrap(), Value::Object(obj));
    }

    #[test]
    fn test_copy_mode_breaks_identity() {
        let mut scope = scope();
        let obj = scope.new_object();
        scope.set(obj, "k", Value::from("v")).unwrap();
        let sent = transfer(&mut scope, &Value::Object(obj), TransferMode::Copy).unwrap();
        let copy = receive(&mut scope, &sent).unwrap().as_object().unwrap();
        assert_ne!(copy, obj);
        assert_eq!(scope.get(copy, "k").unwrap(), Value::from("v"));
    }

    #[test]
    fn test_copy_with_transfer_list_moves_buffer() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer_from(vec![5, 6]).unwrap();
        let options = CopyOptions::default().with_transfer(buffer);
        let sent = transfer_with(&mut scope, &Value::Object(buffer), TransferMode::Copy, &options).unwrap();
        assert!(scope.is_detached(buffer));
        let received = receive(&mut scope, &sent).unwrap().as_object().unwrap();
        assert_eq!(scope.array_buffer_bytes(received).unwrap(), &[5, 6]);
    }

    #[test]
    fn test_transfer_list_outside_copy_mode_is_rejected() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer_from(vec![1]).unwrap();
        let result = transfer_with(
            &mut scope,
            &Value::Object(buffer),
            TransferMode::Reference,
            &CopyOptions::transfer_out(),
        );
        assert!(matches!(result, Err(TransferError::UnserializableValue(_))));
        assert!(!scope.is_detached(buffer));
    }

    #[test]
    fn test_external_copy_is_transferable() {
        let mut scope = scope();
        let payload = TransferBuffer::from_value(&IsolatedValue::from("inner")).unwrap();
        let host = scope.new_host_object(payload.clone());
        let sent = transfer(&mut scope, &Value::Object(host), TransferMode::Transferable).unwrap();
        let received = receive(&mut scope, &sent).unwrap();
        let carried = scope.host_data::<TransferBuffer>(&received).unwrap();
        assert_eq!(*carried, payload);
    }
}
