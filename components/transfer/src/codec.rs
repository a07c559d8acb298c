//! Value transfer codec.
//!
//! Encoding walks a value depth-first inside its isolate and produces an
//! [`IsolatedValue`] tree; decoding rebuilds a fresh, independent graph from
//! such a tree inside any isolate using that isolate's intrinsics.
//!
//! Every object gets an index the first time it is visited. A later visit of
//! the same object emits [`IsolatedValue::BackRef`] with that index; the
//! decoder hands out indices in the same order, which keeps shared
//! sub-objects shared and cycles cyclic.
//!
//! Both directions are bounded by the isolate's `max_transfer_depth`; the
//! encoder also stops once the copy would exceed `max_transfer_bytes`.

use crate::buffer::TransferBuffer;
use crate::error::TransferError;
use crate::reference::ReferenceHandle;
use crate::typed_view;
use crate::value::IsolatedValue;
use core_types::ErrorKind;
use isolate::{array_index, JsResult, ObjectId, ObjectKind, Scope, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Extra behaviour for one copy.
///
/// Buffers named here are moved rather than duplicated: their contents end
/// up in the copy and the source buffers are detached once the whole value
/// has been encoded. A failed copy detaches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Move the value's own buffer: an ArrayBuffer itself, or the buffer
    /// behind a typed array or DataView
    pub transfer_out: bool,
    /// ArrayBuffers to move wherever they appear in the value
    pub transfer_list: Vec<ObjectId>,
}

impl CopyOptions {
    /// Move the top-level value's buffer.
    pub fn transfer_out() -> Self {
        CopyOptions {
            transfer_out: true,
            transfer_list: Vec::new(),
        }
    }

    /// Add a buffer to the transfer list.
    pub fn with_transfer(mut self, buffer: ObjectId) -> Self {
        self.transfer_list.push(buffer);
        self
    }
}

/// Encode `value` from `scope`.
///
/// A proxy at the top level is unwrapped once and its target copied like an
/// ordinary object; proxies anywhere below it are rejected.
pub fn encode(scope: &mut Scope, value: &Value) -> Result<IsolatedValue, TransferError> {
    encode_with(scope, value, &CopyOptions::default())
}

/// [`encode`], moving the buffers `options` names into the copy.
pub fn encode_with(
    scope: &mut Scope,
    value: &Value,
    options: &CopyOptions,
) -> Result<IsolatedValue, TransferError> {
    let value = match value {
        Value::Object(id) => match scope.proxy_target(*id) {
            Some(Some(target)) => Value::Object(target),
            Some(None) => {
                return Err(TransferError::UnserializableValue(
                    "A revoked Proxy".to_string(),
                ));
            }
            None => Value::Object(*id),
        },
        other => other.clone(),
    };
    let mut moved = transfer_list(scope, &options.transfer_list)?;
    if options.transfer_out {
        if let Some(buffer) = own_buffer(scope, &value) {
            if !moved.contains(&buffer) {
                moved.push(buffer);
            }
        }
    }

    let mut encoder = Encoder::new(scope);
    let encoded = encoder.encode_value(&value)?;
    let bytes = encoder.bytes;
    for buffer in moved {
        let detached = scope.detach_array_buffer(buffer);
        if let Err(exception) = detached {
            return Err(TransferError::from_exception(scope, exception));
        }
        debug!(isolate = %scope.id(), buffer = buffer.index(), "buffer transferred out");
    }
    trace!(bytes, "encoded value");
    Ok(encoded)
}

/// Encode `value` and serialize the result.
pub fn encode_to_buffer(scope: &mut Scope, value: &Value) -> Result<TransferBuffer, TransferError> {
    encode_to_buffer_with(scope, value, &CopyOptions::default())
}

/// [`encode_with`] followed by serialization.
pub fn encode_to_buffer_with(
    scope: &mut Scope,
    value: &Value,
    options: &CopyOptions,
) -> Result<TransferBuffer, TransferError> {
    let encoded = encode_with(scope, value, options)?;
    TransferBuffer::from_value(&encoded)
}

/// Check a transfer list: live ArrayBuffers, each named once.
fn transfer_list(scope: &Scope, list: &[ObjectId]) -> Result<Vec<ObjectId>, TransferError> {
    let mut checked: Vec<ObjectId> = Vec::with_capacity(list.len());
    for (position, &buffer) in list.iter().enumerate() {
        if !scope.heap().contains(buffer) || !scope.is_array_buffer(buffer) {
            return Err(TransferError::UnserializableValue(format!(
                "Transfer list entry {}",
                position
            )));
        }
        if scope.is_detached(buffer) {
            return Err(TransferError::UnserializableValue(
                "A detached ArrayBuffer".to_string(),
            ));
        }
        if checked.contains(&buffer) {
            return Err(TransferError::UnserializableValue(format!(
                "ArrayBuffer at transfer list entry {} is a duplicate and",
                position
            )));
        }
        checked.push(buffer);
    }
    Ok(checked)
}

/// The ArrayBuffer a top-level value owns: itself, or a view's backing buffer.
fn own_buffer(scope: &Scope, value: &Value) -> Option<ObjectId> {
    let id = value.as_object()?;
    if scope.is_array_buffer(id) {
        return Some(id);
    }
    scope.view_data(id).map(|view| view.buffer)
}

/// Rebuild `value` inside `scope`.
pub fn decode(scope: &mut Scope, value: &IsolatedValue) -> Result<Value, TransferError> {
    let mut decoder = Decoder::new(scope);
    decoder.decode_value(value)
}

/// Deserialize and rebuild a buffer inside `scope`.
pub fn decode_buffer(scope: &mut Scope, buffer: &TransferBuffer) -> Result<Value, TransferError> {
    let value = buffer.to_value()?;
    decode(scope, &value)
}

fn bigint_size(n: &num_bigint::BigInt) -> usize {
    (n.bits() as usize / 8) + 1
}

enum Shape {
    Ordinary,
    Array,
    ArrayBuffer,
    View,
    Error,
}

fn depth_exceeded(max_depth: usize) -> TransferError {
    TransferError::LimitExceeded(format!(
        "Depth exceeded maximum limit of {}",
        max_depth
    ))
}

pub(crate) struct Encoder<'a> {
    pub(crate) scope: &'a mut Scope,
    seen: HashMap<ObjectId, u32>,
    depth: usize,
    max_depth: usize,
    bytes: usize,
    max_bytes: usize,
}

impl<'a> Encoder<'a> {
    fn new(scope: &'a mut Scope) -> Self {
        let max_depth = scope.config().max_transfer_depth;
        let max_bytes = scope.config().max_transfer_bytes;
        Encoder {
            scope,
            seen: HashMap::new(),
            depth: 0,
            max_depth,
            bytes: 0,
            max_bytes,
        }
    }

    fn descend(&mut self) -> Result<(), TransferError> {
        if self.depth >= self.max_depth {
            return Err(depth_exceeded(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Count `len` more bytes of payload against the size limit.
    pub(crate) fn charge(&mut self, len: usize) -> Result<(), TransferError> {
        self.bytes = self.bytes.saturating_add(len);
        if self.bytes > self.max_bytes {
            return Err(TransferError::LimitExceeded(format!(
                "Size ({} bytes) exceeded maximum limit of {} bytes",
                self.bytes, self.max_bytes
            )));
        }
        Ok(())
    }

    fn check<T>(&mut self, result: JsResult<T>) -> Result<T, TransferError> {
        result.map_err(|exception| TransferError::from_exception(self.scope, exception))
    }

    fn encode_value(&mut self, value: &Value) -> Result<IsolatedValue, TransferError> {
        match value {
            Value::Undefined => Ok(IsolatedValue::Undefined),
            Value::Null => Ok(IsolatedValue::Null),
            Value::Boolean(b) => {
                self.charge(1)?;
                Ok(IsolatedValue::Boolean(*b))
            }
            Value::Number(n) => {
                self.charge(8)?;
                Ok(IsolatedValue::Number(*n))
            }
            Value::BigInt(n) => {
                self.charge(bigint_size(n))?;
                Ok(IsolatedValue::BigInt(n.clone()))
            }
            Value::String(s) => {
                self.charge(s.len())?;
                Ok(IsolatedValue::String(s.clone()))
            }
            Value::Object(id) => self.encode_object(*id),
        }
    }

    pub(crate) fn encode_object(&mut self, id: ObjectId) -> Result<IsolatedValue, TransferError> {
        if let Some(index) = self.seen.get(&id) {
            return Ok(IsolatedValue::BackRef(*index));
        }
        let value = Value::Object(id);
        if let Some(handle) = self.scope.host_data::<ReferenceHandle>(&value) {
            return handle.to_isolated();
        }
        if let Some(buffer) = self.scope.host_data::<TransferBuffer>(&value) {
            self.charge(buffer.len())?;
            return Ok(IsolatedValue::Copy((*buffer).clone()));
        }

        let shape = match &self.scope.object(id).kind {
            ObjectKind::Ordinary => Shape::Ordinary,
            ObjectKind::Array(_) => Shape::Array,
            ObjectKind::ArrayBuffer(Some(_)) => Shape::ArrayBuffer,
            ObjectKind::View(_) => Shape::View,
            ObjectKind::Error(_) => Shape::Error,
            ObjectKind::ArrayBuffer(None) => {
                return Err(TransferError::UnserializableValue(
                    "A detached ArrayBuffer".to_string(),
                ));
            }
            ObjectKind::Proxy { .. } | ObjectKind::Host(_) => {
                return Err(TransferError::UnserializableValue("#<Object>".to_string()));
            }
            ObjectKind::Function(data) => {
                return Err(TransferError::UnserializableValue(format!(
                    "function {}() {{ [native code] }}",
                    data.name
                )));
            }
        };

        let index = self.seen.len() as u32;
        self.seen.insert(id, index);
        self.descend()?;
        let encoded = match shape {
            Shape::Ordinary => {
                let properties = self.encode_properties(id, false)?;
                IsolatedValue::Object(properties)
            }
            Shape::Array => {
                let length = self.scope.array_length(id);
                let entries = self.scope.array_entries(id);
                let mut elements = Vec::with_capacity(entries.len());
                for (index, value) in &entries {
                    self.charge(4)?;
                    elements.push((*index, self.encode_value(value)?));
                }
                let properties = self.encode_properties(id, true)?;
                IsolatedValue::Array {
                    length,
                    elements,
                    properties,
                }
            }
            Shape::ArrayBuffer => {
                let bytes = self
                    .scope
                    .array_buffer_bytes(id)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();
                self.charge(bytes.len())?;
                IsolatedValue::ArrayBuffer(bytes)
            }
            Shape::View => {
                let view = typed_view::encode_view(self, id)?;
                let properties = self.encode_properties(id, true)?;
                IsolatedValue::View {
                    view: Box::new(view),
                    properties,
                }
            }
            Shape::Error => self.encode_error(id)?,
        };
        self.ascend();
        Ok(encoded)
    }

    /// Enumerable own properties in own-key order; `skip_indices` drops
    /// integer keys already carried as elements.
    fn encode_properties(
        &mut self,
        id: ObjectId,
        skip_indices: bool,
    ) -> Result<Vec<(String, IsolatedValue)>, TransferError> {
        let keys = self.scope.own_enumerable_keys(id);
        let keys = self.check(keys)?;
        let mut properties = Vec::with_capacity(keys.len());
        for key in keys {
            if skip_indices && array_index(&key).is_some() {
                continue;
            }
            self.charge(key.len())?;
            let value = self.scope.get(id, &key);
            let value = self.check(value)?;
            let encoded = self.encode_value(&value)?;
            properties.push((key, encoded));
        }
        Ok(properties)
    }

    fn encode_error(&mut self, id: ObjectId) -> Result<IsolatedValue, TransferError> {
        let kind = self
            .scope
            .error_kind(&Value::Object(id))
            .unwrap_or(ErrorKind::Error);
        let name = self.string_property(id, "name")?.unwrap_or_default();
        let message = self.string_property(id, "message")?.unwrap_or_default();
        let stack = self.string_property(id, "stack")?;
        self.charge(name.len() + message.len() + stack.as_ref().map_or(0, String::len))?;
        let kind = match ErrorKind::from_name(&name) {
            ErrorKind::CustomError if kind == ErrorKind::Error => ErrorKind::CustomError,
            _ => kind,
        };
        Ok(IsolatedValue::Error {
            kind,
            name,
            message,
            stack,
        })
    }

    fn string_property(&mut self, id: ObjectId, key: &str) -> Result<Option<String>, TransferError> {
        let value = self.scope.get(id, key);
        match self.check(value)? {
            Value::String(s) => Ok(Some(s)),
            Value::Undefined => Ok(None),
            other => {
                let text = self.scope.to_string(&other);
                self.check(text).map(Some)
            }
        }
    }
}

pub(crate) struct Decoder<'a> {
    pub(crate) scope: &'a mut Scope,
    objects: Vec<Option<Value>>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(scope: &'a mut Scope) -> Self {
        let max_depth = scope.config().max_transfer_depth;
        Decoder {
            scope,
            objects: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    pub(crate) fn check<T>(&mut self, result: JsResult<T>) -> Result<T, TransferError> {
        result.map_err(|exception| TransferError::from_exception(self.scope, exception))
    }

    /// Claim the next object index before the object itself exists.
    pub(crate) fn reserve(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    pub(crate) fn fill(&mut self, slot: usize, value: Value) {
        self.objects[slot] = Some(value);
    }

    fn register(&mut self, id: ObjectId) {
        self.objects.push(Some(Value::Object(id)));
    }

    pub(crate) fn decode_value(&mut self, value: &IsolatedValue) -> Result<Value, TransferError> {
        match value {
            IsolatedValue::Undefined => Ok(Value::Undefined),
            IsolatedValue::Null => Ok(Value::Null),
            IsolatedValue::Boolean(b) => Ok(Value::Boolean(*b)),
            IsolatedValue::Number(n) => Ok(Value::Number(*n)),
            IsolatedValue::BigInt(n) => Ok(Value::BigInt(n.clone())),
            IsolatedValue::String(s) => Ok(Value::String(s.clone())),
            IsolatedValue::Reference(handle) => handle.clone().into_value(self.scope),
            IsolatedValue::Copy(buffer) => {
                Ok(Value::Object(self.scope.new_host_object(buffer.clone())))
            }
            IsolatedValue::BackRef(index) => self
                .objects
                .get(*index as usize)
                .cloned()
                .flatten()
                .ok_or_else(|| {
                    TransferError::CorruptData(format!(
                        "Back-reference {} does not point at an earlier object",
                        index
                    ))
                }),
            container => {
                if self.depth >= self.max_depth {
                    return Err(depth_exceeded(self.max_depth));
                }
                self.depth += 1;
                let decoded = self.decode_container(container);
                self.depth -= 1;
                decoded
            }
        }
    }

    fn decode_container(&mut self, value: &IsolatedValue) -> Result<Value, TransferError> {
        let id = match value {
            IsolatedValue::Object(properties) => {
                let id = self.scope.new_object();
                self.register(id);
                self.decode_properties(id, properties)?;
                id
            }
            IsolatedValue::Array {
                length,
                elements,
                properties,
            } => {
                let id = self.scope.new_array_of_length(*length);
                self.register(id);
                for (index, element) in elements {
                    if *index >= *length {
                        return Err(TransferError::CorruptData(format!(
                            "Array element {} is past length {}",
                            index, length
                        )));
                    }
                    let element = self.decode_value(element)?;
                    let stored = self.scope.set(id, &index.to_string(), element);
                    self.check(stored)?;
                }
                self.decode_properties(id, properties)?;
                id
            }
            IsolatedValue::ArrayBuffer(bytes) => {
                let created = self.scope.new_array_buffer_from(bytes.clone());
                let id = self.check(created)?;
                self.register(id);
                id
            }
            IsolatedValue::View { view, properties } => {
                let id = typed_view::decode_view(self, view)?;
                self.decode_properties(id, properties)?;
                id
            }
            IsolatedValue::Error {
                kind,
                name,
                message,
                stack,
            } => {
                let id = self.scope.new_error(*kind, message);
                self.register(id);
                if name != kind.name() {
                    self.scope
                        .define_property(id, "name", Value::String(name.clone()), false);
                }
                if let Some(stack) = stack {
                    self.scope
                        .define_property(id, "stack", Value::String(stack.clone()), false);
                }
                id
            }
            _ => {
                return Err(TransferError::CorruptData(
                    "Unexpected leaf in container position".to_string(),
                ));
            }
        };
        Ok(Value::Object(id))
    }

    fn decode_properties(
        &mut self,
        id: ObjectId,
        properties: &[(String, IsolatedValue)],
    ) -> Result<(), TransferError> {
        for (key, value) in properties {
            let value = self.decode_value(value)?;
            let stored = self.scope.set(id, key, value);
            self.check(stored)?;
        }
        Ok(())
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
    fn test_primitives_encode_directly() {
        let mut scope = scope();
        assert_eq!(
            encode(&mut scope, &Value::from("hi")).unwrap(),
            IsolatedValue::from("hi")
        );
        assert_eq!(
            encode(&mut scope, &Value::Number(-0.0)).unwrap(),
            IsolatedValue::Number(-0.0)
        );
        assert_eq!(encode(&mut scope, &Value::Null).unwrap(), IsolatedValue::Null);
    }

    #[test]
    fn test_shared_object_becomes_back_reference() {
        let mut scope = scope();
        let shared = scope.new_object();
        let outer = scope.new_object();
        scope.set(outer, "a", Value::Object(shared)).unwrap();
        scope.set(outer, "b", Value::Object(shared)).unwrap();
        let encoded = encode(&mut scope, &Value::Object(outer)).unwrap();
        assert_eq!(
            encoded,
            IsolatedValue::Object(vec![
                ("a".to_string(), IsolatedValue::Object(vec![])),
                ("b".to_string(), IsolatedValue::BackRef(1)),
            ])
        );
    }

    #[test]
    fn test_cycle_round_trips() {
        let mut scope = scope();
        let node = scope.new_object();
        scope.set(node, "self", Value::Object(node)).unwrap();
        let encoded = encode(&mut scope, &Value::Object(node)).unwrap();
        let decoded = decode(&mut scope, &encoded).unwrap().as_object().unwrap();
        assert_ne!(decoded, node);
        assert_eq!(scope.get(decoded, "self").unwrap(), Value::Object(decoded));
    }

    #[test]
    fn test_depth_limit() {
        let mut scope = Scope::new(
            IsolateId::next(),
            IsolateConfig::default().with_max_transfer_depth(3),
        );
        let mut current = scope.new_object();
        for _ in 0..5 {
            let parent = scope.new_object();
            scope.set(parent, "child", Value::Object(current)).unwrap();
            current = parent;
        }
        let err = encode(&mut scope, &Value::Object(current)).unwrap_err();
        assert!(matches!(err, TransferError::LimitExceeded(_)));
        assert_eq!(err.kind(), ErrorKind::RangeError);
    }

    #[test]
    fn test_byte_limit() {
        let mut scope = Scope::new(
            IsolateId::next(),
            IsolateConfig::default().with_max_transfer_bytes(16),
        );
        let err = encode(&mut scope, &Value::from("x".repeat(32))).unwrap_err();
        assert!(matches!(err, TransferError::LimitExceeded(_)));
    }

    #[test]
    fn test_depth_limit_applies_to_decode() {
        let mut nested = IsolatedValue::Object(vec![]);
        for _ in 0..4 {
            nested = IsolatedValue::Object(vec![("child".to_string(), nested)]);
        }
        let mut scope = Scope::new(
            IsolateId::next(),
            IsolateConfig::default().with_max_transfer_depth(3),
        );
        let err = decode(&mut scope, &nested).unwrap_err();
        assert!(matches!(err, TransferError::LimitExceeded(_)));
    }

    #[test]
    fn test_sparse_array_copies_present_elements_only() {
        let mut scope = scope();
        let array = scope.new_array(vec![]);
        scope.set(array, "4294967294", Value::from("last")).unwrap();
        scope.set(array, "1", Value::from(true)).unwrap();
        let encoded = encode(&mut scope, &Value::Object(array)).unwrap();
        assert_eq!(
            encoded,
            IsolatedValue::Array {
                length: u32::MAX,
                elements: vec![
                    (1, IsolatedValue::Boolean(true)),
                    (4294967294, IsolatedValue::from("last")),
                ],
                properties: vec![],
            }
        );
        let copy = decode(&mut scope, &encoded).unwrap().as_object().unwrap();
        assert_eq!(scope.get(copy, "length").unwrap(), Value::Number(4294967295.0));
        assert_eq!(scope.get(copy, "4294967294").unwrap(), Value::from("last"));
    }

    #[test]
    fn test_element_past_length_is_corrupt() {
        let mut scope = scope();
        let leaf = IsolatedValue::Array {
            length: 1,
            elements: vec![(3, IsolatedValue::Null)],
            properties: vec![],
        };
        assert!(matches!(
            decode(&mut scope, &leaf),
            Err(TransferError::CorruptData(_))
        ));
    }

    #[test]
    fn test_transfer_out_detaches_source_buffer() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer_from(vec![1, 2, 3, 4]).unwrap();
        let view = scope.new_view(isolate::ViewKind::Uint8, buffer, 1, 2).unwrap();
        let encoded = encode_with(&mut scope, &Value::Object(view), &CopyOptions::transfer_out()).unwrap();
        assert!(scope.is_detached(buffer));
        assert_eq!(scope.heap().buffer_bytes(), 0);
        let copy = decode(&mut scope, &encoded).unwrap().as_object().unwrap();
        assert_eq!(scope.view_bytes(copy).unwrap(), &[2, 3]);
    }

    #[test]
    fn test_transfer_list_moves_nested_buffers() {
        let mut scope = scope();
        let moved = scope.new_array_buffer_from(vec![7; 3]).unwrap();
        let kept = scope.new_array_buffer_from(vec![9; 2]).unwrap();
        let outer = scope.new_object();
        scope.set(outer, "moved", Value::Object(moved)).unwrap();
        scope.set(outer, "kept", Value::Object(kept)).unwrap();
        let options = CopyOptions::default().with_transfer(moved);
        let encoded = encode_with(&mut scope, &Value::Object(outer), &options).unwrap();
        assert!(scope.is_detached(moved));
        assert!(!scope.is_detached(kept));
        let copy = decode(&mut scope, &encoded).unwrap().as_object().unwrap();
        let copied = scope.get(copy, "moved").unwrap().as_object().unwrap();
        assert_eq!(scope.array_buffer_bytes(copied).unwrap(), &[7, 7, 7]);
    }

    #[test]
    fn test_failed_copy_detaches_nothing() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer_from(vec![1]).unwrap();
        let outer = scope.new_object();
        let func = scope.new_function("f", |_, _| Ok(Value::Undefined));
        scope.set(outer, "buffer", Value::Object(buffer)).unwrap();
        scope.set(outer, "f", Value::Object(func)).unwrap();
        let options = CopyOptions::default().with_transfer(buffer);
        let err = encode_with(&mut scope, &Value::Object(outer), &options).unwrap_err();
        assert!(matches!(err, TransferError::UnserializableValue(_)));
        assert!(!scope.is_detached(buffer));
    }

    #[test]
    fn test_transfer_list_rejects_bad_entries() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer(1).unwrap();
        let plain = scope.new_object();
        let twice = CopyOptions::default().with_transfer(buffer).with_transfer(buffer);
        assert!(encode_with(&mut scope, &Value::Null, &twice).is_err());
        let not_buffer = CopyOptions::default().with_transfer(plain);
        assert!(encode_with(&mut scope, &Value::Null, &not_buffer).is_err());
        scope.detach_array_buffer(buffer).unwrap();
        let detached = CopyOptions::default().with_transfer(buffer);
        assert!(encode_with(&mut scope, &Value::Null, &detached).is_err());
    }

    #[test]
    fn test_dangling_back_reference_is_corrupt() {
        let mut scope = scope();
        let err = decode(&mut scope, &IsolatedValue::BackRef(4)).unwrap_err();
        assert!(matches!(err, TransferError::CorruptData(_)));
    }
}
