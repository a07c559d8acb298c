//! The in-isolate API.
//!
//! A [`Scope`] owns one isolate's heap and realm. It is created on the
//! isolate thread and never leaves it; every task posted to an isolate runs
//! with `&mut Scope`. Collaborators attach per-isolate state through typed
//! slots instead of widening this type.

use crate::config::IsolateConfig;
use crate::error::{Exception, JsResult};
use crate::heap::{
    ArrayElements, CallInfo, FunctionData, FunctionKind, Heap, JsObject, ObjectId, ObjectKind,
    Property, ViewData,
};
use crate::realm::Intrinsics;
use crate::typed_array::{self, ElementError, ViewKind};
use crate::value::{number_to_string, Value};
use core_types::{ErrorKind, IsolateId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

/// Longest string the realm will build.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

/// Parse an array index key ("0", "17"; not "01" or "-1").
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || key.len() > 10 || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u64 = key.parse().ok()?;
    if index < u32::MAX as u64 {
        Some(index as usize)
    } else {
        None
    }
}

/// One isolate's heap, realm and per-isolate state.
pub struct Scope {
    id: IsolateId,
    config: IsolateConfig,
    heap: Heap,
    intrinsics: Intrinsics,
    buffer_prototype: Option<ObjectId>,
    slots: HashMap<TypeId, Box<dyn Any>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("objects", &self.heap.object_count())
            .field("buffer_bytes", &self.heap.buffer_bytes())
            .finish()
    }
}

impl Scope {
    /// Create a fresh realm.
    ///
    /// Isolate threads call this themselves; it is public so that code which
    /// only needs a heap (tests, tools) can work without spawning a thread.
    pub fn new(id: IsolateId, config: IsolateConfig) -> Self {
        let mut heap = Heap::new(config.max_array_buffer_bytes);
        let intrinsics = Intrinsics::install(&mut heap);
        Scope {
            id,
            config,
            heap,
            intrinsics,
            buffer_prototype: None,
            slots: HashMap::new(),
        }
    }

    /// Identity of the owning isolate.
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// Configuration the isolate was created with.
    pub fn config(&self) -> &IsolateConfig {
        &self.config
    }

    /// Realm intrinsics.
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// The global object.
    pub fn global(&self) -> ObjectId {
        self.intrinsics.global
    }

    /// Direct heap access.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Borrow an object.
    pub fn object(&self, id: ObjectId) -> &JsObject {
        self.heap.get(id)
    }

    // ---- slots ----

    /// Store per-isolate state of type `T`, returning the previous value.
    pub fn set_slot<T: 'static>(&mut self, value: T) -> Option<T> {
        self.slots
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrow per-isolate state of type `T`.
    pub fn slot<T: 'static>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Mutably borrow per-isolate state of type `T`.
    pub fn slot_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_mut::<T>())
    }

    /// Per-isolate state of type `T`, created on first use.
    pub fn slot_or_insert_with<T: 'static>(&mut self, init: impl FnOnce() -> T) -> &mut T {
        let slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()));
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("slot keyed by TypeId holds another type"),
        }
    }

    /// Remove per-isolate state of type `T`.
    pub fn remove_slot<T: 'static>(&mut self) -> Option<T> {
        self.slots
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    // ---- buffer-like prototype ----

    /// Prototype registered as this isolate's canonical buffer-like prototype.
    pub fn buffer_prototype(&self) -> Option<ObjectId> {
        self.buffer_prototype
    }

    /// Register (or clear) the buffer-like prototype.
    pub fn set_buffer_prototype(&mut self, prototype: Option<ObjectId>) {
        self.buffer_prototype = prototype;
    }

    // ---- allocation ----

    /// New `{}`.
    pub fn new_object(&mut self) -> ObjectId {
        let prototype = self.intrinsics.object_prototype;
        self.new_object_with_prototype(Some(prototype))
    }

    /// New ordinary object with an explicit prototype.
    pub fn new_object_with_prototype(&mut self, prototype: Option<ObjectId>) -> ObjectId {
        self.heap.alloc(JsObject::new(ObjectKind::Ordinary, prototype))
    }

    /// New array; `None` entries are holes.
    pub fn new_array(&mut self, elements: Vec<Option<Value>>) -> ObjectId {
        self.alloc_array(ArrayElements::from_dense(elements))
    }

    /// New array of `length` holes.
    pub fn new_array_of_length(&mut self, length: u32) -> ObjectId {
        self.alloc_array(ArrayElements::with_length(length))
    }

    fn alloc_array(&mut self, elements: ArrayElements) -> ObjectId {
        let prototype = self.intrinsics.array_prototype;
        self.heap
            .alloc(JsObject::new(ObjectKind::Array(elements), Some(prototype)))
    }

    /// Stored elements of an array in index order; empty for non-arrays.
    pub fn array_entries(&self, id: ObjectId) -> Vec<(u32, Value)> {
        match &self.heap.get(id).kind {
            ObjectKind::Array(elements) => elements
                .iter()
                .map(|(index, value)| (index, value.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `length` of an array; 0 for non-arrays.
    pub fn array_length(&self, id: ObjectId) -> u32 {
        match &self.heap.get(id).kind {
            ObjectKind::Array(elements) => elements.len(),
            _ => 0,
        }
    }

    /// New dense array.
    pub fn new_array_from(&mut self, values: Vec<Value>) -> ObjectId {
        self.new_array(values.into_iter().map(Some).collect())
    }

    /// New zero-filled ArrayBuffer.
    pub fn new_array_buffer(&mut self, len: usize) -> JsResult<ObjectId> {
        self.heap
            .reserve_buffer(len)
            .map_err(|_| self.throw_error(ErrorKind::RangeError, "Array buffer allocation failed"))?;
        self.new_array_buffer_from(vec![0; len])
    }

    /// New ArrayBuffer holding `bytes`.
    pub fn new_array_buffer_from(&mut self, bytes: Vec<u8>) -> JsResult<ObjectId> {
        if self.heap.reserve_buffer(bytes.len()).is_err() {
            return Err(self.throw_error(ErrorKind::RangeError, "Array buffer allocation failed"));
        }
        let prototype = self.intrinsics.array_buffer_prototype;
        Ok(self.heap.alloc(JsObject::new(
            ObjectKind::ArrayBuffer(Some(bytes)),
            Some(prototype),
        )))
    }

    /// New view of `kind` over `byte_length` bytes of `buffer` starting at `byte_offset`.
    pub fn new_view(
        &mut self,
        kind: ViewKind,
        buffer: ObjectId,
        byte_offset: usize,
        byte_length: usize,
    ) -> JsResult<ObjectId> {
        let buffer_len = match &self.heap.get(buffer).kind {
            ObjectKind::ArrayBuffer(Some(bytes)) => bytes.len(),
            ObjectKind::ArrayBuffer(None) => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    format!("Cannot construct {} on a detached ArrayBuffer", kind.name()),
                ));
            }
            _ => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    format!("{} requires an ArrayBuffer", kind.name()),
                ));
            }
        };
        let width = kind.element_width();
        if byte_offset % width != 0 {
            return Err(self.throw_error(
                ErrorKind::RangeError,
                format!(
                    "start offset of {} should be a multiple of {}",
                    kind.name(),
                    width
                ),
            ));
        }
        if byte_length % width != 0 {
            return Err(self.throw_error(
                ErrorKind::RangeError,
                format!(
                    "byte length of {} should be a multiple of {}",
                    kind.name(),
                    width
                ),
            ));
        }
        if byte_offset
            .checked_add(byte_length)
            .map_or(true, |end| end > buffer_len)
        {
            return Err(self.throw_error(
                ErrorKind::RangeError,
                format!("Invalid typed array length: {}", byte_length / width),
            ));
        }
        let prototype = self.intrinsics.view_prototype(kind);
        Ok(self.heap.alloc(JsObject::new(
            ObjectKind::View(ViewData {
                kind,
                buffer,
                byte_offset,
                byte_length,
            }),
            Some(prototype),
        )))
    }

    /// New typed array with its own zeroed buffer of `length` elements.
    pub fn new_typed_array(&mut self, kind: ViewKind, length: usize) -> JsResult<ObjectId> {
        let byte_length = length.checked_mul(kind.element_width()).ok_or_else(|| {
            self.throw_error(
                ErrorKind::RangeError,
                format!("Invalid typed array length: {}", length),
            )
        })?;
        let buffer = self.new_array_buffer(byte_length)?;
        self.new_view(kind, buffer, 0, byte_length)
    }

    /// New non-constructible native function.
    pub fn new_function<F>(&mut self, name: &str, callback: F) -> ObjectId
    where
        F: Fn(&mut Scope, CallInfo) -> JsResult<Value> + 'static,
    {
        self.alloc_function(
            name,
            FunctionKind::Native {
                callback: Rc::new(callback),
                constructor: false,
            },
        )
    }

    /// New class with a default constructor, optionally extending `parent`.
    ///
    /// `class Name extends Parent {}`: the class prototype inherits from
    /// `Parent.prototype` and the class itself from `Parent`.
    pub fn new_class(&mut self, name: &str, parent: Option<ObjectId>) -> JsResult<ObjectId> {
        let (parent_prototype, constructor_parent) = match parent {
            Some(parent) => {
                if !self.heap.get(parent).is_callable() {
                    return Err(self.throw_error(
                        ErrorKind::TypeError,
                        "Class extends value is not a constructor or null",
                    ));
                }
                match self.get(parent, "prototype")? {
                    Value::Object(prototype) => (prototype, parent),
                    _ => {
                        return Err(self.throw_error(
                            ErrorKind::TypeError,
                            "Class extends value does not have valid prototype property",
                        ));
                    }
                }
            }
            None => (
                self.intrinsics.object_prototype,
                self.intrinsics.function_prototype,
            ),
        };
        let class = self.alloc_function(name, FunctionKind::Class { parent });
        self.heap.get_mut(class).prototype = Some(constructor_parent);
        let prototype = self.new_object_with_prototype(Some(parent_prototype));
        self.define_property(class, "prototype", Value::Object(prototype), false);
        self.define_property(prototype, "constructor", Value::Object(class), false);
        Ok(class)
    }

    fn alloc_function(&mut self, name: &str, kind: FunctionKind) -> ObjectId {
        let prototype = self.intrinsics.function_prototype;
        let id = self.heap.alloc(JsObject::new(
            ObjectKind::Function(FunctionData {
                name: name.to_string(),
                kind,
            }),
            Some(prototype),
        ));
        self.define_property(id, "name", Value::from(name), false);
        id
    }

    /// New error instance of `kind` with the realm's prototype for it.
    pub fn new_error(&mut self, kind: ErrorKind, message: &str) -> ObjectId {
        let prototype = self.intrinsics.error_prototype(kind);
        let id = self
            .heap
            .alloc(JsObject::new(ObjectKind::Error(kind), Some(prototype)));
        self.define_property(id, "message", Value::from(message), false);
        let stack = if message.is_empty() {
            kind.name().to_string()
        } else {
            format!("{}: {}", kind.name(), message)
        };
        self.define_property(id, "stack", Value::String(stack), false);
        id
    }

    /// Create an error and wrap it for throwing.
    pub fn throw_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> Exception {
        let message = message.into();
        Exception(Value::Object(self.new_error(kind, &message)))
    }

    /// New transparent proxy over `target`.
    pub fn new_proxy(&mut self, target: ObjectId, handler: ObjectId) -> ObjectId {
        let prototype = self.heap.get(target).prototype;
        self.heap.alloc(JsObject::new(
            ObjectKind::Proxy {
                target: Some(target),
                handler: Some(handler),
            },
            prototype,
        ))
    }

    /// Revoke a proxy; later operations on it throw.
    pub fn revoke_proxy(&mut self, proxy: ObjectId) {
        if let ObjectKind::Proxy { target, handler } = &mut self.heap.get_mut(proxy).kind {
            *target = None;
            *handler = None;
        }
    }

    /// New object wrapping embedder data.
    pub fn new_host_object<T: Any>(&mut self, data: T) -> ObjectId {
        let prototype = self.intrinsics.object_prototype;
        self.heap.alloc(JsObject::new(
            ObjectKind::Host(Rc::new(data)),
            Some(prototype),
        ))
    }

    /// Embedder data of a host object, if it holds a `T`.
    pub fn host_data<T: Any>(&self, value: &Value) -> Option<Rc<T>> {
        let id = value.as_object()?;
        match &self.heap.get(id).kind {
            ObjectKind::Host(data) => data.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    // ---- classification ----

    /// `typeof value`.
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Object(_) => {
                if self.is_callable(value) {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Whether `value` can be called (looking through live proxies).
    pub fn is_callable(&self, value: &Value) -> bool {
        let Some(mut id) = value.as_object() else {
            return false;
        };
        loop {
            match &self.heap.get(id).kind {
                ObjectKind::Function(_) => return true,
                ObjectKind::Proxy {
                    target: Some(target),
                    ..
                } => id = *target,
                _ => return false,
            }
        }
    }

    /// Whether `id` is an array.
    pub fn is_array(&self, id: ObjectId) -> bool {
        matches!(self.heap.get(id).kind, ObjectKind::Array(_))
    }

    /// Whether `id` is an ArrayBuffer (detached or not).
    pub fn is_array_buffer(&self, id: ObjectId) -> bool {
        matches!(self.heap.get(id).kind, ObjectKind::ArrayBuffer(_))
    }

    /// Byte length of an ArrayBuffer; 0 when detached or not a buffer.
    pub fn array_buffer_len(&self, id: ObjectId) -> usize {
        self.array_buffer_bytes(id).map_or(0, |bytes| bytes.len())
    }

    /// Contents of a live ArrayBuffer.
    pub fn array_buffer_bytes(&self, id: ObjectId) -> Option<&[u8]> {
        match &self.heap.get(id).kind {
            ObjectKind::ArrayBuffer(Some(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Whether `id` is a detached ArrayBuffer.
    pub fn is_detached(&self, id: ObjectId) -> bool {
        matches!(self.heap.get(id).kind, ObjectKind::ArrayBuffer(None))
    }

    /// Detach an ArrayBuffer and take its bytes.
    pub fn detach_array_buffer(&mut self, id: ObjectId) -> JsResult<Vec<u8>> {
        match self.heap.detach_buffer(id) {
            Some(bytes) => Ok(bytes),
            None => Err(self.throw_error(
                ErrorKind::TypeError,
                "Cannot detach: not an attached ArrayBuffer",
            )),
        }
    }

    /// View payload of a typed array or DataView.
    pub fn view_data(&self, id: ObjectId) -> Option<ViewData> {
        match &self.heap.get(id).kind {
            ObjectKind::View(view) => Some(*view),
            _ => None,
        }
    }

    /// The bytes a view covers; `None` when not a view or its buffer is detached.
    pub fn view_bytes(&self, id: ObjectId) -> Option<&[u8]> {
        let view = self.view_data(id)?;
        let bytes = self.array_buffer_bytes(view.buffer)?;
        bytes.get(view.byte_offset..view.byte_offset + view.byte_length)
    }

    /// Proxy target: `None` if not a proxy, `Some(None)` if revoked.
    pub fn proxy_target(&self, id: ObjectId) -> Option<Option<ObjectId>> {
        match &self.heap.get(id).kind {
            ObjectKind::Proxy { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Error category of an error object.
    pub fn error_kind(&self, value: &Value) -> Option<ErrorKind> {
        match &self.heap.get(value.as_object()?).kind {
            ObjectKind::Error(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Name of a function object.
    pub fn function_name(&self, id: ObjectId) -> Option<&str> {
        match &self.heap.get(id).kind {
            ObjectKind::Function(data) => Some(&data.name),
            _ => None,
        }
    }

    // ---- prototypes ----

    /// `Object.getPrototypeOf`, looking through live proxies.
    pub fn get_prototype(&self, id: ObjectId) -> Option<ObjectId> {
        match &self.heap.get(id).kind {
            ObjectKind::Proxy {
                target: Some(target),
                ..
            } => self.get_prototype(*target),
            _ => self.heap.get(id).prototype,
        }
    }

    /// `Object.setPrototypeOf` on a non-proxy.
    pub fn set_prototype(&mut self, id: ObjectId, prototype: Option<ObjectId>) {
        self.heap.get_mut(id).prototype = prototype;
    }

    /// Whether `prototype` appears on the prototype chain of `id`.
    pub fn has_in_prototype_chain(&self, id: ObjectId, prototype: ObjectId) -> bool {
        let mut current = self.get_prototype(id);
        while let Some(candidate) = current {
            if candidate == prototype {
                return true;
            }
            current = self.get_prototype(candidate);
        }
        false
    }

    /// `new_target.prototype` if it is an object, otherwise `default`.
    pub fn prototype_from_constructor(
        &mut self,
        new_target: Option<ObjectId>,
        default: ObjectId,
    ) -> JsResult<ObjectId> {
        match new_target {
            Some(constructor) => match self.get(constructor, "prototype")? {
                Value::Object(prototype) => Ok(prototype),
                _ => Ok(default),
            },
            None => Ok(default),
        }
    }

    /// `value instanceof constructor`.
    pub fn instance_of(&mut self, value: &Value, constructor: &Value) -> JsResult<bool> {
        if !self.is_callable(constructor) {
            return Err(self.throw_error(
                ErrorKind::TypeError,
                "Right-hand side of 'instanceof' is not callable",
            ));
        }
        let Some(constructor) = constructor.as_object() else {
            return Ok(false);
        };
        let prototype = match self.get(constructor, "prototype")? {
            Value::Object(prototype) => prototype,
            _ => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    "Function has non-object prototype in instanceof check",
                ));
            }
        };
        Ok(match value {
            Value::Object(id) => self.has_in_prototype_chain(*id, prototype),
            _ => false,
        })
    }

    /// `value.constructor.name`, when that is a function.
    pub fn constructor_name(&mut self, value: &Value) -> Option<String> {
        let id = value.as_object()?;
        let constructor = self.get(id, "constructor").ok()?.as_object()?;
        self.function_name(constructor).map(str::to_string)
    }

    // ---- properties ----

    fn follow_proxy(&mut self, id: ObjectId, operation: &str) -> JsResult<ObjectId> {
        let mut current = id;
        loop {
            match self.heap.get(current).kind {
                ObjectKind::Proxy {
                    target: Some(target),
                    ..
                } => current = target,
                ObjectKind::Proxy { target: None, .. } => {
                    return Err(self.throw_error(
                        ErrorKind::TypeError,
                        format!(
                            "Cannot perform '{}' on a proxy that has been revoked",
                            operation
                        ),
                    ));
                }
                _ => return Ok(current),
            }
        }
    }

    /// `target[key]`, walking the prototype chain.
    pub fn get(&mut self, target: ObjectId, key: &str) -> JsResult<Value> {
        let mut current = Some(target);
        while let Some(id) = current {
            let id = self.follow_proxy(id, "get")?;
            let object = self.heap.get(id);
            match &object.kind {
                ObjectKind::Array(elements) => {
                    if key == "length" {
                        return Ok(Value::Number(elements.len() as f64));
                    }
                    if let Some(index) = array_index(key) {
                        if let Some(value) = elements.get(index as u32) {
                            return Ok(value.clone());
                        }
                    }
                }
                ObjectKind::View(view) => {
                    if let Some(index) = array_index(key) {
                        return Ok(self.view_get(*view, index).unwrap_or(Value::Undefined));
                    }
                    let view = *view;
                    let detached = self.is_detached(view.buffer);
                    let virtual_value = match key {
                        "length" if view.kind.is_typed_array() => Some(view.length()),
                        "byteLength" => Some(view.byte_length),
                        "byteOffset" => Some(view.byte_offset),
                        _ => None,
                    };
                    if let Some(number) = virtual_value {
                        let number = if detached { 0 } else { number };
                        return Ok(Value::Number(number as f64));
                    }
                    if key == "buffer" {
                        return Ok(Value::Object(view.buffer));
                    }
                }
                ObjectKind::ArrayBuffer(bytes) if key == "byteLength" => {
                    let len = bytes.as_ref().map_or(0, Vec::len);
                    return Ok(Value::Number(len as f64));
                }
                _ => {}
            }
            let object = self.heap.get(id);
            if let Some(property) = object.properties.get(key) {
                return Ok(property.value.clone());
            }
            current = object.prototype;
        }
        Ok(Value::Undefined)
    }

    /// `value[key]` for any value; primitives other than strings have no own properties.
    pub fn get_value(&mut self, value: &Value, key: &str) -> JsResult<Value> {
        match value {
            Value::Object(id) => self.get(*id, key),
            Value::Undefined | Value::Null => Err(self.throw_error(
                ErrorKind::TypeError,
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    if value.is_undefined() { "undefined" } else { "null" },
                    key
                ),
            )),
            Value::String(s) if key == "length" => Ok(Value::Number(s.encode_utf16().count() as f64)),
            _ => Ok(Value::Undefined),
        }
    }

    /// Own property lookup without the prototype chain.
    pub fn get_own(&self, target: ObjectId, key: &str) -> Option<Value> {
        let object = self.heap.get(target);
        match &object.kind {
            ObjectKind::Array(elements) => {
                if let Some(index) = array_index(key) {
                    return elements.get(index as u32).cloned();
                }
            }
            ObjectKind::View(view) => {
                if let Some(index) = array_index(key) {
                    return self.view_get(*view, index);
                }
            }
            _ => {}
        }
        object.properties.get(key).map(|p| p.value.clone())
    }

    /// `target[key] = value`.
    pub fn set(&mut self, target: ObjectId, key: &str, value: Value) -> JsResult<()> {
        let id = self.follow_proxy(target, "set")?;
        match &self.heap.get(id).kind {
            ObjectKind::Array(_) => {
                if key == "length" {
                    let len = self.to_number(&value)?;
                    if len < 0.0 || len.fract() != 0.0 || len > u32::MAX as f64 {
                        return Err(self.throw_error(ErrorKind::RangeError, "Invalid array length"));
                    }
                    if let ObjectKind::Array(elements) = &mut self.heap.get_mut(id).kind {
                        elements.set_len(len as u32);
                    }
                    return Ok(());
                }
                if let Some(index) = array_index(key) {
                    if let ObjectKind::Array(elements) = &mut self.heap.get_mut(id).kind {
                        elements.set(index as u32, value);
                    }
                    return Ok(());
                }
            }
            ObjectKind::View(view) => {
                if let Some(index) = array_index(key) {
                    let view = *view;
                    return self.view_set(view, index, &value);
                }
            }
            _ => {}
        }
        let properties = &mut self.heap.get_mut(id).properties;
        match properties.get_mut(key) {
            Some(property) => property.value = value,
            None => {
                properties.insert(
                    key.to_string(),
                    Property {
                        value,
                        enumerable: true,
                    },
                );
            }
        }
        Ok(())
    }

    /// Define or overwrite an own property with explicit enumerability.
    pub fn define_property(&mut self, target: ObjectId, key: &str, value: Value, enumerable: bool) {
        self.heap
            .get_mut(target)
            .properties
            .insert(key.to_string(), Property { value, enumerable });
    }

    /// `delete target[key]`.
    pub fn delete(&mut self, target: ObjectId, key: &str) -> JsResult<bool> {
        let id = self.follow_proxy(target, "deleteProperty")?;
        let object = self.heap.get_mut(id);
        match &mut object.kind {
            ObjectKind::Array(elements) => {
                if key == "length" {
                    return Ok(false);
                }
                if let Some(index) = array_index(key) {
                    elements.remove(index as u32);
                    return Ok(true);
                }
            }
            ObjectKind::View(view) => {
                if let Some(index) = array_index(key) {
                    return Ok(index >= view.length());
                }
            }
            _ => {}
        }
        object.properties.shift_remove(key);
        Ok(true)
    }

    /// Own keys: integer keys ascending, then string keys in insertion order.
    pub fn own_keys(&mut self, target: ObjectId) -> JsResult<Vec<String>> {
        self.collect_own_keys(target, false)
    }

    /// Enumerable own keys, in the same order as [`Scope::own_keys`].
    pub fn own_enumerable_keys(&mut self, target: ObjectId) -> JsResult<Vec<String>> {
        self.collect_own_keys(target, true)
    }

    fn collect_own_keys(&mut self, target: ObjectId, only_enumerable: bool) -> JsResult<Vec<String>> {
        let id = self.follow_proxy(target, "ownKeys")?;
        let object = self.heap.get(id);
        let mut indices: Vec<usize> = match &object.kind {
            ObjectKind::Array(elements) => elements.iter().map(|(index, _)| index as usize).collect(),
            ObjectKind::View(view) if view.kind.is_typed_array() && !self.is_detached(view.buffer) => {
                (0..view.length()).collect()
            }
            _ => Vec::new(),
        };
        let mut strings = Vec::new();
        for (key, property) in &object.properties {
            if only_enumerable && !property.enumerable {
                continue;
            }
            match array_index(key) {
                Some(index) => indices.push(index),
                None => strings.push(key.clone()),
            }
        }
        indices.sort_unstable();
        indices.dedup();
        let mut keys: Vec<String> = indices.into_iter().map(|i| i.to_string()).collect();
        keys.extend(strings);
        Ok(keys)
    }

    // ---- view elements ----

    fn view_get(&self, view: ViewData, index: usize) -> Option<Value> {
        if !view.kind.is_typed_array() || index >= view.length() {
            return None;
        }
        let bytes = self.array_buffer_bytes(view.buffer)?;
        let width = view.kind.element_width();
        let start = view.byte_offset + index * width;
        bytes
            .get(start..start + width)
            .map(|raw| typed_array::read_element(view.kind, raw))
    }

    fn view_set(&mut self, view: ViewData, index: usize, value: &Value) -> JsResult<()> {
        if !view.kind.is_typed_array() || index >= view.length() {
            return Ok(());
        }
        let width = view.kind.element_width();
        let mut raw = [0u8; 8];
        if let Err(reason) = typed_array::write_element(view.kind, value, &mut raw[..width]) {
            let message = match reason {
                ElementError::BigIntMismatch if view.kind.is_bigint() => {
                    format!("Cannot convert {} to a BigInt", self.display(value))
                }
                _ => "Cannot mix BigInt and other types, use explicit conversions".to_string(),
            };
            return Err(self.throw_error(ErrorKind::TypeError, message));
        }
        let start = view.byte_offset + index * width;
        if let ObjectKind::ArrayBuffer(Some(bytes)) = &mut self.heap.get_mut(view.buffer).kind {
            if let Some(target) = bytes.get_mut(start..start + width) {
                target.copy_from_slice(&raw[..width]);
            }
        }
        Ok(())
    }

    // ---- calls ----

    /// `func.call(this, ...args)`.
    pub fn call(&mut self, func: &Value, this: Value, args: Vec<Value>) -> JsResult<Value> {
        let Some(id) = func.as_object() else {
            return Err(self.throw_error(
                ErrorKind::TypeError,
                format!("{} is not a function", self.display(func)),
            ));
        };
        let id = self.follow_proxy(id, "apply")?;
        let data = match &self.heap.get(id).kind {
            ObjectKind::Function(data) => data.clone(),
            _ => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    format!("{} is not a function", self.display(func)),
                ));
            }
        };
        match data.kind {
            FunctionKind::Native { callback, .. } => callback(
                self,
                CallInfo {
                    this,
                    args,
                    new_target: None,
                },
            ),
            FunctionKind::Class { .. } => Err(self.throw_error(
                ErrorKind::TypeError,
                format!(
                    "Class constructor {} cannot be invoked without 'new'",
                    data.name
                ),
            )),
        }
    }

    /// `Reflect.construct(constructor, args, new_target)`.
    pub fn construct(
        &mut self,
        constructor: &Value,
        args: Vec<Value>,
        new_target: Option<ObjectId>,
    ) -> JsResult<Value> {
        let Some(id) = constructor.as_object() else {
            return Err(self.throw_error(
                ErrorKind::TypeError,
                format!("{} is not a constructor", self.display(constructor)),
            ));
        };
        let id = self.follow_proxy(id, "construct")?;
        let new_target = new_target.unwrap_or(id);
        let data = match &self.heap.get(id).kind {
            ObjectKind::Function(data) => data.clone(),
            _ => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    format!("{} is not a constructor", self.display(constructor)),
                ));
            }
        };
        match data.kind {
            FunctionKind::Native {
                callback,
                constructor: true,
            } => callback(
                self,
                CallInfo {
                    this: Value::Undefined,
                    args,
                    new_target: Some(new_target),
                },
            ),
            FunctionKind::Native { .. } => Err(self.throw_error(
                ErrorKind::TypeError,
                format!("{} is not a constructor", data.name),
            )),
            FunctionKind::Class {
                parent: Some(parent),
            } => self.construct(&Value::Object(parent), args, Some(new_target)),
            FunctionKind::Class { parent: None } => {
                let default = self.intrinsics.object_prototype;
                let prototype = self.prototype_from_constructor(Some(new_target), default)?;
                Ok(Value::Object(self.new_object_with_prototype(Some(prototype))))
            }
        }
    }

    // ---- conversions ----

    /// ToNumber.
    pub fn to_number(&mut self, value: &Value) -> JsResult<f64> {
        match typed_array::to_number(value) {
            Some(number) => Ok(number),
            None => Err(self.throw_error(
                ErrorKind::TypeError,
                "Cannot convert a BigInt value to a number",
            )),
        }
    }

    /// ToString.
    pub fn to_string(&mut self, value: &Value) -> JsResult<String> {
        let Value::Object(id) = value else {
            return Ok(self.display(value));
        };
        let id = self.follow_proxy(*id, "get")?;
        match &self.heap.get(id).kind {
            ObjectKind::Error(_) => {
                let name = self.get(id, "name")?;
                let message = self.get(id, "message")?;
                let name = self.to_string(&name)?;
                let message = self.to_string(&message)?;
                Ok(match (name.is_empty(), message.is_empty()) {
                    (_, true) => name,
                    (true, false) => message,
                    (false, false) => format!("{}: {}", name, message),
                })
            }
            ObjectKind::Array(elements) => {
                let separators = (elements.len() as usize).saturating_sub(1);
                if separators > MAX_STRING_LENGTH {
                    return Err(self.throw_error(ErrorKind::RangeError, "Invalid string length"));
                }
                let entries = self.array_entries(id);
                let mut joined = String::new();
                let mut written = 0;
                for (index, value) in entries {
                    let index = index as usize;
                    joined.extend(std::iter::repeat(',').take(index - written));
                    written = index;
                    if !value.is_nullish() {
                        let part = self.to_string(&value)?;
                        joined.push_str(&part);
                    }
                    if joined.len() > MAX_STRING_LENGTH {
                        return Err(self.throw_error(ErrorKind::RangeError, "Invalid string length"));
                    }
                }
                joined.extend(std::iter::repeat(',').take(separators - written));
                Ok(joined)
            }
            ObjectKind::Function(data) => Ok(format!("function {}() {{ [native code] }}", data.name)),
            _ => Ok("[object Object]".to_string()),
        }
    }

    /// Short human-readable rendering used in error messages.
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(id) => match &self.heap.get(*id).kind {
                ObjectKind::Function(data) => format!("function {}", data.name),
                ObjectKind::Array(_) => "[object Array]".to_string(),
                _ => "#<Object>".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new(IsolateId::next(), IsolateConfig::default())
    }

    #[test]
    fn test_array_index_parsing() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("4294967295"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn test_own_keys_order() {
        let mut scope = scope();
        let obj = scope.new_object();
        scope.set(obj, "b", Value::from(1)).unwrap();
        scope.set(obj, "2", Value::from(2)).unwrap();
        scope.set(obj, "a", Value::from(3)).unwrap();
        scope.set(obj, "1", Value::from(4)).unwrap();
        assert_eq!(scope.own_keys(obj).unwrap(), vec!["1", "2", "b", "a"]);
    }

    #[test]
    fn test_array_holes_and_length() {
        let mut scope = scope();
        let array = scope.new_array(vec![Some(Value::from(1)), None]);
        scope.set(array, "4", Value::from(5)).unwrap();
        assert_eq!(scope.get(array, "length").unwrap(), Value::from(5));
        assert_eq!(scope.get(array, "1").unwrap(), Value::Undefined);
        assert_eq!(scope.own_keys(array).unwrap(), vec!["0", "4"]);
        assert!(scope.delete(array, "0").unwrap());
        assert_eq!(scope.own_keys(array).unwrap(), vec!["4"]);
    }

    #[test]
    fn test_far_index_write_stays_sparse() {
        let mut scope = scope();
        let array = scope.new_array(vec![]);
        scope.set(array, "4294967294", Value::from(1)).unwrap();
        assert_eq!(scope.get(array, "length").unwrap(), Value::Number(4294967295.0));
        assert_eq!(scope.get(array, "4294967294").unwrap(), Value::from(1));
        assert_eq!(scope.own_keys(array).unwrap(), vec!["4294967294"]);
        scope.set(array, "length", Value::from(2)).unwrap();
        assert!(scope.own_keys(array).unwrap().is_empty());
    }

    #[test]
    fn test_huge_array_join_is_range_error() {
        let mut scope = scope();
        let array = scope.new_array(vec![]);
        scope.set(array, "length", Value::Number(4294967295.0)).unwrap();
        let err = scope.to_string(&Value::Object(array)).unwrap_err();
        assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::RangeError));
    }

    #[test]
    fn test_views_share_buffer() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer(8).unwrap();
        let bytes = scope.new_view(ViewKind::Uint8, buffer, 0, 8).unwrap();
        let words = scope.new_view(ViewKind::Uint32, buffer, 4, 4).unwrap();
        scope.set(words, "0", Value::from(0x01020304)).unwrap();
        let expected = 0x01020304u32.to_ne_bytes();
        for (i, byte) in expected.iter().enumerate() {
            let index = (4 + i).to_string();
            assert_eq!(scope.get(bytes, &index).unwrap(), Value::from(*byte as i32));
        }
        assert_eq!(scope.get(words, "byteOffset").unwrap(), Value::from(4));
    }

    #[test]
    fn test_misaligned_view_is_range_error() {
        let mut scope = scope();
        let buffer = scope.new_array_buffer(8).unwrap();
        let err = scope.new_view(ViewKind::Int32, buffer, 2, 4).unwrap_err();
        assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::RangeError));
    }

    #[test]
    fn test_buffer_limit_raises_range_error() {
        let mut scope = Scope::new(
            IsolateId::next(),
            IsolateConfig::default().with_max_array_buffer_bytes(4),
        );
        let err = scope.new_array_buffer(5).unwrap_err();
        assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::RangeError));
        let message = scope.get(err.value().as_object().unwrap(), "message").unwrap();
        assert_eq!(message, Value::from("Array buffer allocation failed"));
    }

    #[test]
    fn test_class_extends_typed_array() {
        let mut scope = scope();
        let parent = scope.intrinsics().view_constructor(ViewKind::Uint8);
        let class = scope.new_class("Buffer", Some(parent)).unwrap();
        let instance = scope
            .construct(&Value::Object(class), vec![Value::from(3)], None)
            .unwrap();
        assert!(scope.instance_of(&instance, &Value::Object(class)).unwrap());
        assert!(scope
            .instance_of(&instance, &Value::Object(parent))
            .unwrap());
        assert_eq!(scope.constructor_name(&instance).as_deref(), Some("Buffer"));
        assert!(scope.view_data(instance.as_object().unwrap()).is_some());
    }

    #[test]
    fn test_class_requires_new() {
        let mut scope = scope();
        let class = scope.new_class("Thing", None).unwrap();
        let err = scope
            .call(&Value::Object(class), Value::Undefined, vec![])
            .unwrap_err();
        assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_revoked_proxy_throws() {
        let mut scope = scope();
        let target = scope.new_object();
        let handler = scope.new_object();
        let proxy = scope.new_proxy(target, handler);
        scope.set(proxy, "x", Value::from(1)).unwrap();
        assert_eq!(scope.get(target, "x").unwrap(), Value::from(1));
        scope.revoke_proxy(proxy);
        assert!(scope.get(proxy, "x").is_err());
    }

    #[test]
    fn test_slots_are_typed() {
        struct Counter(u32);
        let mut scope = scope();
        assert!(scope.slot::<Counter>().is_none());
        scope.slot_or_insert_with(|| Counter(0)).0 += 1;
        scope.slot_or_insert_with(|| Counter(0)).0 += 1;
        assert_eq!(scope.slot::<Counter>().map(|c| c.0), Some(2));
        assert_eq!(scope.remove_slot::<Counter>().map(|c| c.0), Some(2));
    }

    #[test]
    fn test_native_function_call() {
        let mut scope = scope();
        let add = scope.new_function("add", |scope, info| {
            let a = scope.to_number(&info.arg(0))?;
            let b = scope.to_number(&info.arg(1))?;
            Ok(Value::Number(a + b))
        });
        let result = scope
            .call(&Value::Object(add), Value::Undefined, vec![Value::from(2), Value::from(3)])
            .unwrap();
        assert_eq!(result, Value::from(5));
        assert_eq!(scope.type_of(&Value::Object(add)), "function");
        assert!(scope
            .construct(&Value::Object(add), vec![], None)
            .is_err());
    }
}
