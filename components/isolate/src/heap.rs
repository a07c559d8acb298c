//! Object heap of one isolate.
//!
//! Objects are stored in an append-only arena and addressed by [`ObjectId`].
//! There is no collector: everything allocated lives until the owning
//! isolate is disposed, at which point the whole heap is dropped at once.

use crate::error::JsResult;
use crate::scope::Scope;
use crate::typed_array::ViewKind;
use crate::value::Value;
use core_types::ErrorKind;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Index of an object in its isolate's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Raw arena index.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Native function body.
///
/// `new_target` is `Some` when the function is invoked as a constructor; it
/// names the constructor `new` was applied to, which subclass constructors
/// use to pick the prototype of the object they return.
pub type NativeFn = Rc<dyn Fn(&mut Scope, CallInfo) -> JsResult<Value>>;

/// Arguments of one native call.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Receiver
    pub this: Value,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Constructor `new` was applied to, if any
    pub new_target: Option<ObjectId>,
}

impl CallInfo {
    /// Argument `index`, or `undefined` when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Undefined)
    }
}

/// How a function object behaves when called or constructed.
#[derive(Clone)]
pub enum FunctionKind {
    /// Host function. `constructor` says whether `new` is allowed.
    Native {
        /// Body
        callback: NativeFn,
        /// Whether the function can be used with `new`
        constructor: bool,
    },
    /// Class with a default constructor; forwards construction to `parent`.
    Class {
        /// Constructor of the superclass
        parent: Option<ObjectId>,
    },
}

/// Function object payload.
#[derive(Clone)]
pub struct FunctionData {
    /// Function name
    pub name: String,
    /// Call behaviour
    pub kind: FunctionKind,
}

impl fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FunctionKind::Native { constructor, .. } => {
                if *constructor {
                    "native constructor"
                } else {
                    "native"
                }
            }
            FunctionKind::Class { .. } => "class",
        };
        f.debug_struct("FunctionData")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// Binary view payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewData {
    /// Element kind
    pub kind: ViewKind,
    /// Backing ArrayBuffer object
    pub buffer: ObjectId,
    /// Start of the view in the buffer
    pub byte_offset: usize,
    /// Length of the view in bytes
    pub byte_length: usize,
}

impl ViewData {
    /// Number of elements (bytes for DataView).
    pub fn length(&self) -> usize {
        self.byte_length / self.kind.element_width()
    }
}

/// Array storage: a length plus the elements actually present.
///
/// Only stored elements take memory, so `a[4294967294] = 1` or a large
/// `length` is as cheap as a short array. Indices stay below `u32::MAX`.
#[derive(Debug, Clone, Default)]
pub struct ArrayElements {
    length: u32,
    present: BTreeMap<u32, Value>,
}

impl ArrayElements {
    /// Empty array of `length` holes.
    pub fn with_length(length: u32) -> Self {
        ArrayElements {
            length,
            present: BTreeMap::new(),
        }
    }

    /// Array from a dense list; `None` entries are holes.
    pub fn from_dense(values: Vec<Option<Value>>) -> Self {
        let length = u32::try_from(values.len()).unwrap_or(u32::MAX);
        let present = values
            .into_iter()
            .take(length as usize)
            .enumerate()
            .filter_map(|(index, value)| value.map(|value| (index as u32, value)))
            .collect();
        ArrayElements { length, present }
    }

    /// Value of `length`.
    pub fn len(&self) -> u32 {
        self.length
    }

    /// Whether `length` is zero.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Element at `index`; `None` for holes and out-of-range indices.
    pub fn get(&self, index: u32) -> Option<&Value> {
        self.present.get(&index)
    }

    /// Store an element, growing `length` past it when needed.
    pub fn set(&mut self, index: u32, value: Value) {
        if index >= self.length {
            self.length = index.saturating_add(1);
        }
        self.present.insert(index, value);
    }

    /// Turn `index` into a hole.
    pub fn remove(&mut self, index: u32) -> Option<Value> {
        self.present.remove(&index)
    }

    /// Set `length`, dropping elements at or past it.
    pub fn set_len(&mut self, length: u32) {
        drop(self.present.split_off(&length));
        self.length = length;
    }

    /// Stored elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> + '_ {
        self.present.iter().map(|(index, value)| (*index, value))
    }

    /// Number of stored (non-hole) elements.
    pub fn present_count(&self) -> usize {
        self.present.len()
    }
}

/// Internal shape of a heap object.
#[derive(Clone)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array elements
    Array(ArrayElements),
    /// Buffer bytes; `None` once detached
    ArrayBuffer(Option<Vec<u8>>),
    /// Typed array or DataView
    View(ViewData),
    /// Proxy; `target` and `handler` are `None` once revoked
    Proxy {
        /// Proxied object
        target: Option<ObjectId>,
        /// Handler object
        handler: Option<ObjectId>,
    },
    /// Callable
    Function(FunctionData),
    /// Error instance
    Error(ErrorKind),
    /// Embedder data, invisible to script
    Host(Rc<dyn Any>),
}

impl fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Ordinary => write!(f, "Ordinary"),
            ObjectKind::Array(elements) => write!(f, "Array(len={})", elements.len()),
            ObjectKind::ArrayBuffer(Some(bytes)) => write!(f, "ArrayBuffer({})", bytes.len()),
            ObjectKind::ArrayBuffer(None) => write!(f, "ArrayBuffer(detached)"),
            ObjectKind::View(view) => write!(f, "{:?}", view),
            ObjectKind::Proxy { target, .. } => write!(f, "Proxy({:?})", target),
            ObjectKind::Function(data) => write!(f, "{:?}", data),
            ObjectKind::Error(kind) => write!(f, "Error({})", kind.name()),
            ObjectKind::Host(_) => write!(f, "Host"),
        }
    }
}

/// An own data property.
#[derive(Debug, Clone)]
pub struct Property {
    /// Stored value
    pub value: Value,
    /// Whether it shows up in key enumeration
    pub enumerable: bool,
}

/// A heap object.
#[derive(Debug, Clone)]
pub struct JsObject {
    /// Internal shape
    pub kind: ObjectKind,
    /// `[[Prototype]]`
    pub prototype: Option<ObjectId>,
    /// Named own properties in insertion order
    pub properties: IndexMap<String, Property>,
}

impl JsObject {
    /// Create an object with no own properties.
    pub fn new(kind: ObjectKind, prototype: Option<ObjectId>) -> Self {
        JsObject {
            kind,
            prototype,
            properties: IndexMap::new(),
        }
    }

    /// Whether the object can be called.
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }
}

/// Buffer allocation refused by the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationFailed {
    /// Bytes requested
    pub requested: usize,
    /// Bytes still available
    pub available: usize,
}

/// Arena of objects plus external buffer accounting.
#[derive(Debug)]
pub struct Heap {
    objects: Vec<JsObject>,
    buffer_bytes: usize,
    buffer_limit: usize,
}

impl Heap {
    /// Create an empty heap whose ArrayBuffers may hold `buffer_limit` bytes in total.
    pub fn new(buffer_limit: usize) -> Self {
        Heap {
            objects: Vec::new(),
            buffer_bytes: 0,
            buffer_limit,
        }
    }

    /// Store `object` and return its id.
    pub fn alloc(&mut self, object: JsObject) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        if let ObjectKind::ArrayBuffer(Some(bytes)) = &object.kind {
            self.buffer_bytes += bytes.len();
        }
        self.objects.push(object);
        id
    }

    /// Reserve `len` bytes of buffer budget, failing past the limit.
    pub fn reserve_buffer(&mut self, len: usize) -> Result<(), AllocationFailed> {
        let available = self.buffer_limit.saturating_sub(self.buffer_bytes);
        if len > available || len > crate::typed_array::MAX_ARRAY_BUFFER_LENGTH {
            return Err(AllocationFailed {
                requested: len,
                available,
            });
        }
        Ok(())
    }

    /// Detach a buffer, returning its bytes to the budget.
    pub fn detach_buffer(&mut self, id: ObjectId) -> Option<Vec<u8>> {
        let object = self.objects.get_mut(id.0 as usize)?;
        match &mut object.kind {
            ObjectKind::ArrayBuffer(bytes) => {
                let taken = bytes.take()?;
                self.buffer_bytes -= taken.len();
                Some(taken)
            }
            _ => None,
        }
    }

    /// Borrow an object.
    pub fn get(&self, id: ObjectId) -> &JsObject {
        &self.objects[id.0 as usize]
    }

    /// Mutably borrow an object.
    pub fn get_mut(&mut self, id: ObjectId) -> &mut JsObject {
        &mut self.objects[id.0 as usize]
    }

    /// Whether `id` was allocated by this heap.
    pub fn contains(&self, id: ObjectId) -> bool {
        (id.0 as usize) < self.objects.len()
    }

    /// Number of objects allocated so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Bytes currently held by live ArrayBuffers.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_budget() {
        let mut heap = Heap::new(16);
        assert!(heap.reserve_buffer(16).is_ok());
        let id = heap.alloc(JsObject::new(ObjectKind::ArrayBuffer(Some(vec![0; 10])), None));
        assert_eq!(heap.buffer_bytes(), 10);
        assert_eq!(
            heap.reserve_buffer(7),
            Err(AllocationFailed {
                requested: 7,
                available: 6
            })
        );
        assert_eq!(heap.detach_buffer(id).map(|b| b.len()), Some(10));
        assert_eq!(heap.buffer_bytes(), 0);
        assert!(heap.detach_buffer(id).is_none());
    }

    #[test]
    fn test_array_elements_are_sparse() {
        let mut elements = ArrayElements::from_dense(vec![Some(Value::from(1)), None]);
        assert_eq!(elements.len(), 2);
        elements.set(u32::MAX - 1, Value::from(2));
        assert_eq!(elements.len(), u32::MAX);
        assert_eq!(elements.present_count(), 2);
        elements.set_len(1);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![0]);
        assert!(elements.remove(0).is_some());
        assert!(elements.get(0).is_none());
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut heap = Heap::new(0);
        let a = heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
        let b = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(a)));
        assert_eq!(a.index() + 1, b.index());
        assert_eq!(heap.get(b).prototype, Some(a));
        assert!(heap.contains(b));
        assert_eq!(heap.object_count(), 2);
    }
}
