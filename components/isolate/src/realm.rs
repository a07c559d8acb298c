//! Realm intrinsics: the built-in prototypes and constructors every fresh
//! isolate starts with.
//!
//! Only the constructors the transfer layer needs to rebuild values are
//! installed: `Object`, `Function`, `Array`, `ArrayBuffer`, the eleven typed
//! array kinds, `DataView` and the native error constructors.

use crate::error::JsResult;
use crate::heap::{
    CallInfo, FunctionData, FunctionKind, Heap, JsObject, NativeFn, ObjectId, ObjectKind, Property,
};
use crate::scope::Scope;
use crate::typed_array::ViewKind;
use crate::value::Value;
use core_types::ErrorKind;
use std::rc::Rc;

/// Built-in objects of one realm.
#[derive(Debug, Clone)]
pub struct Intrinsics {
    /// The global object
    pub global: ObjectId,
    /// `Object.prototype`
    pub object_prototype: ObjectId,
    /// `Object`
    pub object_constructor: ObjectId,
    /// `Function.prototype`
    pub function_prototype: ObjectId,
    /// `Array.prototype`
    pub array_prototype: ObjectId,
    /// `Array`
    pub array_constructor: ObjectId,
    /// `ArrayBuffer.prototype`
    pub array_buffer_prototype: ObjectId,
    /// `ArrayBuffer`
    pub array_buffer_constructor: ObjectId,
    /// `%TypedArray%.prototype`
    pub typed_array_prototype: ObjectId,
    view_prototypes: Vec<ObjectId>,
    view_constructors: Vec<ObjectId>,
    error_prototypes: Vec<ObjectId>,
    error_constructors: Vec<ObjectId>,
}

impl Intrinsics {
    /// Prototype used for fresh views of `kind`.
    pub fn view_prototype(&self, kind: ViewKind) -> ObjectId {
        self.view_prototypes[kind.index()]
    }

    /// Constructor of views of `kind`.
    pub fn view_constructor(&self, kind: ViewKind) -> ObjectId {
        self.view_constructors[kind.index()]
    }

    /// Prototype of errors of `kind`; custom and internal kinds use `Error.prototype`.
    pub fn error_prototype(&self, kind: ErrorKind) -> ObjectId {
        self.error_prototypes[error_slot(kind)]
    }

    /// Constructor of errors of `kind`.
    pub fn error_constructor(&self, kind: ErrorKind) -> ObjectId {
        self.error_constructors[error_slot(kind)]
    }

    /// Build every intrinsic in `heap` and return their ids.
    pub(crate) fn install(heap: &mut Heap) -> Intrinsics {
        let object_prototype = heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
        let function_prototype = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_prototype)));
        let global = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_prototype)));

        let mut builder = RealmBuilder {
            heap,
            global,
            function_prototype,
        };

        let object_constructor =
            builder.constructor("Object", object_prototype, Rc::new(construct_object));

        let function_constructor = builder.alloc_function(
            "Function",
            FunctionKind::Native {
                callback: Rc::new(|scope: &mut Scope, _info: CallInfo| {
                    Err(scope.throw_error(
                        ErrorKind::EvalError,
                        "Code generation from strings disallowed for this context",
                    ))
                }),
                constructor: true,
            },
        );
        builder.link(function_constructor, function_prototype, "Function");

        let array_prototype = builder.prototype(object_prototype);
        let array_constructor =
            builder.constructor("Array", array_prototype, Rc::new(construct_array));

        let array_buffer_prototype = builder.prototype(object_prototype);
        let array_buffer_constructor = builder.constructor(
            "ArrayBuffer",
            array_buffer_prototype,
            Rc::new(construct_array_buffer),
        );

        let typed_array_prototype = builder.prototype(object_prototype);
        let mut view_prototypes = Vec::with_capacity(ViewKind::ALL.len());
        let mut view_constructors = Vec::with_capacity(ViewKind::ALL.len());
        for kind in ViewKind::ALL {
            let parent = if kind.is_typed_array() {
                typed_array_prototype
            } else {
                object_prototype
            };
            let prototype = builder.prototype(parent);
            let callback: NativeFn =
                Rc::new(move |scope: &mut Scope, info: CallInfo| construct_view(scope, kind, info));
            let constructor = builder.constructor(kind.name(), prototype, callback);
            if kind.is_typed_array() {
                let width = Value::Number(kind.element_width() as f64);
                builder.hidden(constructor, "BYTES_PER_ELEMENT", width.clone());
                builder.hidden(prototype, "BYTES_PER_ELEMENT", width);
            }
            view_prototypes.push(prototype);
            view_constructors.push(constructor);
        }

        let mut error_prototypes = Vec::with_capacity(ErrorKind::CONSTRUCTORS.len());
        let mut error_constructors = Vec::with_capacity(ErrorKind::CONSTRUCTORS.len());
        for kind in ErrorKind::CONSTRUCTORS {
            let parent = error_prototypes.first().copied().unwrap_or(object_prototype);
            let prototype = builder.prototype(parent);
            builder.hidden(prototype, "name", Value::from(kind.name()));
            builder.hidden(prototype, "message", Value::from(""));
            let callback: NativeFn =
                Rc::new(move |scope: &mut Scope, info: CallInfo| construct_error(scope, kind, info));
            let constructor = builder.constructor(kind.name(), prototype, callback);
            if let Some(base) = error_constructors.first().copied() {
                builder.heap.get_mut(constructor).prototype = Some(base);
            }
            error_prototypes.push(prototype);
            error_constructors.push(constructor);
        }

        builder.hidden(global, "globalThis", Value::Object(global));

        Intrinsics {
            global,
            object_prototype,
            object_constructor,
            function_prototype,
            array_prototype,
            array_constructor,
            array_buffer_prototype,
            array_buffer_constructor,
            typed_array_prototype,
            view_prototypes,
            view_constructors,
            error_prototypes,
            error_constructors,
        }
    }
}

fn error_slot(kind: ErrorKind) -> usize {
    ErrorKind::CONSTRUCTORS
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(0)
}

struct RealmBuilder<'a> {
    heap: &'a mut Heap,
    global: ObjectId,
    function_prototype: ObjectId,
}

impl RealmBuilder<'_> {
    fn hidden(&mut self, target: ObjectId, key: &str, value: Value) {
        self.heap.get_mut(target).properties.insert(
            key.to_string(),
            Property {
                value,
                enumerable: false,
            },
        );
    }

    fn prototype(&mut self, parent: ObjectId) -> ObjectId {
        self.heap
            .alloc(JsObject::new(ObjectKind::Ordinary, Some(parent)))
    }

    fn alloc_function(&mut self, name: &str, kind: FunctionKind) -> ObjectId {
        let id = self.heap.alloc(JsObject::new(
            ObjectKind::Function(FunctionData {
                name: name.to_string(),
                kind,
            }),
            Some(self.function_prototype),
        ));
        self.hidden(id, "name", Value::from(name));
        id
    }

    /// Wire `constructor.prototype`, `prototype.constructor` and the global binding.
    fn link(&mut self, constructor: ObjectId, prototype: ObjectId, name: &str) {
        self.hidden(constructor, "prototype", Value::Object(prototype));
        self.hidden(prototype, "constructor", Value::Object(constructor));
        self.hidden(self.global, name, Value::Object(constructor));
    }

    fn constructor(&mut self, name: &str, prototype: ObjectId, callback: NativeFn) -> ObjectId {
        let constructor = self.alloc_function(
            name,
            FunctionKind::Native {
                callback,
                constructor: true,
            },
        );
        self.link(constructor, prototype, name);
        constructor
    }
}

fn construct_object(scope: &mut Scope, info: CallInfo) -> JsResult<Value> {
    if let Value::Object(existing) = info.arg(0) {
        return Ok(Value::Object(existing));
    }
    let default = scope.intrinsics().object_prototype;
    let prototype = scope.prototype_from_constructor(info.new_target, default)?;
    Ok(Value::Object(scope.new_object_with_prototype(Some(prototype))))
}

fn construct_array(scope: &mut Scope, info: CallInfo) -> JsResult<Value> {
    let array = match info.args.as_slice() {
        [Value::Number(n)] => {
            let len = *n;
            if len < 0.0 || len.fract() != 0.0 || len > u32::MAX as f64 {
                return Err(scope.throw_error(ErrorKind::RangeError, "Invalid array length"));
            }
            scope.new_array_of_length(len as u32)
        }
        args => {
            let elements = args.iter().cloned().map(Some).collect();
            scope.new_array(elements)
        }
    };
    let default = scope.intrinsics().array_prototype;
    let prototype = scope.prototype_from_constructor(info.new_target, default)?;
    scope.set_prototype(array, Some(prototype));
    Ok(Value::Object(array))
}

fn construct_array_buffer(scope: &mut Scope, info: CallInfo) -> JsResult<Value> {
    if info.new_target.is_none() {
        return Err(scope.throw_error(
            ErrorKind::TypeError,
            "Constructor ArrayBuffer requires 'new'",
        ));
    }
    let len = to_index(scope, &info.arg(0), "array buffer length")?;
    let buffer = scope.new_array_buffer(len)?;
    let default = scope.intrinsics().array_buffer_prototype;
    let prototype = scope.prototype_from_constructor(info.new_target, default)?;
    scope.set_prototype(buffer, Some(prototype));
    Ok(Value::Object(buffer))
}

fn construct_view(scope: &mut Scope, kind: ViewKind, info: CallInfo) -> JsResult<Value> {
    if info.new_target.is_none() {
        return Err(scope.throw_error(
            ErrorKind::TypeError,
            format!("Constructor {} requires 'new'", kind.name()),
        ));
    }
    let width = kind.element_width();
    let view = match info.arg(0) {
        Value::Object(source) if scope.is_array_buffer(source) => {
            let byte_offset = to_index(scope, &info.arg(1), "offset")?;
            let buffer_len = scope.array_buffer_len(source);
            let byte_length = match info.arg(2) {
                Value::Undefined => buffer_len.checked_sub(byte_offset).ok_or_else(|| {
                    scope.throw_error(
                        ErrorKind::RangeError,
                        format!("Start offset {} is outside the bounds of the buffer", byte_offset),
                    )
                })?,
                length => to_index(scope, &length, "typed array length")? * width,
            };
            scope.new_view(kind, source, byte_offset, byte_length)?
        }
        _ if !kind.is_typed_array() => {
            return Err(scope.throw_error(
                ErrorKind::TypeError,
                "First argument to DataView constructor must be an ArrayBuffer",
            ));
        }
        Value::Object(source) => {
            let length_value = scope.get(source, "length")?;
            let length = to_index(scope, &length_value, "typed array length")?;
            let view = scope.new_typed_array(kind, length)?;
            for index in 0..length {
                let element = scope.get(source, &index.to_string())?;
                scope.set(view, &index.to_string(), element)?;
            }
            view
        }
        length => {
            let length = to_index(scope, &length, "typed array length")?;
            scope.new_typed_array(kind, length)?
        }
    };
    let default = scope.intrinsics().view_prototype(kind);
    let prototype = scope.prototype_from_constructor(info.new_target, default)?;
    scope.set_prototype(view, Some(prototype));
    Ok(Value::Object(view))
}

fn construct_error(scope: &mut Scope, kind: ErrorKind, info: CallInfo) -> JsResult<Value> {
    let message = match info.arg(0) {
        Value::Undefined => String::new(),
        other => scope.to_string(&other)?,
    };
    let default = scope.intrinsics().error_prototype(kind);
    let prototype = scope.prototype_from_constructor(info.new_target, default)?;
    let error = scope.new_error(kind, &message);
    scope.set_prototype(error, Some(prototype));
    let name = scope.get(error, "name")?;
    let name = scope.to_string(&name)?;
    let stack = if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    };
    scope.define_property(error, "stack", Value::String(stack), false);
    Ok(Value::Object(error))
}

/// ToIndex: a non-negative integer below 2^53.
fn to_index(scope: &mut Scope, value: &Value, what: &str) -> JsResult<usize> {
    if value.is_undefined() {
        return Ok(0);
    }
    let number = scope.to_number(value)?;
    let integer = if number.is_nan() { 0.0 } else { number.trunc() };
    if integer < 0.0 || integer > 9_007_199_254_740_991.0 {
        return Err(scope.throw_error(ErrorKind::RangeError, format!("Invalid {}", what)));
    }
    Ok(integer as usize)
}

#[cfg(test)]
mod tests {
    use crate::config::IsolateConfig;
    use crate::scope::Scope;
    use crate::typed_array::ViewKind;
    use crate::value::Value;
    use core_types::{ErrorKind, IsolateId};

    fn scope() -> Scope {
        Scope::new(IsolateId::next(), IsolateConfig::default())
    }

    #[test]
    fn test_constructors_are_global_and_linked() {
        let mut scope = scope();
        for kind in ViewKind::ALL {
            let global = scope.global();
            let constructor = scope.get(global, kind.name()).unwrap();
            assert_eq!(constructor, Value::Object(scope.intrinsics().view_constructor(kind)));
            let prototype = scope.intrinsics().view_prototype(kind);
            assert_eq!(
                scope.get(prototype, "constructor").unwrap(),
                constructor
            );
        }
        let global = scope.global();
        assert!(scope.own_enumerable_keys(global).unwrap().is_empty());
    }

    #[test]
    fn test_error_subclasses_chain_to_error() {
        let mut scope = scope();
        let range = scope.intrinsics().error_prototype(ErrorKind::RangeError);
        let base = scope.intrinsics().error_prototype(ErrorKind::Error);
        assert_eq!(scope.get_prototype(range), Some(base));
        assert_eq!(
            scope.get(range, "name").unwrap(),
            Value::from("RangeError")
        );
    }

    #[test]
    fn test_construct_typed_array_from_array() {
        let mut scope = scope();
        let source = scope.new_array_from(vec![Value::from(1), Value::from(300)]);
        let constructor = scope.intrinsics().view_constructor(ViewKind::Uint8);
        let view = scope
            .construct(&Value::Object(constructor), vec![Value::Object(source)], None)
            .unwrap();
        let view = view.as_object().unwrap();
        assert_eq!(scope.get(view, "1").unwrap(), Value::from(44));
        assert_eq!(scope.get(view, "length").unwrap(), Value::from(2));
    }

    #[test]
    fn test_view_constructor_requires_new() {
        let mut scope = scope();
        let constructor = scope.intrinsics().view_constructor(ViewKind::Int8);
        let err = scope
            .call(&Value::Object(constructor), Value::Undefined, vec![])
            .unwrap_err();
        assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::TypeError));
    }
}
