//! Unit tests for the object model exposed by Scope

use isolate::{ErrorKind, IsolateConfig, IsolateId, Scope, Value, ViewKind};
use num_bigint::BigInt;

fn scope() -> Scope {
    Scope::new(IsolateId::next(), IsolateConfig::default())
}

#[test]
fn test_error_constructor_sets_message_and_stack() {
    let mut scope = scope();
    let constructor = scope.intrinsics().error_constructor(ErrorKind::TypeError);
    let error = scope
        .construct(&Value::Object(constructor), vec![Value::from("bad")], None)
        .unwrap();
    let id = error.as_object().unwrap();
    assert_eq!(scope.error_kind(&error), Some(ErrorKind::TypeError));
    assert_eq!(scope.get(id, "message").unwrap(), Value::from("bad"));
    assert_eq!(scope.get(id, "stack").unwrap(), Value::from("TypeError: bad"));
    assert_eq!(scope.to_string(&error).unwrap(), "TypeError: bad");
    assert!(scope.own_enumerable_keys(id).unwrap().is_empty());
}

#[test]
fn test_error_callable_without_new() {
    let mut scope = scope();
    let constructor = scope.intrinsics().error_constructor(ErrorKind::RangeError);
    let error = scope
        .call(&Value::Object(constructor), Value::Undefined, vec![Value::from("x")])
        .unwrap();
    assert_eq!(scope.error_kind(&error), Some(ErrorKind::RangeError));
}

#[test]
fn test_custom_error_subclass_keeps_name() {
    let mut scope = scope();
    let base = scope.intrinsics().error_constructor(ErrorKind::Error);
    let class = scope.new_class("MyError", Some(base)).unwrap();
    let prototype = scope.get(class, "prototype").unwrap().as_object().unwrap();
    scope.define_property(prototype, "name", Value::from("MyError"), false);
    let error = scope
        .construct(&Value::Object(class), vec![Value::from("custom")], None)
        .unwrap();
    assert_eq!(scope.constructor_name(&error).as_deref(), Some("MyError"));
    assert_eq!(scope.to_string(&error).unwrap(), "MyError: custom");
    let stack = scope.get(error.as_object().unwrap(), "stack").unwrap();
    assert_eq!(stack, Value::from("MyError: custom"));
}

#[test]
fn test_bigint_array_rejects_numbers() {
    let mut scope = scope();
    let view = scope.new_typed_array(ViewKind::BigInt64, 2).unwrap();
    let err = scope.set(view, "0", Value::from(1)).unwrap_err();
    assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::TypeError));
    scope
        .set(view, "1", Value::BigInt(BigInt::from(-5)))
        .unwrap();
    assert_eq!(
        scope.get(view, "1").unwrap(),
        Value::BigInt(BigInt::from(-5))
    );
}

#[test]
fn test_detached_buffer_reads_as_empty() {
    let mut scope = scope();
    let view = scope.new_typed_array(ViewKind::Float64, 2).unwrap();
    scope.set(view, "0", Value::from(1.5)).unwrap();
    let buffer = scope.view_data(view).unwrap().buffer;
    let bytes = scope.detach_array_buffer(buffer).unwrap();
    assert_eq!(bytes.len(), 16);
    assert!(scope.is_detached(buffer));
    assert_eq!(scope.get(view, "length").unwrap(), Value::from(0));
    assert_eq!(scope.get(view, "0").unwrap(), Value::Undefined);
    assert!(scope.view_bytes(view).is_none());
}

#[test]
fn test_host_data_downcasts() {
    let mut scope = scope();
    let host = scope.new_host_object(String::from("payload"));
    let value = Value::Object(host);
    assert_eq!(
        scope.host_data::<String>(&value).as_deref().map(String::as_str),
        Some("payload")
    );
    assert!(scope.host_data::<u32>(&value).is_none());
}

#[test]
fn test_instanceof_requires_callable() {
    let mut scope = scope();
    let obj = scope.new_object();
    let err = scope
        .instance_of(&Value::Object(obj), &Value::Object(obj))
        .unwrap_err();
    assert_eq!(scope.error_kind(err.value()), Some(ErrorKind::TypeError));
}

#[test]
fn test_proxy_typeof_follows_target() {
    let mut scope = scope();
    let func = scope.new_function("f", |_, _| Ok(Value::Undefined));
    let handler = scope.new_object();
    let proxy = scope.new_proxy(func, handler);
    assert_eq!(scope.type_of(&Value::Object(proxy)), "function");
    assert!(scope
        .call(&Value::Object(proxy), Value::Undefined, vec![])
        .is_ok());
}

#[test]
fn test_array_to_string_joins() {
    let mut scope = scope();
    let array = scope.new_array(vec![
        Some(Value::from(1)),
        None,
        Some(Value::Null),
        Some(Value::from("x")),
    ]);
    assert_eq!(scope.to_string(&Value::Object(array)).unwrap(), "1,,,x");
}

#[test]
fn test_data_view_has_no_indexed_elements() {
    let mut scope = scope();
    let buffer = scope.new_array_buffer(4).unwrap();
    let view = scope.new_view(ViewKind::DataView, buffer, 1, 3).unwrap();
    assert_eq!(scope.get(view, "byteLength").unwrap(), Value::from(3));
    assert_eq!(scope.get(view, "length").unwrap(), Value::Undefined);
    assert!(scope.own_keys(view).unwrap().is_empty());
}
