//! Unit tests for copying values between heaps

use isolate::{IsolateConfig, IsolateId, Scope, Value, ViewKind};
use num_bigint::BigInt;
use transfer::{decode, encode, IsolatedValue, TransferError};

fn scope() -> Scope {
    Scope::new(IsolateId::next(), IsolateConfig::default())
}

fn copy(from: &mut Scope, to: &mut Scope, value: &Value) -> Result<Value, TransferError> {
    let encoded = encode(from, value)?;
    decode(to, &encoded)
}

/// Attach one property of every kind the codec handles to `target`.
fn add_mixed_properties(scope: &mut Scope, target: isolate::ObjectId) {
    let nested = scope.new_object();
    scope.set(nested, "deep", Value::from(true)).unwrap();
    let list = scope.new_array_from(vec![Value::from(1), Value::from("two"), Value::Null]);
    scope.set(target, "name", Value::from("payload")).unwrap();
    scope.set(target, "count", Value::from(7)).unwrap();
    scope.set(target, "flag", Value::from(false)).unwrap();
    scope.set(target, "nothing", Value::Null).unwrap();
    scope.set(target, "missing", Value::Undefined).unwrap();
    scope
        .set(target, "big", Value::from(BigInt::from(1u64 << 60)))
        .unwrap();
    scope.set(target, "list", Value::Object(list)).unwrap();
    scope.set(target, "nested", Value::Object(nested)).unwrap();
}

fn check_mixed_properties(scope: &mut Scope, target: isolate::ObjectId) {
    assert_eq!(scope.get(target, "name").unwrap(), Value::from("payload"));
    assert_eq!(scope.get(target, "count").unwrap(), Value::from(7));
    assert_eq!(scope.get(target, "flag").unwrap(), Value::from(false));
    assert_eq!(scope.get(target, "nothing").unwrap(), Value::Null);
    assert_eq!(scope.get_own(target, "missing"), Some(Value::Undefined));
    assert_eq!(
        scope.get(target, "big").unwrap(),
        Value::from(BigInt::from(1u64 << 60))
    );
    let list = scope.get(target, "list").unwrap();
    assert!(scope.is_array(list.as_object().unwrap()));
    assert_eq!(scope.get_value(&list, "1").unwrap(), Value::from("two"));
    let nested = scope.get(target, "nested").unwrap();
    assert_eq!(scope.get_value(&nested, "deep").unwrap(), Value::from(true));
}

fn sample(kind: ViewKind, index: usize) -> Value {
    if kind.is_bigint() {
        Value::from(BigInt::from(index as i64 * 3 + 1))
    } else {
        Value::from(index as i32 * 3 + 1)
    }
}

#[test]
fn test_every_view_kind_round_trips() {
    for kind in ViewKind::ALL {
        let mut from = scope();
        let mut to = scope();
        let view = if kind == ViewKind::DataView {
            let buffer = from.new_array_buffer_from(vec![1, 2, 3, 4]).unwrap();
            from.new_view(kind, buffer, 1, 3).unwrap()
        } else {
            let view = from.new_typed_array(kind, 4).unwrap();
            for index in 0..4 {
                from.set(view, &index.to_string(), sample(kind, index)).unwrap();
            }
            view
        };
        let copied = copy(&mut from, &mut to, &Value::Object(view)).unwrap();
        let copied = copied.as_object().unwrap();
        assert_eq!(to.view_data(copied).unwrap().kind, kind);
        assert_eq!(to.view_bytes(copied), from.view_bytes(view), "{}", kind.name());
        let expected = to.intrinsics().view_prototype(kind);
        assert_eq!(to.get_prototype(copied), Some(expected));
    }
}

#[test]
fn test_every_view_kind_keeps_extra_properties() {
    for kind in ViewKind::ALL {
        let mut from = scope();
        let mut to = scope();
        let buffer = from.new_array_buffer(16).unwrap();
        let view = from.new_view(kind, buffer, 0, 16).unwrap();
        add_mixed_properties(&mut from, view);
        let copied = copy(&mut from, &mut to, &Value::Object(view)).unwrap();
        check_mixed_properties(&mut to, copied.as_object().unwrap());
    }
}

#[test]
fn test_extra_properties_follow_own_key_order() {
    let mut from = scope();
    let view = from.new_typed_array(ViewKind::Int16, 2).unwrap();
    from.set(view, "z", Value::from(1)).unwrap();
    from.set(view, "a", Value::from(2)).unwrap();
    let IsolatedValue::View { properties, .. } = encode(&mut from, &Value::Object(view)).unwrap()
    else {
        panic!("expected a view leaf");
    };
    let keys: Vec<&str> = properties.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["z", "a"]);
}

#[test]
fn test_views_over_one_buffer_stay_shared() {
    let mut from = scope();
    let mut to = scope();
    let buffer = from.new_array_buffer(8).unwrap();
    let low = from.new_view(ViewKind::Uint8, buffer, 0, 4).unwrap();
    let high = from.new_view(ViewKind::Uint8, buffer, 4, 4).unwrap();
    let pair = from.new_array_from(vec![Value::Object(low), Value::Object(high)]);

    let copied = copy(&mut from, &mut to, &Value::Object(pair)).unwrap();
    let low = to.get_value(&copied, "0").unwrap().as_object().unwrap();
    let high = to.get_value(&copied, "1").unwrap().as_object().unwrap();
    assert_eq!(to.view_data(low).unwrap().buffer, to.view_data(high).unwrap().buffer);
    assert_eq!(to.view_data(high).unwrap().byte_offset, 4);
}

#[test]
fn test_top_level_proxy_copies_target() {
    let mut from = scope();
    let mut to = scope();
    let target = from.new_object();
    from.set(target, "x", Value::from(1)).unwrap();
    let handler = from.new_object();
    let proxy = from.new_proxy(target, handler);

    let direct = encode(&mut from, &Value::Object(target)).unwrap();
    let through_proxy = encode(&mut from, &Value::Object(proxy)).unwrap();
    assert_eq!(direct, through_proxy);
    let copied = decode(&mut to, &through_proxy).unwrap();
    assert_eq!(to.get_value(&copied, "x").unwrap(), Value::from(1));
}

#[test]
fn test_nested_proxy_is_a_type_error() {
    let mut from = scope();
    let target = from.new_object();
    let handler = from.new_object();
    let proxy = from.new_proxy(target, handler);
    let outer = from.new_object();
    from.set(outer, "inner", Value::Object(proxy)).unwrap();

    let err = encode(&mut from, &Value::Object(outer)).unwrap_err();
    assert!(matches!(err, TransferError::UnserializableValue(_)));
    assert_eq!(err.kind(), isolate::ErrorKind::TypeError);
}

#[test]
fn test_functions_are_not_cloneable() {
    let mut from = scope();
    let func = from.new_function("f", |_, _| Ok(Value::Undefined));
    let err = encode(&mut from, &Value::Object(func)).unwrap_err();
    assert!(matches!(err, TransferError::UnserializableValue(_)));
}

#[test]
fn test_error_objects_keep_kind_and_message() {
    let mut from = scope();
    let mut to = scope();
    let error = from.new_error(isolate::ErrorKind::RangeError, "too far");
    let copied = copy(&mut from, &mut to, &Value::Object(error)).unwrap();
    assert_eq!(to.error_kind(&copied), Some(isolate::ErrorKind::RangeError));
    assert_eq!(to.get_value(&copied, "message").unwrap(), Value::from("too far"));
}

#[test]
fn test_array_holes_survive() {
    let mut from = scope();
    let mut to = scope();
    let array = from.new_array(vec![Some(Value::from(1)), None, Some(Value::from(3))]);
    let copied = copy(&mut from, &mut to, &Value::Object(array)).unwrap();
    let copied_id = copied.as_object().unwrap();
    assert_eq!(to.get(copied_id, "length").unwrap(), Value::from(3));
    assert_eq!(to.get_own(copied_id, "1"), None);
    assert_eq!(to.get_own(copied_id, "2"), Some(Value::from(3)));
}

#[test]
fn test_cycles_survive() {
    let mut from = scope();
    let mut to = scope();
    let node = from.new_object();
    from.set(node, "self", Value::Object(node)).unwrap();
    let copied = copy(&mut from, &mut to, &Value::Object(node)).unwrap();
    assert_eq!(to.get_value(&copied, "self").unwrap(), copied);
}

#[test]
fn test_decode_is_idempotent() {
    let mut from = scope();
    let mut to = scope();
    let root = from.new_object();
    add_mixed_properties(&mut from, root);
    let encoded = encode(&mut from, &Value::Object(root)).unwrap();

    let first = decode(&mut to, &encoded).unwrap();
    let second = decode(&mut to, &encoded).unwrap();
    assert_ne!(first, second);
    assert_eq!(encode(&mut to, &first).unwrap(), encode(&mut to, &second).unwrap());
    check_mixed_properties(&mut to, first.as_object().unwrap());
    check_mixed_properties(&mut to, second.as_object().unwrap());
}

#[test]
fn test_buffer_like_views_need_registration_on_both_sides() {
    let mut from = scope();
    let mut to = scope();
    let uint8 = from.intrinsics().view_constructor(ViewKind::Uint8);
    let class = from.new_class("Buffer", Some(uint8)).unwrap();
    transfer::register_buffer_prototype_in(&mut from, &Value::Object(class)).unwrap();
    let prototype = from.buffer_prototype().unwrap();
    let view = from.new_typed_array(ViewKind::Uint8, 2).unwrap();
    from.set_prototype(view, Some(prototype));

    // Destination without a registered prototype sees a plain Uint8Array.
    let plain = copy(&mut from, &mut to, &Value::Object(view)).unwrap();
    assert_eq!(to.constructor_name(&plain).as_deref(), Some("Uint8Array"));

    let uint8 = to.intrinsics().view_constructor(ViewKind::Uint8);
    let buffer_class = to.new_class("Buffer", Some(uint8)).unwrap();
    transfer::register_buffer_prototype_in(&mut to, &Value::Object(buffer_class)).unwrap();
    let copied = copy(&mut from, &mut to, &Value::Object(view)).unwrap();
    assert!(to.instance_of(&copied, &Value::Object(buffer_class)).unwrap());
    assert_eq!(to.constructor_name(&copied).as_deref(), Some("Buffer"));
}

#[test]
fn test_allocation_limit_surfaces_as_range_error() {
    let mut from = scope();
    let mut to = Scope::new(
        IsolateId::next(),
        IsolateConfig::default().with_max_array_buffer_bytes(4),
    );
    let buffer = from.new_array_buffer(64).unwrap();
    let err = copy(&mut from, &mut to, &Value::Object(buffer)).unwrap_err();
    assert_eq!(err.kind(), isolate::ErrorKind::RangeError);
}
