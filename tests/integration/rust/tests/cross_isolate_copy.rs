//! Cross-isolate copy integration tests
//!
//! Values built in one isolate are copied into another through reference
//! handles and checked from inside the destination.

use integration_tests::{global_ref, install_buffer_class, set_global, spawn_isolate};
use isolate::{Value, ViewKind};
use num_bigint::BigInt;
use transfer::{decode, IsolatedValue, TransferError, TransferMode};

#[test]
fn test_typed_array_with_extra_properties() {
    let source = spawn_isolate("source");
    let dest = spawn_isolate("dest");
    source
        .run_sync(|scope| {
            let view = scope.new_typed_array(ViewKind::Float64, 3).unwrap();
            scope.set(view, "0", Value::from(1.5)).unwrap();
            scope.set(view, "2", Value::from(-0.25)).unwrap();
            scope.set(view, "label", Value::from("coords")).unwrap();
            scope.set(view, "big", Value::from(BigInt::from(7))).unwrap();
            set_global(scope, "data", Value::Object(view));
        })
        .unwrap();

    let data = global_ref(&source, "data");
    let (elements, label, big) = dest
        .run_sync(move |scope| {
            let copy = data.copy_in(scope).unwrap();
            let id = copy.as_object().unwrap();
            let elements: Vec<Value> = (0..3)
                .map(|i| scope.get(id, &i.to_string()).unwrap())
                .collect();
            let label = scope.get(id, "label").unwrap();
            let big = scope.get(id, "big").unwrap();
            (elements, label, big)
        })
        .unwrap();
    assert_eq!(
        elements,
        vec![Value::from(1.5), Value::from(0.0), Value::from(-0.25)]
    );
    assert_eq!(label, Value::from("coords"));
    assert_eq!(big, Value::from(BigInt::from(7)));
}

#[test]
fn test_proxy_copy_matches_target() {
    let source = spawn_isolate("source");
    let dest = spawn_isolate("dest");
    source
        .run_sync(|scope| {
            let target = scope.new_object();
            scope.set(target, "a", Value::from(1)).unwrap();
            scope.set(target, "b", Value::from("two")).unwrap();
            let handler = scope.new_object();
            let proxy = scope.new_proxy(target, handler);
            set_global(scope, "target", Value::Object(target));
            set_global(scope, "proxied", Value::Object(proxy));

            let holder = scope.new_object();
            scope.set(holder, "inner", Value::Object(proxy)).unwrap();
            set_global(scope, "holder", Value::Object(holder));
        })
        .unwrap();

    let direct = global_ref(&source, "target").copy_sync().unwrap();
    let proxied = global_ref(&source, "proxied").copy_sync().unwrap();
    assert_eq!(direct, proxied);

    let keys = dest
        .run_sync(move |scope| {
            let copy = decode(scope, &proxied).unwrap();
            scope.own_keys(copy.as_object().unwrap()).unwrap()
        })
        .unwrap();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

    let nested = global_ref(&source, "holder").copy_sync().unwrap_err();
    assert!(matches!(nested, TransferError::UnserializableValue(_)));
    assert_eq!(nested.kind(), isolate::ErrorKind::TypeError);
}

#[test]
fn test_buffer_prototype_registered_on_both_sides() {
    let source = spawn_isolate("source");
    let dest = spawn_isolate("dest");
    let plain_dest = spawn_isolate("plain");
    source
        .run_sync(|scope| {
            let class = install_buffer_class(scope);
            let prototype = scope.buffer_prototype().unwrap();
            let view = scope.new_typed_array(ViewKind::Uint8, 4).unwrap();
            scope.set_prototype(view, Some(prototype));
            assert!(scope.instance_of(&Value::Object(view), &class).unwrap());
            set_global(scope, "buf", Value::Object(view));
        })
        .unwrap();
    dest.run_sync(|scope| {
        install_buffer_class(scope);
    })
    .unwrap();

    let buf = global_ref(&source, "buf");
    let plain_buf = buf.clone();
    let (is_buffer, name) = dest
        .run_sync(move |scope| {
            let copy = buf.copy_in(scope).unwrap();
            let global = Value::Object(scope.global());
            let class = scope.get_value(&global, "Buffer").unwrap();
            (
                scope.instance_of(&copy, &class).unwrap(),
                scope.constructor_name(&copy),
            )
        })
        .unwrap();
    assert!(is_buffer);
    assert_eq!(name.as_deref(), Some("Buffer"));

    let plain_name = plain_dest
        .run_sync(move |scope| {
            let copy = plain_buf.copy_in(scope).unwrap();
            scope.constructor_name(&copy)
        })
        .unwrap();
    assert_eq!(plain_name.as_deref(), Some("Uint8Array"));
}

#[test]
fn test_shared_and_cyclic_graphs_survive() {
    let source = spawn_isolate("source");
    let dest = spawn_isolate("dest");
    source
        .run_sync(|scope| {
            let shared = scope.new_object();
            let root = scope.new_object();
            scope.set(root, "left", Value::Object(shared)).unwrap();
            scope.set(root, "right", Value::Object(shared)).unwrap();
            scope.set(shared, "back", Value::Object(root)).unwrap();
            set_global(scope, "root", Value::Object(root));
        })
        .unwrap();
    let root = global_ref(&source, "root");
    let (shared_kept, cycle_kept) = dest
        .run_sync(move |scope| {
            let copy = root.copy_in(scope).unwrap();
            let left = scope.get_value(&copy, "left").unwrap();
            let right = scope.get_value(&copy, "right").unwrap();
            let back = scope.get_value(&left, "back").unwrap();
            (left == right, back == copy)
        })
        .unwrap();
    assert!(shared_kept);
    assert!(cycle_kept);
}

#[test]
fn test_receiving_twice_gives_independent_graphs() {
    let source = spawn_isolate("source");
    let dest = spawn_isolate("dest");
    source
        .run_sync(|scope| {
            let list = scope.new_array_from(vec![Value::from(1), Value::from(2)]);
            set_global(scope, "list", Value::Object(list));
        })
        .unwrap();
    let copied = global_ref(&source, "list").copy_sync().unwrap();
    let (distinct, first_after, second_after) = dest
        .run_sync(move |scope| {
            let first = decode(scope, &copied).unwrap();
            let second = decode(scope, &copied).unwrap();
            let first_id = first.as_object().unwrap();
            scope.set(first_id, "0", Value::from(99)).unwrap();
            (
                first != second,
                scope.get(first_id, "0").unwrap(),
                scope.get_value(&second, "0").unwrap(),
            )
        })
        .unwrap();
    assert!(distinct);
    assert_eq!(first_after, Value::from(99));
    assert_eq!(second_after, Value::from(1));
}

#[test]
fn test_get_by_copy_through_global_reference() {
    use transfer::IsolateTransferExt;

    let source = spawn_isolate("source");
    source
        .run_sync(|scope| {
            let nested = scope.new_object();
            scope.set(nested, "ok", Value::from(true)).unwrap();
            set_global(scope, "config", Value::Object(nested));
        })
        .unwrap();
    let global = source.global_reference().unwrap();
    let config = global.get_sync("config", TransferMode::Copy).unwrap();
    assert_eq!(
        config.to_isolated().unwrap(),
        Some(IsolatedValue::Object(vec![(
            "ok".to_string(),
            IsolatedValue::Boolean(true)
        )]))
    );
}
