//! Unit tests for reference handles between isolate threads

use isolate::{ErrorKind, IsolateConfig, IsolateHandle, IsolateId, Value};
use std::time::Duration;
use transfer::{
    decode_buffer, encode_to_buffer, ApplyOptions, IsolateTransferExt, IsolatedValue,
    ReferenceHandle, ReferenceTable, TransferBuffer, TransferError, TransferMode, Transferred,
};

fn isolate() -> IsolateHandle {
    IsolateHandle::new(IsolateConfig::default()).unwrap()
}

/// Define `name` on the global object of `isolate` as a native function.
fn define_global_function<F>(isolate: &IsolateHandle, name: &'static str, callback: F)
where
    F: Fn(&mut isolate::Scope, isolate::CallInfo) -> isolate::JsResult<Value> + Send + 'static,
{
    isolate
        .run_sync(move |scope| {
            let func = scope.new_function(name, callback);
            let global = scope.global();
            scope.set(global, name, Value::Object(func)).unwrap();
        })
        .unwrap();
}

fn function_reference(isolate: &IsolateHandle, name: &str) -> ReferenceHandle {
    let global = isolate.global_reference().unwrap();
    global
        .get_sync(name, TransferMode::Reference)
        .unwrap()
        .as_reference()
        .cloned()
        .unwrap()
}

fn table_len(isolate: &IsolateHandle) -> usize {
    isolate
        .run_sync(|scope| scope.slot::<ReferenceTable>().map_or(0, ReferenceTable::len))
        .unwrap()
}

fn text(value: &str) -> Transferred {
    Transferred::primitive(IsolatedValue::from(value)).unwrap()
}

#[test]
fn test_set_then_get_through_global() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    global.set_sync("answer", Transferred::primitive(42.0.into()).unwrap()).unwrap();
    let got = global.get_sync("answer", TransferMode::Copy).unwrap();
    assert_eq!(got.to_isolated().unwrap(), Some(IsolatedValue::Number(42.0)));
    assert!(global.delete_sync("answer").unwrap());
    let gone = global.get_sync("answer", TransferMode::Copy).unwrap();
    assert_eq!(gone.to_isolated().unwrap(), Some(IsolatedValue::Undefined));
}

#[test]
fn test_get_path_walks_nested_objects() {
    let isolate = isolate();
    isolate
        .run_sync(|scope| {
            let inner = scope.new_object();
            scope.set(inner, "leaf", Value::from("found")).unwrap();
            let global = scope.global();
            scope.set(global, "outer", Value::Object(inner)).unwrap();
        })
        .unwrap();
    let global = isolate.global_reference().unwrap();
    let leaf = global
        .get_path_sync(&["outer", "leaf"], TransferMode::Copy)
        .unwrap();
    assert_eq!(leaf.to_isolated().unwrap(), Some("found".into()));
}

#[test]
fn test_copy_sync_returns_a_detached_tree() {
    let isolate = isolate();
    let handle = isolate
        .run_sync(|scope| {
            let obj = scope.new_object();
            scope.set(obj, "n", Value::from(1)).unwrap();
            ReferenceHandle::new(scope, Value::Object(obj))
        })
        .unwrap();
    let copied = handle.copy_sync().unwrap();
    assert_eq!(
        copied,
        IsolatedValue::Object(vec![("n".to_string(), IsolatedValue::Number(1.0))])
    );
}

#[test]
fn test_apply_runs_in_owner() {
    let isolate = isolate();
    define_global_function(&isolate, "greet", |scope, info| {
        let name = scope.to_string(&info.arg(0))?;
        Ok(Value::String(format!("hello {}", name)))
    });
    let greet = function_reference(&isolate, "greet");
    assert_eq!(greet.type_of(), "function");
    let result = greet
        .apply_sync(None, vec![text("world")], ApplyOptions::default())
        .unwrap();
    assert_eq!(result.to_isolated().unwrap(), Some("hello world".into()));
}

#[test]
fn test_apply_propagates_callee_exception() {
    let isolate = isolate();
    define_global_function(&isolate, "fail", |scope, _| {
        Err(scope.throw_error(ErrorKind::RangeError, "out of range"))
    });
    let fail = function_reference(&isolate, "fail");
    match fail.apply_sync(None, vec![], ApplyOptions::default()) {
        Err(TransferError::CrossIsolateException {
            isolate: owner,
            kind,
            message,
            ..
        }) => {
            assert_eq!(owner, isolate.id());
            assert_eq!(kind, ErrorKind::RangeError);
            assert!(message.contains("out of range"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_exception_is_rethrown_in_caller_isolate() {
    let owner = isolate();
    let caller = isolate();
    define_global_function(&owner, "fail", |scope, _| {
        Err(scope.throw_error(ErrorKind::TypeError, "bad input"))
    });
    let fail = function_reference(&owner, "fail");
    let (kind, message) = caller
        .run_sync(move |scope| {
            let err = fail
                .apply_in(scope, &Value::Undefined, &[], ApplyOptions::default())
                .unwrap_err();
            let thrown = err.into_exception(scope).into_value();
            let message = scope.get_value(&thrown, "message").unwrap();
            (scope.error_kind(&thrown), message)
        })
        .unwrap();
    assert_eq!(kind, Some(ErrorKind::TypeError));
    assert_eq!(message, Value::from("bad input"));
}

#[test]
fn test_apply_on_non_function_is_rejected() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    assert_eq!(
        global.apply_sync(None, vec![], ApplyOptions::default()),
        Err(TransferError::NotCallable)
    );
}

#[test]
fn test_apply_timeout_abandons_the_wait() {
    let isolate = isolate();
    define_global_function(&isolate, "slow", |_, _| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(Value::Undefined)
    });
    let slow = function_reference(&isolate, "slow");
    let options = ApplyOptions::default().with_timeout(Duration::from_millis(20));
    assert!(matches!(
        slow.apply_sync(None, vec![], options),
        Err(TransferError::Timeout(_))
    ));
    // The isolate finishes the abandoned call and keeps serving.
    let global = isolate.global_reference().unwrap();
    assert!(global.get_sync("slow", TransferMode::Reference).is_ok());
}

#[test]
fn test_transferable_mode_rejects_objects() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    assert_eq!(
        global.get_sync("Object", TransferMode::Transferable),
        Err(TransferError::NonTransferable)
    );
}

#[test]
fn test_released_reference_fails_typed() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    let clone = global.clone();
    global.release();
    global.release();
    assert!(clone.is_released());
    assert_eq!(clone.copy_sync(), Err(TransferError::ReleasedReference));
}

#[test]
fn test_disposed_owner_fails_typed() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    let id = isolate.id();
    isolate.dispose().unwrap();
    assert_eq!(
        global.get_sync("anything", TransferMode::Copy),
        Err(TransferError::DisposedIsolate(id))
    );
    // Releasing after disposal is harmless.
    global.release();
}

#[test]
fn test_reference_resolves_to_original_in_owner() {
    let owner = isolate();
    let other = isolate();
    let handle = owner
        .run_sync(|scope| {
            let obj = scope.new_object();
            (obj, ReferenceHandle::new(scope, Value::Object(obj)))
        })
        .unwrap();
    let (original, handle) = handle;

    // Passed into another isolate it stays a reference object.
    let inside_other = handle.clone();
    let is_reference = other
        .run_sync(move |scope| {
            let value = inside_other.into_value(scope).unwrap();
            scope.host_data::<ReferenceHandle>(&value).is_some()
        })
        .unwrap();
    assert!(is_reference);

    // Back home it is the very same object.
    let resolved = owner
        .run_sync(move |scope| handle.into_value(scope).unwrap())
        .unwrap();
    assert_eq!(resolved, Value::Object(original));
}

#[test]
fn test_deref_from_wrong_isolate() {
    let owner = isolate();
    let other = isolate();
    let global = owner.global_reference().unwrap();
    let result = other.run_sync(move |scope| global.deref(scope)).unwrap();
    assert!(matches!(result, Err(TransferError::WrongIsolate { .. })));
}

#[test]
fn test_blocking_call_into_own_isolate_is_rejected() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    let result = isolate
        .run_sync(move |_| global.get_sync("Object", TransferMode::Reference))
        .unwrap();
    assert!(matches!(
        result,
        Err(TransferError::Isolate(isolate::IsolateError::SameThread(_)))
    ));
}

#[tokio::test]
async fn test_async_get_and_apply() {
    let isolate = isolate();
    define_global_function(&isolate, "double", |scope, info| {
        let n = scope.to_number(&info.arg(0))?;
        Ok(Value::from(n * 2.0))
    });
    let global = isolate.global_reference().unwrap();
    let double = global
        .get("double", TransferMode::Reference)
        .await
        .unwrap()
        .as_reference()
        .cloned()
        .unwrap();
    let result = double
        .apply(
            None,
            vec![Transferred::primitive(21.0.into()).unwrap()],
            ApplyOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.to_isolated().unwrap(), Some(IsolatedValue::Number(42.0)));
}

#[tokio::test]
async fn test_async_set_copy_delete() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    global.set("k", text("v")).await.unwrap();
    let copied = global.copy().await.unwrap();
    let IsolatedValue::Object(properties) = copied else {
        panic!("expected a plain object copy");
    };
    assert!(properties
        .iter()
        .any(|(key, value)| key == "k" && *value == IsolatedValue::from("v")));
    assert!(global.delete("k").await.unwrap());
}

#[test]
fn test_dropped_handles_release_their_entries() {
    let isolate = isolate();
    let baseline = table_len(&isolate);
    for _ in 0..50 {
        drop(isolate.global_reference().unwrap());
    }
    let held = isolate.global_reference().unwrap();
    let clone = held.clone();
    drop(held);
    // Releases are queued ahead of the length check.
    assert_eq!(table_len(&isolate), baseline + 1);
    drop(clone);
    assert_eq!(table_len(&isolate), baseline);
}

#[test]
fn test_reference_mode_results_are_released_on_drop() {
    let isolate = isolate();
    let global = isolate.global_reference().unwrap();
    let baseline = table_len(&isolate);
    for _ in 0..100 {
        let got = global.get_sync("Object", TransferMode::Reference).unwrap();
        assert!(got.as_reference().is_some());
    }
    assert_eq!(table_len(&isolate), baseline);
}

#[test]
fn test_copied_reference_outlives_original_handle() {
    let owner = isolate();
    let handle = owner.global_reference().unwrap();
    let mut holder = isolate::Scope::new(IsolateId::next(), IsolateConfig::default());
    let host = holder.new_host_object(handle);
    let buffer = encode_to_buffer(&mut holder, &Value::Object(host)).unwrap();
    drop(holder);
    let bytes = buffer.as_bytes().to_vec();

    let is_global = owner
        .run_sync(move |scope| {
            let value = decode_buffer(scope, &buffer).unwrap();
            value == Value::Object(scope.global())
        })
        .unwrap();
    assert!(is_global);

    // The last carrier is gone, so stale bytes no longer resolve.
    let stale = owner
        .run_sync(move |scope| {
            let restored = TransferBuffer::from_bytes(bytes).unwrap();
            decode_buffer(scope, &restored)
        })
        .unwrap();
    assert_eq!(stale, Err(TransferError::ReleasedReference));
}

#[test]
fn test_far_index_write_through_reference() {
    let isolate = isolate();
    let list = isolate
        .run_sync(|scope| {
            let list = scope.new_array(vec![]);
            ReferenceHandle::new(scope, Value::Object(list))
        })
        .unwrap();
    list.set_sync("4294967294", Transferred::primitive(1.0.into()).unwrap())
        .unwrap();
    let length = list.get_sync("length", TransferMode::Copy).unwrap();
    assert_eq!(length.to_isolated().unwrap(), Some(IsolatedValue::Number(4294967295.0)));
    let copied = list.copy_sync().unwrap();
    assert_eq!(
        copied,
        IsolatedValue::Array {
            length: 4294967295,
            elements: vec![(4294967294, IsolatedValue::Number(1.0))],
            properties: vec![],
        }
    );
}
