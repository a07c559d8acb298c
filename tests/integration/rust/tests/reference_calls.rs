//! Reference call integration tests
//!
//! Functions living in one isolate are invoked from the host and from other
//! isolates; failures must come back typed.

use integration_tests::{global_ref, set_global, spawn_isolate};
use isolate::{ErrorKind, IsolateError, Value};
use std::time::Duration;
use transfer::{ApplyOptions, IsolatedValue, TransferError, TransferMode, Transferred};

#[test]
fn test_apply_from_other_isolate_with_copied_arguments() {
    let owner = spawn_isolate("owner");
    let caller = spawn_isolate("caller");
    owner
        .run_sync(|scope| {
            let sum = scope.new_function("sum", |scope, info| {
                let list = info.arg(0);
                let length = scope.get_value(&list, "length")?;
                let length = scope.to_number(&length)? as usize;
                let mut total = 0.0;
                for i in 0..length {
                    let item = scope.get_value(&list, &i.to_string())?;
                    total += scope.to_number(&item)?;
                }
                Ok(Value::from(total))
            });
            set_global(scope, "sum", Value::Object(sum));
        })
        .unwrap();
    let sum = global_ref(&owner, "sum");

    let total = caller
        .run_sync(move |scope| {
            let list = scope.new_array_from(vec![Value::from(1), Value::from(2), Value::from(3)]);
            let options = ApplyOptions::default()
                .with_arguments(TransferMode::Copy)
                .with_result(TransferMode::Copy);
            sum.apply_in(scope, &Value::Undefined, &[Value::Object(list)], options)
        })
        .unwrap()
        .unwrap();
    assert_eq!(total, Value::from(6));
}

#[test]
fn test_callee_exception_keeps_kind_and_owner() {
    let owner = spawn_isolate("owner");
    owner
        .run_sync(|scope| {
            let check = scope.new_function("check", |scope, info| {
                if info.arg(0).is_undefined() {
                    return Err(scope.throw_error(ErrorKind::TypeError, "argument required"));
                }
                Ok(Value::from(true))
            });
            set_global(scope, "check", Value::Object(check));
        })
        .unwrap();
    let check = global_ref(&owner, "check");
    let err = check
        .apply_sync(None, vec![], ApplyOptions::default())
        .unwrap_err();
    match err {
        TransferError::CrossIsolateException {
            isolate,
            kind,
            value,
            ..
        } => {
            assert_eq!(isolate, owner.id());
            assert_eq!(kind, ErrorKind::TypeError);
            assert!(matches!(
                *value,
                IsolatedValue::Error { kind: ErrorKind::TypeError, ref message, .. } if message == "argument required"
            ));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_thrown_plain_object_is_reported_as_non_error() {
    let owner = spawn_isolate("owner");
    owner
        .run_sync(|scope| {
            let raise = scope.new_function("raise", |scope, _| {
                let thrown = scope.new_object();
                Err(isolate::Exception(Value::Object(thrown)))
            });
            set_global(scope, "raise", Value::Object(raise));
        })
        .unwrap();
    let err = global_ref(&owner, "raise")
        .apply_sync(None, vec![], ApplyOptions::default())
        .unwrap_err();
    match err {
        TransferError::CrossIsolateException { value, .. } => match *value {
            IsolatedValue::Error { message, .. } => {
                assert_eq!(message, transfer::NON_ERROR_THROWN)
            }
            other => panic!("unexpected thrown copy: {:?}", other),
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_thrown_object_with_message_is_rethrown_as_error() {
    let owner = spawn_isolate("owner");
    let caller = spawn_isolate("caller");
    owner
        .run_sync(|scope| {
            let raise = scope.new_function("raise", |scope, _| {
                let thrown = scope.new_object();
                scope.set(thrown, "message", Value::from("x"))?;
                Err(isolate::Exception(Value::Object(thrown)))
            });
            set_global(scope, "raise", Value::Object(raise));
        })
        .unwrap();
    let raise = global_ref(&owner, "raise");
    let message = caller
        .run_sync(move |scope| {
            let err = raise
                .apply_in(scope, &Value::Undefined, &[], ApplyOptions::default())
                .unwrap_err();
            let thrown = err.into_exception(scope).into_value();
            scope.get_value(&thrown, "message").unwrap()
        })
        .unwrap();
    assert_eq!(message, Value::from("x"));
}

#[test]
fn test_disposed_isolate_and_released_reference() {
    let owner = spawn_isolate("owner");
    owner
        .run_sync(|scope| {
            let obj = scope.new_object();
            set_global(scope, "obj", Value::Object(obj));
        })
        .unwrap();
    let released = global_ref(&owner, "obj");
    released.release();
    assert_eq!(
        released.get_sync("x", TransferMode::Copy),
        Err(TransferError::ReleasedReference)
    );

    let live = global_ref(&owner, "obj");
    owner.dispose().unwrap();
    assert_eq!(
        live.set_sync("x", Transferred::primitive(1.0.into()).unwrap()),
        Err(TransferError::DisposedIsolate(owner.id()))
    );
    assert!(matches!(
        owner.run_sync(|_| ()),
        Err(IsolateError::Disposed(_))
    ));
}

#[test]
fn test_timeout_leaves_owner_usable() {
    let owner = spawn_isolate("owner");
    owner
        .run_sync(|scope| {
            let wait = scope.new_function("wait", |_, _| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(Value::from("done"))
            });
            set_global(scope, "wait", Value::Object(wait));
        })
        .unwrap();
    let wait = global_ref(&owner, "wait");
    let quick = ApplyOptions::default().with_timeout(Duration::from_millis(10));
    assert!(matches!(
        wait.apply_sync(None, vec![], quick),
        Err(TransferError::Timeout(_))
    ));
    let patient = ApplyOptions::default().with_timeout(Duration::from_secs(5));
    let result = wait.apply_sync(None, vec![], patient).unwrap();
    assert_eq!(result.to_isolated().unwrap(), Some("done".into()));
}

#[test]
fn test_mutual_blocking_calls_are_detected() {
    let first = spawn_isolate("first");
    let second = spawn_isolate("second");
    let second_handle = second.clone();
    let first_handle = first.clone();

    // first -> second -> first would wait forever.
    let result = first
        .run_sync(move |_| {
            second_handle.run_sync(move |_| first_handle.run_sync(|_| ()))
        })
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(IsolateError::Deadlock { .. })));
}

#[tokio::test]
async fn test_async_apply_with_reference_result() {
    let owner = spawn_isolate("owner");
    owner
        .run_sync(|scope| {
            let make = scope.new_function("make", |scope, _| {
                let obj = scope.new_object();
                scope.set(obj, "made", Value::from(true))?;
                Ok(Value::Object(obj))
            });
            set_global(scope, "make", Value::Object(make));
        })
        .unwrap();
    let make = global_ref(&owner, "make");
    let options = ApplyOptions::default().with_result(TransferMode::Reference);
    let made = make.apply(None, vec![], options).await.unwrap();
    let made = made.as_reference().cloned().unwrap();
    assert_eq!(made.type_of(), "object");
    let flag = made.get("made", TransferMode::Copy).await.unwrap();
    assert_eq!(flag.to_isolated().unwrap(), Some(IsolatedValue::Boolean(true)));
}
