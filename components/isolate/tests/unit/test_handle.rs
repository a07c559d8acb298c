//! Unit tests for isolate handles and the isolate thread

use isolate::{IsolateConfig, IsolateError, IsolateHandle, Value};
use std::time::Duration;

fn isolate() -> IsolateHandle {
    IsolateHandle::new(IsolateConfig::default()).unwrap()
}

#[test]
fn test_run_sync_returns_result() {
    let isolate = isolate();
    let length = isolate
        .run_sync(|scope| {
            let array = scope.new_array_from(vec![Value::from(1), Value::from(2)]);
            scope.get(array, "length").unwrap()
        })
        .unwrap();
    assert_eq!(length, Value::from(2));
}

#[test]
fn test_state_persists_between_tasks() {
    let isolate = isolate();
    isolate
        .run_sync(|scope| {
            let global = scope.global();
            scope.set(global, "counter", Value::from(1)).unwrap();
        })
        .unwrap();
    let counter = isolate
        .run_sync(|scope| {
            let global = scope.global();
            scope.get(global, "counter").unwrap()
        })
        .unwrap();
    assert_eq!(counter, Value::from(1));
}

#[test]
fn test_dispose_rejects_later_calls() {
    let isolate = isolate();
    let id = isolate.id();
    isolate.dispose().unwrap();
    assert!(isolate.is_disposed());
    assert_eq!(isolate.run_sync(|_| ()), Err(IsolateError::Disposed(id)));
    assert_eq!(isolate.dispose(), Err(IsolateError::Disposed(id)));
    assert!(IsolateHandle::lookup(id).is_none());
}

#[test]
fn test_lookup_finds_live_isolate() {
    let isolate = isolate();
    let found = IsolateHandle::lookup(isolate.id()).unwrap();
    assert_eq!(found.id(), isolate.id());
}

#[test]
fn test_dropping_last_handle_disposes() {
    let isolate = isolate();
    let id = isolate.id();
    drop(isolate);
    assert!(IsolateHandle::lookup(id).is_none());
}

#[test]
fn test_panic_is_reported_and_isolate_survives() {
    let isolate = isolate();
    let result: Result<(), _> = isolate.run_sync(|_| panic!("boom"));
    assert_eq!(result, Err(IsolateError::TaskPanicked("boom".to_string())));
    assert_eq!(isolate.run_sync(|_| 7).unwrap(), 7);
}

#[test]
fn test_timeout_abandons_wait() {
    let isolate = isolate();
    let result = isolate.run_sync_timeout(Some(Duration::from_millis(20)), |_| {
        std::thread::sleep(Duration::from_millis(200));
    });
    assert_eq!(
        result,
        Err(IsolateError::Timeout(Duration::from_millis(20)))
    );
    // The isolate keeps working once the slow task finishes.
    assert_eq!(isolate.run_sync(|_| 1).unwrap(), 1);
}

#[test]
fn test_same_thread_blocking_call_is_rejected() {
    let isolate = isolate();
    let inner = isolate.clone();
    let result = isolate.run_sync(move |_| inner.run_sync(|_| ())).unwrap();
    assert_eq!(result, Err(IsolateError::SameThread(isolate.id())));
}

#[test]
fn test_blocking_cycle_is_detected() {
    let a = isolate();
    let b = isolate();
    let a_again = a.clone();
    let b_id = b.id();
    let a_id = a.id();
    let result = a
        .run_sync(move |_| b.run_sync(move |_| a_again.run_sync(|_| ())))
        .unwrap()
        .unwrap();
    assert_eq!(
        result,
        Err(IsolateError::Deadlock {
            from: b_id,
            to: a_id
        })
    );
}

#[test]
fn test_thread_named_after_config() {
    let isolate = IsolateHandle::new(IsolateConfig::new().with_name("worker-7")).unwrap();
    let name = isolate
        .run_sync(|_| std::thread::current().name().map(str::to_string))
        .unwrap();
    assert_eq!(name.as_deref(), Some("worker-7"));
    assert_eq!(isolate.name(), "worker-7");
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = IsolateHandle::new(IsolateConfig::new().with_max_transfer_depth(0)).unwrap_err();
    assert!(matches!(err, IsolateError::Config(_)));
}

#[tokio::test]
async fn test_run_async() {
    let isolate = isolate();
    let value = isolate
        .run_async(|scope| scope.type_of(&Value::from("x")))
        .await
        .unwrap();
    assert_eq!(value, "string");
}

#[tokio::test]
async fn test_run_async_timeout() {
    let isolate = isolate();
    let result = isolate
        .run_async_timeout(Some(Duration::from_millis(10)), |_| {
            std::thread::sleep(Duration::from_millis(100));
        })
        .await;
    assert_eq!(result, Err(IsolateError::Timeout(Duration::from_millis(10))));
}
