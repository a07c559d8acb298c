//! Compile cache integration tests
//!
//! Blobs produced in one isolate are consumed in another, including after
//! a trip through the file system.

use code_cache::{CacheBlob, CompileOptions, IsolateCompileExt};
use integration_tests::spawn_isolate;

const SCRIPT: &str = "const greeting = 'hi';\nfunction greet(name) { return greeting + ' ' + name; }\n";
const MODULE: &str = "import { log } from 'console-lite';\nexport function run() { log('run'); }\n";

#[test]
fn test_tri_state_across_isolates() {
    let producer = spawn_isolate("producer");
    let consumer = spawn_isolate("consumer");

    let plain = producer
        .compile_script_sync(SCRIPT, CompileOptions::default())
        .unwrap();
    assert_eq!(plain.cached_data_rejected(), None);
    assert!(plain.cached_data.is_none());

    let produced = producer
        .compile_script_sync(SCRIPT, CompileOptions::default().produce_cached_data())
        .unwrap();
    let blob = produced.cached_data.clone().unwrap();
    assert!(!blob.is_empty());
    assert_eq!(produced.cached_data_rejected(), None);

    let consumed = consumer
        .compile_script_sync(SCRIPT, CompileOptions::default().with_cached_data(blob))
        .unwrap();
    assert_eq!(consumed.cached_data_rejected(), Some(false));
    assert_eq!(consumed.unit, produced.unit);

    let corrupt = consumer
        .compile_script_sync(
            SCRIPT,
            CompileOptions::default()
                .produce_cached_data()
                .with_cached_data(CacheBlob::from_bytes(vec![0u8; 512])),
        )
        .unwrap();
    assert_eq!(corrupt.cached_data_rejected(), Some(true));
    assert!(corrupt.cached_data.is_some_and(|b| !b.is_empty()));
}

#[test]
fn test_module_blob_not_reemitted() {
    let producer = spawn_isolate("producer");
    let consumer = spawn_isolate("consumer");
    let blob = producer
        .compile_module_sync(MODULE, CompileOptions::default().produce_cached_data())
        .unwrap()
        .cached_data
        .unwrap();
    let consumed = consumer
        .compile_module_sync(
            MODULE,
            CompileOptions::default().produce_cached_data().with_cached_data(blob),
        )
        .unwrap();
    assert_eq!(consumed.cached_data_rejected(), Some(false));
    assert!(consumed.cached_data.is_none());
    assert_eq!(consumed.unit.dependency_specifiers, vec!["console-lite"]);
    assert_eq!(consumed.unit.exports, vec!["run"]);
}

#[test]
fn test_blob_from_disk_rejected_after_edit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greet.jsc");
    let isolate = spawn_isolate("disk");
    isolate
        .compile_script_sync(SCRIPT, CompileOptions::default().produce_cached_data())
        .unwrap()
        .cached_data
        .unwrap()
        .save(&path)
        .unwrap();

    let edited = SCRIPT.replace("hi", "hello");
    let other = spawn_isolate("other");
    let artifact = other
        .compile_script_sync(
            edited,
            CompileOptions::default()
                .with_cached_data(CacheBlob::load(&path).unwrap())
                .with_filename("greet.js"),
        )
        .unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(true));
    assert!(artifact.unit.declares("greet"));
}

#[tokio::test]
async fn test_async_compile_consumes_blob() {
    let isolate = spawn_isolate("async");
    let blob = isolate
        .compile_script(SCRIPT, CompileOptions::default().produce_cached_data())
        .await
        .unwrap()
        .cached_data
        .unwrap();
    let artifact = isolate
        .compile_script(SCRIPT, CompileOptions::default().with_cached_data(blob))
        .await
        .unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(false));
}
