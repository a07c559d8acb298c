//! Unit tests for compiling with cached data

use code_cache::{
    CacheBlob, CachePolicy, CacheRejection, CacheStatus, CodeCacheConfig, CodeCacheManager,
    CompileOptions, UnitKind,
};
use core_types::ErrorKind;

const SCRIPT: &str = "var total = 0;\nfunction add(n) { total += n; return total; }\n";
const MODULE: &str = "import { helper } from './helper.js';\nexport const value = helper(1);\n";

fn produce(manager: &mut CodeCacheManager, source: &str, kind: UnitKind) -> CacheBlob {
    manager
        .compile(source, kind, CompileOptions::default().produce_cached_data())
        .unwrap()
        .cached_data
        .unwrap()
}

#[test]
fn test_no_cache_options() {
    let mut manager = CodeCacheManager::default();
    let artifact = manager
        .compile(SCRIPT, UnitKind::Script, CompileOptions::default())
        .unwrap();
    assert!(artifact.cached_data.is_none());
    assert_eq!(artifact.cached_data_rejected(), None);
    assert_eq!(artifact.status, CacheStatus::NotApplicable);
    assert!(artifact.unit.declares("add"));
}

#[test]
fn test_corrupt_cache_with_produce() {
    let mut manager = CodeCacheManager::default();
    let options = CompileOptions::default()
        .produce_cached_data()
        .with_cached_data(CacheBlob::from_bytes(b"definitely not a cache".to_vec()));
    let artifact = manager.compile(SCRIPT, UnitKind::Script, options).unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(true));
    assert!(matches!(artifact.status, CacheStatus::Rejected(CacheRejection::TooShort(_))));
    let fresh = artifact.cached_data.unwrap();
    assert!(!fresh.is_empty());

    // The fresh blob is itself usable.
    let reuse = manager
        .compile(SCRIPT, UnitKind::Script, CompileOptions::default().with_cached_data(fresh))
        .unwrap();
    assert_eq!(reuse.cached_data_rejected(), Some(false));
}

#[test]
fn test_produce_then_consume_script() {
    let mut producer = CodeCacheManager::default();
    let blob = produce(&mut producer, SCRIPT, UnitKind::Script);
    assert!(!blob.is_empty());

    let mut consumer = CodeCacheManager::default();
    let artifact = consumer
        .compile(
            SCRIPT,
            UnitKind::Script,
            CompileOptions::default().produce_cached_data().with_cached_data(blob.clone()),
        )
        .unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(false));
    // Scripts re-emit by default.
    assert_eq!(artifact.cached_data, Some(blob));
}

#[test]
fn test_module_consume_without_reemit() {
    let mut manager = CodeCacheManager::default();
    let blob = produce(&mut manager, MODULE, UnitKind::Module);
    let artifact = manager
        .compile(
            MODULE,
            UnitKind::Module,
            CompileOptions::default().produce_cached_data().with_cached_data(blob),
        )
        .unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(false));
    assert!(artifact.cached_data.is_none());
    assert_eq!(artifact.unit.dependency_specifiers, vec!["./helper.js"]);
}

#[test]
fn test_policy_controls_reemit() {
    let mut manager = CodeCacheManager::new(CodeCacheConfig::default().with_policy(CachePolicy::Always));
    let blob = produce(&mut manager, MODULE, UnitKind::Module);
    let artifact = manager
        .compile(
            MODULE,
            UnitKind::Module,
            CompileOptions::default().produce_cached_data().with_cached_data(blob),
        )
        .unwrap();
    assert!(artifact.cached_data.is_some());

    manager.set_config(CodeCacheConfig::default().with_policy(CachePolicy::Never));
    let blob = produce(&mut manager, SCRIPT, UnitKind::Script);
    let artifact = manager
        .compile(
            SCRIPT,
            UnitKind::Script,
            CompileOptions::default().produce_cached_data().with_cached_data(blob),
        )
        .unwrap();
    assert!(artifact.cached_data.is_none());
}

#[test]
fn test_blob_rejected_for_changed_source() {
    let mut manager = CodeCacheManager::default();
    let blob = produce(&mut manager, SCRIPT, UnitKind::Script);
    let artifact = manager
        .compile(
            "var total = 1;",
            UnitKind::Script,
            CompileOptions::default().with_cached_data(blob),
        )
        .unwrap();
    assert_eq!(
        artifact.status,
        CacheStatus::Rejected(CacheRejection::SourceMismatch)
    );
    assert!(artifact.unit.declares("total"));
}

#[test]
fn test_script_blob_rejected_for_module() {
    let mut manager = CodeCacheManager::default();
    let source = "const a = 1;";
    let blob = produce(&mut manager, source, UnitKind::Script);
    let artifact = manager
        .compile(source, UnitKind::Module, CompileOptions::default().with_cached_data(blob))
        .unwrap();
    assert!(matches!(
        artifact.status,
        CacheStatus::Rejected(CacheRejection::KindMismatch { .. })
    ));
}

#[test]
fn test_syntax_error_even_with_cache_requested() {
    let mut manager = CodeCacheManager::default();
    let err = manager
        .compile(
            "function broken( {",
            UnitKind::Script,
            CompileOptions::default().produce_cached_data(),
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.source_position.is_some());
}

#[test]
fn test_blob_survives_disk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.cache");

    let mut manager = CodeCacheManager::default();
    produce(&mut manager, SCRIPT, UnitKind::Script).save(&path).unwrap();

    let loaded = CacheBlob::load(&path).unwrap();
    let mut fresh_manager = CodeCacheManager::default();
    let artifact = fresh_manager
        .compile(SCRIPT, UnitKind::Script, CompileOptions::default().with_cached_data(loaded.clone()))
        .unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(false));

    let changed = fresh_manager
        .compile(
            "var total = 2;",
            UnitKind::Script,
            CompileOptions::default().with_cached_data(loaded),
        )
        .unwrap();
    assert_eq!(changed.cached_data_rejected(), Some(true));
}
