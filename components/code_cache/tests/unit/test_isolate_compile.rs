//! Unit tests for compiling through an isolate handle

use code_cache::{
    code_cache, CachePolicy, CodeCacheConfig, CompileError, CompileOptions, IsolateCompileExt,
};
use core_types::ErrorKind;
use isolate::{IsolateConfig, IsolateError, IsolateHandle};

fn isolate() -> IsolateHandle {
    IsolateHandle::new(IsolateConfig::default()).unwrap()
}

#[test]
fn test_compile_script_sync_produces_blob() {
    let isolate = isolate();
    let artifact = isolate
        .compile_script_sync("let a = 1;", CompileOptions::default().produce_cached_data())
        .unwrap();
    assert!(artifact.cached_data.is_some());
    assert_eq!(artifact.cached_data_rejected(), None);
}

#[test]
fn test_manager_lives_in_the_isolate() {
    let isolate = isolate();
    isolate
        .compile_script_sync("1", CompileOptions::default())
        .unwrap();
    let cached = isolate
        .run_sync(|scope| code_cache(scope).cached_sources())
        .unwrap();
    assert_eq!(cached, 1);
}

#[test]
fn test_configure_code_cache() {
    let isolate = isolate();
    isolate
        .configure_code_cache(CodeCacheConfig::default().with_policy(CachePolicy::Always))
        .unwrap();
    let source = "export default 1;";
    let blob = isolate
        .compile_module_sync(source, CompileOptions::default().produce_cached_data())
        .unwrap()
        .cached_data
        .unwrap();
    let artifact = isolate
        .compile_module_sync(
            source,
            CompileOptions::default().produce_cached_data().with_cached_data(blob),
        )
        .unwrap();
    assert_eq!(artifact.cached_data_rejected(), Some(false));
    assert!(artifact.cached_data.is_some());
}

#[test]
fn test_syntax_error_through_isolate() {
    let isolate = isolate();
    match isolate.compile_script_sync("export const a = 1;", CompileOptions::default()) {
        Err(CompileError::Syntax(err)) => assert_eq!(err.kind, ErrorKind::SyntaxError),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_compile_on_disposed_isolate() {
    let isolate = isolate();
    isolate.dispose().unwrap();
    assert!(matches!(
        isolate.compile_script_sync("1", CompileOptions::default()),
        Err(CompileError::Isolate(IsolateError::Disposed(_)))
    ));
}

#[tokio::test]
async fn test_compile_module_async() {
    let isolate = isolate();
    let artifact = isolate
        .compile_module("import x from 'dep';\nexport { x };", CompileOptions::default())
        .await
        .unwrap();
    assert_eq!(artifact.unit.dependency_specifiers, vec!["dep"]);
    assert_eq!(artifact.unit.exports, vec!["x"]);
}
