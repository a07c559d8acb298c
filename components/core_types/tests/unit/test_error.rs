//! Unit tests for JsError and ErrorKind

use core_types::{ErrorKind, JsError, SourcePosition, StackFrame};

#[test]
fn test_custom_names_classify_as_custom() {
    assert_eq!(ErrorKind::from_name("ValidationError"), ErrorKind::CustomError);
    assert_eq!(ErrorKind::CustomError.name(), "Error");
}

#[test]
fn test_syntax_error_carries_position() {
    let pos = SourcePosition {
        line: 3,
        column: 7,
        offset: 42,
    };
    let error = JsError::syntax("Unexpected token", pos);
    assert_eq!(error.kind, ErrorKind::SyntaxError);
    assert_eq!(error.source_position, Some(pos));
}

#[test]
fn test_stack_string_lists_frames() {
    let mut error = JsError::new(ErrorKind::TypeError, "boom");
    error.stack.push(StackFrame {
        function_name: Some("identity".to_string()),
        source_url: Some("sandbox.js".to_string()),
        line: 1,
        column: 20,
    });
    assert_eq!(
        error.stack_string(),
        "TypeError: boom\n    at identity (sandbox.js:1:20)"
    );
}

#[test]
fn test_js_error_is_serializable() {
    let error = JsError::new(ErrorKind::URIError, "bad escape");
    let bytes = bincode::serialize(&error).unwrap();
    let restored: JsError = bincode::deserialize(&bytes).unwrap();
    assert_eq!(restored, error);
}
