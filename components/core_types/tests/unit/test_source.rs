//! Unit tests for source positions

use core_types::SourcePosition;

#[test]
fn test_start_position() {
    let start = SourcePosition::start();
    assert_eq!((start.line, start.column, start.offset), (1, 1, 0));
}

#[test]
fn test_default_position_is_zeroed() {
    let pos = SourcePosition::default();
    assert_eq!(pos.offset, 0);
    assert_eq!(pos.line, 0);
}
