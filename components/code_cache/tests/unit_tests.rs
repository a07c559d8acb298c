//! Integration test runner for unit tests
//! This file makes cargo test discover the unit test modules

#[path = "unit/test_manager.rs"]
mod test_manager;

#[path = "unit/test_isolate_compile.rs"]
mod test_isolate_compile;
