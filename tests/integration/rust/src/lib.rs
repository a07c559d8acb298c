//! Integration test suite for the isolate transfer runtime
//!
//! Tests here drive several isolates at once and check that values,
//! references and compile caches behave the same across component
//! boundaries as they do inside one component.

use isolate::{IsolateConfig, IsolateHandle, Scope, Value, ViewKind};
use transfer::{register_buffer_prototype_in, ReferenceHandle};

/// Re-export components for test convenience
pub mod components {
    pub use code_cache;
    pub use core_types;
    pub use isolate;
    pub use transfer;
}

/// Spawn an isolate with default settings.
pub fn spawn_isolate(name: &str) -> IsolateHandle {
    IsolateHandle::new(IsolateConfig::default().with_name(name)).expect("spawn isolate")
}

/// Store `value` as a global named `name`.
pub fn set_global(scope: &mut Scope, name: &str, value: Value) {
    let global = scope.global();
    scope.set(global, name, value).expect("set global");
}

/// Define `class Buffer extends Uint8Array {}` and register it as the
/// isolate's buffer prototype. Returns the class.
pub fn install_buffer_class(scope: &mut Scope) -> Value {
    let uint8 = scope.intrinsics().view_constructor(ViewKind::Uint8);
    let class = scope.new_class("Buffer", Some(uint8)).expect("define Buffer");
    let class = Value::Object(class);
    register_buffer_prototype_in(scope, &class).expect("register Buffer");
    set_global(scope, "Buffer", class.clone());
    class
}

/// Reference to a global of `isolate`.
pub fn global_ref(isolate: &IsolateHandle, name: &'static str) -> ReferenceHandle {
    isolate
        .run_sync(move |scope| {
            let global = Value::Object(scope.global());
            let value = scope.get_value(&global, name).expect("read global");
            ReferenceHandle::new(scope, value)
        })
        .expect("create reference")
}
