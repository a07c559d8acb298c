//! Transfer error types.

use crate::codec;
use crate::value::IsolatedValue;
use core_types::{ErrorKind, IsolateId};
use isolate::{Exception, IsolateError, ObjectId, Scope, Value};
use std::time::Duration;
use thiserror::Error;

/// Message used when a thrown value is an object but not an error.
pub const NON_ERROR_THROWN: &str =
    "An object was thrown from supplied code within the isolate, but that object was not an instance of `Error`.";

/// Errors raised while moving values or invoking functions across isolates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    /// The value (or something nested in it) has no copyable form
    #[error("{0} could not be cloned.")]
    UnserializableValue(String),

    /// Transferable mode was given something that needs copy or reference
    #[error("A non-transferable value was passed")]
    NonTransferable,

    /// The isolate owning a reference is gone
    #[error("Isolate is disposed ({0})")]
    DisposedIsolate(IsolateId),

    /// The reference was released
    #[error("Reference has been released")]
    ReleasedReference,

    /// Owner-only operation attempted from another isolate
    #[error("Cannot dereference this from current isolate (owner {owner}, current {current})")]
    WrongIsolate {
        /// Isolate that owns the reference
        owner: IsolateId,
        /// Isolate the call came from
        current: IsolateId,
    },

    /// Code running in another isolate threw
    #[error("{message}")]
    CrossIsolateException {
        /// Isolate the exception was raised in
        isolate: IsolateId,
        /// Error category of the thrown value
        kind: ErrorKind,
        /// Rendered thrown value
        message: String,
        /// Copy of the thrown value
        value: Box<IsolatedValue>,
    },

    /// Apply on something that is not a function
    #[error("Reference is not a function")]
    NotCallable,

    /// Depth or size limit hit while copying
    #[error("{0}")]
    LimitExceeded(String),

    /// Malformed serialized data
    #[error("Corrupt transfer data: {0}")]
    CorruptData(String),

    /// An isolate raised an exception while building or reading a value
    #[error("{}: {message}", kind.name())]
    Thrown {
        /// Error category
        kind: ErrorKind,
        /// Error message
        message: String,
    },

    /// Caller gave up waiting
    #[error("Operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Blocking call would close a wait cycle
    #[error("Deadlock detected: {from} is waiting for {to}")]
    Deadlock {
        /// Isolate issuing the call
        from: IsolateId,
        /// Isolate being called
        to: IsolateId,
    },

    /// Other isolate failure
    #[error(transparent)]
    Isolate(IsolateError),
}

impl From<IsolateError> for TransferError {
    fn from(err: IsolateError) -> Self {
        match err {
            IsolateError::Disposed(id) => TransferError::DisposedIsolate(id),
            IsolateError::Timeout(limit) => TransferError::Timeout(limit),
            IsolateError::Deadlock { from, to } => TransferError::Deadlock { from, to },
            other => TransferError::Isolate(other),
        }
    }
}

impl TransferError {
    /// JavaScript error category this failure surfaces as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::UnserializableValue(_)
            | TransferError::NonTransferable
            | TransferError::WrongIsolate { .. }
            | TransferError::NotCallable
            | TransferError::CorruptData(_) => ErrorKind::TypeError,
            TransferError::LimitExceeded(_) => ErrorKind::RangeError,
            TransferError::CrossIsolateException { kind, .. } | TransferError::Thrown { kind, .. } => {
                *kind
            }
            TransferError::DisposedIsolate(_)
            | TransferError::ReleasedReference
            | TransferError::Timeout(_)
            | TransferError::Deadlock { .. }
            | TransferError::Isolate(_) => ErrorKind::Error,
        }
    }

    /// Build the exception to throw inside a caller isolate.
    ///
    /// Exceptions that came from another isolate are rethrown as a copy of
    /// the original thrown value; everything else becomes an error of
    /// [`TransferError::kind`].
    pub fn into_exception(self, scope: &mut Scope) -> Exception {
        match self {
            TransferError::CrossIsolateException { value, kind, message, .. } => {
                match codec::decode(scope, &value) {
                    Ok(thrown) => Exception(thrown),
                    Err(_) => scope.throw_error(kind, message),
                }
            }
            TransferError::Thrown { kind, message } => scope.throw_error(kind, message),
            other => {
                let kind = other.kind();
                scope.throw_error(kind, other.to_string())
            }
        }
    }

    /// Convert an exception raised in `scope` while it was building or
    /// reading a value.
    pub fn from_exception(scope: &mut Scope, exception: Exception) -> Self {
        let thrown = exception.into_value();
        let copy = thrown_copy(scope, &thrown);
        let (kind, message) = describe_thrown(scope, &thrown, &copy);
        TransferError::Thrown { kind, message }
    }

    /// Capture an exception thrown by code in `scope` so it can travel to
    /// another isolate.
    ///
    /// Objects that look like errors (a built-in error constructor, or a
    /// `message` or `stack` property) travel as error copies; any other
    /// object is replaced by an error saying so.
    pub fn capture(scope: &mut Scope, exception: Exception) -> Self {
        let thrown = exception.into_value();
        let value = thrown_copy(scope, &thrown);
        let (kind, message) = describe_thrown(scope, &thrown, &value);
        TransferError::CrossIsolateException {
            isolate: scope.id(),
            kind,
            message,
            value: Box::new(value),
        }
    }
}

fn non_error_value() -> IsolatedValue {
    IsolatedValue::Error {
        kind: ErrorKind::Error,
        name: "Error".to_string(),
        message: NON_ERROR_THROWN.to_string(),
        stack: None,
    }
}

fn thrown_copy(scope: &mut Scope, thrown: &Value) -> IsolatedValue {
    if thrown.is_primitive() {
        return codec::encode(scope, thrown).unwrap_or_else(|_| non_error_value());
    }
    error_like(scope, thrown).unwrap_or_else(non_error_value)
}

fn error_like(scope: &mut Scope, thrown: &Value) -> Option<IsolatedValue> {
    let id = thrown.as_object()?;
    let constructor = scope.constructor_name(thrown).unwrap_or_default();
    let kind = match ErrorKind::from_name(&constructor) {
        kind @ (ErrorKind::Error
        | ErrorKind::RangeError
        | ErrorKind::ReferenceError
        | ErrorKind::SyntaxError
        | ErrorKind::TypeError) => kind,
        _ => ErrorKind::CustomError,
    };
    let message = string_property(scope, id, "message");
    let stack = string_property(scope, id, "stack");
    if kind == ErrorKind::CustomError && message.is_none() && stack.is_none() {
        return None;
    }
    let name = match kind {
        ErrorKind::CustomError => string_property(scope, id, "name").unwrap_or_default(),
        kind => kind.name().to_string(),
    };
    Some(IsolatedValue::Error {
        kind,
        name,
        message: message.unwrap_or_default(),
        stack,
    })
}

/// `object[key]` as a string; `None` when undefined or when reading throws.
fn string_property(scope: &mut Scope, id: ObjectId, key: &str) -> Option<String> {
    match scope.get(id, key).ok()? {
        Value::Undefined => None,
        value => scope.to_string(&value).ok(),
    }
}

fn describe_thrown(scope: &Scope, thrown: &Value, copy: &IsolatedValue) -> (ErrorKind, String) {
    match copy {
        IsolatedValue::Error {
            kind,
            name,
            message,
            ..
        } => {
            let text = match (name.is_empty(), message.is_empty()) {
                (true, _) => message.clone(),
                (false, true) => name.clone(),
                (false, false) => format!("{}: {}", name, message),
            };
            (*kind, text)
        }
        _ => (ErrorKind::Error, scope.display(thrown)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isolate::{IsolateConfig, IsolateId};

    fn scope() -> Scope {
        Scope::new(IsolateId::next(), IsolateConfig::default())
    }

    fn captured(scope: &mut Scope, thrown: Value) -> (ErrorKind, String, IsolatedValue) {
        match TransferError::capture(scope, Exception(thrown)) {
            TransferError::CrossIsolateException {
                kind,
                message,
                value,
                ..
            } => (kind, message, *value),
            other => panic!("unexpected capture: {:?}", other),
        }
    }

    #[test]
    fn test_object_with_message_keeps_it() {
        let mut scope = scope();
        let thrown = scope.new_object();
        scope.set(thrown, "message", Value::from("x")).unwrap();
        let (kind, message, value) = captured(&mut scope, Value::Object(thrown));
        assert_eq!(kind, ErrorKind::CustomError);
        assert_eq!(message, "x");
        assert_eq!(
            value,
            IsolatedValue::Error {
                kind: ErrorKind::CustomError,
                name: String::new(),
                message: "x".to_string(),
                stack: None,
            }
        );
    }

    #[test]
    fn test_custom_name_travels_with_message() {
        let mut scope = scope();
        let thrown = scope.new_object();
        scope.set(thrown, "name", Value::from("QuotaError")).unwrap();
        scope.set(thrown, "message", Value::from("too many")).unwrap();
        scope.set(thrown, "stack", Value::from("at quota")).unwrap();
        let (_, message, value) = captured(&mut scope, Value::Object(thrown));
        assert_eq!(message, "QuotaError: too many");
        let IsolatedValue::Error { name, stack, .. } = value else {
            panic!("expected an error copy");
        };
        assert_eq!(name, "QuotaError");
        assert_eq!(stack.as_deref(), Some("at quota"));
    }

    #[test]
    fn test_builtin_error_keeps_kind_and_message() {
        let mut scope = scope();
        let thrown = scope.new_error(ErrorKind::RangeError, "too far");
        let (kind, message, value) = captured(&mut scope, Value::Object(thrown));
        assert_eq!(kind, ErrorKind::RangeError);
        assert_eq!(message, "RangeError: too far");
        assert!(matches!(
            value,
            IsolatedValue::Error { kind: ErrorKind::RangeError, ref message, .. } if message == "too far"
        ));
    }

    #[test]
    fn test_plain_object_is_non_error() {
        let mut scope = scope();
        let thrown = scope.new_object();
        scope.set(thrown, "code", Value::from(7)).unwrap();
        let (kind, message, value) = captured(&mut scope, Value::Object(thrown));
        assert_eq!(kind, ErrorKind::Error);
        assert_eq!(message, format!("Error: {}", NON_ERROR_THROWN));
        assert_eq!(value, non_error_value());
    }

    #[test]
    fn test_primitive_is_copied_as_is() {
        let mut scope = scope();
        let (kind, message, value) = captured(&mut scope, Value::from("plain"));
        assert_eq!(kind, ErrorKind::Error);
        assert_eq!(message, "plain");
        assert_eq!(value, IsolatedValue::from("plain"));
    }
}
