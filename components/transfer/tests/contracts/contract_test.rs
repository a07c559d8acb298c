//! Contract tests for the transfer component
//!
//! These tests pin the public surface other components build on: error
//! categories, default modes and the serialized buffer format.

use isolate::{ErrorKind, IsolateConfig, IsolateId, Scope, Value};
use transfer::{
    decode_buffer, encode, encode_to_buffer, ApplyOptions, CopyOptions, IsolatedValue,
    TransferBuffer, TransferError, TransferMode, NON_ERROR_THROWN,
};

mod error_contract {
    use super::*;

    #[test]
    fn unserializable_is_a_type_error() {
        let err = TransferError::UnserializableValue("#<Object>".to_string());
        assert_eq!(err.kind(), ErrorKind::TypeError);
        assert_eq!(err.to_string(), "#<Object> could not be cloned.");
    }

    #[test]
    fn limit_exceeded_is_a_range_error() {
        assert_eq!(
            TransferError::LimitExceeded("too deep".to_string()).kind(),
            ErrorKind::RangeError
        );
    }

    #[test]
    fn lifecycle_errors_are_plain_errors() {
        assert_eq!(TransferError::ReleasedReference.kind(), ErrorKind::Error);
        assert_eq!(
            TransferError::DisposedIsolate(IsolateId::next()).kind(),
            ErrorKind::Error
        );
        assert_eq!(
            TransferError::ReleasedReference.to_string(),
            "Reference has been released"
        );
    }

    #[test]
    fn non_error_throw_message_names_error() {
        assert!(NON_ERROR_THROWN.contains("not an instance of `Error`"));
    }

    #[test]
    fn into_exception_throws_matching_kind() {
        let mut scope = Scope::new(IsolateId::next(), IsolateConfig::default());
        let thrown = TransferError::NotCallable.into_exception(&mut scope);
        assert_eq!(scope.error_kind(thrown.value()), Some(ErrorKind::TypeError));
    }
}

mod mode_contract {
    use super::*;

    #[test]
    fn transferable_is_the_default_mode() {
        assert_eq!(TransferMode::default(), TransferMode::Transferable);
    }

    #[test]
    fn apply_options_default_to_transferable_without_timeout() {
        let options = ApplyOptions::default();
        assert_eq!(options.arguments, TransferMode::Transferable);
        assert_eq!(options.result, TransferMode::Transferable);
        assert_eq!(options.timeout, None);
    }
}

mod buffer_contract {
    use super::*;

    #[test]
    fn buffer_bytes_start_with_header() {
        let buffer = TransferBuffer::from_value(&IsolatedValue::Null).unwrap();
        assert_eq!(&buffer.as_bytes()[..4], b"ISVT");
    }

    #[test]
    fn buffer_survives_raw_bytes() {
        let mut scope = Scope::new(IsolateId::next(), IsolateConfig::default());
        let obj = scope.new_object();
        scope.set(obj, "a", Value::from(1)).unwrap();
        let buffer = encode_to_buffer(&mut scope, &Value::Object(obj)).unwrap();
        let restored = TransferBuffer::from_bytes(buffer.as_bytes().to_vec()).unwrap();
        let copy = decode_buffer(&mut scope, &restored).unwrap();
        assert_eq!(scope.get_value(&copy, "a").unwrap(), Value::from(1));
    }

    #[test]
    fn foreign_bytes_are_corrupt_data() {
        assert!(matches!(
            TransferBuffer::from_bytes(b"nope".to_vec()),
            Err(TransferError::CorruptData(_))
        ));
    }
}

mod limit_contract {
    use super::*;

    #[test]
    fn depth_past_maximum_is_limit_exceeded() {
        let mut scope = Scope::new(
            IsolateId::next(),
            IsolateConfig::default().with_max_transfer_depth(1),
        );
        let outer = scope.new_object();
        let inner = scope.new_object();
        scope.set(outer, "inner", Value::Object(inner)).unwrap();
        assert!(encode(&mut scope, &Value::Object(inner)).is_ok());
        assert!(matches!(
            encode(&mut scope, &Value::Object(outer)),
            Err(TransferError::LimitExceeded(_))
        ));
    }

    #[test]
    fn copies_move_nothing_by_default() {
        let options = CopyOptions::default();
        assert!(!options.transfer_out);
        assert!(options.transfer_list.is_empty());
    }
}
