//! Isolate identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an isolate.
///
/// Identifiers are never reused within a process, so a stale id held by a
/// reference can only ever resolve to "disposed", never to a different
/// isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsolateId(u64);

impl IsolateId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = IsolateId::next();
        let b = IsolateId::next();
        assert!(b > a);
        assert_eq!(format!("{}", a), format!("isolate#{}", a.as_u64()));
    }
}
