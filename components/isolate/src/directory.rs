//! Process-wide isolate directory and blocking-call wait graph.
//!
//! The directory maps ids to live isolates without keeping them alive, so a
//! reference held elsewhere never prevents disposal. The wait graph records
//! which isolate thread is blocked on which; a blocking call that would close
//! a cycle is refused instead of hanging both threads.

use crate::error::{IsolateError, IsolateResult};
use crate::handle::HandleInner;
use core_types::IsolateId;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

static DIRECTORY: Lazy<RwLock<HashMap<IsolateId, Weak<HandleInner>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static WAITING_ON: Lazy<Mutex<HashMap<IsolateId, IsolateId>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn register(inner: &Arc<HandleInner>) {
    DIRECTORY.write().insert(inner.id, Arc::downgrade(inner));
}

pub(crate) fn unregister(id: IsolateId) {
    DIRECTORY.write().remove(&id);
}

pub(crate) fn lookup(id: IsolateId) -> Option<Arc<HandleInner>> {
    DIRECTORY.read().get(&id).and_then(Weak::upgrade)
}

/// Number of isolates currently registered.
pub fn live_isolates() -> usize {
    DIRECTORY
        .read()
        .values()
        .filter(|entry| entry.strong_count() > 0)
        .count()
}

/// Edge `from -> to` in the wait graph, removed on drop.
#[derive(Debug)]
pub(crate) struct WaitGuard {
    from: IsolateId,
}

impl WaitGuard {
    /// Record that `from` is about to block on `to`.
    pub(crate) fn enter(from: IsolateId, to: IsolateId) -> IsolateResult<WaitGuard> {
        let mut waits = WAITING_ON.lock();
        let mut cursor = to;
        while let Some(next) = waits.get(&cursor) {
            if *next == from {
                return Err(IsolateError::Deadlock { from, to });
            }
            cursor = *next;
        }
        if to == from {
            return Err(IsolateError::SameThread(from));
        }
        waits.insert(from, to);
        Ok(WaitGuard { from })
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        WAITING_ON.lock().remove(&self.from);
    }
}
