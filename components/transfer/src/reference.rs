//! Reference handle registry.
//!
//! A [`ReferenceHandle`] names a value that stays inside its owner isolate.
//! The owner keeps the value alive in its [`ReferenceTable`] until the
//! handle is released, explicitly or by dropping its last clone; every
//! operation on the handle is routed to the owner thread, runs there, and
//! marshals its result back by the requested [`TransferMode`].
//!
//! Handles embedded in copies ([`IsolatedValue::Reference`], including the
//! serialized form inside a [`crate::TransferBuffer`]) count as clones, so a
//! reference stays valid while it is in flight.

use crate::codec;
use crate::error::TransferError;
use crate::marshal::{receive, transfer, TransferMode, Transferred};
use crate::value::IsolatedValue;
use core_types::{ErrorKind, IsolateId};
use isolate::{IsolateHandle, Scope, Value, ViewKind};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Handles with at least one live clone, by owner and id.
static LIVE_HANDLES: Lazy<Mutex<HashMap<(IsolateId, u32), Weak<ReferenceInner>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Values an isolate keeps alive on behalf of reference handles.
///
/// Lives in a scope slot of the owning isolate.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<u32, Value>,
    next_id: u32,
}

impl ReferenceTable {
    /// Retain `value` and return its id.
    pub fn insert(&mut self, value: Value) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, value);
        id
    }

    /// Retained value for `id`.
    pub fn get(&self, id: u32) -> Option<&Value> {
        self.entries.get(&id)
    }

    /// Stop retaining `id`.
    pub fn remove(&mut self, id: u32) -> Option<Value> {
        self.entries.remove(&id)
    }

    /// Number of retained values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve(scope: &Scope, id: u32) -> Result<Value, TransferError> {
    scope
        .slot::<ReferenceTable>()
        .and_then(|table| table.get(id))
        .cloned()
        .ok_or(TransferError::ReleasedReference)
}

/// Options for [`ReferenceHandle::apply_sync`] and friends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// How `this` and the arguments are passed
    pub arguments: TransferMode,
    /// How the return value comes back
    pub result: TransferMode,
    /// Give up waiting after this long
    pub timeout: Option<Duration>,
}

impl ApplyOptions {
    /// Set the argument mode.
    pub fn with_arguments(mut self, mode: TransferMode) -> Self {
        self.arguments = mode;
        self
    }

    /// Set the result mode.
    pub fn with_result(mut self, mode: TransferMode) -> Self {
        self.result = mode;
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct ReferenceInner {
    isolate: IsolateId,
    id: u32,
    type_of: String,
    released: AtomicBool,
}

impl Drop for ReferenceInner {
    fn drop(&mut self) {
        let key = (self.isolate, self.id);
        {
            let mut live = LIVE_HANDLES.lock();
            if live.get(&key).map_or(false, |weak| weak.strong_count() == 0) {
                live.remove(&key);
            }
        }
        if !*self.released.get_mut() {
            post_release(self.isolate, self.id);
            trace!(isolate = %self.isolate, reference = self.id, "last handle dropped");
        }
    }
}

/// Ask the owner to forget `id`; a no-op once the owner is gone.
fn post_release(isolate: IsolateId, id: u32) {
    let posted = IsolateHandle::lookup(isolate).map(|owner| {
        owner.post(move |scope| {
            if let Some(table) = scope.slot_mut::<ReferenceTable>() {
                table.remove(id);
            }
        })
    });
    if !matches!(posted, Some(Ok(()))) {
        trace!(reference = id, "owner disposed before release");
    }
}

#[derive(Serialize, Deserialize)]
struct ReferenceParts {
    isolate: IsolateId,
    id: u32,
    type_of: String,
}

/// Handle to a value living in another (or the same) isolate.
///
/// `Send + Sync + Clone`; clones share the released state.
#[derive(Clone)]
pub struct ReferenceHandle {
    inner: Arc<ReferenceInner>,
}

impl fmt::Debug for ReferenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceHandle")
            .field("isolate", &self.inner.isolate)
            .field("id", &self.inner.id)
            .field("type_of", &self.inner.type_of)
            .field("released", &self.is_released())
            .finish()
    }
}

impl PartialEq for ReferenceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.isolate == other.inner.isolate && self.inner.id == other.inner.id
    }
}

impl ReferenceHandle {
    /// Retain `value` in `scope`'s isolate and return a handle to it.
    pub fn new(scope: &mut Scope, value: Value) -> ReferenceHandle {
        let type_of = scope.type_of(&value).to_string();
        let id = scope
            .slot_or_insert_with(ReferenceTable::default)
            .insert(value);
        trace!(isolate = %scope.id(), reference = id, "reference created");
        let inner = Arc::new(ReferenceInner {
            isolate: scope.id(),
            id,
            type_of,
            released: AtomicBool::new(false),
        });
        LIVE_HANDLES
            .lock()
            .insert((scope.id(), id), Arc::downgrade(&inner));
        ReferenceHandle { inner }
    }

    /// Handle for serialized parts: a clone of the live handle when one
    /// exists, otherwise an already released handle.
    fn revive(parts: ReferenceParts) -> ReferenceHandle {
        let live = LIVE_HANDLES
            .lock()
            .get(&(parts.isolate, parts.id))
            .and_then(Weak::upgrade);
        match live {
            Some(inner) => ReferenceHandle { inner },
            None => ReferenceHandle {
                inner: Arc::new(ReferenceInner {
                    isolate: parts.isolate,
                    id: parts.id,
                    type_of: parts.type_of,
                    released: AtomicBool::new(true),
                }),
            },
        }
    }

    /// Owner isolate.
    pub fn isolate_id(&self) -> IsolateId {
        self.inner.isolate
    }

    /// Id within the owner's table.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// `typeof` of the target at creation time.
    pub fn type_of(&self) -> &str {
        &self.inner.type_of
    }

    /// Whether [`ReferenceHandle::release`] was called on this handle or a clone.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), TransferError> {
        if self.is_released() {
            Err(TransferError::ReleasedReference)
        } else {
            Ok(())
        }
    }

    fn is_local(&self, scope: &Scope) -> bool {
        scope.id() == self.inner.isolate
    }

    /// Leaf form for embedding in a copied tree.
    pub fn to_isolated(&self) -> Result<IsolatedValue, TransferError> {
        self.ensure_live()?;
        Ok(IsolatedValue::Reference(self.clone()))
    }

    /// Materialize in `scope`: the target itself in the owner isolate, a
    /// reference object anywhere else.
    pub fn into_value(self, scope: &mut Scope) -> Result<Value, TransferError> {
        self.ensure_live()?;
        if self.is_local(scope) {
            resolve(scope, self.inner.id)
        } else {
            Ok(Value::Object(scope.new_host_object(self)))
        }
    }

    /// The target; owner isolate only.
    pub fn deref(&self, scope: &Scope) -> Result<Value, TransferError> {
        self.ensure_live()?;
        if !self.is_local(scope) {
            return Err(TransferError::WrongIsolate {
                owner: self.inner.isolate,
                current: scope.id(),
            });
        }
        resolve(scope, self.inner.id)
    }

    fn owner(&self) -> Result<IsolateHandle, TransferError> {
        self.ensure_live()?;
        IsolateHandle::lookup(self.inner.isolate)
            .ok_or(TransferError::DisposedIsolate(self.inner.isolate))
    }

    fn run_owner_sync<R, F>(&self, timeout: Option<Duration>, op: F) -> Result<R, TransferError>
    where
        F: FnOnce(&mut Scope, Value) -> Result<R, TransferError> + Send + 'static,
        R: Send + 'static,
    {
        let owner = self.owner()?;
        let id = self.inner.id;
        let task = move |scope: &mut Scope| {
            let target = resolve(scope, id)?;
            op(scope, target)
        };
        let outcome = match timeout {
            Some(limit) => owner.run_sync_timeout(Some(limit), task),
            None => owner.run_sync(task),
        };
        outcome?
    }

    async fn run_owner_async<R, F>(&self, timeout: Option<Duration>, op: F) -> Result<R, TransferError>
    where
        F: FnOnce(&mut Scope, Value) -> Result<R, TransferError> + Send + 'static,
        R: Send + 'static,
    {
        let owner = self.owner()?;
        let id = self.inner.id;
        let task = move |scope: &mut Scope| {
            let target = resolve(scope, id)?;
            op(scope, target)
        };
        let outcome = match timeout {
            Some(limit) => owner.run_async_timeout(Some(limit), task).await,
            None => owner.run_async(task).await,
        };
        outcome?
    }

    fn run_local<R>(
        &self,
        scope: &mut Scope,
        op: impl FnOnce(&mut Scope, Value) -> Result<R, TransferError>,
    ) -> Result<R, TransferError> {
        self.ensure_live()?;
        let target = resolve(scope, self.inner.id)?;
        op(scope, target)
    }

    // ---- copy ----

    /// Deep copy of the target, made on the owner thread.
    pub fn copy_sync(&self) -> Result<IsolatedValue, TransferError> {
        self.run_owner_sync(None, |scope, target| codec::encode(scope, &target))
    }

    /// Async [`ReferenceHandle::copy_sync`].
    pub async fn copy(&self) -> Result<IsolatedValue, TransferError> {
        self.run_owner_async(None, |scope, target| codec::encode(scope, &target))
            .await
    }

    /// Deep copy of the target, materialized in `scope`.
    pub fn copy_in(&self, scope: &mut Scope) -> Result<Value, TransferError> {
        let copied = if self.is_local(scope) {
            self.run_local(scope, |scope, target| codec::encode(scope, &target))?
        } else {
            self.copy_sync()?
        };
        codec::decode(scope, &copied)
    }

    // ---- get ----

    /// `target[key]`, marshalled by `mode`.
    pub fn get_sync(&self, key: &str, mode: TransferMode) -> Result<Transferred, TransferError> {
        self.get_path_sync(&[key], mode)
    }

    /// `target[k0][k1]...`, marshalled by `mode`.
    pub fn get_path_sync(&self, keys: &[&str], mode: TransferMode) -> Result<Transferred, TransferError> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.run_owner_sync(None, move |scope, target| get_path(scope, target, &keys, mode))
    }

    /// Async [`ReferenceHandle::get_sync`].
    pub async fn get(&self, key: &str, mode: TransferMode) -> Result<Transferred, TransferError> {
        let keys = vec![key.to_string()];
        self.run_owner_async(None, move |scope, target| get_path(scope, target, &keys, mode))
            .await
    }

    /// `target[key]` received into `scope`.
    pub fn get_in(&self, scope: &mut Scope, key: &str, mode: TransferMode) -> Result<Value, TransferError> {
        if self.is_local(scope) {
            let keys = [key.to_string()];
            return self.run_local(scope, |scope, target| {
                let value = lookup_path(scope, target, &keys)?;
                pass_local(scope, &value, mode)
            });
        }
        let transferred = self.get_sync(key, mode)?;
        receive(scope, &transferred)
    }

    // ---- set ----

    /// `target[key] = value`, with `value` materialized in the owner.
    pub fn set_sync(&self, key: &str, value: Transferred) -> Result<(), TransferError> {
        let key = key.to_string();
        self.run_owner_sync(None, move |scope, target| set_property(scope, target, &key, &value))
    }

    /// Async [`ReferenceHandle::set_sync`].
    pub async fn set(&self, key: &str, value: Transferred) -> Result<(), TransferError> {
        let key = key.to_string();
        self.run_owner_async(None, move |scope, target| set_property(scope, target, &key, &value))
            .await
    }

    /// `target[key] = value` with `value` taken from `scope` by `mode`.
    pub fn set_in(
        &self,
        scope: &mut Scope,
        key: &str,
        value: &Value,
        mode: TransferMode,
    ) -> Result<(), TransferError> {
        if self.is_local(scope) {
            let value = pass_local(scope, value, mode)?;
            return self.run_local(scope, |scope, target| assign(scope, target, key, value));
        }
        let transferred = transfer(scope, value, mode)?;
        self.set_sync(key, transferred)
    }

    // ---- delete ----

    /// `delete target[key]`.
    pub fn delete_sync(&self, key: &str) -> Result<bool, TransferError> {
        let key = key.to_string();
        self.run_owner_sync(None, move |scope, target| delete_property(scope, target, &key))
    }

    /// Async [`ReferenceHandle::delete_sync`].
    pub async fn delete(&self, key: &str) -> Result<bool, TransferError> {
        let key = key.to_string();
        self.run_owner_async(None, move |scope, target| delete_property(scope, target, &key))
            .await
    }

    // ---- apply ----

    /// Call the target on its owner thread.
    ///
    /// `this` and `args` were prepared by the caller; the return value is
    /// marshalled by `options.result`. An exception thrown by the callee
    /// comes back as [`TransferError::CrossIsolateException`].
    pub fn apply_sync(
        &self,
        this: Option<Transferred>,
        args: Vec<Transferred>,
        options: ApplyOptions,
    ) -> Result<Transferred, TransferError> {
        self.run_owner_sync(options.timeout, move |scope, target| {
            apply(scope, target, this.as_ref(), &args, options.result)
        })
    }

    /// Async [`ReferenceHandle::apply_sync`].
    pub async fn apply(
        &self,
        this: Option<Transferred>,
        args: Vec<Transferred>,
        options: ApplyOptions,
    ) -> Result<Transferred, TransferError> {
        self.run_owner_async(options.timeout, move |scope, target| {
            apply(scope, target, this.as_ref(), &args, options.result)
        })
        .await
    }

    /// Call the target with `this` and `args` taken from `scope` by
    /// `options.arguments`, receiving the result into `scope`.
    pub fn apply_in(
        &self,
        scope: &mut Scope,
        this: &Value,
        args: &[Value],
        options: ApplyOptions,
    ) -> Result<Value, TransferError> {
        if self.is_local(scope) {
            let this = pass_local(scope, this, options.arguments)?;
            let args = args
                .iter()
                .map(|arg| pass_local(scope, arg, options.arguments))
                .collect::<Result<Vec<_>, _>>()?;
            return self.run_local(scope, |scope, target| {
                let result = invoke(scope, target, this, args)?;
                pass_local(scope, &result, options.result)
            });
        }
        let this = transfer(scope, this, options.arguments)?;
        let args = args
            .iter()
            .map(|arg| transfer(scope, arg, options.arguments))
            .collect::<Result<Vec<_>, _>>()?;
        let result = self.apply_sync(Some(this), args, options)?;
        receive(scope, &result)
    }

    // ---- release ----

    /// Stop retaining the target. Idempotent; later operations fail with
    /// [`TransferError::ReleasedReference`].
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        post_release(self.inner.isolate, self.inner.id);
        debug!(isolate = %self.inner.isolate, reference = self.inner.id, "reference released");
    }

    /// [`ReferenceHandle::release`] from inside `scope`; drops the entry
    /// immediately when `scope` is the owner.
    pub fn release_in(&self, scope: &mut Scope) {
        if self.is_local(scope) {
            if self.inner.released.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(table) = scope.slot_mut::<ReferenceTable>() {
                table.remove(self.inner.id);
            }
            debug!(isolate = %scope.id(), reference = self.inner.id, "reference released");
        } else {
            self.release();
        }
    }
}

impl Serialize for ReferenceHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ReferenceParts {
            isolate: self.inner.isolate,
            id: self.inner.id,
            type_of: self.inner.type_of.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReferenceHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ReferenceParts::deserialize(deserializer).map(ReferenceHandle::revive)
    }
}

/// Marshal `value` into the isolate it already lives in.
///
/// A reference would resolve straight back to `value`, so reference mode
/// hands it over without touching the reference table.
fn pass_local(scope: &mut Scope, value: &Value, mode: TransferMode) -> Result<Value, TransferError> {
    match mode {
        TransferMode::Reference => Ok(value.clone()),
        mode => {
            let transferred = transfer(scope, value, mode)?;
            receive(scope, &transferred)
        }
    }
}

fn lookup_path(scope: &mut Scope, target: Value, keys: &[String]) -> Result<Value, TransferError> {
    let mut current = target;
    for key in keys {
        current = match scope.get_value(&current, key) {
            Ok(value) => value,
            Err(exception) => return Err(TransferError::capture(scope, exception)),
        };
    }
    Ok(current)
}

fn get_path(
    scope: &mut Scope,
    target: Value,
    keys: &[String],
    mode: TransferMode,
) -> Result<Transferred, TransferError> {
    let value = lookup_path(scope, target, keys)?;
    transfer(scope, &value, mode)
}

fn assign(scope: &mut Scope, target: Value, key: &str, value: Value) -> Result<(), TransferError> {
    let Some(object) = target.as_object() else {
        return Err(TransferError::Thrown {
            kind: ErrorKind::TypeError,
            message: format!("Cannot set property '{}' on a primitive", key),
        });
    };
    scope
        .set(object, key, value)
        .map_err(|exception| TransferError::capture(scope, exception))
}

fn set_property(
    scope: &mut Scope,
    target: Value,
    key: &str,
    value: &Transferred,
) -> Result<(), TransferError> {
    let value = receive(scope, value)?;
    assign(scope, target, key, value)
}

fn delete_property(scope: &mut Scope, target: Value, key: &str) -> Result<bool, TransferError> {
    let Some(object) = target.as_object() else {
        return Ok(true);
    };
    scope
        .delete(object, key)
        .map_err(|exception| TransferError::capture(scope, exception))
}

fn invoke(scope: &mut Scope, target: Value, this: Value, args: Vec<Value>) -> Result<Value, TransferError> {
    if !scope.is_callable(&target) {
        return Err(TransferError::NotCallable);
    }
    scope
        .call(&target, this, args)
        .map_err(|exception| TransferError::capture(scope, exception))
}

fn apply(
    scope: &mut Scope,
    target: Value,
    this: Option<&Transferred>,
    args: &[Transferred],
    result_mode: TransferMode,
) -> Result<Transferred, TransferError> {
    if !scope.is_callable(&target) {
        return Err(TransferError::NotCallable);
    }
    let this = match this {
        Some(this) => receive(scope, this)?,
        None => Value::Undefined,
    };
    let args = args
        .iter()
        .map(|arg| receive(scope, arg))
        .collect::<Result<Vec<_>, _>>()?;
    let result = invoke(scope, target, this, args)?;
    transfer(scope, &result, result_mode)
}

/// Make the referenced value the owner isolate's buffer-like prototype.
///
/// The target may be a constructor (its `prototype` is used) or a prototype
/// object; either way the prototype must inherit from `Uint8Array.prototype`.
pub fn register_buffer_prototype(handle: &ReferenceHandle) -> Result<(), TransferError> {
    handle.run_owner_sync(None, |scope, target| register_buffer_prototype_in(scope, &target))
}

/// [`register_buffer_prototype`] for a value already inside `scope`.
pub fn register_buffer_prototype_in(scope: &mut Scope, value: &Value) -> Result<(), TransferError> {
    let not_buffer = || TransferError::Thrown {
        kind: ErrorKind::TypeError,
        message: "Buffer prototype must inherit from Uint8Array.prototype".to_string(),
    };
    let Some(id) = value.as_object() else {
        return Err(not_buffer());
    };
    let prototype = if scope.is_callable(value) {
        match scope.get(id, "prototype") {
            Ok(Value::Object(prototype)) => prototype,
            Ok(_) => return Err(not_buffer()),
            Err(exception) => return Err(TransferError::from_exception(scope, exception)),
        }
    } else {
        id
    };
    let uint8 = scope.intrinsics().view_prototype(ViewKind::Uint8);
    if prototype != uint8 && !scope.has_in_prototype_chain(prototype, uint8) {
        return Err(not_buffer());
    }
    scope.set_buffer_prototype(Some(prototype));
    debug!(isolate = %scope.id(), "buffer prototype registered");
    Ok(())
}

/// Transfer entry points added to [`IsolateHandle`].
pub trait IsolateTransferExt {
    /// Reference to the isolate's global object.
    fn global_reference(&self) -> Result<ReferenceHandle, TransferError>;
}

impl IsolateTransferExt for IsolateHandle {
    fn global_reference(&self) -> Result<ReferenceHandle, TransferError> {
        Ok(self.run_sync(|scope| {
            let global = Value::Object(scope.global());
            ReferenceHandle::new(scope, global)
        })?)
    }
}
