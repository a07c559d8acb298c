//! Thread-safe handle to an isolate.

use crate::config::IsolateConfig;
use crate::directory::{self, WaitGuard};
use crate::error::{IsolateError, IsolateResult};
use crate::runner::{current_isolate, panic_message, spawn_isolate_thread, IsolateCommand, Task};
use crate::scope::Scope;
use core_types::IsolateId;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc as async_mpsc;
use tokio::sync::oneshot;
use tracing::{debug, error};

pub(crate) struct HandleInner {
    pub(crate) id: IsolateId,
    name: String,
    default_timeout: Option<Duration>,
    tx: async_mpsc::UnboundedSender<IsolateCommand>,
    disposed: AtomicBool,
}

impl HandleInner {
    /// Flip the disposed flag; only the first caller tears the isolate down.
    fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        directory::unregister(self.id);
        let _ = self.tx.send(IsolateCommand::Dispose);
        debug!(isolate = %self.id, name = %self.name, "isolate disposed");
        true
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Cloneable, `Send + Sync` handle to an isolate.
///
/// All clones share one isolate; dropping the last clone disposes it. Work is
/// submitted as closures that receive the isolate's [`Scope`] on the isolate
/// thread. Results travel back to the caller, so they must be `Send` and may
/// not contain [`crate::Value`]s of that isolate unless the caller only uses
/// them inside it again.
#[derive(Clone)]
pub struct IsolateHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for IsolateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl IsolateHandle {
    /// Create an isolate and start its thread.
    pub fn new(config: IsolateConfig) -> IsolateResult<Self> {
        config.validate()?;
        let id = IsolateId::next();
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("isolate-{}", id.as_u64()));
        let default_timeout = config.default_timeout();
        let tx = spawn_isolate_thread(id, config)?;
        let inner = Arc::new(HandleInner {
            id,
            name,
            default_timeout,
            tx,
            disposed: AtomicBool::new(false),
        });
        directory::register(&inner);
        debug!(isolate = %id, name = %inner.name, "isolate created");
        Ok(IsolateHandle { inner })
    }

    /// Find a live isolate by id.
    pub fn lookup(id: IsolateId) -> Option<IsolateHandle> {
        directory::lookup(id)
            .filter(|inner| !inner.disposed.load(Ordering::Acquire))
            .map(|inner| IsolateHandle { inner })
    }

    /// Isolate identity.
    pub fn id(&self) -> IsolateId {
        self.inner.id
    }

    /// Isolate name (thread name).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether [`IsolateHandle::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Tear the isolate down. Tasks already queued still run; later calls fail.
    pub fn dispose(&self) -> IsolateResult<()> {
        if self.inner.dispose() {
            Ok(())
        } else {
            Err(IsolateError::Disposed(self.id()))
        }
    }

    fn enqueue(&self, task: Task) -> IsolateResult<()> {
        if self.is_disposed() {
            return Err(IsolateError::Disposed(self.id()));
        }
        self.inner
            .tx
            .send(IsolateCommand::Run(task))
            .map_err(|_| IsolateError::Disposed(self.id()))
    }

    /// Queue `task` without waiting for it.
    pub fn post<F>(&self, task: F) -> IsolateResult<()>
    where
        F: FnOnce(&mut Scope) + Send + 'static,
    {
        self.enqueue(Box::new(task))
    }

    /// Run `task` on the isolate thread and wait for its result, honouring
    /// the configured default timeout.
    pub fn run_sync<F, R>(&self, task: F) -> IsolateResult<R>
    where
        F: FnOnce(&mut Scope) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run_sync_timeout(self.inner.default_timeout, task)
    }

    /// Like [`IsolateHandle::run_sync`] with an explicit timeout.
    ///
    /// On timeout the task is not cancelled; its result is discarded when it
    /// eventually completes.
    pub fn run_sync_timeout<F, R>(&self, timeout: Option<Duration>, task: F) -> IsolateResult<R>
    where
        F: FnOnce(&mut Scope) -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = self.id();
        let caller = current_isolate();
        if caller == Some(target) {
            return Err(IsolateError::SameThread(target));
        }
        let _wait = match caller {
            Some(from) => Some(WaitGuard::enter(from, target)?),
            None => None,
        };

        let (result_tx, result_rx) = mpsc::channel();
        self.enqueue(Box::new(move |scope: &mut Scope| {
            let _ = result_tx.send(run_guarded(scope, task));
        }))?;

        let received = match timeout {
            Some(limit) => result_rx.recv_timeout(limit).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => IsolateError::Timeout(limit),
                mpsc::RecvTimeoutError::Disconnected => IsolateError::Disposed(target),
            }),
            None => result_rx
                .recv()
                .map_err(|_| IsolateError::Disposed(target)),
        };
        received?
    }

    /// Run `task` on the isolate thread and await its result.
    pub async fn run_async<F, R>(&self, task: F) -> IsolateResult<R>
    where
        F: FnOnce(&mut Scope) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run_async_timeout(self.inner.default_timeout, task).await
    }

    /// Like [`IsolateHandle::run_async`] with an explicit timeout.
    pub async fn run_async_timeout<F, R>(
        &self,
        timeout: Option<Duration>,
        task: F,
    ) -> IsolateResult<R>
    where
        F: FnOnce(&mut Scope) -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = self.id();
        let (result_tx, result_rx) = oneshot::channel();
        self.enqueue(Box::new(move |scope: &mut Scope| {
            let _ = result_tx.send(run_guarded(scope, task));
        }))?;

        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, result_rx)
                .await
                .map_err(|_| IsolateError::Timeout(limit))?,
            None => result_rx.await,
        };
        received.map_err(|_| IsolateError::Disposed(target))?
    }
}

fn run_guarded<F, R>(scope: &mut Scope, task: F) -> IsolateResult<R>
where
    F: FnOnce(&mut Scope) -> R,
{
    let id = scope.id();
    catch_unwind(AssertUnwindSafe(|| task(scope))).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!(isolate = %id, panic = %message, "isolate task panicked");
        IsolateError::TaskPanicked(message)
    })
}
