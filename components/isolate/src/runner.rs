//! Isolate thread.
//!
//! Every isolate lives on its own OS thread. The thread owns the [`Scope`]
//! and executes [`IsolateCommand`]s sequentially until it is told to stop or
//! every sender is gone.

use crate::config::IsolateConfig;
use crate::error::{IsolateError, IsolateResult};
use crate::scope::Scope;
use core_types::IsolateId;
use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Unit of work executed on the isolate thread.
pub type Task = Box<dyn FnOnce(&mut Scope) + Send + 'static>;

/// Commands sent to an isolate thread.
pub enum IsolateCommand {
    /// Run a task against the scope
    Run(Task),
    /// Drop the scope and exit the thread
    Dispose,
}

thread_local! {
    static CURRENT_ISOLATE: Cell<Option<IsolateId>> = const { Cell::new(None) };
}

/// Isolate whose thread is the calling thread, if any.
pub fn current_isolate() -> Option<IsolateId> {
    CURRENT_ISOLATE.with(Cell::get)
}

/// Render a panic payload for logs and errors.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Start the thread for isolate `id`.
///
/// The thread is detached: it exits on its own once it receives
/// [`IsolateCommand::Dispose`] or the last sender is dropped.
pub fn spawn_isolate_thread(
    id: IsolateId,
    config: IsolateConfig,
) -> IsolateResult<mpsc::UnboundedSender<IsolateCommand>> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<IsolateCommand>();
    let thread_name = config
        .name
        .clone()
        .unwrap_or_else(|| format!("isolate-{}", id.as_u64()));

    std::thread::Builder::new()
        .name(thread_name)
        .stack_size(config.stack_size)
        .spawn(move || run(id, config, cmd_rx))
        .map_err(|e| IsolateError::Spawn(e.to_string()))?;

    Ok(cmd_tx)
}

fn run(id: IsolateId, config: IsolateConfig, mut commands: mpsc::UnboundedReceiver<IsolateCommand>) {
    CURRENT_ISOLATE.with(|current| current.set(Some(id)));
    let mut scope = Scope::new(id, config);
    debug!(isolate = %id, "isolate thread started");

    while let Some(command) = commands.blocking_recv() {
        match command {
            IsolateCommand::Run(task) => {
                trace!(isolate = %id, "running task");
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task(&mut scope))) {
                    error!(
                        isolate = %id,
                        panic = %panic_message(payload.as_ref()),
                        "isolate task panicked"
                    );
                }
            }
            IsolateCommand::Dispose => break,
        }
    }

    commands.close();
    drop(scope);
    CURRENT_ISOLATE.with(|current| current.set(None));
    debug!(isolate = %id, "isolate thread stopped");
}
