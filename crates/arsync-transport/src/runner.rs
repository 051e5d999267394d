//! Streaming subscription runner
//!
//! Owns one logical server-stream subscription. `start` spawns a worker that
//! opens the stream, waits for initial metadata, then hands every message to
//! a callback until the stream ends. A runner never has two workers at once:
//! `start` on a running runner does nothing.
//!
//! ```text
//! Idle --start--> Running --closed ok--> Finished --start--> Running ...
//!                    |
//!                    +--error--> Failed --start--> Running ...
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arsync_core::{ArError, ArResult};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::{BoxStream, RpcResult, RpcStatus};

/// Lifecycle of a subscription run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    Running,
    Finished,
    Failed,
}

struct Shared {
    state: watch::Sender<RunState>,
    last_status: Mutex<Option<RpcStatus>>,
    active: AtomicUsize,
}

/// Restartable runner for one server-stream subscription
pub struct StreamRunner<M> {
    name: &'static str,
    shared: Arc<Shared>,
    _message: PhantomData<fn(M)>,
}

impl<M: Send + 'static> StreamRunner<M> {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        StreamRunner {
            name,
            shared: Arc::new(Shared {
                state,
                last_status: Mutex::new(None),
                active: AtomicUsize::new(0),
            }),
            _message: PhantomData,
        }
    }

    /// Start a run unless one is in progress
    ///
    /// Returns `Ok(false)` when already running. `on_finish` runs after the
    /// runner has left `Running`, so it may call `start` again.
    pub fn start<O, Fut, F, D>(&self, open: O, mut on_message: F, on_finish: D) -> ArResult<bool>
    where
        O: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = RpcResult<BoxStream<M>>> + Send + 'static,
        F: FnMut(M) + Send + 'static,
        D: FnOnce(&RpcStatus) + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|e| ArError::NoRuntime(e.to_string()))?;

        let claimed = self.shared.state.send_if_modified(|state| {
            if *state == RunState::Running {
                false
            } else {
                *state = RunState::Running;
                true
            }
        });
        if !claimed {
            tracing::trace!(stream = self.name, "subscription already running");
            return Ok(false);
        }

        let shared = Arc::clone(&self.shared);
        let name = self.name;
        shared.active.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(stream = name, "subscription started");

        handle.spawn(async move {
            let status = run(open, &mut on_message).await;

            if status.is_ok() {
                tracing::debug!(stream = name, "subscription finished");
            } else {
                tracing::warn!(stream = name, %status, "subscription ended with error");
            }

            *shared.last_status.lock() = Some(status.clone());
            shared.state.send_replace(if status.is_ok() {
                RunState::Finished
            } else {
                RunState::Failed
            });
            shared.active.fetch_sub(1, Ordering::SeqCst);

            // The run is over here, so the hook may start the next one
            on_finish(&status);
        });

        Ok(true)
    }
}

impl<M> StreamRunner<M> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> RunState {
        *self.shared.state.borrow()
    }

    /// True unless a run is in progress
    pub fn done(&self) -> bool {
        self.state() != RunState::Running
    }

    /// Terminal status of the last completed run
    pub fn last_status(&self) -> Option<RpcStatus> {
        self.shared.last_status.lock().clone()
    }

    /// Workers still reading, never more than one
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Wait until the current run, if any, is over
    pub async fn wait_done(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state != RunState::Running).await;
    }
}

async fn run<M, O, Fut, F>(open: O, on_message: &mut F) -> RpcStatus
where
    O: FnOnce() -> Fut,
    Fut: Future<Output = RpcResult<BoxStream<M>>>,
    F: FnMut(M),
{
    let mut stream = match open().await {
        Ok(stream) => stream,
        Err(status) => return status,
    };

    if let Err(status) = stream.initial_metadata().await {
        return status;
    }

    loop {
        match stream.message().await {
            Ok(Some(message)) => on_message(message),
            Ok(None) => return RpcStatus::ok(),
            Err(status) => return status,
        }
    }
}
