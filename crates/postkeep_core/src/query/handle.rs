//! Completion handle for queries executed off the calling thread.
//!
//! # Invariants
//! - The outcome is written exactly once.
//! - At most one callback is registered, and it runs exactly once: on the
//!   worker when registered before completion, otherwise on the registering
//!   thread.
//! - Failures are delivered to both the callback and `wait`.

use crate::repo::{RepoError, RepoResult};
use log::{debug, error};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

type Callback<T> = Box<dyn FnOnce(Result<&T, &RepoError>) + Send + 'static>;

enum CallbackSlot<T> {
    Empty,
    Waiting(Callback<T>),
    Used,
}

struct Shared<T> {
    outcome: OnceCell<RepoResult<T>>,
    callback: Mutex<CallbackSlot<T>>,
}

/// Future-like handle to a query running on a worker thread.
///
/// There is no cancellation: once spawned the query runs to completion.
pub struct QueryHandle<T> {
    name: &'static str,
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
    pub(crate) fn spawn<F>(name: &'static str, job: F) -> Self
    where
        F: FnOnce() -> RepoResult<T> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            outcome: OnceCell::new(),
            callback: Mutex::new(CallbackSlot::Empty),
        });

        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(format!("postkeep-{name}"))
            .spawn(move || {
                let started_at = Instant::now();
                let outcome = job();
                match &outcome {
                    Ok(_) => debug!(
                        "event=async_query module=query status=ok query={name} duration_ms={}",
                        started_at.elapsed().as_millis()
                    ),
                    Err(err) => error!(
                        "event=async_query module=query status=error query={name} duration_ms={} error={err}",
                        started_at.elapsed().as_millis()
                    ),
                }
                complete(&worker_shared, outcome);
            });

        let worker = match spawned {
            Ok(worker) => Some(worker),
            Err(err) => {
                complete(
                    &shared,
                    Err(RepoError::InvalidState(format!(
                        "failed to spawn query worker `{name}`: {err}"
                    ))),
                );
                None
            }
        };

        Self {
            name,
            shared,
            worker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Non-blocking completion poll.
    pub fn is_done(&self) -> bool {
        self.shared.outcome.get().is_some()
    }

    /// Returns the outcome if the query has finished.
    pub fn result(&self) -> Option<Result<&T, &RepoError>> {
        self.shared.outcome.get().map(|outcome| outcome.as_ref())
    }

    /// Registers the single completion callback.
    ///
    /// # Errors
    /// - `InvalidState` when a callback was already registered.
    pub fn on_complete<F>(&self, callback: F) -> RepoResult<()>
    where
        F: FnOnce(Result<&T, &RepoError>) + Send + 'static,
    {
        let mut slot = self
            .shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !matches!(*slot, CallbackSlot::Empty) {
            return Err(RepoError::InvalidState(format!(
                "query `{}` already has a completion callback",
                self.name
            )));
        }

        match self.shared.outcome.get() {
            Some(outcome) => {
                *slot = CallbackSlot::Used;
                drop(slot);
                callback(outcome.as_ref());
            }
            None => *slot = CallbackSlot::Waiting(Box::new(callback)),
        }
        Ok(())
    }

    /// Blocks until the query finishes and returns its outcome.
    pub fn wait(mut self) -> RepoResult<T> {
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| {
                RepoError::InvalidState(format!("query worker `{}` panicked", self.name))
            })?;
        }

        let name = self.name;
        let shared = Arc::try_unwrap(self.shared).map_err(|_| {
            RepoError::InvalidState(format!("query `{name}` is still referenced by its worker"))
        })?;
        shared
            .outcome
            .into_inner()
            .unwrap_or_else(|| Err(RepoError::InvalidState(format!("query `{name}` has no outcome"))))
    }
}

fn complete<T>(shared: &Shared<T>, outcome: RepoResult<T>) {
    if shared.outcome.set(outcome).is_err() {
        return;
    }

    let pending = {
        let mut slot = shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, CallbackSlot::Used) {
            CallbackSlot::Waiting(callback) => Some(callback),
            other => {
                *slot = other;
                None
            }
        }
    };

    if let (Some(callback), Some(outcome)) = (pending, shared.outcome.get()) {
        callback(outcome.as_ref());
    }
}
