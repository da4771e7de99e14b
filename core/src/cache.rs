//! Single-fetch replay cache for slow-changing reference data.
//!
//! # Design
//! The first subscriber spawns the fetch on the tokio runtime and stores a
//! shared handle to it. Every later subscriber, whether it arrives while the
//! fetch is pending or long after it resolved, awaits a clone of that same
//! handle, so the underlying request is issued at most once. Because the
//! fetch runs as its own task, dropping any (or every) subscriber does not
//! abort it.
//!
//! A failed fetch is delivered to everyone waiting on it, and the fetch task
//! itself clears the slot, so the next subscriber starts over even when no
//! one was left waiting. Successful values are kept for the lifetime of the
//! cache; there is no expiry.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::ApiError;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

/// Observable state of a `ReplayCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Unrequested,
    Pending,
    Resolved,
    /// The fetch failed and the slot has not been cleared yet.
    Failed,
}

struct Slot<T> {
    /// Bumped for every fetch started, so a finished fetch only clears its
    /// own entry.
    generation: u64,
    fetch: Option<SharedFetch<T>>,
}

/// Memoizes one asynchronous fetch and replays its value to all subscribers.
pub struct ReplayCache<T> {
    name: &'static str,
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> ReplayCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `name` labels log events.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                fetch: None,
            })),
        }
    }

    /// Resolve the cached value, starting `fetch` only if no fetch is pending
    /// or resolved. Fails with `ApiError::Internal` outside a tokio runtime.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let shared = {
            let mut slot = self.slot.lock();
            match slot.fetch.as_ref() {
                Some(existing) if !matches!(existing.peek(), Some(Err(_))) => existing.clone(),
                _ => {
                    let runtime = Handle::try_current().map_err(|e| {
                        ApiError::Internal(format!("no tokio runtime to fetch {}: {e}", self.name))
                    })?;
                    slot.generation += 1;
                    debug!(cache = self.name, generation = slot.generation, "starting fetch");
                    let shared = self.spawn_fetch(&runtime, slot.generation, fetch());
                    slot.fetch = Some(shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;
        if result.is_err() {
            // Covers a fetch task that died before it could clear itself.
            let mut slot = self.slot.lock();
            if slot.fetch.as_ref().is_some_and(|current| current.ptr_eq(&shared)) {
                slot.fetch = None;
            }
        }
        result
    }

    pub fn state(&self) -> CacheState {
        match self.slot.lock().fetch.as_ref() {
            None => CacheState::Unrequested,
            Some(shared) => match shared.peek() {
                Some(Ok(_)) => CacheState::Resolved,
                Some(Err(_)) => CacheState::Failed,
                None => CacheState::Pending,
            },
        }
    }

    fn spawn_fetch<Fut>(&self, runtime: &Handle, generation: u64, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let name = self.name;
        let handle = runtime.spawn(async move {
            let result = fetch.await;
            if let Err(err) = &result {
                let mut slot = slot.lock();
                if slot.generation == generation {
                    warn!(cache = name, error = %err, "fetch failed, clearing cache");
                    slot.fetch = None;
                }
            }
            result
        });
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ApiError::Internal(format!("cached fetch did not complete: {e}"))),
            }
        }
        .boxed()
        .shared()
    }
}
