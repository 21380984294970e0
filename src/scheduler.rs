use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Duration;

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Runs the most recently scheduled task once `delay` has passed without a
/// newer schedule call. Tasks are spawned on the runtime current at
/// construction, or on the caller's runtime when there was none.
#[derive(Clone, Default)]
pub struct Debouncer {
    pending: Arc<Mutex<Option<PendingTask>>>,
    generation: Arc<AtomicU64>,
    runtime: Option<Handle>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
            ..Self::default()
        }
    }

    /// Returns `false` without scheduling anything when no tokio runtime is
    /// reachable.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            self.cancel();
            return false;
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = self.pending.clone();

        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            previous.handle.abort();
        }

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut slot = pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match slot.as_ref() {
                    Some(entry) if entry.generation == generation => {
                        slot.take();
                        true
                    }
                    _ => false,
                }
            };
            if current {
                task.await;
            }
        });

        *slot = Some(PendingTask { generation, handle });
        true
    }

    /// Drops the pending task, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingTask>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
