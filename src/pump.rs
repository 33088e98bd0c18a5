//! Backend event subscription manager.
//!
//! Exactly one drain task is live at a time for the whole process. Every
//! `start` bumps a monotonic generation and aborts the previous task, and
//! each delivery re-checks its captured generation before touching state, so
//! stale deliveries from a superseded subscription are discarded instead of
//! applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::client::ClientInner;

pub(crate) struct EventPump {
    generation: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventPump {
    pub(crate) fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Subscribes to the backend and starts draining events. A previous
    /// subscription, if any, is torn down first.
    pub(crate) fn start(&self, inner: &Arc<ClientInner>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.abort_task();

        let mut receiver = inner.backend().subscribe();
        let inner = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if inner.pump().generation() != generation {
                            tracing::debug!(generation, "discarding stale event delivery");
                            break;
                        }
                        inner.handle_event(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut task = self.lock_task();
        *task = Some(handle);
    }

    /// Tears down the live subscription. Any delivery already in flight
    /// fails the generation check and is discarded.
    pub(crate) fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.abort_task();
    }

    fn abort_task(&self) {
        let mut task = self.lock_task();
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
