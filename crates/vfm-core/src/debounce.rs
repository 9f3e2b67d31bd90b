//! Debounced recomputation for parameter sliders.
//!
//! A burst of parameter changes collapses into one recompute after a quiet
//! period, run on a single worker thread, so two recomputes never overlap.
//! Results are swapped in whole; readers hold an `Arc` snapshot and never
//! see a half-updated map.
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::vfm::{update_vfm, VfmParams, VfmResult};

/// Quiet period before a parameter change is applied.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Runs a callback with the latest triggered value once triggers have been
/// quiet for the configured period. Dropping it discards any pending value
/// and waits for a running callback to finish.
pub struct Debouncer<T: Send + 'static> {
    tx: Option<Sender<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(quiet: Duration, mut callback: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>();
        let worker = thread::spawn(move || {
            while let Ok(mut pending) = rx.recv() {
                loop {
                    match rx.recv_timeout(quiet) {
                        Ok(newer) => pending = newer,
                        Err(RecvTimeoutError::Timeout) => {
                            callback(pending);
                            break;
                        }
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Replace the pending value and restart the quiet period.
    pub fn trigger(&self, value: T) {
        if let Some(tx) = &self.tx {
            // Only fails once the worker is gone, i.e. during drop.
            let _ = tx.send(value);
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::debug!("debounce worker panicked");
            }
        }
    }
}

/// Swap `next` in only if `base`, the map it was computed from, is still
/// current. A [`LiveVfm::replace`] in the meantime wins.
fn commit(current: &RwLock<Arc<VfmResult>>, base: &Arc<VfmResult>, next: VfmResult) -> bool {
    let mut guard = current.write().unwrap_or_else(PoisonError::into_inner);
    if !Arc::ptr_eq(&*guard, base) {
        return false;
    }
    *guard = Arc::new(next);
    true
}

/// The current map plus a debounced path for parameter changes.
pub struct LiveVfm {
    current: Arc<RwLock<Arc<VfmResult>>>,
    debouncer: Debouncer<VfmParams>,
}

impl LiveVfm {
    pub fn new(initial: VfmResult) -> Self {
        Self::with_quiet_period(initial, DEFAULT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(initial: VfmResult, quiet: Duration) -> Self {
        let current = Arc::new(RwLock::new(Arc::new(initial)));
        let shared = Arc::clone(&current);
        let debouncer = Debouncer::new(quiet, move |params: VfmParams| {
            let base = Arc::clone(&shared.read().unwrap_or_else(PoisonError::into_inner));
            let next = update_vfm(&base.features, &params);
            if commit(&shared, &base, next) {
                tracing::trace!("live vfm updated");
            } else {
                tracing::debug!("map replaced during recompute, dropping stale result");
            }
        });
        Self { current, debouncer }
    }

    /// Schedule a redistribution with `params`.
    pub fn set_params(&self, params: VfmParams) {
        self.debouncer.trigger(params);
    }

    /// Swap in a fully rebuilt map (new grid or new humus data).
    pub fn replace(&self, result: VfmResult) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(result);
    }

    pub fn snapshot(&self) -> Arc<VfmResult> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }
}
