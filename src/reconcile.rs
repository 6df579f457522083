//! Reconciliation of ServiceImport events into the membership index.
//!
//! Events only name a ServiceImport; whether it was created or deleted is
//! decided by looking it up:
//!
//! ```text
//! lookup(key) ─┬─ found         → index.add(identity)
//!              ├─ not found     → index.remove(identity)   (absent: logged only)
//!              └─ other failure → no mutation, key redelivered by the queue
//! ```
//!
//! Both mutations are idempotent, so duplicate or reordered deliveries converge
//! on the true external state.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{LookupError, ReconcileError};
use crate::identity::ServiceKey;
use crate::index::MembershipIndex;
use crate::kubernetes::ServiceImport;
use crate::metrics::{self, ReconcileOutcome};

/// Delay before an inconclusive request is delivered again.
pub const REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// Source of truth for ServiceImport existence.
#[async_trait]
pub trait ServiceImportLookup: Send + Sync {
    /// Fetch a ServiceImport. [`LookupError::NotFound`] means it is confirmed
    /// absent; any other error is inconclusive.
    async fn get(&self, key: &ServiceKey) -> Result<ServiceImport, LookupError>;
}

#[async_trait]
impl<T: ServiceImportLookup + ?Sized> ServiceImportLookup for Arc<T> {
    async fn get(&self, key: &ServiceKey) -> Result<ServiceImport, LookupError> {
        (**self).get(key).await
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Keys waiting to be processed.
    dirty: HashSet<ServiceKey>,
    /// Keys currently being reconciled.
    processing: HashSet<ServiceKey>,
    /// Redeliveries scheduled but not yet re-added.
    delayed: usize,
}

/// Producer side of the reconcile work queue.
///
/// A key is queued at most once at a time. A key added while it is being
/// processed is delivered again once processing is done, so no event is lost.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<ServiceKey>,
    state: Arc<Mutex<QueueState>>,
}

/// Consumer side of the reconcile work queue.
#[derive(Debug)]
pub struct WorkReceiver {
    rx: mpsc::UnboundedReceiver<ServiceKey>,
    state: Arc<Mutex<QueueState>>,
}

/// Create a connected work queue pair.
pub fn work_queue() -> (WorkQueue, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(QueueState::default()));
    (
        WorkQueue {
            tx,
            state: state.clone(),
        },
        WorkReceiver { rx, state },
    )
}

impl WorkQueue {
    /// Queue a key for reconciliation.
    pub fn add(&self, key: ServiceKey) {
        let mut state = self.state.lock();
        if state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        let _ = self.tx.send(key);
    }

    /// Queue a key after `delay`.
    pub fn add_after(&self, key: ServiceKey, delay: Duration) {
        self.state.lock().delayed += 1;
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
            queue.state.lock().delayed -= 1;
        });
    }

    /// Mark a key returned by [`WorkReceiver::next`] as processed.
    pub fn done(&self, key: &ServiceKey) {
        let mut state = self.state.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            let _ = self.tx.send(key.clone());
        }
    }

    /// Number of keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.state.lock().dirty.len()
    }

    /// True if no keys are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if nothing is waiting, in flight, or scheduled for redelivery.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.dirty.is_empty() && state.processing.is_empty() && state.delayed == 0
    }
}

impl WorkReceiver {
    /// Wait for the next key. Returns `None` once every producer is dropped.
    pub async fn next(&mut self) -> Option<ServiceKey> {
        let key = self.rx.recv().await?;
        let mut state = self.state.lock();
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }
}

/// Index transition applied by one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The ServiceImport exists and its identity is indexed.
    Observed,
    /// The ServiceImport is gone and its identity was removed.
    Removed,
    /// The ServiceImport is gone and its identity was not indexed.
    AlreadyAbsent,
}

/// Applies ServiceImport state to the membership index.
pub struct ReconciliationWorker<L> {
    lookup: L,
    index: MembershipIndex,
}

impl<L: ServiceImportLookup + 'static> ReconciliationWorker<L> {
    /// Create a worker mutating `index`.
    pub fn new(lookup: L, index: MembershipIndex) -> Self {
        Self { lookup, index }
    }

    /// Reconcile a single key.
    pub async fn reconcile(&self, key: &ServiceKey) -> Result<Transition, ReconcileError> {
        let identity = key.identity();

        match self.lookup.get(key).await {
            Ok(_) => {
                self.index.add(&identity);
                metrics::record_reconcile(ReconcileOutcome::Observed);
                Ok(Transition::Observed)
            }
            Err(LookupError::NotFound) => {
                info!(%key, "service import not found, assuming it was deleted");
                match self.index.remove(&identity) {
                    Ok(()) => {
                        metrics::record_reconcile(ReconcileOutcome::Removed);
                        Ok(Transition::Removed)
                    }
                    Err(e) => {
                        debug!(%key, error = %e, "nothing to remove");
                        metrics::record_reconcile(ReconcileOutcome::AlreadyAbsent);
                        Ok(Transition::AlreadyAbsent)
                    }
                }
            }
            Err(LookupError::Unavailable(reason)) => {
                metrics::record_reconcile(ReconcileOutcome::Inconclusive);
                Err(ReconcileError::InconclusiveLookup {
                    key: identity,
                    reason,
                })
            }
        }
    }

    /// Process queued keys until shutdown.
    ///
    /// Keys whose lookup is inconclusive are handed back to `queue` for
    /// redelivery after [`REDELIVERY_DELAY`].
    pub async fn run(
        self,
        mut receiver: WorkReceiver,
        queue: WorkQueue,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Starting reconciliation worker");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("Reconciliation worker received shutdown signal");
                    break;
                }

                key = receiver.next() => {
                    let Some(key) = key else {
                        info!("Work queue closed");
                        break;
                    };

                    let result = self.reconcile(&key).await;
                    queue.done(&key);

                    if let Err(e) = result {
                        warn!(error = %e, "Reconcile failed, requesting redelivery");
                        queue.add_after(key, REDELIVERY_DELAY);
                    }
                }
            }
        }

        info!("Reconciliation worker stopped");
    }
}
