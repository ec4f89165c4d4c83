//! Channel-backed callback delivery worker.

use async_trait::async_trait;
use plume_core::OpId;
use plume_quorum::{CallbackWorker, Operation, OperationKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Delivers user callbacks on a dedicated task, off the dispatch path.
///
/// Shutdown drains the queue first: completions enqueued before the stop
/// are still delivered, deliveries requested afterwards are dropped with
/// a warning.
pub struct ChannelWorker {
    tx: Mutex<Option<mpsc::UnboundedSender<Arc<Operation>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    registered: Mutex<Vec<OpId>>,
    delivered: Arc<AtomicUsize>,
}

impl ChannelWorker {
    /// Spawn the delivery task; requires a tokio runtime.
    pub fn spawn() -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Operation>>();
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        let handle = tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                deliver_callbacks(&op);
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            registered: Mutex::new(Vec::new()),
            delivered,
        })
    }

    /// Callbacks delivered so far.
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Ids of every operation registered, in submission order.
    pub fn registered_ops(&self) -> Vec<OpId> {
        lock(&self.registered).clone()
    }
}

fn deliver_callbacks(op: &Arc<Operation>) {
    let code = op.completion().error_code();
    match op.kind() {
        OperationKind::Add(add) => {
            if let Some(callback) = add.take_callback() {
                callback(code, op.ledger().id(), add.entry());
            }
        }
        OperationKind::Read(read) => {
            if let Some(callback) = read.take_callback() {
                callback(code, op.ledger().id(), read.take_results());
            }
        }
        OperationKind::Stop => {}
    }
}

#[async_trait]
impl CallbackWorker for ChannelWorker {
    fn register_op(&self, op: &Arc<Operation>) {
        lock(&self.registered).push(op.id());
    }

    fn deliver(&self, op: Arc<Operation>) {
        let guard = lock(&self.tx);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(op).is_err() {
                    error!("callback delivery task is gone");
                }
            }
            None => {
                warn!(op = %op.id(), "callback delivery after shutdown; dropping");
            }
        }
    }

    async fn shutdown(&self) {
        // Dropping the sender closes the channel; the task drains what is
        // already queued before exiting.
        let tx = lock(&self.tx).take();
        drop(tx);
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "callback delivery task failed");
            }
        }
    }
}
