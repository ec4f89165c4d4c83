//! Reference aggregation policy for tests.
//!
//! Encodes the contract the engine delegates to its aggregation
//! collaborator: quorum acks complete an add; once nacks exceed `n - q`
//! the entry is provably unreachable; the first replica
//! response per read slot fills the result sequence. Completed operations
//! are handed to the callback worker exactly once.

use plume_core::{ErrorCode, OpId};
use plume_quorum::{
    CallbackWorker, LedgerEntry, Operation, QuorumMonitor, SubAddOp, SubReadOp,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Aggregating monitor that tracks registrations and drives completion.
pub struct TrackingMonitor {
    worker: Arc<dyn CallbackWorker>,
    registered: Mutex<Vec<OpId>>,
}

impl TrackingMonitor {
    /// Monitor delivering completed operations to `worker`.
    pub fn new(worker: Arc<dyn CallbackWorker>) -> Arc<Self> {
        Arc::new(Self {
            worker,
            registered: Mutex::new(Vec::new()),
        })
    }

    /// Ids of every operation registered, in submission order.
    pub fn registered_ops(&self) -> Vec<OpId> {
        lock(&self.registered).clone()
    }

    fn finish(&self, op: &Arc<Operation>, code: ErrorCode) {
        if op.completion().set_complete(code) {
            debug!(op = %op.id(), ?code, "operation complete");
            self.worker.deliver(Arc::clone(op));
        }
    }
}

impl QuorumMonitor for TrackingMonitor {
    fn register_op(&self, op: &Arc<Operation>) {
        lock(&self.registered).push(op.id());
    }

    fn write_complete(&self, code: ErrorCode, sub: SubAddOp) {
        let op = Arc::clone(sub.op());
        if op.as_add().is_none() {
            return;
        }
        let ledger = op.ledger();
        let quorum = ledger.quorum_size() as u32;
        let ensemble_size = ledger.ensemble().snapshot().size() as u32;

        if code.is_ok() {
            if sub.pending().record_ack() >= quorum {
                self.finish(&op, ErrorCode::Ok);
            }
        } else {
            // n - q replicas can fail while a quorum remains; one more
            // nack and no assignment of the remaining replicas reaches q.
            let nacks = sub.pending().record_nack();
            if nacks > ensemble_size.saturating_sub(quorum) {
                self.finish(&op, ErrorCode::QuorumUnreachable);
            }
        }
    }

    fn read_complete(&self, code: ErrorCode, sub: SubReadOp, payload: Option<Vec<u8>>) {
        let op = Arc::clone(sub.op());
        let Some(read) = op.as_read() else {
            return;
        };
        let ledger = op.ledger();
        let quorum = ledger.quorum_size() as u32;
        let ensemble_size = ledger.ensemble().snapshot().size() as u32;

        if code.is_ok() {
            if let Some(payload) = payload {
                sub.pending().record_ack();
                let complete = read.record_result(LedgerEntry {
                    ledger: ledger.id(),
                    entry: sub.entry(),
                    payload,
                });
                if complete {
                    self.finish(&op, ErrorCode::Ok);
                }
                return;
            }
        }

        sub.pending().record_nack();
        let nacks = read.record_nack(sub.entry());
        if nacks > ensemble_size.saturating_sub(quorum) {
            self.finish(&op, ErrorCode::ReadMissingEntry);
        }
    }
}
