//! The quorum dispatch engine.
//!
//! `submit` validates the quorum precondition, registers the operation
//! with the aggregation and callback-delivery collaborators, computes the
//! replica targets, and issues one sub-operation per target through the
//! per-replica transport. It returns once every send has been *issued*;
//! acks, nacks, and final callback delivery happen asynchronously through
//! the collaborators.

use crate::boundary::{BookieClient, CallbackWorker, QuorumMonitor};
use crate::ledger::LedgerContext;
use crate::operation::{AddOp, Operation, OperationKind, ReadOp};
use crate::selection;
use crate::subop::{PendingAdd, PendingRead, SubAddOp, SubReadOp};
use plume_core::{DispatchConfig, Ensemble, EntryId, ErrorCode, LedgerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Quorum-replication dispatch engine for one ledger.
pub struct QuorumEngine {
    ledger: Arc<LedgerContext>,
    monitor: Arc<dyn QuorumMonitor>,
    worker: Arc<dyn CallbackWorker>,
    config: DispatchConfig,
    stopped: AtomicBool,
}

impl QuorumEngine {
    /// Create an engine over `ledger`, wired to the aggregation and
    /// callback-delivery collaborators.
    pub fn new(
        ledger: Arc<LedgerContext>,
        monitor: Arc<dyn QuorumMonitor>,
        worker: Arc<dyn CallbackWorker>,
        config: DispatchConfig,
    ) -> Self {
        debug!(ledger = %ledger.id(), quorum = ledger.quorum_size(), "created quorum engine");
        Self {
            ledger,
            monitor,
            worker,
            config,
            stopped: AtomicBool::new(false),
        }
    }

    /// The ledger this engine dispatches for.
    pub fn ledger(&self) -> &Arc<LedgerContext> {
        &self.ledger
    }

    /// Whether a stop operation has been processed.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Submit an operation for dispatch.
    ///
    /// Returns the registered operation once all of its sends have been
    /// issued (not acknowledged); completion is observed through the
    /// operation's [`CompletionSignal`] or its callback. Fails
    /// synchronously with `NotEnoughBookies` when the ensemble is smaller
    /// than the quorum size (no send is issued), and with `EngineStopped`
    /// after a stop operation has been accepted.
    ///
    /// [`CompletionSignal`]: crate::completion::CompletionSignal
    pub async fn submit(&self, op: Operation) -> Result<Arc<Operation>> {
        if self.is_stopped() {
            return Err(LedgerError::EngineStopped);
        }
        let op = Arc::new(op);
        match op.kind() {
            OperationKind::Stop => {
                info!(op = %op.id(), ledger = %self.ledger.id(), "stopping callback delivery");
                self.stopped.store(true, Ordering::Release);
                self.worker.shutdown().await;
                op.completion().set_complete(ErrorCode::Ok);
            }
            OperationKind::Add(add) => {
                let snapshot = self.ledger.ensemble().snapshot();
                if let Err(err) =
                    selection::check_quorum(snapshot.size(), self.ledger.quorum_size())
                {
                    warn!(op = %op.id(), entry = %add.entry(), error = %err, "add rejected");
                    op.completion().set_complete(err.code());
                    return Err(err);
                }
                self.monitor.register_op(&op);
                self.worker.register_op(&op);
                self.dispatch_add(&op, add).await;
            }
            OperationKind::Read(read) => {
                // One consistent snapshot for the whole range; the
                // precondition then holds for every entry in it.
                let snapshot = self.ledger.ensemble().snapshot();
                if let Err(err) =
                    selection::check_quorum(snapshot.size(), self.ledger.quorum_size())
                {
                    warn!(op = %op.id(), first = %read.first_entry(), last = %read.last_entry(),
                        error = %err, "read rejected");
                    op.completion().set_complete(err.code());
                    return Err(err);
                }
                self.monitor.register_op(&op);
                self.worker.register_op(&op);
                self.dispatch_read(&op, read, &snapshot);
            }
        }
        Ok(op)
    }

    /// Issue one write sub-operation per quorum slot.
    ///
    /// Disabled replicas are not filtered on the add path; the send is
    /// attempted regardless and the replica's transport decides. A slot
    /// whose every candidate fails immediately is surfaced through the
    /// trampoline as `BookieUnavailable` instead of blocking dispatch.
    async fn dispatch_add(&self, op: &Arc<Operation>, add: &AddOp) {
        let entry = add.entry();
        let quorum = self.ledger.quorum_size();
        let pending = Arc::new(PendingAdd::new());
        let mut targeted: Vec<usize> = Vec::with_capacity(quorum);

        for slot in 0..quorum {
            match self.issue_add_slot(op, entry, &pending, slot, &targeted).await {
                Some(index) => targeted.push(index),
                None => {
                    let snapshot = self.ledger.ensemble().snapshot();
                    let n = snapshot.size().max(1);
                    let index = selection::slot_index(entry, slot, n);
                    error!(op = %op.id(), %entry, slot, "no routable replica for slot");
                    let sub = SubAddOp::new(
                        Arc::clone(op),
                        Arc::clone(&pending),
                        index,
                        Arc::clone(&self.monitor),
                    );
                    sub.complete(ErrorCode::BookieUnavailable);
                }
            }
        }
    }

    /// Drive one quorum slot of an add to a successful issue.
    ///
    /// Retries the slot's primary candidate with exponential backoff up
    /// to the configured attempt bound, re-reading the ensemble snapshot
    /// before every attempt (it may have changed), then falls back to the
    /// ring indices outside the quorum window that are not already
    /// targeted for this entry. Returns the replica index the send was
    /// issued to, `None` when no distinct replica remains.
    async fn issue_add_slot(
        &self,
        op: &Arc<Operation>,
        entry: EntryId,
        pending: &Arc<PendingAdd>,
        slot: usize,
        targeted: &[usize],
    ) -> Option<usize> {
        let retry = &self.config.retry;

        for attempt in 1..=retry.max_attempts.max(1) {
            if attempt > 1 {
                sleep(retry.backoff_delay(attempt)).await;
            }
            let snapshot = self.ledger.ensemble().snapshot();
            let n = snapshot.size();
            if n == 0 {
                break;
            }
            let index = selection::slot_index(entry, slot, n);
            let sub = SubAddOp::new(
                Arc::clone(op),
                Arc::clone(pending),
                index,
                Arc::clone(&self.monitor),
            );
            match snapshot.replica(index).send_add(&self.ledger, sub, entry) {
                Ok(()) => {
                    debug!(op = %op.id(), %entry, slot, index, "issued add send");
                    return Some(index);
                }
                Err(err) => {
                    warn!(op = %op.id(), %entry, slot, index, attempt, error = %err,
                        "immediate add send failure");
                }
            }
        }

        // Primary candidate exhausted; walk the rest of the ring once.
        // Quorum-window primaries are never candidates: a replacement
        // that lands on another slot's primary would put two slots on one
        // replica and count its single ack twice toward the quorum.
        let snapshot = self.ledger.ensemble().snapshot();
        let n = snapshot.size();
        if n == 0 {
            return None;
        }
        let quorum = self.ledger.quorum_size().min(n);
        let primaries = selection::quorum_indices(entry, n, quorum);
        for index in selection::ring_indices(entry, n) {
            if primaries.contains(&index) || targeted.contains(&index) {
                continue;
            }
            let sub = SubAddOp::new(
                Arc::clone(op),
                Arc::clone(pending),
                index,
                Arc::clone(&self.monitor),
            );
            match snapshot.replica(index).send_add(&self.ledger, sub, entry) {
                Ok(()) => {
                    debug!(op = %op.id(), %entry, slot, index, "issued add send to replacement");
                    return Some(index);
                }
                Err(err) => {
                    warn!(op = %op.id(), %entry, slot, index, error = %err,
                        "replacement add send failure");
                }
            }
        }
        None
    }

    /// Issue read sub-operations for every entry in the range.
    ///
    /// Each entry walks the ring from its own offset until `q` sends are
    /// issued, skipping disabled replicas and immediate send failures in
    /// favor of the next ring candidate. Slots still uncovered when the
    /// ring is exhausted are surfaced through the trampoline so the
    /// aggregation policy can account for them.
    fn dispatch_read(
        &self,
        op: &Arc<Operation>,
        read: &ReadOp,
        snapshot: &Arc<Ensemble<Arc<dyn BookieClient>>>,
    ) {
        let quorum = self.ledger.quorum_size();
        let n = snapshot.size();

        for raw in read.first_entry().0..=read.last_entry().0 {
            let entry = EntryId(raw);
            let pending = Arc::new(PendingRead::new(entry));
            let mut issued = 0usize;

            for index in selection::ring_indices(entry, n) {
                if issued == quorum {
                    break;
                }
                let bookie = snapshot.replica(index);
                if !bookie.is_enabled() {
                    debug!(op = %op.id(), %entry, index, "skipping disabled replica");
                    continue;
                }
                let sub = SubReadOp::new(
                    Arc::clone(op),
                    Arc::clone(&pending),
                    index,
                    Arc::clone(&self.monitor),
                );
                match bookie.send_read(&self.ledger, sub, entry) {
                    Ok(()) => {
                        debug!(op = %op.id(), %entry, index, "issued read send");
                        issued += 1;
                    }
                    Err(err) => {
                        warn!(op = %op.id(), %entry, index, error = %err,
                            "immediate read send failure; trying replacement");
                    }
                }
            }

            for slot in issued..quorum {
                let index = selection::slot_index(entry, slot, n);
                warn!(op = %op.id(), %entry, slot, "read slot uncovered");
                let sub = SubReadOp::new(
                    Arc::clone(op),
                    Arc::clone(&pending),
                    index,
                    Arc::clone(&self.monitor),
                );
                sub.complete(ErrorCode::BookieUnavailable, None);
            }
        }
    }
}
