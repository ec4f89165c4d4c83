//! In-memory bookie: records sends, scripts acks and failures.

use plume_core::{BookieId, EntryId, ErrorCode, SendError};
use plume_quorum::{BookieClient, LedgerContext, SubAddOp, SubReadOp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Kind of a recorded send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// A write issued through `send_add`.
    Add,
    /// A read issued through `send_read`.
    Read,
}

/// One successfully issued send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRecord {
    /// Add or read.
    pub kind: SendKind,
    /// Entry the send targeted.
    pub entry: EntryId,
}

/// In-memory replica for engine tests.
///
/// Sends are captured rather than executed; tests fire the captured
/// sub-operations' trampolines explicitly (`ack_writes`, `nack_writes`,
/// `serve_reads`) to simulate asynchronous replica responses. Immediate
/// send failures are scripted with `fail_next_sends`; a disabled bookie
/// refuses every send with `ChannelClosed`.
pub struct MemoryBookie {
    id: BookieId,
    enabled: AtomicBool,
    fail_next: AtomicU32,
    attempts: AtomicU32,
    sends: Mutex<Vec<SendRecord>>,
    store: Mutex<HashMap<EntryId, Vec<u8>>>,
    pending_adds: Mutex<Vec<SubAddOp>>,
    pending_reads: Mutex<Vec<SubReadOp>>,
}

impl MemoryBookie {
    /// A healthy, empty bookie.
    pub fn new(id: BookieId) -> Self {
        Self {
            id,
            enabled: AtomicBool::new(true),
            fail_next: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            sends: Mutex::new(Vec::new()),
            store: Mutex::new(HashMap::new()),
            pending_adds: Mutex::new(Vec::new()),
            pending_reads: Mutex::new(Vec::new()),
        }
    }

    /// This bookie's id.
    pub fn id(&self) -> BookieId {
        self.id
    }

    /// Mark the replica administratively enabled or disabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Fail the next `count` sends immediately with `NoConnection`.
    pub fn fail_next_sends(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Preload an entry so later reads can be served.
    pub fn seed_entry(&self, entry: EntryId, payload: Vec<u8>) {
        lock(&self.store).insert(entry, payload);
    }

    /// Every send successfully issued to this bookie, in order.
    pub fn sends(&self) -> Vec<SendRecord> {
        lock(&self.sends).clone()
    }

    /// Successfully issued writes.
    pub fn add_sends(&self) -> Vec<SendRecord> {
        self.sends()
            .into_iter()
            .filter(|s| s.kind == SendKind::Add)
            .collect()
    }

    /// Successfully issued reads.
    pub fn read_sends(&self) -> Vec<SendRecord> {
        self.sends()
            .into_iter()
            .filter(|s| s.kind == SendKind::Read)
            .collect()
    }

    /// Send attempts, including ones that failed immediately.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Ack every captured write, storing its payload locally.
    pub fn ack_writes(&self) {
        let pending: Vec<SubAddOp> = lock(&self.pending_adds).drain(..).collect();
        for sub in pending {
            if let Some(add) = sub.op().as_add() {
                lock(&self.store).insert(add.entry(), add.payload().to_vec());
            }
            sub.complete(ErrorCode::Ok);
        }
    }

    /// Nack every captured write.
    pub fn nack_writes(&self) {
        let pending: Vec<SubAddOp> = lock(&self.pending_adds).drain(..).collect();
        for sub in pending {
            sub.complete(ErrorCode::BookieUnavailable);
        }
    }

    /// Answer every captured read from the local store; entries not
    /// present are nacked as missing.
    pub fn serve_reads(&self) {
        let pending: Vec<SubReadOp> = lock(&self.pending_reads).drain(..).collect();
        for sub in pending {
            let payload = lock(&self.store).get(&sub.entry()).cloned();
            match payload {
                Some(payload) => sub.complete(ErrorCode::Ok, Some(payload)),
                None => sub.complete(ErrorCode::ReadMissingEntry, None),
            }
        }
    }

    /// Captured writes not yet acked or nacked.
    pub fn pending_write_count(&self) -> usize {
        lock(&self.pending_adds).len()
    }

    fn check_sendable(&self) -> Result<(), SendError> {
        if !self.is_enabled() {
            return Err(SendError::ChannelClosed {
                reason: "replica disabled".to_string(),
            });
        }
        match self.take_injected_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn take_injected_failure(&self) -> Option<SendError> {
        let mut remaining = self.fail_next.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.fail_next.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(SendError::NoConnection),
                Err(actual) => remaining = actual,
            }
        }
        None
    }
}

impl BookieClient for MemoryBookie {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn send_add(
        &self,
        _ledger: &LedgerContext,
        sub: SubAddOp,
        entry: EntryId,
    ) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.check_sendable() {
            debug!(bookie = %self.id, %entry, error = %err, "add send refused");
            return Err(err);
        }
        lock(&self.sends).push(SendRecord {
            kind: SendKind::Add,
            entry,
        });
        lock(&self.pending_adds).push(sub);
        Ok(())
    }

    fn send_read(
        &self,
        _ledger: &LedgerContext,
        sub: SubReadOp,
        entry: EntryId,
    ) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.check_sendable() {
            debug!(bookie = %self.id, %entry, error = %err, "read send refused");
            return Err(err);
        }
        lock(&self.sends).push(SendRecord {
            kind: SendKind::Read,
            entry,
        });
        lock(&self.pending_reads).push(sub);
        Ok(())
    }
}
