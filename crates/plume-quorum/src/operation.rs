//! Operation envelopes: the Add/Read/Stop requests submitted to the engine.

use crate::completion::CompletionSignal;
use crate::ledger::LedgerContext;
use plume_core::{EntryId, ErrorCode, LedgerError, LedgerId, OpId, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One replicated ledger entry as returned to a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Ledger the entry belongs to.
    pub ledger: LedgerId,
    /// Position within the ledger.
    pub entry: EntryId,
    /// Entry payload.
    pub payload: Vec<u8>,
}

/// User callback delivered once for a completed add.
pub type AddCallback = Box<dyn FnOnce(ErrorCode, LedgerId, EntryId) + Send>;

/// User callback delivered once for a completed read, with one result
/// slot per requested entry.
pub type ReadCallback = Box<dyn FnOnce(ErrorCode, LedgerId, Vec<Option<LedgerEntry>>) + Send>;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A top-level client request: one add, one read range, or a stop.
///
/// The id is assigned exactly once at construction from the ledger's
/// shared allocator and is strictly increasing across all operation
/// kinds. The completion signal transitions exactly once; the kind and
/// ledger reference never change.
pub struct Operation {
    id: OpId,
    ledger: Arc<LedgerContext>,
    completion: CompletionSignal,
    kind: OperationKind,
}

/// The request payload carried by an [`Operation`].
pub enum OperationKind {
    /// Append one entry to the ledger.
    Add(AddOp),
    /// Read an inclusive entry range from the ledger.
    Read(ReadOp),
    /// Shut down callback delivery; terminal for the engine.
    Stop,
}

impl Operation {
    /// Build an add operation.
    ///
    /// The entry id is allocated here, synchronously, before any
    /// sub-operation exists; it is never reassigned, so no two adds on the
    /// same ledger target the same entry.
    pub fn add(ledger: Arc<LedgerContext>, payload: Vec<u8>, callback: AddCallback) -> Operation {
        let id = ledger.op_ids().next();
        let entry = ledger.allocate_entry_id();
        debug!(op = %id, ledger = %ledger.id(), entry = %entry, "created add operation");
        Operation {
            id,
            ledger,
            completion: CompletionSignal::new(),
            kind: OperationKind::Add(AddOp {
                payload,
                entry,
                callback: Mutex::new(Some(callback)),
            }),
        }
    }

    /// Build a read operation over the inclusive range `[first, last]`.
    ///
    /// Fails with `InvalidReadRange` when the range is reversed; no
    /// operation id is consumed in that case.
    pub fn read(
        ledger: Arc<LedgerContext>,
        first: EntryId,
        last: EntryId,
        callback: ReadCallback,
    ) -> Result<Operation> {
        if first > last {
            return Err(LedgerError::InvalidReadRange { first, last });
        }
        let id = ledger.op_ids().next();
        debug!(op = %id, ledger = %ledger.id(), %first, %last, "created read operation");
        let slots = (last.0 - first.0 + 1) as usize;
        Ok(Operation {
            id,
            ledger,
            completion: CompletionSignal::new(),
            kind: OperationKind::Read(ReadOp {
                first,
                last,
                results: Mutex::new(vec![None; slots]),
                acks: Mutex::new(0),
                nacks: Mutex::new(HashMap::new()),
                callback: Mutex::new(Some(callback)),
            }),
        })
    }

    /// Build a stop operation.
    pub fn stop(ledger: Arc<LedgerContext>) -> Operation {
        let id = ledger.op_ids().next();
        debug!(op = %id, ledger = %ledger.id(), "created stop operation");
        Operation {
            id,
            ledger,
            completion: CompletionSignal::new(),
            kind: OperationKind::Stop,
        }
    }

    /// Operation id, unique for the lifetime of the process.
    pub fn id(&self) -> OpId {
        self.id
    }

    /// The ledger this operation targets.
    pub fn ledger(&self) -> &Arc<LedgerContext> {
        &self.ledger
    }

    /// The operation's one-shot completion latch.
    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    /// The request payload.
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// The add payload, if this is an add operation.
    pub fn as_add(&self) -> Option<&AddOp> {
        match &self.kind {
            OperationKind::Add(add) => Some(add),
            _ => None,
        }
    }

    /// The read payload, if this is a read operation.
    pub fn as_read(&self) -> Option<&ReadOp> {
        match &self.kind {
            OperationKind::Read(read) => Some(read),
            _ => None,
        }
    }
}

// Callbacks are opaque closures, so the payload fields are summarized
// rather than derived.
impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Operation");
        out.field("id", &self.id).field("ledger", &self.ledger.id());
        match &self.kind {
            OperationKind::Add(add) => out.field("kind", &"add").field("entry", &add.entry()),
            OperationKind::Read(read) => out
                .field("kind", &"read")
                .field("first", &read.first)
                .field("last", &read.last),
            OperationKind::Stop => out.field("kind", &"stop"),
        };
        out.finish_non_exhaustive()
    }
}

/// Payload of an add operation.
pub struct AddOp {
    payload: Vec<u8>,
    entry: EntryId,
    callback: Mutex<Option<AddCallback>>,
}

impl AddOp {
    /// Entry payload bytes, immutable after construction.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The entry id assigned at construction.
    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// Take the user callback; `None` after it has been taken once.
    pub fn take_callback(&self) -> Option<AddCallback> {
        lock(&self.callback).take()
    }
}

/// Payload of a read operation.
///
/// The result sequence is pre-allocated to the range length at
/// construction and never resized; replica responses fill it slot by
/// slot. The ack/nack counters are written by the aggregation
/// collaborator, never by the dispatch path.
pub struct ReadOp {
    first: EntryId,
    last: EntryId,
    results: Mutex<Vec<Option<LedgerEntry>>>,
    acks: Mutex<usize>,
    nacks: Mutex<HashMap<EntryId, u32>>,
    callback: Mutex<Option<ReadCallback>>,
}

impl ReadOp {
    /// First entry of the inclusive range.
    pub fn first_entry(&self) -> EntryId {
        self.first
    }

    /// Last entry of the inclusive range.
    pub fn last_entry(&self) -> EntryId {
        self.last
    }

    /// Number of result slots (`last - first + 1`).
    pub fn entry_count(&self) -> usize {
        (self.last.0 - self.first.0 + 1) as usize
    }

    /// Result slot index for `entry`; `None` when outside the range.
    pub fn slot(&self, entry: EntryId) -> Option<usize> {
        (self.first <= entry && entry <= self.last).then(|| (entry.0 - self.first.0) as usize)
    }

    /// Record a replica response for one entry.
    ///
    /// The first response per slot wins; duplicates from other replicas of
    /// the same entry are ignored. Returns `true` once every slot in the
    /// range has been filled.
    pub fn record_result(&self, result: LedgerEntry) -> bool {
        let Some(slot) = self.slot(result.entry) else {
            return false;
        };
        let mut results = lock(&self.results);
        let mut acks = lock(&self.acks);
        if results[slot].is_none() {
            results[slot] = Some(result);
            *acks += 1;
        }
        *acks == self.entry_count()
    }

    /// Count a negative response for `entry`; returns the new per-entry
    /// nack count.
    pub fn record_nack(&self, entry: EntryId) -> u32 {
        let mut nacks = lock(&self.nacks);
        let count = nacks.entry(entry).or_insert(0);
        *count += 1;
        *count
    }

    /// Slots filled so far.
    pub fn filled_count(&self) -> usize {
        *lock(&self.acks)
    }

    /// Take the result sequence for delivery, leaving an empty vec behind.
    pub fn take_results(&self) -> Vec<Option<LedgerEntry>> {
        std::mem::take(&mut *lock(&self.results))
    }

    /// Take the user callback; `None` after it has been taken once.
    pub fn take_callback(&self) -> Option<ReadCallback> {
        lock(&self.callback).take()
    }
}
