//! In-memory collaborators for testing the quorum dispatch engine
//!
//! Provides test doubles for the three boundary traits: a memory bookie
//! that records sends and lets tests script acks/nacks, a tracking
//! monitor implementing the reference aggregation policy, and a
//! channel-backed callback worker. [`TestCluster`] wires them together.

pub mod bookie;
pub mod monitor;
pub mod worker;

pub use bookie::{MemoryBookie, SendKind, SendRecord};
pub use monitor::TrackingMonitor;
pub use worker::ChannelWorker;

use plume_core::{BookieId, DispatchConfig, EntryId, LedgerId, OpIdAllocator, RetryConfig};
use plume_quorum::{BookieClient, CallbackWorker, LedgerContext, QuorumEngine, QuorumMonitor};
use std::sync::Arc;

/// Install a fmt subscriber for test output; safe to call repeatedly.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fully wired engine over in-memory collaborators.
///
/// Must be constructed inside a tokio runtime (the callback worker spawns
/// its delivery task).
pub struct TestCluster {
    /// Shared operation-id allocator.
    pub op_ids: Arc<OpIdAllocator>,
    /// The ledger the engine dispatches for.
    pub ledger: Arc<LedgerContext>,
    /// Ensemble members, in index order.
    pub bookies: Vec<Arc<MemoryBookie>>,
    /// Reference aggregation policy.
    pub monitor: Arc<TrackingMonitor>,
    /// Channel-backed callback delivery.
    pub worker: Arc<ChannelWorker>,
    /// The engine under test.
    pub engine: QuorumEngine,
}

impl TestCluster {
    /// Cluster of `ensemble_size` bookies with the given quorum size,
    /// allocating entries from zero.
    pub fn new(ensemble_size: usize, quorum_size: usize) -> Self {
        Self::with_first_entry(ensemble_size, quorum_size, EntryId(0))
    }

    /// Cluster whose ledger allocates entries starting at `first_entry`.
    pub fn with_first_entry(
        ensemble_size: usize,
        quorum_size: usize,
        first_entry: EntryId,
    ) -> Self {
        init_tracing();
        let bookies: Vec<Arc<MemoryBookie>> = (0..ensemble_size)
            .map(|i| Arc::new(MemoryBookie::new(BookieId(i as u64))))
            .collect();
        let handles: Vec<Arc<dyn BookieClient>> = bookies
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn BookieClient>)
            .collect();

        let op_ids = Arc::new(OpIdAllocator::new());
        let ledger = Arc::new(LedgerContext::new(
            LedgerId(1),
            quorum_size,
            handles,
            first_entry,
            Arc::clone(&op_ids),
        ));

        let worker = ChannelWorker::spawn();
        let monitor = TrackingMonitor::new(Arc::clone(&worker) as Arc<dyn CallbackWorker>);

        // Short backoff so retry paths stay fast under test.
        let config = DispatchConfig {
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
                backoff_multiplier: 2.0,
            },
        };
        let engine = QuorumEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&monitor) as Arc<dyn QuorumMonitor>,
            Arc::clone(&worker) as Arc<dyn CallbackWorker>,
            config,
        );

        Self {
            op_ids,
            ledger,
            bookies,
            monitor,
            worker,
            engine,
        }
    }

    /// Ack every captured write on every bookie.
    pub fn ack_all_writes(&self) {
        for bookie in &self.bookies {
            bookie.ack_writes();
        }
    }

    /// Nack every captured write on every bookie.
    pub fn nack_all_writes(&self) {
        for bookie in &self.bookies {
            bookie.nack_writes();
        }
    }

    /// Serve every captured read on every bookie from its local store.
    pub fn serve_all_reads(&self) {
        for bookie in &self.bookies {
            bookie.serve_reads();
        }
    }
}
