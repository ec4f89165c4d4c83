//! Core types for the plume ledger client
//!
//! Leaf crate with no knowledge of the dispatch engine: identifiers,
//! the copy-on-read ensemble view, the error taxonomy, and dispatch
//! configuration. Everything here is shared by the quorum engine and by
//! the boundary collaborators that plug into it.

pub mod config;
pub mod ensemble;
pub mod errors;
pub mod ids;

pub use config::{DispatchConfig, RetryConfig};
pub use ensemble::{Ensemble, EnsembleView};
pub use errors::{ErrorCode, LedgerError, Result, SendError};
pub use ids::{BookieId, EntryId, LedgerId, OpId, OpIdAllocator};
