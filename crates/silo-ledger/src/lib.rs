//! Ledger of the Silo blockchain.
//!
//! The ledger is a state machine over `N` parallel chains of blocks. Blocks
//! carry proofs of storage; once every chain has produced a block since the
//! last confirmation, the round's blocks are confirmed into a level, and
//! accumulated level data is periodically sealed into a state whose
//! erasure-coded piece set the farm plots.
//!
//! The ledger is an owned, single-writer struct. It never locks internally;
//! the owning node serializes access.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

mod ledger;
mod state;

pub use ledger::{Ledger, LedgerConfig};
pub use state::{PlottablePiece, StatePieceSet};

use silo_codec::CodecError;
use silo_core_primitives::RecordDecodeError;
use silo_store::StoreError;
use thiserror::Error;

/// Ledger errors.
///
/// Validation failures carry the specific check that failed and abort only
/// the block or transaction under consideration, never already-applied
/// state. Lookup misses are `Ok(None)`, not errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A proof failed a structural or signature check.
    #[error("invalid proof: {0}")]
    InvalidProof(&'static str),
    /// A transaction failed a structural, signature or balance check.
    #[error("invalid tx: {0}")]
    InvalidTx(&'static str),
    /// A block failed one of the sequential validity checks.
    #[error("invalid block: {0}")]
    InvalidBlock(&'static str),
    /// Codec failure while sealing a state.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Durable store failure, propagated without retry.
    #[error(transparent)]
    Storage(#[from] StoreError),
    /// A record fetched from the durable store failed to decode.
    #[error(transparent)]
    Record(#[from] RecordDecodeError),
}
