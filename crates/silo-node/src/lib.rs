//! Node coordination glue of the Silo blockchain.
//!
//! Ties the farm's stored encodings into the ledger's block production:
//! derives challenges from confirmed levels, searches plot encodings for
//! the closest solution chunk, assembles and signs proofs and blocks, and
//! plots freshly sealed states before farming resumes. Also defines the
//! network transport contract the consensus loop is written against.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

mod farming;
mod network;
mod plotting;
pub mod solving;

pub use farming::{produce_block, Farming, FarmingError, FarmingOptions};
pub use network::{Command, GossipCache, Network, NetworkError};
pub use plotting::PlottingSignals;
