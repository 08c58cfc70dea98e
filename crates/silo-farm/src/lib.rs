//! Farm of the Silo node: one identity-keyed plot per farmer key plus a
//! shared ordered piece index.
//!
//! Pieces are stored encoded under each plot's identity and located either
//! by exact content hash or by index-order proximity to a challenge.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

mod farm;
mod identity;
mod megaplot;
mod plot;

pub use farm::{Farm, PieceEncodings, PieceMetadata};
pub use identity::Identity;
pub use megaplot::MegaPlot;
pub use plot::{PieceOffset, Plot, PlotStore};
use silo_core_primitives::{PieceHash, RecordDecodeError};
use silo_store::StoreError;
use thiserror::Error;

/// Farm errors.
#[derive(Debug, Error)]
pub enum FarmError {
    /// Identity file I/O failure.
    #[error("identity I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed identity key material.
    #[error("identity key error: {0}")]
    Identity(String),
    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Stored bytes are not piece shaped.
    #[error("record decode error: {0}")]
    Record(#[from] RecordDecodeError),
    /// Piece metadata bytes failed to decode.
    #[error("metadata decode error: {0}")]
    MetadataDecode(#[from] parity_scale_codec::Error),
    /// Index points at a plot slot with no encoding.
    #[error("no encoding in plot at offset {offset}")]
    MissingEncoding {
        /// Slot offset the index pointed at.
        offset: PieceOffset,
    },
    /// Indexed piece has no metadata record.
    #[error("no metadata for piece {piece_hash:?}")]
    MissingMetadata {
        /// Hash of the piece missing metadata.
        piece_hash: PieceHash,
    },
    /// Decoded piece doesn't re-hash to its index entry.
    #[error("encoding at offset {offset} decodes to a different piece")]
    EncodingCorrupt {
        /// Slot offset holding the corrupt encoding.
        offset: PieceOffset,
    },
}
