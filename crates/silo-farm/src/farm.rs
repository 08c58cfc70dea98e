#[cfg(test)]
mod tests;

use crate::plot::{PieceOffset, Plot};
use crate::FarmError;
use async_lock::RwLock;
use parity_scale_codec::{Decode, Encode};
use rayon::prelude::*;
use silo_core_primitives::{Piece, PieceHash, StateHash};
use silo_store::ObjectStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Metadata recorded for every plotted piece, keyed by piece hash.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct PieceMetadata {
    /// State under which the piece's merkle root lives.
    pub state_hash: StateHash,
    /// Position of the piece within its state's piece set.
    pub piece_index: u32,
    /// Merkle inclusion proof of the piece under the state's piece root.
    pub merkle_proof: Vec<u8>,
}

/// Raw per-plot encodings of one piece, for proof construction.
#[derive(Debug, Clone)]
pub struct PieceEncodings {
    /// Content hash of the decoded piece.
    pub piece_hash: PieceHash,
    /// Plotting metadata of the piece.
    pub metadata: PieceMetadata,
    /// One raw encoding per plot, in plot order.
    pub encodings: Vec<Piece>,
}

struct IndexState {
    /// Piece content-hash to plot slot, ordered so nearest-successor
    /// lookups are a range scan.
    index: BTreeMap<PieceHash, PieceOffset>,
    /// Offsets grow monotonically and are never reused.
    next_offset: PieceOffset,
}

/// The set of plots plus the shared piece index for one node.
///
/// One plot per farmer identity; every plot stores an encoding of every
/// piece at the same offset. The index lives in memory for the process
/// lifetime. All mutation goes through a write lock, which serializes
/// concurrent `add_piece` calls for the same offset.
pub struct Farm {
    plots: Vec<Plot>,
    metadata_store: Arc<dyn ObjectStore>,
    index: RwLock<IndexState>,
}

impl std::fmt::Debug for Farm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Farm")
            .field("plots", &self.plots.len())
            .finish_non_exhaustive()
    }
}

impl Farm {
    /// New farm over `plots` with piece metadata persisted to
    /// `metadata_store`.
    pub fn new(plots: Vec<Plot>, metadata_store: Arc<dyn ObjectStore>) -> Self {
        assert!(!plots.is_empty(), "farm requires at least one plot");
        info!(plots = plots.len(), "farm initialized");

        Self {
            plots,
            metadata_store,
            index: RwLock::new(IndexState {
                index: BTreeMap::new(),
                next_offset: 0,
            }),
        }
    }

    /// The farm's plots, in encoding order.
    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    /// Number of indexed pieces.
    pub async fn piece_count(&self) -> usize {
        self.index.read().await.index.len()
    }

    /// Plot `piece` into every plot and index it.
    ///
    /// Assigns the next offset, encodes the piece once per plot identity
    /// (in parallel), records `metadata` keyed by the piece hash and
    /// finally publishes the index entry, so readers never observe a
    /// partially plotted piece.
    pub async fn add_piece(
        &self,
        piece: &Piece,
        metadata: PieceMetadata,
    ) -> Result<PieceOffset, FarmError> {
        let piece_hash = piece.hash();
        let mut state = self.index.write().await;
        let offset = state.next_offset;

        self.plots
            .par_iter()
            .try_for_each(|plot| plot.write_piece(offset, piece))?;
        self.metadata_store.put(&piece_hash, &metadata.encode())?;

        state.next_offset += 1;
        state.index.insert(piece_hash, offset);
        debug!(piece_hash = %hex::encode(piece_hash), offset, "piece plotted");
        Ok(offset)
    }

    /// Plot a whole piece set, typically the 256 pieces of a fresh state.
    pub async fn add_pieces<'p, I>(&self, pieces: I) -> Result<(), FarmError>
    where
        I: IntoIterator<Item = (&'p Piece, PieceMetadata)>,
    {
        let mut plotted = 0;
        for (piece, metadata) in pieces {
            self.add_piece(piece, metadata).await?;
            plotted += 1;
        }
        info!(plotted, "piece set plotted");
        Ok(())
    }

    /// Decoded piece under exactly `piece_hash`, `None` when unknown.
    ///
    /// The decoded bytes are verified to re-hash to the requested id; a
    /// mismatch means the plot's encoding is corrupt and surfaces as an
    /// error rather than bad data.
    pub async fn get_exact(&self, piece_hash: &PieceHash) -> Result<Option<Piece>, FarmError> {
        let offset = match self.index.read().await.index.get(piece_hash) {
            Some(offset) => *offset,
            None => {
                return Ok(None);
            }
        };
        let plot = &self.plots[0];
        let piece = plot
            .read_piece(offset)?
            .ok_or(FarmError::MissingEncoding { offset })?;
        if piece.hash() != *piece_hash {
            return Err(FarmError::EncodingCorrupt { offset });
        }
        Ok(Some(piece))
    }

    /// Decoded piece whose hash is the index-order nearest to
    /// `target_hash`.
    ///
    /// Successor semantics of the ordered index with wrap-around, not a
    /// metric distance; `None` only when the farm is empty.
    pub async fn get_closest(
        &self,
        target_hash: &PieceHash,
    ) -> Result<Option<(PieceHash, Piece)>, FarmError> {
        let (piece_hash, offset) = match self.closest_entry(target_hash).await {
            Some(entry) => entry,
            None => {
                return Ok(None);
            }
        };
        let piece = self.plots[0]
            .read_piece(offset)?
            .ok_or(FarmError::MissingEncoding { offset })?;
        Ok(Some((piece_hash, piece)))
    }

    /// Raw encodings of the piece under exactly `piece_hash` from every
    /// plot.
    pub async fn get_exact_encodings(
        &self,
        piece_hash: &PieceHash,
    ) -> Result<Option<PieceEncodings>, FarmError> {
        let offset = match self.index.read().await.index.get(piece_hash) {
            Some(offset) => *offset,
            None => {
                return Ok(None);
            }
        };
        self.encodings_at(*piece_hash, offset).map(Some)
    }

    /// Raw encodings of the index-order nearest piece to `target_hash`
    /// from every plot.
    pub async fn get_closest_encodings(
        &self,
        target_hash: &PieceHash,
    ) -> Result<Option<PieceEncodings>, FarmError> {
        let (piece_hash, offset) = match self.closest_entry(target_hash).await {
            Some(entry) => entry,
            None => {
                return Ok(None);
            }
        };
        self.encodings_at(piece_hash, offset).map(Some)
    }

    /// Remove `piece_hash` from every plot, the index and the metadata
    /// store. Unknown ids are a no-op.
    pub async fn remove(&self, piece_hash: &PieceHash) -> Result<(), FarmError> {
        let mut state = self.index.write().await;
        let Some(offset) = state.index.remove(piece_hash) else {
            return Ok(());
        };
        for plot in &self.plots {
            plot.delete(offset)?;
        }
        self.metadata_store.del(piece_hash)?;
        debug!(piece_hash = %hex::encode(piece_hash), offset, "piece removed");
        Ok(())
    }

    async fn closest_entry(&self, target_hash: &PieceHash) -> Option<(PieceHash, PieceOffset)> {
        let state = self.index.read().await;
        state
            .index
            .range(*target_hash..)
            .next()
            // Ring order: past the largest stored hash the smallest one is
            // the successor
            .or_else(|| state.index.iter().next())
            .map(|(piece_hash, offset)| (*piece_hash, *offset))
    }

    fn encodings_at(
        &self,
        piece_hash: PieceHash,
        offset: PieceOffset,
    ) -> Result<PieceEncodings, FarmError> {
        let metadata_bytes = self
            .metadata_store
            .get(&piece_hash)?
            .ok_or(FarmError::MissingMetadata { piece_hash })?;
        let metadata = PieceMetadata::decode(&mut metadata_bytes.as_slice())?;

        let encodings = self
            .plots
            .iter()
            .map(|plot| {
                plot.read_encoding(offset)?
                    .ok_or(FarmError::MissingEncoding { offset })
            })
            .collect::<Result<Vec<Piece>, FarmError>>()?;

        Ok(PieceEncodings {
            piece_hash,
            metadata,
            encodings,
        })
    }
}
