//! Sealing confirmed level data into a state and its canonical piece set.

use crate::LedgerError;
use silo_codec::merkle_tree::MerkleTree;
use silo_codec::{erasure_code, slice};
use silo_core_primitives::{
    Piece, PieceHash, State, StateHash, BLAKE2B_256_HASH_SIZE, PIECES_PER_STATE, PIECE_SIZE,
    SOURCE_PIECES_PER_STATE, STATE_DATA_SIZE,
};
use std::borrow::Cow;

/// One piece of a sealed state, ready for the farm to plot.
#[derive(Debug, Clone)]
pub struct PlottablePiece {
    /// The piece itself.
    pub piece: Piece,
    /// Position of the piece within the state's piece set.
    pub index: u32,
    /// Merkle inclusion witness of the piece under the state's piece root.
    pub witness: Vec<u8>,
}

/// A sealed state and its canonical 256-piece set.
///
/// The set is always 127 source pieces, the source index piece, 127 parity
/// pieces and the parity index piece, in that order. Index pieces carry the
/// 127 piece hashes of their half, zero-padded to piece size.
#[derive(Debug, Clone)]
pub struct StatePieceSet {
    /// The sealed state record.
    pub state: State,
    /// Id of the sealed state.
    pub state_hash: StateHash,
    /// The full piece set, in canonical order.
    pub pieces: Vec<PlottablePiece>,
}

/// Index piece: the piece hashes of one half of the set, zero-padded.
fn index_piece(hashes: &[PieceHash]) -> Piece {
    debug_assert_eq!(hashes.len(), SOURCE_PIECES_PER_STATE);
    let mut piece = Piece::default();
    for (slot, hash) in piece
        .chunks_exact_mut(BLAKE2B_256_HASH_SIZE)
        .zip(hashes.iter())
    {
        slot.copy_from_slice(hash);
    }
    piece
}

/// Erasure code exactly [`STATE_DATA_SIZE`] bytes of confirmed level data
/// into the canonical piece set and seal the state record over it.
pub(crate) fn seal_state(
    level_data: &[u8],
    previous_state_hash: StateHash,
    level_hash: [u8; BLAKE2B_256_HASH_SIZE],
    timestamp: u32,
    difficulty: u16,
    version: u16,
) -> Result<StatePieceSet, LedgerError> {
    debug_assert_eq!(level_data.len(), STATE_DATA_SIZE);

    let coded = erasure_code(level_data)?;
    let mut shards = slice(&coded).map(|shard| {
        Piece::try_from(shard).expect("Slices are exactly piece sized; qed")
    });

    let source: Vec<Piece> = shards.by_ref().take(SOURCE_PIECES_PER_STATE).collect();
    let parity: Vec<Piece> = shards.collect();
    debug_assert_eq!(parity.len(), SOURCE_PIECES_PER_STATE);

    let source_hashes: Vec<PieceHash> = source.iter().map(Piece::hash).collect();
    let parity_hashes: Vec<PieceHash> = parity.iter().map(Piece::hash).collect();
    let source_index = index_piece(&source_hashes);
    let parity_index = index_piece(&parity_hashes);
    let index_piece_hash = source_index.hash();

    let mut pieces = Vec::with_capacity(PIECES_PER_STATE);
    pieces.extend(source);
    pieces.push(source_index);
    pieces.extend(parity);
    pieces.push(parity_index);

    let merkle_tree = MerkleTree::from_data(&pieces);
    let state = State {
        previous_state_hash,
        level_hash,
        piece_root: merkle_tree.root(),
        timestamp,
        difficulty,
        version,
        index_piece_hash,
    };
    let state_hash = state.id();

    let pieces = pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            let witness: Cow<'_, [u8]> = merkle_tree
                .get_witness(index)
                .expect("Every set position is within the tree; qed")
                .into();
            PlottablePiece {
                piece,
                index: index as u32,
                witness: witness.into_owned(),
            }
        })
        .collect();

    Ok(StatePieceSet {
        state,
        state_hash,
        pieces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, RngCore};
    use silo_codec::merkle_tree::Witness;
    use std::borrow::Cow;

    #[test]
    fn sealed_state_has_the_canonical_piece_set() {
        let mut level_data = vec![0u8; STATE_DATA_SIZE];
        thread_rng().fill_bytes(&mut level_data);

        let set = seal_state(&level_data, [0; 32], [1; 32], 1_700_000_000, 1, 1).unwrap();

        assert_eq!(set.pieces.len(), PIECES_PER_STATE);
        assert_eq!(set.state_hash, set.state.id());
        assert_eq!(
            set.state.index_piece_hash,
            set.pieces[SOURCE_PIECES_PER_STATE].piece.hash()
        );

        // Source pieces are the level data itself
        for (index, piece) in set.pieces[..SOURCE_PIECES_PER_STATE].iter().enumerate() {
            assert_eq!(
                piece.piece.as_ref(),
                &level_data[index * PIECE_SIZE..][..PIECE_SIZE]
            );
        }

        // The source index piece lists the source piece hashes
        let source_index = &set.pieces[SOURCE_PIECES_PER_STATE].piece;
        for (index, piece) in set.pieces[..SOURCE_PIECES_PER_STATE].iter().enumerate() {
            assert_eq!(
                &source_index[index * BLAKE2B_256_HASH_SIZE..][..BLAKE2B_256_HASH_SIZE],
                piece.piece.hash().as_slice()
            );
        }
        assert!(source_index[SOURCE_PIECES_PER_STATE * BLAKE2B_256_HASH_SIZE..]
            .iter()
            .all(|&byte| byte == 0));

        // Every witness verifies against the sealed piece root
        for plottable in &set.pieces {
            let witness = Witness::new(Cow::Borrowed(plottable.witness.as_slice())).unwrap();
            assert!(witness.is_valid(
                set.state.piece_root,
                plottable.index,
                plottable.piece.hash()
            ));
        }
    }
}
