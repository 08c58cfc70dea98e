// Copyright (C) 2024 Silo Labs.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Codec layer of the Silo blockchain: padding, erasure coding, piece
//! slicing and the identity-keyed chained piece cipher.
//!
//! Everything here is stateless; the [`PieceCodec`] struct only captures an
//! encoding key and round count for convenience.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

mod erasure;
pub mod merkle_tree;

pub use erasure::{erasure_code, reconstruct};
use rayon::prelude::*;
use silo_core_primitives::{crypto, Blake2b256Hash, Piece, MAX_SHARDS, PIECE_SIZE};
use thiserror::Error;

/// Byte length of one cipher block.
pub const CIPHER_BLOCK_SIZE: usize = 32;

/// Cipher blocks per piece: 128.
pub const BLOCKS_PER_PIECE: usize = PIECE_SIZE / CIPHER_BLOCK_SIZE;

/// Codec layer errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Erasure coding would exceed the shard-addressing limit.
    ///
    /// Fatal for this shard count, retrying with the same input cannot
    /// succeed.
    #[error("erasure coding requested {requested} shards, limit is {MAX_SHARDS}")]
    ShardLimitExceeded {
        /// Total (source + parity) shards requested.
        requested: usize,
    },
    /// Reconstruction lacks the minimum number of available shards.
    #[error("reconstruction needs {required} available shards, only {available} present")]
    InsufficientShards {
        /// Shards marked available.
        available: usize,
        /// Minimum shards needed.
        required: usize,
    },
    /// Input is not a multiple of the piece size.
    #[error("data length {0} is not piece aligned")]
    NotPieceAligned(usize),
    /// Internal Reed-Solomon failure.
    #[error("reed-solomon error: {0}")]
    ErasureCoding(#[from] reed_solomon_erasure::Error),
}

/// Appends zero bytes until the length is a multiple of [`PIECE_SIZE`].
///
/// No-op for already aligned input, which also makes it idempotent.
pub fn pad(mut data: Vec<u8>) -> Vec<u8> {
    let remainder = data.len() % PIECE_SIZE;
    if remainder != 0 {
        data.resize(data.len() + PIECE_SIZE - remainder, 0);
    }
    data
}

/// Splits a piece-aligned buffer into lazy fixed-size piece views.
pub fn slice(data: &[u8]) -> impl ExactSizeIterator<Item = &[u8]> {
    debug_assert_eq!(data.len() % PIECE_SIZE, 0);
    data.chunks_exact(PIECE_SIZE)
}

/// Encode a piece in place with the chained block cipher.
///
/// Per round, block 0 is XORed with `key` on the first round and with the
/// piece's own last encoded block on subsequent rounds; every following
/// block is XORed with the already-encoded value of its predecessor. The
/// result is a reversible keyed permutation binding the whole piece
/// together, not a confidentiality mechanism: a farmer must hold the full
/// encoding to decode any of it.
pub fn encode_piece(piece: &mut Piece, key: &Blake2b256Hash, rounds: usize) {
    for round in 0..rounds {
        let mut feedback: [u8; CIPHER_BLOCK_SIZE] = if round == 0 {
            *key
        } else {
            piece[PIECE_SIZE - CIPHER_BLOCK_SIZE..]
                .try_into()
                .expect("Block slice is exactly block sized; qed")
        };

        for block in piece.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
            for (byte, feedback_byte) in block.iter_mut().zip(feedback.iter()) {
                *byte ^= feedback_byte;
            }
            feedback.copy_from_slice(block);
        }
    }
}

/// Decode an encoded piece in place, reversing [`encode_piece`] exactly:
/// blocks high-to-low, rounds high-to-low, with the key applied only on the
/// final (first) round.
///
/// `rounds` must match the value used for encoding. A mismatch is NOT
/// detected here and silently produces garbage; callers are responsible for
/// pinning one round count per deployment and re-hashing decoded pieces
/// where integrity matters.
pub fn decode_piece(piece: &mut Piece, key: &Blake2b256Hash, rounds: usize) {
    for round in (0..rounds).rev() {
        for block_index in (1..BLOCKS_PER_PIECE).rev() {
            let (previous, current) = piece[(block_index - 1) * CIPHER_BLOCK_SIZE..]
                .split_at_mut(CIPHER_BLOCK_SIZE);
            for (byte, previous_byte) in current[..CIPHER_BLOCK_SIZE].iter_mut().zip(previous.iter())
            {
                *byte ^= previous_byte;
            }
        }

        let partner: [u8; CIPHER_BLOCK_SIZE] = if round == 0 {
            *key
        } else {
            // Block 127 is already decoded back to the previous round's
            // ciphertext, which is exactly what block 0 was chained to.
            piece[PIECE_SIZE - CIPHER_BLOCK_SIZE..]
                .try_into()
                .expect("Block slice is exactly block sized; qed")
        };
        for (byte, partner_byte) in piece[..CIPHER_BLOCK_SIZE].iter_mut().zip(partner.iter()) {
            *byte ^= partner_byte;
        }
    }
}

/// Piece codec bound to one farmer identity.
///
/// Used to encode pieces of archived history before writing them to a plot
/// and to decode them after reading back.
#[derive(Debug, Copy, Clone)]
pub struct PieceCodec {
    key: Blake2b256Hash,
    rounds: usize,
}

impl PieceCodec {
    /// New codec keyed by the hash of a farmer public key.
    pub fn new<P: AsRef<[u8]>>(public_key: &P, rounds: usize) -> Self {
        Self {
            key: crypto::blake2b_256_hash(public_key.as_ref()),
            rounds,
        }
    }

    /// The 32-byte encoding key.
    pub fn key(&self) -> &Blake2b256Hash {
        &self.key
    }

    /// Encode a single piece in place.
    pub fn encode(&self, piece: &mut Piece) {
        encode_piece(piece, &self.key, self.rounds);
    }

    /// Decode a single encoding in place.
    pub fn decode(&self, piece: &mut Piece) {
        decode_piece(piece, &self.key, self.rounds);
    }

    /// Encode a flat buffer of pieces in place, one rayon task per piece.
    pub fn batch_encode(&self, pieces: &mut [u8]) -> Result<(), CodecError> {
        if pieces.len() % PIECE_SIZE != 0 {
            return Err(CodecError::NotPieceAligned(pieces.len()));
        }

        pieces.par_chunks_exact_mut(PIECE_SIZE).for_each(|chunk| {
            let mut piece = Piece::try_from(&*chunk).expect("Chunks are piece sized; qed");
            self.encode(&mut piece);
            chunk.copy_from_slice(piece.as_ref());
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, RngCore};

    #[test]
    fn cipher_blocks_cover_piece_exactly() {
        assert_eq!(BLOCKS_PER_PIECE, 128);
        assert_eq!(BLOCKS_PER_PIECE * CIPHER_BLOCK_SIZE, PIECE_SIZE);
    }

    #[test]
    fn single_round_chains_blocks() {
        let mut piece = Piece::default();
        thread_rng().fill_bytes(piece.as_mut());
        let original = piece;
        let key = crypto::blake2b_256_hash(b"farmer");

        encode_piece(&mut piece, &key, 1);

        // Block 0 is plaintext XOR key, block 1 is plaintext XOR encoded
        // block 0
        for (index, byte) in piece[..CIPHER_BLOCK_SIZE].iter().enumerate() {
            assert_eq!(*byte, original[index] ^ key[index]);
        }
        for index in 0..CIPHER_BLOCK_SIZE {
            assert_eq!(
                piece[CIPHER_BLOCK_SIZE + index],
                original[CIPHER_BLOCK_SIZE + index] ^ piece[index]
            );
        }
    }
}
