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

//! Core primitives for the Silo proof-of-storage blockchain.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

pub mod crypto;
mod records;
#[cfg(test)]
mod tests;

use core::fmt;
use derive_more::{Deref, DerefMut, From, Into};
pub use records::{
    Block, CompactBlock, Content, Proof, RecordDecodeError, State, Tx, COINBASE_REWARD,
};

/// Size of BLAKE2b-256 hash output (in bytes).
pub const BLAKE2B_256_HASH_SIZE: usize = 32;

/// Byte length of one piece, the unit of plotted and archived data.
pub const PIECE_SIZE: usize = 4096;

/// Length of a BLS12-381 public key in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 48;

/// Length of a detached BLS12-381 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 96;

/// Byte length of a solution chunk extracted from an encoded piece.
pub const CHUNK_SIZE: usize = 8;

/// Number of source pieces erasure coded into one state.
pub const SOURCE_PIECES_PER_STATE: usize = 127;

/// Bytes of confirmed level data consumed by one state.
pub const STATE_DATA_SIZE: usize = SOURCE_PIECES_PER_STATE * PIECE_SIZE;

/// Pieces in the canonical piece set of one state: 127 source + 1 source
/// index + 127 parity + 1 parity index.
pub const PIECES_PER_STATE: usize = 2 * (SOURCE_PIECES_PER_STATE + 1);

/// Hard shard-addressing limit for erasure coding (source + parity).
pub const MAX_SHARDS: usize = 254;

/// BLAKE2b-256 hash output.
pub type Blake2b256Hash = [u8; BLAKE2B_256_HASH_SIZE];

/// Content hash of a piece, the key of the farm's ordered index.
pub type PieceHash = Blake2b256Hash;

/// Content hash of a serialized proof.
pub type ProofId = Blake2b256Hash;

/// Content hash of a serialized content record.
pub type ContentId = Blake2b256Hash;

/// Content hash of a serialized transaction.
pub type TxId = Blake2b256Hash;

/// Content hash of a serialized state record.
pub type StateHash = Blake2b256Hash;

/// Hash of the three serialized parts of a block.
pub type BlockId = Blake2b256Hash;

/// A BLS12-381 public key as bytes produced by the `blst` crate.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Deref, DerefMut, From, Into,
)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl Default for PublicKey {
    fn default() -> Self {
        Self([0; PUBLIC_KEY_LENGTH])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PublicKey {
    /// Whether all bytes are zero, the sender key of a coinbase transaction.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; PUBLIC_KEY_LENGTH]
    }

    /// BLAKE2b-256 hash of the key bytes, used as the piece encoding key of
    /// the plot that belongs to this identity.
    pub fn hash(&self) -> Blake2b256Hash {
        crypto::blake2b_256_hash(&self.0)
    }
}

/// A detached BLS12-381 signature as bytes produced by the `blst` crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deref, DerefMut, From, Into)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Default for Signature {
    fn default() -> Self {
        Self([0; SIGNATURE_LENGTH])
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A single piece of archived ledger history.
///
/// All archived data is padded to a multiple of [`PIECE_SIZE`] and content
/// addressed piece by piece.
#[derive(Copy, Clone, PartialEq, Eq, Deref, DerefMut, From, Into)]
pub struct Piece([u8; PIECE_SIZE]);

impl Default for Piece {
    fn default() -> Self {
        Self([0; PIECE_SIZE])
    }
}

impl fmt::Debug for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Piece({}...)", hex::encode(&self.0[..8]))
    }
}

impl AsRef<[u8]> for Piece {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Piece {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl TryFrom<&[u8]> for Piece {
    type Error = RecordDecodeError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        <[u8; PIECE_SIZE]>::try_from(slice)
            .map(Self)
            .map_err(|_| RecordDecodeError::WrongLength {
                record: "Piece",
                expected: PIECE_SIZE,
                actual: slice.len(),
            })
    }
}

impl Piece {
    /// Content hash of this piece.
    pub fn hash(&self) -> PieceHash {
        crypto::blake2b_256_hash(&self.0)
    }
}

/// Maps `key` to one of `buckets` with a near-uniform distribution and
/// minimal remapping as the bucket count changes.
///
/// This is the jump consistent hash of Lamping and Veach, used to shard
/// blocks across ledger chains by proof id.
pub fn jump_consistent_hash(mut key: u64, buckets: u32) -> u32 {
    assert!(buckets > 0, "jump hash requires at least one bucket");

    let mut b = -1_i64;
    let mut j = 0_i64;
    while j < i64::from(buckets) {
        b = j;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b.wrapping_add(1) as f64) * ((1_u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as u32
}
