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

//! Merkle tree over per-piece hashes of a state's piece set, with compact
//! inclusion witnesses carried inside proofs.

use blake2::digest::typenum::U32;
use blake2::{Blake2b, Digest};
use core::hash::Hasher;
use core::iter;
use core::ops::Deref;
use silo_core_primitives::{crypto, Blake2b256Hash, BLAKE2B_256_HASH_SIZE};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Clone)]
struct Blake2b256Algorithm(Blake2b<U32>);

impl Default for Blake2b256Algorithm {
    fn default() -> Self {
        Self(Blake2b::new())
    }
}

impl Hasher for Blake2b256Algorithm {
    #[inline]
    fn write(&mut self, msg: &[u8]) {
        self.0.update(msg);
    }

    #[inline]
    fn finish(&self) -> u64 {
        unimplemented!()
    }
}

impl merkle_light::hash::Algorithm<Blake2b256Hash> for Blake2b256Algorithm {
    #[inline]
    fn hash(&mut self) -> Blake2b256Hash {
        self.0.clone().finalize().into()
    }

    #[inline]
    fn reset(&mut self) {
        *self = Self::default();
    }
}

type InternalMerkleTree = merkle_light::merkle::MerkleTree<Blake2b256Hash, Blake2b256Algorithm>;

/// Compact inclusion witness: the lemma hashes between leaf and root.
///
/// Neither the leaf hash nor the root is stored; the path is recovered from
/// the leaf position at verification time.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Witness<'a> {
    /// Number of leaves in the tree this witness was created from.
    merkle_num_leaves: u32,
    witness: Cow<'a, [u8]>,
}

impl<'a> Witness<'a> {
    /// Create a witness from raw bytes, handing the bytes back on a length
    /// that is not a multiple of the hash size.
    pub fn new(witness: Cow<'a, [u8]>) -> Result<Self, Cow<'a, [u8]>> {
        if witness.is_empty() || witness.len() % BLAKE2B_256_HASH_SIZE != 0 {
            return Err(witness);
        }

        Ok(Self {
            merkle_num_leaves: 2_u32.pow((witness.len() / BLAKE2B_256_HASH_SIZE) as u32),
            witness,
        })
    }

    /// Verify this witness against a root for the leaf hash claimed at
    /// `position`.
    pub fn is_valid(&self, root: Blake2b256Hash, position: u32, leaf_hash: Blake2b256Hash) -> bool {
        if position >= self.merkle_num_leaves {
            return false;
        }

        // Match the tree's own leaf hashing: leaves are prefixed with 0x00
        let leaf_hash = crypto::blake2b_256_hash_pair(&[0x00], &leaf_hash);

        let lemma = iter::once(leaf_hash)
            .chain(
                self.witness
                    .chunks_exact(BLAKE2B_256_HASH_SIZE)
                    .map(|hash| -> Blake2b256Hash {
                        hash.try_into()
                            .expect("Chunks are exactly hash sized; qed")
                    }),
            )
            .chain(iter::once(root))
            .collect();

        // The path is implied by the position within the leaf layer
        let path = {
            let mut path = Vec::with_capacity(self.merkle_num_leaves.ilog2() as usize);
            let mut local_position = position;

            for _ in 0..self.merkle_num_leaves.ilog2() {
                path.push(local_position % 2 == 0);
                local_position /= 2;
            }

            path
        };

        merkle_light::proof::Proof::<Blake2b256Hash>::new(lemma, path)
            .validate::<Blake2b256Algorithm>()
    }
}

impl<'a> Deref for Witness<'a> {
    type Target = Cow<'a, [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.witness
    }
}

impl<'a> From<Witness<'a>> for Cow<'a, [u8]> {
    fn from(witness: Witness<'a>) -> Self {
        witness.witness
    }
}

/// Errors creating a witness from a tree.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum MerkleTreeWitnessError {
    /// Requested leaf position is outside the tree.
    #[error("wrong position, there are just {0} leaves available")]
    WrongPosition(usize),
}

/// Merkle tree over piece hashes.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    merkle_tree: InternalMerkleTree,
}

impl MerkleTree {
    /// Build a tree from leaf hashes.
    pub fn new<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = Blake2b256Hash>,
    {
        Self {
            merkle_tree: InternalMerkleTree::new(hashes.into_iter()),
        }
    }

    /// Build a tree by hashing source objects into leaves.
    pub fn from_data<T, I>(data: I) -> Self
    where
        T: AsRef<[u8]>,
        I: IntoIterator<Item = T>,
    {
        Self::new(
            data.into_iter()
                .map(|item| crypto::blake2b_256_hash(item.as_ref())),
        )
    }

    /// Root of the tree.
    pub fn root(&self) -> Blake2b256Hash {
        self.merkle_tree.root()
    }

    /// Create an inclusion witness for the leaf at `position`.
    pub fn get_witness(&self, position: usize) -> Result<Witness<'static>, MerkleTreeWitnessError> {
        if position >= self.merkle_tree.leafs() {
            return Err(MerkleTreeWitnessError::WrongPosition(
                self.merkle_tree.leafs(),
            ));
        }

        let proof = self.merkle_tree.gen_proof(position);

        // First lemma element is the leaf itself and the last is the root,
        // both are recomputed at verification time
        let lemma = proof.lemma().iter().skip(1).rev().skip(1).rev();
        let mut witness = Vec::with_capacity(lemma.len() * BLAKE2B_256_HASH_SIZE);

        for hash in lemma {
            witness.extend_from_slice(hash);
        }

        Ok(Witness::new(witness.into()).expect("Witness length is a multiple of hash size; qed"))
    }
}
