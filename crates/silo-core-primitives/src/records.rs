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

//! Wire records of the Silo ledger.
//!
//! Layouts are bit-exact and shared between the wire and the disk, all
//! integers big-endian. They are hand-written rather than derived because
//! interoperability pins them byte-for-byte.

use crate::crypto::blake2b_256_hash;
use crate::{
    Blake2b256Hash, BlockId, ContentId, PieceHash, ProofId, PublicKey, Signature, StateHash, TxId,
    BLAKE2B_256_HASH_SIZE, CHUNK_SIZE, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
use core::fmt;
use thiserror::Error;

/// Reward of a coinbase transaction, in credits.
pub const COINBASE_REWARD: u32 = 1;

/// Errors decoding a wire record from bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum RecordDecodeError {
    /// Input length doesn't match the record layout.
    #[error("wrong length for {record}: expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Record being decoded.
        record: &'static str,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// Input ended before the fixed fields of the record.
    #[error("truncated {record}: {actual} bytes")]
    Truncated {
        /// Record being decoded.
        record: &'static str,
        /// Actual byte length.
        actual: usize,
    },
    /// Merkle proof bytes are not a non-empty multiple of the hash size.
    #[error("invalid merkle proof length {0}")]
    InvalidWitnessLength(usize),
    /// Content record without a coinbase transaction id.
    #[error("content record has an empty transaction list")]
    EmptyTxList,
}

fn read_hash(bytes: &[u8], cursor: &mut usize) -> Blake2b256Hash {
    let hash = bytes[*cursor..*cursor + BLAKE2B_256_HASH_SIZE]
        .try_into()
        .expect("Slice is exactly hash sized; qed");
    *cursor += BLAKE2B_256_HASH_SIZE;
    hash
}

/// The unique, non-malleable object a farmer submits to extend a chain.
///
/// The signature is detached: it covers the whole byte encoding with the
/// signature field zeroed, so the record authenticates every other field
/// including the merkle proof.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Proof {
    /// Hash of the last confirmed level, the challenge seed this proof
    /// answers.
    pub previous_level_hash: Blake2b256Hash,
    /// Id of the proof this one chains to, zero on genesis corner cases.
    pub previous_proof_hash: ProofId,
    /// 8-byte chunk extracted from the encoded piece.
    pub solution: [u8; CHUNK_SIZE],
    /// Content hash of the decoded piece the solution was found in.
    pub piece_hash: PieceHash,
    /// State under which the piece's merkle root lives.
    pub piece_state_hash: StateHash,
    /// Public key of the farmer that created the proof.
    pub public_key: PublicKey,
    /// Detached signature over the encoding with this field zeroed.
    pub signature: Signature,
    /// Merkle inclusion proof of the piece under the state's piece root.
    pub piece_merkle_proof: Vec<u8>,
}

impl Proof {
    /// Byte length of all fields before the variable merkle proof.
    pub const FIXED_SIZE: usize =
        4 * BLAKE2B_256_HASH_SIZE + CHUNK_SIZE + PUBLIC_KEY_LENGTH + SIGNATURE_LENGTH;

    /// Serialize to the canonical byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::FIXED_SIZE + self.piece_merkle_proof.len());
        bytes.extend_from_slice(&self.previous_level_hash);
        bytes.extend_from_slice(&self.previous_proof_hash);
        bytes.extend_from_slice(&self.solution);
        bytes.extend_from_slice(&self.piece_hash);
        bytes.extend_from_slice(&self.piece_state_hash);
        bytes.extend_from_slice(self.public_key.as_ref());
        bytes.extend_from_slice(self.signature.as_ref());
        bytes.extend_from_slice(&self.piece_merkle_proof);
        bytes
    }

    /// Byte encoding with the signature field zeroed, the message that
    /// [`Proof::signature`] is created over.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        bytes[Self::FIXED_SIZE - SIGNATURE_LENGTH..Self::FIXED_SIZE].fill(0);
        bytes
    }

    /// Decode from the canonical byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        if bytes.len() < Self::FIXED_SIZE {
            return Err(RecordDecodeError::Truncated {
                record: "Proof",
                actual: bytes.len(),
            });
        }
        let piece_merkle_proof = bytes[Self::FIXED_SIZE..].to_vec();
        if piece_merkle_proof.is_empty() || piece_merkle_proof.len() % BLAKE2B_256_HASH_SIZE != 0 {
            return Err(RecordDecodeError::InvalidWitnessLength(
                piece_merkle_proof.len(),
            ));
        }

        let mut cursor = 0;
        let previous_level_hash = read_hash(bytes, &mut cursor);
        let previous_proof_hash = read_hash(bytes, &mut cursor);
        let solution = bytes[cursor..cursor + CHUNK_SIZE]
            .try_into()
            .expect("Slice is exactly chunk sized; qed");
        cursor += CHUNK_SIZE;
        let piece_hash = read_hash(bytes, &mut cursor);
        let piece_state_hash = read_hash(bytes, &mut cursor);
        let public_key = PublicKey::from(
            <[u8; PUBLIC_KEY_LENGTH]>::try_from(&bytes[cursor..cursor + PUBLIC_KEY_LENGTH])
                .expect("Slice is exactly key sized; qed"),
        );
        cursor += PUBLIC_KEY_LENGTH;
        let signature = Signature::from(
            <[u8; SIGNATURE_LENGTH]>::try_from(&bytes[cursor..cursor + SIGNATURE_LENGTH])
                .expect("Slice is exactly signature sized; qed"),
        );

        Ok(Self {
            previous_level_hash,
            previous_proof_hash,
            solution,
            piece_hash,
            piece_state_hash,
            public_key,
            signature,
            piece_merkle_proof,
        })
    }

    /// Content hash of the byte encoding, the identity of this proof.
    pub fn id(&self) -> ProofId {
        blake2b_256_hash(&self.to_bytes())
    }
}

/// Malleable per-block payload: the transactions a block confirms.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Content {
    /// Content id of the parent block on the same chain, zero for a chain's
    /// first block.
    pub parent_content_hash: ContentId,
    /// Id of the proof this content belongs to.
    pub proof_hash: ProofId,
    /// Ordered transaction ids, coinbase first.
    pub tx_ids: Vec<TxId>,
}

impl Content {
    const FIXED_SIZE: usize = 2 * BLAKE2B_256_HASH_SIZE;

    /// Serialize to the canonical byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(Self::FIXED_SIZE + self.tx_ids.len() * BLAKE2B_256_HASH_SIZE);
        bytes.extend_from_slice(&self.parent_content_hash);
        bytes.extend_from_slice(&self.proof_hash);
        for tx_id in &self.tx_ids {
            bytes.extend_from_slice(tx_id);
        }
        bytes
    }

    /// Decode from the canonical byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        if bytes.len() < Self::FIXED_SIZE
            || (bytes.len() - Self::FIXED_SIZE) % BLAKE2B_256_HASH_SIZE != 0
        {
            return Err(RecordDecodeError::Truncated {
                record: "Content",
                actual: bytes.len(),
            });
        }

        let mut cursor = 0;
        let parent_content_hash = read_hash(bytes, &mut cursor);
        let proof_hash = read_hash(bytes, &mut cursor);
        let tx_ids = bytes[cursor..]
            .chunks_exact(BLAKE2B_256_HASH_SIZE)
            .map(|chunk| chunk.try_into().expect("Chunks are exact; qed"))
            .collect::<Vec<TxId>>();
        if tx_ids.is_empty() {
            return Err(RecordDecodeError::EmptyTxList);
        }

        Ok(Self {
            parent_content_hash,
            proof_hash,
            tx_ids,
        })
    }

    /// Content hash of the byte encoding.
    pub fn id(&self) -> ContentId {
        blake2b_256_hash(&self.to_bytes())
    }
}

/// A credit transfer, or a coinbase reward when the sender key is zeroed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Tx {
    /// Sender public key, all zeroes for coinbase.
    pub sender: PublicKey,
    /// Receiver public key.
    pub receiver: PublicKey,
    /// Amount in credits.
    pub amount: u32,
    /// Sender account nonce.
    pub nonce: u16,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u32,
    /// Detached signature over all preceding fields, created by the sender,
    /// or by the receiver for coinbase.
    pub signature: Signature,
}

impl Tx {
    /// Exact byte length of a serialized transaction.
    pub const SIZE: usize = 2 * PUBLIC_KEY_LENGTH + 4 + 2 + 4 + SIGNATURE_LENGTH;

    /// Byte length of the signed prefix.
    pub const UNSIGNED_SIZE: usize = Self::SIZE - SIGNATURE_LENGTH;

    /// Unsigned coinbase transaction rewarding `receiver`; the farmer signs
    /// it with the receiving identity.
    pub fn coinbase(receiver: PublicKey, timestamp: u32) -> Self {
        Self {
            sender: PublicKey::default(),
            receiver,
            amount: COINBASE_REWARD,
            nonce: 0,
            timestamp,
            signature: Signature::default(),
        }
    }

    /// Whether this is a coinbase reward.
    pub fn is_coinbase(&self) -> bool {
        self.sender.is_zero()
    }

    /// Serialize to the canonical 202-byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(self.sender.as_ref());
        bytes.extend_from_slice(self.receiver.as_ref());
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(self.signature.as_ref());
        bytes
    }

    /// The signed prefix of the byte encoding.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        bytes.truncate(Self::UNSIGNED_SIZE);
        bytes
    }

    /// Decode from the canonical byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        if bytes.len() != Self::SIZE {
            return Err(RecordDecodeError::WrongLength {
                record: "Tx",
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let mut cursor = 0;
        let mut read_key = |cursor: &mut usize| {
            let key = PublicKey::from(
                <[u8; PUBLIC_KEY_LENGTH]>::try_from(&bytes[*cursor..*cursor + PUBLIC_KEY_LENGTH])
                    .expect("Slice is exactly key sized; qed"),
            );
            *cursor += PUBLIC_KEY_LENGTH;
            key
        };
        let sender = read_key(&mut cursor);
        let receiver = read_key(&mut cursor);
        let amount = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().expect("4 bytes; qed"));
        cursor += 4;
        let nonce = u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().expect("2 bytes; qed"));
        cursor += 2;
        let timestamp =
            u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().expect("4 bytes; qed"));
        cursor += 4;
        let signature = Signature::from(
            <[u8; SIGNATURE_LENGTH]>::try_from(&bytes[cursor..cursor + SIGNATURE_LENGTH])
                .expect("Slice is exactly signature sized; qed"),
        );

        Ok(Self {
            sender,
            receiver,
            amount,
            nonce,
            timestamp,
            signature,
        })
    }

    /// Content hash of the byte encoding.
    pub fn id(&self) -> TxId {
        blake2b_256_hash(&self.to_bytes())
    }
}

/// Compact chained summary of one confirmed level, anchoring its
/// erasure-coded piece set.
///
/// Exactly one state is created per [`crate::STATE_DATA_SIZE`] bytes of
/// accumulated confirmed level data.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct State {
    /// Hash of the previous state, chaining states into a sequence.
    pub previous_state_hash: StateHash,
    /// Hash of concatenated proof hashes of the confirmed level.
    pub level_hash: Blake2b256Hash,
    /// Merkle root over the state's 256-piece set.
    pub piece_root: Blake2b256Hash,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u32,
    /// Difficulty parameter in force when the state was sealed.
    pub difficulty: u16,
    /// Protocol version.
    pub version: u16,
    /// Hash of the source index piece of this state's piece set.
    pub index_piece_hash: PieceHash,
}

impl State {
    /// Exact byte length of a serialized state: 136.
    pub const SIZE: usize = 4 * BLAKE2B_256_HASH_SIZE + 4 + 2 + 2;

    /// Serialize to the canonical byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.previous_state_hash);
        bytes.extend_from_slice(&self.level_hash);
        bytes.extend_from_slice(&self.piece_root);
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.difficulty.to_be_bytes());
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&self.index_piece_hash);
        bytes
    }

    /// Decode from the canonical byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        if bytes.len() != Self::SIZE {
            return Err(RecordDecodeError::WrongLength {
                record: "State",
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let mut cursor = 0;
        let previous_state_hash = read_hash(bytes, &mut cursor);
        let level_hash = read_hash(bytes, &mut cursor);
        let piece_root = read_hash(bytes, &mut cursor);
        let timestamp =
            u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().expect("4 bytes; qed"));
        cursor += 4;
        let difficulty =
            u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().expect("2 bytes; qed"));
        cursor += 2;
        let version =
            u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().expect("2 bytes; qed"));
        cursor += 2;
        let index_piece_hash = read_hash(bytes, &mut cursor);

        Ok(Self {
            previous_state_hash,
            level_hash,
            piece_root,
            timestamp,
            difficulty,
            version,
            index_piece_hash,
        })
    }

    /// Content hash of the byte encoding, the identity of this state.
    pub fn id(&self) -> StateHash {
        blake2b_256_hash(&self.to_bytes())
    }
}

/// Logical triple of proof, content and coinbase transaction.
///
/// The block id is the hash of the concatenation of the three serialized
/// parts; the previous block hash is chain bookkeeping and not part of the
/// id.
#[derive(Clone, Eq, PartialEq)]
pub struct Block {
    /// Id of the previous block applied to the same chain, zero for the
    /// chain's first block.
    pub previous_block_hash: BlockId,
    /// The proof-of-storage that earned this block.
    pub proof: Proof,
    /// The block payload.
    pub content: Content,
    /// The coinbase reward transaction.
    pub coinbase: Tx,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &hex::encode(self.id()))
            .finish_non_exhaustive()
    }
}

impl Block {
    /// Content hash over the three serialized parts.
    pub fn id(&self) -> BlockId {
        let mut bytes = self.proof.to_bytes();
        bytes.extend_from_slice(&self.content.to_bytes());
        bytes.extend_from_slice(&self.coinbase.to_bytes());
        blake2b_256_hash(&bytes)
    }

    /// Compact form for lightweight chain bookkeeping.
    pub fn to_compact(&self) -> CompactBlock {
        CompactBlock {
            proof_id: self.proof.id(),
            content_id: self.content.id(),
            coinbase_id: self.coinbase.id(),
        }
    }

    /// Serialize for gossip: previous block hash, length-prefixed proof and
    /// content, then the fixed-size coinbase.
    pub fn to_bytes(&self) -> Vec<u8> {
        let proof_bytes = self.proof.to_bytes();
        let content_bytes = self.content.to_bytes();
        let mut bytes = Vec::with_capacity(
            BLAKE2B_256_HASH_SIZE + 4 + proof_bytes.len() + content_bytes.len() + Tx::SIZE,
        );
        bytes.extend_from_slice(&self.previous_block_hash);
        bytes.extend_from_slice(&(proof_bytes.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&proof_bytes);
        bytes.extend_from_slice(&(content_bytes.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&content_bytes);
        bytes.extend_from_slice(&self.coinbase.to_bytes());
        bytes
    }

    /// Decode from the gossip layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        let truncated = || RecordDecodeError::Truncated {
            record: "Block",
            actual: bytes.len(),
        };

        if bytes.len() < BLAKE2B_256_HASH_SIZE + 2 {
            return Err(truncated());
        }
        let mut cursor = 0;
        let previous_block_hash = read_hash(bytes, &mut cursor);

        let mut read_section = |cursor: &mut usize| -> Result<&[u8], RecordDecodeError> {
            if bytes.len() < *cursor + 2 {
                return Err(truncated());
            }
            let len =
                u16::from_be_bytes(bytes[*cursor..*cursor + 2].try_into().expect("2 bytes; qed"))
                    as usize;
            *cursor += 2;
            if bytes.len() < *cursor + len {
                return Err(truncated());
            }
            let section = &bytes[*cursor..*cursor + len];
            *cursor += len;
            Ok(section)
        };
        let proof = Proof::from_bytes(read_section(&mut cursor)?)?;
        let content = Content::from_bytes(read_section(&mut cursor)?)?;
        let coinbase = Tx::from_bytes(&bytes[cursor..])?;

        Ok(Self {
            previous_block_hash,
            proof,
            content,
            coinbase,
        })
    }
}

/// Compact block: only the three content hashes of a block's parts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CompactBlock {
    /// Id of the block's proof.
    pub proof_id: ProofId,
    /// Id of the block's content.
    pub content_id: ContentId,
    /// Id of the block's coinbase transaction.
    pub coinbase_id: TxId,
}

impl CompactBlock {
    /// Exact byte length of a serialized compact block.
    pub const SIZE: usize = 3 * BLAKE2B_256_HASH_SIZE;

    /// Serialize to the canonical byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.proof_id);
        bytes.extend_from_slice(&self.content_id);
        bytes.extend_from_slice(&self.coinbase_id);
        bytes
    }

    /// Decode from the canonical byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordDecodeError> {
        if bytes.len() != Self::SIZE {
            return Err(RecordDecodeError::WrongLength {
                record: "CompactBlock",
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let mut cursor = 0;
        Ok(Self {
            proof_id: read_hash(bytes, &mut cursor),
            content_id: read_hash(bytes, &mut cursor),
            coinbase_id: read_hash(bytes, &mut cursor),
        })
    }
}
