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

//! Cryptographic utilities used across the Silo node.

use crate::{Blake2b256Hash, PublicKey, Signature, BLAKE2B_256_HASH_SIZE};
use blake2::digest::typenum::U32;
use blake2::{Blake2b, Digest};
use blst::min_pk;
use blst::BLST_ERROR;

type Blake2b256 = Blake2b<U32>;

/// Domain separation tag for proof signatures created by farmers.
pub const PROOF_SIGNING_CONTEXT: &[u8] = b"silo_proof";

/// Domain separation tag for transaction signatures.
pub const TX_SIGNING_CONTEXT: &[u8] = b"silo_tx";

/// BLAKE2b-256 hashing of a single value.
pub fn blake2b_256_hash(data: &[u8]) -> Blake2b256Hash {
    let mut state = Blake2b256::new();
    state.update(data);
    state.finalize().into()
}

/// BLAKE2b-256 hashing of a pair of values.
pub fn blake2b_256_hash_pair(a: &[u8], b: &[u8]) -> Blake2b256Hash {
    let mut state = Blake2b256::new();
    state.update(a);
    state.update(b);
    state.finalize().into()
}

/// BLAKE2b-256 hashing of a list of values.
pub fn blake2b_256_hash_list(data: &[&[u8]]) -> Blake2b256Hash {
    let mut state = Blake2b256::new();
    for d in data {
        state.update(d);
    }
    state.finalize().into()
}

/// Verify a detached BLS signature over `message` under `context`.
///
/// Returns `false` for malformed keys and signatures as well as for honest
/// verification failures, callers only ever branch on validity.
pub fn verify_signature(
    public_key: &PublicKey,
    signature: &Signature,
    message: &[u8],
    context: &[u8],
) -> bool {
    let public_key = match min_pk::PublicKey::from_bytes(public_key.as_ref()) {
        Ok(public_key) => public_key,
        Err(_) => {
            return false;
        }
    };
    let signature = match min_pk::Signature::from_bytes(signature.as_ref()) {
        Ok(signature) => signature,
        Err(_) => {
            return false;
        }
    };

    signature.verify(true, message, context, &[], &public_key, true) == BLST_ERROR::BLST_SUCCESS
}

const _: () = assert!(BLAKE2B_256_HASH_SIZE == 32);
