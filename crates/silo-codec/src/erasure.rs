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

//! Systematic Reed-Solomon erasure coding over GF(2⁸) with piece-sized
//! shards. Parity count always equals source count; the total shard count
//! is capped by the shard-addressing limit.

use crate::CodecError;
use reed_solomon_erasure::galois_8::ReedSolomon;
use silo_core_primitives::{MAX_SHARDS, PIECE_SIZE};

/// Erasure code a piece-aligned buffer of `k` source pieces into `2k`
/// pieces, source pieces first.
pub fn erasure_code(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.is_empty() || data.len() % PIECE_SIZE != 0 {
        return Err(CodecError::NotPieceAligned(data.len()));
    }
    let source_count = data.len() / PIECE_SIZE;
    if 2 * source_count > MAX_SHARDS {
        return Err(CodecError::ShardLimitExceeded {
            requested: 2 * source_count,
        });
    }

    let reed_solomon = ReedSolomon::new(source_count, source_count)?;

    let mut shards: Vec<Vec<u8>> = data
        .chunks_exact(PIECE_SIZE)
        .map(<[u8]>::to_vec)
        .chain((0..source_count).map(|_| vec![0u8; PIECE_SIZE]))
        .collect();
    reed_solomon.encode(&mut shards)?;

    Ok(shards.concat())
}

/// Recover all source shards from a buffer sized for
/// `source_count + parity_count` shards.
///
/// Missing shards must be zero-filled in `data`; `availability` marks which
/// shard slots actually hold data. Returns the concatenated source shards.
pub fn reconstruct(
    data: &[u8],
    source_count: usize,
    parity_count: usize,
    availability: &[bool],
) -> Result<Vec<u8>, CodecError> {
    let total = source_count + parity_count;
    if data.len() != total * PIECE_SIZE || availability.len() != total {
        return Err(CodecError::NotPieceAligned(data.len()));
    }
    let available = availability.iter().filter(|&&present| present).count();
    if available < source_count {
        return Err(CodecError::InsufficientShards {
            available,
            required: source_count,
        });
    }

    let reed_solomon = ReedSolomon::new(source_count, parity_count)?;

    let mut shards: Vec<Option<Vec<u8>>> = data
        .chunks_exact(PIECE_SIZE)
        .zip(availability)
        .map(|(shard, &present)| present.then(|| shard.to_vec()))
        .collect();
    reed_solomon.reconstruct(&mut shards)?;

    let mut source = Vec::with_capacity(source_count * PIECE_SIZE);
    for shard in shards.into_iter().take(source_count) {
        source.extend_from_slice(&shard.expect("Reconstruction fills every shard; qed"));
    }
    Ok(source)
}
