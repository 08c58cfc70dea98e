//! Challenge derivation and solution-chunk search.
//!
//! Every confirmed level reseeds the challenge. A farmer answers with the
//! 8-byte chunk of any of its plot encodings whose bit pattern is closest
//! to the challenge's chunk target; closeness is the number of leading
//! zero bits in the XOR of chunk and target, a monotonic ranking rather
//! than a full Hamming distance.

use silo_core_primitives::crypto::{blake2b_256_hash, blake2b_256_hash_pair};
use silo_core_primitives::{Blake2b256Hash, Piece, ProofId, CHUNK_SIZE};

/// Challenge seed of the next block: hash of the last confirmed level hash
/// and the previous proof id.
pub fn derive_challenge(
    previous_level_hash: &Blake2b256Hash,
    previous_proof_hash: &ProofId,
) -> Blake2b256Hash {
    blake2b_256_hash_pair(previous_level_hash, previous_proof_hash)
}

/// The 8-byte target a solution chunk is scored against.
pub fn chunk_target(challenge: &Blake2b256Hash) -> [u8; CHUNK_SIZE] {
    blake2b_256_hash(challenge)[..CHUNK_SIZE]
        .try_into()
        .expect("Hash is longer than a chunk; qed")
}

/// Leading zero bits of `chunk XOR target`; 64 on an exact match.
pub fn solution_score(chunk: &[u8; CHUNK_SIZE], target: &[u8; CHUNK_SIZE]) -> u32 {
    (u64::from_be_bytes(*chunk) ^ u64::from_be_bytes(*target)).leading_zeros()
}

/// Best solution chunk found across all plot encodings of one piece.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Solution {
    /// The winning chunk.
    pub chunk: [u8; CHUNK_SIZE],
    /// Plot the chunk was found in.
    pub plot_index: usize,
    /// Proximity score of the chunk against the target.
    pub score: u32,
}

/// Scan every chunk-aligned window of every encoding for the chunk closest
/// to the challenge's target. `None` only when `encodings` is empty.
pub fn find_solution(encodings: &[Piece], challenge: &Blake2b256Hash) -> Option<Solution> {
    let target = chunk_target(challenge);

    let mut best: Option<Solution> = None;
    for (plot_index, encoding) in encodings.iter().enumerate() {
        for window in encoding.chunks_exact(CHUNK_SIZE) {
            let chunk: [u8; CHUNK_SIZE] =
                window.try_into().expect("Chunks are exactly sized; qed");
            let score = solution_score(&chunk, &target);
            if best.map(|solution| score > solution.score).unwrap_or(true) {
                best = Some(Solution {
                    chunk,
                    plot_index,
                    score,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, RngCore};
    use silo_core_primitives::PIECE_SIZE;

    #[test]
    fn scores_count_leading_zero_bits() {
        let target = [0u8; CHUNK_SIZE];
        assert_eq!(solution_score(&[0; CHUNK_SIZE], &target), 64);
        assert_eq!(solution_score(&[0x80, 0, 0, 0, 0, 0, 0, 0], &target), 0);
        assert_eq!(solution_score(&[0x01, 0, 0, 0, 0, 0, 0, 0], &target), 7);
        assert_eq!(solution_score(&[0, 0, 0, 0, 0, 0, 0, 0x01], &target), 63);

        // Only bits above the first mismatch count
        let chunk = [0x01, 0xFF, 0, 0, 0, 0, 0, 0];
        assert_eq!(solution_score(&chunk, &target), 7);
    }

    #[test]
    fn challenge_is_deterministic() {
        let level = [3u8; 32];
        let proof = [7u8; 32];
        assert_eq!(derive_challenge(&level, &proof), derive_challenge(&level, &proof));
        assert_ne!(derive_challenge(&level, &proof), derive_challenge(&proof, &level));
    }

    #[test]
    fn planted_chunk_wins_the_search() {
        let mut rng = thread_rng();
        let challenge: Blake2b256Hash = rand::random();
        let target = chunk_target(&challenge);

        let mut encodings = Vec::new();
        for _ in 0..4 {
            let mut bytes = [0u8; PIECE_SIZE];
            rng.fill_bytes(&mut bytes);
            encodings.push(Piece::from(bytes));
        }
        // Plant an exact match at a chunk boundary of plot 2
        encodings[2][16..16 + CHUNK_SIZE].copy_from_slice(&target);

        let solution = find_solution(&encodings, &challenge).unwrap();
        assert_eq!(solution.score, 64);
        assert_eq!(solution.plot_index, 2);
        assert_eq!(solution.chunk, target);

        assert!(find_solution(&[], &challenge).is_none());
    }
}
