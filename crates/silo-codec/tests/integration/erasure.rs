use rand::seq::index;
use rand::{thread_rng, RngCore};
use silo_codec::{erasure_code, reconstruct, CodecError};
use silo_core_primitives::{MAX_SHARDS, PIECE_SIZE};

fn random_source(piece_count: usize) -> Vec<u8> {
    let mut data = vec![0u8; piece_count * PIECE_SIZE];
    thread_rng().fill_bytes(&mut data);
    data
}

#[test]
fn erasure_coding_is_systematic() {
    let source = random_source(64);
    let coded = erasure_code(&source).unwrap();

    assert_eq!(coded.len(), 2 * source.len());
    // Source shards come first, untouched
    assert_eq!(&coded[..source.len()], &source[..]);
    // Parity is not a trivial copy
    assert_ne!(&coded[source.len()..], &source[..]);
}

#[test]
fn largest_level_fits_the_shard_limit() {
    let source = random_source(MAX_SHARDS / 2);
    let coded = erasure_code(&source).unwrap();
    assert_eq!(coded.len(), MAX_SHARDS * PIECE_SIZE);
}

#[test]
fn oversized_level_is_rejected() {
    let source = random_source(129);
    assert!(matches!(
        erasure_code(&source),
        Err(CodecError::ShardLimitExceeded { requested: 258 })
    ));
}

#[test]
fn unaligned_input_is_rejected() {
    assert!(matches!(
        erasure_code(&[0u8; PIECE_SIZE + 1]),
        Err(CodecError::NotPieceAligned(_))
    ));
    assert!(matches!(
        erasure_code(&[]),
        Err(CodecError::NotPieceAligned(0))
    ));
}

#[test]
fn reconstructs_from_any_half_of_the_shards() {
    let source_count = 16;
    let source = random_source(source_count);
    let coded = erasure_code(&source).unwrap();
    let total = 2 * source_count;

    let mut rng = thread_rng();
    for _ in 0..4 {
        // Drop a random half of the shards, zeroing the missing ones
        let keep = index::sample(&mut rng, total, source_count);
        let mut availability = vec![false; total];
        for shard in keep.iter() {
            availability[shard] = true;
        }

        let mut damaged = coded.clone();
        for (shard, &present) in availability.iter().enumerate() {
            if !present {
                damaged[shard * PIECE_SIZE..][..PIECE_SIZE].fill(0);
            }
        }

        let recovered =
            reconstruct(&damaged, source_count, source_count, &availability).unwrap();
        assert_eq!(recovered, source);
    }
}

#[test]
fn reconstruction_needs_at_least_the_source_count() {
    let source_count = 8;
    let source = random_source(source_count);
    let coded = erasure_code(&source).unwrap();

    let mut availability = vec![false; 2 * source_count];
    for shard in 0..source_count - 1 {
        availability[shard] = true;
    }

    assert!(matches!(
        reconstruct(&coded, source_count, source_count, &availability),
        Err(CodecError::InsufficientShards {
            available: 7,
            required: 8,
        })
    ));
}
