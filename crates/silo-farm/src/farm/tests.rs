use super::*;
use crate::{Identity, MegaPlot, Plot};
use rand::{thread_rng, RngCore};
use silo_codec::{erasure_code, slice, PieceCodec};
use silo_core_primitives::{Piece, PieceHash, PIECE_SIZE};
use silo_store::MemStore;
use std::collections::HashSet;

const ROUNDS: usize = 3;
const PLOTS: usize = 32;

fn metadata(piece_index: u32) -> PieceMetadata {
    PieceMetadata {
        state_hash: [7; 32],
        piece_index,
        merkle_proof: vec![0; 32],
    }
}

fn farm_with_plots(plot_count: usize) -> Farm {
    let plots = (0..plot_count)
        .map(|_| {
            Plot::new(
                Identity::generate().public_key(),
                std::sync::Arc::new(MemStore::new()),
                ROUNDS,
            )
        })
        .collect();
    Farm::new(plots, std::sync::Arc::new(MemStore::new()))
}

fn erasure_coded_level(source_pieces: usize) -> Vec<Piece> {
    let mut data = vec![0u8; source_pieces * PIECE_SIZE];
    thread_rng().fill_bytes(&mut data);
    let coded = erasure_code(&data).unwrap();
    slice(&coded)
        .map(|piece| Piece::try_from(piece).unwrap())
        .collect()
}

#[tokio::test]
async fn lookups_return_level_members_for_every_plot() {
    let farm = farm_with_plots(PLOTS);
    // 10 source pieces erasure code into a 20-piece level
    let pieces = erasure_coded_level(10);
    assert_eq!(pieces.len(), 20);

    let level_hashes: HashSet<PieceHash> = pieces.iter().map(Piece::hash).collect();
    for (piece_index, piece) in pieces.iter().enumerate() {
        farm.add_piece(piece, metadata(piece_index as u32))
            .await
            .unwrap();
    }
    assert_eq!(farm.piece_count().await, 20);

    let mut target = [0u8; 32];
    thread_rng().fill_bytes(&mut target);
    let (closest_hash, closest_piece) = farm.get_closest(&target).await.unwrap().unwrap();
    assert!(level_hashes.contains(&closest_piece.hash()));
    assert_eq!(closest_piece.hash(), closest_hash);

    let exact = farm.get_exact(&closest_hash).await.unwrap().unwrap();
    assert_eq!(exact, closest_piece);

    // Every plot's raw encoding must decode back to the same level member
    let encodings = farm
        .get_closest_encodings(&target)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(encodings.encodings.len(), PLOTS);
    for (plot, mut encoding) in farm.plots().iter().zip(encodings.encodings) {
        PieceCodec::new(plot.public_key(), ROUNDS).decode(&mut encoding);
        assert_eq!(encoding, closest_piece);
        assert!(level_hashes.contains(&encoding.hash()));
    }

    farm.remove(&closest_hash).await.unwrap();
    assert!(farm.get_exact(&closest_hash).await.unwrap().is_none());
    assert!(farm
        .get_exact_encodings(&closest_hash)
        .await
        .unwrap()
        .is_none());
    assert_eq!(farm.piece_count().await, 19);
}

#[tokio::test]
async fn remove_unknown_piece_is_noop() {
    let farm = farm_with_plots(2);
    farm.remove(&[9; 32]).await.unwrap();
    assert_eq!(farm.piece_count().await, 0);
}

#[tokio::test]
async fn closest_lookup_wraps_around() {
    let farm = farm_with_plots(1);
    let mut bytes = [0u8; PIECE_SIZE];
    thread_rng().fill_bytes(&mut bytes);
    let piece = Piece::from(bytes);
    farm.add_piece(&piece, metadata(0)).await.unwrap();

    // A target past every stored hash must wrap to the smallest entry
    let (hash, found) = farm.get_closest(&[0xff; 32]).await.unwrap().unwrap();
    assert_eq!(hash, piece.hash());
    assert_eq!(found, piece);
}

#[tokio::test]
async fn metadata_survives_the_round_trip() {
    let farm = farm_with_plots(2);
    let mut bytes = [0u8; PIECE_SIZE];
    thread_rng().fill_bytes(&mut bytes);
    let piece = Piece::from(bytes);
    let piece_metadata = PieceMetadata {
        state_hash: [3; 32],
        piece_index: 42,
        merkle_proof: vec![5; 96],
    };
    farm.add_piece(&piece, piece_metadata.clone()).await.unwrap();

    let encodings = farm
        .get_exact_encodings(&piece.hash())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(encodings.metadata, piece_metadata);
}

#[tokio::test]
async fn megaplot_backed_farm_reads_its_own_writes() {
    let identities: Vec<Identity> = (0..4).map(|_| Identity::generate()).collect();
    let megaplot = MegaPlot::new(std::sync::Arc::new(MemStore::new()), identities.len());
    let plots = identities
        .iter()
        .enumerate()
        .map(|(plot_index, identity)| {
            Plot::new(identity.public_key(), megaplot.plot_store(plot_index), ROUNDS)
        })
        .collect();
    let farm = Farm::new(plots, std::sync::Arc::new(MemStore::new()));

    let pieces = erasure_coded_level(3);
    for (piece_index, piece) in pieces.iter().enumerate() {
        farm.add_piece(piece, metadata(piece_index as u32))
            .await
            .unwrap();
    }

    for piece in &pieces {
        let found = farm.get_exact(&piece.hash()).await.unwrap().unwrap();
        assert_eq!(found, *piece);
    }

    farm.remove(&pieces[0].hash()).await.unwrap();
    assert!(farm.get_exact(&pieces[0].hash()).await.unwrap().is_none());
    let found = farm.get_exact(&pieces[1].hash()).await.unwrap().unwrap();
    assert_eq!(found, pieces[1]);
}
