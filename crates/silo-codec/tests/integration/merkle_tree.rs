use rand::{thread_rng, RngCore};
use silo_codec::merkle_tree::{MerkleTree, MerkleTreeWitnessError, Witness};
use silo_core_primitives::{crypto, Blake2b256Hash, Piece, PIECE_SIZE};
use std::borrow::Cow;
use std::iter;

fn random_piece() -> Piece {
    let mut bytes = [0u8; PIECE_SIZE];
    thread_rng().fill_bytes(&mut bytes);
    Piece::from(bytes)
}

#[test]
fn merkle_tree() {
    let number_of_pieces = 16_usize;
    let pieces: Vec<Piece> = iter::repeat_with(random_piece)
        .take(number_of_pieces)
        .collect();
    let hashes: Vec<Blake2b256Hash> = pieces
        .iter()
        .map(|piece| crypto::blake2b_256_hash(piece.as_ref()))
        .collect();

    let merkle_tree_data = MerkleTree::from_data(&pieces);
    let merkle_tree_hashes = MerkleTree::new(hashes.iter().copied());

    let root = merkle_tree_data.root();
    assert_eq!(root, merkle_tree_hashes.root());

    for position in 0..number_of_pieces {
        let witness = merkle_tree_data.get_witness(position).unwrap();

        assert_eq!(witness, merkle_tree_hashes.get_witness(position).unwrap());

        let position = position as u32;
        let leaf_hash = hashes[position as usize];
        assert!(witness.is_valid(root, position, leaf_hash));
        assert!(!witness.is_valid(rand::random(), position, leaf_hash));
        assert!(!witness.is_valid(root, position, rand::random()));
        assert!(!witness.is_valid(root, position + 1, leaf_hash));
    }

    assert_eq!(
        merkle_tree_data.get_witness(number_of_pieces),
        Err(MerkleTreeWitnessError::WrongPosition(number_of_pieces)),
    );
}

#[test]
fn full_piece_set_witnesses_verify() {
    // A fresh level's piece set before index pieces are appended
    let number_of_pieces = 127_usize;
    let pieces: Vec<Piece> = iter::repeat_with(random_piece)
        .take(number_of_pieces)
        .collect();

    let merkle_tree = MerkleTree::from_data(&pieces);
    let root = merkle_tree.root();

    for (position, piece) in pieces.iter().enumerate() {
        let witness = merkle_tree.get_witness(position).unwrap();
        assert!(witness.is_valid(root, position as u32, piece.hash()));
    }
}

#[test]
fn witness_survives_a_byte_round_trip() {
    let pieces: Vec<Piece> = iter::repeat_with(random_piece).take(8).collect();
    let merkle_tree = MerkleTree::from_data(&pieces);
    let root = merkle_tree.root();

    let witness = merkle_tree.get_witness(3).unwrap();
    let bytes: Cow<'_, [u8]> = witness.clone().into();

    let restored = Witness::new(bytes).unwrap();
    assert!(restored.is_valid(root, 3, pieces[3].hash()));
    assert!(!restored.is_valid(root, 4, pieces[3].hash()));
}

#[test]
fn malformed_witness_bytes_are_rejected() {
    assert!(Witness::new(Cow::Borrowed(&[][..])).is_err());
    assert!(Witness::new(Cow::Borrowed(&[0u8; 33][..])).is_err());
}
