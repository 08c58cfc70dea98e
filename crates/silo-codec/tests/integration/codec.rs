use rand::{thread_rng, Rng, RngCore};
use silo_codec::{decode_piece, encode_piece, pad, slice, PieceCodec};
use silo_core_primitives::{Piece, PIECE_SIZE};

fn random_piece() -> Piece {
    let mut bytes = [0u8; PIECE_SIZE];
    thread_rng().fill_bytes(&mut bytes);
    Piece::from(bytes)
}

#[test]
fn piece_cipher_round_trips() {
    let key = rand::random();
    let piece = random_piece();

    for rounds in [1_usize, 2, 3, 128, 512] {
        let mut encoding = piece;
        encode_piece(&mut encoding, &key, rounds);
        assert_ne!(encoding, piece, "rounds = {rounds}");

        decode_piece(&mut encoding, &key, rounds);
        assert_eq!(encoding, piece, "rounds = {rounds}");
    }
}

#[test]
fn different_keys_produce_different_encodings() {
    let piece = random_piece();

    let mut first = piece;
    encode_piece(&mut first, &rand::random(), 3);
    let mut second = piece;
    encode_piece(&mut second, &rand::random(), 3);

    assert_ne!(first, second);
}

#[test]
fn codec_matches_free_functions() {
    let public_key: [u8; 48] = {
        let mut bytes = [0u8; 48];
        thread_rng().fill_bytes(&mut bytes);
        bytes
    };
    let rounds = 7;
    let codec = PieceCodec::new(&public_key, rounds);
    let piece = random_piece();

    let mut by_codec = piece;
    codec.encode(&mut by_codec);
    let mut by_function = piece;
    encode_piece(&mut by_function, codec.key(), rounds);
    assert_eq!(by_codec, by_function);

    codec.decode(&mut by_codec);
    assert_eq!(by_codec, piece);
}

#[test]
fn batch_encode_matches_piece_by_piece() {
    let codec = PieceCodec::new(&[5u8; 48], 2);
    let pieces: Vec<Piece> = (0..4).map(|_| random_piece()).collect();

    let mut batch: Vec<u8> = pieces
        .iter()
        .flat_map(|piece| piece.as_ref().to_vec())
        .collect();
    codec.batch_encode(&mut batch).unwrap();

    for (batch_encoding, piece) in slice(&batch).zip(&pieces) {
        let mut encoding = *piece;
        codec.encode(&mut encoding);
        assert_eq!(batch_encoding, encoding.as_ref());
    }
}

#[test]
fn padding_aligns_and_is_idempotent() {
    let mut rng = thread_rng();
    for _ in 0..8 {
        let length = rng.gen_range(1..3 * PIECE_SIZE);
        let mut data = vec![0u8; length];
        rng.fill_bytes(&mut data);

        let padded = pad(data.clone());
        assert_eq!(padded.len() % PIECE_SIZE, 0);
        assert!(padded.len() >= length);
        assert!(padded.len() < length + PIECE_SIZE);
        assert_eq!(&padded[..length], &data[..]);
        assert!(padded[length..].iter().all(|&byte| byte == 0));

        assert_eq!(pad(padded.clone()), padded);
    }

    let aligned = vec![1u8; 2 * PIECE_SIZE];
    assert_eq!(pad(aligned.clone()), aligned);
}

#[test]
fn slicing_yields_whole_pieces() {
    let mut data = vec![0u8; 5 * PIECE_SIZE];
    thread_rng().fill_bytes(&mut data);

    let pieces: Vec<&[u8]> = slice(&data).collect();
    assert_eq!(pieces.len(), 5);
    for (index, piece) in pieces.iter().enumerate() {
        assert_eq!(*piece, &data[index * PIECE_SIZE..][..PIECE_SIZE]);
    }
}
