use crate::crypto::{blake2b_256_hash, verify_signature, PROOF_SIGNING_CONTEXT};
use crate::{
    jump_consistent_hash, Block, CompactBlock, Content, Piece, Proof, PublicKey, Signature, State,
    Tx, PIECE_SIZE, SIGNATURE_LENGTH,
};
use blst::min_pk::SecretKey;
use rand::{thread_rng, Rng, RngCore};

fn random_hash() -> [u8; 32] {
    let mut hash = [0u8; 32];
    thread_rng().fill_bytes(&mut hash);
    hash
}

fn random_keypair() -> (SecretKey, PublicKey) {
    let mut ikm = [0u8; 32];
    thread_rng().fill_bytes(&mut ikm);
    let secret_key = SecretKey::key_gen(&ikm, &[]).unwrap();
    let public_key = PublicKey::from(secret_key.sk_to_pk().to_bytes());
    (secret_key, public_key)
}

fn random_proof() -> Proof {
    Proof {
        previous_level_hash: random_hash(),
        previous_proof_hash: random_hash(),
        solution: thread_rng().gen(),
        piece_hash: random_hash(),
        piece_state_hash: random_hash(),
        public_key: random_keypair().1,
        signature: Signature::default(),
        piece_merkle_proof: {
            let mut witness = vec![0u8; 3 * 32];
            thread_rng().fill_bytes(&mut witness);
            witness
        },
    }
}

#[test]
fn record_layout_sizes() {
    assert_eq!(Tx::SIZE, 202);
    assert_eq!(State::SIZE, 136);
    assert_eq!(CompactBlock::SIZE, 96);
    assert_eq!(Proof::FIXED_SIZE, 280);
}

#[test]
fn proof_round_trip() {
    let proof = random_proof();
    let bytes = proof.to_bytes();
    assert_eq!(bytes.len(), Proof::FIXED_SIZE + 96);
    assert_eq!(Proof::from_bytes(&bytes).unwrap(), proof);

    // Witness must be present
    assert!(Proof::from_bytes(&bytes[..Proof::FIXED_SIZE]).is_err());
}

#[test]
fn proof_signing_payload_zeroes_signature_only() {
    let mut proof = random_proof();
    proof.signature = Signature::from([0xab; SIGNATURE_LENGTH]);
    let payload = proof.signing_payload();
    let bytes = proof.to_bytes();
    assert_eq!(payload.len(), bytes.len());
    assert_eq!(payload[..Proof::FIXED_SIZE - 96], bytes[..Proof::FIXED_SIZE - 96]);
    assert_eq!(payload[Proof::FIXED_SIZE..], bytes[Proof::FIXED_SIZE..]);
    assert!(payload[Proof::FIXED_SIZE - 96..Proof::FIXED_SIZE]
        .iter()
        .all(|&byte| byte == 0));
}

#[test]
fn proof_signature_verifies_against_zeroed_encoding() {
    let (secret_key, public_key) = random_keypair();
    let mut proof = random_proof();
    proof.public_key = public_key;
    proof.signature = Signature::from(
        secret_key
            .sign(&proof.signing_payload(), PROOF_SIGNING_CONTEXT, &[])
            .to_bytes(),
    );

    assert!(verify_signature(
        &proof.public_key,
        &proof.signature,
        &proof.signing_payload(),
        PROOF_SIGNING_CONTEXT,
    ));

    // Any bit flip in a signed field must invalidate the proof
    proof.piece_hash[0] ^= 1;
    assert!(!verify_signature(
        &proof.public_key,
        &proof.signature,
        &proof.signing_payload(),
        PROOF_SIGNING_CONTEXT,
    ));
}

#[test]
fn tx_round_trip() {
    let (_, receiver) = random_keypair();
    let tx = Tx {
        sender: random_keypair().1,
        receiver,
        amount: 42,
        nonce: 7,
        timestamp: 1_700_000_000,
        signature: Signature::from([3; SIGNATURE_LENGTH]),
    };
    let bytes = tx.to_bytes();
    assert_eq!(bytes.len(), Tx::SIZE);
    assert_eq!(Tx::from_bytes(&bytes).unwrap(), tx);
    assert!(Tx::from_bytes(&bytes[1..]).is_err());

    assert!(!tx.is_coinbase());
    assert!(Tx::coinbase(receiver, 0).is_coinbase());
}

#[test]
fn state_round_trip() {
    let state = State {
        previous_state_hash: random_hash(),
        level_hash: random_hash(),
        piece_root: random_hash(),
        timestamp: 1_700_000_000,
        difficulty: 512,
        version: 1,
        index_piece_hash: random_hash(),
    };
    let bytes = state.to_bytes();
    assert_eq!(bytes.len(), State::SIZE);
    assert_eq!(State::from_bytes(&bytes).unwrap(), state);
    // Timestamp is big-endian at offset 96
    assert_eq!(&bytes[96..100], &1_700_000_000_u32.to_be_bytes());
}

#[test]
fn block_round_trip() {
    let (secret_key, public_key) = random_keypair();
    let coinbase = {
        let mut tx = Tx::coinbase(public_key, 123);
        tx.signature =
            Signature::from(secret_key.sign(&tx.signing_payload(), b"silo_tx", &[]).to_bytes());
        tx
    };
    let proof = random_proof();
    let content = Content {
        parent_content_hash: random_hash(),
        proof_hash: proof.id(),
        tx_ids: vec![coinbase.id(), random_hash()],
    };
    let block = Block {
        previous_block_hash: random_hash(),
        proof,
        content,
        coinbase,
    };

    let decoded = Block::from_bytes(&block.to_bytes()).unwrap();
    assert_eq!(decoded, block);
    assert_eq!(decoded.id(), block.id());

    let compact = block.to_compact();
    assert_eq!(compact.proof_id, block.proof.id());
    assert_eq!(
        CompactBlock::from_bytes(&compact.to_bytes()).unwrap(),
        compact
    );
}

#[test]
fn content_requires_coinbase_id() {
    let content = Content {
        parent_content_hash: random_hash(),
        proof_hash: random_hash(),
        tx_ids: Vec::new(),
    };
    assert!(Content::from_bytes(&content.to_bytes()).is_err());
}

#[test]
fn jump_hash_is_deterministic_and_in_range() {
    for buckets in [1, 2, 16, 255] {
        for _ in 0..100 {
            let key = thread_rng().gen();
            let bucket = jump_consistent_hash(key, buckets);
            assert!(bucket < buckets);
            assert_eq!(bucket, jump_consistent_hash(key, buckets));
        }
    }
}

#[test]
fn jump_hash_spreads_keys() {
    let buckets = 16;
    let mut counts = vec![0u32; buckets as usize];
    for key in 0..16_000_u64 {
        counts[jump_consistent_hash(key, buckets) as usize] += 1;
    }
    // Near-uniform: every chain gets a meaningful share of blocks
    assert!(counts.iter().all(|&count| count > 500));
}

#[test]
fn piece_is_content_addressed() {
    let mut bytes = [0u8; PIECE_SIZE];
    thread_rng().fill_bytes(&mut bytes);
    let piece = Piece::from(bytes);
    assert_eq!(piece.hash(), blake2b_256_hash(&bytes));
    assert!(Piece::try_from(&bytes[..100]).is_err());
}
