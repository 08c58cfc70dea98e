
use crate::state::{seal_state, StatePieceSet};
use crate::LedgerError;
use silo_codec::decode_piece;
use silo_codec::merkle_tree::Witness;
use silo_core_primitives::crypto::{
    blake2b_256_hash_list, verify_signature, PROOF_SIGNING_CONTEXT, TX_SIGNING_CONTEXT,
};
use silo_core_primitives::{
    jump_consistent_hash, Blake2b256Hash, Block, BlockId, CompactBlock, Content, ContentId, Piece,
    Proof, ProofId, PublicKey, State, StateHash, Tx, TxId, BLAKE2B_256_HASH_SIZE, CHUNK_SIZE,
    COINBASE_REWARD, PIECES_PER_STATE, STATE_DATA_SIZE,
};
use silo_store::ObjectStore;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const ZERO_HASH: Blake2b256Hash = [0; BLAKE2B_256_HASH_SIZE];

/// Key prefixes for records in the durable store.
mod key_tag {
    pub(super) const PROOF: u8 = 0;
    pub(super) const CONTENT: u8 = 1;
    pub(super) const TX: u8 = 2;
    pub(super) const STATE: u8 = 3;
    pub(super) const BLOCK: u8 = 4;
}

fn storage_key(tag: u8, id: &Blake2b256Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + BLAKE2B_256_HASH_SIZE);
    key.push(tag);
    key.extend_from_slice(id);
    key
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Current time is always after the Unix epoch; qed")
        .as_secs() as u32
}

/// Ledger construction parameters, fixed for the ledger's lifetime.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Number of parallel chains; block-to-chain assignment jump-hashes
    /// over this count.
    pub chain_count: u32,
    /// Cipher rounds every farmer encodes pieces with; proof-of-storage
    /// validation decodes with the same count.
    pub encoding_rounds: usize,
    /// Keep confirmed blocks, proofs, contents and txs in memory after
    /// level confirmation. When off, lookups fall back to the durable
    /// store.
    pub retain_history: bool,
    /// Difficulty recorded in sealed states.
    pub difficulty: u16,
    /// Protocol version recorded in sealed states.
    pub version: u16,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain_count: 16,
            encoding_rounds: 3,
            retain_history: true,
            difficulty: 1,
            version: 1,
        }
    }
}

#[derive(Debug, Default)]
struct Chain {
    block_ids: Vec<BlockId>,
    /// Blocks applied since the last level confirmation.
    pending_block_ids: Vec<BlockId>,
}

impl Chain {
    fn head(&self) -> Option<BlockId> {
        self.block_ids.last().copied()
    }
}

/// The ledger state machine.
///
/// Owns the chains, account balances, pending transactions and the
/// proof/content/tx/state maps. All mutation goes through `&mut self`; the
/// struct is single-writer and does no internal locking.
#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    chains: Vec<Chain>,
    /// Valid but unconfirmed transactions, ordered by id for deterministic
    /// block contents.
    pending_txs: BTreeMap<TxId, Tx>,
    accounts: HashMap<PublicKey, u64>,
    proofs: HashMap<ProofId, Proof>,
    contents: HashMap<ContentId, Content>,
    txs: HashMap<TxId, Tx>,
    states: HashMap<StateHash, State>,
    state_order: Vec<StateHash>,
    compact_blocks: HashMap<BlockId, CompactBlock>,
    /// Chains still owing a block before the next level can confirm.
    pending_chains: HashSet<u32>,
    previous_level_hash: Blake2b256Hash,
    last_state_hash: StateHash,
    confirmed_levels: u64,
    /// Confirmed level data awaiting the state-sealing threshold.
    pending_state_bytes: Vec<u8>,
    durable: Arc<dyn ObjectStore>,
}

impl Ledger {
    /// New empty ledger over `config.chain_count` chains, with confirmed
    /// records mirrored to `durable`.
    pub fn new(config: LedgerConfig, durable: Arc<dyn ObjectStore>) -> Self {
        assert!(config.chain_count > 0, "ledger requires at least one chain");
        info!(chains = config.chain_count, "ledger initialized");

        Self {
            chains: (0..config.chain_count).map(|_| Chain::default()).collect(),
            pending_chains: (0..config.chain_count).collect(),
            config,
            pending_txs: BTreeMap::new(),
            accounts: HashMap::new(),
            proofs: HashMap::new(),
            contents: HashMap::new(),
            txs: HashMap::new(),
            states: HashMap::new(),
            state_order: Vec::new(),
            compact_blocks: HashMap::new(),
            previous_level_hash: ZERO_HASH,
            last_state_hash: ZERO_HASH,
            confirmed_levels: 0,
            pending_state_bytes: Vec::new(),
            durable,
        }
    }

    /// Number of parallel chains.
    pub fn chain_count(&self) -> u32 {
        self.config.chain_count
    }

    /// Chain a proof's block belongs to.
    pub fn chain_index(&self, proof_id: &ProofId) -> u32 {
        let key = u64::from_be_bytes(
            proof_id[..8]
                .try_into()
                .expect("Hash is longer than 8 bytes; qed"),
        );
        jump_consistent_hash(key, self.config.chain_count)
    }

    /// Block id at the head of `chain`, `None` while the chain is empty.
    pub fn head(&self, chain: u32) -> Option<BlockId> {
        self.chains[chain as usize].head()
    }

    /// Balance of `address`, zero for unknown accounts.
    pub fn balance(&self, address: &PublicKey) -> u64 {
        self.accounts.get(address).copied().unwrap_or(0)
    }

    /// Hash of the last confirmed level, the current challenge seed. Zero
    /// before the first confirmation.
    pub fn previous_level_hash(&self) -> Blake2b256Hash {
        self.previous_level_hash
    }

    /// Id of the last sealed state, zero before the first state.
    pub fn last_state_hash(&self) -> StateHash {
        self.last_state_hash
    }

    /// Number of confirmed levels.
    pub fn confirmed_levels(&self) -> u64 {
        self.confirmed_levels
    }

    /// Bytes of confirmed level data accumulated towards the next state.
    pub fn pending_state_len(&self) -> usize {
        self.pending_state_bytes.len()
    }

    /// Build a block extending the chain that `proof` shards to.
    ///
    /// The parent content and previous block hashes come from the chain's
    /// head, or are zero for the chain's first block. The content lists the
    /// coinbase first, then every pending transaction.
    pub fn create_block(&self, proof: Proof, coinbase: Tx) -> Result<Block, LedgerError> {
        let proof_id = proof.id();
        let chain = self.chain_index(&proof_id);
        let (previous_block_hash, parent_content_hash) = match self.chains[chain as usize].head() {
            Some(block_id) => {
                let compact = self
                    .get_block(&block_id)?
                    .expect("Chain heads are always durably recorded; qed");
                (block_id, compact.content_id)
            }
            None => (ZERO_HASH, ZERO_HASH),
        };

        let mut tx_ids = Vec::with_capacity(1 + self.pending_txs.len());
        tx_ids.push(coinbase.id());
        tx_ids.extend(self.pending_txs.keys().copied());

        Ok(Block {
            previous_block_hash,
            proof,
            content: Content {
                parent_content_hash,
                proof_hash: proof_id,
                tx_ids,
            },
            coinbase,
        })
    }

    /// Validate `block` against the current ledger state.
    ///
    /// `encoding` is the raw plot encoding the block's solution was found
    /// in. Checks run in sequence and the first failure is returned; a
    /// failure rejects only this block and never touches applied state.
    pub fn is_valid_block(&self, block: &Block, encoding: &Piece) -> Result<(), LedgerError> {
        let proof = &block.proof;
        let proof_id = proof.id();

        // Structural checks
        if block.content.proof_hash != proof_id {
            return Err(LedgerError::InvalidBlock("content references another proof"));
        }
        match block.content.tx_ids.first() {
            Some(first) if *first == block.coinbase.id() => {}
            _ => {
                return Err(LedgerError::InvalidBlock("coinbase is not the first tx"));
            }
        }
        if !block.coinbase.is_coinbase() {
            return Err(LedgerError::InvalidBlock("coinbase has a non-zero sender"));
        }
        if !verify_signature(
            &proof.public_key,
            &proof.signature,
            &proof.signing_payload(),
            PROOF_SIGNING_CONTEXT,
        ) {
            return Err(LedgerError::InvalidProof("signature does not verify"));
        }

        // The proof must answer the current challenge seed
        if proof.previous_level_hash != self.previous_level_hash {
            return Err(LedgerError::InvalidBlock(
                "previous level is not the last confirmed level",
            ));
        }

        let chain = self.chain_index(&proof_id);
        let chain_head = self.chains[chain as usize].head();

        // Chain continuity: the previous proof must be known, or zero for
        // the first block of a chain
        if proof.previous_proof_hash == ZERO_HASH {
            if chain_head.is_some() {
                return Err(LedgerError::InvalidBlock(
                    "zero previous proof on a non-empty chain",
                ));
            }
        } else if self.get_proof(&proof.previous_proof_hash)?.is_none() {
            return Err(LedgerError::InvalidBlock("unknown previous proof"));
        }

        // The solution must be a chunk of the encoding
        if !encoding
            .chunks_exact(CHUNK_SIZE)
            .any(|chunk| chunk == proof.solution.as_slice())
        {
            return Err(LedgerError::InvalidProof("solution is not in the encoding"));
        }

        // Piece inclusion under the referenced state. Skipped only before
        // the first level, when previous level and previous proof are both
        // zero and no state exists yet.
        if proof.previous_level_hash != proof.previous_proof_hash {
            let state = self
                .get_state(&proof.piece_state_hash)?
                .ok_or(LedgerError::InvalidBlock("unknown piece state"))?;
            let witness = Witness::new(Cow::Borrowed(proof.piece_merkle_proof.as_slice()))
                .map_err(|_| LedgerError::InvalidProof("malformed merkle proof"))?;
            // The proof does not carry the piece's set position, scan the
            // set for one that verifies
            let included = (0..PIECES_PER_STATE as u32)
                .any(|position| witness.is_valid(state.piece_root, position, proof.piece_hash));
            if !included {
                return Err(LedgerError::InvalidProof(
                    "merkle proof does not verify against the state piece root",
                ));
            }
        }

        // Proof of storage: the encoding must decode to the claimed piece
        // under the farmer's own key
        let mut decoded = *encoding;
        decode_piece(
            &mut decoded,
            &proof.public_key.hash(),
            self.config.encoding_rounds,
        );
        if decoded.hash() != proof.piece_hash {
            return Err(LedgerError::InvalidProof(
                "encoding does not decode to the claimed piece",
            ));
        }

        // Parent block and content must resolve to this chain's head
        match chain_head {
            Some(head_id) => {
                let head = self
                    .get_block(&head_id)?
                    .expect("Chain heads are always durably recorded; qed");
                if block.content.parent_content_hash != head.content_id {
                    return Err(LedgerError::InvalidBlock(
                        "parent content is not the chain head",
                    ));
                }
                if block.previous_block_hash != head_id {
                    return Err(LedgerError::InvalidBlock(
                        "previous block is not the chain head",
                    ));
                }
            }
            None => {
                if block.content.parent_content_hash != ZERO_HASH
                    || block.previous_block_hash != ZERO_HASH
                {
                    return Err(LedgerError::InvalidBlock(
                        "first block of a chain must have zero parents",
                    ));
                }
            }
        }

        // Coinbase and every referenced transaction must be valid
        self.is_valid_tx(&block.coinbase)?;
        for tx_id in &block.content.tx_ids[1..] {
            let tx = match self.pending_txs.get(tx_id) {
                Some(tx) => *tx,
                None => self
                    .get_tx(tx_id)?
                    .ok_or(LedgerError::InvalidBlock("referenced tx is unknown"))?,
            };
            self.is_valid_tx(&tx)?;
        }

        Ok(())
    }

    /// Validate a transaction against the current account state.
    pub fn is_valid_tx(&self, tx: &Tx) -> Result<(), LedgerError> {
        if tx.is_coinbase() {
            if tx.amount != COINBASE_REWARD {
                return Err(LedgerError::InvalidTx("coinbase amount is not the reward"));
            }
            // Coinbase rewards are signed by the receiving farmer
            if !verify_signature(
                &tx.receiver,
                &tx.signature,
                &tx.signing_payload(),
                TX_SIGNING_CONTEXT,
            ) {
                return Err(LedgerError::InvalidTx("coinbase signature does not verify"));
            }
            return Ok(());
        }

        if !verify_signature(
            &tx.sender,
            &tx.signature,
            &tx.signing_payload(),
            TX_SIGNING_CONTEXT,
        ) {
            return Err(LedgerError::InvalidTx("signature does not verify"));
        }
        if self.balance(&tx.sender) < u64::from(tx.amount) {
            return Err(LedgerError::InvalidTx("insufficient balance"));
        }
        Ok(())
    }

    /// Validate and queue a transaction for inclusion in the next block.
    pub fn insert_pending_tx(&mut self, tx: Tx) -> Result<TxId, LedgerError> {
        self.is_valid_tx(&tx)?;
        let tx_id = tx.id();
        self.pending_txs.insert(tx_id, tx);
        debug!(tx_id = %hex::encode(tx_id), "tx queued");
        Ok(tx_id)
    }

    /// Apply a pre-validated block.
    ///
    /// Appends to the proof's chain, records the block's parts, applies the
    /// coinbase and all still-pending referenced transactions, and marks
    /// the chain as having produced this round. When every chain has
    /// produced, the round's blocks confirm into a level; any states sealed
    /// as a result are returned for the farm to plot.
    pub fn apply_block(&mut self, block: &Block) -> Result<Vec<StatePieceSet>, LedgerError> {
        let block_id = block.id();
        let proof_id = block.proof.id();
        let chain = self.chain_index(&proof_id);
        let compact = block.to_compact();

        self.durable
            .put(&storage_key(key_tag::BLOCK, &block_id), &compact.to_bytes())?;
        self.durable
            .put(&storage_key(key_tag::PROOF, &proof_id), &block.proof.to_bytes())?;
        self.durable.put(
            &storage_key(key_tag::CONTENT, &compact.content_id),
            &block.content.to_bytes(),
        )?;
        self.durable.put(
            &storage_key(key_tag::TX, &compact.coinbase_id),
            &block.coinbase.to_bytes(),
        )?;
        self.compact_blocks.insert(block_id, compact);
        self.proofs.insert(proof_id, block.proof.clone());
        self.contents.insert(compact.content_id, block.content.clone());
        self.txs.insert(compact.coinbase_id, block.coinbase);

        self.apply_tx(&block.coinbase);
        for tx_id in block.content.tx_ids.iter().skip(1) {
            // A tx already confirmed by an earlier block is not reapplied
            if let Some(tx) = self.pending_txs.remove(tx_id) {
                self.durable
                    .put(&storage_key(key_tag::TX, tx_id), &tx.to_bytes())?;
                self.txs.insert(*tx_id, tx);
                self.apply_tx(&tx);
            }
        }

        let chain_state = &mut self.chains[chain as usize];
        chain_state.block_ids.push(block_id);
        chain_state.pending_block_ids.push(block_id);
        self.pending_chains.remove(&chain);
        debug!(chain, block_id = %hex::encode(block_id), "block applied");

        let mut sealed = Vec::new();
        if self.pending_chains.is_empty() {
            self.create_level()?;
            while self.pending_state_bytes.len() >= STATE_DATA_SIZE {
                sealed.push(self.create_state()?);
            }
        }
        Ok(sealed)
    }

    /// Confirm the round's blocks into a level.
    ///
    /// Every chain has contributed at least one block. The level's proof
    /// and content bytes are length-prefixed and concatenated, followed by
    /// the round's unique transactions; the whole blob joins the pending
    /// state data. The hash over all proof ids becomes the next challenge
    /// seed.
    fn create_level(&mut self) -> Result<(), LedgerError> {
        let pending: Vec<BlockId> = self
            .chains
            .iter_mut()
            .flat_map(|chain| chain.pending_block_ids.drain(..))
            .collect();

        let mut proof_ids = Vec::with_capacity(pending.len());
        let mut level_bytes = Vec::new();
        let mut tx_ids = BTreeSet::new();
        for block_id in &pending {
            let compact = self
                .compact_blocks
                .get(block_id)
                .expect("Blocks of an unconfirmed round are always in memory; qed");
            let proof = self
                .proofs
                .get(&compact.proof_id)
                .expect("Blocks of an unconfirmed round are always in memory; qed");
            let content = self
                .contents
                .get(&compact.content_id)
                .expect("Blocks of an unconfirmed round are always in memory; qed");

            proof_ids.push(compact.proof_id);
            let proof_bytes = proof.to_bytes();
            level_bytes.extend_from_slice(&(proof_bytes.len() as u16).to_be_bytes());
            level_bytes.extend_from_slice(&proof_bytes);
            let content_bytes = content.to_bytes();
            level_bytes.extend_from_slice(&(content_bytes.len() as u16).to_be_bytes());
            level_bytes.extend_from_slice(&content_bytes);
            tx_ids.extend(content.tx_ids.iter().copied());
        }
        for tx_id in &tx_ids {
            let tx = self
                .get_tx(tx_id)?
                .expect("Confirmed txs are always recorded; qed");
            level_bytes.extend_from_slice(&tx.to_bytes());
        }

        let proof_id_refs: Vec<&[u8]> = proof_ids.iter().map(|id| id.as_slice()).collect();
        self.previous_level_hash = blake2b_256_hash_list(&proof_id_refs);
        self.confirmed_levels += 1;

        self.pending_state_bytes
            .extend_from_slice(&(level_bytes.len() as u32).to_be_bytes());
        self.pending_state_bytes.extend_from_slice(&level_bytes);

        self.pending_chains = (0..self.config.chain_count).collect();

        if !self.config.retain_history {
            self.compact_blocks.clear();
            self.proofs.clear();
            self.contents.clear();
            self.txs.clear();
        }

        info!(
            level = self.confirmed_levels,
            blocks = pending.len(),
            pending_state_bytes = self.pending_state_bytes.len(),
            "level confirmed"
        );
        Ok(())
    }

    /// Seal the oldest [`STATE_DATA_SIZE`] bytes of confirmed level data
    /// into a state and its canonical piece set.
    fn create_state(&mut self) -> Result<StatePieceSet, LedgerError> {
        let level_data: Vec<u8> = self.pending_state_bytes.drain(..STATE_DATA_SIZE).collect();
        let set = seal_state(
            &level_data,
            self.last_state_hash,
            self.previous_level_hash,
            unix_timestamp(),
            self.config.difficulty,
            self.config.version,
        )?;

        self.durable.put(
            &storage_key(key_tag::STATE, &set.state_hash),
            &set.state.to_bytes(),
        )?;
        self.states.insert(set.state_hash, set.state);
        self.state_order.push(set.state_hash);
        self.last_state_hash = set.state_hash;

        info!(
            state = %hex::encode(set.state_hash),
            index = self.state_order.len() - 1,
            "state sealed"
        );
        Ok(set)
    }

    /// Account mutation for one pre-validated transaction; never fails.
    fn apply_tx(&mut self, tx: &Tx) {
        if !tx.is_coinbase() {
            // Balance coverage was validated before the tx was accepted
            let sender_balance = self.accounts.entry(tx.sender).or_default();
            *sender_balance -= u64::from(tx.amount);
        }
        *self.accounts.entry(tx.receiver).or_default() += u64::from(tx.amount);
    }

    /// Proof by id, from memory or the durable store.
    pub fn get_proof(&self, proof_id: &ProofId) -> Result<Option<Proof>, LedgerError> {
        if let Some(proof) = self.proofs.get(proof_id) {
            return Ok(Some(proof.clone()));
        }
        match self.durable.get(&storage_key(key_tag::PROOF, proof_id))? {
            Some(bytes) => Ok(Some(Proof::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Content by id, from memory or the durable store.
    pub fn get_content(&self, content_id: &ContentId) -> Result<Option<Content>, LedgerError> {
        if let Some(content) = self.contents.get(content_id) {
            return Ok(Some(content.clone()));
        }
        match self.durable.get(&storage_key(key_tag::CONTENT, content_id))? {
            Some(bytes) => Ok(Some(Content::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Transaction by id, from memory or the durable store.
    pub fn get_tx(&self, tx_id: &TxId) -> Result<Option<Tx>, LedgerError> {
        if let Some(tx) = self.txs.get(tx_id) {
            return Ok(Some(*tx));
        }
        match self.durable.get(&storage_key(key_tag::TX, tx_id))? {
            Some(bytes) => Ok(Some(Tx::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Compact block by id, from memory or the durable store.
    pub fn get_block(&self, block_id: &BlockId) -> Result<Option<CompactBlock>, LedgerError> {
        if let Some(compact) = self.compact_blocks.get(block_id) {
            return Ok(Some(*compact));
        }
        match self.durable.get(&storage_key(key_tag::BLOCK, block_id))? {
            Some(bytes) => Ok(Some(CompactBlock::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// State by id, from memory or the durable store.
    pub fn get_state(&self, state_hash: &StateHash) -> Result<Option<State>, LedgerError> {
        if let Some(state) = self.states.get(state_hash) {
            return Ok(Some(*state));
        }
        match self.durable.get(&storage_key(key_tag::STATE, state_hash))? {
            Some(bytes) => Ok(Some(State::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// State by sealing order, zero-based.
    pub fn get_state_by_index(&self, index: usize) -> Result<Option<State>, LedgerError> {
        match self.state_order.get(index) {
            Some(state_hash) => self.get_state(state_hash),
            None => Ok(None),
        }
    }
}
