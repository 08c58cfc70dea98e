use crate::FarmError;
use silo_codec::PieceCodec;
use silo_core_primitives::{Piece, PublicKey};
use silo_store::ObjectStore;
use std::fmt;
use std::sync::Arc;

/// Index of a piece slot within every plot of a farm.
pub type PieceOffset = u64;

/// Pluggable byte-offset store underneath a plot.
///
/// Backends address whole encoded pieces by slot offset. Any
/// [`ObjectStore`] qualifies, keyed by the big-endian offset, which covers
/// the in-memory, pre-sized file and embedded engine backends; the batched
/// megaplot provides its own implementation.
pub trait PlotStore: Send + Sync + fmt::Debug {
    /// Write one encoded piece at `offset`.
    fn write(&self, offset: PieceOffset, encoding: &Piece) -> Result<(), FarmError>;

    /// Read the encoded piece at `offset`, `None` when the slot is empty.
    fn read(&self, offset: PieceOffset) -> Result<Option<Piece>, FarmError>;

    /// Delete the encoded piece at `offset`; empty slots are a no-op.
    fn delete(&self, offset: PieceOffset) -> Result<(), FarmError>;
}

impl<S> PlotStore for S
where
    S: ObjectStore,
{
    fn write(&self, offset: PieceOffset, encoding: &Piece) -> Result<(), FarmError> {
        Ok(self.put(&offset.to_be_bytes(), encoding.as_ref())?)
    }

    fn read(&self, offset: PieceOffset) -> Result<Option<Piece>, FarmError> {
        self.get(&offset.to_be_bytes())?
            .map(|bytes| Piece::try_from(bytes.as_slice()).map_err(FarmError::from))
            .transpose()
    }

    fn delete(&self, offset: PieceOffset) -> Result<(), FarmError> {
        Ok(self.del(&offset.to_be_bytes())?)
    }
}

/// One farmer-identity-keyed store of encoded pieces.
///
/// The plot owns the codec bound to its identity: pieces go in encoded
/// under the identity's key hash and come out decoded on demand.
#[derive(Debug, Clone)]
pub struct Plot {
    public_key: PublicKey,
    codec: PieceCodec,
    store: Arc<dyn PlotStore>,
}

impl Plot {
    /// New plot for `public_key` over the given store, encoding with
    /// `rounds` cipher rounds.
    pub fn new(public_key: PublicKey, store: Arc<dyn PlotStore>, rounds: usize) -> Self {
        Self {
            public_key,
            codec: PieceCodec::new(&public_key, rounds),
            store,
        }
    }

    /// Identity this plot belongs to.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The plot's encoding address: the hash of its identity key.
    pub fn address(&self) -> &silo_core_primitives::Blake2b256Hash {
        self.codec.key()
    }

    /// Encode `piece` under this plot's identity and write it at `offset`.
    pub fn write_piece(&self, offset: PieceOffset, piece: &Piece) -> Result<(), FarmError> {
        let mut encoding = *piece;
        self.codec.encode(&mut encoding);
        self.store.write(offset, &encoding)
    }

    /// Raw encoding at `offset`.
    pub fn read_encoding(&self, offset: PieceOffset) -> Result<Option<Piece>, FarmError> {
        self.store.read(offset)
    }

    /// Decoded piece at `offset`.
    pub fn read_piece(&self, offset: PieceOffset) -> Result<Option<Piece>, FarmError> {
        Ok(self.store.read(offset)?.map(|mut encoding| {
            self.codec.decode(&mut encoding);
            encoding
        }))
    }

    /// Delete the slot at `offset`.
    pub fn delete(&self, offset: PieceOffset) -> Result<(), FarmError> {
        self.store.delete(offset)
    }
}
