//! Network transport contract consumed by the consensus loop.
//!
//! The transport itself is a collaborator; the core only needs one-way
//! sends, request/response exchanges and gossip broadcast, each tagged
//! with a command. Delivery is at-most-once and unordered.

use async_trait::async_trait;
use parking_lot::Mutex;
use silo_core_primitives::crypto::blake2b_256_hash;
use silo_core_primitives::Blake2b256Hash;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Command tag of a network message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Gossip of a newly created block.
    Block = 0,
    /// Gossip of a new transaction.
    Tx = 1,
    /// Request for a piece by hash.
    PieceRequest = 2,
    /// Request for a state by index.
    StateRequest = 3,
}

/// Transport failure, propagated without retry.
#[derive(Debug, Error)]
#[error("network: {0}")]
pub struct NetworkError(#[from] pub Box<dyn std::error::Error + Send + Sync>);

/// The transport operations the consensus loop is written against.
#[async_trait]
pub trait Network: Send + Sync {
    /// One-way send to an implementation-chosen peer.
    async fn send(&self, command: Command, payload: Vec<u8>) -> Result<(), NetworkError>;

    /// Request/response exchange with an implementation-chosen peer.
    async fn request(&self, command: Command, payload: Vec<u8>) -> Result<Vec<u8>, NetworkError>;

    /// Broadcast to all known peers.
    async fn gossip(&self, command: Command, payload: Vec<u8>) -> Result<(), NetworkError>;
}

const GOSSIP_CACHE_ENTRIES: usize = 1 << 16;

/// Seen-message tracking for gossip.
///
/// Transports consult this before re-gossiping so an already-seen payload
/// is delivered at most once and never echoed back to its source. Bounded;
/// the oldest entries are forgotten first.
#[derive(Debug, Default)]
pub struct GossipCache {
    inner: Mutex<GossipCacheInner>,
}

#[derive(Debug, Default)]
struct GossipCacheInner {
    seen: HashSet<Blake2b256Hash>,
    order: VecDeque<Blake2b256Hash>,
}

impl GossipCache {
    /// New empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `payload` as seen; `true` when it was fresh.
    pub fn observe(&self, payload: &[u8]) -> bool {
        let hash = blake2b_256_hash(payload);
        let mut inner = self.inner.lock();
        if !inner.seen.insert(hash) {
            return false;
        }
        inner.order.push_back(hash);
        if inner.order.len() > GOSSIP_CACHE_ENTRIES {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        true
    }

    /// Whether `payload` has been seen, without recording it.
    pub fn is_seen(&self, payload: &[u8]) -> bool {
        self.inner.lock().seen.contains(&blake2b_256_hash(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gossip_cache_suppresses_redelivery() {
        let cache = GossipCache::new();
        assert!(!cache.is_seen(b"block"));
        assert!(cache.observe(b"block"));
        assert!(!cache.observe(b"block"));
        assert!(cache.is_seen(b"block"));
        assert!(cache.observe(b"other block"));
    }
}
