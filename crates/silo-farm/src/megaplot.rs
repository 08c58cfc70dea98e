use crate::plot::{PieceOffset, PlotStore};
use crate::FarmError;
use parking_lot::Mutex;
use silo_core_primitives::{Piece, PIECE_SIZE};
use silo_store::ObjectStore;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

// Bounds on the per-offset caches; an incomplete record past the bound is
// force-flushed with a read-modify-write instead of growing the cache.
const WRITE_CACHE_RECORDS: usize = 32;
const READ_CACHE_RECORDS: usize = 32;
const DELETE_CACHE_RECORDS: usize = 1024;

/// Batches writes across all plots sharing an offset into one contiguous
/// record of the underlying store.
///
/// A record is `plot_count` encoded pieces back to back, one slice per
/// plot. Writes park in a bounded per-offset cache and flush only once
/// every plot has supplied its slice for that offset, so readers never
/// observe a record with fewer slices than plots.
pub struct MegaPlot {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ObjectStore>,
    plot_count: usize,
    caches: Mutex<Caches>,
}

#[derive(Default)]
struct Caches {
    writes: BTreeMap<PieceOffset, Vec<Option<Piece>>>,
    reads: BTreeMap<PieceOffset, Vec<u8>>,
    deletes: BTreeSet<PieceOffset>,
}

impl fmt::Debug for MegaPlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MegaPlot")
            .field("plot_count", &self.inner.plot_count)
            .finish_non_exhaustive()
    }
}

impl MegaPlot {
    /// New megaplot over `store` shared by `plot_count` plots.
    pub fn new(store: Arc<dyn ObjectStore>, plot_count: usize) -> Self {
        assert!(plot_count > 0, "megaplot requires at least one plot");

        Self {
            inner: Arc::new(Inner {
                store,
                plot_count,
                caches: Mutex::new(Caches::default()),
            }),
        }
    }

    /// The per-plot store view for `plot_index`.
    pub fn plot_store(&self, plot_index: usize) -> Arc<dyn PlotStore> {
        assert!(plot_index < self.inner.plot_count);

        Arc::new(MegaPlotSlice {
            inner: Arc::clone(&self.inner),
            plot_index,
        })
    }
}

struct MegaPlotSlice {
    inner: Arc<Inner>,
    plot_index: usize,
}

impl fmt::Debug for MegaPlotSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MegaPlotSlice")
            .field("plot_index", &self.plot_index)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn record_key(offset: PieceOffset) -> [u8; 8] {
        offset.to_be_bytes()
    }

    /// Flush the pending record at `offset`, overlaying present slices on
    /// top of whatever the store already holds for slots still missing.
    fn flush(&self, caches: &mut Caches, offset: PieceOffset) -> Result<(), FarmError> {
        let Some(slices) = caches.writes.remove(&offset) else {
            return Ok(());
        };

        let mut record = match self.store.get(&Self::record_key(offset))? {
            Some(existing) => existing,
            None => vec![0u8; self.plot_count * PIECE_SIZE],
        };
        for (plot_index, slice) in slices.into_iter().enumerate() {
            if let Some(piece) = slice {
                record[plot_index * PIECE_SIZE..(plot_index + 1) * PIECE_SIZE]
                    .copy_from_slice(piece.as_ref());
            }
        }
        self.store.put(&Self::record_key(offset), &record)?;

        if caches.reads.len() >= READ_CACHE_RECORDS {
            caches.reads.pop_first();
        }
        caches.reads.insert(offset, record);
        Ok(())
    }
}

impl PlotStore for MegaPlotSlice {
    fn write(&self, offset: PieceOffset, encoding: &Piece) -> Result<(), FarmError> {
        let inner = &*self.inner;
        let mut caches = inner.caches.lock();
        caches.deletes.remove(&offset);
        caches.reads.remove(&offset);

        let slices = caches
            .writes
            .entry(offset)
            .or_insert_with(|| vec![None; inner.plot_count]);
        slices[self.plot_index] = Some(*encoding);

        if slices.iter().all(Option::is_some) {
            trace!(offset, "megaplot record complete, flushing");
            inner.flush(&mut caches, offset)?;
        } else if caches.writes.len() > WRITE_CACHE_RECORDS {
            // Bound the cache by force-flushing the oldest incomplete record
            let oldest = *caches
                .writes
                .keys()
                .next()
                .expect("Write cache was just inserted into; qed");
            inner.flush(&mut caches, oldest)?;
        }
        Ok(())
    }

    fn read(&self, offset: PieceOffset) -> Result<Option<Piece>, FarmError> {
        let inner = &*self.inner;
        let mut caches = inner.caches.lock();

        if caches.deletes.contains(&offset) {
            return Ok(None);
        }
        if let Some(slices) = caches.writes.get(&offset) {
            if let Some(piece) = &slices[self.plot_index] {
                return Ok(Some(*piece));
            }
        }

        let record = match caches.reads.get(&offset) {
            Some(record) => record.clone(),
            None => {
                let Some(record) = inner.store.get(&Inner::record_key(offset))? else {
                    return Ok(None);
                };
                if caches.reads.len() >= READ_CACHE_RECORDS {
                    caches.reads.pop_first();
                }
                caches.reads.insert(offset, record.clone());
                record
            }
        };

        Ok(Some(Piece::try_from(
            &record[self.plot_index * PIECE_SIZE..(self.plot_index + 1) * PIECE_SIZE],
        )?))
    }

    fn delete(&self, offset: PieceOffset) -> Result<(), FarmError> {
        let inner = &*self.inner;
        let mut caches = inner.caches.lock();
        caches.writes.remove(&offset);
        caches.reads.remove(&offset);
        inner.store.del(&Inner::record_key(offset))?;

        if caches.deletes.len() >= DELETE_CACHE_RECORDS {
            caches.deletes.pop_first();
        }
        caches.deletes.insert(offset);
        Ok(())
    }
}
