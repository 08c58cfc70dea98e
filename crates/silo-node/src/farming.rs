//! The farming process: interruptible by dropping it, waitable via `wait`.

#[cfg(test)]
mod tests;

use crate::network::{Command, Network, NetworkError};
use crate::plotting::PlottingSignals;
use crate::solving;
use async_lock::Mutex as AsyncMutex;
use futures::future::{self, Either};
use silo_core_primitives::crypto::{PROOF_SIGNING_CONTEXT, TX_SIGNING_CONTEXT};
use silo_core_primitives::{Block, Piece, Proof, ProofId, Signature, Tx, BLAKE2B_256_HASH_SIZE};
use silo_farm::{Farm, FarmError, Identity, PieceMetadata};
use silo_ledger::{Ledger, LedgerError, StatePieceSet};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Farming process errors.
#[derive(Debug, thiserror::Error)]
pub enum FarmingError {
    /// Farm failure while reading encodings or plotting.
    #[error("farm: {0}")]
    Farm(#[from] FarmError),
    /// Ledger rejected or failed to apply a produced block.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    /// Transport failure while gossiping.
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// Plotting task dropped its completion signal.
    #[error("plotting of a sealed state never completed")]
    PlottingInterrupted,
    /// Error joining the background task.
    #[error("error joining farming task: {0}")]
    JoinTask(tokio::task::JoinError),
}

/// Everything the farming loop needs; assumes farm, ledger and identities
/// are already initialized, with one identity per plot in plot order.
pub struct FarmingOptions<N> {
    /// Farm holding the plotted pieces.
    pub farm: Arc<Farm>,
    /// Plot identities, in plot order.
    pub identities: Vec<Identity>,
    /// The ledger, shared with network event handlers.
    pub ledger: Arc<AsyncMutex<Ledger>>,
    /// Transport for gossiping produced blocks.
    pub network: Arc<N>,
    /// Plotting completion signals for sealed states.
    pub signals: Arc<PlottingSignals>,
}

impl<N> fmt::Debug for FarmingOptions<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FarmingOptions")
            .field("identities", &self.identities.len())
            .finish_non_exhaustive()
    }
}

/// Handle to the background farming task.
///
/// Stores a channel to stop the task and a handle to wait on it. Dropping
/// the handle stops farming.
pub struct Farming {
    stop_sender: async_oneshot::Sender<()>,
    handle: Option<JoinHandle<Result<(), FarmingError>>>,
}

impl fmt::Debug for Farming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Farming").finish_non_exhaustive()
    }
}

impl Farming {
    /// Start the concurrent background farming task.
    pub fn start<N: Network + 'static>(options: FarmingOptions<N>) -> Self {
        let (stop_sender, stop_receiver) = async_oneshot::oneshot::<()>();

        let handle = tokio::spawn(async move {
            match future::select(Box::pin(farm(options)), stop_receiver).await {
                Either::Left((result, _)) => result,
                // Either the sender was dropped or a stop was requested
                Either::Right(_) => {
                    info!("farming stopped");
                    Ok(())
                }
            }
        });

        Farming {
            stop_sender,
            handle: Some(handle),
        }
    }

    /// Wait for background farming to finish.
    pub async fn wait(mut self) -> Result<(), FarmingError> {
        self.handle
            .take()
            .expect("Handle is only taken in wait, which consumes self; qed")
            .await
            .map_err(FarmingError::JoinTask)?
    }
}

impl Drop for Farming {
    fn drop(&mut self) {
        let _ = self.stop_sender.send(());
    }
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Current time is always after the Unix epoch; qed")
        .as_secs() as u32
}

/// One farming round: derive the challenge, search the plots, and hand a
/// signed block to the ledger.
///
/// Returns the applied block and any states the ledger sealed as a result,
/// or `None` when the farm has nothing plotted.
pub async fn produce_block(
    farm: &Farm,
    identities: &[Identity],
    ledger: &AsyncMutex<Ledger>,
    previous_proof_hash: ProofId,
) -> Result<Option<(Block, Vec<StatePieceSet>)>, FarmingError> {
    let previous_level_hash = ledger.lock().await.previous_level_hash();
    let challenge = solving::derive_challenge(&previous_level_hash, &previous_proof_hash);

    let encodings = match farm.get_closest_encodings(&challenge).await? {
        Some(encodings) => encodings,
        None => {
            return Ok(None);
        }
    };
    let solution = match solving::find_solution(&encodings.encodings, &challenge) {
        Some(solution) => solution,
        None => {
            return Ok(None);
        }
    };
    let identity = identities
        .get(solution.plot_index)
        .expect("One identity per plot; qed");
    debug!(
        plot = solution.plot_index,
        score = solution.score,
        piece_hash = %hex::encode(encodings.piece_hash),
        "solution found"
    );

    let mut proof = Proof {
        previous_level_hash,
        previous_proof_hash,
        solution: solution.chunk,
        piece_hash: encodings.piece_hash,
        piece_state_hash: encodings.metadata.state_hash,
        public_key: identity.public_key(),
        signature: Signature::default(),
        piece_merkle_proof: encodings.metadata.merkle_proof.clone(),
    };
    proof.signature = identity.sign(&proof.signing_payload(), PROOF_SIGNING_CONTEXT);

    let mut coinbase = Tx::coinbase(identity.public_key(), unix_timestamp());
    coinbase.signature = identity.sign(&coinbase.signing_payload(), TX_SIGNING_CONTEXT);

    let mut ledger = ledger.lock().await;
    let block = ledger.create_block(proof, coinbase)?;
    ledger.is_valid_block(&block, &encodings.encodings[solution.plot_index])?;
    let sealed = ledger.apply_block(&block)?;
    info!(block_id = %hex::encode(block.id()), sealed = sealed.len(), "block farmed");

    Ok(Some((block, sealed)))
}

/// Plot a sealed state's piece set into the farm.
async fn plot_state(farm: &Farm, set: StatePieceSet) -> Result<(), FarmError> {
    let state_hash = set.state_hash;
    let pieces: Vec<(Piece, PieceMetadata)> = set
        .pieces
        .into_iter()
        .map(|plottable| {
            (
                plottable.piece,
                PieceMetadata {
                    state_hash,
                    piece_index: plottable.index,
                    merkle_proof: plottable.witness,
                },
            )
        })
        .collect();
    // Coerce to a fn pointer so the mapping is higher-ranked over the borrow
    // lifetime; an inferred closure signature is rejected when this future is
    // held across `tokio::spawn` (rustc #89976).
    let borrow_piece: fn(&(Piece, PieceMetadata)) -> (&Piece, PieceMetadata) =
        |(piece, metadata)| (piece, metadata.clone());
    farm.add_pieces(pieces.iter().map(borrow_piece)).await?;
    info!(state = %hex::encode(state_hash), "sealed state plotted");
    Ok(())
}

/// The farming loop: produce a block, gossip it, plot whatever it sealed,
/// repeat. Finishes when the farm has nothing left to prove.
async fn farm<N: Network>(options: FarmingOptions<N>) -> Result<(), FarmingError> {
    let FarmingOptions {
        farm,
        identities,
        ledger,
        network,
        signals,
    } = options;
    assert_eq!(
        identities.len(),
        farm.plots().len(),
        "farming requires one identity per plot"
    );

    let mut previous_proof_hash: ProofId = [0; BLAKE2B_256_HASH_SIZE];
    loop {
        let (block, sealed) =
            match produce_block(&farm, &identities, &ledger, previous_proof_hash).await? {
                Some(round) => round,
                None => {
                    warn!("no plotted pieces to farm");
                    return Ok(());
                }
            };
        previous_proof_hash = block.proof.id();
        network.gossip(Command::Block, block.to_bytes()).await?;

        // Do not search for the next solution until every sealed state is
        // actually plotted
        for set in sealed {
            plot_sealed(&farm, &signals, set).await?;
        }
    }
}

/// Plot a sealed state's piece set in the background and wait for its
/// completion signal. A failed plot abandons the signal, so the wait
/// resolves to an error instead of continuing over unplotted pieces.
async fn plot_sealed(
    farm: &Arc<Farm>,
    signals: &Arc<PlottingSignals>,
    set: StatePieceSet,
) -> Result<(), FarmingError> {
    let state_hash = set.state_hash;
    let plotted = signals.plotted_receiver(state_hash);

    let plot_farm = Arc::clone(farm);
    let plot_signals = Arc::clone(signals);
    tokio::spawn(async move {
        match plot_state(&plot_farm, set).await {
            Ok(()) => plot_signals.plotted(&state_hash),
            Err(plot_error) => {
                error!(error = %plot_error, "plotting sealed state failed");
                plot_signals.abandoned(&state_hash);
            }
        }
    });

    plotted
        .await
        .map_err(|_| FarmingError::PlottingInterrupted)
}
