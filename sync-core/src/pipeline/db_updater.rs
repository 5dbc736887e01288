//! Database-update batcher (§4.6): the single writer that applies finisher
//! outcomes to the [`crate::index_store::IndexStore`] and publishes the
//! resulting events, so only one task ever mutates a folder's local index.
//!
//! Outcomes are aggregated into batches of up to 1 000 items or 2 seconds,
//! whichever comes first, then committed in finisher-completion order.

use super::FinishOutcome;
use crate::error::CoreError;
use crate::events::{CoreEvent, ItemFinished, ReceivedFile};
use crate::index_store::IndexStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info_span, Instrument};

const MAX_BATCH_SIZE: usize = 1000;
const MAX_BATCH_DELAY: Duration = Duration::from_secs(2);

pub async fn run(
    mut outcomes: mpsc::Receiver<FinishOutcome>,
    store: Arc<dyn IndexStore>,
    events: mpsc::Sender<CoreEvent>,
    folder_errors: Arc<Mutex<HashMap<String, HashMap<String, CoreError>>>>,
) {
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    let mut ticker = interval(MAX_BATCH_DELAY);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick fires immediately; discard it

    loop {
        tokio::select! {
            biased;

            outcome = outcomes.recv() => {
                match outcome {
                    Some(outcome) => {
                        batch.push(outcome);
                        if batch.len() >= MAX_BATCH_SIZE {
                            commit_batch(&mut batch, store.as_ref(), &events, &folder_errors).await;
                            ticker.reset();
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            commit_batch(&mut batch, store.as_ref(), &events, &folder_errors).await;
                        }
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                if !batch.is_empty() {
                    commit_batch(&mut batch, store.as_ref(), &events, &folder_errors).await;
                }
            }
        }
    }
}

async fn commit_batch(
    batch: &mut Vec<FinishOutcome>,
    store: &dyn IndexStore,
    events: &mpsc::Sender<CoreEvent>,
    folder_errors: &Mutex<HashMap<String, HashMap<String, CoreError>>>,
) {
    let span = info_span!("db_update_batch", count = batch.len());
    async {
        let mut last_received: Option<(String, crate::model::FileInfo)> = None;

        for outcome in batch.drain(..) {
            if let Some(reason) = &outcome.error {
                error!(folder = %outcome.folder, name = %outcome.name, reason = %reason, "finisher reported failure");
                let mut errors = folder_errors.lock().await;
                errors
                    .entry(outcome.folder.clone())
                    .or_default()
                    .insert(outcome.name.clone(), CoreError::External(reason.clone()));
            } else {
                // §4.6 step 1: force localVersion to zero so the index store
                // assigns a fresh sequence number on commit rather than
                // trusting whatever sequence the remote side advertised.
                let mut file = outcome.file.clone();
                file.sequence = 0;

                if let Err(e) = store.put_local(&outcome.folder, file.clone()).await {
                    error!(folder = %outcome.folder, name = %outcome.name, error = %e, "failed to persist finished file");
                    continue;
                }
                let mut errors = folder_errors.lock().await;
                errors.entry(outcome.folder.clone()).or_default().remove(&outcome.name);
                drop(errors);

                // §4.6 step 2: only a regular file, symlink or deletion
                // triggers the outgoing fan-out — a non-symlink directory
                // that merely appeared carries nothing peers need to pull.
                let non_symlink_directory = file.is_directory() && !file.is_symlink();
                if !file.is_locally_excluded() && !non_symlink_directory {
                    last_received = Some((outcome.folder.clone(), file));
                }
            }

            let _ = events
                .send(CoreEvent::ItemFinished(ItemFinished {
                    folder: outcome.folder.clone(),
                    name: outcome.name.clone(),
                    error: outcome.error.clone(),
                }))
                .await;
        }

        if let Some((folder, file)) = last_received {
            let _ = events
                .send(CoreEvent::ReceivedFile(ReceivedFile { folder: folder.clone(), file }))
                .await;
            let _ = events.send(CoreEvent::LocalIndexUpdated { folder }).await;
        }
    }
    .instrument(span)
    .await;
}
