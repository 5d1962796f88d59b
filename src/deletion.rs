//! Background deletion of links
//!
//! Deletes are accepted right away and processed off the request path. The number of storage calls
//! running at the same time is bounded over all batches.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;

use crate::links::OwnerId;
use crate::storage::Storage;

/// Default number of storage calls running at the same time
pub const DEFAULT_WORKERS: usize = 8;

/// Default number of codes handled by a single storage call
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Pipeline soft-deleting links in the background
#[derive(Clone)]
pub struct DeletionPipeline {
    /// Storage to delete from
    storage: Arc<dyn Storage>,

    /// Permits for the workers, shared by all batches
    workers: Arc<Semaphore>,

    /// Codes per worker
    chunk_size: usize,

    /// All batches still running
    tracker: TaskTracker,
}

impl DeletionPipeline {
    /// Create a pipeline with a bounded amount of workers
    pub fn new(storage: Arc<dyn Storage>, workers: usize, chunk_size: usize) -> Self {
        Self {
            storage,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            chunk_size: chunk_size.max(1),
            tracker: TaskTracker::new(),
        }
    }

    /// Submit a batch of codes to soft-delete for an owner
    ///
    /// Returns immediately. Codes of other owners are skipped by the storage. Failures are logged
    /// and never reach the caller. Dropping the handle does not cancel the batch.
    pub fn submit(&self, codes: Vec<String>, owner_id: OwnerId) -> JoinHandle<()> {
        let mut seen = HashSet::new();
        let codes = codes
            .into_iter()
            .filter(|code| seen.insert(code.clone()))
            .collect::<Vec<String>>();

        let storage = Arc::clone(&self.storage);
        let workers = Arc::clone(&self.workers);
        let chunk_size = self.chunk_size;

        self.tracker.spawn(async move {
            tracing::debug!("Deleting {} links of owner {owner_id}", codes.len());

            let mut tasks = JoinSet::new();

            for chunk in codes.chunks(chunk_size) {
                let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
                    tracing::error!("Deletion workers are gone, dropping the rest of the batch");
                    break;
                };

                let storage = Arc::clone(&storage);
                let chunk = chunk.to_vec();

                tasks.spawn(async move {
                    let _permit = permit;

                    match storage.delete_links(&chunk, owner_id).await {
                        Ok(deleted) => {
                            tracing::debug!("Deleted {deleted} of {} links", chunk.len());
                        }
                        Err(err) => {
                            tracing::error!("Could not delete links {chunk:?}: {err}");
                        }
                    }
                });
            }

            while let Some(result) = tasks.join_next().await {
                if let Err(err) = result {
                    tracing::error!("Deletion worker failed: {err}");
                }
            }
        })
    }

    /// Wait for every submitted batch to finish
    pub async fn shutdown(&self) {
        self.tracker.close();

        if !self.tracker.is_empty() {
            tracing::info!("Waiting for {} deletion batches", self.tracker.len());
        }

        self.tracker.wait().await;
    }
}
