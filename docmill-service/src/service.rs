//! Service coordinator.
//!
//! `DocmillService` ties the persistence layer, storage backend, content
//! extractor, inference client, and work queue together. Impl blocks are
//! split per concern: intake (`enqueue`), the pipeline state machine
//! (`processing`), document management (`crud`), and the reconciliation
//! sweeper (`sweeper`).

mod crud;
mod enqueue;
mod processing;
mod sweeper;

pub use sweeper::SweepReport;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServiceConfig;
use crate::db::Database;
use crate::extraction::ContentExtractor;
use crate::inference::InferenceClient;
use crate::notify::StatusNotifier;
use crate::queue::PriorityWorkQueue;
use crate::storage::StorageBackend;

/// Main service coordinator
pub struct DocmillService {
    pub config: Arc<ServiceConfig>,
    pub db: Arc<Database>,
    pub storage: Arc<StorageBackend>,
    pub inference: Arc<InferenceClient>,
    pub extractor: ContentExtractor,
    pub queue: PriorityWorkQueue,
    pub notifier: StatusNotifier,
}

impl DocmillService {
    pub fn new(
        config: Arc<ServiceConfig>,
        db: Arc<Database>,
        storage: Arc<StorageBackend>,
        inference: Arc<InferenceClient>,
    ) -> Self {
        info!("Initializing docmill service");

        Self {
            config,
            db,
            storage,
            inference,
            extractor: ContentExtractor::new(),
            queue: PriorityWorkQueue::new(),
            notifier: StatusNotifier::new(),
        }
    }

    /// Start the pipeline worker pool.
    pub fn start_workers(&self) -> Vec<JoinHandle<()>> {
        let count = self.config.pipeline.worker_count;
        info!(count, "Starting pipeline workers");
        self.queue.spawn_workers(count)
    }

    /// Stop accepting queue work.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
