//! Periodic cycle scheduling with backoff.
//!
//! The orchestrator knows nothing about time; this module decides when the
//! next cycle of each collection runs. Cycles themselves are blocking and run
//! on tokio's blocking pool.

use crate::applier::Applier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::state::CycleReport;
use crate::transport::FetchClient;
use rollsync_model::Collection;
use rollsync_store::CursorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Returns how long to wait before the next cycle, or `None` if the
/// collection must stop syncing.
///
/// `failures` is the collection's consecutive failure count after the cycle.
pub fn next_delay(
    result: &SyncResult<CycleReport>,
    config: &SyncConfig,
    failures: u32,
) -> Option<Duration> {
    match result {
        Ok(_) | Err(SyncError::Cancelled) => Some(config.sync_interval),
        // Someone else is running this collection; its failure count is not ours.
        Err(SyncError::CycleInProgress(_)) => Some(config.retry.initial_delay),
        Err(e) if !e.is_retryable() => None,
        Err(_) => Some(config.retry.delay_for_attempt(failures.max(1))),
    }
}

/// Spawns the per-collection sync loops.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Starts one task per collection on the current tokio runtime.
    ///
    /// Each task runs a cycle, then sleeps [`SyncConfig::sync_interval`]
    /// after a success or the retry backoff after a retryable failure. A
    /// non-retryable failure ends that collection's task with the error.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F, C, A>(orchestrator: Arc<SyncOrchestrator<F, C, A>>) -> SchedulerHandle<F, C, A>
    where
        F: FetchClient + 'static,
        C: CursorStore + 'static,
        A: Applier + 'static,
    {
        let (shutdown, receiver) = watch::channel(false);
        let tasks = Collection::ALL
            .iter()
            .map(|&collection| {
                let task = tokio::spawn(run_collection(
                    Arc::clone(&orchestrator),
                    collection,
                    receiver.clone(),
                ));
                (collection, task)
            })
            .collect();

        info!("sync scheduler started");
        SchedulerHandle {
            orchestrator,
            shutdown,
            tasks,
        }
    }
}

/// Handle to running sync loops.
pub struct SchedulerHandle<F: FetchClient, C: CursorStore, A: Applier> {
    orchestrator: Arc<SyncOrchestrator<F, C, A>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(Collection, JoinHandle<SyncResult<()>>)>,
}

impl<F, C, A> SchedulerHandle<F, C, A>
where
    F: FetchClient + 'static,
    C: CursorStore + 'static,
    A: Applier + 'static,
{
    /// Returns true once every collection's task has ended.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|(_, task)| task.is_finished())
    }

    /// Stops both loops, cancelling in-flight cycles, and waits for them.
    pub async fn shutdown(self) -> Vec<(Collection, SyncResult<()>)> {
        info!("stopping sync scheduler");
        // Receivers may already be gone if both tasks stopped on their own.
        let _ = self.shutdown.send(true);
        self.orchestrator.cancel_all();
        self.join().await
    }

    /// Waits for both loops to end on their own.
    pub async fn join(self) -> Vec<(Collection, SyncResult<()>)> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for (collection, task) in self.tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Err(SyncError::Cancelled),
            };
            results.push((collection, result));
        }
        results
    }
}

async fn run_collection<F, C, A>(
    orchestrator: Arc<SyncOrchestrator<F, C, A>>,
    collection: Collection,
    mut shutdown: watch::Receiver<bool>,
) -> SyncResult<()>
where
    F: FetchClient + 'static,
    C: CursorStore + 'static,
    A: Applier + 'static,
{
    loop {
        if *shutdown.borrow() {
            break;
        }

        let orch = Arc::clone(&orchestrator);
        let result = match tokio::task::spawn_blocking(move || orch.run_cycle(collection)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Runtime shutting down.
            Err(_) => break,
        };

        let failures = orchestrator.status(collection).consecutive_failures;
        let Some(delay) = next_delay(&result, orchestrator.config(), failures) else {
            let err = match result {
                Err(e) => e,
                Ok(_) => break,
            };
            error!(%collection, error = %err, "stopping sync: error is not retryable");
            return Err(err);
        };

        debug!(%collection, delay_ms = delay.as_millis() as u64, "next cycle scheduled");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(%collection, "sync loop stopped");
    Ok(())
}
