use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rolegate_events::{EventBus, Subscription};

use super::{LifecycleError, LifecycleOrchestrator, LifecycleOutcome};
use crate::identity::IdentityEventEnvelope;

/// Handle to control and join the background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<WorkerStats>,
}

/// What the worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub handled: u64,
    pub failed: u64,
    /// Failed deliveries queued again.
    pub redelivered: u64,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop. The event
    /// being handled, if any, is finished first.
    pub async fn shutdown(self) -> WorkerStats {
        let _ = self.shutdown.send(true);
        self.join.await.unwrap_or_default()
    }
}

/// Consumes identity events from the bus and feeds them to the orchestrator.
///
/// - At-least-once delivery: the orchestrator is idempotent
/// - Failed provisioning is redelivered with backoff, bounded by the
///   orchestrator's background policy, then alerted
/// - Failed deletions alert on their own (their retries already ran)
/// - Supports graceful shutdown
pub struct LifecycleWorker;

impl LifecycleWorker {
    pub fn spawn<B>(bus: &B, orchestrator: Arc<LifecycleOrchestrator>) -> WorkerHandle
    where
        B: EventBus<IdentityEventEnvelope> + ?Sized,
    {
        let subscription = bus.subscribe();
        Self::spawn_with(subscription, orchestrator)
    }

    pub fn spawn_with(
        subscription: Subscription<IdentityEventEnvelope>,
        orchestrator: Arc<LifecycleOrchestrator>,
    ) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(worker_loop(subscription, shutdown_rx, orchestrator));
        WorkerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn worker_loop(
    mut subscription: Subscription<IdentityEventEnvelope>,
    mut shutdown: watch::Receiver<bool>,
    orchestrator: Arc<LifecycleOrchestrator>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel::<IdentityEventEnvelope>();
    info!("lifecycle worker started");

    loop {
        let envelope = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            Some(envelope) = requeue_rx.recv() => envelope,
            msg = subscription.recv() => match msg {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let event_id = envelope.event_id();
        match orchestrator.handle(envelope.payload()).await {
            Ok(outcome) => {
                stats.handled += 1;
                if matches!(
                    outcome,
                    LifecycleOutcome::AlreadyProvisioned | LifecycleOutcome::AlreadyDeleted
                ) {
                    debug!(%event_id, attempt = envelope.attempt(), ?outcome, "duplicate delivery");
                }
            }
            Err(e @ LifecycleError::ProvisioningFailed { .. }) => {
                stats.failed += 1;
                let policy = orchestrator.background_retry();
                let attempt = envelope.attempt();
                if policy.should_retry(attempt) {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(%event_id, attempt, ?delay, error = %e, "provisioning failed, redelivering");
                    stats.redelivered += 1;
                    let requeue = requeue_tx.clone();
                    let next = envelope.redelivery();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = requeue.send(next);
                    });
                } else {
                    error!(%event_id, attempt, error = %e, "provisioning abandoned");
                    orchestrator.abandon_provisioning(envelope.payload().identity_id(), attempt, &e);
                }
            }
            Err(e) => {
                stats.failed += 1;
                warn!(%event_id, event_type = envelope.event_type(), error = %e, "lifecycle event failed");
            }
        }
    }

    info!(
        handled = stats.handled,
        failed = stats.failed,
        redelivered = stats.redelivered,
        "lifecycle worker stopped"
    );
    stats
}
