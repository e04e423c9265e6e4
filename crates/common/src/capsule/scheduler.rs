use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::engine::CapsuleEngine;
use super::error::CapsuleError;

/// Cadences and guards for the background release worker.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Regular sweep cadence.
    pub sweep_interval: Duration,
    /// Catch-up pass cadence, for anything the regular sweeps missed.
    pub deep_sweep_interval: Duration,
    /// Per-capsule time limit inside a sweep; a wedged backend cannot
    /// stall the rest of the batch.
    pub unlock_timeout: Duration,
    /// Most capsules a single sweep picks up.
    pub batch_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60 * 60),
            deep_sweep_interval: Duration::from_secs(24 * 60 * 60),
            unlock_timeout: Duration::from_secs(30),
            batch_limit: 500,
        }
    }
}

/// Why a sweep ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepReason {
    Scheduled,
    DeepScan,
    Manual,
}

impl SweepReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepReason::Scheduled => "scheduled",
            SweepReason::DeepScan => "deep_scan",
            SweepReason::Manual => "manual",
        }
    }
}

/// Tally of one sweep over the due set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Due records the sweep picked up.
    pub scanned: u64,
    /// Freshly released by this sweep.
    pub unlocked: u64,
    /// Lost the flip to another path, or vanished mid-sweep.
    pub skipped: u64,
    /// Errored or timed out; left for the next pass.
    pub failed: u64,
    /// Release emails that actually went out.
    pub emails_sent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Point-in-time scheduler view for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub sweeps_completed: u64,
    pub capsules_unlocked: u64,
    pub sweep_interval_secs: u64,
    pub deep_sweep_interval_secs: u64,
}

/// Background release driver.
///
/// One worker task funnels interval ticks and manual requests into the same
/// sweep over the due set. Cheap to clone; all clones share the one worker.
#[derive(Clone)]
pub struct UnlockScheduler {
    engine: Arc<CapsuleEngine>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    stop_tx: Arc<watch::Sender<()>>,
    trigger_tx: flume::Sender<SweepReason>,
    trigger_rx: flume::Receiver<SweepReason>,
    sweeps_completed: Arc<AtomicU64>,
    capsules_unlocked: Arc<AtomicU64>,
}

impl UnlockScheduler {
    pub fn new(engine: Arc<CapsuleEngine>, config: SchedulerConfig) -> Self {
        let (stop_tx, _) = watch::channel(());
        let (trigger_tx, trigger_rx) = flume::unbounded();
        Self {
            engine,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: Arc::new(stop_tx),
            trigger_tx,
            trigger_rx,
            sweeps_completed: Arc::new(AtomicU64::new(0)),
            capsules_unlocked: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the worker task.
    ///
    /// Idempotent: starting while already running logs and returns `None`
    /// instead of spawning a twin worker.
    pub fn start(&self, shutdown_rx: watch::Receiver<()>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("unlock scheduler already running, ignoring start");
            return None;
        }

        let worker = self.clone();
        Some(tokio::spawn(async move {
            worker.run(shutdown_rx).await;
            worker.running.store(false, Ordering::SeqCst);
        }))
    }

    /// Ask the worker to exit. Does not wait for in-flight work.
    pub fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.stop_tx.send(());
        }
    }

    /// Queue a manual sweep for the worker. Returns false when no worker
    /// is running to pick it up.
    pub fn request_sweep(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        // The scheduler itself keeps a receiver alive, so this cannot fail.
        let _ = self.trigger_tx.send(SweepReason::Manual);
        true
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        };
        SchedulerStatus {
            state,
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            capsules_unlocked: self.capsules_unlocked.load(Ordering::Relaxed),
            sweep_interval_secs: self.config.sweep_interval.as_secs(),
            deep_sweep_interval_secs: self.config.deep_sweep_interval.as_secs(),
        }
    }

    async fn run(&self, mut shutdown_rx: watch::Receiver<()>) {
        tracing::info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            deep_sweep_interval_secs = self.config.deep_sweep_interval.as_secs(),
            "unlock scheduler starting"
        );

        let mut stop_rx = self.stop_tx.subscribe();
        let mut trigger_stream = self.trigger_rx.clone().into_stream();

        let mut sweep_tick = tokio::time::interval(self.config.sweep_interval);
        let mut deep_tick = tokio::time::interval(self.config.deep_sweep_interval);
        // Skip the deep pass's immediate first tick; the regular tick's
        // immediate fire doubles as the startup catch-up sweep.
        deep_tick.tick().await;

        loop {
            tokio::select! {
                _ = sweep_tick.tick() => {
                    self.sweep(SweepReason::Scheduled).await;
                }
                _ = deep_tick.tick() => {
                    self.sweep(SweepReason::DeepScan).await;
                }
                Some(reason) = trigger_stream.next() => {
                    self.sweep(reason).await;
                }
                _ = stop_rx.changed() => {
                    tracing::info!("unlock scheduler stop requested");
                    break;
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("unlock scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Release everything due. Public so tests and operators can drive a
    /// sweep directly; failures are isolated per record.
    pub async fn sweep(&self, reason: SweepReason) -> SweepSummary {
        let now = OffsetDateTime::now_utc();
        let mut summary = SweepSummary::default();

        let due = match self
            .engine
            .due_for_unlock(now, self.config.batch_limit)
            .await
        {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(
                    reason = reason.as_str(),
                    "sweep could not query due capsules: {err}"
                );
                return summary;
            }
        };
        summary.scanned = due.len() as u64;

        for capsule in due {
            let attempt = tokio::time::timeout(
                self.config.unlock_timeout,
                self.engine.unlock_unattended(capsule.id),
            )
            .await;

            match attempt {
                Ok(Ok(outcome)) if outcome.freshly_unlocked => {
                    summary.unlocked += 1;
                    if outcome.receipt.emailed {
                        summary.emails_sent += 1;
                    }
                }
                // Lost the flip to an interactive unlock mid-sweep.
                Ok(Ok(_)) => summary.skipped += 1,
                // Deleted between the due query and the attempt.
                Ok(Err(CapsuleError::NotFound)) => summary.skipped += 1,
                Ok(Err(err)) => {
                    summary.failed += 1;
                    tracing::error!(
                        capsule_id = %capsule.id,
                        "sweep failed to unlock capsule: {err}"
                    );
                }
                Err(_elapsed) => {
                    summary.failed += 1;
                    tracing::error!(
                        capsule_id = %capsule.id,
                        timeout_secs = self.config.unlock_timeout.as_secs(),
                        "unlock attempt timed out"
                    );
                }
            }
        }

        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        self.capsules_unlocked
            .fetch_add(summary.unlocked, Ordering::Relaxed);

        if summary.scanned > 0 {
            tracing::info!(
                reason = reason.as_str(),
                scanned = summary.scanned,
                unlocked = summary.unlocked,
                skipped = summary.skipped,
                failed = summary.failed,
                emails_sent = summary.emails_sent,
                "sweep complete"
            );
        } else {
            tracing::debug!(reason = reason.as_str(), "sweep found nothing due");
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::{
        CapsuleChanges, CapsuleEngine, CapsuleStore, CreateCapsule, EngineLimits,
        MemoryCapsuleStore, PayloadChange,
    };
    use crate::crypto::Cipher;
    use crate::directory::MemoryDirectory;
    use crate::identity::Principal;
    use crate::mail::MemoryMailer;
    use crate::notify::MemoryNotifier;
    use crate::outbox::Outbox;
    use blob_store::BlobStore;
    use time::Duration as TimeDuration;
    use uuid::Uuid;

    struct Harness {
        scheduler: UnlockScheduler,
        engine: Arc<CapsuleEngine>,
        store: MemoryCapsuleStore,
        mailer: MemoryMailer,
        notifier: MemoryNotifier,
        owner: Principal,
        recipient: Principal,
    }

    fn harness(config: SchedulerConfig) -> Harness {
        let store = MemoryCapsuleStore::new();
        let directory = MemoryDirectory::new();
        let mailer = MemoryMailer::new();
        let notifier = MemoryNotifier::new();
        let outbox = Outbox::new(
            Arc::new(directory.clone()),
            Arc::new(notifier.clone()),
            Arc::new(mailer.clone()),
            "https://heirloom.example.com",
        );
        let engine = Arc::new(CapsuleEngine::new(
            Arc::new(store.clone()),
            BlobStore::memory(),
            Cipher::generate(),
            Arc::new(directory.clone()),
            Arc::new(outbox),
            EngineLimits::default(),
        ));

        let owner_record = directory.register("bruno@example.com", "bruno");
        let recipient_record = directory.register("ana@example.com", "ana");

        Harness {
            scheduler: UnlockScheduler::new(engine.clone(), config),
            engine,
            store,
            mailer,
            notifier,
            owner: Principal {
                id: owner_record.id,
                email: owner_record.email,
            },
            recipient: Principal {
                id: recipient_record.id,
                email: recipient_record.email,
            },
        }
    }

    async fn create_capsule(h: &Harness, unlock_at: OffsetDateTime) -> Uuid {
        h.engine
            .create(
                &h.owner,
                CreateCapsule {
                    unlock_at,
                    description: Some("from the past".to_string()),
                    recipient_id: Some(h.recipient.id),
                    recipient_email: None,
                    payload: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_sweep_releases_only_the_due() {
        let h = harness(SchedulerConfig::default());
        let now = OffsetDateTime::now_utc();

        let due_a = create_capsule(&h, now - TimeDuration::hours(2)).await;
        let due_b = create_capsule(&h, now - TimeDuration::hours(1)).await;
        let future = create_capsule(&h, now + TimeDuration::days(1)).await;

        let summary = h.scheduler.sweep(SweepReason::Manual).await;

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.unlocked, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.emails_sent, 2);

        for id in [due_a, due_b] {
            assert!(h.store.fetch(id).await.unwrap().unwrap().is_unlocked());
        }
        assert!(h.store.fetch(future).await.unwrap().unwrap().is_locked());

        // Release fan-out: unlock emails plus in-app notices for the
        // registered recipient.
        assert_eq!(h.notifier.for_user(h.recipient.id).len(), 2);
        // Three created emails and two unlock emails.
        assert_eq!(h.mailer.sent_to("ana@example.com").len(), 5);
    }

    #[tokio::test]
    async fn test_sweep_isolates_per_record_failures() {
        let h = harness(SchedulerConfig::default());
        let now = OffsetDateTime::now_utc();

        let good = create_capsule(&h, now - TimeDuration::hours(1)).await;
        let corrupt = create_capsule(&h, now - TimeDuration::hours(2)).await;

        // Break the second capsule's nonce so decryption cannot succeed.
        let record = h.store.fetch(corrupt).await.unwrap().unwrap();
        h.store
            .update_fields(
                corrupt,
                CapsuleChanges {
                    payload: Some(PayloadChange {
                        filename: record.filename,
                        content_kind: record.content_kind,
                        payload_size: record.payload_size,
                        locator: record.locator,
                        iv: vec![0; 12],
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let summary = h.scheduler.sweep(SweepReason::Scheduled).await;

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.unlocked, 1);
        assert_eq!(summary.failed, 1);

        // The healthy capsule went out; the corrupt one stays sealed.
        assert!(h.store.fetch(good).await.unwrap().unwrap().is_unlocked());
        assert!(h.store.fetch(corrupt).await.unwrap().unwrap().is_locked());
    }

    #[tokio::test]
    async fn test_sweep_respects_batch_limit() {
        let h = harness(SchedulerConfig {
            batch_limit: 1,
            ..Default::default()
        });
        let now = OffsetDateTime::now_utc();

        create_capsule(&h, now - TimeDuration::hours(2)).await;
        create_capsule(&h, now - TimeDuration::hours(1)).await;

        let first = h.scheduler.sweep(SweepReason::Manual).await;
        assert_eq!(first.scanned, 1);
        assert_eq!(first.unlocked, 1);

        let second = h.scheduler.sweep(SweepReason::Manual).await;
        assert_eq!(second.unlocked, 1);
    }

    #[tokio::test]
    async fn test_sweep_counters_accumulate() {
        let h = harness(SchedulerConfig::default());
        let now = OffsetDateTime::now_utc();
        create_capsule(&h, now - TimeDuration::hours(1)).await;

        h.scheduler.sweep(SweepReason::Manual).await;
        h.scheduler.sweep(SweepReason::Manual).await;

        let status = h.scheduler.status();
        assert_eq!(status.sweeps_completed, 2);
        assert_eq!(status.capsules_unlocked, 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_halts_the_worker() {
        let h = harness(SchedulerConfig {
            sweep_interval: Duration::from_secs(3600),
            ..Default::default()
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(());

        let handle = h.scheduler.start(shutdown_rx.clone());
        assert!(handle.is_some());
        assert_eq!(h.scheduler.status().state, SchedulerState::Running);

        // A second start refuses to spawn a twin.
        assert!(h.scheduler.start(shutdown_rx).is_none());

        h.scheduler.stop();
        tokio::time::timeout(Duration::from_secs(5), handle.unwrap())
            .await
            .expect("worker did not stop")
            .unwrap();
        assert_eq!(h.scheduler.status().state, SchedulerState::Stopped);
        assert!(!h.scheduler.request_sweep());
    }

    #[tokio::test]
    async fn test_manual_trigger_reaches_the_worker() {
        let h = harness(SchedulerConfig {
            sweep_interval: Duration::from_secs(3600),
            deep_sweep_interval: Duration::from_secs(7200),
            ..Default::default()
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = h.scheduler.start(shutdown_rx).unwrap();

        // Let the startup sweep pass over an empty store first.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let id = create_capsule(&h, OffsetDateTime::now_utc() - TimeDuration::hours(1)).await;
        assert!(h.scheduler.request_sweep());

        let mut released = false;
        for _ in 0..40 {
            if h.store.fetch(id).await.unwrap().unwrap().is_unlocked() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(released, "manual sweep never released the capsule");

        h.scheduler.stop();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    #[tokio::test]
    async fn test_shutdown_signal_halts_the_worker() {
        let h = harness(SchedulerConfig::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let handle = h.scheduler.start(shutdown_rx).unwrap();
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not shut down")
            .unwrap();
        assert_eq!(h.scheduler.status().state, SchedulerState::Stopped);
    }
}
