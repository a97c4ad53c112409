//! Per-parcel overrun timers

use crate::error::ConfigError;
use crate::node::{LateParcelDecision, NodeCoordinator};
use crate::store::{RecordDirectory, StoreEvent};
use crate::task::Parcel;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineConfig {
    /// Grace period added to every parcel's expected duration
    pub buffer: Duration,
    /// Delay used when a parcel is already overdue when first seen
    pub min_delay: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            buffer: Duration::from_millis(200),
            min_delay: Duration::from_millis(1),
        }
    }
}

impl DeadlineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay.is_zero() {
            return Err(ConfigError::InvalidInterval {
                name: "minimum deadline delay",
            });
        }
        Ok(())
    }

    /// Time to wait before checking a parcel
    ///
    /// `expected completion - instantiation + buffer`, clamped to `min_delay`.
    pub fn delay_for(&self, parcel: &Parcel) -> Duration {
        let buffer_ms = i64::try_from(self.buffer.as_millis()).unwrap_or(i64::MAX);
        let slack_ms = parcel
            .expected_duration()
            .num_milliseconds()
            .saturating_add(buffer_ms);

        if slack_ms <= 0 {
            self.min_delay
        } else {
            Duration::from_millis(slack_ms as u64).max(self.min_delay)
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    fired: AtomicU64,
}

/// Watches parcel creations and reports overrun parcels to the coordinator
pub struct DeadlineMonitor {
    coordinator: Arc<NodeCoordinator>,
    config: DeadlineConfig,
    cancel: CancellationToken,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl DeadlineMonitor {
    pub fn new(coordinator: Arc<NodeCoordinator>, config: DeadlineConfig) -> Self {
        Self {
            coordinator,
            config,
            cancel: CancellationToken::new(),
            worker: parking_lot::Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Timers scheduled so far
    pub fn scheduled(&self) -> u64 {
        self.counters.scheduled.load(Ordering::Relaxed)
    }

    /// Timers that have fired so far
    pub fn fired(&self) -> u64 {
        self.counters.fired.load(Ordering::Relaxed)
    }

    /// Subscribe to parcel creations and spawn the worker loop
    pub fn start(&self) {
        let mut slot = self.worker.lock();
        if slot.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let events = self.coordinator.directories().parcels.subscribe();
        let worker = Worker {
            coordinator: Arc::clone(&self.coordinator),
            config: self.config,
            cancel: self.cancel.clone(),
            counters: Arc::clone(&self.counters),
        };
        *slot = Some(tokio::spawn(worker.run(events)));
        tracing::info!(buffer_ms = self.config.buffer.as_millis() as u64, "Deadline monitor started");
    }

    /// Stop consuming notifications; timers already scheduled still fire
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Deadline monitor ended abnormally: {}", e);
            }
        }
        tracing::info!("Deadline monitor stopped");
    }
}

struct Worker {
    coordinator: Arc<NodeCoordinator>,
    config: DeadlineConfig,
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, mut events: tokio::sync::broadcast::Receiver<StoreEvent>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) if event.is_creation() => self.on_created(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Deadline monitor lagged, rescanning parcels");
                        self.rescan().await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    fn on_created(&self, event: StoreEvent) {
        let Some(raw) = event.value else {
            return;
        };
        match RecordDirectory::<Parcel>::decode(&event.key, &raw) {
            Ok(parcel) => self.schedule(event.key, &parcel),
            Err(e) => tracing::error!(parcel = %event.key, "Cannot schedule deadline: {}", e),
        }
    }

    /// Schedule every in-flight parcel after missed notifications
    async fn rescan(&self) {
        match self.coordinator.parcels().await {
            Ok(parcels) => {
                for parcel in parcels.iter().filter(|p| !p.uow.is_processed()) {
                    self.schedule(parcel.key(), parcel);
                }
            }
            Err(e) => tracing::warn!("Deadline rescan failed: {}", e),
        }
    }

    fn schedule(&self, key: String, parcel: &Parcel) {
        let delay = self.config.delay_for(parcel);
        let coordinator = Arc::clone(&self.coordinator);
        let counters = Arc::clone(&self.counters);

        counters.scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(parcel = %key, delay_ms = delay.as_millis() as u64, "Deadline scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            counters.fired.fetch_add(1, Ordering::Relaxed);

            // Re-reads the parcel; absent or processed parcels are left alone
            match coordinator.process_late_parcel(&key).await {
                Ok(LateParcelDecision::Absent) | Ok(LateParcelDecision::AlreadyProcessed) => {}
                Ok(decision) => {
                    tracing::debug!(parcel = %key, ?decision, "Late parcel evaluated");
                }
                Err(e) => tracing::warn!(parcel = %key, "Late parcel check failed: {}", e),
            }
        });
    }
}
