//! Node coordinator: replicated directories, peer fan-out and heartbeat

use crate::error::RecordResult;
use crate::identity::Identifier;
use crate::node::directories::{Directories, MemberSet};
use crate::node::forward::{fan_out, FanOutReport, ForwardPolicy, ForwardRecord, SiteForwarder};
use crate::node::stats::{NodeStats, NodeStatsSnapshot};
use crate::store::RecordDirectory;
use crate::task::{ComponentStatus, Parcel, WatchdogEntry};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runtime settings of a coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Identity of this node in the watchdog directory
    pub node_id: Identifier,
    /// Peer-site endpoints to fan out to
    pub peers: Vec<String>,
    /// Retry budget per peer
    pub forward: ForwardPolicy,
    /// Period of the node heartbeat
    pub heartbeat_interval: Duration,
}

impl CoordinatorConfig {
    /// Defaults for a node without peers
    pub fn new(node_id: Identifier) -> Self {
        Self {
            node_id,
            peers: Vec::new(),
            forward: ForwardPolicy::default(),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

/// What `process_late_parcel` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateParcelDecision {
    /// Parcel no longer stored; assumed completed and retired
    Absent,
    /// An outcome was recorded before the deadline check
    AlreadyProcessed,
    /// Owner was ACTIVE; flipped to UNRESPONSIVE so peers may take over
    MarkedUnresponsive,
    /// Owner status left as found
    Unchanged(ComponentStatus),
}

/// Owns the replicated directories and the node's peer-site fan-out
pub struct NodeCoordinator {
    config: CoordinatorConfig,
    directories: Directories,
    forwarder: Arc<dyn SiteForwarder>,
    multicast_lock: Mutex<()>,
    capability_lock: Mutex<()>,
    stats: NodeStats,
    cancel: CancellationToken,
    heartbeat: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl NodeCoordinator {
    /// Create a coordinator; call [`NodeCoordinator::start`] to begin heartbeating
    pub fn new(
        config: CoordinatorConfig,
        directories: Directories,
        forwarder: Arc<dyn SiteForwarder>,
    ) -> Self {
        Self {
            config,
            directories,
            forwarder,
            multicast_lock: Mutex::new(()),
            capability_lock: Mutex::new(()),
            stats: NodeStats::default(),
            cancel: CancellationToken::new(),
            heartbeat: parking_lot::Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> &Identifier {
        &self.config.node_id
    }

    pub fn peers(&self) -> &[String] {
        &self.config.peers
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    pub fn stats(&self) -> NodeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the heartbeat loop is running
    pub fn is_running(&self) -> bool {
        self.heartbeat.lock().is_some() && !self.cancel.is_cancelled()
    }

    /// Spawn the heartbeat loop
    ///
    /// A stopped coordinator stays stopped; starting twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.heartbeat.lock();
        if slot.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let coordinator = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            coordinator.run_heartbeat().await;
        }));

        tracing::info!(
            node = %self.config.node_id,
            peers = self.config.peers.len(),
            "Node coordinator started"
        );
    }

    /// Stop the heartbeat loop and wait for it to finish
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.heartbeat.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Heartbeat task ended abnormally: {}", e);
            }
        }
        tracing::info!(node = %self.config.node_id, "Node coordinator stopped");
    }

    async fn run_heartbeat(&self) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.heartbeat_once().await {
                        tracing::warn!("Failed to send heartbeat: {}", e);
                    }
                }
            }
        }
    }

    /// Refresh this node's own watchdog entry and fan it out
    pub async fn heartbeat_once(&self) -> RecordResult<FanOutReport> {
        let entry =
            WatchdogEntry::for_node(self.config.node_id.clone(), ComponentStatus::Active, Utc::now());
        let report = self.update_ci_status(entry).await?;
        self.stats.record_heartbeat();
        Ok(report)
    }

    /// Add a WUP to the grouping of a multicast UoW
    ///
    /// Returns false if it was already a member.
    pub async fn register_multicast_parcel(
        &self,
        uow_base_id: &Identifier,
        wup_id: &Identifier,
    ) -> RecordResult<bool> {
        let _guard = self.multicast_lock.lock().await;
        let added = add_member(&self.directories.multicast, &uow_base_id.render(), wup_id).await?;
        if added {
            tracing::debug!(base = %uow_base_id, wup = %wup_id, "Joined multicast grouping");
        }
        Ok(added)
    }

    /// Clear a multicast grouping once its attempts are handled
    pub async fn deregister_multicast(&self, uow_base_id: &Identifier) -> RecordResult<bool> {
        let _guard = self.multicast_lock.lock().await;
        self.directories.multicast.remove(&uow_base_id.render()).await
    }

    /// Record that a WUP can perform a function
    pub async fn register_wup_capability(
        &self,
        wup_id: &Identifier,
        function_id: &Identifier,
    ) -> RecordResult<bool> {
        let _guard = self.capability_lock.lock().await;
        let added = add_member(&self.directories.capability, &function_id.render(), wup_id).await?;
        if added {
            tracing::debug!(function = %function_id, wup = %wup_id, "Registered capability");
        }
        Ok(added)
    }

    /// Upsert a watchdog entry, then fan it out to peer sites
    pub async fn update_ci_status(&self, entry: WatchdogEntry) -> RecordResult<FanOutReport> {
        self.directories.watchdog.put(&entry.key(), &entry).await?;
        Ok(self.register_wup_with_other_sites(&entry).await)
    }

    /// Forward a watchdog entry to every peer site
    pub async fn register_wup_with_other_sites(&self, entry: &WatchdogEntry) -> FanOutReport {
        self.fan_out(ForwardRecord::Watchdog(entry.clone())).await
    }

    /// Forward a freshly registered parcel to every peer site
    pub async fn forward_parcel(&self, parcel: &Parcel) -> FanOutReport {
        self.fan_out(ForwardRecord::Parcel(Box::new(parcel.clone()))).await
    }

    /// Best-effort delivery to all peers; failures are logged, never returned
    pub async fn fan_out(&self, record: ForwardRecord) -> FanOutReport {
        if self.config.peers.is_empty() {
            return FanOutReport::default();
        }

        let report = fan_out(
            self.forwarder.as_ref(),
            &self.config.peers,
            &record,
            &self.config.forward,
        )
        .await;
        self.stats
            .record_forwards(report.delivered.len(), report.failed.len());
        report
    }

    /// Evaluate a parcel whose deadline passed
    ///
    /// Safe under repeated delivery: only an ACTIVE owner of an unprocessed
    /// parcel is changed, and it becomes UNRESPONSIVE.
    pub async fn process_late_parcel(&self, parcel_key: &str) -> RecordResult<LateParcelDecision> {
        let Some(mut parcel) = self.directories.parcels.get(parcel_key).await? else {
            tracing::debug!(parcel = parcel_key, "Late parcel already retired");
            return Ok(LateParcelDecision::Absent);
        };

        if parcel.uow.is_processed() {
            return Ok(LateParcelDecision::AlreadyProcessed);
        }

        self.stats.record_late_parcel();

        match parcel.watchdog.status {
            ComponentStatus::Active => {
                let now = Utc::now();
                parcel.watchdog.update(ComponentStatus::Unresponsive, now);
                if !self.directories.parcels.replace(parcel_key, &parcel).await? {
                    return Ok(LateParcelDecision::Absent);
                }

                let wup_id = parcel.watchdog.wup_id.clone();
                tracing::warn!(
                    parcel = parcel_key,
                    wup = %wup_id,
                    "Parcel overran its deadline, owner marked unresponsive"
                );

                let entry = match self.directories.watchdog.get(&wup_id.render()).await? {
                    Some(mut entry) => {
                        entry.status = ComponentStatus::Unresponsive;
                        entry.last_status_update = now;
                        entry.current_parcel = Some(parcel.id().clone());
                        entry
                    }
                    None => WatchdogEntry {
                        component_id: wup_id,
                        status: ComponentStatus::Unresponsive,
                        last_status_update: now,
                        supported_function: Some(parcel.registration.supporting_function.clone()),
                        current_parcel: Some(parcel.id().clone()),
                    },
                };
                self.update_ci_status(entry).await?;

                Ok(LateParcelDecision::MarkedUnresponsive)
            }
            status => {
                tracing::debug!(parcel = parcel_key, status = %status, "Late parcel left unchanged");
                Ok(LateParcelDecision::Unchanged(status))
            }
        }
    }

    /// All watchdog entries, ordered by component key
    pub async fn watchdog_entries(&self) -> RecordResult<Vec<WatchdogEntry>> {
        Ok(self
            .directories
            .watchdog
            .entries()
            .await?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    /// WUPs registered as able to perform a function
    pub async fn capable_wups(&self, function_id: &Identifier) -> RecordResult<MemberSet> {
        Ok(self
            .directories
            .capability
            .get(&function_id.render())
            .await?
            .unwrap_or_default())
    }

    /// WUPs participating in a multicast UoW
    pub async fn multicast_members(&self, uow_base_id: &Identifier) -> RecordResult<MemberSet> {
        Ok(self
            .directories
            .multicast
            .get(&uow_base_id.render())
            .await?
            .unwrap_or_default())
    }

    /// Look up one parcel by store key
    pub async fn parcel(&self, key: &str) -> RecordResult<Option<Parcel>> {
        self.directories.parcels.get(key).await
    }

    /// All stored parcels
    pub async fn parcels(&self) -> RecordResult<Vec<Parcel>> {
        Ok(self
            .directories
            .parcels
            .entries()
            .await?
            .into_iter()
            .map(|(_, parcel)| parcel)
            .collect())
    }
}

/// Read-check-then-write append to a multi-value entry
async fn add_member(
    directory: &RecordDirectory<MemberSet>,
    key: &str,
    member: &Identifier,
) -> RecordResult<bool> {
    let mut members = directory.get(key).await?.unwrap_or_default();
    if !members.insert(member.clone()) {
        return Ok(false);
    }
    directory.put(key, &members).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForwardError;
    use crate::task::{ProcessingOutcome, UnitOfWork};

    #[derive(Default)]
    struct Recording {
        sent: parking_lot::Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl SiteForwarder for Recording {
        async fn forward(&self, endpoint: &str, record: &ForwardRecord) -> Result<(), ForwardError> {
            self.sent
                .lock()
                .push((endpoint.to_string(), record.key()));
            Ok(())
        }
    }

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn coordinator(peers: &[&str]) -> (Arc<NodeCoordinator>, Arc<Recording>) {
        let forwarder = Arc::new(Recording::default());
        let mut config = CoordinatorConfig::new(id("deployment=test.site=site-a.pod=p1.node=parcel-node"));
        config.peers = peers.iter().map(|p| p.to_string()).collect();
        config.heartbeat_interval = Duration::from_millis(20);
        let coordinator = NodeCoordinator::new(config, Directories::in_memory(), forwarder.clone());
        (Arc::new(coordinator), forwarder)
    }

    async fn store_parcel(coordinator: &NodeCoordinator, status: ComponentStatus) -> String {
        let uow = UnitOfWork::new(id("function=ingest.hash=abc123"), id("function=ingest"));
        let mut parcel = Parcel::register(
            id("wup=wup-1"),
            id("function=ingest"),
            uow,
            None,
            Utc::now(),
            chrono::Duration::milliseconds(100),
        );
        parcel.watchdog.status = status;
        let key = parcel.key();
        coordinator.directories().parcels.put(&key, &parcel).await.unwrap();
        key
    }

    #[tokio::test]
    async fn test_multicast_grouping_grows() {
        let (coordinator, _) = coordinator(&[]);
        let base = id("function=ingest.hash=abc123");

        assert!(coordinator.register_multicast_parcel(&base, &id("wup=a")).await.unwrap());
        assert!(coordinator.register_multicast_parcel(&base, &id("wup=b")).await.unwrap());
        assert!(!coordinator.register_multicast_parcel(&base, &id("wup=a")).await.unwrap());

        let members = coordinator.multicast_members(&base).await.unwrap();
        assert_eq!(members.len(), 2);

        assert!(coordinator.deregister_multicast(&base).await.unwrap());
        assert!(coordinator.multicast_members(&base).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_capability_appends_are_not_lost() {
        let (coordinator, _) = coordinator(&[]);
        let function = id("function=ingest");

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                let function = function.clone();
                tokio::spawn(async move {
                    let wup = Identifier::new("wup", &format!("wup-{}", i)).unwrap();
                    coordinator.register_wup_capability(&wup, &function).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(coordinator.capable_wups(&function).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_update_ci_status_fans_out() {
        let (coordinator, forwarder) = coordinator(&["site-b", "site-c"]);
        let entry = WatchdogEntry::for_wup(id("wup=wup-1"), id("function=ingest"), Utc::now());

        let report = coordinator.update_ci_status(entry).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(forwarder.sent.lock().len(), 2);
        assert_eq!(coordinator.watchdog_entries().await.unwrap().len(), 1);
        assert_eq!(coordinator.stats().forwards_delivered, 2);
    }

    #[tokio::test]
    async fn test_late_parcel_absent() {
        let (coordinator, _) = coordinator(&[]);
        let decision = coordinator.process_late_parcel("function=gone.parcel=primary").await.unwrap();
        assert_eq!(decision, LateParcelDecision::Absent);
    }

    #[tokio::test]
    async fn test_late_parcel_marks_active_owner_unresponsive_once() {
        let (coordinator, _) = coordinator(&[]);
        let key = store_parcel(&coordinator, ComponentStatus::Active).await;

        let first = coordinator.process_late_parcel(&key).await.unwrap();
        assert_eq!(first, LateParcelDecision::MarkedUnresponsive);

        let parcel = coordinator.parcel(&key).await.unwrap().unwrap();
        assert_eq!(parcel.watchdog.status, ComponentStatus::Unresponsive);

        let owner = coordinator
            .watchdog_entries()
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.component_id == id("wup=wup-1"))
            .unwrap();
        assert_eq!(owner.status, ComponentStatus::Unresponsive);
        assert_eq!(owner.current_parcel.as_ref(), Some(parcel.id()));

        // Duplicate delivery from another member changes nothing
        let second = coordinator.process_late_parcel(&key).await.unwrap();
        assert_eq!(
            second,
            LateParcelDecision::Unchanged(ComponentStatus::Unresponsive)
        );
    }

    #[tokio::test]
    async fn test_late_parcel_with_outcome_is_noop() {
        let (coordinator, _) = coordinator(&[]);
        let key = store_parcel(&coordinator, ComponentStatus::Active).await;

        let mut parcel = coordinator.parcel(&key).await.unwrap().unwrap();
        parcel.uow.outcome = Some(ProcessingOutcome::Success);
        coordinator.directories().parcels.put(&key, &parcel).await.unwrap();

        let decision = coordinator.process_late_parcel(&key).await.unwrap();
        assert_eq!(decision, LateParcelDecision::AlreadyProcessed);
        assert_eq!(coordinator.stats().late_parcels, 0);
    }

    #[tokio::test]
    async fn test_heartbeat_start_stop() {
        let (coordinator, forwarder) = coordinator(&["site-b"]);

        coordinator.start();
        assert!(coordinator.is_running());
        tokio::time::sleep(Duration::from_millis(70)).await;
        coordinator.stop().await;
        assert!(!coordinator.is_running());

        let beats = coordinator.stats().heartbeats;
        assert!(beats >= 2, "expected several heartbeats, got {}", beats);

        let node = coordinator
            .watchdog_entries()
            .await
            .unwrap()
            .into_iter()
            .find(|e| &e.component_id == coordinator.node_id())
            .unwrap();
        assert_eq!(node.status, ComponentStatus::Active);
        assert!(!forwarder.sent.lock().is_empty());

        // No further beats once stopped
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.stats().heartbeats, beats);
    }
}
