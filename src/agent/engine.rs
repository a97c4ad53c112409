//! Lifecycle engine behind the WUP-facing protocol

use crate::archive::ParcelArchive;
use crate::error::{ConfigError, RecordError};
use crate::identity::Identifier;
use crate::node::NodeCoordinator;
use crate::task::{
    ActionSuggestion, ComponentStatus, Parcel, ParcelStatus, ProcessingOutcome, UnitOfWork,
    WatchdogEntry,
};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Longest accepted expected duration for a parcel
pub const MAX_EXPECTED_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings of the lifecycle engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Time from registration to expected completion
    pub expected_duration: Duration,
    /// Archive synchronously on registration and finalisation
    pub critical_write: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            expected_duration: Duration::from_secs(60),
            critical_write: false,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_duration.is_zero() || self.expected_duration > MAX_EXPECTED_DURATION {
            return Err(ConfigError::InvalidInterval {
                name: "expected duration",
            });
        }
        Ok(())
    }
}

/// Parcel lifecycle engine used by WUPs
///
/// No operation returns an error: store and forwarding failures are logged
/// and resolved into a conservative suggestion or outcome.
pub struct ParcelAgent {
    coordinator: Arc<NodeCoordinator>,
    archive: Option<Arc<dyn ParcelArchive>>,
    config: AgentConfig,
}

impl ParcelAgent {
    /// Create an engine; critical writes require an archive
    pub fn new(
        coordinator: Arc<NodeCoordinator>,
        config: AgentConfig,
        archive: Option<Arc<dyn ParcelArchive>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.critical_write && archive.is_none() {
            return Err(ConfigError::MissingRequired(
                "an archive is required when critical writes are enabled".to_string(),
            ));
        }
        Ok(Self {
            coordinator,
            archive,
            config,
        })
    }

    pub fn coordinator(&self) -> &Arc<NodeCoordinator> {
        &self.coordinator
    }

    fn expected_duration(&self) -> chrono::Duration {
        // Bounded by validate()
        chrono::Duration::from_std(self.config.expected_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(60))
    }

    /// Register a WUP's watchdog entry and capability
    ///
    /// An existing entry is left as it is; either way the stored entry is
    /// fanned out to peer sites.
    pub async fn register_work_unit_processor(&self, wup_id: &Identifier, function_id: &Identifier) {
        let watchdog = &self.coordinator.directories().watchdog;
        let key = wup_id.render();

        let entry = match watchdog.get(&key).await {
            Ok(Some(existing)) => {
                tracing::debug!(wup = %wup_id, "WUP already registered");
                existing
            }
            Ok(None) => {
                let entry = WatchdogEntry::for_wup(wup_id.clone(), function_id.clone(), Utc::now());
                if let Err(e) = watchdog.put(&key, &entry).await {
                    tracing::warn!(wup = %wup_id, "Failed to store watchdog entry: {}", e);
                }
                tracing::debug!(wup = %wup_id, function = %function_id, "Registered WUP");
                entry
            }
            Err(e) => {
                log_record_error(&key, "register WUP", &e);
                WatchdogEntry::for_wup(wup_id.clone(), function_id.clone(), Utc::now())
            }
        };

        if let Err(e) = self.coordinator.register_wup_capability(wup_id, function_id).await {
            log_record_error(&function_id.render(), "register capability", &e);
        }

        self.coordinator.register_wup_with_other_sites(&entry).await;
    }

    /// Idempotently create the parcel for a UoW
    ///
    /// The first writer wins cluster-wide; every caller receives the stored
    /// record. Returns `None` only when the store could not be used.
    pub async fn register_activity(
        &self,
        wup_id: &Identifier,
        function_id: &Identifier,
        uow: UnitOfWork,
        precursor: Option<Identifier>,
    ) -> Option<Parcel> {
        let key = Parcel::key_for(&uow.id);
        let multicast_base = uow.multicast_base();
        let candidate = Parcel::register(
            wup_id.clone(),
            function_id.clone(),
            uow,
            precursor,
            Utc::now(),
            self.expected_duration(),
        );

        let parcels = &self.coordinator.directories().parcels;
        let (parcel, won) = match parcels.put_if_absent(&key, &candidate).await {
            Ok(None) => (candidate, true),
            Ok(Some(existing)) => {
                if existing.key() != key {
                    let err = RecordError::RegistrationCollision {
                        expected: key.clone(),
                        found: existing.key(),
                    };
                    log_record_error(&key, "register activity", &err);
                    return None;
                }
                (existing, false)
            }
            Err(e) => {
                log_record_error(&key, "register activity", &e);
                return None;
            }
        };

        if let Some(base) = &multicast_base {
            if let Err(e) = self.coordinator.register_multicast_parcel(base, wup_id).await {
                log_record_error(&base.render(), "register multicast", &e);
            }
        }

        if !won {
            tracing::debug!(parcel = %key, wup = %wup_id, "Parcel already registered");
            return Some(parcel);
        }

        tracing::debug!(parcel = %key, wup = %wup_id, "Registered parcel");

        if let Some(precursor) = &parcel.precursor {
            self.link_successor(precursor, parcel.id()).await;
        }

        if self.config.critical_write {
            self.archive_parcel(&parcel).await;
        }

        self.coordinator.forward_parcel(&parcel).await;
        Some(parcel)
    }

    /// Claim a parcel
    pub async fn start_activity(&self, parcel_id: &Identifier) -> ActionSuggestion {
        let key = parcel_id.render();
        let parcels = &self.coordinator.directories().parcels;

        let mut parcel = match parcels.get(&key).await {
            Ok(Some(parcel)) => parcel,
            Ok(None) => {
                tracing::debug!(parcel = %key, "Start on missing parcel");
                return ActionSuggestion::Halt;
            }
            Err(e) => {
                log_record_error(&key, "start activity", &e);
                return ActionSuggestion::Pause;
            }
        };

        if parcel.status.is_terminal() || parcel.uow.is_processed() {
            return ActionSuggestion::Halt;
        }

        match parcel.watchdog.status {
            ComponentStatus::Active => return ActionSuggestion::Pause,
            status if status.allows_takeover() => {
                tracing::warn!(
                    parcel = %key,
                    previous_owner = %parcel.watchdog.wup_id,
                    status = %status,
                    "Taking over parcel"
                );
            }
            _ => {}
        }

        parcel.mark_active(Utc::now());
        match parcels.replace(&key, &parcel).await {
            Ok(true) => {
                tracing::debug!(parcel = %key, "Parcel claimed");
                ActionSuggestion::Continue
            }
            Ok(false) => ActionSuggestion::Halt,
            Err(e) => {
                log_record_error(&key, "start activity", &e);
                ActionSuggestion::Pause
            }
        }
    }

    /// Record the finished UoW and its outcome
    pub async fn finish_activity(
        &self,
        parcel_id: &Identifier,
        finished: UnitOfWork,
        outcome: ProcessingOutcome,
    ) -> ActionSuggestion {
        let key = parcel_id.render();
        let parcels = &self.coordinator.directories().parcels;

        let mut parcel = match parcels.get(&key).await {
            Ok(Some(parcel)) if !parcel.status.is_terminal() => parcel,
            Ok(_) => return ActionSuggestion::Halt,
            Err(e) => {
                log_record_error(&key, "finish activity", &e);
                return ActionSuggestion::Halt;
            }
        };

        let owner = parcel.watchdog.wup_id.clone();
        let now = Utc::now();
        parcel.mark_finished(finished, outcome, now);
        match parcels.replace(&key, &parcel).await {
            Ok(true) => {
                tracing::debug!(parcel = %key, outcome = %outcome, "Parcel finished");
                self.release_late_owner(&owner, parcel.id(), now).await;
                ActionSuggestion::Continue
            }
            Ok(false) => ActionSuggestion::Halt,
            Err(e) => {
                log_record_error(&key, "finish activity", &e);
                ActionSuggestion::Halt
            }
        }
    }

    /// Terminal write before archival and removal
    pub async fn finalise_activity(
        &self,
        parcel_id: &Identifier,
        mut finished: UnitOfWork,
    ) -> ProcessingOutcome {
        let key = parcel_id.render();
        let parcels = &self.coordinator.directories().parcels;

        let mut parcel = match parcels.get(&key).await {
            Ok(Some(parcel)) => parcel,
            Ok(None) => {
                tracing::debug!(parcel = %key, "Finalise on retired parcel");
                return ProcessingOutcome::Success;
            }
            Err(e) => {
                log_record_error(&key, "finalise activity", &e);
                return ProcessingOutcome::Failure;
            }
        };

        if parcel.status.is_terminal() {
            return ProcessingOutcome::Success;
        }

        if finished.outcome.is_none() {
            finished.outcome = parcel.uow.outcome;
        }
        parcel.uow = finished;
        parcel.mark_finalised();

        if self.config.critical_write && !self.archive_parcel(&parcel).await {
            return ProcessingOutcome::Failure;
        }

        match parcels.replace(&key, &parcel).await {
            Ok(_) => {
                tracing::debug!(parcel = %key, "Parcel finalised");
                ProcessingOutcome::Success
            }
            Err(e) => {
                log_record_error(&key, "finalise activity", &e);
                ProcessingOutcome::Failure
            }
        }
    }

    /// Component-level self report
    pub async fn update_operational_status(
        &self,
        wup_id: &Identifier,
        instant: DateTime<Utc>,
        status: ComponentStatus,
    ) -> ActionSuggestion {
        let key = wup_id.render();
        let entry = match self.coordinator.directories().watchdog.get(&key).await {
            Ok(Some(mut entry)) => {
                entry.status = status;
                entry.last_status_update = instant;
                entry
            }
            Ok(None) => WatchdogEntry::for_node(wup_id.clone(), status, instant),
            Err(e) => {
                log_record_error(&key, "update operational status", &e);
                return ActionSuggestion::Continue;
            }
        };

        if let Err(e) = self.coordinator.update_ci_status(entry).await {
            log_record_error(&key, "update operational status", &e);
        }
        ActionSuggestion::Continue
    }

    /// Parcel-level self report
    ///
    /// Reporting FAILED on an ACTIVE parcel also moves the parcel to FAILED,
    /// which lets a later `start_activity` take it over.
    pub async fn update_activity_status(
        &self,
        parcel_id: &Identifier,
        instant: DateTime<Utc>,
        status: ComponentStatus,
    ) -> ActionSuggestion {
        let key = parcel_id.render();
        let parcels = &self.coordinator.directories().parcels;

        let mut parcel = match parcels.get(&key).await {
            Ok(Some(parcel)) => parcel,
            Ok(None) => return ActionSuggestion::Continue,
            Err(e) => {
                log_record_error(&key, "update activity status", &e);
                return ActionSuggestion::Continue;
            }
        };

        parcel.watchdog.update(status, instant);
        if status == ComponentStatus::Failed && parcel.status == ParcelStatus::Active {
            parcel.status = ParcelStatus::Failed;
            tracing::warn!(parcel = %key, wup = %parcel.watchdog.wup_id, "Parcel reported failed");
        }

        if let Err(e) = parcels.replace(&key, &parcel).await {
            log_record_error(&key, "update activity status", &e);
        }
        ActionSuggestion::Continue
    }

    /// Read-only failover poll
    pub async fn get_peer_activity_status(&self, parcel_id: &Identifier) -> ActionSuggestion {
        let key = parcel_id.render();
        match self.coordinator.directories().parcels.get(&key).await {
            // A recorded outcome means the work is done, whoever reported it
            Ok(Some(parcel)) if parcel.uow.is_processed() => ActionSuggestion::Halt,
            Ok(Some(parcel)) => suggestion_for(parcel.watchdog.status),
            Ok(None) => ActionSuggestion::Halt,
            Err(e) => {
                log_record_error(&key, "peer activity poll", &e);
                ActionSuggestion::Pause
            }
        }
    }

    /// Unfinalised parcels a processor may care about
    ///
    /// A parcel is relevant when it supports `function_id` or lists `wup_id`
    /// among its registered WUPs. Ordered by instantiation instant.
    pub async fn get_relevant_parcels(
        &self,
        wup_id: &Identifier,
        function_id: &Identifier,
    ) -> Vec<Parcel> {
        let all = match self.coordinator.parcels().await {
            Ok(all) => all,
            Err(e) => {
                log_record_error("*", "relevant parcels", &e);
                return Vec::new();
            }
        };

        let mut relevant: Vec<Parcel> = all
            .into_iter()
            .filter(|p| p.status != ParcelStatus::Finalised)
            .filter(|p| {
                &p.registration.supporting_function == function_id
                    || p.registration.registered_wups.contains(wup_id)
            })
            .collect();
        relevant.sort_by(|a, b| {
            a.registration
                .instantiation_instant
                .cmp(&b.registration.instantiation_instant)
                .then_with(|| a.id().cmp(b.id()))
        });
        relevant
    }

    /// Add `successor` to the precursor parcel's successor set
    async fn link_successor(&self, precursor: &Identifier, successor: &Identifier) {
        let key = precursor.render();
        let parcels = &self.coordinator.directories().parcels;

        match parcels.get(&key).await {
            Ok(Some(mut parent)) => {
                if parent.add_successor(successor.clone()) {
                    if let Err(e) = parcels.replace(&key, &parent).await {
                        log_record_error(&key, "link successor", &e);
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(precursor = %key, "Precursor parcel already retired");
            }
            Err(e) => log_record_error(&key, "link successor", &e),
        }
    }

    /// Clear an UNRESPONSIVE flag a deadline check left on the owner's
    /// watchdog entry for this parcel
    async fn release_late_owner(&self, owner: &Identifier, parcel_id: &Identifier, now: DateTime<Utc>) {
        let key = owner.render();
        let mut entry = match self.coordinator.directories().watchdog.get(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                log_record_error(&key, "release owner", &e);
                return;
            }
        };
        if entry.status != ComponentStatus::Unresponsive
            || entry.current_parcel.as_ref() != Some(parcel_id)
        {
            return;
        }

        entry.status = ComponentStatus::Idle;
        entry.last_status_update = now;
        entry.current_parcel = None;
        tracing::info!(wup = %owner, parcel = %parcel_id, "Late owner reported in, released");
        if let Err(e) = self.coordinator.update_ci_status(entry).await {
            log_record_error(&key, "release owner", &e);
        }
    }

    /// Returns false if the write did not happen
    async fn archive_parcel(&self, parcel: &Parcel) -> bool {
        let Some(archive) = &self.archive else {
            return false;
        };
        match archive.archive(parcel).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(parcel = %parcel.key(), "Critical write failed: {}", e);
                false
            }
        }
    }
}

/// Peer poll decision table
pub fn suggestion_for(status: ComponentStatus) -> ActionSuggestion {
    match status {
        ComponentStatus::Active => ActionSuggestion::Pause,
        ComponentStatus::Idle => ActionSuggestion::Halt,
        ComponentStatus::Failed | ComponentStatus::Unresponsive => ActionSuggestion::Continue,
    }
}

fn log_record_error(key: &str, operation: &str, err: &RecordError) {
    if err.is_integrity_violation() {
        tracing::error!(key, operation, "{}", err);
    } else {
        tracing::warn!(key, operation, "{}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForwardError;
    use crate::node::{CoordinatorConfig, Directories, ForwardRecord, SiteForwarder};

    struct NoPeers;

    #[async_trait::async_trait]
    impl SiteForwarder for NoPeers {
        async fn forward(&self, endpoint: &str, _record: &ForwardRecord) -> Result<(), ForwardError> {
            Err(ForwardError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "no peers in unit tests".into(),
            })
        }
    }

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn agent() -> ParcelAgent {
        let config = CoordinatorConfig::new(id("deployment=test.site=site-a.pod=p1.node=parcel-node"));
        let coordinator = NodeCoordinator::new(config, Directories::in_memory(), Arc::new(NoPeers));
        ParcelAgent::new(Arc::new(coordinator), AgentConfig::default(), None).unwrap()
    }

    fn uow() -> UnitOfWork {
        UnitOfWork::new(id("function=ingest.hash=abc123"), id("function=ingest"))
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(suggestion_for(ComponentStatus::Active), ActionSuggestion::Pause);
        assert_eq!(suggestion_for(ComponentStatus::Idle), ActionSuggestion::Halt);
        assert_eq!(suggestion_for(ComponentStatus::Failed), ActionSuggestion::Continue);
        assert_eq!(suggestion_for(ComponentStatus::Unresponsive), ActionSuggestion::Continue);
    }

    #[test]
    fn test_critical_write_requires_archive() {
        let config = CoordinatorConfig::new(id("node=n"));
        let coordinator = Arc::new(NodeCoordinator::new(config, Directories::in_memory(), Arc::new(NoPeers)));
        let agent_config = AgentConfig {
            critical_write: true,
            ..Default::default()
        };
        assert!(matches!(
            ParcelAgent::new(coordinator, agent_config, None),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_register_wup_keeps_first_entry() {
        let agent = agent();
        let wup = id("wup=wup-1");

        agent.register_work_unit_processor(&wup, &id("function=ingest")).await;
        agent.register_work_unit_processor(&wup, &id("function=other")).await;

        let entries = agent.coordinator().watchdog_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].supported_function, Some(id("function=ingest")));
        assert!(agent
            .coordinator()
            .capable_wups(&id("function=ingest"))
            .await
            .unwrap()
            .contains(&wup));
    }

    #[tokio::test]
    async fn test_missing_parcel_suggestions() {
        let agent = agent();
        let missing = id("function=gone.parcel=primary");

        assert_eq!(agent.start_activity(&missing).await, ActionSuggestion::Halt);
        assert_eq!(agent.get_peer_activity_status(&missing).await, ActionSuggestion::Halt);
        assert_eq!(
            agent.finish_activity(&missing, uow(), ProcessingOutcome::Success).await,
            ActionSuggestion::Halt
        );
        assert_eq!(agent.finalise_activity(&missing, uow()).await, ProcessingOutcome::Success);
    }

    #[tokio::test]
    async fn test_malformed_parcel_is_conservative() {
        let agent = agent();
        let parcel_id = Parcel::id_for(&uow().id);
        agent
            .coordinator()
            .directories()
            .parcels
            .store()
            .put(&parcel_id.render(), "{\"not\":\"a parcel\"}")
            .await
            .unwrap();

        assert_eq!(agent.start_activity(&parcel_id).await, ActionSuggestion::Pause);
        assert_eq!(agent.get_peer_activity_status(&parcel_id).await, ActionSuggestion::Pause);
        assert_eq!(
            agent.finish_activity(&parcel_id, uow(), ProcessingOutcome::Success).await,
            ActionSuggestion::Halt
        );
        assert_eq!(agent.finalise_activity(&parcel_id, uow()).await, ProcessingOutcome::Failure);
    }

    #[tokio::test]
    async fn test_failed_report_enables_takeover() {
        let agent = agent();
        let parcel = agent
            .register_activity(&id("wup=wup-1"), &id("function=ingest"), uow(), None)
            .await
            .unwrap();

        assert_eq!(agent.start_activity(parcel.id()).await, ActionSuggestion::Continue);
        agent
            .update_activity_status(parcel.id(), Utc::now(), ComponentStatus::Failed)
            .await;

        let stored = agent.coordinator().parcel(&parcel.key()).await.unwrap().unwrap();
        assert_eq!(stored.status, ParcelStatus::Failed);
        assert_eq!(agent.get_peer_activity_status(parcel.id()).await, ActionSuggestion::Continue);

        assert_eq!(agent.start_activity(parcel.id()).await, ActionSuggestion::Continue);
        let stored = agent.coordinator().parcel(&parcel.key()).await.unwrap().unwrap();
        assert_eq!(stored.status, ParcelStatus::Active);
    }

    #[tokio::test]
    async fn test_precursor_gains_successor() {
        let agent = agent();
        let first = agent
            .register_activity(&id("wup=fetch"), &id("function=fetch"), UnitOfWork::new(id("function=fetch.hash=abc123"), id("function=fetch")), None)
            .await
            .unwrap();

        let second = agent
            .register_activity(&id("wup=wup-1"), &id("function=ingest"), uow(), Some(first.id().clone()))
            .await
            .unwrap();
        assert_eq!(second.precursor.as_ref(), Some(first.id()));

        let first = agent.coordinator().parcel(&first.key()).await.unwrap().unwrap();
        assert!(first.successors().contains(second.id()));
    }

    #[tokio::test]
    async fn test_multicast_attempts_join_grouping() {
        let agent = agent();
        for (wup, disc) in [("wup=a", "1"), ("wup=b", "2")] {
            let attempt = UnitOfWork::new(
                id("function=ingest.hash=abc123").child("discriminator", disc).unwrap(),
                id("function=ingest"),
            );
            agent
                .register_activity(&id(wup), &id("function=ingest"), attempt, None)
                .await
                .unwrap();
        }

        let members = agent
            .coordinator()
            .multicast_members(&id("function=ingest.hash=abc123"))
            .await
            .unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_relevant_parcels() {
        let agent = agent();
        let mine = agent
            .register_activity(&id("wup=wup-1"), &id("function=ingest"), uow(), None)
            .await
            .unwrap();
        agent
            .register_activity(
                &id("wup=other"),
                &id("function=store"),
                UnitOfWork::new(id("function=store.hash=1"), id("function=store")),
                None,
            )
            .await
            .unwrap();

        let relevant = agent
            .get_relevant_parcels(&id("wup=wup-2"), &id("function=ingest"))
            .await;
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].id(), mine.id());

        let done = uow().complete(vec![], ProcessingOutcome::Success);
        agent
            .finish_activity(mine.id(), done.clone(), ProcessingOutcome::Success)
            .await;
        agent.finalise_activity(mine.id(), done).await;
        assert!(agent
            .get_relevant_parcels(&id("wup=wup-2"), &id("function=ingest"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_operational_status_upserts_watchdog() {
        let agent = agent();
        let wup = id("wup=wup-1");
        agent.register_work_unit_processor(&wup, &id("function=ingest")).await;

        let at = Utc::now();
        assert_eq!(
            agent.update_operational_status(&wup, at, ComponentStatus::Failed).await,
            ActionSuggestion::Continue
        );
        let entries = agent.coordinator().watchdog_entries().await.unwrap();
        assert_eq!(entries[0].status, ComponentStatus::Failed);
        assert_eq!(entries[0].last_status_update, at);
        assert_eq!(entries[0].supported_function, Some(id("function=ingest")));

        // Unknown components get a fresh entry
        let stranger = id("wup=stranger");
        agent
            .update_operational_status(&stranger, at, ComponentStatus::Active)
            .await;
        assert_eq!(agent.coordinator().watchdog_entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_late_owner_finishing_is_not_offered_for_takeover() {
        let agent = agent();
        let wup = id("wup=wup-1");
        agent.register_work_unit_processor(&wup, &id("function=ingest")).await;
        let parcel = agent
            .register_activity(&wup, &id("function=ingest"), uow(), None)
            .await
            .unwrap();
        assert_eq!(agent.start_activity(parcel.id()).await, ActionSuggestion::Continue);

        let decision = agent.coordinator().process_late_parcel(&parcel.key()).await.unwrap();
        assert_eq!(decision, crate::node::LateParcelDecision::MarkedUnresponsive);
        assert_eq!(agent.get_peer_activity_status(parcel.id()).await, ActionSuggestion::Continue);

        assert_eq!(
            agent.finish_activity(parcel.id(), uow(), ProcessingOutcome::Success).await,
            ActionSuggestion::Continue
        );

        let stored = agent.coordinator().parcel(&parcel.key()).await.unwrap().unwrap();
        assert_eq!(stored.status, ParcelStatus::Finished);
        assert_eq!(stored.watchdog.status, ComponentStatus::Idle);
        assert_eq!(agent.get_peer_activity_status(parcel.id()).await, ActionSuggestion::Halt);
        assert_eq!(agent.start_activity(parcel.id()).await, ActionSuggestion::Halt);

        let stored = agent.coordinator().parcel(&parcel.key()).await.unwrap().unwrap();
        assert_eq!(stored.status, ParcelStatus::Finished);

        let entries = agent.coordinator().watchdog_entries().await.unwrap();
        let owner = entries.iter().find(|e| e.component_id == wup).unwrap();
        assert_eq!(owner.status, ComponentStatus::Idle);
        assert!(owner.current_parcel.is_none());
    }

    #[tokio::test]
    async fn test_recorded_outcome_halts_peers_whatever_the_watchdog() {
        let agent = agent();
        let parcel = agent
            .register_activity(&id("wup=wup-1"), &id("function=ingest"), uow(), None)
            .await
            .unwrap();

        let mut stored = parcel.clone();
        stored.uow.outcome = Some(ProcessingOutcome::Success);
        stored.watchdog.status = ComponentStatus::Unresponsive;
        agent.coordinator().directories().parcels.put(&parcel.key(), &stored).await.unwrap();

        assert_eq!(agent.get_peer_activity_status(parcel.id()).await, ActionSuggestion::Halt);
        assert_eq!(agent.start_activity(parcel.id()).await, ActionSuggestion::Halt);
    }
}
