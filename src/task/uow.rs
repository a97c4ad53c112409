//! Unit of Work envelope

use crate::identity::Identifier;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trailing component name that marks one attempt of a multicast UoW
pub const DISCRIMINATOR_COMPONENT: &str = "discriminator";

/// Result of processing a UoW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingOutcome {
    /// Processing succeeded
    Success,
    /// Processing failed
    Failure,
}

impl fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingOutcome::Success => write!(f, "success"),
            ProcessingOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// One discrete task input/output envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWork {
    /// UoW identity; parcel keys derive from it
    pub id: Identifier,
    /// Function required to process this UoW
    pub required_function: Identifier,
    /// Opaque input payloads
    pub ingress: Vec<String>,
    /// Opaque result payloads, filled on completion
    pub egress: Vec<String>,
    /// Absent while in flight
    pub outcome: Option<ProcessingOutcome>,
}

impl UnitOfWork {
    /// Create an in-flight UoW with no payloads
    pub fn new(id: Identifier, required_function: Identifier) -> Self {
        Self {
            id,
            required_function,
            ingress: Vec::new(),
            egress: Vec::new(),
            outcome: None,
        }
    }

    /// Attach an ingress payload
    pub fn with_ingress(mut self, payload: impl Into<String>) -> Self {
        self.ingress.push(payload.into());
        self
    }

    /// Record egress payloads and the processing outcome
    pub fn complete(mut self, egress: Vec<String>, outcome: ProcessingOutcome) -> Self {
        self.egress = egress;
        self.outcome = Some(outcome);
        self
    }

    /// Whether an outcome has been recorded
    pub fn is_processed(&self) -> bool {
        self.outcome.is_some()
    }

    /// Whether this is one attempt of a fanned-out UoW
    pub fn is_multicast(&self) -> bool {
        self.id.len() > 1 && self.id.last().name() == DISCRIMINATOR_COMPONENT
    }

    /// Shared identity of all attempts of a multicast UoW
    pub fn multicast_base(&self) -> Option<Identifier> {
        if self.is_multicast() {
            self.id.parent().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uow(id: &str) -> UnitOfWork {
        UnitOfWork::new(
            Identifier::parse(id).unwrap(),
            Identifier::parse("function=ingest").unwrap(),
        )
    }

    #[test]
    fn test_complete_sets_outcome() {
        let work = uow("function=ingest.hash=abc123").with_ingress("{\"a\":1}");
        assert!(!work.is_processed());

        let done = work.complete(vec!["{\"ok\":true}".into()], ProcessingOutcome::Success);
        assert!(done.is_processed());
        assert_eq!(done.outcome, Some(ProcessingOutcome::Success));
        assert_eq!(done.ingress.len(), 1);
        assert_eq!(done.egress.len(), 1);
    }

    #[test]
    fn test_multicast_base() {
        let plain = uow("function=ingest.hash=abc123");
        assert!(!plain.is_multicast());
        assert_eq!(plain.multicast_base(), None);

        let attempt = uow("function=ingest.hash=abc123.discriminator=2");
        assert!(attempt.is_multicast());
        assert_eq!(
            attempt.multicast_base().unwrap().render(),
            "function=ingest.hash=abc123"
        );
    }
}
