//! Outcome of one reconciliation run

use crate::inventory::InventoryOp;
use accel_placement::InventoryAction;
use accel_types::{PciAddress, ProviderId, ResourceClassName};
use std::collections::BTreeMap;
use std::fmt;

/// A record-level operation that failed; the run continued past it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub address: PciAddress,
    pub operation: InventoryOp,
    pub error: String,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.operation, self.address, self.error)
    }
}

/// Why capability publication did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoCredentials,
    NoEndpoint,
    NoProvider,
    ProviderLookupFailed(String),
}

/// A trait or resource-class sync call that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityFailure {
    /// Vendor bucket (trait sync) or resource class name
    pub target: String,
    pub error: String,
}

/// What capability publication did for the host's provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySync {
    pub provider: ProviderId,
    pub attached_traits: Vec<String>,
    pub classes: BTreeMap<ResourceClassName, InventoryAction>,
    pub failures: Vec<CapabilityFailure>,
}

/// Capability publication result for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityOutcome {
    Skipped(SkipReason),
    Synced(CapabilitySync),
}

impl Default for CapabilityOutcome {
    fn default() -> Self {
        CapabilityOutcome::Skipped(SkipReason::NoCredentials)
    }
}

impl CapabilityOutcome {
    pub fn synced(&self) -> Option<&CapabilitySync> {
        match self {
            CapabilityOutcome::Synced(sync) => Some(sync),
            CapabilityOutcome::Skipped(_) => None,
        }
    }
}

/// Everything one `update_usage` run changed or failed to change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<PciAddress>,
    pub updated: Vec<PciAddress>,
    pub deleted: Vec<PciAddress>,

    /// Virtual functions left for a later run because their parent has no record
    pub deferred: Vec<PciAddress>,

    pub failures: Vec<RecordFailure>,
    pub capabilities: CapabilityOutcome,

    /// Set when the image refresh failed and cached images were used
    pub catalog_error: Option<String>,
}

impl ReconcileReport {
    pub(crate) fn fail(
        &mut self,
        address: PciAddress,
        operation: InventoryOp,
        error: impl fmt::Display,
    ) {
        tracing::error!(
            address = %address,
            operation = %operation,
            error = %error,
            "Deployable operation failed"
        );
        self.failures.push(RecordFailure {
            address,
            operation,
            error: error.to_string(),
        });
    }

    /// Number of successful inventory mutations
    pub fn mutations(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// No failures and nothing deferred
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.deferred.is_empty()
    }
}
