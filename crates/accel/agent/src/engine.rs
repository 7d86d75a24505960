//! Reconciliation engine
//!
//! One `update_usage` run brings the remote inventory in line with the
//! devices discovered on the host and publishes derived capabilities:
//!
//! 1. discover and flatten devices
//! 2. refresh the image cache and derive vendor summaries
//! 3. sync traits and resource-class inventories on the host's provider
//! 4. update drifted records, create new ones (physical functions before
//!    their virtual functions), delete records whose device is gone
//!
//! Record-level failures are collected in the [`ReconcileReport`]; only a
//! discovery failure or an unreadable inventory aborts the run.

use crate::discovery::{discover_all, DeviceDiscovery, DiscoveredDevices};
use crate::error::AgentResult;
use crate::inventory::{InventoryApi, InventoryOp};
use crate::report::{
    CapabilityFailure, CapabilityOutcome, CapabilitySync, ReconcileReport, SkipReason,
};
use accel_catalog::ImageCache;
use accel_placement::{CapabilitySynchronizer, PlacementApi};
use accel_types::{
    DeployableId, DeployableRecord, Device, FunctionKind, NamedGate, PciAddress,
    ResourceClassName, ServiceKind, TokenSource, VendorSummaries, RESOURCE_GATE,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::instrument;

/// Assignable device counts per (lower-cased vendor id, function kind)
pub type AssignableCounts = BTreeMap<(String, FunctionKind), u32>;

/// Count assignable devices per vendor and function kind
pub fn assignable_counts(discovered: &DiscoveredDevices) -> AssignableCounts {
    let mut counts = AssignableCounts::new();
    for device in discovered.values().filter(|d| d.assignable) {
        *counts
            .entry((device.vendor_id.to_lowercase(), device.function))
            .or_default() += 1;
    }
    counts
}

/// Reconciles one host's accelerators with the remote services
pub struct ReconcileEngine {
    host: String,
    discovery: Arc<dyn DeviceDiscovery>,
    inventory: Arc<dyn InventoryApi>,
    images: Arc<ImageCache>,
    capabilities: CapabilitySynchronizer,
    tokens: Arc<dyn TokenSource>,
    gate: NamedGate,
}

impl ReconcileEngine {
    pub fn new(
        host: impl Into<String>,
        discovery: Arc<dyn DeviceDiscovery>,
        inventory: Arc<dyn InventoryApi>,
        images: Arc<ImageCache>,
        placement: Arc<dyn PlacementApi>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            host: host.into(),
            discovery,
            inventory,
            images,
            capabilities: CapabilitySynchronizer::new(placement),
            tokens,
            gate: NamedGate::new(RESOURCE_GATE),
        }
    }

    /// Serialize runs on an externally owned gate
    pub fn with_gate(mut self, gate: NamedGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn gate(&self) -> &NamedGate {
        &self.gate
    }

    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }

    /// Current flattened discovery snapshot
    pub async fn discover(&self) -> AgentResult<DiscoveredDevices> {
        Ok(discover_all(self.discovery.as_ref()).await?)
    }

    /// Run one full reconciliation
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn update_usage(&self) -> AgentResult<ReconcileReport> {
        let _gate = self.gate.acquire().await;

        let discovered = self.discover().await?;
        tracing::debug!(devices = discovered.len(), "Discovery complete");

        let mut report = ReconcileReport::default();

        if let Err(e) = self.images.refresh().await {
            tracing::warn!(error = %e, "Image refresh failed, using cached images");
            report.catalog_error = Some(e.to_string());
        }
        let summaries = self.images.derive_summary().await;
        let counts = assignable_counts(&discovered);
        report.capabilities = self.sync_capabilities(&summaries, &counts).await;

        let mut existing = self.existing_records().await?;

        self.update_phase(&discovered, &mut existing, &mut report).await;
        self.create_phase(&discovered, &existing, &mut report).await;
        self.delete_phase(&discovered, &existing, &mut report).await;

        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            deferred = report.deferred.len(),
            failures = report.failures.len(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// This host's records keyed by address
    async fn existing_records(&self) -> AgentResult<BTreeMap<PciAddress, DeployableRecord>> {
        let mut existing: BTreeMap<PciAddress, DeployableRecord> = BTreeMap::new();
        for record in self.inventory.list_by_host(&self.host).await? {
            let address = record.address;
            if let Some(kept) = existing.get(&address) {
                tracing::warn!(
                    address = %address,
                    kept = %kept.uuid,
                    ignored = %record.uuid,
                    "Duplicate deployable for address"
                );
                continue;
            }
            existing.insert(address, record);
        }
        Ok(existing)
    }

    async fn sync_capabilities(
        &self,
        summaries: &VendorSummaries,
        counts: &AssignableCounts,
    ) -> CapabilityOutcome {
        let Some(session) = self.tokens.session().await else {
            tracing::debug!("No credentials, skipping capability sync");
            return CapabilityOutcome::Skipped(SkipReason::NoCredentials);
        };
        if session.endpoint(ServiceKind::Placement).is_none() {
            tracing::debug!("No placement endpoint, skipping capability sync");
            return CapabilityOutcome::Skipped(SkipReason::NoEndpoint);
        }

        let provider = match self.capabilities.resolve_provider(&session, &self.host).await {
            Ok(Some(provider)) => provider,
            Ok(None) => return CapabilityOutcome::Skipped(SkipReason::NoProvider),
            Err(e) => {
                tracing::error!(error = %e, "Resource provider lookup failed");
                return CapabilityOutcome::Skipped(SkipReason::ProviderLookupFailed(e.to_string()));
            }
        };

        let mut sync = CapabilitySync {
            provider,
            attached_traits: Vec::new(),
            classes: BTreeMap::new(),
            failures: Vec::new(),
        };

        for (vendor, summary) in summaries {
            match self
                .capabilities
                .sync_traits(&session, &provider, &summary.traits)
                .await
            {
                Ok(outcome) => sync.attached_traits.extend(outcome.attached),
                Err(e) => {
                    tracing::error!(vendor = %vendor, error = %e, "Trait sync failed");
                    sync.failures.push(CapabilityFailure {
                        target: vendor.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for ((vendor, function), count) in counts.iter().filter(|(_, count)| **count > 0) {
            let class = ResourceClassName::fpga(vendor, *function);
            match self
                .capabilities
                .sync_resource_class(&session, &provider, &class, *count)
                .await
            {
                Ok(action) => {
                    sync.classes.insert(class, action);
                }
                Err(e) => {
                    tracing::error!(class = %class, error = %e, "Resource class sync failed");
                    sync.failures.push(CapabilityFailure {
                        target: class.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        CapabilityOutcome::Synced(sync)
    }

    /// Push mapped-field drift for devices that already have a record
    async fn update_phase(
        &self,
        discovered: &DiscoveredDevices,
        existing: &mut BTreeMap<PciAddress, DeployableRecord>,
        report: &mut ReconcileReport,
    ) {
        for (address, device) in discovered {
            let Some(record) = existing.get_mut(address) else {
                continue;
            };

            let mut updated = record.clone();
            let drifted = updated.sync_from(device);
            if drifted.is_empty() {
                continue;
            }

            match self.inventory.update(&updated).await {
                Ok(()) => {
                    tracing::info!(
                        address = %address,
                        fields = ?drifted.iter().map(|f| f.target()).collect::<Vec<_>>(),
                        "Updated deployable"
                    );
                    *record = updated;
                    report.updated.push(*address);
                }
                Err(e) => report.fail(*address, InventoryOp::Update, e),
            }
        }
    }

    /// Create records for new devices, parents before children
    async fn create_phase(
        &self,
        discovered: &DiscoveredDevices,
        existing: &BTreeMap<PciAddress, DeployableRecord>,
        report: &mut ReconcileReport,
    ) {
        let mut pending: BTreeSet<PciAddress> = discovered
            .keys()
            .filter(|address| !existing.contains_key(address))
            .copied()
            .collect();
        let mut known: BTreeMap<PciAddress, DeployableId> = existing
            .iter()
            .map(|(address, record)| (*address, record.uuid))
            .collect();

        let new_physical: Vec<&Device> = pending
            .iter()
            .filter_map(|address| discovered.get(address))
            .filter(|device| device.is_physical())
            .collect();

        for pf in new_physical {
            pending.remove(&pf.address);
            let Some(pf_uuid) = self.create_record(pf, None, report).await else {
                continue;
            };
            known.insert(pf.address, pf_uuid);

            for vf_address in pf.region_addresses() {
                if !pending.remove(&vf_address) {
                    continue;
                }
                let Some(vf) = discovered.get(&vf_address) else {
                    continue;
                };
                if let Some(uuid) = self.create_record(vf, Some(pf_uuid), report).await {
                    known.insert(vf_address, uuid);
                }
            }
        }

        // Virtual functions whose parent was already recorded, or whose
        // parent's create failed above.
        for address in pending {
            let Some(vf) = discovered.get(&address) else {
                continue;
            };
            match vf.parent.and_then(|parent| known.get(&parent).copied()) {
                Some(parent_uuid) => {
                    if let Some(uuid) = self.create_record(vf, Some(parent_uuid), report).await {
                        known.insert(address, uuid);
                    }
                }
                None => {
                    tracing::warn!(
                        address = %address,
                        parent = ?vf.parent,
                        "Parent has no deployable, deferring"
                    );
                    report.deferred.push(address);
                }
            }
        }
    }

    async fn create_record(
        &self,
        device: &Device,
        parent: Option<DeployableId>,
        report: &mut ReconcileReport,
    ) -> Option<DeployableId> {
        let record = DeployableRecord::from_device(self.host.as_str(), device, parent);
        match self.inventory.create(&record).await {
            Ok(created) => {
                tracing::info!(
                    address = %device.address,
                    uuid = %created.uuid,
                    function = %device.function,
                    "Created deployable"
                );
                report.created.push(device.address);
                Some(created.uuid)
            }
            Err(e) => {
                report.fail(device.address, InventoryOp::Create, e);
                None
            }
        }
    }

    /// Remove records whose device is no longer present
    async fn delete_phase(
        &self,
        discovered: &DiscoveredDevices,
        existing: &BTreeMap<PciAddress, DeployableRecord>,
        report: &mut ReconcileReport,
    ) {
        for (address, record) in existing {
            if discovered.contains_key(address) {
                continue;
            }
            match self.inventory.delete(record).await {
                Ok(()) => {
                    tracing::info!(address = %address, uuid = %record.uuid, "Deleted deployable");
                    report.deleted.push(*address);
                }
                Err(e) => report.fail(*address, InventoryOp::Delete, e),
            }
        }
    }
}
