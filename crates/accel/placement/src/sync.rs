//! Capability synchronizer
//!
//! Publishes derived traits and per-vendor device counts on the host's
//! resource provider. Trait sync is additive: traits the provider already
//! carries are never removed.

use crate::client::{Inventory, PlacementApi, ProviderInventory, ProviderTraits};
use crate::error::Result;
use accel_types::{namespaced_trait, AuthSession, ProviderId, ResourceClassName};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What a trait sync changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraitSyncOutcome {
    /// Traits that had to be registered globally
    pub created: Vec<String>,

    /// Traits newly attached to the provider
    pub attached: Vec<String>,
}

impl TraitSyncOutcome {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.attached.is_empty()
    }
}

/// What a resource-class sync did to the provider's inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryAction {
    Created,
    Updated,
    Unchanged,
}

/// Keeps a provider's traits and inventories in step with the host
#[derive(Clone)]
pub struct CapabilitySynchronizer {
    api: Arc<dyn PlacementApi>,
}

impl CapabilitySynchronizer {
    pub fn new(api: Arc<dyn PlacementApi>) -> Self {
        Self { api }
    }

    /// Provider registered under the host's name
    pub async fn resolve_provider(
        &self,
        session: &AuthSession,
        name: &str,
    ) -> Result<Option<ProviderId>> {
        let provider = self.api.provider_by_name(session, name).await?;
        if provider.is_none() {
            tracing::warn!(provider = name, "No resource provider registered for host");
        }
        Ok(provider.map(|p| p.uuid))
    }

    /// Attach the namespaced form of every trait to the provider
    ///
    /// Missing traits are registered first. At most one provider update is
    /// issued, carrying the union of the new and the existing traits.
    pub async fn sync_traits<I, S>(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        traits: I,
    ) -> Result<TraitSyncOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = self.api.list_traits(session).await?;
        let current = self.api.provider_traits(session, provider).await?;

        let requested: BTreeSet<String> = traits
            .into_iter()
            .map(|t| namespaced_trait(t.as_ref()))
            .collect();

        let mut outcome = TraitSyncOutcome::default();
        for name in requested {
            if !known.contains(&name) {
                self.api.create_trait(session, &name).await?;
                tracing::debug!(trait_name = %name, "Created trait");
                outcome.created.push(name.clone());
            }
            if !current.traits.contains(&name) {
                outcome.attached.push(name);
            }
        }

        if !outcome.attached.is_empty() {
            let mut update = ProviderTraits {
                traits: current.traits.clone(),
                generation: current.generation,
            };
            update.traits.extend(outcome.attached.iter().cloned());
            self.api
                .update_provider_traits(session, provider, &update)
                .await?;
            tracing::info!(
                provider = %provider,
                attached = ?outcome.attached,
                "Updated provider traits"
            );
        }

        Ok(outcome)
    }

    /// Make the provider expose `count` units of `class`
    pub async fn sync_resource_class(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        count: u32,
    ) -> Result<InventoryAction> {
        if !self.api.resource_class_exists(session, class).await? {
            self.api.create_resource_class(session, class).await?;
            tracing::debug!(class = %class, "Created resource class");
        }

        let desired = Inventory::for_count(count);
        let action = match self.api.provider_inventory(session, provider, class).await? {
            None => {
                self.api
                    .create_inventory(session, provider, class, &desired)
                    .await?;
                InventoryAction::Created
            }
            Some(existing) if existing.inventory == desired => InventoryAction::Unchanged,
            Some(existing) => {
                let update = ProviderInventory {
                    inventory: desired,
                    generation: existing.generation,
                };
                self.api
                    .update_inventory(session, provider, class, &update)
                    .await?;
                InventoryAction::Updated
            }
        };

        tracing::debug!(class = %class, count, action = ?action, "Synced resource class");
        Ok(action)
    }
}
