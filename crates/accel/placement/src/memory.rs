//! In-memory capacity-tracking service
//!
//! Behaves like the real service for the calls the agent makes, including
//! generation checks, and journals every mutating call for assertions.

use crate::client::{Inventory, PlacementApi, ProviderInventory, ProviderTraits, ResourceProvider};
use crate::error::{PlacementError, Result};
use accel_types::{AuthSession, ProviderId, ResourceClassName};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

/// A mutating call received by [`InMemoryPlacement`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementCall {
    CreateTrait(String),
    UpdateProviderTraits {
        provider: ProviderId,
        traits: BTreeSet<String>,
    },
    CreateResourceClass(ResourceClassName),
    CreateInventory {
        provider: ProviderId,
        class: ResourceClassName,
        inventory: Inventory,
    },
    UpdateInventory {
        provider: ProviderId,
        class: ResourceClassName,
        inventory: Inventory,
    },
}

#[derive(Debug)]
struct ProviderState {
    name: String,
    generation: u64,
    traits: BTreeSet<String>,
    inventories: BTreeMap<ResourceClassName, Inventory>,
}

#[derive(Debug, Default)]
struct State {
    traits: BTreeSet<String>,
    resource_classes: BTreeSet<ResourceClassName>,
    providers: HashMap<ProviderId, ProviderState>,
    calls: Vec<PlacementCall>,
    unavailable: bool,
}

/// In-memory placement service
#[derive(Debug, Default)]
pub struct InMemoryPlacement {
    state: Mutex<State>,
}

impl InMemoryPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider and return its id
    pub async fn add_provider(&self, name: &str) -> ProviderId {
        let id = ProviderId::generate();
        self.state.lock().await.providers.insert(
            id,
            ProviderState {
                name: name.to_string(),
                generation: 0,
                traits: BTreeSet::new(),
                inventories: BTreeMap::new(),
            },
        );
        id
    }

    /// Attach traits to a provider directly, bypassing the call journal
    pub async fn seed_provider_traits<I, S>(&self, provider: &ProviderId, traits: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock().await;
        let traits: Vec<String> = traits.into_iter().map(Into::into).collect();
        state.traits.extend(traits.iter().cloned());
        if let Some(p) = state.providers.get_mut(provider) {
            p.traits.extend(traits);
            p.generation += 1;
        }
    }

    pub async fn traits_of(&self, provider: &ProviderId) -> BTreeSet<String> {
        self.state
            .lock()
            .await
            .providers
            .get(provider)
            .map(|p| p.traits.clone())
            .unwrap_or_default()
    }

    pub async fn inventory_of(
        &self,
        provider: &ProviderId,
        class: &ResourceClassName,
    ) -> Option<Inventory> {
        self.state
            .lock()
            .await
            .providers
            .get(provider)
            .and_then(|p| p.inventories.get(class).cloned())
    }

    /// Every mutating call received so far, in order
    pub async fn calls(&self) -> Vec<PlacementCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Make every subsequent call fail as if the service were down
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }
}

impl State {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(PlacementError::Api {
                status: 503,
                message: "placement unavailable".into(),
            });
        }
        Ok(())
    }

    fn provider_mut(&mut self, id: &ProviderId) -> Result<&mut ProviderState> {
        self.providers
            .get_mut(id)
            .ok_or_else(|| PlacementError::NotFound(format!("resource provider {}", id)))
    }

    fn provider(&self, id: &ProviderId) -> Result<&ProviderState> {
        self.providers
            .get(id)
            .ok_or_else(|| PlacementError::NotFound(format!("resource provider {}", id)))
    }
}

fn check_generation(provider: &ProviderState, expected: u64) -> Result<()> {
    if provider.generation != expected {
        return Err(PlacementError::Conflict(format!(
            "provider generation is {}, request carried {}",
            provider.generation, expected
        )));
    }
    Ok(())
}

#[async_trait]
impl PlacementApi for InMemoryPlacement {
    async fn list_traits(&self, _session: &AuthSession) -> Result<BTreeSet<String>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.traits.clone())
    }

    async fn create_trait(&self, _session: &AuthSession, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.traits.insert(name.to_string());
        state.calls.push(PlacementCall::CreateTrait(name.to_string()));
        Ok(())
    }

    async fn provider_traits(
        &self,
        _session: &AuthSession,
        provider: &ProviderId,
    ) -> Result<ProviderTraits> {
        let state = self.state.lock().await;
        state.check_available()?;
        let p = state.provider(provider)?;
        Ok(ProviderTraits {
            traits: p.traits.clone(),
            generation: p.generation,
        })
    }

    async fn update_provider_traits(
        &self,
        _session: &AuthSession,
        provider: &ProviderId,
        traits: &ProviderTraits,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if let Some(unknown) = traits.traits.iter().find(|t| !state.traits.contains(*t)) {
            return Err(PlacementError::Api {
                status: 400,
                message: format!("unknown trait {}", unknown),
            });
        }
        let p = state.provider_mut(provider)?;
        check_generation(p, traits.generation)?;
        p.traits = traits.traits.clone();
        p.generation += 1;
        state.calls.push(PlacementCall::UpdateProviderTraits {
            provider: *provider,
            traits: traits.traits.clone(),
        });
        Ok(())
    }

    async fn resource_class_exists(
        &self,
        _session: &AuthSession,
        class: &ResourceClassName,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.resource_classes.contains(class))
    }

    async fn create_resource_class(
        &self,
        _session: &AuthSession,
        class: &ResourceClassName,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if !state.resource_classes.insert(class.clone()) {
            return Err(PlacementError::Conflict(format!("resource class {} exists", class)));
        }
        state.calls.push(PlacementCall::CreateResourceClass(class.clone()));
        Ok(())
    }

    async fn provider_inventory(
        &self,
        _session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
    ) -> Result<Option<ProviderInventory>> {
        let state = self.state.lock().await;
        state.check_available()?;
        let p = state.provider(provider)?;
        Ok(p.inventories.get(class).map(|inventory| ProviderInventory {
            inventory: inventory.clone(),
            generation: p.generation,
        }))
    }

    async fn create_inventory(
        &self,
        _session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        inventory: &Inventory,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if !state.resource_classes.contains(class) {
            return Err(PlacementError::NotFound(format!("resource class {}", class)));
        }
        let p = state.provider_mut(provider)?;
        if p.inventories.contains_key(class) {
            return Err(PlacementError::Conflict(format!(
                "inventory for {} already exists",
                class
            )));
        }
        p.inventories.insert(class.clone(), inventory.clone());
        p.generation += 1;
        state.calls.push(PlacementCall::CreateInventory {
            provider: *provider,
            class: class.clone(),
            inventory: inventory.clone(),
        });
        Ok(())
    }

    async fn update_inventory(
        &self,
        _session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        inventory: &ProviderInventory,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let p = state.provider_mut(provider)?;
        check_generation(p, inventory.generation)?;
        let slot = p
            .inventories
            .get_mut(class)
            .ok_or_else(|| PlacementError::NotFound(format!("inventory for {}", class)))?;
        *slot = inventory.inventory.clone();
        p.generation += 1;
        state.calls.push(PlacementCall::UpdateInventory {
            provider: *provider,
            class: class.clone(),
            inventory: inventory.inventory.clone(),
        });
        Ok(())
    }

    async fn provider_by_name(
        &self,
        _session: &AuthSession,
        name: &str,
    ) -> Result<Option<ResourceProvider>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .providers
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, p)| ResourceProvider {
                uuid: *id,
                name: p.name.clone(),
                generation: p.generation,
            }))
    }
}
