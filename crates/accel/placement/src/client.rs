//! Capacity-tracking service interface and wire types

use crate::error::Result;
use accel_types::{AuthSession, ProviderId, ResourceClassName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Countable capacity of one resource class on a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub total: u32,
    pub reserved: u32,
    pub min_unit: u32,
    pub max_unit: u32,
    pub step_size: u32,
    pub allocation_ratio: f64,
}

impl Inventory {
    /// Inventory exposing `count` whole, unreserved units
    pub fn for_count(count: u32) -> Self {
        Self {
            total: count,
            reserved: 0,
            min_unit: 1,
            max_unit: count,
            step_size: 1,
            allocation_ratio: 1.0,
        }
    }
}

/// An inventory as stored on a provider, with the provider generation it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInventory {
    #[serde(flatten)]
    pub inventory: Inventory,

    #[serde(rename = "resource_provider_generation")]
    pub generation: u64,
}

/// Traits attached to a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTraits {
    pub traits: BTreeSet<String>,

    #[serde(rename = "resource_provider_generation")]
    pub generation: u64,
}

/// A resource provider as listed by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProvider {
    pub uuid: ProviderId,
    pub name: String,
    pub generation: u64,
}

/// Operations the agent needs from the capacity-tracking service
#[async_trait]
pub trait PlacementApi: Send + Sync {
    /// Every trait known to the service
    async fn list_traits(&self, session: &AuthSession) -> Result<BTreeSet<String>>;

    /// Register a custom trait
    async fn create_trait(&self, session: &AuthSession, name: &str) -> Result<()>;

    async fn provider_traits(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
    ) -> Result<ProviderTraits>;

    /// Replace the provider's trait set; fails on a stale generation
    async fn update_provider_traits(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        traits: &ProviderTraits,
    ) -> Result<()>;

    async fn resource_class_exists(
        &self,
        session: &AuthSession,
        class: &ResourceClassName,
    ) -> Result<bool>;

    async fn create_resource_class(
        &self,
        session: &AuthSession,
        class: &ResourceClassName,
    ) -> Result<()>;

    /// The provider's inventory of one class, `None` when it has none
    async fn provider_inventory(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
    ) -> Result<Option<ProviderInventory>>;

    async fn create_inventory(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        inventory: &Inventory,
    ) -> Result<()>;

    /// Replace an existing inventory; fails on a stale generation
    async fn update_inventory(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        inventory: &ProviderInventory,
    ) -> Result<()>;

    /// Provider registered under `name`, if any
    async fn provider_by_name(
        &self,
        session: &AuthSession,
        name: &str,
    ) -> Result<Option<ResourceProvider>>;
}
