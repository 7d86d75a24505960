//! Accel Placement - Capability publication to the capacity-tracking service
//!
//! Publishes what the host's accelerators can do as traits and counted
//! resource classes on the host's resource provider:
//!
//! - **PlacementApi**: Typed client interface (HTTP or in-memory)
//! - **CapabilitySynchronizer**: Additive trait sync and inventory upserts

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod client;
pub mod error;
pub mod http;
pub mod memory;
pub mod sync;

// Re-exports
pub use client::{Inventory, PlacementApi, ProviderInventory, ProviderTraits, ResourceProvider};
pub use error::{PlacementError, Result};
pub use http::HttpPlacementClient;
pub use memory::{InMemoryPlacement, PlacementCall};
pub use sync::{CapabilitySynchronizer, InventoryAction, TraitSyncOutcome};
