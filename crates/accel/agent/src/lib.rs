//! Accel Agent - Accelerator resource agent
//!
//! The agent keeps a remote inventory of deployable records in step with
//! the accelerators present on its host and publishes what they can do to
//! the capacity-tracking service.
//!
//! - **Discovery**: Driver-reported device forests, flattened by address
//! - **Inventory**: CRUD client for deployable records
//! - **ReconcileEngine**: The `update_usage` run
//! - **AgentManager**: Entry points for periodic and on-demand work
//! - **Scheduler**: Interval driver with manual trigger

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod manager;
pub mod report;
pub mod scheduler;

// Re-exports
pub use config::AgentConfig;
pub use discovery::{
    discover_all, flatten, DeviceDiscovery, DiscoveredDevices, FileDiscovery, InMemoryDiscovery,
};
pub use engine::{assignable_counts, AssignableCounts, ReconcileEngine};
pub use error::{AgentError, AgentResult, DiscoveryError, InventoryError};
pub use inventory::{
    HttpInventoryClient, InMemoryInventory, InventoryApi, InventoryCall, InventoryOp,
};
pub use manager::AgentManager;
pub use report::{
    CapabilityFailure, CapabilityOutcome, CapabilitySync, ReconcileReport, RecordFailure,
    SkipReason,
};
pub use scheduler::Scheduler;
