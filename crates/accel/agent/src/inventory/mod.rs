//! Inventory service: the remote store of deployable records

mod http;
mod memory;

pub use http::HttpInventoryClient;
pub use memory::{InMemoryInventory, InventoryCall};

use crate::error::InventoryError;
use accel_types::DeployableRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Result type for inventory operations
pub type Result<T> = std::result::Result<T, InventoryError>;

/// A mutating inventory operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for InventoryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryOp::Create => f.write_str("create"),
            InventoryOp::Update => f.write_str("update"),
            InventoryOp::Delete => f.write_str("delete"),
        }
    }
}

/// CRUD access to the deployable records of a host
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Every record owned by `host`
    async fn list_by_host(&self, host: &str) -> Result<Vec<DeployableRecord>>;

    /// Store a new record; returns the record as persisted
    async fn create(&self, record: &DeployableRecord) -> Result<DeployableRecord>;

    /// Replace the record with the same uuid
    async fn update(&self, record: &DeployableRecord) -> Result<()>;

    async fn delete(&self, record: &DeployableRecord) -> Result<()>;
}
