//! In-memory inventory service for tests and offline runs

use super::{InventoryApi, InventoryOp, Result};
use crate::error::InventoryError;
use accel_types::{DeployableId, DeployableRecord, PciAddress};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// A mutating call received by [`InMemoryInventory`]
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryCall {
    Create(DeployableRecord),
    Update(DeployableRecord),
    Delete(DeployableRecord),
}

impl InventoryCall {
    pub fn op(&self) -> InventoryOp {
        match self {
            InventoryCall::Create(_) => InventoryOp::Create,
            InventoryCall::Update(_) => InventoryOp::Update,
            InventoryCall::Delete(_) => InventoryOp::Delete,
        }
    }

    pub fn record(&self) -> &DeployableRecord {
        match self {
            InventoryCall::Create(r) | InventoryCall::Update(r) | InventoryCall::Delete(r) => r,
        }
    }
}

/// In-memory inventory keyed by record uuid
///
/// Rejects records whose parent does not exist, and can be told to fail
/// individual operations for chosen addresses.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    records: DashMap<DeployableId, DeployableRecord>,
    calls: Mutex<Vec<InventoryCall>>,
    failures: DashSet<(InventoryOp, PciAddress)>,
    list_unavailable: AtomicBool,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record directly, bypassing the call journal
    pub fn seed(&self, record: DeployableRecord) {
        self.records.insert(record.uuid, record);
    }

    /// All stored records, ordered by address
    pub fn records(&self) -> Vec<DeployableRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.address);
        records
    }

    pub fn record_at(&self, address: &PciAddress) -> Option<DeployableRecord> {
        self.records
            .iter()
            .find(|r| r.address == *address)
            .map(|r| r.value().clone())
    }

    /// Every mutating call received so far, in order
    pub async fn calls(&self) -> Vec<InventoryCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    /// Fail `op` for the record at `address` until cleared
    pub fn fail(&self, op: InventoryOp, address: PciAddress) {
        self.failures.insert((op, address));
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Make `list_by_host` fail as if the service were down
    pub fn set_list_unavailable(&self, unavailable: bool) {
        self.list_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn injected(&self, op: InventoryOp, record: &DeployableRecord) -> Result<()> {
        if self.failures.contains(&(op, record.address)) {
            return Err(InventoryError::Api {
                status: 500,
                message: format!("injected {} failure at {}", op, record.address),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryApi for InMemoryInventory {
    async fn list_by_host(&self, host: &str) -> Result<Vec<DeployableRecord>> {
        if self.list_unavailable.load(Ordering::SeqCst) {
            return Err(InventoryError::Api {
                status: 503,
                message: "inventory unavailable".into(),
            });
        }
        Ok(self
            .records()
            .into_iter()
            .filter(|r| r.host == host)
            .collect())
    }

    async fn create(&self, record: &DeployableRecord) -> Result<DeployableRecord> {
        let mut calls = self.calls.lock().await;
        calls.push(InventoryCall::Create(record.clone()));
        self.injected(InventoryOp::Create, record)?;

        if self.records.contains_key(&record.uuid) {
            return Err(InventoryError::AlreadyExists(record.address.to_string()));
        }
        if let Some(parent) = record.parent_uuid {
            if !self.records.contains_key(&parent) {
                return Err(InventoryError::Api {
                    status: 400,
                    message: format!("parent deployable {} does not exist", parent),
                });
            }
        }
        self.records.insert(record.uuid, record.clone());
        Ok(record.clone())
    }

    async fn update(&self, record: &DeployableRecord) -> Result<()> {
        let mut calls = self.calls.lock().await;
        calls.push(InventoryCall::Update(record.clone()));
        self.injected(InventoryOp::Update, record)?;

        match self.records.get_mut(&record.uuid) {
            Some(mut stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(InventoryError::NotFound(record.uuid.to_string())),
        }
    }

    async fn delete(&self, record: &DeployableRecord) -> Result<()> {
        let mut calls = self.calls.lock().await;
        calls.push(InventoryCall::Delete(record.clone()));
        self.injected(InventoryOp::Delete, record)?;

        self.records
            .remove(&record.uuid)
            .map(|_| ())
            .ok_or_else(|| InventoryError::NotFound(record.uuid.to_string()))
    }
}
