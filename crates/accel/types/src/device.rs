//! Accelerator devices as reported by hardware discovery
//!
//! Discovery returns a forest: each physical function (PF) may carry the
//! virtual functions (VFs) it exposes in its `regions` list.

use crate::PciAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of accelerator function
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum FunctionKind {
    /// Physical function
    #[default]
    #[serde(rename = "pf")]
    Physical,
    /// Virtual function exposed by a physical function
    #[serde(rename = "vf")]
    Virtual,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Physical => "pf",
            FunctionKind::Virtual => "vf",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical or virtual accelerator function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// PCI address, unique within a discovery snapshot
    #[serde(alias = "devices")]
    pub address: PciAddress,

    /// Whether the function can be handed out to a workload
    pub assignable: bool,

    /// Vendor identifier, e.g. `0x8086`
    pub vendor_id: String,

    /// Product (board) identifier
    #[serde(default)]
    pub product_id: String,

    /// Human-readable name reported by the driver
    #[serde(default)]
    pub name: String,

    /// Physical or virtual function
    pub function: FunctionKind,

    /// Virtual functions exposed by this device
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<Device>,

    /// Address of the owning physical function (virtual functions only)
    #[serde(default, alias = "parent_devices", skip_serializing_if = "Option::is_none")]
    pub parent: Option<PciAddress>,
}

impl Device {
    /// A physical function with no regions
    pub fn physical(address: PciAddress, vendor_id: impl Into<String>) -> Self {
        Self {
            address,
            assignable: true,
            vendor_id: vendor_id.into(),
            product_id: String::new(),
            name: String::new(),
            function: FunctionKind::Physical,
            regions: Vec::new(),
            parent: None,
        }
    }

    /// A virtual function owned by `parent`
    pub fn virtual_function(
        address: PciAddress,
        parent: PciAddress,
        vendor_id: impl Into<String>,
    ) -> Self {
        Self {
            function: FunctionKind::Virtual,
            parent: Some(parent),
            ..Self::physical(address, vendor_id)
        }
    }

    /// Attach a virtual function to this device's regions
    pub fn with_region(mut self, region: Device) -> Self {
        self.regions.push(region);
        self
    }

    pub fn with_assignable(mut self, assignable: bool) -> Self {
        self.assignable = assignable;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = product_id.into();
        self
    }

    pub fn is_physical(&self) -> bool {
        self.function == FunctionKind::Physical
    }

    pub fn is_virtual(&self) -> bool {
        self.function == FunctionKind::Virtual
    }

    /// Addresses of the direct children declared in `regions`
    pub fn region_addresses(&self) -> impl Iterator<Item = PciAddress> + '_ {
        self.regions.iter().map(|r| r.address)
    }
}
