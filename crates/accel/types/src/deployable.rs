//! Deployable records: the remote representation of one device slot
//!
//! Which device attributes are mirrored onto a record is declared once, in
//! [`DEPLOYABLE_HOST_FIELDS`]. Record construction and drift detection both
//! walk that table, so the two can never disagree about the mapping.

use crate::{DeployableId, Device, FunctionKind, PciAddress};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Schema version stamped on records created by this agent
pub const DEPLOYABLE_VERSION: &str = "1.0";

/// Allocation state of a deployable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Available for claiming
    #[default]
    Free,
    /// Claimed by a scheduler decision but not yet in use
    Claimed,
    /// Programmed and attached to a workload
    InUse,
    /// A state this agent does not know; never written back
    #[serde(other)]
    Unknown,
}

impl Availability {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Availability::Unknown)
    }
}

/// Remote inventory record for one accelerator function
///
/// Only `uuid` and `address` must decode. Every other field falls back to its
/// default when missing, null or malformed, so the record still takes part in
/// drift detection instead of vanishing from the host's listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployableRecord {
    /// Record identity, assigned on creation and never changed
    pub uuid: DeployableId,

    /// Host that owns the device
    #[serde(default, deserialize_with = "lenient")]
    pub host: String,

    /// PCI address of the device
    #[serde(alias = "pcie_address")]
    pub address: PciAddress,

    /// Board (product) identifier
    #[serde(default, deserialize_with = "lenient")]
    pub board: String,

    /// Vendor identifier
    #[serde(default, deserialize_with = "lenient")]
    pub vendor: String,

    /// Physical or virtual function
    #[serde(alias = "type", default, deserialize_with = "lenient")]
    pub function: FunctionKind,

    /// Driver-reported name
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,

    /// Whether the device may be assigned
    #[serde(default, deserialize_with = "lenient")]
    pub assignable: bool,

    /// Allocation state, owned by the inventory service
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Availability::is_unknown"
    )]
    pub availability: Availability,

    /// Record schema version
    #[serde(default, deserialize_with = "lenient")]
    pub version: String,

    /// Record of the owning physical function (virtual functions only)
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_uuid: Option<DeployableId>,
}

/// Decode a value, substituting the default for null or malformed input
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Value(T),
        Other(IgnoredAny),
    }

    Ok(match Lenient::<T>::deserialize(deserializer)? {
        Lenient::Value(value) => value,
        Lenient::Other(_) => T::default(),
    })
}

/// A device attribute mirrored onto a deployable record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployableField {
    Assignable,
    Address,
    Board,
    Function,
    Vendor,
    Name,
}

/// Mapping from host device fields to deployable record fields
pub const DEPLOYABLE_HOST_FIELDS: [DeployableField; 6] = [
    DeployableField::Assignable,
    DeployableField::Address,
    DeployableField::Board,
    DeployableField::Function,
    DeployableField::Vendor,
    DeployableField::Name,
];

impl DeployableField {
    /// Name of the field on the discovered device
    pub fn source(&self) -> &'static str {
        match self {
            DeployableField::Assignable => "assignable",
            DeployableField::Address => "address",
            DeployableField::Board => "product_id",
            DeployableField::Function => "function",
            DeployableField::Vendor => "vendor_id",
            DeployableField::Name => "name",
        }
    }

    /// Name of the field on the deployable record
    pub fn target(&self) -> &'static str {
        match self {
            DeployableField::Assignable => "assignable",
            DeployableField::Address => "address",
            DeployableField::Board => "board",
            DeployableField::Function => "function",
            DeployableField::Vendor => "vendor",
            DeployableField::Name => "name",
        }
    }

    /// Whether the record already carries the device's value for this field
    pub fn matches(&self, record: &DeployableRecord, device: &Device) -> bool {
        match self {
            DeployableField::Assignable => record.assignable == device.assignable,
            DeployableField::Address => record.address == device.address,
            DeployableField::Board => record.board == device.product_id,
            DeployableField::Function => record.function == device.function,
            DeployableField::Vendor => record.vendor == device.vendor_id,
            DeployableField::Name => record.name == device.name,
        }
    }

    /// Copy the device's value for this field onto the record
    pub fn apply(&self, record: &mut DeployableRecord, device: &Device) {
        match self {
            DeployableField::Assignable => record.assignable = device.assignable,
            DeployableField::Address => record.address = device.address,
            DeployableField::Board => record.board = device.product_id.clone(),
            DeployableField::Function => record.function = device.function,
            DeployableField::Vendor => record.vendor = device.vendor_id.clone(),
            DeployableField::Name => record.name = device.name.clone(),
        }
    }
}

impl fmt::Display for DeployableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source(), self.target())
    }
}

impl DeployableRecord {
    /// Build a fresh `free` record for a discovered device
    pub fn from_device(
        host: impl Into<String>,
        device: &Device,
        parent_uuid: Option<DeployableId>,
    ) -> Self {
        let mut record = Self {
            uuid: DeployableId::generate(),
            host: host.into(),
            address: device.address,
            board: String::new(),
            vendor: String::new(),
            function: device.function,
            name: String::new(),
            assignable: false,
            availability: Availability::Free,
            version: DEPLOYABLE_VERSION.to_string(),
            parent_uuid,
        };
        for field in DEPLOYABLE_HOST_FIELDS {
            field.apply(&mut record, device);
        }
        record
    }

    /// Mapped fields whose value differs from the live device
    pub fn drifted_fields(&self, device: &Device) -> Vec<DeployableField> {
        DEPLOYABLE_HOST_FIELDS
            .into_iter()
            .filter(|field| !field.matches(self, device))
            .collect()
    }

    /// Bring every mapped field in line with the device, returning what changed
    pub fn sync_from(&mut self, device: &Device) -> Vec<DeployableField> {
        let drifted = self.drifted_fields(device);
        for field in &drifted {
            field.apply(self, device);
        }
        drifted
    }
}
