//! Hardware discovery and device-tree flattening
//!
//! Drivers report a forest per vendor: physical functions carrying their
//! virtual functions in `regions`. The engine works on a flat map keyed by
//! PCI address.

use crate::error::DiscoveryError;
use accel_types::{Device, PciAddress};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Flat discovery snapshot keyed by address
pub type DiscoveredDevices = BTreeMap<PciAddress, Device>;

/// Source of accelerator devices present on the host
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// Vendor ids with at least one driver loaded
    async fn discover_vendors(&self) -> Result<Vec<String>>;

    /// Device forest reported by one vendor's driver
    async fn discover(&self, vendor: &str) -> Result<Vec<Device>>;
}

/// Flatten a device forest into one entry per address
///
/// Every node and every node reachable through `regions` is included. A
/// region without an explicit parent inherits the address of the device
/// that lists it. When two nodes share an address the later one wins.
pub fn flatten(forest: &[Device]) -> DiscoveredDevices {
    let mut flat = DiscoveredDevices::new();
    flatten_into(forest, None, &mut flat);
    flat
}

fn flatten_into(devices: &[Device], parent: Option<PciAddress>, flat: &mut DiscoveredDevices) {
    for device in devices {
        let mut entry = device.clone();
        if entry.parent.is_none() {
            entry.parent = parent;
        }
        if flat.insert(entry.address, entry).is_some() {
            tracing::debug!(address = %device.address, "Duplicate device address in discovery");
        }
        flatten_into(&device.regions, Some(device.address), flat);
    }
}

/// Discover every vendor's devices and flatten them into one snapshot
pub async fn discover_all(discovery: &dyn DeviceDiscovery) -> Result<DiscoveredDevices> {
    let mut flat = DiscoveredDevices::new();
    for vendor in discovery.discover_vendors().await? {
        let forest = discovery.discover(&vendor).await?;
        tracing::debug!(vendor = %vendor, roots = forest.len(), "Discovered devices");
        flat.extend(flatten(&forest));
    }
    Ok(flat)
}

/// Discovery backed by a JSON file mapping vendor id to device forest
///
/// ```json
/// { "0x8086": [ { "address": "0000:5e:00.0", "function": "pf", ... } ] }
/// ```
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    path: PathBuf,
}

impl FileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<BTreeMap<String, Vec<Device>>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No device inventory file");
                return Ok(BTreeMap::new());
            }
            Err(source) => {
                return Err(DiscoveryError::Io {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl DeviceDiscovery for FileDiscovery {
    async fn discover_vendors(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.into_keys().collect())
    }

    async fn discover(&self, vendor: &str) -> Result<Vec<Device>> {
        Ok(self.load().await?.remove(vendor).unwrap_or_default())
    }
}

/// Discovery returning devices set by the caller
#[derive(Debug, Default)]
pub struct InMemoryDiscovery {
    vendors: RwLock<BTreeMap<String, Vec<Device>>>,
    failing: RwLock<Option<String>>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the forest reported for `vendor`
    pub async fn set_devices(&self, vendor: &str, devices: Vec<Device>) {
        self.vendors.write().await.insert(vendor.to_string(), devices);
    }

    pub async fn remove_vendor(&self, vendor: &str) {
        self.vendors.write().await.remove(vendor);
    }

    /// Make every subsequent `discover` fail with a driver error
    pub async fn fail_with(&self, message: Option<&str>) {
        *self.failing.write().await = message.map(String::from);
    }
}

#[async_trait]
impl DeviceDiscovery for InMemoryDiscovery {
    async fn discover_vendors(&self) -> Result<Vec<String>> {
        Ok(self.vendors.read().await.keys().cloned().collect())
    }

    async fn discover(&self, vendor: &str) -> Result<Vec<Device>> {
        if let Some(message) = self.failing.read().await.clone() {
            return Err(DiscoveryError::Driver {
                vendor: vendor.to_string(),
                message,
            });
        }
        Ok(self
            .vendors
            .read()
            .await
            .get(vendor)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_types::FunctionKind;
    use proptest::prelude::*;

    fn addr(s: &str) -> PciAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_flatten_includes_regions() {
        let pf = Device::physical(addr("0000:01:00.0"), "0x8086").with_region(
            Device::virtual_function(addr("0000:01:00.1"), addr("0000:01:00.0"), "0x8086"),
        );
        let flat = flatten(&[pf]);

        assert_eq!(flat.len(), 2);
        assert!(flat[&addr("0000:01:00.0")].is_physical());
        let vf = &flat[&addr("0000:01:00.1")];
        assert_eq!(vf.function, FunctionKind::Virtual);
        assert_eq!(vf.parent, Some(addr("0000:01:00.0")));
    }

    #[test]
    fn test_region_inherits_parent() {
        let mut vf = Device::physical(addr("0000:01:00.1"), "0x8086");
        vf.function = FunctionKind::Virtual;
        let pf = Device::physical(addr("0000:01:00.0"), "0x8086").with_region(vf);

        let flat = flatten(&[pf]);
        assert_eq!(flat[&addr("0000:01:00.1")].parent, Some(addr("0000:01:00.0")));
    }

    #[test]
    fn test_duplicate_address_later_wins() {
        let first = Device::physical(addr("0000:01:00.0"), "0x8086").with_name("first");
        let second = Device::physical(addr("0000:01:00.0"), "0x8086").with_name("second");
        let flat = flatten(&[first, second]);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[&addr("0000:01:00.0")].name, "second");
    }

    #[test]
    fn test_flatten_empty() {
        assert!(flatten(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_discover_all_unions_vendors() {
        let discovery = InMemoryDiscovery::new();
        discovery
            .set_devices("0x8086", vec![Device::physical(addr("0000:01:00.0"), "0x8086")])
            .await;
        discovery
            .set_devices("0x1172", vec![Device::physical(addr("0000:02:00.0"), "0x1172")])
            .await;

        let flat = discover_all(&discovery).await.unwrap();
        assert_eq!(flat.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_all_propagates_driver_failure() {
        let discovery = InMemoryDiscovery::new();
        discovery
            .set_devices("0x8086", vec![Device::physical(addr("0000:01:00.0"), "0x8086")])
            .await;
        discovery.fail_with(Some("driver unloaded")).await;

        let err = discover_all(&discovery).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Driver { .. }));
    }

    #[tokio::test]
    async fn test_file_discovery() {
        let path =
            std::env::temp_dir().join(format!("accel-devices-{}.json", uuid::Uuid::new_v4()));
        let json = serde_json::json!({
            "0x8086": [{
                "devices": "0000:5e:00.0",
                "assignable": true,
                "vendor_id": "0x8086",
                "product_id": "0x09c4",
                "name": "arria10",
                "function": "pf",
                "regions": [{
                    "devices": "0000:5e:00.1",
                    "assignable": true,
                    "vendor_id": "0x8086",
                    "function": "vf",
                    "parent_devices": "0000:5e:00.0"
                }]
            }]
        });
        tokio::fs::write(&path, json.to_string()).await.unwrap();

        let discovery = FileDiscovery::new(&path);
        assert_eq!(discovery.discover_vendors().await.unwrap(), vec!["0x8086"]);
        let flat = discover_all(&discovery).await.unwrap();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[&addr("0000:5e:00.0")].product_id, "0x09c4");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_discovers_nothing() {
        let discovery = FileDiscovery::new("/nonexistent/accel-devices.json");
        assert!(discovery.discover_vendors().await.unwrap().is_empty());
    }

    /// Generated tree node; small ranges force address collisions
    #[derive(Debug, Clone)]
    struct Node {
        slot: u8,
        function: u8,
        explicit_parent: bool,
        regions: Vec<Node>,
    }

    fn arb_node() -> impl Strategy<Value = Node> {
        let leaf = (0u8..4, 0u8..8, any::<bool>()).prop_map(|(slot, function, explicit_parent)| {
            Node {
                slot,
                function,
                explicit_parent,
                regions: Vec::new(),
            }
        });
        leaf.prop_recursive(6, 64, 4, |inner| {
            (0u8..4, 0u8..8, any::<bool>(), prop::collection::vec(inner, 0..4)).prop_map(
                |(slot, function, explicit_parent, regions)| Node {
                    slot,
                    function,
                    explicit_parent,
                    regions,
                },
            )
        })
    }

    fn node_address(node: &Node) -> PciAddress {
        PciAddress::new(0, 1, node.slot, node.function).unwrap()
    }

    fn explicit_parent() -> PciAddress {
        addr("0000:ff:00.0")
    }

    fn build(node: &Node, lister: Option<PciAddress>) -> Device {
        let address = node_address(node);
        let mut device = Device::physical(address, "0x8086");
        if lister.is_some() {
            device.function = FunctionKind::Virtual;
        }
        if node.explicit_parent {
            device.parent = Some(explicit_parent());
        }
        node.regions
            .iter()
            .fold(device, |device, region| device.with_region(build(region, Some(address))))
    }

    /// Pre-order walk recording the parent each address should end up with
    fn expected_parents(
        nodes: &[Node],
        lister: Option<PciAddress>,
        out: &mut BTreeMap<PciAddress, Option<PciAddress>>,
    ) {
        for node in nodes {
            let parent = if node.explicit_parent {
                Some(explicit_parent())
            } else {
                lister
            };
            out.insert(node_address(node), parent);
            expected_parents(&node.regions, Some(node_address(node)), out);
        }
    }

    proptest! {
        #[test]
        fn prop_flatten_one_entry_per_address(forest in prop::collection::vec(arb_node(), 0..6)) {
            let devices: Vec<Device> = forest.iter().map(|node| build(node, None)).collect();
            let mut expected = BTreeMap::new();
            expected_parents(&forest, None, &mut expected);

            let flat = flatten(&devices);
            let actual: BTreeMap<_, _> = flat
                .iter()
                .map(|(address, device)| (*address, device.parent))
                .collect();
            prop_assert_eq!(actual, expected);
            for (address, device) in &flat {
                prop_assert_eq!(*address, device.address);
            }
        }
    }
}
