//! Known accelerator vendors
//!
//! Vendors are identified by their PCI vendor id on devices and by either id
//! or name on catalog images. Lookups are case-insensitive; results are
//! upper-cased so they can be compared against upper-cased tag sets.

use std::collections::BTreeSet;

/// (name, PCI vendor id) pairs
const VENDORS: &[(&str, &str)] = &[("intel", "0x8086")];

/// Map a vendor id to its upper-cased name; unknown ids pass through upper-cased
pub fn vendor_id_to_name(id: &str) -> String {
    let lower = id.to_lowercase();
    VENDORS
        .iter()
        .find(|(_, vid)| *vid == lower)
        .map(|(name, _)| name.to_uppercase())
        .unwrap_or_else(|| id.to_uppercase())
}

/// Map a vendor name to its upper-cased id; unknown names pass through upper-cased
pub fn vendor_name_to_id(name: &str) -> String {
    let lower = name.to_lowercase();
    VENDORS
        .iter()
        .find(|(vname, _)| *vname == lower)
        .map(|(_, id)| id.to_uppercase())
        .unwrap_or_else(|| name.to_uppercase())
}

/// Every spelling of every known vendor: upper-cased ids and names
pub fn known_vendors() -> BTreeSet<String> {
    VENDORS
        .iter()
        .flat_map(|(name, id)| [name.to_uppercase(), id.to_uppercase()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_to_name() {
        assert_eq!(vendor_id_to_name("0x8086"), "INTEL");
        assert_eq!(vendor_id_to_name("0X8086"), "INTEL");
        assert_eq!(vendor_id_to_name("0x1172"), "0X1172");
        assert_eq!(vendor_id_to_name("intel"), "INTEL");
    }

    #[test]
    fn test_name_to_id() {
        assert_eq!(vendor_name_to_id("Intel"), "0X8086");
        assert_eq!(vendor_name_to_id("xilinx"), "XILINX");
    }

    #[test]
    fn test_known_vendors_cover_ids_and_names() {
        let vendors = known_vendors();
        assert!(vendors.contains("INTEL"));
        assert!(vendors.contains("0X8086"));
    }
}
