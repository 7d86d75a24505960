//! Per-vendor capability summaries derived from the image catalog

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Bucket for images whose vendor could not be resolved
pub const UNKNOWN_VENDOR: &str = "unknown";

/// Capabilities one vendor's images provide
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSummary {
    /// Trait names (un-namespaced, upper-cased)
    pub traits: BTreeSet<String>,

    /// Function types available as images
    pub functions: BTreeSet<String>,

    /// Resource-type prefix segments, e.g. `["CUSTOM", "FPGA", "INTEL"]`
    pub resource_types: Vec<String>,
}

impl VendorSummary {
    pub fn supports(&self, function: &str) -> bool {
        self.functions.contains(function)
    }
}

/// Summaries keyed by upper-cased vendor name (or [`UNKNOWN_VENDOR`])
pub type VendorSummaries = BTreeMap<String, VendorSummary>;
