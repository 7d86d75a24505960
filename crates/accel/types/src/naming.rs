//! Naming rules for custom traits and resource classes
//!
//! The capacity-tracking service only accepts custom names of the form
//! `CUSTOM_[A-Z0-9_]+`.

use crate::{vendor_id_to_name, FunctionKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every trait this agent publishes
pub const TRAIT_PREFIX: &str = "CUSTOM_ACCEL_";

const CUSTOM_PREFIX: &str = "CUSTOM";
const FPGA_CATEGORY: &str = "FPGA";

fn normalize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Namespace a derived trait, e.g. `crypto` becomes `CUSTOM_ACCEL_CRYPTO`
pub fn namespaced_trait(raw: &str) -> String {
    format!("{}{}", TRAIT_PREFIX, normalize(raw))
}

/// A custom resource class name, e.g. `CUSTOM_FPGA_INTEL_PF`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceClassName(String);

impl ResourceClassName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Compose the class counting FPGA functions of one vendor and kind
    pub fn fpga(vendor: &str, function: FunctionKind) -> Self {
        let kind = match function {
            FunctionKind::Physical => "PF",
            FunctionKind::Virtual => "VF",
        };
        Self(
            [
                CUSTOM_PREFIX,
                FPGA_CATEGORY,
                &normalize(&vendor_id_to_name(vendor)),
                kind,
            ]
            .join("_"),
        )
    }

    /// Vendor and hardware-type segments following the `CUSTOM_<CATEGORY>_` prefix
    ///
    /// Names with fewer than three underscores carry no such segments.
    pub fn vendor_and_kind(&self) -> Option<(&str, &str)> {
        if self.0.matches('_').count() < 3 {
            return None;
        }
        let mut segments = self.0.split('_').skip(2);
        Some((segments.next()?, segments.next()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
