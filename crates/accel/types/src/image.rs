//! Accelerator images (bitstreams) published in the image catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata for one downloadable accelerator bitstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Catalog identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Vendor id (`0x8086`) or name (`intel`), when the publisher set one
    #[serde(default)]
    pub vendor: Option<String>,

    /// Function-type tag, e.g. `crypto`
    #[serde(default, rename = "type")]
    pub function_type: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Content checksum as published by the catalog
    #[serde(default)]
    pub checksum: Option<String>,

    /// Last modification time in the catalog
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Upper-cased tag set, as used for trait derivation
    pub fn upper_tags(&self) -> BTreeSet<String> {
        self.tags.iter().map(|t| t.to_uppercase()).collect()
    }

    /// Upper-cased function type, if any
    pub fn upper_function(&self) -> Option<String> {
        self.function_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_uppercase)
    }
}
