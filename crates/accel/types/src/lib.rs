//! Accel Types - Core types for accelerator resource tracking
//!
//! The accelerator agent discovers accelerator hardware on a host, keeps a
//! remote inventory of deployable records in step with it, and publishes
//! derived capabilities to a capacity-tracking (placement) service.
//!
//! ## Key Concepts
//!
//! - **Device**: A physical (PF) or virtual (VF) accelerator function found on the host
//! - **DeployableRecord**: The remote, authoritative record for one device slot
//! - **ImageRecord**: A downloadable accelerator bitstream from the image catalog
//! - **VendorSummary**: Traits, functions and resource types derived from images
//! - **Gates**: Named exclusion scopes for reconciliation and image refresh

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod address;
pub mod auth;
pub mod deployable;
pub mod device;
pub mod gate;
pub mod ids;
pub mod image;
pub mod naming;
pub mod summary;
pub mod vendor;

// Re-export main types
pub use address::{AddressParseError, PciAddress};
pub use auth::{AuthSession, ServiceKind, StaticTokenSource, TokenSource};
pub use deployable::{
    Availability, DeployableField, DeployableRecord, DEPLOYABLE_HOST_FIELDS, DEPLOYABLE_VERSION,
};
pub use device::{Device, FunctionKind};
pub use gate::{GateGuard, Gates, NamedGate, IMAGE_GATE, RESOURCE_GATE};
pub use ids::{DeployableId, ProviderId};
pub use image::ImageRecord;
pub use naming::{namespaced_trait, ResourceClassName, TRAIT_PREFIX};
pub use summary::{VendorSummaries, VendorSummary, UNKNOWN_VENDOR};
pub use vendor::{known_vendors, vendor_id_to_name, vendor_name_to_id};
