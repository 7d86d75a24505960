//! Vendor capability summaries and image matching
//!
//! Both functions are pure over a set of cached images so they can be used
//! on a snapshot without holding the cache lock across remote calls.

use accel_types::{
    known_vendors, vendor_id_to_name, vendor_name_to_id, ImageRecord, ResourceClassName,
    VendorSummaries, TRAIT_PREFIX, UNKNOWN_VENDOR,
};
use std::collections::BTreeSet;

const CUSTOM_PREFIX: &str = "CUSTOM";
const FPGA_CATEGORY: &str = "FPGA";

/// Vendor an image belongs to, upper-cased, or `None` when unresolvable
///
/// An explicit vendor field naming a known vendor wins over tag inference.
fn resolve_vendor(image: &ImageRecord, known: &BTreeSet<String>) -> Option<String> {
    if let Some(vendor) = image.vendor.as_deref().filter(|v| !v.is_empty()) {
        let name = vendor_id_to_name(vendor);
        if known.contains(&name) {
            return Some(name);
        }
    }

    image
        .upper_tags()
        .intersection(known)
        .next()
        .map(|tag| vendor_id_to_name(tag))
}

/// Group images by vendor and collect the traits and functions each provides
pub fn derive_summaries<'a, I>(images: I) -> VendorSummaries
where
    I: IntoIterator<Item = &'a ImageRecord>,
{
    let known = known_vendors();
    let mut summaries = VendorSummaries::new();

    for image in images {
        let vendor = resolve_vendor(image, &known);
        let bucket = vendor.clone().unwrap_or_else(|| UNKNOWN_VENDOR.to_string());
        let summary = summaries.entry(bucket).or_default();

        if let Some(name) = vendor {
            if summary.resource_types.is_empty() {
                summary.resource_types =
                    vec![CUSTOM_PREFIX.to_string(), FPGA_CATEGORY.to_string(), name];
            }
        }

        summary.traits.extend(image.upper_tags());
        if let Some(function) = image.upper_function() {
            summary.traits.insert(function.clone());
            summary.functions.insert(function);
        }
    }

    summaries
}

/// Strip the agent's trait namespace and upper-case a requirement
fn requirement_key(raw: &str) -> String {
    let upper = raw.to_uppercase();
    upper
        .strip_prefix(TRAIT_PREFIX)
        .map(str::to_string)
        .unwrap_or(upper)
}

/// Select the image satisfying a resource class and a set of required traits
///
/// Exactly one of the vendor's functions must be required; anything else is
/// ambiguous and yields no match.
pub fn find_image<'a, I, S>(
    images: I,
    summaries: &VendorSummaries,
    resource_class: &ResourceClassName,
    requires: &[S],
) -> Option<&'a ImageRecord>
where
    I: IntoIterator<Item = &'a ImageRecord>,
    S: AsRef<str>,
{
    let (vendor, _kind) = resource_class.vendor_and_kind()?;
    let vendor = vendor_id_to_name(vendor);
    let summary = summaries.get(&vendor)?;

    let required: BTreeSet<String> = requires.iter().map(|r| requirement_key(r.as_ref())).collect();
    let functions: Vec<&String> = summary.functions.intersection(&required).collect();
    let function = match functions.as_slice() {
        [function] => *function,
        _ => {
            tracing::info!(
                resource_class = %resource_class,
                candidates = ?functions,
                "Requirement does not select exactly one function"
            );
            return None;
        }
    };

    let vendor_id = vendor_name_to_id(&vendor);
    images.into_iter().find(|image| {
        if image.upper_function().as_ref() != Some(function) {
            return false;
        }
        let explicit = image.vendor.as_deref().map(vendor_id_to_name);
        if explicit.as_deref() == Some(vendor.as_str()) {
            return true;
        }
        let tags = image.upper_tags();
        tags.contains(&vendor_id) || tags.contains(&vendor)
    })
}
