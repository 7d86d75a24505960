//! Accel Catalog - Accelerator image catalog cache
//!
//! Keeps a process-local copy of the accelerator images published in a
//! remote image catalog and derives per-vendor capability summaries from it.
//!
//! - **ImageCatalog**: Query interface to the remote catalog (HTTP or in-memory)
//! - **ImageCache**: Incremental, merge-only cache with a forward-only cursor
//! - **Summaries**: Vendor resolution and trait/function derivation

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod memory;
pub mod summary;

// Re-exports
pub use cache::{initial_cursor, ImageCache, INITIAL_CURSOR_SECS};
pub use client::ImageCatalog;
pub use error::{CatalogError, Result};
pub use http::HttpImageCatalog;
pub use memory::InMemoryCatalog;
pub use summary::{derive_summaries, find_image};
