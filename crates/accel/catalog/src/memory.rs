//! In-memory image catalog for tests and offline runs

use crate::client::ImageCatalog;
use crate::error::{CatalogError, Result};
use accel_types::{AuthSession, ImageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Catalog holding published images in memory
///
/// Every stored image counts as an accelerator image.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    images: RwLock<Vec<ImageRecord>>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an image, replacing any earlier version with the same id
    pub async fn publish(&self, image: ImageRecord) {
        let mut images = self.images.write().await;
        images.retain(|existing| existing.id != image.id);
        images.push(image);
    }

    /// Number of `list_images` calls served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Make subsequent queries fail as if the service were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageCatalog for InMemoryCatalog {
    async fn list_images(
        &self,
        _session: &AuthSession,
        updated_after: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Api {
                status: 503,
                message: "catalog unavailable".into(),
            });
        }

        let images = self.images.read().await;
        Ok(images
            .iter()
            .filter(|image| image.updated_at > updated_after)
            .cloned()
            .collect())
    }
}
