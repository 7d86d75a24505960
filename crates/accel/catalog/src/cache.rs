//! Process-local cache of accelerator images
//!
//! The cache only grows: a refresh merges images the catalog reports as
//! updated since the cursor, never overwrites an entry it already holds, and
//! moves the cursor forward to the time the refresh started.

use crate::client::ImageCatalog;
use crate::error::Result;
use crate::summary::{derive_summaries, find_image};
use accel_types::{
    ImageRecord, NamedGate, ResourceClassName, ServiceKind, TokenSource, VendorSummaries,
    IMAGE_GATE,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cursor of an empty cache: 2000-01-01T00:00:00Z
pub const INITIAL_CURSOR_SECS: i64 = 946_684_800;

/// Cursor value before the first refresh
pub fn initial_cursor() -> DateTime<Utc> {
    DateTime::from_timestamp(INITIAL_CURSOR_SECS, 0).unwrap_or_default()
}

#[derive(Debug)]
struct CacheState {
    images: BTreeMap<String, ImageRecord>,
    cursor: DateTime<Utc>,
    summary: VendorSummaries,
}

impl CacheState {
    fn new() -> Self {
        Self {
            images: BTreeMap::new(),
            cursor: initial_cursor(),
            summary: VendorSummaries::new(),
        }
    }

    /// Insert unseen images and advance the cursor; returns how many were new
    fn merge(&mut self, images: Vec<ImageRecord>, now: DateTime<Utc>) -> usize {
        let mut merged = 0;
        for image in images {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                self.images.entry(image.id.clone())
            {
                slot.insert(image);
                merged += 1;
            }
        }
        self.cursor = self.cursor.max(now);
        merged
    }
}

/// Incremental image cache shared by the engine and the manager
pub struct ImageCache {
    catalog: Arc<dyn ImageCatalog>,
    tokens: Arc<dyn TokenSource>,
    gate: NamedGate,
    state: RwLock<CacheState>,
}

impl ImageCache {
    pub fn new(catalog: Arc<dyn ImageCatalog>, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_gate(catalog, tokens, NamedGate::new(IMAGE_GATE))
    }

    /// Create a cache that serializes refreshes on an externally owned gate
    pub fn with_gate(
        catalog: Arc<dyn ImageCatalog>,
        tokens: Arc<dyn TokenSource>,
        gate: NamedGate,
    ) -> Self {
        Self {
            catalog,
            tokens,
            gate,
            state: RwLock::new(CacheState::new()),
        }
    }

    /// Pull images updated since the cursor into the cache
    ///
    /// Returns `Ok(false)` without contacting the catalog when no session or
    /// image endpoint is available. On a catalog error the cache and cursor
    /// are left untouched.
    pub async fn refresh(&self) -> Result<bool> {
        let _gate = self.gate.acquire().await;

        let Some(session) = self.tokens.session().await else {
            tracing::debug!("No credentials, skipping image refresh");
            return Ok(false);
        };
        if session.endpoint(ServiceKind::Image).is_none() {
            tracing::debug!("No image catalog endpoint, skipping image refresh");
            return Ok(false);
        }

        let cursor = self.state.read().await.cursor;
        let started = Utc::now();
        let images = self.catalog.list_images(&session, cursor).await?;
        let fetched = images.len();

        let mut state = self.state.write().await;
        let merged = state.merge(images, started);
        tracing::info!(
            fetched,
            merged,
            cached = state.images.len(),
            cursor = %state.cursor,
            "Refreshed image cache"
        );
        Ok(merged > 0)
    }

    /// Recompute the per-vendor summaries from the cached images and store them
    pub async fn derive_summary(&self) -> VendorSummaries {
        let mut state = self.state.write().await;
        let summary = derive_summaries(state.images.values());
        state.summary = summary.clone();
        summary
    }

    /// Image matching a resource class and required traits, using the stored summary
    pub async fn find_image<S: AsRef<str>>(
        &self,
        resource_class: &ResourceClassName,
        requires: &[S],
    ) -> Option<ImageRecord> {
        let state = self.state.read().await;
        find_image(state.images.values(), &state.summary, resource_class, requires).cloned()
    }

    pub async fn image(&self, id: &str) -> Option<ImageRecord> {
        self.state.read().await.images.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.images.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.images.is_empty()
    }

    pub async fn cursor(&self) -> DateTime<Utc> {
        self.state.read().await.cursor
    }

    /// Summary computed by the last [`ImageCache::derive_summary`]
    pub async fn summary(&self) -> VendorSummaries {
        self.state.read().await.summary.clone()
    }
}
