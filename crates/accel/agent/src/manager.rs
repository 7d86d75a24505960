//! Agent manager: the entry points the rest of the system calls

use crate::engine::ReconcileEngine;
use crate::error::AgentResult;
use crate::report::ReconcileReport;
use accel_types::{Device, ImageRecord, ResourceClassName};
use std::sync::Arc;

/// Facade over the reconciliation engine and the image cache
#[derive(Clone)]
pub struct AgentManager {
    engine: Arc<ReconcileEngine>,
}

impl AgentManager {
    pub fn new(engine: Arc<ReconcileEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ReconcileEngine> {
        &self.engine
    }

    /// Periodic entry point: reconcile every accelerator resource on the host
    pub async fn update_available_resource(&self) -> AgentResult<ReconcileReport> {
        self.engine.update_usage().await
    }

    /// Image able to serve `resource_class` with the given required traits
    ///
    /// Refreshes the image cache first. A failed refresh falls back to the
    /// cached images.
    pub async fn image_for<S: AsRef<str>>(
        &self,
        resource_class: &ResourceClassName,
        requires: &[S],
    ) -> Option<ImageRecord> {
        let images = self.engine.images();
        if let Err(e) = images.refresh().await {
            tracing::warn!(error = %e, "Image refresh failed, matching against cached images");
        }
        images.derive_summary().await;

        let image = images.find_image(resource_class, requires).await;
        match &image {
            Some(image) => {
                tracing::debug!(
                    resource_class = %resource_class,
                    image = %image.id,
                    "Matched image"
                )
            }
            None => tracing::debug!(resource_class = %resource_class, "No matching image"),
        }
        image
    }

    /// Accelerator functions currently present on the host, ordered by address
    pub async fn hardware_list(&self) -> AgentResult<Vec<Device>> {
        Ok(self.engine.discover().await?.into_values().collect())
    }
}
