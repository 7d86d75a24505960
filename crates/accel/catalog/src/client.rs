//! Image catalog query interface

use crate::error::Result;
use accel_types::{AuthSession, ImageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to a remote accelerator image catalog
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Accelerator images updated strictly after `updated_after`
    async fn list_images(
        &self,
        session: &AuthSession,
        updated_after: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>>;
}
