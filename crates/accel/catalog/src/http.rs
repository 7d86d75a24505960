//! HTTP image catalog client

use crate::client::ImageCatalog;
use crate::error::{CatalogError, Result};
use accel_types::{AuthSession, ImageRecord, ServiceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Tag every accelerator image carries in the catalog
pub const ACCELERATOR_TAG: &str = "FPGA";

const AUTH_HEADER: &str = "X-Auth-Token";

/// Upper bound on pages followed in one listing
const MAX_PAGES: usize = 1000;

/// One page of `GET /v2/images`
#[derive(Debug, Deserialize)]
struct ImagePage {
    #[serde(default)]
    images: Vec<ImageRecord>,

    /// Path of the next page, relative to the catalog root
    #[serde(default)]
    next: Option<String>,
}

/// Image catalog reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpImageCatalog {
    client: Client,
}

impl HttpImageCatalog {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create a client from an already configured `reqwest::Client`
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_page(
        &self,
        session: &AuthSession,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<ImagePage> {
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, session.token())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))
    }
}

/// Absolute URL of a `next` link, which the catalog returns as a root-relative path
fn next_url(base: &str, next: &str) -> String {
    if next.starts_with("http://") || next.starts_with("https://") {
        next.to_string()
    } else {
        format!("{}/{}", base, next.trim_start_matches('/'))
    }
}

#[async_trait]
impl ImageCatalog for HttpImageCatalog {
    async fn list_images(
        &self,
        session: &AuthSession,
        updated_after: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>> {
        let base = session
            .endpoint(ServiceKind::Image)
            .ok_or(CatalogError::MissingEndpoint)?;

        let query = vec![
            ("tag", ACCELERATOR_TAG.to_string()),
            (
                "updated_at",
                format!("gt:{}", updated_after.format("%Y-%m-%dT%H:%M:%SZ")),
            ),
        ];

        let mut images = Vec::new();
        let mut visited = HashSet::new();
        let mut page = self
            .fetch_page(session, &format!("{}/v2/images", base), &query)
            .await?;

        loop {
            images.append(&mut page.images);
            let Some(next) = page.next.take() else {
                break;
            };
            let url = next_url(base, &next);
            if !visited.insert(url.clone()) {
                let message = format!("pagination revisits {}", url);
                return Err(CatalogError::InvalidResponse(message));
            }
            if visited.len() >= MAX_PAGES {
                let message = format!("pagination exceeds {} pages", MAX_PAGES);
                return Err(CatalogError::InvalidResponse(message));
            }
            // The link already carries the filters.
            page = self.fetch_page(session, &url, &[]).await?;
        }

        tracing::debug!(count = images.len(), since = %updated_after, "Listed catalog images");
        Ok(images)
    }
}
