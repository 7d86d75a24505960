//! HTTP inventory client

use super::{InventoryApi, Result};
use crate::error::InventoryError;
use accel_types::DeployableRecord;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct DeployableList {
    deployables: Vec<serde_json::Value>,
}

/// Inventory service reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        self.handle_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.put(&url).json(body).send().await?;
        self.check(response).await.map(|_| ())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.delete(&url).send().await?;
        self.check(response).await.map(|_| ())
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(InventoryError::NotFound(response.url().path().to_string()))
        } else if status == StatusCode::CONFLICT {
            let message = response.text().await.unwrap_or_default();
            Err(InventoryError::AlreadyExists(message))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(InventoryError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check(response)
            .await?
            .json()
            .await
            .map_err(|e| InventoryError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryClient {
    async fn list_by_host(&self, host: &str) -> Result<Vec<DeployableRecord>> {
        let list: DeployableList = self.get("/v1/deployables", &[("host", host)]).await?;

        // One malformed record must not hide the others.
        let records = list
            .deployables
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<DeployableRecord>(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "Ignoring unreadable deployable");
                    None
                }
            })
            .collect();
        Ok(records)
    }

    async fn create(&self, record: &DeployableRecord) -> Result<DeployableRecord> {
        self.post("/v1/deployables", record).await
    }

    async fn update(&self, record: &DeployableRecord) -> Result<()> {
        self.put(&format!("/v1/deployables/{}", record.uuid), record)
            .await
    }

    async fn delete(&self, record: &DeployableRecord) -> Result<()> {
        self.delete_path(&format!("/v1/deployables/{}", record.uuid))
            .await
    }
}
