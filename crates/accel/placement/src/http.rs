//! HTTP client for the capacity-tracking (placement) REST API

use crate::client::{Inventory, PlacementApi, ProviderInventory, ProviderTraits, ResourceProvider};
use crate::error::{PlacementError, Result};
use accel_types::{AuthSession, ProviderId, ResourceClassName, ServiceKind};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const AUTH_HEADER: &str = "X-Auth-Token";
const VERSION_HEADER: &str = "OpenStack-API-Version";

/// Lowest microversion offering traits on providers
const API_VERSION: &str = "placement 1.6";

#[derive(Debug, Deserialize)]
struct TraitList {
    traits: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderList {
    resource_providers: Vec<ResourceProvider>,
}

#[derive(Debug, Serialize)]
struct NewResourceClass<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct NewInventory<'a> {
    resource_class: &'a str,
    #[serde(flatten)]
    inventory: &'a Inventory,
}

/// Placement service reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpPlacementClient {
    client: Client,
}

impl HttpPlacementClient {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn request(&self, session: &AuthSession, method: Method, path: &str) -> Result<RequestBuilder> {
        let base = session
            .endpoint(ServiceKind::Placement)
            .ok_or(PlacementError::MissingEndpoint)?;
        Ok(self
            .client
            .request(method, format!("{}{}", base, path))
            .header(AUTH_HEADER, session.token())
            .header(VERSION_HEADER, API_VERSION))
    }

    async fn get<T: DeserializeOwned>(&self, session: &AuthSession, path: &str) -> Result<T> {
        let response = self.request(session, Method::GET, path)?.send().await?;
        let response = check(response, path).await?;
        response
            .json()
            .await
            .map_err(|e| PlacementError::InvalidResponse(e.to_string()))
    }

    /// GET that maps 404 to `None`
    async fn get_optional<T: DeserializeOwned>(
        &self,
        session: &AuthSession,
        path: &str,
    ) -> Result<Option<T>> {
        match self.get(session, path).await {
            Ok(value) => Ok(Some(value)),
            Err(PlacementError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        session: &AuthSession,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let mut request = self.request(session, method, path)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        check(request.send().await?, path).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::NOT_FOUND {
        Err(PlacementError::NotFound(path.to_string()))
    } else if status == StatusCode::CONFLICT {
        let message = response.text().await.unwrap_or_default();
        Err(PlacementError::Conflict(message))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(PlacementError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PlacementApi for HttpPlacementClient {
    async fn list_traits(&self, session: &AuthSession) -> Result<BTreeSet<String>> {
        let list: TraitList = self.get(session, "/traits").await?;
        Ok(list.traits)
    }

    async fn create_trait(&self, session: &AuthSession, name: &str) -> Result<()> {
        self.send::<()>(session, Method::PUT, &format!("/traits/{}", name), None)
            .await
    }

    async fn provider_traits(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
    ) -> Result<ProviderTraits> {
        self.get(session, &format!("/resource_providers/{}/traits", provider))
            .await
    }

    async fn update_provider_traits(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        traits: &ProviderTraits,
    ) -> Result<()> {
        self.send(
            session,
            Method::PUT,
            &format!("/resource_providers/{}/traits", provider),
            Some(traits),
        )
        .await
    }

    async fn resource_class_exists(
        &self,
        session: &AuthSession,
        class: &ResourceClassName,
    ) -> Result<bool> {
        let found: Option<serde_json::Value> = self
            .get_optional(session, &format!("/resource_classes/{}", class))
            .await?;
        Ok(found.is_some())
    }

    async fn create_resource_class(
        &self,
        session: &AuthSession,
        class: &ResourceClassName,
    ) -> Result<()> {
        let body = NewResourceClass {
            name: class.as_str(),
        };
        self.send(session, Method::POST, "/resource_classes", Some(&body))
            .await
    }

    async fn provider_inventory(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
    ) -> Result<Option<ProviderInventory>> {
        self.get_optional(
            session,
            &format!("/resource_providers/{}/inventories/{}", provider, class),
        )
        .await
    }

    async fn create_inventory(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        inventory: &Inventory,
    ) -> Result<()> {
        let body = NewInventory {
            resource_class: class.as_str(),
            inventory,
        };
        self.send(
            session,
            Method::POST,
            &format!("/resource_providers/{}/inventories", provider),
            Some(&body),
        )
        .await
    }

    async fn update_inventory(
        &self,
        session: &AuthSession,
        provider: &ProviderId,
        class: &ResourceClassName,
        inventory: &ProviderInventory,
    ) -> Result<()> {
        self.send(
            session,
            Method::PUT,
            &format!("/resource_providers/{}/inventories/{}", provider, class),
            Some(inventory),
        )
        .await
    }

    async fn provider_by_name(
        &self,
        session: &AuthSession,
        name: &str,
    ) -> Result<Option<ResourceProvider>> {
        let base = session
            .endpoint(ServiceKind::Placement)
            .ok_or(PlacementError::MissingEndpoint)?;
        let response = self
            .client
            .get(format!("{}/resource_providers", base))
            .header(AUTH_HEADER, session.token())
            .header(VERSION_HEADER, API_VERSION)
            .query(&[("name", name)])
            .send()
            .await?;
        let list: ProviderList = check(response, "/resource_providers")
            .await?
            .json()
            .await
            .map_err(|e| PlacementError::InvalidResponse(e.to_string()))?;
        Ok(list.resource_providers.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(server: &MockServer) -> AuthSession {
        AuthSession::new("tok").with_endpoint(ServiceKind::Placement, server.uri())
    }

    fn client() -> HttpPlacementClient {
        HttpPlacementClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_traits_sends_token_and_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/traits"))
            .and(header("X-Auth-Token", "tok"))
            .and(header("OpenStack-API-Version", "placement 1.6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "traits": ["HW_CPU_X86_AVX", "CUSTOM_ACCEL_CRYPTO"]
            })))
            .mount(&server)
            .await;

        let traits = client().list_traits(&session(&server)).await.unwrap();
        assert!(traits.contains("CUSTOM_ACCEL_CRYPTO"));
    }

    #[tokio::test]
    async fn test_update_provider_traits_carries_generation() {
        let server = MockServer::start().await;
        let provider = ProviderId::generate();
        Mock::given(method("PUT"))
            .and(path(format!("/resource_providers/{}/traits", provider)))
            .and(body_json(serde_json::json!({
                "traits": ["CUSTOM_ACCEL_A", "CUSTOM_ACCEL_B"],
                "resource_provider_generation": 3
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let traits = ProviderTraits {
            traits: ["CUSTOM_ACCEL_B", "CUSTOM_ACCEL_A"]
                .into_iter()
                .map(String::from)
                .collect(),
            generation: 3,
        };
        client()
            .update_provider_traits(&session(&server), &provider, &traits)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_conflict_is_typed() {
        let server = MockServer::start().await;
        let provider = ProviderId::generate();
        Mock::given(method("PUT"))
            .and(path(format!("/resource_providers/{}/traits", provider)))
            .respond_with(ResponseTemplate::new(409).set_body_string("generation mismatch"))
            .mount(&server)
            .await;

        let err = client()
            .update_provider_traits(&session(&server), &provider, &ProviderTraits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_inventory_is_none() {
        let server = MockServer::start().await;
        let provider = ProviderId::generate();
        Mock::given(method("GET"))
            .and(path(format!(
                "/resource_providers/{}/inventories/CUSTOM_FPGA_INTEL_PF",
                provider
            )))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let class = ResourceClassName::new("CUSTOM_FPGA_INTEL_PF");
        let inventory = client()
            .provider_inventory(&session(&server), &provider, &class)
            .await
            .unwrap();
        assert!(inventory.is_none());
    }

    #[tokio::test]
    async fn test_create_inventory_body() {
        let server = MockServer::start().await;
        let provider = ProviderId::generate();
        Mock::given(method("POST"))
            .and(path(format!("/resource_providers/{}/inventories", provider)))
            .and(body_json(serde_json::json!({
                "resource_class": "CUSTOM_FPGA_INTEL_PF",
                "total": 2,
                "reserved": 0,
                "min_unit": 1,
                "max_unit": 2,
                "step_size": 1,
                "allocation_ratio": 1.0
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let class = ResourceClassName::new("CUSTOM_FPGA_INTEL_PF");
        client()
            .create_inventory(&session(&server), &provider, &class, &Inventory::for_count(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_provider_by_name() {
        let server = MockServer::start().await;
        let provider = ProviderId::generate();
        Mock::given(method("GET"))
            .and(path("/resource_providers"))
            .and(query_param("name", "compute-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resource_providers": [
                    {"uuid": provider, "name": "compute-1", "generation": 4}
                ]
            })))
            .mount(&server)
            .await;

        let found = client()
            .provider_by_name(&session(&server), "compute-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.uuid, provider);
        assert_eq!(found.generation, 4);
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let err = client()
            .list_traits(&AuthSession::new("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::MissingEndpoint));
    }
}
