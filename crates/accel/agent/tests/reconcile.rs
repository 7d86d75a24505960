//! End-to-end reconciliation scenarios against in-memory services

use accel_agent::{
    AgentError, AgentManager, CapabilityOutcome, HttpInventoryClient, InMemoryDiscovery,
    InMemoryInventory, InventoryApi, InventoryCall, InventoryError, InventoryOp, ReconcileEngine,
    SkipReason,
};
use accel_catalog::{ImageCache, InMemoryCatalog};
use accel_placement::{InMemoryPlacement, Inventory, InventoryAction, PlacementCall};
use accel_types::{
    AuthSession, DeployableRecord, Device, FunctionKind, ImageRecord, PciAddress, ProviderId,
    ResourceClassName, ServiceKind, StaticTokenSource, TokenSource,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "compute-1";

fn addr(s: &str) -> PciAddress {
    s.parse().unwrap()
}

fn session() -> AuthSession {
    AuthSession::new("tok")
        .with_endpoint(ServiceKind::Image, "http://glance:9292")
        .with_endpoint(ServiceKind::Placement, "http://placement:8778")
}

fn crypto_image() -> ImageRecord {
    ImageRecord {
        id: "bb80583b-a6ae-4cac-9df5-814383c1b32a".into(),
        name: Some("crypto".into()),
        vendor: Some("0x8086".into()),
        function_type: Some("crypto".into()),
        tags: vec!["FPGA".into()],
        checksum: None,
        updated_at: Utc::now() - Duration::minutes(10),
    }
}

/// PF `0000:01:00.0` exposing VF `0000:01:00.1`
fn pf_with_vf() -> Device {
    let pf = addr("0000:01:00.0");
    Device::physical(pf, "0x8086")
        .with_product("0x09c4")
        .with_name("arria10")
        .with_region(Device::virtual_function(addr("0000:01:00.1"), pf, "0x8086"))
}

struct Harness {
    discovery: Arc<InMemoryDiscovery>,
    inventory: Arc<InMemoryInventory>,
    catalog: Arc<InMemoryCatalog>,
    placement: Arc<InMemoryPlacement>,
    provider: ProviderId,
    manager: AgentManager,
}

impl Harness {
    async fn new() -> Self {
        Self::with_tokens(Arc::new(StaticTokenSource::new(session()))).await
    }

    async fn with_tokens(tokens: Arc<dyn TokenSource>) -> Self {
        let discovery = Arc::new(InMemoryDiscovery::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let placement = Arc::new(InMemoryPlacement::new());
        let provider = placement.add_provider(HOST).await;

        let images = Arc::new(ImageCache::new(catalog.clone(), tokens.clone()));
        let engine = ReconcileEngine::new(
            HOST,
            discovery.clone(),
            inventory.clone(),
            images,
            placement.clone(),
            tokens,
        );

        Self {
            discovery,
            inventory,
            catalog,
            placement,
            provider,
            manager: AgentManager::new(Arc::new(engine)),
        }
    }

    async fn run(&self) -> accel_agent::ReconcileReport {
        self.manager.update_available_resource().await.unwrap()
    }

    fn seed(&self, device: &Device, parent: Option<&DeployableRecord>) -> DeployableRecord {
        let record = DeployableRecord::from_device(HOST, device, parent.map(|p| p.uuid));
        self.inventory.seed(record.clone());
        record
    }
}

#[tokio::test]
async fn test_new_pf_and_vf_are_created_in_order() {
    let h = Harness::new().await;
    h.catalog.publish(crypto_image()).await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;

    let report = h.run().await;
    assert!(report.is_clean());
    assert_eq!(report.created, vec![addr("0000:01:00.0"), addr("0000:01:00.1")]);

    let calls = h.inventory.calls().await;
    assert_eq!(calls.len(), 2);
    let (pf, vf) = match (&calls[0], &calls[1]) {
        (InventoryCall::Create(pf), InventoryCall::Create(vf)) => (pf, vf),
        other => panic!("unexpected calls: {:?}", other),
    };
    assert_eq!(pf.address, addr("0000:01:00.0"));
    assert_eq!(pf.parent_uuid, None);
    assert_eq!(pf.board, "0x09c4");
    assert_eq!(pf.host, HOST);
    assert_eq!(vf.address, addr("0000:01:00.1"));
    assert_eq!(vf.parent_uuid, Some(pf.uuid));
    assert_eq!(vf.function, FunctionKind::Virtual);

    let pf_class = ResourceClassName::new("CUSTOM_FPGA_INTEL_PF");
    assert_eq!(
        h.placement.inventory_of(&h.provider, &pf_class).await,
        Some(Inventory::for_count(1))
    );
    let sync = report.capabilities.synced().unwrap();
    assert_eq!(sync.classes.get(&pf_class), Some(&InventoryAction::Created));
    assert!(h
        .placement
        .traits_of(&h.provider)
        .await
        .contains("CUSTOM_ACCEL_CRYPTO"));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = Harness::new().await;
    h.catalog.publish(crypto_image()).await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;

    h.run().await;
    h.inventory.clear_calls().await;
    h.placement.clear_calls().await;

    let report = h.run().await;
    assert_eq!(report.mutations(), 0);
    assert!(h.inventory.calls().await.is_empty());
    assert!(h.placement.calls().await.is_empty());
}

#[tokio::test]
async fn test_stale_vendor_is_updated_once() {
    let h = Harness::new().await;
    let device = Device::physical(addr("0000:02:00.0"), "0x8086");
    let stale = Device::physical(addr("0000:02:00.0"), "0x1172");
    let record = h.seed(&stale, None);
    h.discovery.set_devices("0x8086", vec![device]).await;

    let report = h.run().await;
    assert_eq!(report.updated, vec![addr("0000:02:00.0")]);
    assert!(report.created.is_empty());
    assert!(report.deleted.is_empty());

    let calls = h.inventory.calls().await;
    assert_eq!(calls.len(), 1);
    let InventoryCall::Update(updated) = &calls[0] else {
        panic!("expected an update, got {:?}", calls[0]);
    };
    assert_eq!(updated.uuid, record.uuid);
    assert_eq!(updated.vendor, "0x8086");
}

#[tokio::test]
async fn test_stale_record_is_deleted() {
    let h = Harness::new().await;
    let gone = h.seed(&Device::physical(addr("0000:03:00.0"), "0x8086"), None);
    h.discovery.set_devices("0x8086", vec![]).await;

    let report = h.run().await;
    assert_eq!(report.deleted, vec![addr("0000:03:00.0")]);
    assert_eq!(
        h.inventory.calls().await,
        vec![InventoryCall::Delete(gone.clone())]
    );
    assert!(h.inventory.record_at(&gone.address).is_none());

    h.inventory.clear_calls().await;
    let report = h.run().await;
    assert!(report.deleted.is_empty());
    assert!(h.inventory.calls().await.is_empty());
}

#[tokio::test]
async fn test_failed_delete_is_retried_next_run() {
    let h = Harness::new().await;
    let gone = h.seed(&Device::physical(addr("0000:03:00.0"), "0x8086"), None);
    h.discovery.set_devices("0x8086", vec![]).await;
    h.inventory.fail(InventoryOp::Delete, gone.address);

    let report = h.run().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].operation, InventoryOp::Delete);
    assert!(h.inventory.record_at(&gone.address).is_some());

    h.inventory.clear_failures();
    let report = h.run().await;
    assert_eq!(report.deleted, vec![gone.address]);
}

#[tokio::test]
async fn test_vf_is_deferred_when_parent_create_fails() {
    let h = Harness::new().await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;
    h.inventory.fail(InventoryOp::Create, addr("0000:01:00.0"));

    let report = h.run().await;
    assert!(report.created.is_empty());
    assert_eq!(report.deferred, vec![addr("0000:01:00.1")]);
    assert_eq!(report.failures.len(), 1);

    // Only the failed parent create reached the service.
    let calls = h.inventory.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].record().address, addr("0000:01:00.0"));

    h.inventory.clear_failures();
    let report = h.run().await;
    assert_eq!(report.created, vec![addr("0000:01:00.0"), addr("0000:01:00.1")]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_new_vf_of_recorded_pf_gets_parent_uuid() {
    let h = Harness::new().await;
    let device = pf_with_vf();
    let mut bare_pf = device.clone();
    bare_pf.regions.clear();
    let pf_record = h.seed(&bare_pf, None);
    h.discovery.set_devices("0x8086", vec![device]).await;

    let report = h.run().await;
    assert_eq!(report.created, vec![addr("0000:01:00.1")]);
    let vf = h.inventory.record_at(&addr("0000:01:00.1")).unwrap();
    assert_eq!(vf.parent_uuid, Some(pf_record.uuid));
}

#[tokio::test]
async fn test_vf_without_any_parent_record_is_deferred() {
    let h = Harness::new().await;
    let orphan = Device::virtual_function(addr("0000:04:00.1"), addr("0000:04:00.0"), "0x8086");
    h.discovery.set_devices("0x8086", vec![orphan]).await;

    let report = h.run().await;
    assert_eq!(report.deferred, vec![addr("0000:04:00.1")]);
    assert!(h.inventory.calls().await.is_empty());
}

#[tokio::test]
async fn test_update_failure_does_not_stop_the_run() {
    let h = Harness::new().await;
    let stale = h.seed(&Device::physical(addr("0000:02:00.0"), "0x1172"), None);
    let gone = h.seed(&Device::physical(addr("0000:03:00.0"), "0x8086"), None);
    h.discovery
        .set_devices("0x8086", vec![Device::physical(stale.address, "0x8086")])
        .await;
    h.inventory.fail(InventoryOp::Update, stale.address);

    let report = h.run().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].address, stale.address);
    assert_eq!(report.deleted, vec![gone.address]);
}

#[tokio::test]
async fn test_discovery_failure_aborts_before_mutation() {
    let h = Harness::new().await;
    h.seed(&Device::physical(addr("0000:03:00.0"), "0x8086"), None);
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;
    h.discovery.fail_with(Some("driver crashed")).await;

    let result = h.manager.update_available_resource().await;
    assert!(matches!(result, Err(AgentError::Discovery(_))));
    assert!(h.inventory.calls().await.is_empty());
    assert!(h.placement.calls().await.is_empty());
}

#[tokio::test]
async fn test_inventory_listing_failure_aborts() {
    let h = Harness::new().await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;
    h.inventory.set_list_unavailable(true);

    let result = h.manager.update_available_resource().await;
    assert!(matches!(result, Err(AgentError::Inventory(_))));
    assert!(h.inventory.calls().await.is_empty());
}

#[tokio::test]
async fn test_catalog_failure_uses_cached_images() {
    let h = Harness::new().await;
    h.catalog.publish(crypto_image()).await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;
    h.run().await;

    h.catalog.set_unavailable(true);
    let report = h.run().await;
    assert!(report.catalog_error.is_some());
    let summary = h.manager.engine().images().summary().await;
    assert!(summary["INTEL"].supports("CRYPTO"));
}

#[tokio::test]
async fn test_traits_are_added_not_replaced() {
    let h = Harness::new().await;
    h.placement
        .seed_provider_traits(&h.provider, ["CUSTOM_ACCEL_LEGACY"])
        .await;
    h.catalog.publish(crypto_image()).await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;

    h.run().await;
    let traits = h.placement.traits_of(&h.provider).await;
    assert!(traits.contains("CUSTOM_ACCEL_LEGACY"));
    assert!(traits.contains("CUSTOM_ACCEL_CRYPTO"));
    assert!(traits.contains("CUSTOM_ACCEL_FPGA"));

    let updates = h
        .placement
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, PlacementCall::UpdateProviderTraits { .. }))
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test]
async fn test_capabilities_skipped_without_credentials() {
    let h = Harness::with_tokens(Arc::new(StaticTokenSource::empty())).await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;

    let report = h.run().await;
    assert_eq!(
        report.capabilities,
        CapabilityOutcome::Skipped(SkipReason::NoCredentials)
    );
    assert_eq!(report.created.len(), 2);
    assert!(h.placement.calls().await.is_empty());
    assert_eq!(h.catalog.query_count(), 0);
}

#[tokio::test]
async fn test_capabilities_skipped_without_provider() {
    let h = Harness::new().await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;
    let engine = ReconcileEngine::new(
        "unregistered-host",
        h.discovery.clone(),
        Arc::new(InMemoryInventory::new()),
        Arc::new(ImageCache::new(
            h.catalog.clone(),
            Arc::new(StaticTokenSource::new(session())),
        )),
        h.placement.clone(),
        Arc::new(StaticTokenSource::new(session())),
    );

    let report = engine.update_usage().await.unwrap();
    assert_eq!(
        report.capabilities,
        CapabilityOutcome::Skipped(SkipReason::NoProvider)
    );
    assert_eq!(report.created.len(), 2);
}

#[tokio::test]
async fn test_manager_image_for_and_hardware_list() {
    let h = Harness::new().await;
    h.catalog.publish(crypto_image()).await;
    h.discovery.set_devices("0x8086", vec![pf_with_vf()]).await;

    let class = ResourceClassName::new("CUSTOM_FPGA_INTEL_PF");
    let image = h.manager.image_for(&class, &["CUSTOM_ACCEL_CRYPTO"]).await;
    assert_eq!(image.map(|i| i.id), Some(crypto_image().id));
    assert!(h.manager.image_for(&class, &["GZIP"]).await.is_none());

    let hardware = h.manager.hardware_list().await.unwrap();
    let addresses: Vec<_> = hardware.iter().map(|d| d.address).collect();
    assert_eq!(addresses, vec![addr("0000:01:00.0"), addr("0000:01:00.1")]);
}

/// Inventory that hands control back to the runtime after every listing
struct YieldingInventory(Arc<InMemoryInventory>);

#[async_trait]
impl InventoryApi for YieldingInventory {
    async fn list_by_host(&self, host: &str) -> Result<Vec<DeployableRecord>, InventoryError> {
        let records = self.0.list_by_host(host).await;
        tokio::task::yield_now().await;
        records
    }

    async fn create(&self, record: &DeployableRecord) -> Result<DeployableRecord, InventoryError> {
        self.0.create(record).await
    }

    async fn update(&self, record: &DeployableRecord) -> Result<(), InventoryError> {
        self.0.update(record).await
    }

    async fn delete(&self, record: &DeployableRecord) -> Result<(), InventoryError> {
        self.0.delete(record).await
    }
}

#[tokio::test]
async fn test_concurrent_runs_are_serialized() {
    let discovery = Arc::new(InMemoryDiscovery::new());
    discovery.set_devices("0x8086", vec![pf_with_vf()]).await;
    let inventory = Arc::new(InMemoryInventory::new());
    let tokens: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::empty());
    let engine = ReconcileEngine::new(
        HOST,
        discovery,
        Arc::new(YieldingInventory(inventory.clone())),
        Arc::new(ImageCache::new(Arc::new(InMemoryCatalog::new()), tokens.clone())),
        Arc::new(InMemoryPlacement::new()),
        tokens,
    );

    let (a, b) = tokio::join!(engine.update_usage(), engine.update_usage());
    let (a, b) = (a.unwrap(), b.unwrap());

    // The second run starts only after the first has written its records.
    assert_eq!(a.created.len() + b.created.len(), 2);
    assert_eq!(b.mutations(), 0);
    assert_eq!(inventory.records().len(), 2);
}

#[tokio::test]
async fn test_record_with_unreadable_vendor_is_updated_not_duplicated() {
    let server = MockServer::start().await;
    let device = Device::physical(addr("0000:01:00.0"), "0x8086");
    let record = DeployableRecord::from_device(HOST, &device, None);
    let mut listed = serde_json::to_value(&record).unwrap();
    listed["vendor"] = serde_json::Value::Null;

    Mock::given(method("GET"))
        .and(path("/v1/deployables"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "deployables": [listed] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/v1/deployables/{}", record.uuid)))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let discovery = Arc::new(InMemoryDiscovery::new());
    discovery.set_devices("0x8086", vec![device]).await;
    let tokens: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::empty());
    let inventory =
        HttpInventoryClient::new(&server.uri(), std::time::Duration::from_secs(5)).unwrap();
    let engine = ReconcileEngine::new(
        HOST,
        discovery,
        Arc::new(inventory),
        Arc::new(ImageCache::new(Arc::new(InMemoryCatalog::new()), tokens.clone())),
        Arc::new(InMemoryPlacement::new()),
        tokens,
    );

    for _ in 0..2 {
        let report = engine.update_usage().await.unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.updated, vec![addr("0000:01:00.0")]);
        assert!(report.failures.is_empty());
    }
}
