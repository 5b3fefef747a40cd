mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeApi, ADDRESS, PROJECT_ID};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use teraswitch_provider::testing::{assert_plan_replaces, assert_plan_updates_in_place, ProviderTester};
use teraswitch_provider::{ProviderError, ProviderService, TeraswitchProvider};

async fn tester(api: &FakeApi) -> ProviderTester<TeraswitchProvider> {
    let tester = ProviderTester::new(TeraswitchProvider::new());
    tester.configure(api.provider_config()).await.unwrap();
    tester
}

fn compute_config() -> Value {
    json!({
        "region_id": "EWR1",
        "tier_id": "v1-small",
        "image_id": "ubuntu-22.04",
        "display_name": "web-1",
        "ssh_key_ids": [11],
        "boot_size": 40
    })
}

fn metal_config() -> Value {
    json!({
        "region_id": "EWR1",
        "tier_id": "7302p-64g",
        "display_name": "db-1",
        "password": "hunter22",
        "memory_gb": 64,
        "wait_for_ready": true,
        "raid_arrays": [{
            "name": "md0",
            "type": "Raid1",
            "members": ["nvme0n1", "nvme1n1"],
            "file_system": "Ext4",
            "mount_point": "/"
        }]
    })
}

#[tokio::test]
async fn test_compute_lifecycle() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;

    let state = tester
        .lifecycle_create("teraswitch_cloud_compute", compute_config())
        .await
        .unwrap();
    let id = state["id"].as_i64().unwrap();
    assert_eq!(state["ip_addresses"], json!([ADDRESS]));
    assert_eq!(state["desired_power_state"], "On");
    assert!(state["project_id"].is_null());

    let sent = api.instance(id).unwrap();
    assert_eq!(sent["projectId"], PROJECT_ID);
    assert_eq!(sent["bootSize"], 40);
    assert!(sent.get("password").is_none());

    let mut off = compute_config();
    off["desired_power_state"] = json!("Off");
    let plan = tester
        .plan_update("teraswitch_cloud_compute", state.clone(), off.clone())
        .await
        .unwrap();
    assert_plan_updates_in_place(&plan, "desired_power_state");

    let updated = tester
        .lifecycle_update("teraswitch_cloud_compute", state, off)
        .await
        .unwrap();
    assert_eq!(updated["desired_power_state"], "Off");
    assert_eq!(updated["id"], id);
    let power = api.calls("POST", &format!("/v2/Instance/{}/PowerCommand", id));
    assert_eq!(power.len(), 1);
    assert_eq!(power[0].query.as_deref(), Some("command=PowerOff"));

    assert_ok!(tester.delete("teraswitch_cloud_compute", updated).await);
    assert!(api.instance(id).is_none());
}

#[tokio::test]
async fn test_compute_skip_wait_leaves_addresses_empty() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;

    let mut config = compute_config();
    config["skip_wait_for_ready"] = json!(true);
    let plan = tester
        .plan_create("teraswitch_cloud_compute", config)
        .await
        .unwrap();
    let state = tester
        .create("teraswitch_cloud_compute", plan.planned_state)
        .await
        .unwrap();

    assert!(state["ip_addresses"].is_null());
    let id = state["id"].as_i64().unwrap();
    assert!(api.calls("GET", &format!("/v2/Instance/{}", id)).is_empty());
}

#[tokio::test]
async fn test_metal_lifecycle() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;

    let state = tester
        .lifecycle_create("teraswitch_metal", metal_config())
        .await
        .unwrap();
    let id = state["id"].as_i64().unwrap();
    assert_eq!(state["project_id"], PROJECT_ID);
    assert_eq!(state["ip_addresses"], json!([ADDRESS]));

    let sent = api.metal(id).unwrap();
    assert_eq!(sent["quantity"], 1);
    assert_eq!(sent["memoryGb"], 64);
    assert_eq!(sent["raidArrays"][0]["fileSystem"], "Ext4");

    let mut changed = metal_config();
    changed["display_name"] = json!("db-primary");
    changed["desired_power_state"] = json!("Off");
    let updated = tester
        .lifecycle_update("teraswitch_metal", state.clone(), changed)
        .await
        .unwrap();
    assert_eq!(updated["display_name"], "db-primary");
    assert_eq!(api.metal(id).unwrap()["displayName"], "db-primary");
    assert_eq!(
        api.calls("POST", &format!("/v2/Metal/{}/Rename", id)).len(),
        1
    );
    assert_eq!(
        api.calls("POST", &format!("/v2/Metal/{}/PowerCommand", id))[0]
            .query
            .as_deref(),
        Some("command=PowerOff")
    );

    let mut resized = metal_config();
    resized["memory_gb"] = json!(128);
    let plan = tester
        .plan_update("teraswitch_metal", updated.clone(), resized.clone())
        .await
        .unwrap();
    assert_plan_replaces(&plan, "memory_gb");
    let err = tester
        .update("teraswitch_metal", updated.clone(), plan.planned_state)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::FailedPrecondition(_)));

    tester.delete("teraswitch_metal", updated).await.unwrap();
    let deletes = api.calls("DELETE", &format!("/v1/Metal/{}", id));
    assert_eq!(deletes[0].query, Some(format!("projectId={}", PROJECT_ID)));
    assert!(api.metal(id).is_none());
}

#[tokio::test]
async fn test_metal_unchanged_name_is_not_renamed() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;

    let mut config = metal_config();
    config["wait_for_ready"] = json!(false);
    let state = tester
        .lifecycle_create("teraswitch_metal", config.clone())
        .await
        .unwrap();
    let id = state["id"].as_i64().unwrap();

    config["desired_power_state"] = json!("Off");
    tester
        .lifecycle_update("teraswitch_metal", state, config)
        .await
        .unwrap();
    assert!(api.calls("POST", &format!("/v2/Metal/{}/Rename", id)).is_empty());
}

#[tokio::test]
async fn test_network_create_import_delete() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;

    let state = tester
        .lifecycle_create(
            "teraswitch_network",
            json!({
                "region_id": "EWR1",
                "display_name": "private",
                "v4_subnet": "10.10.0.0",
                "v4_subnet_mask": "255.255.255.0"
            }),
        )
        .await
        .unwrap();
    let id = state["id"].as_str().unwrap().to_string();

    let imported = tester
        .import_resource("teraswitch_network", &id)
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].resource_type, "teraswitch_network");
    assert_eq!(imported[0].state, state);

    assert_ok!(tester.delete("teraswitch_network", state.clone()).await);
    let err = assert_err!(tester.read("teraswitch_network", state).await);
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_volume_create_import_delete() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;

    let state = tester
        .create(
            "teraswitch_volume",
            json!({
                "region_id": "EWR1",
                "display_name": "data",
                "volume_type": "NVME",
                "size": 100
            }),
        )
        .await
        .unwrap();
    assert_eq!(state["status"], "Creating");
    let id = state["id"].as_str().unwrap().to_string();

    let refreshed = tester.read("teraswitch_volume", state).await.unwrap();
    assert_eq!(refreshed["status"], "Available");
    assert_eq!(refreshed["size"], 100);

    let imported = tester.import_resource("teraswitch_volume", &id).await.unwrap();
    assert_eq!(imported[0].state, refreshed);

    tester
        .delete("teraswitch_volume", refreshed.clone())
        .await
        .unwrap();
    assert_eq!(api.volume_count(), 0);

    let err = tester.read("teraswitch_volume", refreshed).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_import_unsupported_for_compute() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;
    let err = assert_err!(tester.import_resource("teraswitch_cloud_compute", "12").await);
    assert!(matches!(err, ProviderError::Unimplemented(_)));
}

#[tokio::test]
async fn test_failed_delete_surfaces_status() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;
    let state = tester
        .lifecycle_create("teraswitch_cloud_compute", compute_config())
        .await
        .unwrap();
    let id = state["id"].as_i64().unwrap();

    api.fail_deletes();
    let err = tester
        .delete("teraswitch_cloud_compute", state)
        .await
        .unwrap_err();
    match err {
        ProviderError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(api.instance(id).is_some());
}

#[tokio::test]
async fn test_metal_data_source() {
    let api = FakeApi::start().await;
    let tester = tester(&api).await;
    api.insert_metal(
        77,
        json!({
            "projectId": PROJECT_ID,
            "regionId": "LAX1",
            "displayName": "legacy",
            "tierId": "7302p-64g",
            "memoryGb": 64,
            "ipv4DefaultGateway": "198.51.100.1",
            "monthlyPrice": 199.0,
            "hourlyPrice": 0.27,
            "tags": ["db"]
        }),
    );

    let data = tester
        .read_data_source("teraswitch_metal", json!({"id": 77}))
        .await
        .unwrap();
    assert_eq!(data["id"], 77);
    assert_eq!(data["status"], "Active");
    assert_eq!(data["region_id"], "LAX1");
    assert_eq!(data["memory_gb"], 64);
    assert_eq!(data["ipv4_default_gateway"], "198.51.100.1");
    assert_eq!(data["hourly_price"], 0.27);
    assert_eq!(data["tags"], json!(["db"]));
}

#[tokio::test]
async fn test_stop_cancels_readiness_wait() {
    let api = FakeApi::start().await;
    api.hold_provisioning();
    let provider = Arc::new(TeraswitchProvider::new());
    provider.configure(api.provider_config()).await.unwrap();

    let task = {
        let provider = provider.clone();
        tokio::spawn(async move {
            let planned = provider
                .plan("teraswitch_cloud_compute", None, compute_config())
                .await?;
            provider
                .create("teraswitch_cloud_compute", planned.planned_state)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    provider.stop().await.unwrap();

    let err = task.await.unwrap().unwrap_err();
    match &err {
        ProviderError::Incomplete { source, .. } => {
            assert!(matches!(**source, ProviderError::Cancelled(_)), "{err:?}")
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_cancellation());
    let id = err.partial_state().unwrap()["id"].as_i64().unwrap();
    assert!(api.instance(id).is_some());
}

#[tokio::test]
async fn test_readiness_deadline() {
    let api = FakeApi::start().await;
    api.hold_provisioning();
    let mut config = api.provider_config();
    config["wait_timeout_secs"] = json!(1);
    let tester = ProviderTester::new(TeraswitchProvider::new());
    tester.configure(config).await.unwrap();

    let err = tester
        .lifecycle_create("teraswitch_metal", metal_config())
        .await
        .unwrap_err();
    match &err {
        ProviderError::Incomplete { source, .. } => {
            assert!(matches!(**source, ProviderError::DeadlineExceeded(_)), "{err:?}")
        },
        other => panic!("unexpected error: {other:?}"),
    }

    let state = err.partial_state().unwrap().clone();
    let id = state["id"].as_i64().unwrap();
    assert!(api.metal(id).is_some());
    assert_eq!(state["project_id"], PROJECT_ID);

    assert_ok!(tester.delete("teraswitch_metal", state).await);
    assert!(api.metal(id).is_none());
}

#[tokio::test]
async fn test_compute_wait_failure_returns_created_id() {
    let api = FakeApi::start().await;
    api.hold_provisioning();
    let mut config = api.provider_config();
    config["wait_timeout_secs"] = json!(1);
    let tester = ProviderTester::new(TeraswitchProvider::new());
    tester.configure(config).await.unwrap();

    let plan = tester
        .plan_create("teraswitch_cloud_compute", compute_config())
        .await
        .unwrap();
    let err = tester
        .create("teraswitch_cloud_compute", plan.planned_state)
        .await
        .unwrap_err();

    assert!(err.is_cancellation(), "{err:?}");
    let state = err.partial_state().unwrap();
    let id = state["id"].as_i64().unwrap();
    assert!(api.instance(id).is_some());
    assert_eq!(state["display_name"], "web-1");
    assert!(state["ip_addresses"].is_null());
}

#[tokio::test]
async fn test_huge_wait_timeout_is_accepted() {
    let api = FakeApi::start().await;
    let mut config = api.provider_config();
    config["wait_timeout_secs"] = json!(i64::MAX);
    let tester = ProviderTester::new(TeraswitchProvider::new());
    tester.configure(config).await.unwrap();

    let state = tester
        .lifecycle_create("teraswitch_cloud_compute", compute_config())
        .await
        .unwrap();
    assert_eq!(state["ip_addresses"], json!([ADDRESS]));
}

#[tokio::test]
async fn test_wrong_api_key_is_rejected() {
    let api = FakeApi::start().await;
    let mut config = api.provider_config();
    config["api_key"] = json!("wrong");
    let tester = ProviderTester::new(TeraswitchProvider::new());
    tester.configure(config).await.unwrap();

    let err = tester
        .read("teraswitch_cloud_compute", json!({"id": 1}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}
