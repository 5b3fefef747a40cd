//! `teraswitch_cloud_compute`: virtual machine instances.
//!
//! Create posts to `/v2/Instance` and, unless `skip_wait_for_ready` is set,
//! waits for the instance to report `Active` so `ip_addresses` can be filled.
//! Power state is the only attribute updated in place; everything else
//! replaces the instance.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{
    decode, encode, incomplete, require_id, send_power_command, to_i32, PowerState, Resource,
};
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::poll::Observed;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, AttributeType, Schema, Validator};

const TYPE_NAME: &str = "teraswitch_cloud_compute";

/// Declared and stored state of a compute instance.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeModel {
    pub id: Option<i64>,
    pub project_id: Option<i64>,
    pub region_id: String,
    pub tier_id: String,
    pub image_id: Option<String>,
    pub display_name: String,
    pub ssh_key_ids: Option<Vec<i64>>,
    pub password: Option<String>,
    pub boot_size: i64,
    pub user_data: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ip_addresses: Option<Vec<String>>,
    pub desired_power_state: PowerState,
    pub skip_wait_for_ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<i64>,
    region_id: &'a str,
    tier_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_id: Option<&'a str>,
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssh_key_ids: Option<&'a [i64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    boot_size: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
}

impl<'a> CreateInstanceRequest<'a> {
    fn from_model(model: &'a ComputeModel, project_id: Option<i64>) -> Result<Self, ProviderError> {
        Ok(Self {
            project_id,
            region_id: &model.region_id,
            tier_id: &model.tier_id,
            image_id: model.image_id.as_deref(),
            display_name: &model.display_name,
            ssh_key_ids: model.ssh_key_ids.as_deref(),
            password: model.password.as_deref(),
            boot_size: to_i32(model.boot_size, "boot_size")?,
            user_data: model.user_data.as_deref(),
            tags: model.tags.as_deref(),
        })
    }
}

/// An instance as reported by the API.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudService {
    pub id: Option<i64>,
    pub project_id: Option<i64>,
    pub region_id: Option<String>,
    pub tier_id: Option<String>,
    pub image_id: Option<String>,
    pub display_name: Option<String>,
    pub status: Option<String>,
    pub power_state: Option<String>,
    pub ip_addresses: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub created: Option<String>,
}

impl Observed for CloudService {
    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

async fn get_instance(ctx: &ProviderContext, id: i64) -> Result<CloudService, ProviderError> {
    ctx.client()
        .get(&format!("/v2/Instance/{}", id), &[])
        .await?
        .into_result("get instance")
}

/// Handler for `teraswitch_cloud_compute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeResource;

#[async_trait::async_trait]
impl Resource for ComputeResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Cloud Compute Instance")
            .with_attribute(
                "id",
                Attribute::computed_int64().with_description("Id of the compute instance"),
            )
            .with_attribute(
                "project_id",
                Attribute::optional_int64()
                    .requires_replace_if_configured()
                    .with_description(
                        "The ID of the project that the instance will be created in.",
                    ),
            )
            .with_attribute(
                "region_id",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The ID of the region that the instance will be created in."),
            )
            .with_attribute(
                "tier_id",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The service tier to be created."),
            )
            .with_attribute(
                "image_id",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("The image to use when creating this service."),
            )
            .with_attribute(
                "display_name",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The display name of the instance."),
            )
            .with_attribute(
                "ssh_key_ids",
                Attribute::optional_list(AttributeType::Int64)
                    .requires_replace()
                    .with_validator(Validator::at_least_one_of(["password"]))
                    .with_description("SSH key ids added to the root user's authorized_keys."),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .requires_replace()
                    .with_validator(Validator::at_least_one_of(["ssh_key_ids"]))
                    .with_description("The password to be set for the root user."),
            )
            .with_attribute(
                "boot_size",
                Attribute::required_int64()
                    .requires_replace_if_configured()
                    .with_validator(Validator::Range {
                        min: Some(1),
                        max: Some(i64::from(i32::MAX)),
                    })
                    .with_description("The size of the boot disk."),
            )
            .with_attribute(
                "user_data",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("Additional user data."),
            )
            .with_attribute(
                "tags",
                Attribute::optional_list(AttributeType::String)
                    .requires_replace()
                    .with_description("Tags to be added to the instance."),
            )
            .with_attribute(
                "ip_addresses",
                Attribute::computed_list(AttributeType::String)
                    .with_description("IP addresses of the instance."),
            )
            .with_attribute(
                "desired_power_state",
                Attribute::optional_string()
                    .with_default(json!("On"))
                    .with_validator(Validator::one_of(PowerState::VALUES))
                    .with_description("The desired power state for the compute instance."),
            )
            .with_attribute(
                "skip_wait_for_ready",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description(
                        "Skips waiting for the instance to become ready on create. \
                         `ip_addresses` will be null until the next read.",
                    ),
            )
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value, ProviderError> {
        let mut model: ComputeModel = decode(planned, TYPE_NAME)?;
        let project_id = model.project_id.or(ctx.config().project_id);
        let body = CreateInstanceRequest::from_model(&model, project_id)?;

        lifecycle.advance(LifecycleState::Creating)?;
        let created: CloudService = ctx
            .client()
            .post("/v2/Instance", &[], &body)
            .await?
            .into_result("create instance")?;
        let id = created.id.ok_or_else(|| {
            ProviderError::Decode("create instance: response carried no id".into())
        })?;
        model.id = Some(id);
        info!(id, region = %model.region_id, "compute instance created");

        if !model.skip_wait_for_ready {
            lifecycle.advance(LifecycleState::Polling)?;
            let ready = ctx
                .wait_for_status(|| get_instance(ctx, id), "Active")
                .await
                .map_err(|e| {
                    warn!(id, error = %e, "compute instance did not become ready");
                    incomplete(&model, e)
                })?;
            model.ip_addresses = Some(ready.ip_addresses.unwrap_or_default());
        }

        lifecycle.advance(LifecycleState::Ready)?;
        encode(&model)
    }

    async fn read(&self, ctx: &ProviderContext, state: Value) -> Result<Value, ProviderError> {
        let mut model: ComputeModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        let observed = get_instance(ctx, id).await?;
        model.ip_addresses = observed.ip_addresses;
        encode(&model)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: ComputeModel = decode(prior, TYPE_NAME)?;
        let mut planned: ComputeModel = decode(planned, TYPE_NAME)?;
        let id = require_id(&prior.id, TYPE_NAME)?;

        if planned.desired_power_state != prior.desired_power_state {
            info!(
                id,
                old_power_state = ?prior.desired_power_state,
                new_power_state = ?planned.desired_power_state,
                "updating power state"
            );
            send_power_command(ctx, "Instance", id, planned.desired_power_state).await?;
        }

        planned.id = Some(id);
        planned.ip_addresses = prior.ip_addresses;
        encode(&planned)
    }

    async fn delete(&self, ctx: &ProviderContext, state: Value) -> Result<(), ProviderError> {
        let model: ComputeModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        ctx.client()
            .delete::<Value>(&format!("/v2/Instance/{}", id), &[], None)
            .await?;
        info!(id, "compute instance deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;

    fn declared() -> Value {
        json!({
            "region_id": "EWR1",
            "tier_id": "v1-small",
            "image_id": "ubuntu-22.04",
            "display_name": "web-1",
            "ssh_key_ids": [11, 12],
            "boot_size": 40,
            "tags": ["web"]
        })
    }

    #[test]
    fn test_schema_accepts_declared_config() {
        let diags = validate(&ComputeResource.schema(), &declared());
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_schema_requires_credentials() {
        let mut config = declared();
        config.as_object_mut().unwrap().remove("ssh_key_ids");
        let diags = validate(&ComputeResource.schema(), &config);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_schema_rejects_unknown_power_state() {
        let mut config = declared();
        config["desired_power_state"] = json!("Suspended");
        let diags = validate(&ComputeResource.schema(), &config);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("desired_power_state"));
    }

    #[test]
    fn test_create_payload() {
        let model: ComputeModel = decode(declared(), TYPE_NAME).unwrap();
        assert_eq!(model.desired_power_state, PowerState::On);
        assert!(!model.skip_wait_for_ready);

        let body = CreateInstanceRequest::from_model(&model, Some(480)).unwrap();
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "projectId": 480,
                "regionId": "EWR1",
                "tierId": "v1-small",
                "imageId": "ubuntu-22.04",
                "displayName": "web-1",
                "sshKeyIds": [11, 12],
                "bootSize": 40,
                "tags": ["web"]
            })
        );
    }

    #[test]
    fn test_create_payload_rejects_oversized_boot_disk() {
        let mut model: ComputeModel = decode(declared(), TYPE_NAME).unwrap();
        model.boot_size = i64::from(i32::MAX) + 1;
        assert!(CreateInstanceRequest::from_model(&model, None).is_err());
    }

    #[test]
    fn test_cloud_service_decodes_partial_payload() {
        let svc: CloudService =
            serde_json::from_value(json!({"id": 9, "status": "Provisioning"})).unwrap();
        assert_eq!(svc.status(), Some("Provisioning"));
        assert!(svc.ip_addresses.is_none());
    }
}
