//! `teraswitch_metal`: bare-metal servers.
//!
//! Display name and power state are updated in place through the rename and
//! power-command endpoints. Storage layout (disks, partitions, RAID arrays)
//! and every other input replace the server.

use std::collections::BTreeMap;

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
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema, Validator,
};

const TYPE_NAME: &str = "teraswitch_metal";

/// File systems a partition or RAID array can be formatted with.
pub const FILE_SYSTEMS: [&str; 12] = [
    "Unknown",
    "Unformatted",
    "Ext2",
    "Ext4",
    "Xfs",
    "Fat32",
    "Vfat",
    "Swap",
    "Ramfs",
    "Tmpfs",
    "Btrfs",
    "ZfsRoot",
];

/// Supported RAID levels.
pub const RAID_TYPES: [&str; 4] = ["None", "Raid0", "Raid1", "Unknown"];

/// Declared and stored state of a metal server.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetalModel {
    pub id: Option<i64>,
    pub project_id: Option<i64>,
    pub region_id: String,
    pub display_name: Option<String>,
    pub tier_id: String,
    pub image_id: Option<String>,
    pub ssh_key_ids: Option<Vec<i64>>,
    pub password: Option<String>,
    pub user_data: Option<String>,
    pub tags: Option<Vec<String>>,
    pub memory_gb: Option<i64>,
    pub disks: Option<BTreeMap<String, String>>,
    pub partitions: Option<Vec<Partition>>,
    pub raid_arrays: Option<Vec<RaidArray>>,
    pub ipxe_url: Option<String>,
    pub template_id: Option<i64>,
    pub reserve_pricing: Option<bool>,
    pub ip_addresses: Option<Vec<String>>,
    pub desired_power_state: PowerState,
    pub wait_for_ready: bool,
}

/// A partition on a physical device or RAID array.
///
/// Serialized in snake case for state and camel case on the wire.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Partition {
    pub name: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    pub file_system: String,
    pub mount_point: String,
}

/// A software RAID array.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidArray {
    pub name: String,
    #[serde(rename = "type")]
    pub raid_type: String,
    pub members: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    pub file_system: String,
    pub mount_point: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PartitionPayload<'a> {
    name: &'a str,
    device: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<i64>,
    file_system: &'a str,
    mount_point: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RaidArrayPayload<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    raid_type: &'a str,
    members: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<i64>,
    file_system: &'a str,
    mount_point: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMetalRequest<'a> {
    project_id: i64,
    region_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    tier_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssh_key_ids: Option<&'a [i64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_gb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disks: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    partitions: Vec<PartitionPayload<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    raid_arrays: Vec<RaidArrayPayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipxe_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_id: Option<i64>,
    quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reserve_pricing: Option<bool>,
}

impl<'a> CreateMetalRequest<'a> {
    fn from_model(model: &'a MetalModel, project_id: i64) -> Result<Self, ProviderError> {
        let partitions = model
            .partitions
            .iter()
            .flatten()
            .map(|p| PartitionPayload {
                name: &p.name,
                device: &p.device,
                size_bytes: p.size_bytes,
                file_system: &p.file_system,
                mount_point: &p.mount_point,
            })
            .collect();
        let raid_arrays = model
            .raid_arrays
            .iter()
            .flatten()
            .map(|r| RaidArrayPayload {
                name: &r.name,
                raid_type: &r.raid_type,
                members: &r.members,
                size_bytes: r.size_bytes,
                file_system: &r.file_system,
                mount_point: &r.mount_point,
            })
            .collect();

        Ok(Self {
            project_id,
            region_id: &model.region_id,
            display_name: model.display_name.as_deref(),
            tier_id: &model.tier_id,
            image_id: model.image_id.as_deref(),
            ssh_key_ids: model.ssh_key_ids.as_deref(),
            password: model.password.as_deref(),
            user_data: model.user_data.as_deref(),
            tags: model.tags.as_deref(),
            memory_gb: model
                .memory_gb
                .map(|gb| to_i32(gb, "memory_gb"))
                .transpose()?,
            disks: model.disks.as_ref(),
            partitions,
            raid_arrays,
            ipxe_url: model.ipxe_url.as_deref(),
            template_id: model.template_id,
            quantity: 1,
            reserve_pricing: model.reserve_pricing,
        })
    }
}

/// A metal server as reported by the API.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetalService {
    pub id: Option<i64>,
    pub project_id: Option<i64>,
    pub region_id: Option<String>,
    pub display_name: Option<String>,
    pub tier_id: Option<String>,
    pub image_id: Option<String>,
    pub status: Option<String>,
    pub power_state: Option<String>,
    pub current_task: Option<String>,
    pub ip_addresses: Option<Vec<String>>,
    pub ipv4_default_gateway: Option<String>,
    pub ipv6_default_gateway: Option<String>,
    pub memory_gb: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub reserve_pricing: Option<bool>,
    pub active_date: Option<String>,
    pub termination_date: Option<String>,
    pub monthly_price: Option<f64>,
    pub hourly_price: Option<f64>,
    pub created: Option<String>,
}

impl Observed for MetalService {
    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// `GET /v2/Metal/{id}`.
pub(crate) async fn get_metal(
    ctx: &ProviderContext,
    id: i64,
) -> Result<MetalService, ProviderError> {
    ctx.client()
        .get(&format!("/v2/Metal/{}", id), &[])
        .await?
        .into_result("get metal")
}

/// Handler for `teraswitch_metal`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetalResource;

#[async_trait::async_trait]
impl Resource for MetalResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let partition = Block::new()
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the partition."),
            )
            .with_attribute(
                "device",
                Attribute::required_string().with_description(
                    "The storage device to partition: a RAID array or a physical device.",
                ),
            )
            .with_attribute(
                "size_bytes",
                Attribute::optional_int64()
                    .with_description("Partition size in bytes. Defaults to the remaining space."),
            )
            .with_attribute(
                "file_system",
                Attribute::required_string()
                    .with_validator(Validator::one_of(FILE_SYSTEMS))
                    .with_description("File system the partition is initialized with."),
            )
            .with_attribute(
                "mount_point",
                Attribute::required_string().with_description("The mount point of the partition."),
            );

        let raid_array = Block::new()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("The name of the array, e.g. \"md0\"."),
            )
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_validator(Validator::one_of(RAID_TYPES))
                    .with_description("The RAID level."),
            )
            .with_attribute(
                "members",
                Attribute::required_list(AttributeType::String)
                    .with_description("Device or partition names in the array."),
            )
            .with_attribute(
                "size_bytes",
                Attribute::optional_int64().with_description("Array size in bytes."),
            )
            .with_attribute(
                "file_system",
                Attribute::required_string()
                    .with_validator(Validator::one_of(FILE_SYSTEMS))
                    .with_description("File system the array is initialized with."),
            )
            .with_attribute(
                "mount_point",
                Attribute::required_string().with_description("The mount point of the array."),
            );

        Schema::v0()
            .with_description("Metal")
            .with_attribute(
                "id",
                Attribute::computed_int64().with_description("Id of the metal server"),
            )
            .with_attribute(
                "project_id",
                Attribute::optional_int64()
                    .requires_replace_if_configured()
                    .with_description(
                        "The project the server is created in. Defaults to the provider project.",
                    ),
            )
            .with_attribute(
                "region_id",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The region the server is created in."),
            )
            .with_attribute(
                "display_name",
                Attribute::optional_string().with_description("The display name of the server."),
            )
            .with_attribute(
                "tier_id",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The server configuration, e.g. 7302p-64g."),
            )
            .with_attribute(
                "image_id",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("The image to install."),
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
                "user_data",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("Additional user data."),
            )
            .with_attribute(
                "tags",
                Attribute::optional_list(AttributeType::String)
                    .requires_replace()
                    .with_description("Tags to be added to the server."),
            )
            .with_attribute(
                "memory_gb",
                Attribute::optional_int64()
                    .requires_replace()
                    .with_validator(Validator::Range {
                        min: Some(1),
                        max: Some(i64::from(i32::MAX)),
                    })
                    .with_description("Memory to allocate, in GB."),
            )
            .with_attribute(
                "disks",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional(),
                )
                .requires_replace()
                .with_description("Disk names mapped to sizes in GB. Defaults to the tier layout."),
            )
            .with_block(
                "partitions",
                NestedBlock::list(partition).requires_replace(),
            )
            .with_block(
                "raid_arrays",
                NestedBlock::list(raid_array).requires_replace(),
            )
            .with_attribute(
                "ipxe_url",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("Script URL used when booting over iPXE."),
            )
            .with_attribute(
                "template_id",
                Attribute::optional_int64()
                    .requires_replace()
                    .with_description(
                        "Template used instead of image, partitions, keys and user data.",
                    ),
            )
            .with_attribute(
                "reserve_pricing",
                Attribute::optional_bool()
                    .requires_replace()
                    .with_description("Reserve the server for a year at the discounted rate."),
            )
            .with_attribute(
                "ip_addresses",
                Attribute::computed_list(AttributeType::String)
                    .with_description("IP addresses of the server."),
            )
            .with_attribute(
                "desired_power_state",
                Attribute::optional_string()
                    .with_default(json!("On"))
                    .with_validator(Validator::one_of(PowerState::VALUES))
                    .with_description("The desired power state for the server."),
            )
            .with_attribute(
                "wait_for_ready",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Wait for the server to become ready on create."),
            )
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value, ProviderError> {
        let mut model: MetalModel = decode(planned, TYPE_NAME)?;
        let project_id = ctx.config().project_for(model.project_id)?;
        model.project_id = Some(project_id);
        let body = CreateMetalRequest::from_model(&model, project_id)?;

        lifecycle.advance(LifecycleState::Creating)?;
        let created: MetalService = ctx
            .client()
            .post("/v2/Metal", &[], &body)
            .await?
            .into_result("create metal")?;
        let id = created
            .id
            .ok_or_else(|| ProviderError::Decode("create metal: response carried no id".into()))?;
        model.id = Some(id);
        info!(id, project_id, tier = %model.tier_id, "metal server created");

        if model.wait_for_ready {
            lifecycle.advance(LifecycleState::Polling)?;
            let ready = ctx
                .wait_for_status(|| get_metal(ctx, id), "Active")
                .await
                .map_err(|e| {
                    warn!(id, error = %e, "metal server did not become ready");
                    incomplete(&model, e)
                })?;
            model.ip_addresses = Some(ready.ip_addresses.unwrap_or_default());
        }

        lifecycle.advance(LifecycleState::Ready)?;
        encode(&model)
    }

    async fn read(&self, ctx: &ProviderContext, state: Value) -> Result<Value, ProviderError> {
        let mut model: MetalModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        let observed = get_metal(ctx, id).await?;
        model.ip_addresses = observed.ip_addresses;
        if model.project_id.is_none() {
            model.project_id = observed.project_id;
        }
        encode(&model)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: MetalModel = decode(prior, TYPE_NAME)?;
        let mut planned: MetalModel = decode(planned, TYPE_NAME)?;
        let id = require_id(&prior.id, TYPE_NAME)?;

        if let Some(name) = planned.display_name.as_deref() {
            if prior.display_name.as_deref() != Some(name) {
                info!(
                    id,
                    old_display_name = ?prior.display_name,
                    new_display_name = name,
                    "renaming metal server"
                );
                ctx.client()
                    .post::<_, Value>(
                        &format!("/v2/Metal/{}/Rename", id),
                        &[],
                        &json!({ "name": name }),
                    )
                    .await?;
            }
        }

        if planned.desired_power_state != prior.desired_power_state {
            info!(
                id,
                old_power_state = ?prior.desired_power_state,
                new_power_state = ?planned.desired_power_state,
                "updating power state"
            );
            send_power_command(ctx, "Metal", id, planned.desired_power_state).await?;
        }

        planned.id = Some(id);
        planned.ip_addresses = prior.ip_addresses;
        if planned.project_id.is_none() {
            planned.project_id = prior.project_id;
        }
        encode(&planned)
    }

    async fn delete(&self, ctx: &ProviderContext, state: Value) -> Result<(), ProviderError> {
        let model: MetalModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;
        let project_id = ctx.config().project_for(model.project_id)?;

        // Deletion is only served by the v1 API.
        ctx.client()
            .delete::<Value>(
                &format!("/v1/Metal/{}", id),
                &[("projectId", project_id.to_string())],
                None,
            )
            .await?;
        info!(id, project_id, "metal server deleted");
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
            "tier_id": "7302p-64g",
            "display_name": "db-1",
            "password": "hunter22",
            "disks": {"nvme0n1": "960", "nvme1n1": "960"},
            "raid_arrays": [{
                "name": "md0",
                "type": "Raid1",
                "members": ["nvme0n1", "nvme1n1"],
                "file_system": "Ext4",
                "mount_point": "/"
            }],
            "partitions": [{
                "name": "swap",
                "device": "md0",
                "size_bytes": 8589934592_i64,
                "file_system": "Swap",
                "mount_point": "none"
            }]
        })
    }

    #[test]
    fn test_schema_accepts_declared_config() {
        let diags = validate(&MetalResource.schema(), &declared());
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_schema_reports_nested_paths() {
        let mut config = declared();
        config["partitions"][0]["file_system"] = json!("NTFS");
        config["raid_arrays"][0]["type"] = json!("Raid5");

        let diags = validate(&MetalResource.schema(), &config);
        let mut paths: Vec<_> = diags.iter().filter_map(|d| d.attribute.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["partitions.0.file_system", "raid_arrays.0.type"]);
    }

    #[test]
    fn test_create_payload() {
        let model: MetalModel = decode(declared(), TYPE_NAME).unwrap();
        let body = CreateMetalRequest::from_model(&model, 480).unwrap();
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["projectId"], 480);
        assert_eq!(value["quantity"], 1);
        assert_eq!(value["displayName"], "db-1");
        assert_eq!(value["disks"]["nvme0n1"], "960");
        assert_eq!(
            value["raidArrays"][0],
            json!({
                "name": "md0",
                "type": "Raid1",
                "members": ["nvme0n1", "nvme1n1"],
                "fileSystem": "Ext4",
                "mountPoint": "/"
            })
        );
        assert_eq!(value["partitions"][0]["sizeBytes"], 8589934592_i64);
        assert!(value.get("sshKeyIds").is_none());
        assert!(value.get("memoryGb").is_none());
    }

    #[test]
    fn test_state_round_trips_raid_type_name() {
        let model: MetalModel = decode(declared(), TYPE_NAME).unwrap();
        let state = encode(&model).unwrap();
        assert_eq!(state["raid_arrays"][0]["type"], "Raid1");
        assert_eq!(state["desired_power_state"], "On");
        assert_eq!(state["wait_for_ready"], false);
    }

    #[test]
    fn test_metal_service_decodes_camel_case() {
        let svc: MetalService = serde_json::from_value(json!({
            "id": 3,
            "status": "Active",
            "ipv4DefaultGateway": "10.0.0.1",
            "memoryGb": 64,
            "monthlyPrice": 199.5
        }))
        .unwrap();
        assert_eq!(svc.status(), Some("Active"));
        assert_eq!(svc.ipv4_default_gateway.as_deref(), Some("10.0.0.1"));
        assert_eq!(svc.memory_gb, Some(64));
        assert_eq!(svc.monthly_price, Some(199.5));
    }
}
