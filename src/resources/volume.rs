//! `teraswitch_volume`: block storage volumes.
//!
//! The API has no single-volume lookup, so reads list the project's volumes
//! and pick the one whose `volumeId` matches.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{decode, encode, project_query, require_id, to_i32, Resource};
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema, Validator};

const TYPE_NAME: &str = "teraswitch_volume";

/// Declared and stored state of a volume.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeModel {
    pub id: Option<String>,
    pub region_id: String,
    pub display_name: String,
    pub volume_type: String,
    pub size: i64,
    pub description: Option<String>,
    pub image_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateVolumeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_name: Option<&'a str>,
    region_id: &'a str,
    size: i32,
    volume_type: &'a str,
}

impl<'a> CreateVolumeRequest<'a> {
    fn from_model(model: &'a VolumeModel) -> Result<Self, ProviderError> {
        Ok(Self {
            description: model.description.as_deref(),
            display_name: &model.display_name,
            image_name: model.image_name.as_deref(),
            region_id: &model.region_id,
            size: to_i32(model.size, "size")?,
            volume_type: &model.volume_type,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreatedVolume {
    volume_id: Option<String>,
    status: Option<String>,
}

/// A volume as listed by the API.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volume {
    pub volume_id: String,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub region: Option<String>,
    pub size: Option<i64>,
    pub status: Option<String>,
    pub volume_type: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Volume {
    fn apply_to(self, model: &mut VolumeModel) {
        if let Some(region) = self.region {
            model.region_id = region;
        }
        if let Some(name) = self.display_name {
            model.display_name = name;
        }
        if let Some(size) = self.size {
            model.size = size;
        }
        if let Some(volume_type) = self.volume_type {
            model.volume_type = volume_type;
        }
        model.description = self.description;
        model.status = self.status;
    }
}

async fn find_volume(ctx: &ProviderContext, id: &str) -> Result<Volume, ProviderError> {
    let volumes: Vec<Volume> = ctx
        .client()
        .get("/v2/Volume", &project_query(ctx)?)
        .await?
        .result
        .unwrap_or_default();
    debug!(count = volumes.len(), id, "scanning volumes");

    volumes
        .into_iter()
        .find(|v| v.volume_id == id)
        .ok_or_else(|| ProviderError::NotFound(format!("volume {:?}", id)))
}

/// Handler for `teraswitch_volume`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeResource;

#[async_trait::async_trait]
impl Resource for VolumeResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Volume")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("ID of the volume"),
            )
            .with_attribute(
                "region_id",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The ID of the region that the volume will be created in."),
            )
            .with_attribute(
                "display_name",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The display name of the volume."),
            )
            .with_attribute(
                "volume_type",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The underlying storage type of the volume, e.g. NVME."),
            )
            .with_attribute(
                "size",
                Attribute::required_int64()
                    .requires_replace()
                    .with_validator(Validator::Range {
                        min: Some(1),
                        max: Some(i64::from(i32::MAX)),
                    })
                    .with_description("The size of the volume in gibibytes (GiB)."),
            )
            .with_attribute(
                "description",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("The description of the volume."),
            )
            .with_attribute(
                "image_name",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("The name of the image to create the volume from."),
            )
            .with_attribute(
                "status",
                Attribute::computed_string().with_description("The status of the volume."),
            )
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value, ProviderError> {
        let mut model: VolumeModel = decode(planned, TYPE_NAME)?;
        let query = project_query(ctx)?;
        let body = CreateVolumeRequest::from_model(&model)?;

        lifecycle.advance(LifecycleState::Creating)?;
        let created: CreatedVolume = ctx
            .client()
            .post("/v2/Volume", &query, &body)
            .await?
            .into_result("create volume")?;
        let id = created.volume_id.ok_or_else(|| {
            ProviderError::Decode("create volume: response carried no volumeId".into())
        })?;
        info!(id = %id, size_gib = model.size, "volume created");
        model.id = Some(id);
        model.status = created.status;

        lifecycle.advance(LifecycleState::Ready)?;
        encode(&model)
    }

    async fn read(&self, ctx: &ProviderContext, state: Value) -> Result<Value, ProviderError> {
        let mut model: VolumeModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        find_volume(ctx, &id).await?.apply_to(&mut model);
        encode(&model)
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: VolumeModel = decode(prior, TYPE_NAME)?;
        let mut planned: VolumeModel = decode(planned, TYPE_NAME)?;
        planned.id = Some(require_id(&prior.id, TYPE_NAME)?);
        planned.status = prior.status;
        encode(&planned)
    }

    async fn delete(&self, ctx: &ProviderContext, state: Value) -> Result<(), ProviderError> {
        let model: VolumeModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        let body = json!({ "regionId": model.region_id, "volumeId": id });
        ctx.client()
            .delete::<Value>("/v2/Volume", &project_query(ctx)?, Some(body))
            .await?;
        info!(id = %id, "volume deleted");
        Ok(())
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let stub = VolumeModel {
            id: Some(id.to_string()),
            ..Default::default()
        };
        self.read(ctx, encode(&stub)?).await
    }
}
