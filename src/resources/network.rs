//! `teraswitch_network`: private networks.
//!
//! Networks are scoped to the provider's project. Every input replaces the
//! network; there is no update endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{decode, encode, project_query, require_id, Resource};
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const TYPE_NAME: &str = "teraswitch_network";

/// Declared and stored state of a network.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkModel {
    pub id: Option<String>,
    pub region_id: String,
    pub display_name: Option<String>,
    pub v4_subnet: String,
    pub v4_subnet_mask: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateNetworkRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    region_id: &'a str,
    v4_subnet: &'a str,
    v4_subnet_mask: &'a str,
}

/// A network as reported by the API.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Network {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub region_id: Option<String>,
    pub v4_subnet: Option<String>,
    pub v4_subnet_mask: Option<String>,
}

/// Handler for `teraswitch_network`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkResource;

#[async_trait::async_trait]
impl Resource for NetworkResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Network")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Id of the network"),
            )
            .with_attribute(
                "region_id",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The ID of the region that the network will be created in"),
            )
            .with_attribute(
                "display_name",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("The display name of the network."),
            )
            .with_attribute(
                "v4_subnet",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The IPv4 subnet that the network will use"),
            )
            .with_attribute(
                "v4_subnet_mask",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The IPv4 subnet mask that the network will use"),
            )
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value, ProviderError> {
        let mut model: NetworkModel = decode(planned, TYPE_NAME)?;
        let query = project_query(ctx)?;
        let body = CreateNetworkRequest {
            display_name: model.display_name.as_deref(),
            region_id: &model.region_id,
            v4_subnet: &model.v4_subnet,
            v4_subnet_mask: &model.v4_subnet_mask,
        };

        lifecycle.advance(LifecycleState::Creating)?;
        let created: Network = ctx
            .client()
            .post("/v2/Network", &query, &body)
            .await?
            .into_result("create network")?;
        let id = created
            .id
            .ok_or_else(|| ProviderError::Decode("create network: response carried no id".into()))?;
        info!(id = %id, region = %model.region_id, "network created");
        model.id = Some(id);

        lifecycle.advance(LifecycleState::Ready)?;
        encode(&model)
    }

    async fn read(&self, ctx: &ProviderContext, state: Value) -> Result<Value, ProviderError> {
        let mut model: NetworkModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        let observed: Network = ctx
            .client()
            .get(&format!("/v2/Network/{}", id), &project_query(ctx)?)
            .await?
            .into_result("get network")?;

        if let Some(region) = observed.region_id {
            model.region_id = region;
        }
        if observed.display_name.is_some() {
            model.display_name = observed.display_name;
        }
        if let Some(subnet) = observed.v4_subnet {
            model.v4_subnet = subnet;
        }
        if let Some(mask) = observed.v4_subnet_mask {
            model.v4_subnet_mask = mask;
        }
        encode(&model)
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: NetworkModel = decode(prior, TYPE_NAME)?;
        let mut planned: NetworkModel = decode(planned, TYPE_NAME)?;
        planned.id = Some(require_id(&prior.id, TYPE_NAME)?);
        encode(&planned)
    }

    async fn delete(&self, ctx: &ProviderContext, state: Value) -> Result<(), ProviderError> {
        let model: NetworkModel = decode(state, TYPE_NAME)?;
        let id = require_id(&model.id, TYPE_NAME)?;

        ctx.client()
            .delete::<Value>(&format!("/v2/Network/{}", id), &project_query(ctx)?, None)
            .await?;
        info!(id = %id, "network deleted");
        Ok(())
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let stub = NetworkModel {
            id: Some(id.to_string()),
            ..Default::default()
        };
        self.read(ctx, encode(&stub)?).await
    }
}
