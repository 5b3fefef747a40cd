//! Read-only lookups.

use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::resources::metal::{get_metal, MetalService};
use crate::schema::{Attribute, AttributeType, Schema};

/// One read-only lookup kind.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// The type name hosts refer to.
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Resolve `config` into the full observed object.
    async fn read(&self, ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError>;
}

/// `teraswitch_metal` data source: look up a metal server by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetalDataSource;

#[derive(Debug, Serialize)]
struct MetalDataModel {
    id: i64,
    project_id: Option<i64>,
    region_id: Option<String>,
    display_name: Option<String>,
    tier_id: Option<String>,
    image_id: Option<String>,
    status: Option<String>,
    power_state: Option<String>,
    current_task: Option<String>,
    ip_addresses: Option<Vec<String>>,
    ipv4_default_gateway: Option<String>,
    ipv6_default_gateway: Option<String>,
    memory_gb: Option<i64>,
    tags: Option<Vec<String>>,
    reserve_pricing: Option<bool>,
    active_date: Option<String>,
    termination_date: Option<String>,
    monthly_price: Option<f64>,
    hourly_price: Option<f64>,
    created: Option<String>,
}

impl MetalDataModel {
    fn from_service(id: i64, svc: MetalService) -> Self {
        Self {
            id,
            project_id: svc.project_id,
            region_id: svc.region_id,
            display_name: svc.display_name,
            tier_id: svc.tier_id,
            image_id: svc.image_id,
            status: svc.status,
            power_state: svc.power_state,
            current_task: svc.current_task,
            ip_addresses: svc.ip_addresses,
            ipv4_default_gateway: svc.ipv4_default_gateway,
            ipv6_default_gateway: svc.ipv6_default_gateway,
            memory_gb: svc.memory_gb.map(i64::from),
            tags: svc.tags,
            reserve_pricing: svc.reserve_pricing,
            active_date: svc.active_date,
            termination_date: svc.termination_date,
            monthly_price: svc.monthly_price,
            hourly_price: svc.hourly_price,
            created: svc.created,
        }
    }
}

#[async_trait::async_trait]
impl DataSource for MetalDataSource {
    fn type_name(&self) -> &'static str {
        "teraswitch_metal"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Metal data source")
            .with_attribute(
                "id",
                Attribute::required_int64().with_description("Id of the metal server"),
            )
            .with_attribute("project_id", Attribute::computed_int64())
            .with_attribute("region_id", Attribute::computed_string())
            .with_attribute("display_name", Attribute::computed_string())
            .with_attribute("tier_id", Attribute::computed_string())
            .with_attribute("image_id", Attribute::computed_string())
            .with_attribute("status", Attribute::computed_string())
            .with_attribute("power_state", Attribute::computed_string())
            .with_attribute("current_task", Attribute::computed_string())
            .with_attribute(
                "ip_addresses",
                Attribute::computed_list(AttributeType::String),
            )
            .with_attribute("ipv4_default_gateway", Attribute::computed_string())
            .with_attribute("ipv6_default_gateway", Attribute::computed_string())
            .with_attribute(
                "memory_gb",
                Attribute::computed_int64().with_description("Installed memory in GB"),
            )
            .with_attribute("tags", Attribute::computed_list(AttributeType::String))
            .with_attribute("reserve_pricing", Attribute::computed_bool())
            .with_attribute("active_date", Attribute::computed_string())
            .with_attribute("termination_date", Attribute::computed_string())
            .with_attribute("monthly_price", Attribute::computed_float64())
            .with_attribute("hourly_price", Attribute::computed_float64())
            .with_attribute("created", Attribute::computed_string())
    }

    async fn read(&self, ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError> {
        let id = config.get("id").and_then(Value::as_i64).ok_or_else(|| {
            ProviderError::Validation("teraswitch_metal: id must be an integer".to_string())
        })?;

        let svc = get_metal(ctx, id).await?;
        Ok(serde_json::to_value(MetalDataModel::from_service(id, svc))?)
    }
}

/// Every data source this provider serves.
pub fn all() -> Vec<Box<dyn DataSource>> {
    vec![Box::new(MetalDataSource)]
}
