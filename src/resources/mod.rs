//! Managed resource kinds.
//!
//! Each kind translates between the declared state object and the API's
//! request and response payloads, and issues the calls for its own CRUD
//! operations. Sequencing, validation and lifecycle bookkeeping live in
//! [`crate::provider`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::lifecycle::Lifecycle;
use crate::provider::ProviderContext;
use crate::schema::Schema;

pub mod compute;
pub mod metal;
pub mod network;
pub mod volume;

pub use compute::ComputeResource;
pub use metal::MetalResource;
pub use network::NetworkResource;
pub use volume::VolumeResource;

/// One managed resource kind.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// The type name hosts refer to, e.g. `teraswitch_network`.
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Create the resource and return its new state.
    ///
    /// Implementations advance `lifecycle` from `Unplanned` to `Ready`,
    /// passing through `Polling` when they wait for readiness.
    async fn create(
        &self,
        ctx: &ProviderContext,
        planned: Value,
        lifecycle: &mut Lifecycle,
    ) -> Result<Value, ProviderError>;

    /// Refresh computed attributes from the API.
    async fn read(&self, ctx: &ProviderContext, state: Value) -> Result<Value, ProviderError>;

    /// Apply in-place changes between `prior` and `planned`.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the resource.
    async fn delete(&self, ctx: &ProviderContext, state: Value) -> Result<(), ProviderError>;

    /// Build state for an existing remote resource.
    async fn import(&self, _ctx: &ProviderContext, _id: &str) -> Result<Value, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "{} does not support import",
            self.type_name()
        )))
    }
}

/// Power state requested for a compute instance or metal server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PowerState {
    /// Running.
    #[default]
    On,
    /// Stopped.
    Off,
}

impl PowerState {
    /// Value of the `command` query parameter that reaches this state.
    pub fn command(self) -> &'static str {
        match self {
            PowerState::On => "PowerOn",
            PowerState::Off => "PowerOff",
        }
    }

    /// Values accepted in configuration.
    pub const VALUES: [&'static str; 2] = ["On", "Off"];
}

/// Decode a declared state object into a typed model.
pub(crate) fn decode<T: DeserializeOwned>(
    value: Value,
    type_name: &str,
) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::Validation(format!("{}: invalid state: {}", type_name, e)))
}

/// Encode a typed model back into a state object.
pub(crate) fn encode<T: Serialize>(model: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(model)?)
}

/// The remote identifier, or `FailedPrecondition` when the resource was
/// never created.
pub(crate) fn require_id<T: Clone>(id: &Option<T>, type_name: &str) -> Result<T, ProviderError> {
    id.clone().ok_or_else(|| {
        ProviderError::FailedPrecondition(format!(
            "{}: state has no id; the resource was never created",
            type_name
        ))
    })
}

/// Wrap a failure that happened after the resource was created, so the
/// caller still receives its id.
pub(crate) fn incomplete<T: Serialize>(model: &T, source: ProviderError) -> ProviderError {
    match encode(model) {
        Ok(state) => ProviderError::Incomplete {
            state,
            source: Box::new(source),
        },
        Err(_) => source,
    }
}

/// `projectId` query scoped to the provider's project.
pub(crate) fn project_query(
    ctx: &ProviderContext,
) -> Result<[(&'static str, String); 1], ProviderError> {
    let project_id = ctx.config().project_for(None)?;
    Ok([("projectId", project_id.to_string())])
}

/// Narrow a declared int64 to the API's int32.
pub(crate) fn to_i32(value: i64, attribute: &str) -> Result<i32, ProviderError> {
    i32::try_from(value)
        .map_err(|_| ProviderError::Validation(format!("{} is out of range: {}", attribute, value)))
}

/// `POST /v2/{collection}/{id}/PowerCommand?command=...`.
pub(crate) async fn send_power_command(
    ctx: &ProviderContext,
    collection: &str,
    id: i64,
    state: PowerState,
) -> Result<(), ProviderError> {
    let path = format!("/v2/{}/{}/PowerCommand", collection, id);
    ctx.client()
        .post_empty::<Value>(&path, &[("command", state.command().to_string())])
        .await?;
    Ok(())
}

/// Every resource kind this provider manages.
pub fn all() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(ComputeResource),
        Box::new(MetalResource),
        Box::new(NetworkResource),
        Box::new(VolumeResource),
    ]
}
