//! The TeraSwitch provider: configuration, dispatch and CRUD orchestration.
//!
//! [`TeraswitchProvider`] owns the registries of resource and data source
//! kinds. Once configured it shares one [`ProviderContext`] with every
//! operation; `stop` flips a watch flag that cancels any readiness wait in
//! flight and refuses new work.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::client::ApiClient;
use crate::config::ProviderConfig;
use crate::data_source::{self, DataSource};
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::plan;
use crate::poll::{poll_until_status, Observed, PollOptions};
use crate::resources::{self, Resource};
use crate::schema::{diagnostics_to_error, Diagnostic, ProviderSchema, Schema};
use crate::service::{ImportedResource, ProviderService};
use crate::validation;

/// Everything a resource operation needs: settings, an API client and the
/// shutdown signal.
#[derive(Debug)]
pub struct ProviderContext {
    config: ProviderConfig,
    client: ApiClient,
    shutdown: watch::Receiver<bool>,
}

impl ProviderContext {
    /// Build a context, observing `shutdown` for cancellation.
    pub fn new(config: ProviderConfig, shutdown: watch::Receiver<bool>) -> Result<Self, ProviderError> {
        let client = ApiClient::new(&config)?;
        Ok(Self {
            config,
            client,
            shutdown,
        })
    }

    /// Resolved provider settings.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The API client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Poll timing for a wait starting now.
    pub fn poll_options(&self) -> PollOptions {
        let options = PollOptions::every(self.config.poll_interval);
        match self.config.wait_timeout {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        }
    }

    /// True once the provider has been stopped.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Poll `fetch` until it reports `target`, honoring the configured
    /// interval, deadline and the provider's stop signal.
    pub async fn wait_for_status<T, F, Fut>(&self, fetch: F, target: &str) -> Result<T, ProviderError>
    where
        T: Observed,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut shutdown = self.shutdown.clone();
        let cancel = async move {
            let signalled = shutdown.wait_for(|stopped| *stopped).await.is_ok();
            if !signalled {
                // Sender gone: nothing can stop this wait any more.
                std::future::pending::<()>().await;
            }
        };
        poll_until_status(fetch, target, &self.poll_options(), cancel).await
    }
}

/// Declarative provider for TeraSwitch compute, metal, network and volume
/// resources.
pub struct TeraswitchProvider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
    context: RwLock<Option<Arc<ProviderContext>>>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for TeraswitchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeraswitchProvider")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for TeraswitchProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TeraswitchProvider {
    /// An unconfigured provider with every resource and data source kind
    /// registered.
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            resources: resources::all()
                .into_iter()
                .map(|r| (r.type_name(), r))
                .collect(),
            data_sources: data_source::all()
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
            context: RwLock::new(None),
            shutdown,
        }
    }

    /// A provider configured directly from resolved settings.
    pub async fn with_config(config: ProviderConfig) -> Result<Self, ProviderError> {
        let provider = Self::new();
        provider.install(config).await?;
        Ok(provider)
    }

    async fn install(&self, config: ProviderConfig) -> Result<(), ProviderError> {
        info!(endpoint = %config.endpoint, project_id = ?config.project_id, "provider configured");
        let ctx = ProviderContext::new(config, self.shutdown.subscribe())?;
        *self.context.write().await = Some(Arc::new(ctx));
        Ok(())
    }

    async fn context(&self) -> Result<Arc<ProviderContext>, ProviderError> {
        let ctx = self.context.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })?;
        if ctx.is_stopped() {
            return Err(ProviderError::Cancelled("provider is stopping".to_string()));
        }
        Ok(ctx)
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

/// The user-settable part of `state`: computed-only attributes removed.
fn configurable(schema: &Schema, state: &Value) -> Value {
    match state {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(name, _)| {
                    schema
                        .attribute(name)
                        .map_or(true, |attr| !attr.flags.is_computed_only())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn check(schema: &Schema, value: &Value) -> Result<(), ProviderError> {
    match diagnostics_to_error(&validation::validate(schema, value)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
impl ProviderService for TeraswitchProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for (name, source) in &self.data_sources {
            schema = schema.with_data_source(*name, source.schema());
        }
        schema
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            warn!(diagnostics = diagnostics.len(), "provider configuration rejected");
            return Ok(diagnostics);
        }

        let resolved = match ProviderConfig::from_value(&config) {
            Ok(resolved) => resolved,
            Err(ProviderError::Configuration(msg)) => {
                warn!(error = %msg, "provider configuration rejected");
                return Ok(vec![Diagnostic::error("Invalid provider configuration").with_detail(msg)]);
            },
            Err(e) => return Err(e),
        };
        self.install(resolved).await?;
        Ok(diagnostics)
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        info!("stopping provider");
        self.shutdown.send_replace(true);
        Ok(())
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        let schema = resource.schema();
        check(&schema, &configurable(&schema, &planned_state))?;
        let planned = plan::apply_defaults(&schema, &planned_state);

        let mut lifecycle = Lifecycle::new(resource_type);
        match resource.create(&ctx, planned, &mut lifecycle).await {
            Ok(state) => {
                debug!(history = ?lifecycle.history(), "create finished");
                Ok(state)
            },
            Err(e) => {
                lifecycle.fail();
                match e.partial_state() {
                    Some(state) => warn!(
                        error = %e,
                        id = %state["id"],
                        at = ?lifecycle.history(),
                        "create failed after the resource was created"
                    ),
                    None => warn!(error = %e, at = ?lifecycle.history(), "create failed"),
                }
                Err(e)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.read(&ctx, current_state).await
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        let schema = resource.schema();
        check(&schema, &configurable(&schema, &planned_state))?;

        let planned = plan::plan(&schema, Some(&prior_state), &planned_state);
        if planned.requires_replace {
            return Err(ProviderError::FailedPrecondition(format!(
                "{}: changes to [{}] require replacement",
                resource_type,
                planned.replace_paths().join(", ")
            )));
        }
        if planned.is_empty() {
            debug!("no changes to apply");
            return Ok(planned.planned_state);
        }

        let mut lifecycle = Lifecycle::existing(resource_type);
        lifecycle.advance(LifecycleState::Updating)?;
        match resource.update(&ctx, prior_state, planned.planned_state).await {
            Ok(state) => {
                lifecycle.advance(LifecycleState::Ready)?;
                Ok(state)
            },
            Err(e) => {
                lifecycle.fail();
                warn!(error = %e, "update failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;

        let mut lifecycle = Lifecycle::existing(resource_type);
        lifecycle.advance(LifecycleState::Deleting)?;
        match resource.delete(&ctx, current_state).await {
            Ok(()) => lifecycle.advance(LifecycleState::Deleted),
            Err(e) => {
                lifecycle.fail();
                warn!(error = %e, "delete failed; resource is assumed to still exist");
                Err(e)
            },
        }
    }

    #[instrument(skip(self), name = "provider.import")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        let state = resource.import(&ctx, id).await?;
        info!(id, "resource imported");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let source = self.data_source(data_source_type)?;
        let ctx = self.context().await?;
        check(&source.schema(), &config)?;
        source.read(&ctx, config).await
    }
}
