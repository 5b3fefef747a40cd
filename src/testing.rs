//! Test harness for driving a [`ProviderService`] without a host.
//!
//! ```ignore
//! use teraswitch_provider::testing::ProviderTester;
//! use teraswitch_provider::TeraswitchProvider;
//! use serde_json::json;
//!
//! let tester = ProviderTester::new(TeraswitchProvider::new());
//! tester
//!     .configure(json!({"api_key": "k", "project_id": 1, "endpoint": server_url}))
//!     .await?;
//! let state = tester.lifecycle_create("teraswitch_network", json!({...})).await?;
//! ```

use serde_json::Value;

use crate::error::ProviderError;
use crate::plan::PlanResult;
use crate::schema::Diagnostic;
use crate::service::{ImportedResource, ProviderService};

/// Wraps a provider with host-like conveniences.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Configure the provider, failing on any error diagnostic.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration, failing on any error diagnostic.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a create.
    pub async fn plan_create(&self, resource_type: &str, config: Value) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, config).await
    }

    /// Plan a change from `prior_state` to `config`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, Some(prior_state), config).await
    }

    /// Create from planned state.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Refresh state.
    pub async fn read(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Apply an in-place update.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete.
    pub async fn delete(&self, resource_type: &str, state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, state).await
    }

    /// Import by id.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// Plan, create, then read back.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan, update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }
}

/// Failure of a harness call that may produce diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Error diagnostics were returned.
    #[error("operation failed with diagnostics: {}", summaries(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn summaries(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match (&d.attribute, &d.detail) {
            (Some(attr), Some(detail)) => format!("{} ({}): {}", d.summary, attr, detail),
            (Some(attr), None) => format!("{} ({})", d.summary, attr),
            (None, Some(detail)) => format!("{}: {}", d.summary, detail),
            (None, None) => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert the plan replaces the resource because of `path`.
///
/// # Panics
///
/// Panics if the plan does not require replacement or `path` is not among
/// the replacing changes.
pub fn assert_plan_replaces(plan: &PlanResult, path: &str) {
    assert!(
        plan.requires_replace && plan.replace_paths().contains(&path),
        "expected '{}' to force replacement; replacing paths: {:?}",
        path,
        plan.replace_paths()
    );
}

/// Assert the plan can be applied in place and changes `path`.
///
/// # Panics
///
/// Panics if the plan requires replacement or leaves `path` unchanged.
pub fn assert_plan_updates_in_place(plan: &PlanResult, path: &str) {
    assert!(
        !plan.requires_replace,
        "expected an in-place update; replacing paths: {:?}",
        plan.replace_paths()
    );
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "expected '{}' to change; changed: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert some error diagnostic names `attribute`.
///
/// # Panics
///
/// Panics if no error diagnostic is attached to `attribute`.
pub fn assert_error_at(diagnostics: &[Diagnostic], attribute: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.attribute.as_deref() == Some(attribute)),
        "expected an error at '{}'; got: {}",
        attribute,
        summaries(diagnostics)
    );
}
