//! Provider configuration.
//!
//! The provider block is decoded into a [`ProviderConfig`], falling back to
//! environment variables for anything it leaves unset:
//!
//! | Attribute           | Environment             | Default              |
//! |---------------------|-------------------------|----------------------|
//! | `api_key`           | `TERASWITCH_API_KEY`    | required             |
//! | `project_id`        | `TERASWITCH_PROJECT_ID` | none                 |
//! | `endpoint`          | `TERASWITCH_ENDPOINT`   | `https://api.tsw.io` |
//! | `poll_interval_ms`  |                         | 3000                 |
//! | `wait_timeout_secs` |                         | 1800 (0 disables)    |
//! | `request_timeout_secs` |                      | 60                   |

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, Validator};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "TERASWITCH_API_KEY";
/// Environment variable holding the default project id.
pub const PROJECT_ID_ENV: &str = "TERASWITCH_PROJECT_ID";
/// Environment variable overriding the API base URL.
pub const ENDPOINT_ENV: &str = "TERASWITCH_ENDPOINT";

/// Production API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://api.tsw.io";
/// Interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Upper bound on a readiness wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    api_key: Option<String>,
    project_id: Option<i64>,
    endpoint: Option<String>,
    poll_interval_ms: Option<u64>,
    wait_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// Resolved provider settings shared by every resource operation.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Bearer token for the API.
    pub api_key: String,
    /// Project used when a resource does not name one.
    pub project_id: Option<i64>,
    /// API base URL, without a trailing slash.
    pub endpoint: String,
    /// Wait between status polls.
    pub poll_interval: Duration,
    /// Deadline for readiness waits; `None` waits until cancelled.
    pub wait_timeout: Option<Duration>,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("poll_interval", &self.poll_interval)
            .field("wait_timeout", &self.wait_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Config with an explicit key and every other setting at its default.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: Some(DEFAULT_WAIT_TIMEOUT),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the default project.
    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Point at a different API base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set or clear the wait deadline.
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Build from a provider configuration block plus the environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        let raw: RawConfig = match config {
            Value::Null => RawConfig::default(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };
        Self::resolve(raw)
    }

    fn resolve(raw: RawConfig) -> Result<Self, ProviderError> {
        let api_key = match raw.api_key.filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => env_var(API_KEY_ENV).ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "api_key is required: set it on the provider or in {}",
                    API_KEY_ENV
                ))
            })?,
        };

        let project_id = match raw.project_id {
            Some(id) => Some(id),
            None => env_var(PROJECT_ID_ENV)
                .map(|v| {
                    v.trim().parse::<i64>().map_err(|e| {
                        ProviderError::Configuration(format!(
                            "{} must be a valid int64: {}",
                            PROJECT_ID_ENV, e
                        ))
                    })
                })
                .transpose()?,
        };

        let endpoint = raw
            .endpoint
            .or_else(|| env_var(ENDPOINT_ENV))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ProviderError::Configuration(format!(
                "endpoint must be an http(s) URL, got {:?}",
                endpoint
            )));
        }

        let poll_interval = match raw.poll_interval_ms {
            Some(0) => {
                return Err(ProviderError::Configuration(
                    "poll_interval_ms must be greater than zero".to_string(),
                ))
            },
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };

        let wait_timeout = match raw.wait_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_WAIT_TIMEOUT),
        };

        let request_timeout = raw
            .request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Ok(Self {
            api_key,
            project_id,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            poll_interval,
            wait_timeout,
            request_timeout,
        })
    }

    /// The project a request is scoped to: the resource's own, else the
    /// provider default.
    pub fn project_for(&self, resource_project: Option<i64>) -> Result<i64, ProviderError> {
        resource_project.or(self.project_id).ok_or_else(|| {
            ProviderError::Configuration(format!(
                "project_id is required: set it on the resource, the provider, or in {}",
                PROJECT_ID_ENV
            ))
        })
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("TeraSwitch provider configuration")
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("API key. Falls back to TERASWITCH_API_KEY."),
            )
            .with_attribute(
                "project_id",
                Attribute::optional_int64().with_description(
                    "Default project for resources that do not set one. Falls back to TERASWITCH_PROJECT_ID.",
                ),
            )
            .with_attribute(
                "endpoint",
                Attribute::optional_string()
                    .with_description("API base URL. Falls back to TERASWITCH_ENDPOINT."),
            )
            .with_attribute(
                "poll_interval_ms",
                Attribute::optional_int64()
                    .with_validator(Validator::at_least(1))
                    .with_description("Milliseconds between readiness polls."),
            )
            .with_attribute(
                "wait_timeout_secs",
                Attribute::optional_int64()
                    .with_validator(Validator::at_least(0))
                    .with_description("Seconds before a readiness wait gives up; 0 waits forever."),
            )
            .with_attribute(
                "request_timeout_secs",
                Attribute::optional_int64()
                    .with_validator(Validator::at_least(1))
                    .with_description("Per-request HTTP timeout in seconds."),
            )
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
