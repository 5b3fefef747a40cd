//! TeraSwitch provider
//!
//! A declarative-infrastructure provider for the TeraSwitch cloud API. It
//! manages compute instances, bare-metal servers, networks and volumes, and
//! exposes a read-only metal lookup.
//!
//! # Overview
//!
//! - **Transport**: [`client::ApiClient`] talks JSON over HTTPS with bearer
//!   authentication and unwraps the API's `{ success, message, result }`
//!   envelope
//! - **Resources**: one [`resources::Resource`] per kind translates between
//!   declared state and API payloads
//! - **Polling**: [`poll::poll_until_status`] waits for a resource to report
//!   a target status, honoring cancellation and a deadline
//! - **Orchestration**: [`TeraswitchProvider`] validates, plans and sequences
//!   CRUD calls through [`ProviderService`]
//!
//! # Quick Start
//!
//! ```ignore
//! use teraswitch_provider::{ProviderService, TeraswitchProvider};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     teraswitch_provider::init_logging();
//!
//!     let provider = TeraswitchProvider::new();
//!     provider.configure(json!({ "project_id": 480 })).await?;
//!
//!     let state = provider
//!         .create(
//!             "teraswitch_network",
//!             json!({
//!                 "region_id": "EWR1",
//!                 "v4_subnet": "10.10.0.0",
//!                 "v4_subnet_mask": "255.255.255.0"
//!             }),
//!         )
//!         .await?;
//!     println!("created network {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! | Attribute          | Environment fallback     | Default              |
//! |--------------------|--------------------------|----------------------|
//! | `api_key`          | `TERASWITCH_API_KEY`     | required             |
//! | `project_id`       | `TERASWITCH_PROJECT_ID`  | none                 |
//! | `endpoint`         | `TERASWITCH_ENDPOINT`    | `https://api.tsw.io` |
//! | `poll_interval_ms` |                          | 3000                 |
//! | `wait_timeout_secs`|                          | 1800 (0 = no limit)  |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_source;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod plan;
pub mod poll;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod validation;

pub use client::{ApiClient, ApiResponse};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::{AttributeChange, PlanResult};
pub use poll::{poll_until_status, Observed, PollOptions};
pub use provider::{ProviderContext, TeraswitchProvider};
pub use schema::ProviderSchema;
pub use service::{ImportedResource, ProviderMetadata, ProviderService};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;
pub use serde_json;
pub use tracing;
