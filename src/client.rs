//! HTTP transport for the TeraSwitch API.
//!
//! Every call goes to `{endpoint}{path}` with `Authorization: Bearer <key>`
//! and, when a body is present, a JSON payload. Responses are wrapped in the
//! API envelope `{ success, message, result }`.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// The envelope every API response is wrapped in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Explicit success flag, when the endpoint sets one.
    #[serde(default)]
    pub success: Option<bool>,
    /// Human-readable status or error message.
    #[serde(default)]
    pub message: Option<String>,
    /// The payload.
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn empty() -> Self {
        Self {
            success: None,
            message: None,
            result: None,
        }
    }

    /// Take the payload, failing with [`ProviderError::Decode`] if absent.
    pub fn into_result(self, what: &str) -> Result<T, ProviderError> {
        self.result
            .ok_or_else(|| ProviderError::Decode(format!("{}: response carried no result", what)))
    }
}

/// Authenticated client bound to one API endpoint.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client from resolved provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("teraswitch-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET path`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, ProviderError> {
        self.execute(Method::GET, path, query, None).await
    }

    /// `POST path` with a JSON body.
    pub async fn post<B, T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<ApiResponse<T>, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.execute(Method::POST, path, query, Some(body)).await
    }

    /// `POST path` without a body.
    pub async fn post_empty<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, ProviderError> {
        self.execute(Method::POST, path, query, None).await
    }

    /// `DELETE path`, optionally with a JSON body.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<ApiResponse<T>, ProviderError> {
        self.execute(Method::DELETE, path, query, body).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<ApiResponse<T>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, path, "sending request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "request failed");
            ProviderError::Transport(e)
        })?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, path, status = status.as_u16(), "received response");

        interpret(status, &text).inspect_err(|e| {
            warn!(%method, path, status = status.as_u16(), error = %e, "request rejected");
        })
    }
}

/// Map a status code and raw body onto the envelope or a typed error.
fn interpret<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<ApiResponse<T>, ProviderError> {
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    if body.trim().is_empty() {
        return Ok(ApiResponse::empty());
    }

    let envelope: ApiResponse<T> = serde_json::from_str(body)
        .map_err(|e| ProviderError::Decode(format!("invalid response body: {}", e)))?;

    if envelope.success == Some(false) {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body: envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
        });
    }

    Ok(envelope)
}
