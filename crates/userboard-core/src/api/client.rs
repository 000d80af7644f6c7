//! API client bound to the endpoint contract.
//!
//! Every call validates the outbound body before any I/O and the inbound
//! payload before returning, so no unvalidated JSON leaves this module.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{CreateUserInput, User};
use crate::schema::{Validated, ValidationError};

use super::{ApiError, Endpoint};

// ============================================================================
// Constants
// ============================================================================

/// Public test API the demo talks to by default.
pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One call against the contract, tagged by operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    ListUsers,
    GetUserById(i64),
    CreateUser(CreateUserInput),
}

impl ApiRequest {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ApiRequest::ListUsers => Endpoint::GetUsers,
            ApiRequest::GetUserById(_) => Endpoint::GetUserById,
            ApiRequest::CreateUser(_) => Endpoint::CreateUser,
        }
    }
}

/// Validated result of an `ApiRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    Users(Vec<User>),
    User(User),
}

impl ApiResponse {
    pub fn as_users(&self) -> Option<&[User]> {
        match self {
            ApiResponse::Users(users) => Some(users),
            ApiResponse::User(_) => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            ApiResponse::User(user) => Some(user),
            ApiResponse::Users(_) => None,
        }
    }
}

/// Client for the users API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
}

impl ApiClient {
    /// Create a client for `base_url` with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Perform one contract call with raw JSON in and validated JSON out.
    ///
    /// `params` fills the `:name` placeholders of the endpoint path. A body is
    /// checked against the endpoint's body schema before the request is sent.
    pub async fn call(
        &self,
        endpoint: Endpoint,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let descriptor = endpoint.descriptor();
        let path = descriptor.render_path(params)?;

        if let Some(schema) = descriptor.body {
            schema.validate(body.as_ref().unwrap_or(&Value::Null))?;
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(alias = descriptor.alias, method = %descriptor.method, url = %url, "Sending request");

        let mut request = self
            .client
            .request(descriptor.method.as_reqwest(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(alias = descriptor.alias, error = %e, "Request failed");
            ApiError::Network(e)
        })?;

        let response = Self::check_response(response).await.map_err(|e| {
            warn!(alias = descriptor.alias, error = %e, "Non-success response");
            e
        })?;

        let text = response.text().await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ApiError::InvalidJson(e.to_string()))?;

        if let Err(e) = descriptor.response.validate(&value) {
            warn!(alias = descriptor.alias, error = %e, "Response failed schema validation");
            return Err(e.into());
        }

        Ok(value)
    }

    /// Convert an already validated payload into its typed form.
    fn decode<T: DeserializeOwned>(endpoint: Endpoint, value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|e| {
            ApiError::Validation(ValidationError::decode(&endpoint.descriptor().response.name(), e))
        })
    }

    pub async fn get_users(&self) -> Result<Vec<User>, ApiError> {
        let value = self.call(Endpoint::GetUsers, &[], None).await?;
        Self::decode(Endpoint::GetUsers, value)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<User, ApiError> {
        let value = self
            .call(Endpoint::GetUserById, &[("id", id.to_string())], None)
            .await?;
        Self::decode(Endpoint::GetUserById, value)
    }

    pub async fn create_user(&self, input: &CreateUserInput) -> Result<User, ApiError> {
        let body = input.to_validated_value()?;
        let value = self.call(Endpoint::CreateUser, &[], Some(body)).await?;
        Self::decode(Endpoint::CreateUser, value)
    }

    /// Route a tagged request to its handler.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        match request {
            ApiRequest::ListUsers => self.get_users().await.map(ApiResponse::Users),
            ApiRequest::GetUserById(id) => self.get_user_by_id(id).await.map(ApiResponse::User),
            ApiRequest::CreateUser(input) => self.create_user(&input).await.map(ApiResponse::User),
        }
    }
}
