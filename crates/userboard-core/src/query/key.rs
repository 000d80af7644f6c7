use std::fmt;
use std::sync::Arc;

use futures::future::FutureExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{ApiClient, ApiError, ApiRequest, ApiResponse, Endpoint};
use crate::models::{CreateUserInput, User};

use super::client::{Fetcher, QueryClient, QuerySubscription};
use super::mutation::Mutation;

/// Cache key derived from an endpoint alias plus its parameters.
///
/// Two reads share a cache entry exactly when their keys are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Users,
    User { id: i64 },
}

impl QueryKey {
    pub fn endpoint(self) -> Endpoint {
        match self {
            QueryKey::Users => Endpoint::GetUsers,
            QueryKey::User { .. } => Endpoint::GetUserById,
        }
    }

    /// The request that populates this key.
    pub fn request(self) -> ApiRequest {
        match self {
            QueryKey::Users => ApiRequest::ListUsers,
            QueryKey::User { id } => ApiRequest::GetUserById(id),
        }
    }

    /// Alias followed by parameters, e.g. `["getUserById", 7]`.
    pub fn parts(self) -> Vec<Value> {
        let alias = json!(self.endpoint().alias());
        match self {
            QueryKey::Users => vec![alias],
            QueryKey::User { id } => vec![alias, json!(id)],
        }
    }

    /// Fetcher issuing this key's request through `api`.
    pub fn fetcher(self, api: ApiClient) -> Fetcher<ApiResponse, ApiError> {
        Arc::new(move || {
            let api = api.clone();
            async move { api.dispatch(self.request()).await }.boxed()
        })
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Users => write!(f, "{}", self.endpoint().alias()),
            QueryKey::User { id } => write!(f, "{}/{}", self.endpoint().alias(), id),
        }
    }
}

/// The query cache specialised to the users API.
pub type UserQueryClient = QueryClient<QueryKey, ApiResponse, ApiError>;

impl QueryClient<QueryKey, ApiResponse, ApiError> {
    pub async fn fetch_key(
        &self,
        api: &ApiClient,
        key: QueryKey,
    ) -> Result<ApiResponse, Arc<ApiError>> {
        self.fetch_with(key, key.fetcher(api.clone())).await
    }

    pub fn subscribe_key(
        &self,
        api: &ApiClient,
        key: QueryKey,
    ) -> QuerySubscription<ApiResponse, ApiError> {
        self.subscribe_with(key, key.fetcher(api.clone()))
    }
}

/// `createUser` as a mutation. Success invalidates the user list so any
/// view observing it refetches.
pub fn create_user_mutation(
    api: &ApiClient,
    queries: &UserQueryClient,
) -> Mutation<CreateUserInput, User, ApiError> {
    let api = api.clone();
    let queries = queries.clone();
    Mutation::new(move |input: CreateUserInput| {
        let api = api.clone();
        async move { api.create_user(&input).await }
    })
    .on_success(move |user: &User| {
        debug!(id = user.id, "Created user; invalidating {}", QueryKey::Users);
        queries.invalidate(&QueryKey::Users);
    })
}
