//! Core library for userboard.
//!
//! - `schema`: declarative shapes used to validate untrusted JSON
//! - `models`: the `User` record and `CreateUserInput` payload
//! - `api`: the endpoint contract and the validating `ApiClient`
//! - `query`: a keyed query cache with deduplication, invalidation and mutations
//! - `config`: on-disk configuration

pub mod api;
pub mod config;
pub mod models;
pub mod query;
pub mod schema;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse, Endpoint};
pub use config::Config;
pub use models::{CreateUserInput, User};
pub use query::{
    Mutation, MutationState, QueryClient, QueryConfig, QueryKey, QueryState, QueryStatus,
    QuerySubscription, UserQueryClient,
};
pub use schema::{Validated, ValidationError};
