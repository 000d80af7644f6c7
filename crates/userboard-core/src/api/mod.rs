//! REST API module for the users service.
//!
//! `contract` declares the three endpoints once, with their request and
//! response schemas. `ApiClient` binds that contract to a base URL and is the
//! single place where JSON crosses the boundary, validated both ways.

pub mod client;
pub mod contract;
pub mod error;

pub use client::{ApiClient, ApiRequest, ApiResponse, DEFAULT_BASE_URL};
pub use contract::{Endpoint, EndpointDescriptor, HttpMethod};
pub use error::ApiError;
