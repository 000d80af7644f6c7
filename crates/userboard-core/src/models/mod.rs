//! Data models for the users API.
//!
//! - `User`: a record served by the remote API
//! - `CreateUserInput`: the outbound payload for creating a user

pub mod user;

pub use user::{CreateUserInput, User};
