//! Keyed query cache with request deduplication and invalidation.
//!
//! `QueryClient` owns every cache entry. Reads go through `fetch` (await the
//! value) or `subscribe` (observe status changes); writes go through a
//! `Mutation`, whose success callback typically invalidates a key so the
//! next read refetches.
//!
//! `key` holds the typed cache keys and the wiring between this cache and
//! the users API.

mod client;
mod config;
mod key;
mod mutation;
mod state;

pub use client::{Fetcher, QueryClient, QuerySubscription};
pub use config::QueryConfig;
pub use key::{create_user_mutation, QueryKey, UserQueryClient};
pub use mutation::{Mutation, MutationState};
pub use state::{QueryState, QueryStatus};
