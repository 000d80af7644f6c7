use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No data yet; the first fetch has not completed.
    Pending,
    /// The most recent fetch failed.
    Error,
    /// The most recent fetch succeeded.
    Success,
}

/// Snapshot of one cache entry.
///
/// `data` survives a later failed refetch, so check `status` before trusting it.
pub struct QueryState<V, E> {
    pub status: QueryStatus,
    pub data: Option<V>,
    pub error: Option<Arc<E>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Marked stale by invalidation (time-based staleness is not reflected here).
    pub is_stale: bool,
    /// A fetch for this entry is in flight.
    pub is_fetching: bool,
}

impl<V, E> QueryState<V, E> {
    pub(crate) fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            last_fetched_at: None,
            is_stale: false,
            is_fetching: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Whether the entry has settled: not pending and nothing in flight.
    pub fn is_settled(&self) -> bool {
        !self.is_pending() && !self.is_fetching
    }

    /// Human-readable age of the last successful fetch.
    pub fn age_display(&self) -> String {
        match self.last_fetched_at {
            Some(at) => age_display(at, Utc::now()),
            None => "never".to_string(),
        }
    }
}

impl<V: Clone, E> Clone for QueryState<V, E> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            last_fetched_at: self.last_fetched_at,
            is_stale: self.is_stale,
            is_fetching: self.is_fetching,
        }
    }
}

impl<V: fmt::Debug, E: fmt::Debug> fmt::Debug for QueryState<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("status", &self.status)
            .field("data", &self.data)
            .field("error", &self.error)
            .field("last_fetched_at", &self.last_fetched_at)
            .field("is_stale", &self.is_stale)
            .field("is_fetching", &self.is_fetching)
            .finish()
    }
}

fn age_display(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / 1440)
    }
}
