//! Application state for the users view.
//!
//! `App` owns the query cache, a live subscription to the user list and the
//! create-user mutation. The event loop calls `check_background_tasks` on every
//! tick to pull the latest cache and mutation state into plain fields that
//! rendering reads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use userboard_core::query::create_user_mutation;
use userboard_core::{
    ApiClient, ApiError, ApiResponse, Config, CreateUserInput, Mutation, MutationState, QueryKey,
    QueryState, QuerySubscription, QueryStatus, User, UserQueryClient,
};

// ============================================================================
// Constants
// ============================================================================

/// Name sent by the "add user" action.
pub const NEW_USER_NAME: &str = "john doe";

/// How often unobserved cache entries are garbage collected.
const GC_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// UI State Types
// ============================================================================

/// Application state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    Quitting,
}

pub struct App {
    pub state: AppState,
    pub queries: Arc<UserQueryClient>,

    users: QuerySubscription<ApiResponse, ApiError>,
    /// Latest snapshot of the user list entry.
    pub users_state: QueryState<ApiResponse, ApiError>,

    create_user: Mutation<CreateUserInput, User, ApiError>,
    mutation_rx: watch::Receiver<MutationState<User, ApiError>>,
    pub mutation_state: MutationState<User, ApiError>,

    pub selection: usize,
    pub status_message: Option<String>,
    last_gc: Instant,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        let queries = Arc::new(UserQueryClient::with_config(config.query_config()));
        Ok(Self::with_client(api, queries))
    }

    /// Build the view over an existing client and cache. Must run inside a tokio runtime.
    pub fn with_client(api: ApiClient, queries: Arc<UserQueryClient>) -> Self {
        info!(base_url = api.base_url(), "Subscribing to {}", QueryKey::Users);
        let mut users = queries.subscribe_key(&api, QueryKey::Users);
        let users_state = users.take();

        let create_user = create_user_mutation(&api, &queries);
        let mut mutation_rx = create_user.subscribe();
        let mutation_state = mutation_rx.borrow_and_update().clone();

        Self {
            state: AppState::Normal,
            queries,
            users,
            users_state,
            create_user,
            mutation_rx,
            mutation_state,
            selection: 0,
            status_message: None,
            last_gc: Instant::now(),
        }
    }

    /// Users to list. Empty unless the last fetch succeeded.
    pub fn users(&self) -> &[User] {
        match self.users_state.status {
            QueryStatus::Success => self
                .users_state
                .data
                .as_ref()
                .and_then(ApiResponse::as_users)
                .unwrap_or_default(),
            QueryStatus::Pending | QueryStatus::Error => &[],
        }
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Create the fixed new user in the background.
    pub fn add_user(&mut self) {
        // The tick-synced snapshot can lag a press; ask the mutation directly.
        if self.create_user.state().is_pending() {
            self.status_message = Some("Already adding a user...".to_string());
            return;
        }
        debug!(name = NEW_USER_NAME, "Adding user");
        // Outcome arrives through `mutation_rx`.
        let _ = self.create_user.mutate(CreateUserInput::new(NEW_USER_NAME));
    }

    /// Mark the user list stale so it refetches.
    pub fn refresh(&mut self) {
        self.queries.invalidate(&QueryKey::Users);
        self.status_message = Some("Refreshing...".to_string());
    }

    pub fn select_next(&mut self) {
        let len = self.users().len();
        if len > 0 {
            self.selection = (self.selection + 1).min(len - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selection = self.selection.saturating_sub(1);
    }

    pub fn toggle_help(&mut self) {
        self.state = match self.state {
            AppState::ShowingHelp => AppState::Normal,
            _ => AppState::ShowingHelp,
        };
    }

    pub fn quit(&mut self) {
        self.state = AppState::Quitting;
    }

    /// Tear down the cache. Open subscriptions close.
    pub fn shutdown(&self) {
        self.queries.dispose();
    }

    // ------------------------------------------------------------------------
    // Background updates
    // ------------------------------------------------------------------------

    /// Pull in cache and mutation changes since the last tick.
    pub fn check_background_tasks(&mut self) {
        if self.users.has_changed() {
            let previous = self.users_state.status;
            self.users_state = self.users.take();
            self.on_users_changed(previous);
        }

        if self.mutation_rx.has_changed().unwrap_or(false) {
            self.mutation_state = self.mutation_rx.borrow_and_update().clone();
            self.on_mutation_changed();
        }

        if self.last_gc.elapsed() >= GC_INTERVAL {
            self.queries.gc();
            self.last_gc = Instant::now();
        }
    }

    fn on_users_changed(&mut self, previous: QueryStatus) {
        let state = &self.users_state;
        if state.is_error() && previous != QueryStatus::Error {
            if let Some(ref error) = state.error {
                warn!(error = %error, "Failed to fetch users");
            }
        }
        if state.is_success() && !state.is_fetching {
            if self.status_message.as_deref() == Some("Refreshing...") {
                self.status_message = None;
            }
        }

        let len = self.users().len();
        if self.selection >= len {
            self.selection = len.saturating_sub(1);
        }
    }

    fn on_mutation_changed(&mut self) {
        self.status_message = match &self.mutation_state {
            MutationState::Idle => None,
            MutationState::Pending => Some("Adding user...".to_string()),
            MutationState::Success(user) => {
                info!(id = user.id, name = %user.name, "User added");
                Some(format!("Added {} (#{})", user.name, user.id))
            }
            MutationState::Error(error) => {
                warn!(error = %error, "Failed to add user");
                Some("Failed to add user".to_string())
            }
        };
    }
}
