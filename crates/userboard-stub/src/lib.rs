//! In-memory stand-in for the users REST API.
//!
//! Serves the same three endpoints as `jsonplaceholder.typicode.com/users`
//! from a `Vec` kept in insertion order. Unlike the public API, created users
//! are persisted so a follow-up `GET /users` observes them.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, error};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
}

pub type Db = Arc<RwLock<Vec<User>>>;

/// A router with an empty user list.
pub fn app() -> Router {
    app_with_users(Vec::new())
}

/// A router seeded with `users`.
pub fn app_with_users(users: Vec<User>) -> Router {
    let db: Db = Arc::new(RwLock::new(users));
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user))
        .with_state(db)
}

/// The first few users of the public test API, used by the standalone binary.
pub fn sample_users() -> Vec<User> {
    ["Leanne Graham", "Ervin Howell", "Clementine Bauch"]
        .iter()
        .zip(1..)
        .map(|(name, id)| User {
            id,
            name: name.to_string(),
        })
        .collect()
}

pub async fn run(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

/// Bind `router` to an ephemeral localhost port and serve it in the background.
///
/// Returns the bound address; the server lives until the runtime shuts down.
pub async fn spawn(router: Router) -> Result<SocketAddr, std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = run(listener, router).await {
            error!(error = %e, "Stub server stopped");
        }
    });
    debug!(%addr, "Stub server listening");
    Ok(addr)
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    let users = db.read().await;
    Json(users.clone())
}

async fn get_user(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<User>, StatusCode> {
    let users = db.read().await;
    users
        .iter()
        .find(|u| u.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_user(
    State(db): State<Db>,
    Json(input): Json<CreateUser>,
) -> (StatusCode, Json<User>) {
    let mut users = db.write().await;
    let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
    let user = User {
        id,
        name: input.name,
    };
    users.push(user.clone());
    debug!(id, name = %user.name, "Created user");
    (StatusCode::CREATED, Json(user))
}
