//! API routes module

pub mod chat;
pub mod saves;
pub mod web;

use std::sync::{Arc, RwLock};

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<RwLock<AppState>>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat routes
        .nest("/chat", chat::router())
        // Saved snapshot routes
        .nest("/saves", saves::router())
}
