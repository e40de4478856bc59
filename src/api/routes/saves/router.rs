//! Router for reading back saved snapshots

use std::sync::{Arc, RwLock};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use super::public;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::chat::SqliteSink;

type SharedState = Arc<RwLock<AppState>>;

fn sink(state: &SharedState) -> SqliteSink {
    let db = state.read().expect("Unable to read share state").db.clone();
    SqliteSink::new(db)
}

/// List the ids of all saved snapshots
async fn saves_list(State(state): State<SharedState>) -> Result<Json<public::SavesResponse>, ApiError> {
    let saves = sink(&state).list_saves().await?;
    Ok(Json(public::SavesResponse { saves }))
}

/// Get a saved snapshot by its save id
async fn saved_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let messages = sink(&state).find_saved_messages(&id).await?;
    if messages.is_empty() {
        return Ok((StatusCode::NOT_FOUND, format!("Save {} not found", id)).into_response());
    }
    Ok(Json(public::SavedSessionResponse { id, messages }).into_response())
}

/// Create the saves router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(saves_list))
        .route("/{id}", get(saved_session))
}
