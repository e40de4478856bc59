//! Router for the chat API

use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response, sse::Event, sse::KeepAlive, sse::Sse},
    routing::{get, post},
};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public;
use crate::api::public::ApiError;
use crate::api::state::{AppState, save_to_sink};
use crate::chat::{StreamEvent, TurnOutcome};

type SharedState = Arc<RwLock<AppState>>;

fn session_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Chat session {} not found", id),
    )
        .into_response()
}

/// Get the transcript of a live chat session
async fn chat_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = {
        let shared_state = state.read().expect("Unable to read share state");
        shared_state.sessions.get(&id)
    };
    let Some(session) = session else {
        return Ok(session_not_found(&id));
    };

    let session = session.lock().await;
    Ok(axum::Json(public::ChatTranscriptResponse {
        session_id: id,
        transcript: session.transcript().rendered(),
        save_available: session.save_available(),
    })
    .into_response())
}

/// End a chat session and discard its transcript
async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let removed = state
        .write()
        .expect("Unable to write share state")
        .sessions
        .remove(&id);
    if !removed {
        return Ok(session_not_found(&id));
    }
    tracing::debug!("Ended chat session {}", id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Save a deduplicated snapshot of the session to the configured sink
async fn save_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (session, sink_kind, save_threshold, db) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            shared_state.sessions.get(&id),
            shared_state.config.sink,
            shared_state.config.save_threshold,
            shared_state.db.clone(),
        )
    };
    let Some(session) = session else {
        return Ok(session_not_found(&id));
    };

    let mut session = session.lock().await;
    let saved = save_to_sink(&mut session, sink_kind, db).await?;

    match saved {
        Some(saved) => Ok(axum::Json(public::SaveResponse::new(
            saved.receipt,
            saved.display,
        ))
        .into_response()),
        None => Ok((
            StatusCode::CONFLICT,
            format!(
                "Chat session {} needs more than {} messages before it can be saved",
                id, save_threshold
            ),
        )
            .into_response()),
    }
}

/// Add to a chat session (starting it if needed) and stream the
/// response
async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<Response, ApiError> {
    if payload.message.trim().is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Message must not be empty").into_response());
    }

    let (session, provider, model, timeout) = {
        let mut shared_state = state.write().expect("Unable to write share state");
        let settings = shared_state.config.session_settings();
        let session = shared_state
            .sessions
            .get_or_create(&payload.session_id, &settings);
        (
            session,
            Arc::clone(&shared_state.provider),
            shared_state.config.openai_model.clone(),
            shared_state.config.completion_timeout(),
        )
    };

    let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
    let sse_stream = UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(event));

    // Get the next response. The session lock is held for the whole
    // turn so turns for the same session never interleave.
    tokio::spawn(async move {
        let mut session = session.lock().await;
        let outcome = session
            .interact(
                Some(payload.message.as_str()),
                provider.as_ref(),
                &model,
                Some(&tx),
                timeout,
            )
            .await;

        let event = match outcome {
            TurnOutcome::Replied(content) => StreamEvent::Done { content },
            TurnOutcome::Failed { reason, .. } => StreamEvent::Error {
                message: format!("Something went wrong: {}. Please try again.", reason),
            },
            TurnOutcome::NoInput => StreamEvent::Error {
                message: "Message must not be empty".to_string(),
            },
        };
        // The result is ignored since the client may have disconnected
        let _ = tx.send(event);
    });

    let resp = Sse::new(sse_stream)
        .keep_alive(KeepAlive::default().text("keep-alive"))
        .into_response();

    Ok(resp)
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/{id}", get(chat_session).delete(end_session))
        .route("/{id}/save", post(save_session))
}
