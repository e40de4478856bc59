//! Router for the server rendered chat pages

use std::sync::{Arc, RwLock};

use axum::{
    Form, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::public::ApiError;
use crate::api::state::{AppState, save_to_sink};
use crate::chat::TurnOutcome;
use crate::chat::render::{PageStatus, render_transcript};

type SharedState = Arc<RwLock<AppState>>;

#[derive(Deserialize)]
pub struct MessageForm {
    pub message: String,
}

fn page_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Chat session {} not found", id),
    )
        .into_response()
}

/// Send the browser back to the chat page after a form post
fn back_to_page(id: &str) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(&format!("/chat/{}", id))?;
    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response())
}

/// Start a new chat session and go to its page
async fn new_chat(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let id = Uuid::new_v4().to_string();
    {
        let mut shared_state = state.write().expect("Unable to write share state");
        let settings = shared_state.config.session_settings();
        shared_state.sessions.get_or_create(&id, &settings);
    }
    back_to_page(&id)
}

async fn chat_page(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (session, templates) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            shared_state.sessions.get(&id),
            Arc::clone(&shared_state.templates),
        )
    };
    let Some(session) = session else {
        return Ok(page_not_found(&id));
    };

    let html = render_transcript(&templates, &*session.lock().await, &PageStatus::default())?;
    Ok(Html(html).into_response())
}

/// Run a turn from the page's message form. Redirects back to the page
/// once the reply is in, or shows the page with the error and the
/// message kept in the form so it can be sent again.
async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
    let (session, provider, model, timeout, templates) = {
        let mut shared_state = state.write().expect("Unable to write share state");
        let settings = shared_state.config.session_settings();
        let session = shared_state.sessions.get_or_create(&id, &settings);
        (
            session,
            Arc::clone(&shared_state.provider),
            shared_state.config.openai_model.clone(),
            shared_state.config.completion_timeout(),
            Arc::clone(&shared_state.templates),
        )
    };

    let mut session = session.lock().await;
    let outcome = session
        .interact(
            Some(form.message.as_str()),
            provider.as_ref(),
            &model,
            None,
            timeout,
        )
        .await;

    match outcome {
        TurnOutcome::Failed { input, reason } => {
            let status = PageStatus {
                error: Some(format!(
                    "Something went wrong: {}. Please try again.",
                    reason
                )),
                draft: Some(input),
                ..Default::default()
            };
            let html = render_transcript(&templates, &session, &status)?;
            Ok(Html(html).into_response())
        }
        TurnOutcome::Replied(_) | TurnOutcome::NoInput => back_to_page(&id),
    }
}

/// Save from the page's save form and show the page with the save id
async fn save_from_page(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (session, sink_kind, db, templates) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            shared_state.sessions.get(&id),
            shared_state.config.sink,
            shared_state.db.clone(),
            Arc::clone(&shared_state.templates),
        )
    };
    let Some(session) = session else {
        return Ok(page_not_found(&id));
    };

    let mut session = session.lock().await;
    let Some(saved) = save_to_sink(&mut session, sink_kind, db).await? else {
        return back_to_page(&id);
    };

    let status = PageStatus {
        saved_id: Some(saved.receipt.id),
        display: saved.display,
        ..Default::default()
    };
    let html = render_transcript(&templates, &session, &status)?;
    Ok(Html(html).into_response())
}

/// Create the web page router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(new_chat))
        .route("/{id}", get(chat_page).post(send_message))
        .route("/{id}/save", post(save_from_page))
}
