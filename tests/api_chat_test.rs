//! Integration tests for the chat API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    use ideabot::core::SinkKind;
    use ideabot::openai::Role;

    use crate::test_utils::{
        FailingProvider, ScriptedProvider, TEST_SYSTEM_MESSAGE, body_to_string, test_app,
        test_app_with, test_config,
    };

    async fn send_message(app: &Router, session_id: &str, message: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/chat")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "session_id": session_id,
                            "message": message
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        (status, body_to_string(response.into_body()).await)
    }

    async fn request(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .method(method)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        (status, body_to_string(response.into_body()).await)
    }

    /// Tests that the reply is streamed as partial buffers followed
    /// by the complete reply
    #[tokio::test]
    async fn it_streams_a_reply() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/chat")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"session_id": "stream", "message": "Hello"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let body = body_to_string(response.into_body()).await;
        let partial_hi = body
            .find(r#"{"type":"partial","content":"Hi"}"#)
            .expect("Missing first partial");
        let partial_full = body
            .find(r#"{"type":"partial","content":"Hi there"}"#)
            .expect("Missing second partial");
        let done = body
            .find(r#"{"type":"done","content":"Hi there"}"#)
            .expect("Missing done event");
        assert!(partial_hi < partial_full);
        assert!(partial_full < done);
    }

    /// Tests the transcript has the conversation but not the system
    /// prompt, which was sent to the provider first
    #[tokio::test]
    async fn it_gets_the_transcript_without_the_system_prompt() {
        let provider = Arc::new(ScriptedProvider::new(&["Hi", " there"]));
        let app = test_app_with(test_config(), provider.clone()).await;

        send_message(&app, "transcript", "Hello").await;
        let (status, body) = request(&app, "GET", "/api/chat/transcript").await;
        assert_eq!(status, StatusCode::OK);

        let resp: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(resp["session_id"], "transcript");
        assert_eq!(
            resp["transcript"],
            json!([
                {"role": "user", "content": "Hello"},
                {"role": "assistant", "content": "Hi there"}
            ])
        );
        assert_eq!(resp["save_available"], true);
        assert!(!body.contains(TEST_SYSTEM_MESSAGE));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][0].content, TEST_SYSTEM_MESSAGE);
        assert_eq!(requests[0][1].role, Role::User);
    }

    /// Tests the system prompt is only injected once per session
    #[tokio::test]
    async fn it_injects_the_system_prompt_once() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let app = test_app_with(test_config(), provider.clone()).await;

        send_message(&app, "once", "first").await;
        send_message(&app, "once", "second").await;

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let system_count = requests[1]
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(requests[1].len(), 4);
    }

    /// Tests a failed completion surfaces an error and leaves the
    /// transcript unchanged
    #[tokio::test]
    async fn it_reports_provider_errors() {
        let app = test_app_with(test_config(), Arc::new(FailingProvider)).await;

        let (status, body) = send_message(&app, "failing", "Hello").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""type":"error""#));
        assert!(body.contains("connection refused"));
        assert!(body.contains("Please try again"));
        assert!(!body.contains(r#""type":"done""#));

        let (status, body) = request(&app, "GET", "/api/chat/failing").await;
        assert_eq!(status, StatusCode::OK);
        let resp: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(resp["transcript"], json!([]));
        assert_eq!(resp["save_available"], false);
    }

    /// Tests getting a chat session that doesn't exist returns 404
    #[tokio::test]
    async fn it_returns_404_for_nonexistent_session() {
        let app = test_app().await;

        let (status, _) = request(&app, "GET", "/api/chat/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = request(&app, "POST", "/api/chat/nonexistent/save").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = request(&app, "DELETE", "/api/chat/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Tests chat POST returns 422 for missing session_id
    #[tokio::test]
    async fn it_returns_422_for_missing_session_id() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/chat")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"message": "Hello"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Missing required field should return 422 (validation error)
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    /// Tests chat POST returns 400 for an empty message
    #[tokio::test]
    async fn it_returns_400_for_empty_message() {
        let app = test_app().await;

        let (status, _) = send_message(&app, "empty", "   ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // No session was started
        let (status, _) = request(&app, "GET", "/api/chat/empty").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Tests saving isn't available until the transcript is longer
    /// than the threshold
    #[tokio::test]
    async fn it_refuses_to_save_below_the_threshold() {
        let mut config = test_config();
        config.save_threshold = 4;
        let app = test_app_with(config, Arc::new(ScriptedProvider::new(&["ok"]))).await;

        // System, user and assistant messages
        send_message(&app, "short", "Hello").await;
        let (status, _) = request(&app, "POST", "/api/chat/short/save").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = request(&app, "GET", "/api/saves").await;
        let resp: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(resp["saves"], json!([]));

        // Five messages is over the threshold
        send_message(&app, "short", "More").await;
        let (status, _) = request(&app, "POST", "/api/chat/short/save").await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Tests every save gets a new id and writes a deduplicated
    /// snapshot to the db
    #[tokio::test]
    async fn it_saves_to_the_db() {
        let app = test_app().await;

        // The same question gets the same answer so the second turn
        // duplicates the first
        send_message(&app, "saving", "A").await;
        send_message(&app, "saving", "A").await;

        let (status, body) = request(&app, "POST", "/api/chat/saving/save").await;
        assert_eq!(status, StatusCode::OK);
        let first: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(first["message_count"], 3);
        assert!(first.get("display").is_none());

        let (status, body) = request(&app, "POST", "/api/chat/saving/save").await;
        assert_eq!(status, StatusCode::OK);
        let second: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(second["message_count"], 3);
        assert_eq!(first["messages"], second["messages"]);

        let ids: HashSet<String> = [&first, &second]
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 2);

        let first_id = first["id"].as_str().unwrap();
        let (status, body) = request(&app, "GET", &format!("/api/saves/{}", first_id)).await;
        assert_eq!(status, StatusCode::OK);
        let saved: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(saved["id"], first_id);
        assert_eq!(
            saved["messages"],
            json!([
                {"role": "system", "content": TEST_SYSTEM_MESSAGE},
                {"role": "user", "content": "A"},
                {"role": "assistant", "content": "Hi there"}
            ])
        );

        let (_, body) = request(&app, "GET", "/api/saves").await;
        let resp: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(resp["saves"].as_array().unwrap().len(), 2);

        // The live transcript was replaced by the deduplicated copy
        let (_, body) = request(&app, "GET", "/api/chat/saving").await;
        let resp: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(resp["transcript"].as_array().unwrap().len(), 2);
    }

    /// Tests saving to the display prints the snapshot in the response
    #[tokio::test]
    async fn it_saves_to_the_display() {
        let mut config = test_config();
        config.sink = SinkKind::Display;
        let app = test_app_with(config, Arc::new(ScriptedProvider::new(&["Hi", " there"]))).await;

        send_message(&app, "display", "Hello").await;
        let (status, body) = request(&app, "POST", "/api/chat/display/save").await;
        assert_eq!(status, StatusCode::OK);

        let resp: Value = serde_json::from_str(&body).unwrap();
        let id = resp["id"].as_str().unwrap();
        let display = resp["display"].as_str().unwrap();
        assert!(display.contains(id));
        assert!(display.contains("**user:** Hello"));
        assert!(display.contains("**assistant:** Hi there"));
        assert!(!display.contains(TEST_SYSTEM_MESSAGE));

        // Nothing was written to the db
        let (status, _) = request(&app, "GET", &format!("/api/saves/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Tests ending a session discards it
    #[tokio::test]
    async fn it_ends_a_session() {
        let app = test_app().await;

        send_message(&app, "ending", "Hello").await;
        let (status, _) = request(&app, "DELETE", "/api/chat/ending").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = request(&app, "GET", "/api/chat/ending").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Starting again begins with a fresh transcript
        send_message(&app, "ending", "Hello again").await;
        let (_, body) = request(&app, "GET", "/api/chat/ending").await;
        let resp: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(resp["transcript"][0]["content"], "Hello again");
    }
}
