use crate::progress::{
    DEFAULT_RECENT_LIMIT, Difficulty, Interaction, ProgressError, ProgressSummary, ProgressTracker,
};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt, future};
use realtime_middle_tier::{
    CLIENT_REQUEST_ID_HEADER, Frame, MiddleTier, RelayError, TransportError,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

#[derive(Clone)]
pub struct AppState {
    pub middle_tier: Arc<MiddleTier>,
    pub progress: Arc<ProgressTracker>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Progress(ProgressError::InvalidUserId(_))
            | ApiError::Progress(ProgressError::InvalidDifficulty(_)) => StatusCode::BAD_REQUEST,
            ApiError::Progress(_) => {
                tracing::error!("progress storage failed: {:?}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

/// Builds the application router.
///
/// Unknown paths fall back to the static assets, and from there to `index.html`.
pub fn router(state: AppState, static_dir: &std::path::Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let assets = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/realtime", get(realtime_handler))
        .route("/progress/{user_id}", get(get_progress).post(record_answer))
        .route("/progress/{user_id}/recent", get(recent_interactions))
        .fallback_service(assets)
        .layer(cors)
        .with_state(state)
}

async fn realtime_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let request_id = headers
        .get(CLIENT_REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    tracing::info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state.middle_tier, request_id))
}

/// Relays one browser connection until either side closes it.
async fn handle_socket(socket: WebSocket, middle_tier: Arc<MiddleTier>, request_id: Option<String>) {
    tracing::info!("WebSocket connection established");

    let (sink, stream) = socket.split();
    let client_rx = stream.map(|message| message.map(frame_from_message).map_err(TransportError::new));
    let client_tx = sink
        .with(|frame: Frame| future::ready(Ok::<_, axum::Error>(message_from_frame(frame))))
        .sink_map_err(TransportError::new);

    match middle_tier
        .serve(client_rx, client_tx, request_id.as_deref())
        .await
    {
        Ok(()) => tracing::info!("WebSocket connection closed"),
        Err(e) => tracing::error!("realtime session failed: {}", describe(e)),
    }
}

/// The error with its causes, outermost first.
fn describe(error: RelayError) -> String {
    format!("{:#}", anyhow::Error::from(error))
}

fn frame_from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_string()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(_) => Frame::Close,
    }
}

fn message_from_frame(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close => Message::Close(None),
    }
}

async fn get_progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ProgressSummary>, ApiError> {
    Ok(Json(state.progress.progress(&user_id).await?))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

async fn recent_interactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Interaction>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(
        state.progress.recent_interactions(&user_id, limit).await?,
    ))
}

/// A judged answer to a question the tutor asked.
#[derive(Debug, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    pub difficulty: String,
    pub is_correct: bool,
}

async fn record_answer(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(record): Json<AnswerRecord>,
) -> Result<(StatusCode, Json<Interaction>), ApiError> {
    let difficulty: Difficulty = record.difficulty.parse()?;
    let interaction = state
        .progress
        .save_interaction(
            &user_id,
            &record.question,
            &record.answer,
            difficulty,
            record.is_correct,
        )
        .await?;
    tracing::info!("recorded answer for {}", user_id);
    Ok((StatusCode::CREATED, Json(interaction)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use realtime_middle_tier::{Credential, UpstreamConfig};
    use secrecy::SecretString;
    use serde_json::Value;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        _progress_dir: TempDir,
        _static_dir: TempDir,
    }

    fn test_app() -> TestApp {
        let progress_dir = tempdir().unwrap();
        let static_dir = tempdir().unwrap();
        std::fs::write(static_dir.path().join("index.html"), "<html>tutor</html>").unwrap();

        let upstream = UpstreamConfig::builder(
            "https://example.openai.azure.com",
            "gpt-4o-realtime",
            Credential::ApiKey(SecretString::from("key".to_string())),
        )
        .build();
        let state = AppState {
            middle_tier: Arc::new(MiddleTier::builder(upstream).build()),
            progress: Arc::new(ProgressTracker::new(progress_dir.path()).unwrap()),
        };

        TestApp {
            app: router(state, static_dir.path()),
            _progress_dir: progress_dir,
            _static_dir: static_dir,
        }
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn post_answer(user_id: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/progress/{}", user_id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_read_progress() {
        let test = test_app();

        let (status, _) = call(
            &test.app,
            post_answer(
                "sarah",
                json!({"question": "What do plants need?", "answer": "water and air", "difficulty": "Easy", "is_correct": true}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&test.app, get_request("/progress/sarah")).await;
        assert_eq!(status, StatusCode::OK);
        let summary: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(summary["total_questions"], 1);
        assert_eq!(summary["accuracy"], 100.0);
        assert_eq!(summary["difficulty_breakdown"]["easy"], 1);

        let (status, body) = call(&test.app, get_request("/progress/sarah/recent?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        let recent: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(recent[0]["answer"], "water and air");
        assert_eq!(recent[0]["difficulty"], "easy");
    }

    #[tokio::test]
    async fn test_invalid_input_is_a_bad_request() {
        let test = test_app();

        let (status, body) = call(
            &test.app,
            post_answer(
                "sarah",
                json!({"question": "q", "answer": "a", "difficulty": "impossible", "is_correct": false}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("impossible"));

        let (status, _) = call(&test.app, get_request("/progress/bad%20user")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_paths_serve_the_client_app() {
        let test = test_app();

        let (status, body) = call(&test.app, get_request("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>tutor</html>");

        let (status, body) = call(&test.app, get_request("/lessons/42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>tutor</html>");
    }

    #[test]
    fn test_session_failure_includes_cause() {
        let error = RelayError::Tool {
            tool: "search".to_string(),
            source: anyhow::anyhow!("index unreachable"),
        };

        assert_eq!(describe(error), "tool 'search' failed: index unreachable");
    }

    #[test]
    fn test_frame_conversion_keeps_payloads() {
        let frame = frame_from_message(Message::Text(String::from("{\"type\":\"x\"}").into()));
        assert_eq!(frame, Frame::Text("{\"type\":\"x\"}".to_string()));

        let message = message_from_frame(Frame::Binary(vec![1, 2, 3]));
        assert!(matches!(message, Message::Binary(data) if data.as_ref() == [1, 2, 3]));

        assert_eq!(frame_from_message(Message::Close(None)), Frame::Close);
    }
}
