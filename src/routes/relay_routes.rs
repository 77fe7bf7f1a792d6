use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use futures_util::StreamExt;
use tracing::error;

use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{RelayQuery, RelayRequest};
use crate::state::AppState;

pub const CHAT_ID_HEADER: &str = "x-chat-id";

/// POST `/api/messages?conversationRef=..`: relays one turn as a plain-text stream.
///
/// The conversation id goes out as `X-Chat-Id` with the response head, so a
/// client learns a newly created id before the reply finishes.
pub async fn relay_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<RelayQuery>,
    body: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|e| AppError::MalformedRequest(e.body_text()))?;

    let relay = state
        .relay
        .relay(&caller.id, request, query.conversation_ref.as_deref())
        .await
        .inspect_err(|e| error!("Chat relay failed for caller {}: {e}", caller.id))?;

    // Persistence finishes on its own task; the handle is not needed here.
    drop(relay.persisted);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(CHAT_ID_HEADER, &relay.conversation_id)
        .body(Body::from_stream(relay.body.map(Ok::<_, Infallible>)))
        .map_err(|e| AppError::Unexpected(format!("Failed to build response: {e}")))
}

/// GET `/health`
pub async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt; // for `oneshot`
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::db::memory_store::MemoryChatStore;
    use crate::db::ChatStore;
    use crate::inference::InferenceClient;
    use crate::models::{Message, Turn};
    use crate::routes::build_router;
    use crate::service::relay_service::RelayService;

    async fn backend(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn app(store: Arc<MemoryChatStore>, server: &MockServer) -> Router {
        let relay = RelayService::new(store, InferenceClient::new(&server.uri(), 0, Duration::ZERO));
        build_router(AppState::new(relay, "x-user-id"), "http://localhost:8080")
    }

    fn post(uri: &str, caller: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(caller) = caller {
            builder = builder.header("x-user-id", caller);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn hello() -> serde_json::Value {
        serde_json::json!({ "message": { "role": "user", "content": "Hello" }, "language": "English" })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// The reply is stored on a background task after the body closes.
    async fn wait_for_turns(store: &MemoryChatStore, conversation_id: &str, n: usize) -> Vec<Message> {
        for _ in 0..100 {
            let turns = store.list_turns(conversation_id).await.unwrap();
            if turns.len() >= n {
                return turns;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.list_turns(conversation_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_streams_reply_with_headers() {
        let server = backend(
            200,
            "data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\" there\"}\n\ndata: [DONE]\n\n",
        )
        .await;
        let store = Arc::new(MemoryChatStore::new());

        let resp = app(store.clone(), &server)
            .oneshot(post("/api/messages", Some("alice"), hello()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        let chat_id = resp.headers()[CHAT_ID_HEADER].to_str().unwrap().to_string();

        assert_eq!(body_text(resp).await, "Hi there");

        let turns = wait_for_turns(&store, &chat_id, 2).await;
        let turns: Vec<Turn> = turns.iter().map(Message::to_turn).collect();
        assert_eq!(turns, vec![Turn::user("Hello"), Turn::assistant("Hi there")]);
    }

    #[tokio::test]
    async fn test_conversation_ref_is_honoured() {
        let server = backend(200, "data: {\"content\":\"ok\"}\n\ndata: [DONE]\n\n").await;
        let store = Arc::new(MemoryChatStore::new());
        let router = app(store.clone(), &server);

        let first = router
            .clone()
            .oneshot(post("/api/messages", Some("alice"), hello()))
            .await
            .unwrap();
        let chat_id = first.headers()[CHAT_ID_HEADER].to_str().unwrap().to_string();
        body_text(first).await;
        wait_for_turns(&store, &chat_id, 2).await;

        let second = router
            .oneshot(post(
                &format!("/api/messages?conversationRef={chat_id}"),
                Some("alice"),
                hello(),
            ))
            .await
            .unwrap();
        assert_eq!(second.headers()[CHAT_ID_HEADER], chat_id.as_str());
        body_text(second).await;
        assert_eq!(wait_for_turns(&store, &chat_id, 4).await.len(), 4);
    }

    #[tokio::test]
    async fn test_backend_failure_is_json_500() {
        let server = backend(502, "bad gateway").await;
        let store = Arc::new(MemoryChatStore::new());

        let resp = app(store, &server)
            .oneshot(post("/api/messages", Some("alice"), hello()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(CHAT_ID_HEADER).is_none());
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn test_missing_caller_is_rejected_before_relay() {
        let server = backend(200, "data: [DONE]\n\n").await;
        let store = Arc::new(MemoryChatStore::new());

        let resp = app(store.clone(), &server)
            .oneshot(post("/api/messages", None, hello()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.conversation_count().await, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_500() {
        let server = backend(200, "data: [DONE]\n\n").await;
        let store = Arc::new(MemoryChatStore::new());

        let resp = app(store, &server)
            .oneshot(post("/api/messages", Some("alice"), serde_json::json!({ "message": 42 })))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_blank_turn_is_json_500_without_side_effects() {
        let server = backend(200, "data: [DONE]\n\n").await;
        let store = Arc::new(MemoryChatStore::new());
        let blank = serde_json::json!({ "message": { "role": "user", "content": "   " } });

        let resp = app(store.clone(), &server)
            .oneshot(post("/api/messages", Some("alice"), blank))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(CHAT_ID_HEADER).is_none());
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("content"));
        assert_eq!(store.conversation_count().await, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let server = backend(200, "").await;
        let resp = app(Arc::new(MemoryChatStore::new()), &server)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
