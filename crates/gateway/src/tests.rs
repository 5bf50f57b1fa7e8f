use super::*;
use askroute_common::{
    agent::{
        fakes::{ScriptedClassifier, ScriptedGenerator, ScriptedJudge, ScriptedSearch},
        Route, WebResult,
    },
    embeddings::HashEmbedder,
    ingest::ChunkingConfig,
    store::MemoryStore,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    state: AppState,
}

impl TestApp {
    fn new(route: Route, sufficient: bool, answer: &str) -> Self {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        Self::with_config(config, route, sufficient, answer)
    }

    fn with_config(mut config: AppConfig, route: Route, sufficient: bool, answer: &str) -> Self {
        config.observability.metrics_enabled = false;

        let store: Arc<dyn SimilarityStore> = Arc::new(MemoryStore::new(
            Arc::new(HashEmbedder::new(64)),
            ChunkingConfig::default(),
        ));

        let orchestrator = Orchestrator::new(
            Collaborators {
                classifier: Arc::new(ScriptedClassifier::returning(route, Some("Hello there!"))),
                judge: Arc::new(ScriptedJudge::returning(sufficient)),
                generator: Arc::new(ScriptedGenerator::returning(answer)),
                store: store.clone(),
                search: Arc::new(ScriptedSearch::returning(vec![WebResult {
                    title: "Weather".to_string(),
                    content: "Sunny in Paris".to_string(),
                    url: "https://example.com/weather".to_string(),
                }])),
            },
            TurnSettings::default(),
        );

        let sessions = Arc::new(SessionLog::new(
            config.server.max_sessions,
            config.server.max_session_messages,
        ));

        Self {
            state: AppState {
                config: Arc::new(config),
                orchestrator: Arc::new(orchestrator),
                store,
                sessions,
                metrics: None,
            },
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_upload(file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "askroute-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/v1/upload-document")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, body) = app.send(get("/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_reports_store() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, body) = app.send(get("/v1/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["store"]["status"], "up");
}

#[tokio::test]
async fn test_metrics_disabled_is_not_found() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, _) = app.send(get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_rejects_empty_query() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, body) = app
        .send(post_json("/v1/chat", json!({ "session_id": "s1", "query": "" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_chat_rejects_blank_query() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, _) = app
        .send(post_json("/v1/chat", json!({ "session_id": "s1", "query": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_conversational_turn() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, body) = app
        .send(post_json("/v1/chat", json!({ "session_id": "s1", "query": "hi" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Hello there!");
    assert_eq!(body["route"], "end");

    let events = body["trace_events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["node_name"], "router");
    assert_eq!(events[0]["step"], 1);
}

#[tokio::test]
async fn test_chat_web_turn_uses_search_results() {
    let app = TestApp::new(Route::Web, false, "It is sunny in Paris.");
    let (status, body) = app
        .send(post_json(
            "/v1/chat",
            json!({ "session_id": "s1", "query": "weather in Paris today?" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "It is sunny in Paris.");
    assert_eq!(body["route"], "web");

    let nodes: Vec<&str> = body["trace_events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["node_name"].as_str().unwrap())
        .collect();
    assert_eq!(nodes, vec!["router", "web_search", "answer"]);
}

#[tokio::test]
async fn test_chat_with_indexed_document() {
    let app = TestApp::new(Route::Rag, true, "The warranty lasts two years.");
    app.state
        .store
        .ingest(
            "The product warranty lasts two years from the date of purchase and covers defects.",
            "manual.pdf",
        )
        .await
        .unwrap();

    let (status, body) = app
        .send(post_json(
            "/v1/chat",
            json!({
                "session_id": "s2",
                "query": "How long is the warranty?",
                "selected_files": ["manual.pdf"]
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "The warranty lasts two years.");
    assert_eq!(body["route"], "rag");
    assert_eq!(body["trace_events"][1]["node_name"], "rag_lookup");
}

#[tokio::test]
async fn test_sessions_record_completed_turns() {
    let app = TestApp::new(Route::End, false, "unused");

    let (status, _) = app.send(get("/v1/sessions/s9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for query in ["hi", "hello again"] {
        let (status, _) = app
            .send(post_json("/v1/chat", json!({ "session_id": "s9", "query": query })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.send(get("/v1/sessions/s9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "s9");

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hi");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[2]["content"], "hello again");
}

#[tokio::test]
async fn test_session_log_keeps_newest_messages() {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config.server.max_session_messages = 2;
    let app = TestApp::with_config(config, Route::End, false, "unused");

    for query in ["first", "second", "third"] {
        let (status, _) = app
            .send(post_json("/v1/chat", json!({ "session_id": "s3", "query": query })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app.send(get("/v1/sessions/s3")).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "third");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config.server.max_upload_bytes = 256;
    let app = TestApp::with_config(config, Route::End, false, "unused");

    let (status, _) = app
        .send(post_json(
            "/v1/chat",
            json!({ "session_id": "s1", "query": "x".repeat(1024) }),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_documents_listing() {
    let app = TestApp::new(Route::End, false, "unused");

    let (status, body) = app.send(get("/v1/documents")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    for source in ["b.pdf", "a.pdf"] {
        tokio_test::assert_ok!(
            app.state
                .store
                .ingest("Some indexed document text that is long enough to keep.", source)
                .await
        );
    }

    let (_, body) = app.send(get("/v1/documents")).await;
    assert_eq!(body, json!(["a.pdf", "b.pdf"]));
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, body) = app
        .send(multipart_upload("notes.txt", "text/plain", b"plain text"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UNSUPPORTED_DOCUMENT");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Only PDF files are supported."));
}

#[tokio::test]
async fn test_upload_rejects_unreadable_pdf() {
    let app = TestApp::new(Route::End, false, "unused");
    let (status, body) = app
        .send(multipart_upload("broken.pdf", "application/pdf", b"not a pdf at all"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UNSUPPORTED_DOCUMENT");

    let (_, listing) = app.send(get("/v1/documents")).await;
    assert_eq!(listing, json!([]));
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst = 2;
    let app = TestApp::with_config(config, Route::End, false, "unused");

    // One router so the limiter is shared across requests
    let router = create_router(app.state.clone());
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let response = router.clone().oneshot(get("/v1/health")).await.unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}
