//! Route-level tests for the HTTP API with fake collaborators

mod common;

use common::{pending_by_user_rows, service, FakeExecutor, FakeLlm, FakeStore, KeywordEmbedder};
use pms_agentic::config::Settings;
use pms_agentic::schema_rag::{ContextRetriever, Embedder, Indexer, VectorIndex};
use pms_agentic::schema_registry::SchemaRegistry;
use pms_agentic::server::{handle_request, route, AppState, HttpRequest, HttpResponse, RagState};
use pms_agentic::worked_examples::WORKED_EXAMPLES;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

fn temp_index_path() -> PathBuf {
    std::env::temp_dir().join(format!("pms-rag-{}.json", uuid::Uuid::new_v4()))
}

fn rag_state(index_path: PathBuf) -> RagState {
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);
    let index = Arc::new(RwLock::new(VectorIndex::new(embedder.dimensions())));
    let indexer = Indexer::new(index.clone(), embedder.clone(), Arc::new(SchemaRegistry::fallback()))
        .with_docs_path(None)
        .with_index_path(index_path);
    RagState {
        retriever: Arc::new(ContextRetriever::new(index.clone(), embedder)),
        index,
        indexer,
    }
}

fn app(sql: &str, with_rag: bool) -> (AppState, Arc<FakeStore>) {
    let llm = Arc::new(FakeLlm::new(&[sql]));
    let executor = Arc::new(FakeExecutor::returning(pending_by_user_rows()));
    let store = Arc::new(FakeStore::default());
    let settings = Settings {
        rag_index_path: temp_index_path(),
        ..Settings::default()
    };
    let rag = with_rag.then(|| rag_state(settings.rag_index_path.clone()));
    let state = AppState {
        service: service(llm, executor).with_history(store.clone()),
        history: store.clone(),
        settings,
        rag,
    };
    (state, store)
}

fn request(method: &str, path: &str, body: &str) -> HttpRequest {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    HttpRequest::parse(&raw).expect("request parses")
}

fn body(response: &HttpResponse) -> Value {
    serde_json::from_str(&response.body).expect("JSON body")
}

#[tokio::test]
async fn test_health_reports_degraded_without_openai_key() {
    let (state, _) = app("SELECT 1", false);
    let response = route(&state, &request("GET", "/api/v1/health", "")).await;

    assert_eq!(response.status, 200);
    let health = body(&response);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["database_connected"], true);
    assert_eq!(health["openai_configured"], false);
}

#[tokio::test]
async fn test_query_endpoint_runs_pipeline() {
    let (state, _) = app(WORKED_EXAMPLES[0].sql, false);
    let payload = json!({ "query": "  How many help tickets are pending by all users, give names  " }).to_string();
    let response = route(&state, &request("POST", "/api/v1/agentic/query", &payload)).await;

    assert_eq!(response.status, 200);
    let result = body(&response);
    assert_eq!(result["success"], true);
    assert_eq!(result["query"], "How many help tickets are pending by all users, give names");
    assert_eq!(result["result_count"], 3);
    assert_eq!(result["results"][0]["user_name"], "Asha Rao");
    assert_eq!(result["chart_config"]["chart_type"], "bar");
}

#[tokio::test]
async fn test_query_endpoint_rejects_bad_bodies() {
    let (state, _) = app("SELECT 1", false);

    let empty = route(&state, &request("POST", "/api/v1/agentic/query", r#"{"query": "   "}"#)).await;
    assert_eq!(empty.status, 422);

    let too_long = json!({ "query": "show tickets ".repeat(60) }).to_string();
    let long = route(&state, &request("POST", "/api/v1/agentic/query", &too_long)).await;
    assert_eq!(long.status, 422);

    let malformed = route(&state, &request("POST", "/api/v1/agentic/query", "{not json")).await;
    assert_eq!(malformed.status, 422);
    assert!(body(&malformed)["detail"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_rejected_prompt_is_a_200_failure() {
    let (state, _) = app("SELECT 1", false);
    let response = route(
        &state,
        &request("POST", "/api/v1/agentic/query", r#"{"query": "asdf1234!!!"}"#),
    )
    .await;

    assert_eq!(response.status, 200);
    let result = body(&response);
    assert_eq!(result["success"], false);
    assert!(result["sql_query"].is_null());
}

#[tokio::test]
async fn test_session_header_records_history() {
    let (state, store) = app(WORKED_EXAMPLES[0].sql, false);
    let payload = json!({ "query": "How many help tickets are pending by all users, give names" }).to_string();
    let raw = format!(
        "POST /api/v1/agentic/query HTTP/1.1\r\nX-Session-Id: from-header\r\nContent-Length: {}\r\n\r\n{}",
        payload.len(),
        payload
    );
    let request = HttpRequest::parse(&raw).unwrap();
    route(&state, &request).await;

    assert!(store.sessions.lock().unwrap().contains_key("from-header"));
    assert_eq!(store.messages.lock().unwrap().len(), 2);

    let history = route(&state, &self::request("GET", "/api/v1/conversation/history/from-header?limit=10", "")).await;
    assert_eq!(history.status, 200);
    assert_eq!(body(&history)["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_validate_query_endpoint() {
    let (state, _) = app("SELECT 1", false);

    let blocked = route(
        &state,
        &request("POST", "/api/v1/agentic/validate-query?sql_query=DROP%20TABLE%20users", ""),
    )
    .await;
    assert_eq!(blocked.status, 200);
    let verdict = body(&blocked);
    assert_eq!(verdict["is_safe"], false);
    assert_eq!(verdict["query"], "DROP TABLE users");

    let allowed = route(
        &state,
        &request(
            "POST",
            "/api/v1/agentic/validate-query",
            r#"{"sql_query": "SELECT id FROM users"}"#,
        ),
    )
    .await;
    assert_eq!(body(&allowed)["is_safe"], true);
}

#[tokio::test]
async fn test_examples_are_grouped() {
    let (state, _) = app("SELECT 1", false);
    let response = route(&state, &request("GET", "/api/v1/agentic/examples", "")).await;

    assert_eq!(response.status, 200);
    let groups = body(&response);
    assert!(groups["hit_tickets"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn test_session_and_context_endpoints() {
    let (state, _) = app("SELECT 1", false);

    let missing = route(&state, &request("GET", "/api/v1/conversation/sessions/nope", "")).await;
    assert_eq!(missing.status, 404);

    let created = route(
        &state,
        &request(
            "POST",
            "/api/v1/conversation/sessions",
            r#"{"session_id": "s-1", "user_id": 7, "title": "Ticket review"}"#,
        ),
    )
    .await;
    assert_eq!(created.status, 200);
    assert_eq!(body(&created)["title"], "Ticket review");

    let listed = route(&state, &request("GET", "/api/v1/conversation/sessions?user_id=7", "")).await;
    assert_eq!(body(&listed)["total_count"], 1);

    let bad_user = route(&state, &request("GET", "/api/v1/conversation/sessions?user_id=abc", "")).await;
    assert_eq!(bad_user.status, 422);

    let saved = route(
        &state,
        &request(
            "POST",
            "/api/v1/conversation/context",
            r#"{"session_id": "s-1", "context_key": "department", "context_value": "Support"}"#,
        ),
    )
    .await;
    assert_eq!(saved.status, 200);

    let fetched = route(&state, &request("GET", "/api/v1/conversation/context/s-1/department", "")).await;
    assert_eq!(body(&fetched)["context_value"], "Support");

    route(
        &state,
        &request(
            "POST",
            "/api/v1/conversation/context",
            r#"{"session_id": "s-1", "context_key": "last_user_mentioned", "context_value": "Rajesh Bhati"}"#,
        ),
    )
    .await;
    let all = route(&state, &request("GET", "/api/v1/conversation/context/s-1", "")).await;
    assert_eq!(all.status, 200);
    let all = body(&all);
    assert_eq!(all["session_id"], "s-1");
    assert_eq!(all["context"]["department"], "Support");
    assert_eq!(all["context"]["last_user_mentioned"], "Rajesh Bhati");
}

#[tokio::test]
async fn test_unknown_route_and_preflight() {
    let (state, _) = app("SELECT 1", false);

    let missing = route(&state, &request("GET", "/api/v1/nowhere", "")).await;
    assert_eq!(missing.status, 404);
    assert_eq!(body(&missing)["detail"], "Not Found");

    let preflight = route(&state, &request("OPTIONS", "/api/v1/agentic/query", "")).await;
    assert_eq!(preflight.status, 204);
}

#[tokio::test]
async fn test_rendered_response_carries_cors_and_timing() {
    let (state, _) = app("SELECT 1", false);
    let raw = "GET /api/v1/ping HTTP/1.1\r\nOrigin: http://localhost:3000\r\n\r\n";
    let rendered = handle_request(&state, raw).await;

    assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(rendered.contains("Access-Control-Allow-Origin: http://localhost:3000\r\n"));
    assert!(rendered.contains("X-Process-Time: "));
    assert!(rendered.contains("\"pong\""));
}

#[tokio::test]
async fn test_rag_disabled() {
    let (state, _) = app("SELECT 1", false);

    let stats = route(&state, &request("GET", "/api/v1/rag/stats", "")).await;
    assert_eq!(body(&stats)["is_initialized"], false);

    let search = route(&state, &request("POST", "/api/v1/rag/search", r#"{"query": "tickets"}"#)).await;
    assert_eq!(search.status, 400);
}

#[tokio::test]
async fn test_rag_index_search_and_clear() {
    let (state, _) = app("SELECT 1", true);

    let indexed = route(&state, &request("POST", "/api/v1/rag/index/all", "")).await;
    assert_eq!(indexed.status, 200);
    let stats = &body(&indexed)["stats"];
    assert_eq!(stats["schema_count"], 3);
    assert_eq!(stats["examples_count"], WORKED_EXAMPLES.len());
    assert_eq!(stats["is_initialized"], true);

    let search = route(
        &state,
        &request(
            "POST",
            "/api/v1/rag/search",
            r#"{"query": "hitticket lookup", "collection": "schema", "top_k": 1}"#,
        ),
    )
    .await;
    assert_eq!(search.status, 200);
    let hits = body(&search);
    assert_eq!(hits["total_results"], 1);
    assert_eq!(hits["results"]["relevant_tables"][0]["id"], "hit_tickets");

    let bad_top_k = route(
        &state,
        &request("POST", "/api/v1/rag/search", r#"{"query": "tickets", "top_k": 0}"#),
    )
    .await;
    assert_eq!(bad_top_k.status, 422);

    let cleared = route(&state, &request("POST", "/api/v1/rag/clear/schema", "")).await;
    assert_eq!(body(&cleared)["stats"]["schema_count"], 0);

    let invalid = route(&state, &request("POST", "/api/v1/rag/clear/everything", "")).await;
    assert_eq!(invalid.status, 400);

    let _ = std::fs::remove_file(&state.settings.rag_index_path);
}
