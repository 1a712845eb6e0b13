//! HTTP server
//!
//! Minimal HTTP/1.1 over `tokio::net::TcpListener`: one task per
//! connection, JSON in and out, one request per connection. Routing lives in
//! `route` so it can be driven without a socket.

use crate::config::Settings;
use crate::db::init_pool;
use crate::error::Result;
use crate::executor::{MySqlExecutor, QueryExecutor};
use crate::explainer::Explainer;
use crate::history::{
    ConversationStore, MySqlConversationStore, NewMessage, NewSession, DEFAULT_HISTORY_LIMIT, DEFAULT_SESSION_LIMIT,
};
use crate::llm::{CompletionProvider, OpenAiClient};
use crate::models::{AgenticQueryRequest, HealthStatus, ValidateQueryRequest, ValidateQueryResponse};
use crate::orchestrator::AgenticService;
use crate::reference::ReferenceLibrary;
use crate::schema_rag::{Collection, ContextRetriever, Embedder, IndexStats, Indexer, OpenAiEmbedder, VectorIndex};
use crate::schema_registry::SchemaRegistry;
use crate::sql_generator::{Grounding, SqlGenerator};
use crate::sql_safety::SqlSafetyValidator;
use crate::worked_examples::example_queries;
use chrono::Utc;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 1_000_000;
const MAX_SEARCH_TOP_K: usize = 20;

/// Vector index plus the components that read and write it.
pub struct RagState {
    pub index: Arc<RwLock<VectorIndex>>,
    pub indexer: Indexer,
    pub retriever: Arc<ContextRetriever>,
}

pub struct AppState {
    pub settings: Settings,
    pub service: AgenticService,
    pub history: Arc<dyn ConversationStore>,
    /// `None` when RAG is disabled.
    pub rag: Option<RagState>,
}

impl AppState {
    /// Wire every component from settings. Nothing here is fatal: a
    /// missing database, key, schema file or index degrades the service
    /// instead of stopping it.
    pub async fn build(settings: Settings) -> Self {
        info!("Starting {} v{} ({})", settings.app_name, settings.app_version, settings.environment);

        if settings.openai_configured() {
            info!("OpenAI API key configured (model {})", settings.openai_model);
        } else {
            warn!("OPENAI_API_KEY not configured; generation requests will fail");
        }
        let llm: Arc<dyn CompletionProvider> = Arc::new(OpenAiClient::new(
            settings.openai_api_key.clone(),
            settings.openai_model.clone(),
            settings.openai_base_url.clone(),
        ));

        let registry = SchemaRegistry::global(&settings.schema_file);
        info!("Schema registry ready: {} tables ({:?})", registry.len(), registry.source());

        let pool = match init_pool(&settings.database_url, settings.db_pool_size).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                error!("Database connection failed, starting degraded: {}", e);
                None
            }
        };
        let executor: Arc<dyn QueryExecutor> = Arc::new(
            pool.clone()
                .map(MySqlExecutor::new)
                .unwrap_or_else(MySqlExecutor::disconnected),
        );
        let history: Arc<dyn ConversationStore> = Arc::new(
            pool.map(MySqlConversationStore::new)
                .unwrap_or_else(MySqlConversationStore::disconnected),
        );

        let rag = if settings.rag_enabled {
            Some(build_rag(&settings, registry.clone()).await)
        } else {
            info!("RAG disabled");
            None
        };

        let mut generator = SqlGenerator::new(llm.clone(), registry)
            .with_policy(settings.cross_check_policy)
            .with_sampling(settings.openai_temperature, settings.openai_max_tokens)
            .with_rag_top_k(settings.rag_top_k);
        if let Some(rag) = &rag {
            generator = generator.with_grounding(Grounding::Retrieved(rag.retriever.clone()));
        }
        if let Some(path) = &settings.reference_doc_path {
            match ReferenceLibrary::load(path) {
                Ok(reference) => {
                    info!("Loaded {} reference paragraphs from {}", reference.len(), path.display());
                    generator = generator.with_reference(Arc::new(reference));
                }
                Err(e) => warn!("Reference document {} not loaded: {}", path.display(), e),
            }
        }
        info!("Schema cross-check policy: {}", settings.cross_check_policy);

        let service = AgenticService::new(
            generator,
            SqlSafetyValidator::new(llm.clone()),
            executor,
            Explainer::new(llm),
        )
        .with_history(history.clone());

        Self {
            settings,
            service,
            history,
            rag,
        }
    }
}

async fn build_rag(settings: &Settings, registry: Arc<SchemaRegistry>) -> RagState {
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        settings.openai_api_key.clone(),
        settings.openai_base_url.clone(),
        settings.embedding_model.clone(),
        settings.embedding_dimensions,
    ));
    let index = Arc::new(RwLock::new(VectorIndex::load_or_new(
        &settings.rag_index_path,
        settings.embedding_dimensions,
    )));
    let indexer = Indexer::new(index.clone(), embedder.clone(), registry)
        .with_docs_path(settings.docs_path.clone())
        .with_index_path(settings.rag_index_path.clone());

    let stats = index.read().await.stats();
    if stats == IndexStats::default() {
        info!("Vector index is empty, running initial indexing");
        match indexer.index_all(false).await {
            Ok(reports) => {
                for report in reports {
                    info!("{}", report.message);
                }
            }
            Err(e) => warn!("Initial indexing failed (index manually via the API): {}", e),
        }
    } else {
        info!(
            "Vector index loaded (schema: {}, examples: {}, docs: {})",
            stats.schema_count, stats.examples_count, stats.docs_count
        );
    }

    RagState {
        retriever: Arc::new(ContextRetriever::new(index.clone(), embedder)),
        index,
        indexer,
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Lower-cased names.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpRequest {
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        let mut lines = head.lines();
        let mut parts = lines.next()?.split_whitespace();
        let method = parts.next()?.to_uppercase();
        let target = parts.next()?;

        let (path, query_string) = target.split_once('?').unwrap_or((target, ""));
        let mut path = path.trim_end_matches('/').to_string();
        if path.is_empty() {
            path = "/".to_string();
        }

        let query = query_string
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (percent_decode(key), percent_decode(value))
            })
            .collect();

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
            .collect();

        Some(Self {
            method,
            path,
            query,
            headers,
            body: body.to_string(),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!("Failed to serialise response: {}", e);
                Self::detail(500, "Failed to serialise response")
            }
        }
    }

    pub fn detail(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "detail": message.into() }).to_string(),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: String::new(),
        }
    }
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from {}", addr);
        let state = state.clone();
        tokio::spawn(async move { handle_connection(stream, state).await });
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    let read_result = timeout(READ_TIMEOUT, async {
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);

            if let Some(headers_end) = find_headers_end(&buffer) {
                let head = String::from_utf8_lossy(&buffer[..headers_end]);
                match extract_content_length(&head) {
                    Some(length) if buffer.len() >= headers_end + length => break,
                    Some(_) => {}
                    None => break,
                }
            }
            if buffer.len() > MAX_REQUEST_BYTES {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            warn!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }
    if buffer.is_empty() {
        return;
    }

    let response = if buffer.len() > MAX_REQUEST_BYTES {
        render_response(&HttpResponse::detail(413, "Request too large"), None, 0.0)
    } else {
        match String::from_utf8(buffer) {
            Ok(raw) => handle_request(&state, &raw).await,
            Err(_) => render_response(&HttpResponse::detail(400, "Request is not valid UTF-8"), None, 0.0),
        }
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
}

/// Byte offset just past the blank line ending the headers.
fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

pub fn extract_content_length(head: &str) -> Option<usize> {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Parse, route and render one raw request.
pub async fn handle_request(state: &AppState, raw: &str) -> String {
    let start = Instant::now();
    let Some(request) = HttpRequest::parse(raw) else {
        return render_response(&HttpResponse::detail(400, "Bad Request"), None, 0.0);
    };
    debug!("Request: {} {}", request.method, request.path);

    let response = route(state, &request).await;
    let origin = allowed_origin(&state.settings.cors_origins, request.header("origin"));
    render_response(&response, origin, start.elapsed().as_secs_f64())
}

pub async fn route(state: &AppState, request: &HttpRequest) -> HttpResponse {
    if request.method == "OPTIONS" {
        return HttpResponse::no_content();
    }
    if request.method == "GET" && request.path == "/" {
        return HttpResponse::json(
            200,
            &json!({
                "message": format!("Welcome to {}", state.settings.app_name),
                "version": state.settings.app_version,
                "health": format!("{}/health", state.settings.api_prefix),
            }),
        );
    }

    let prefix = state.settings.api_prefix.trim_end_matches('/');
    let Some(rest) = request.path.strip_prefix(prefix) else {
        return not_found();
    };
    let decoded: Vec<String> = rest.split('/').filter(|s| !s.is_empty()).map(percent_decode).collect();
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => health(state).await,
        ("GET", ["ping"]) => HttpResponse::json(200, &json!({ "message": "pong", "timestamp": Utc::now() })),

        ("POST", ["agentic", "query"]) => agentic_query(state, request).await,
        ("GET", ["agentic", "examples"]) => HttpResponse::json(200, &example_queries()),
        ("POST", ["agentic", "validate-query"]) => validate_query(state, request).await,

        ("POST", ["conversation", "sessions"]) => create_session(state, request).await,
        ("GET", ["conversation", "sessions"]) => list_sessions(state, request).await,
        ("GET", ["conversation", "sessions", session_id]) => match state.history.get_session(session_id).await {
            Ok(Some(session)) => HttpResponse::json(200, &session),
            Ok(None) => HttpResponse::detail(404, format!("Session {} not found", session_id)),
            Err(e) => HttpResponse::detail(500, e.to_string()),
        },
        ("POST", ["conversation", "messages"]) => match parse_body::<NewMessage>(&request.body) {
            Ok(message) => match state.history.add_message(message).await {
                Ok(stored) => HttpResponse::json(200, &stored),
                Err(e) => HttpResponse::detail(500, e.to_string()),
            },
            Err(response) => response,
        },
        ("GET", ["conversation", "history", session_id]) => {
            let limit = match limit_param(request, DEFAULT_HISTORY_LIMIT) {
                Ok(limit) => limit,
                Err(response) => return response,
            };
            match state.history.get_history(session_id, limit).await {
                Ok(Some(history)) => HttpResponse::json(200, &history),
                Ok(None) => HttpResponse::detail(404, format!("Session {} not found", session_id)),
                Err(e) => HttpResponse::detail(500, e.to_string()),
            }
        }
        ("POST", ["conversation", "context"]) => save_context(state, request).await,
        ("GET", ["conversation", "context", session_id]) => match state.history.get_all_context(session_id).await {
            Ok(context) => HttpResponse::json(200, &json!({ "session_id": session_id, "context": context })),
            Err(e) => HttpResponse::detail(500, e.to_string()),
        },
        ("GET", ["conversation", "context", session_id, key]) => {
            match state.history.get_context(session_id, key).await {
                Ok(Some(entry)) => HttpResponse::json(200, &entry),
                Ok(None) => HttpResponse::detail(404, format!("Context '{}' not found", key)),
                Err(e) => HttpResponse::detail(500, e.to_string()),
            }
        }

        ("GET", ["rag", "stats"]) => rag_stats(state).await,
        ("POST", ["rag", "index", target]) => rag_index(state, request, target).await,
        ("POST", ["rag", "search"]) => rag_search(state, request).await,
        ("POST", ["rag", "clear", target]) => rag_clear(state, target).await,

        _ => not_found(),
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::detail(404, "Not Found")
}

async fn health(state: &AppState) -> HttpResponse {
    let database_connected = state.service.executor().ping().await;
    let status = HealthStatus::new(
        &state.settings.app_version,
        database_connected,
        state.settings.openai_configured(),
    );
    HttpResponse::json(200, &status)
}

async fn agentic_query(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let mut query: AgenticQueryRequest = match parse_body(&request.body) {
        Ok(query) => query,
        Err(response) => return response,
    };
    if let Err(message) = query.normalise(state.settings.max_query_length) {
        return HttpResponse::detail(422, message);
    }
    if query.session_id.is_none() {
        query.session_id = request.header("x-session-id").map(str::to_string);
    }

    let response = state.service.process_query(&query).await;
    HttpResponse::json(200, &response)
}

async fn validate_query(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let sql = match request.param("sql_query") {
        Some(sql) => sql.to_string(),
        None => match parse_body::<ValidateQueryRequest>(&request.body) {
            Ok(body) => body.sql_query,
            Err(response) => return response,
        },
    };

    let report = state.service.safety().validate(&sql).await;
    HttpResponse::json(
        200,
        &ValidateQueryResponse {
            is_safe: report.is_safe,
            reason: report.reason,
            query: sql,
        },
    )
}

async fn create_session(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let session: NewSession = match parse_body(&request.body) {
        Ok(session) => session,
        Err(response) => return response,
    };
    if session.session_id.trim().is_empty() || session.title.chars().count() > 255 {
        return HttpResponse::detail(422, "session_id is required and title must be at most 255 characters");
    }
    match state.history.create_session(&session).await {
        Ok(created) => HttpResponse::json(200, &created),
        Err(e) => HttpResponse::detail(500, e.to_string()),
    }
}

async fn list_sessions(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let user_id = match request.param("user_id").map(str::parse::<i64>).transpose() {
        Ok(user_id) => user_id,
        Err(_) => return HttpResponse::detail(422, "user_id must be an integer"),
    };
    let limit = match limit_param(request, DEFAULT_SESSION_LIMIT) {
        Ok(limit) => limit,
        Err(response) => return response,
    };
    match state.history.list_sessions(user_id, limit).await {
        Ok(sessions) => HttpResponse::json(200, &sessions),
        Err(e) => HttpResponse::detail(500, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ContextBody {
    session_id: String,
    context_key: String,
    context_value: String,
}

async fn save_context(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let body: ContextBody = match parse_body(&request.body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    if body.context_key.chars().count() > 100 {
        return HttpResponse::detail(422, "context_key must be at most 100 characters");
    }
    match state
        .history
        .save_context(&body.session_id, &body.context_key, &body.context_value)
        .await
    {
        Ok(entry) => HttpResponse::json(200, &entry),
        Err(e) => HttpResponse::detail(500, e.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct RagStats {
    #[serde(flatten)]
    counts: IndexStats,
    is_initialized: bool,
}

async fn rag_stats_value(state: &AppState) -> RagStats {
    match &state.rag {
        Some(rag) => RagStats {
            counts: rag.index.read().await.stats(),
            is_initialized: true,
        },
        None => RagStats {
            counts: IndexStats::default(),
            is_initialized: false,
        },
    }
}

async fn rag_stats(state: &AppState) -> HttpResponse {
    HttpResponse::json(200, &rag_stats_value(state).await)
}

#[derive(Debug, Default, Deserialize)]
struct IndexBody {
    #[serde(default)]
    force_reindex: bool,
}

async fn rag_index(state: &AppState, request: &HttpRequest, target: &str) -> HttpResponse {
    let Some(rag) = &state.rag else {
        return HttpResponse::detail(400, "RAG is disabled");
    };
    let body: IndexBody = if request.body.trim().is_empty() {
        IndexBody::default()
    } else {
        match parse_body(&request.body) {
            Ok(body) => body,
            Err(response) => return response,
        }
    };

    let result = if target == "all" {
        rag.indexer.index_all(body.force_reindex).await
    } else {
        match target.parse::<Collection>() {
            Ok(collection) => rag.indexer.index_collection(collection, body.force_reindex).await.map(|r| vec![r]),
            Err(e) => return HttpResponse::detail(400, e.to_string()),
        }
    };

    match result {
        Ok(reports) => {
            let message = reports.iter().map(|r| r.message.as_str()).join(" ");
            HttpResponse::json(
                200,
                &json!({
                    "success": true,
                    "message": message,
                    "stats": rag_stats_value(state).await,
                }),
            )
        }
        Err(e) => {
            error!("Indexing {} failed: {}", target, e);
            HttpResponse::detail(500, e.to_string())
        }
    }
}

fn default_collection() -> String {
    "all".to_string()
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default = "default_collection")]
    collection: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    role: Option<String>,
}

async fn rag_search(state: &AppState, request: &HttpRequest) -> HttpResponse {
    let Some(rag) = &state.rag else {
        return HttpResponse::detail(400, "Vector DB not initialized");
    };
    let body: SearchBody = match parse_body(&request.body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let query = body.query.trim();
    if query.is_empty() || query.chars().count() > state.settings.max_query_length {
        return HttpResponse::detail(422, "query must be between 1 and the maximum query length");
    }
    if !(1..=MAX_SEARCH_TOP_K).contains(&body.top_k) {
        return HttpResponse::detail(422, format!("top_k must be between 1 and {}", MAX_SEARCH_TOP_K));
    }

    let collections = if body.collection == "all" {
        Collection::ALL.to_vec()
    } else {
        match body.collection.parse::<Collection>() {
            Ok(collection) => vec![collection],
            Err(e) => return HttpResponse::detail(400, e.to_string()),
        }
    };

    let mut results = serde_json::Map::new();
    let mut total = 0;
    for collection in collections {
        match rag.retriever.search(collection, query, body.top_k, body.role.as_deref()).await {
            Ok(hits) => {
                total += hits.len();
                let key = match collection {
                    Collection::Schema => "relevant_tables",
                    Collection::Examples => "similar_examples",
                    Collection::Docs => "relevant_docs",
                };
                results.insert(key.to_string(), json!(hits));
            }
            Err(e) => {
                error!("RAG search failed: {}", e);
                return HttpResponse::detail(500, e.to_string());
            }
        }
    }

    HttpResponse::json(
        200,
        &json!({
            "query": query,
            "results": results,
            "total_results": total,
        }),
    )
}

async fn rag_clear(state: &AppState, target: &str) -> HttpResponse {
    let Some(rag) = &state.rag else {
        return HttpResponse::detail(400, "Vector DB not initialized");
    };
    {
        let mut index = rag.index.write().await;
        if target == "all" {
            index.clear_all();
        } else {
            match target.parse::<Collection>() {
                Ok(collection) => index.clear(collection),
                Err(_) => {
                    return HttpResponse::detail(
                        400,
                        "Invalid collection. Must be one of: schema, examples, docs, all",
                    )
                }
            }
        }
        if let Err(e) = index.save(&state.settings.rag_index_path) {
            warn!("Could not persist cleared index: {}", e);
        }
    }
    info!("Cleared RAG collection: {}", target);
    HttpResponse::json(
        200,
        &json!({
            "success": true,
            "message": format!("Cleared collection: {}", target),
            "stats": rag_stats_value(state).await,
        }),
    )
}

fn parse_body<T: DeserializeOwned>(body: &str) -> std::result::Result<T, HttpResponse> {
    serde_json::from_str(body.trim()).map_err(|e| HttpResponse::detail(422, format!("Invalid request body: {}", e)))
}

fn limit_param(request: &HttpRequest, default: u32) -> std::result::Result<u32, HttpResponse> {
    match request.param("limit") {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| HttpResponse::detail(422, "limit must be a positive integer")),
        None => Ok(default),
    }
}

/// `*` in the configured list allows everyone; otherwise the request's
/// Origin is echoed back only when listed.
fn allowed_origin<'a>(configured: &'a [String], request_origin: Option<&'a str>) -> Option<&'a str> {
    if configured.iter().any(|o| o == "*") {
        return Some("*");
    }
    request_origin.filter(|origin| configured.iter().any(|o| o == origin))
}

pub fn render_response(response: &HttpResponse, cors_origin: Option<&str>, process_time_secs: f64) -> String {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, status_text(response.status));
    if !response.body.is_empty() {
        head.push_str("Content-Type: application/json\r\n");
    }
    if let Some(origin) = cors_origin {
        head.push_str(&format!("Access-Control-Allow-Origin: {}\r\n", origin));
        if origin != "*" {
            head.push_str("Access-Control-Allow-Credentials: true\r\nVary: Origin\r\n");
        }
        head.push_str("Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n");
        head.push_str("Access-Control-Allow-Headers: Content-Type, Authorization, X-Session-Id\r\n");
    }
    head.push_str(&format!("X-Process-Time: {:.6}\r\n", process_time_secs));
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", response.body.len()));
    head.push_str(&response.body);
    head
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                (Some(high), Some(low)) => {
                    out.push(high << 4 | low);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}
