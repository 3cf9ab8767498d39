//! In-memory imitation of the Flexibee REST API.
//!
//! Serves one company. Every evidence name is accepted and starts empty.
//! Responses use the `winstrom` envelope, ids are strings, and failures are
//! reported the way the real server does: fixed status codes for auth and
//! routing problems, `success: "false"` with nested `errors` for rejected
//! data.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Evidence the mock always refuses with 403.
pub const FORBIDDEN_EVIDENCE: &str = "nastaveni";

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub company: String,
    pub user: String,
    pub password: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            company: "demo".to_string(),
            user: "winstrom".to_string(),
            password: "winstrom".to_string(),
        }
    }
}

pub type Record = Map<String, Value>;

/// Everything a backup contains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Store {
    evidences: BTreeMap<String, BTreeMap<i64, Record>>,
    next_id: i64,
    version: u64,
    changes: Vec<Value>,
}

impl Store {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record_change(&mut self, evidence: &str, id: i64, operation: &str) {
        self.version += 1;
        self.changes.push(json!({
            "@evidence": evidence,
            "@in-version": self.version.to_string(),
            "@operation": operation,
            "id": id.to_string(),
        }));
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<MockConfig>,
    store: Arc<RwLock<Store>>,
    sessions: Arc<RwLock<HashSet<String>>>,
}

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(RwLock::new(Store::default())),
        sessions: Arc::new(RwLock::new(HashSet::new())),
    };
    Router::new()
        .route("/c/{company}/{resource}", get(get_resource).put(put_resource))
        .route("/c/{company}/{evidence}/{target}", get(get_target).delete(delete_target))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .route("/login-logout/login.json", post(login))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn envelope(body: Value) -> Json<Value> {
    let mut inner = json!({"@version": "1.0"});
    if let (Some(target), Value::Object(fields)) = (inner.as_object_mut(), body) {
        target.extend(fields);
    }
    Json(json!({ "winstrom": inner }))
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, envelope(body)).into_response()
}

fn failure(status: StatusCode, messages: &[String]) -> Response {
    let errors: Vec<Value> = messages.iter().map(|m| json!({ "message": m })).collect();
    reply(
        status,
        json!({
            "success": "false",
            "stats": {"created": "0", "updated": "0", "deleted": "0", "skipped": "0", "failed": messages.len().to_string()},
            "results": [{ "errors": errors }],
        }),
    )
}

fn not_found() -> Response {
    reply(StatusCode::NOT_FOUND, json!({}))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_authorized(&state, request.headers()).await {
        next.run(request).await
    } else {
        debug!(uri = %request.uri(), "rejecting unauthenticated request");
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn is_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    if let Some(token) = headers.get("x-authsessionid").and_then(|v| v.to_str().ok()) {
        return state.sessions.read().await.contains(token);
    }
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    let expected = format!("{}:{}", state.config.user, state.config.password);
    STANDARD
        .decode(encoded)
        .map(|decoded| decoded == expected.as_bytes())
        .unwrap_or(false)
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

async fn login(State(state): State<AppState>, Form(credentials): Form<Credentials>) -> Response {
    if credentials.username != state.config.user || credentials.password != state.config.password {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let token = Uuid::new_v4().to_string();
    state.sessions.write().await.insert(token.clone());
    reply(
        StatusCode::CREATED,
        json!({
            "success": "true",
            "authSessionId": token,
            "refreshToken": Uuid::new_v4().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Collection level: list, save, backup, restore, changes
// ---------------------------------------------------------------------------

async fn get_resource(
    State(state): State<AppState>,
    Path((company, resource)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if company != state.config.company {
        return not_found();
    }
    if resource == "backup" {
        let store = state.store.read().await;
        let bytes = serde_json::to_vec(&*store).unwrap_or_default();
        return ([(header::CONTENT_TYPE, "application/x-winstrom-backup")], bytes).into_response();
    }
    if resource == "changes.json" {
        return changes(&state, &params).await;
    }
    let Some(evidence) = resource.strip_suffix(".json") else {
        return not_found();
    };
    if evidence == FORBIDDEN_EVIDENCE {
        return StatusCode::FORBIDDEN.into_response();
    }

    let store = state.store.read().await;
    let records: Vec<Value> = store
        .evidences
        .get(evidence)
        .map(|records| records.values().cloned().map(Value::Object).collect())
        .unwrap_or_default();
    let total = records.len();
    let start = params.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
    let limit = params.get("limit").and_then(|s| s.parse().ok()).unwrap_or(20);
    let page: Vec<Value> = if limit == 0 {
        records.into_iter().skip(start).collect()
    } else {
        records.into_iter().skip(start).take(limit).collect()
    };

    let mut body = Map::new();
    body.insert(evidence.to_string(), Value::Array(page));
    if params.get("add-row-count").map(String::as_str) == Some("true") {
        body.insert("@rowCount".to_string(), json!(total.to_string()));
    }
    reply(StatusCode::OK, Value::Object(body))
}

async fn put_resource(
    State(state): State<AppState>,
    Path((company, resource)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if resource == "restore" {
        return restore(&state, &company, &body).await;
    }
    if company != state.config.company {
        return not_found();
    }
    let Some(evidence) = resource.strip_suffix(".json") else {
        return not_found();
    };
    if evidence == FORBIDDEN_EVIDENCE {
        return StatusCode::FORBIDDEN.into_response();
    }
    let dry_run = params.get("dry-run").map(String::as_str) == Some("true");

    let document: Value = match serde_json::from_slice(&body) {
        Ok(document) => document,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &[format!("Chyba při čtení JSON: {e}")]),
    };
    let records = match document.get("winstrom").and_then(|w| w.get(evidence)) {
        Some(Value::Object(record)) => vec![record.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(|i| i.as_object().cloned()).collect(),
        _ => Vec::new(),
    };

    let mut store = state.store.write().await;
    let mut working = store.clone();
    let mut created = 0;
    let mut updated = 0;
    let mut results = Vec::new();
    let mut errors = Vec::new();

    for mut record in records {
        match record.remove("id").as_ref().and_then(parse_id) {
            Some(id) => {
                let existing = working.evidences.entry(evidence.to_string()).or_default().get_mut(&id);
                match existing {
                    Some(existing) => {
                        existing.extend(record);
                        working.record_change(evidence, id, "update");
                        updated += 1;
                        results.push(json!({ "id": id.to_string() }));
                    }
                    None => errors.push(format!("Záznam s id {id} neexistuje.")),
                }
            }
            None => {
                if !record.contains_key("kod") {
                    errors.push("Pole 'kod' musí být vyplněno.".to_string());
                    continue;
                }
                let id = working.allocate_id();
                record.insert("id".to_string(), json!(id.to_string()));
                working.evidences.entry(evidence.to_string()).or_default().insert(id, record);
                working.record_change(evidence, id, "create");
                created += 1;
                results.push(json!({ "id": id.to_string() }));
            }
        }
    }

    if !errors.is_empty() {
        return failure(StatusCode::BAD_REQUEST, &errors);
    }
    if !dry_run {
        *store = working;
    }
    let status = if created > 0 { StatusCode::CREATED } else { StatusCode::OK };
    reply(
        status,
        json!({
            "success": "true",
            "stats": {"created": created.to_string(), "updated": updated.to_string(), "deleted": "0", "skipped": "0", "failed": "0"},
            "results": results,
        }),
    )
}

async fn restore(state: &AppState, company: &str, body: &[u8]) -> Response {
    if company != state.config.company {
        return not_found();
    }
    match serde_json::from_slice::<Store>(body) {
        Ok(restored) => {
            *state.store.write().await = restored;
            reply(StatusCode::OK, json!({"success": "true"}))
        }
        Err(e) => failure(StatusCode::BAD_REQUEST, &[format!("Neplatná záloha: {e}")]),
    }
}

async fn changes(state: &AppState, params: &HashMap<String, String>) -> Response {
    let store = state.store.read().await;
    let from: u64 = params.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
    let changes: Vec<Value> = store
        .changes
        .iter()
        .filter(|change| {
            params
                .get("evidence")
                .map_or(true, |evidence| change["@evidence"].as_str() == Some(evidence.as_str()))
        })
        .filter(|change| {
            change["@in-version"]
                .as_str()
                .and_then(|v| v.parse::<u64>().ok())
                .is_some_and(|v| v > from)
        })
        .cloned()
        .collect();
    reply(
        StatusCode::OK,
        json!({ "@globalVersion": store.version.to_string(), "changes": changes }),
    )
}

// ---------------------------------------------------------------------------
// Record level: get, filter, pdf, delete, changes status
// ---------------------------------------------------------------------------

/// What the last path segment addresses.
#[derive(Debug, PartialEq)]
enum Target {
    Id(i64),
    Code(String),
    Filter(Vec<(String, String)>),
}

fn parse_target(raw: &str) -> Result<Target, String> {
    if let Ok(id) = raw.parse() {
        return Ok(Target::Id(id));
    }
    let inner = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("Neplatný identifikátor '{raw}'"))?;
    if let Some(code) = inner.strip_prefix("code:") {
        return Ok(Target::Code(code.to_string()));
    }
    inner
        .split(" and ")
        .map(|condition| {
            let (field, value) = condition
                .split_once('=')
                .ok_or_else(|| format!("Nepodporovaný filtr '{condition}'"))?;
            let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
            Ok((field.trim().to_string(), value.to_string()))
        })
        .collect::<Result<Vec<_>, String>>()
        .map(Target::Filter)
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_text(record: &Record, field: &str) -> Option<String> {
    record.get(field).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn select(records: Option<&BTreeMap<i64, Record>>, target: &Target) -> Vec<(i64, Record)> {
    let Some(records) = records else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|(id, record)| match target {
            Target::Id(wanted) => *id == wanted,
            Target::Code(code) => field_text(record, "kod").as_deref() == Some(code.as_str()),
            Target::Filter(conditions) => conditions
                .iter()
                .all(|(field, value)| field_text(record, field).as_deref() == Some(value.as_str())),
        })
        .map(|(id, record)| (*id, record.clone()))
        .collect()
}

async fn get_target(
    State(state): State<AppState>,
    Path((company, evidence, target)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if company != state.config.company {
        return not_found();
    }
    if evidence == "changes" && target == "status.json" {
        return reply(StatusCode::OK, json!({"success": "true"}));
    }
    if evidence == FORBIDDEN_EVIDENCE {
        return StatusCode::FORBIDDEN.into_response();
    }

    let (raw, pdf) = match (target.strip_suffix(".json"), target.strip_suffix(".pdf")) {
        (Some(raw), _) => (raw, false),
        (None, Some(raw)) => (raw, true),
        _ => return StatusCode::NOT_ACCEPTABLE.into_response(),
    };
    let target = match parse_target(raw) {
        Ok(target) => target,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &[message]),
    };

    let store = state.store.read().await;
    let mut found = select(store.evidences.get(&evidence), &target);
    if found.is_empty() && !matches!(target, Target::Filter(_)) {
        return not_found();
    }

    if pdf {
        let Some((id, _)) = found.first() else {
            return not_found();
        };
        let document = format!("%PDF-1.4\n% mock {evidence} {id}\n%%EOF\n");
        return ([(header::CONTENT_TYPE, "application/pdf")], document.into_bytes()).into_response();
    }

    if params.get("relations").map(String::as_str) == Some("uzivatelske-vazby") {
        for (_, record) in &mut found {
            record.entry("uzivatelske-vazby").or_insert_with(|| json!([]));
        }
    }
    let records: Vec<Value> = found.into_iter().map(|(_, record)| Value::Object(record)).collect();
    let mut body = Map::new();
    body.insert(evidence, Value::Array(records));
    reply(StatusCode::OK, Value::Object(body))
}

async fn delete_target(
    State(state): State<AppState>,
    Path((company, evidence, target)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if company != state.config.company {
        return not_found();
    }
    let Some(target) = target.strip_suffix(".json").and_then(|raw| parse_target(raw).ok()) else {
        return not_found();
    };
    let dry_run = params.get("dry-run").map(String::as_str) == Some("true");

    let mut store = state.store.write().await;
    let found = select(store.evidences.get(&evidence), &target);
    if found.is_empty() {
        return not_found();
    }
    if !dry_run {
        for (id, _) in &found {
            if let Some(records) = store.evidences.get_mut(&evidence) {
                records.remove(id);
            }
            store.record_change(&evidence, *id, "delete");
        }
    }
    reply(
        StatusCode::OK,
        json!({
            "success": "true",
            "stats": {"created": "0", "updated": "0", "deleted": found.len().to_string()},
        }),
    )
}
