//! In-memory fake of the forensics API, rooted at `/api/v2`.
//!
//! Answers like the real server does where the gateway depends on it: JSON
//! bodies carry the `)]}'` prefix, empty collections are omitted rather than
//! sent as `[]`, errors are `{"message": ...}` bodies, and requests without a
//! cookie or authorization header are rejected with 401.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{Mutex, RwLock},
};
use tracing::debug;
use uuid::Uuid;

pub const XSSI_PREFIX: &str = ")]}'";

/// The user every authenticated request acts as.
pub const CURRENT_USER: &str = "test-user";

/// Results seeded for every started flow.
pub const RESULTS_PER_FLOW: usize = 25;

#[derive(Default)]
struct Db {
    clients: Vec<Value>,
    descriptors: Vec<Value>,
    /// Approvals per client, newest first.
    approvals: HashMap<String, Vec<Value>>,
    access: HashSet<String>,
    /// Flows per client, newest first.
    flows: HashMap<String, Vec<Value>>,
    results: HashMap<String, Vec<Value>>,
    next_flow: u64,
    approval_cc: String,
}

/// Shared server state, inspectable from tests.
pub struct AppState {
    db: RwLock<Db>,
    descriptor_hits: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let db = Db {
            clients: vec![
                json!({"clientId": "C.1234", "knowledgeBase": {"fqdn": "alpha.example.com"}}),
                json!({"clientId": "C.5678", "knowledgeBase": {"fqdn": "beta.example.com"}}),
            ],
            descriptors: vec![
                json!({"name": "ListProcesses", "category": "Processes",
                       "defaultArgs": {"@type": "type.googleapis.com/ListProcessesArgs"}}),
                json!({"name": "Interrogate", "category": "Administrative",
                       "defaultArgs": {"@type": "type.googleapis.com/InterrogateArgs"}}),
                json!({"name": "CollectFilesByKnownPath", "category": "Filesystem",
                       "defaultArgs": {"@type": "type.googleapis.com/CollectFilesByKnownPathArgs"}}),
            ],
            ..Db::default()
        };
        Self {
            db: RwLock::new(db),
            descriptor_hits: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Configure the default approval CC address.
    pub async fn set_approval_cc(&self, address: &str) {
        self.db.write().await.approval_cc = address.to_string();
    }

    /// Number of times the descriptor catalog was served.
    pub fn descriptor_hits(&self) -> usize {
        self.descriptor_hits.load(Ordering::SeqCst)
    }

    /// `"METHOD /path?query"` for every request received, in arrival order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

pub type SharedState = Arc<AppState>;

pub fn app() -> Router {
    app_with_state(Arc::new(AppState::new()))
}

pub fn app_with_state(state: SharedState) -> Router {
    let api = Router::new()
        .route("/clients", get(search_clients))
        .route("/clients/{id}", get(get_client))
        .route("/clients/{id}/access", get(verify_access))
        .route("/clients/{id}/flows", get(list_flows).post(create_flow))
        .route("/clients/{id}/flows/{flow_id}/results", get(list_results))
        .route("/clients/{id}/flows/{flow_id}/actions/cancel", post(cancel_flow))
        .route("/clients/{id}/glob-expressions:explain", post(explain_glob))
        .route("/flows/descriptors", get(list_descriptors))
        .route("/config/{name}", get(get_config))
        .route("/users/me", get(current_user))
        .route(
            "/users/me/approvals/client/{id}",
            get(list_approvals).post(create_approval),
        )
        .route(
            "/users/{requestor}/approvals/client/{id}/{approval_id}",
            get(get_approval),
        )
        .route(
            "/users/{requestor}/approvals/client/{id}/{approval_id}/actions/grant",
            post(grant_approval),
        )
        .layer(middleware::from_fn(require_credentials));

    Router::new()
        .nest("/api/v2", api)
        .layer(middleware::from_fn_with_state(state.clone(), record_request))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

/// JSON response with the anti-XSSI prefix.
fn reply(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        format!("{XSSI_PREFIX}\n{body}"),
    )
        .into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    reply(status, json!({ "message": message }))
}

/// `{"items": [...]}`, or `{}` when there is nothing to list.
fn items(items: Vec<Value>) -> Response {
    if items.is_empty() {
        reply(StatusCode::OK, json!({}))
    } else {
        reply(StatusCode::OK, json!({ "items": items }))
    }
}

async fn record_request(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let line = format!("{} {}", request.method(), request.uri());
    debug!(request = %line, "received");
    state.requests.lock().await.push(line);
    next.run(request).await
}

async fn require_credentials(request: Request, next: Next) -> Response {
    let headers = request.headers();
    if headers.contains_key(header::COOKIE) || headers.contains_key(header::AUTHORIZATION) {
        next.run(request).await
    } else {
        error(StatusCode::UNAUTHORIZED, "Authentication required")
    }
}

// --- clients ---

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    offset: Option<usize>,
    count: Option<usize>,
}

async fn search_clients(State(state): State<SharedState>, Query(params): Query<SearchParams>) -> Response {
    let db = state.db.read().await;
    let matches: Vec<Value> = db
        .clients
        .iter()
        .filter(|client| client.to_string().contains(&params.query))
        .skip(params.offset.unwrap_or(0))
        .take(params.count.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    items(matches)
}

fn find_client<'a>(db: &'a Db, id: &str) -> Option<&'a Value> {
    db.clients.iter().find(|client| client["clientId"] == id)
}

async fn get_client(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let db = state.db.read().await;
    match find_client(&db, &id) {
        Some(client) => reply(StatusCode::OK, client.clone()),
        None => error(StatusCode::NOT_FOUND, &format!("Client {id} not found")),
    }
}

async fn verify_access(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    if state.db.read().await.access.contains(&id) {
        reply(StatusCode::OK, json!({}))
    } else {
        error(StatusCode::FORBIDDEN, &format!("No approval found for {id}"))
    }
}

// --- approvals ---

#[derive(Deserialize)]
struct CreateApproval {
    approval: ApprovalArgs,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalArgs {
    reason: String,
    #[serde(default)]
    notified_users: Vec<String>,
    #[serde(default)]
    email_cc_addresses: Vec<String>,
}

async fn create_approval(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(input): Json<CreateApproval>,
) -> Response {
    let mut db = state.db.write().await;
    if find_client(&db, &id).is_none() {
        return error(StatusCode::NOT_FOUND, &format!("Client {id} not found"));
    }
    let approval = json!({
        "id": Uuid::new_v4().simple().to_string(),
        "subject": {"clientId": id},
        "requestor": CURRENT_USER,
        "reason": input.approval.reason,
        "notifiedUsers": input.approval.notified_users,
        "emailCcAddresses": input.approval.email_cc_addresses,
        "isValid": false,
    });
    db.approvals.entry(id).or_default().insert(0, approval.clone());
    reply(StatusCode::OK, approval)
}

async fn list_approvals(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let db = state.db.read().await;
    items(db.approvals.get(&id).cloned().unwrap_or_default())
}

async fn get_approval(
    State(state): State<SharedState>,
    Path((requestor, id, approval_id)): Path<(String, String, String)>,
) -> Response {
    let db = state.db.read().await;
    let found = db
        .approvals
        .get(&id)
        .and_then(|list| list.iter().find(|a| a["id"] == approval_id.as_str() && a["requestor"] == requestor.as_str()));
    match found {
        Some(approval) => reply(StatusCode::OK, approval.clone()),
        None => error(StatusCode::NOT_FOUND, &format!("Approval {approval_id} not found")),
    }
}

async fn grant_approval(
    State(state): State<SharedState>,
    Path((requestor, id, approval_id)): Path<(String, String, String)>,
) -> Response {
    let mut db = state.db.write().await;
    let granted = db.approvals.get_mut(&id).and_then(|list| {
        list.iter_mut()
            .find(|a| a["id"] == approval_id.as_str() && a["requestor"] == requestor.as_str())
            .map(|approval| {
                approval["isValid"] = json!(true);
                approval.clone()
            })
    });
    match granted {
        Some(approval) => {
            db.access.insert(id);
            reply(StatusCode::OK, approval)
        }
        None => error(StatusCode::NOT_FOUND, &format!("Approval {approval_id} not found")),
    }
}

async fn get_config(State(state): State<SharedState>, Path(name): Path<String>) -> Response {
    if name != "Email.approval_optional_cc_address" {
        return error(StatusCode::NOT_FOUND, &format!("Unknown config option {name}"));
    }
    let db = state.db.read().await;
    reply(StatusCode::OK, json!({"name": name, "value": {"value": db.approval_cc}}))
}

async fn current_user() -> Response {
    reply(StatusCode::OK, json!({"username": CURRENT_USER, "userType": "USER_TYPE_STANDARD"}))
}

// --- flows ---

async fn list_descriptors(State(state): State<SharedState>) -> Response {
    state.descriptor_hits.fetch_add(1, Ordering::SeqCst);
    items(state.db.read().await.descriptors.clone())
}

#[derive(Deserialize)]
struct ListFlowsParams {
    count: usize,
    offset: usize,
    min_started_at: Option<i64>,
}

async fn list_flows(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<ListFlowsParams>,
) -> Response {
    let db = state.db.read().await;
    let min_started_at = params.min_started_at.unwrap_or(i64::MIN);
    let flows: Vec<Value> = db
        .flows
        .get(&id)
        .into_iter()
        .flatten()
        .filter(|flow| flow["startedAt"].as_i64().unwrap_or(0) >= min_started_at)
        .skip(params.offset)
        .take(params.count)
        .cloned()
        .collect();
    items(flows)
}

#[derive(Deserialize)]
struct CreateFlow {
    name: String,
    #[serde(default)]
    args: serde_json::Map<String, Value>,
}

async fn create_flow(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(input): Json<CreateFlow>,
) -> Response {
    let mut db = state.db.write().await;
    if find_client(&db, &id).is_none() {
        return error(StatusCode::NOT_FOUND, &format!("Client {id} not found"));
    }
    let Some(descriptor) = db.descriptors.iter().find(|d| d["name"] == input.name.as_str()) else {
        return error(StatusCode::BAD_REQUEST, &format!("Flow {} not found", input.name));
    };
    if input.args.get("@type") != descriptor["defaultArgs"].get("@type") {
        return error(StatusCode::BAD_REQUEST, "bad args");
    }

    db.next_flow += 1;
    let flow_id = format!("F.{:08X}", db.next_flow);
    let payload_type = if input.name == "ListProcesses" { "Process" } else { "StatEntry" };
    let results = (0..RESULTS_PER_FLOW)
        .map(|index| {
            json!({
                "payloadType": payload_type,
                "tag": format!("t{}", index % 2),
                "payload": {"index": index},
            })
        })
        .collect();
    db.results.insert(flow_id.clone(), results);

    let flow = json!({
        "flowId": flow_id,
        "clientId": id,
        "name": input.name,
        "args": input.args,
        "state": "RUNNING",
        "creator": CURRENT_USER,
        "startedAt": now_micros(),
    });
    db.flows.entry(id).or_default().insert(0, flow.clone());
    reply(StatusCode::OK, flow)
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

#[derive(Deserialize)]
struct ResultsParams {
    offset: usize,
    count: usize,
    with_tag: Option<String>,
    with_type: Option<String>,
}

async fn list_results(
    State(state): State<SharedState>,
    Path((_id, flow_id)): Path<(String, String)>,
    Query(params): Query<ResultsParams>,
) -> Response {
    let db = state.db.read().await;
    let Some(results) = db.results.get(&flow_id) else {
        return error(StatusCode::NOT_FOUND, &format!("Flow {flow_id} not found"));
    };
    let page: Vec<Value> = results
        .iter()
        .filter(|r| params.with_tag.as_ref().is_none_or(|tag| r["tag"] == tag.as_str()))
        .filter(|r| params.with_type.as_ref().is_none_or(|ty| r["payloadType"] == ty.as_str()))
        .skip(params.offset)
        .take(params.count)
        .cloned()
        .collect();
    items(page)
}

async fn cancel_flow(
    State(state): State<SharedState>,
    Path((id, flow_id)): Path<(String, String)>,
) -> Response {
    let mut db = state.db.write().await;
    let cancelled = db.flows.get_mut(&id).and_then(|flows| {
        flows
            .iter_mut()
            .find(|flow| flow["flowId"] == flow_id.as_str())
            .map(|flow| {
                flow["state"] = json!("ERROR");
                flow["errorDescription"] = json!("Cancelled by user");
                flow.clone()
            })
    });
    match cancelled {
        Some(flow) => reply(StatusCode::OK, flow),
        None => error(StatusCode::NOT_FOUND, &format!("Flow {flow_id} not found")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainGlob {
    glob_expression: String,
    #[serde(default)]
    example_count: usize,
}

/// Splits the expression on `/` and invents examples for wildcard parts.
async fn explain_glob(Path(_id): Path<String>, Json(input): Json<ExplainGlob>) -> Response {
    let components: Vec<Value> = input
        .glob_expression
        .split('/')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let examples: Vec<String> = if part.contains('*') {
                (1..=input.example_count)
                    .map(|n| part.replace('*', &format!("example{n}")))
                    .collect()
            } else {
                Vec::new()
            };
            json!({"globExpression": part, "examples": examples})
        })
        .collect();
    if components.is_empty() {
        reply(StatusCode::OK, json!({}))
    } else {
        reply(StatusCode::OK, json!({ "components": components }))
    }
}
