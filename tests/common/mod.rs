//! In-process fake of the TeraSwitch API.
//!
//! Instances and metal servers report `Provisioning` on their first lookup
//! and `Active` from the second on, unless [`FakeApi::hold_provisioning`]
//! pins them.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, Request, State};
use axum::http::{header::AUTHORIZATION, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub const API_KEY: &str = "test-key";
pub const PROJECT_ID: i64 = 480;
pub const ADDRESS: &str = "203.0.113.10";

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    instances: BTreeMap<i64, Value>,
    metals: BTreeMap<i64, Value>,
    networks: BTreeMap<String, Value>,
    volumes: Vec<Value>,
    lookups: HashMap<String, u32>,
    requests: Vec<Recorded>,
    hold_provisioning: bool,
    fail_deletes: bool,
}

type Shared = Arc<Mutex<Inner>>;

pub struct FakeApi {
    pub url: String,
    inner: Shared,
}

impl FakeApi {
    pub async fn start() -> Self {
        let inner: Shared = Arc::default();
        let app = Router::new()
            .route("/v2/Instance", post(create_instance))
            .route("/v2/Instance/{id}", get(get_instance).delete(delete_instance))
            .route("/v2/Instance/{id}/PowerCommand", post(power_instance))
            .route("/v2/Metal", post(create_metal))
            .route("/v2/Metal/{id}", get(get_metal))
            .route("/v2/Metal/{id}/Rename", post(rename_metal))
            .route("/v2/Metal/{id}/PowerCommand", post(power_metal))
            .route("/v1/Metal/{id}", delete(delete_metal))
            .route("/v2/Network", post(create_network))
            .route("/v2/Network/{id}", get(get_network).delete(delete_network))
            .route(
                "/v2/Volume",
                get(list_volumes).post(create_volume).delete(delete_volume),
            )
            .layer(middleware::from_fn_with_state(inner.clone(), record_and_authorize))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, inner }
    }

    /// Provider configuration pointing at this server.
    pub fn provider_config(&self) -> Value {
        json!({
            "api_key": API_KEY,
            "project_id": PROJECT_ID,
            "endpoint": self.url,
            "poll_interval_ms": 10,
            "wait_timeout_secs": 5
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Requests whose method and path match exactly.
    pub fn calls(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn instance(&self, id: i64) -> Option<Value> {
        self.inner.lock().unwrap().instances.get(&id).cloned()
    }

    pub fn metal(&self, id: i64) -> Option<Value> {
        self.inner.lock().unwrap().metals.get(&id).cloned()
    }

    pub fn volume_count(&self) -> usize {
        self.inner.lock().unwrap().volumes.len()
    }

    pub fn insert_metal(&self, id: i64, server: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.metals.insert(id, server);
        inner.lookups.insert(format!("metal/{}", id), 10);
    }

    pub fn hold_provisioning(&self) {
        self.inner.lock().unwrap().hold_provisioning = true;
    }

    pub fn fail_deletes(&self) {
        self.inner.lock().unwrap().fail_deletes = true;
    }
}

async fn record_and_authorize(State(inner): State<Shared>, request: Request, next: Next) -> Response {
    inner.lock().unwrap().requests.push(Recorded {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
    });

    let expected = format!("Bearer {}", API_KEY);
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    next.run(request).await
}

fn ok(result: Value) -> Response {
    Json(json!({"success": true, "result": result})).into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "message": "not found"})),
    )
        .into_response()
}

fn delete_failure() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}

fn project_matches(query: &HashMap<String, String>) -> bool {
    query.get("projectId").map(String::as_str) == Some(&PROJECT_ID.to_string())
}

/// Status for the n-th lookup of `key`.
fn observe(inner: &mut Inner, key: String) -> &'static str {
    let seen = inner.lookups.entry(key).or_insert(0);
    *seen += 1;
    if *seen >= 2 && !inner.hold_provisioning {
        "Active"
    } else {
        "Provisioning"
    }
}

async fn create_instance(State(inner): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut inner = inner.lock().unwrap();
    inner.next_id += 1;
    let id = inner.next_id;
    inner.instances.insert(id, body);
    ok(json!({"id": id, "status": "Provisioning"}))
}

async fn get_instance(State(inner): State<Shared>, Path(id): Path<i64>) -> Response {
    let mut inner = inner.lock().unwrap();
    let Some(body) = inner.instances.get(&id).cloned() else {
        return not_found();
    };
    let status = observe(&mut inner, format!("instance/{}", id));
    let ips = (status == "Active").then(|| json!([ADDRESS]));
    ok(json!({
        "id": id,
        "projectId": body["projectId"],
        "regionId": body["regionId"],
        "displayName": body["displayName"],
        "status": status,
        "powerState": body.get("powerState").cloned().unwrap_or(json!("On")),
        "ipAddresses": ips
    }))
}

async fn power_instance(
    State(inner): State<Shared>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let Some(instance) = inner.instances.get_mut(&id) else {
        return not_found();
    };
    let state = query.get("command").map(|c| c.trim_start_matches("Power").to_string());
    instance["powerState"] = json!(state);
    ok(json!({}))
}

async fn delete_instance(State(inner): State<Shared>, Path(id): Path<i64>) -> Response {
    let mut inner = inner.lock().unwrap();
    if inner.fail_deletes {
        return delete_failure();
    }
    match inner.instances.remove(&id) {
        Some(_) => ok(json!({})),
        None => not_found(),
    }
}

async fn create_metal(State(inner): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut inner = inner.lock().unwrap();
    inner.next_id += 1;
    let id = inner.next_id;
    inner.metals.insert(id, body);
    ok(json!({"id": id, "status": "Provisioning"}))
}

async fn get_metal(State(inner): State<Shared>, Path(id): Path<i64>) -> Response {
    let mut inner = inner.lock().unwrap();
    let Some(body) = inner.metals.get(&id).cloned() else {
        return not_found();
    };
    let status = observe(&mut inner, format!("metal/{}", id));
    let mut server = json!({
        "id": id,
        "projectId": body["projectId"],
        "regionId": body["regionId"],
        "displayName": body["displayName"],
        "tierId": body["tierId"],
        "status": status,
        "powerState": body.get("powerState").cloned().unwrap_or(json!("On")),
        "ipAddresses": (status == "Active").then(|| json!([ADDRESS]))
    });
    if let (Some(server), Some(extra)) = (server.as_object_mut(), body.as_object()) {
        for (k, v) in extra {
            server.entry(k.clone()).or_insert(v.clone());
        }
    }
    ok(server)
}

async fn rename_metal(
    State(inner): State<Shared>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let Some(server) = inner.metals.get_mut(&id) else {
        return not_found();
    };
    server["displayName"] = body["name"].clone();
    ok(json!({}))
}

async fn power_metal(
    State(inner): State<Shared>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    let Some(server) = inner.metals.get_mut(&id) else {
        return not_found();
    };
    let state = query.get("command").map(|c| c.trim_start_matches("Power").to_string());
    server["powerState"] = json!(state);
    ok(json!({}))
}

async fn delete_metal(
    State(inner): State<Shared>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    if inner.fail_deletes {
        return delete_failure();
    }
    if !project_matches(&query) {
        return (StatusCode::BAD_REQUEST, "projectId is required").into_response();
    }
    match inner.metals.remove(&id) {
        Some(_) => ok(json!({})),
        None => not_found(),
    }
}

async fn create_network(
    State(inner): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !project_matches(&query) {
        return (StatusCode::BAD_REQUEST, "projectId is required").into_response();
    }
    let mut inner = inner.lock().unwrap();
    inner.next_id += 1;
    let id = format!("net-{}", inner.next_id);
    let mut network = body;
    network["id"] = json!(id);
    inner.networks.insert(id.clone(), network);
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "result": {"id": id}})),
    )
        .into_response()
}

async fn get_network(
    State(inner): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !project_matches(&query) {
        return (StatusCode::BAD_REQUEST, "projectId is required").into_response();
    }
    match inner.lock().unwrap().networks.get(&id) {
        Some(network) => ok(network.clone()),
        None => not_found(),
    }
}

async fn delete_network(
    State(inner): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    if inner.fail_deletes {
        return delete_failure();
    }
    if !project_matches(&query) {
        return (StatusCode::BAD_REQUEST, "projectId is required").into_response();
    }
    match inner.networks.remove(&id) {
        Some(_) => ok(json!({})),
        None => not_found(),
    }
}

async fn create_volume(
    State(inner): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !project_matches(&query) {
        return (StatusCode::BAD_REQUEST, "projectId is required").into_response();
    }
    let mut inner = inner.lock().unwrap();
    inner.next_id += 1;
    let id = format!("00000000-0000-4000-8000-{:012}", inner.next_id);
    inner.volumes.push(json!({
        "volumeId": id,
        "description": body["description"],
        "displayName": body["displayName"],
        "region": body["regionId"],
        "size": body["size"],
        "status": "Available",
        "volumeType": body["volumeType"]
    }));
    ok(json!({"volumeId": id, "status": "Creating"}))
}

async fn list_volumes(
    State(inner): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !project_matches(&query) {
        return (StatusCode::BAD_REQUEST, "projectId is required").into_response();
    }
    ok(Value::Array(inner.lock().unwrap().volumes.clone()))
}

async fn delete_volume(
    State(inner): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = inner.lock().unwrap();
    if inner.fail_deletes {
        return delete_failure();
    }
    if !project_matches(&query) || body["regionId"].is_null() {
        return (StatusCode::BAD_REQUEST, "projectId and regionId are required").into_response();
    }
    let before = inner.volumes.len();
    inner.volumes.retain(|v| v["volumeId"] != body["volumeId"]);
    if inner.volumes.len() == before {
        return not_found();
    }
    ok(json!({}))
}
