// 🌐 BIN Catalog - Web Server
// REST API with Axum: one route per engine verb, one transaction per request

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use bin_catalog::commands::{
    BinChanges, NewAgency, NewBin, NewPlan, NewSubtype, NewValidation, PlanChanges, SubtypeChanges,
};
use bin_catalog::identity::{resolve_actor, IdentityProvider};
use bin_catalog::{
    in_transaction, init_logging, open_database, CatalogConfig, CatalogEngine, CatalogError,
    CatalogResult, EngineSettings, Page, SqliteStore, Status,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    settings: EngineSettings,
    default_actor: String,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct ApiError {
    kind: &'static str,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(err: &CatalogError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: err.kind().as_str(),
                message: err.to_string(),
            }),
        }
    }
}

fn failure_response(err: CatalogError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    (status, Json(ApiResponse::failure(&err))).into_response()
}

/// Run one engine call in its own transaction and render the outcome
fn run<T, F>(state: &AppState, success: StatusCode, work: F) -> Response
where
    T: Serialize,
    F: FnOnce(&CatalogEngine<'_, SqliteStore<'_>>) -> CatalogResult<T>,
{
    let mut conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return failure_response(CatalogError::Storage("connection lock poisoned".into())),
    };

    match in_transaction(&mut conn, state.settings, work) {
        Ok(data) => (success, Json(ApiResponse::ok(data))).into_response(),
        Err(err) => failure_response(err),
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Actor from the x-actor header
struct HeaderIdentity<'h>(&'h HeaderMap);

impl IdentityProvider for HeaderIdentity<'_> {
    fn current_actor(&self) -> Option<String> {
        self.0
            .get("x-actor")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }
}

fn actor(state: &AppState, headers: &HeaderMap) -> String {
    resolve_actor(&HeaderIdentity(headers), &state.default_actor)
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    bin: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl ListQuery {
    fn status(&self) -> CatalogResult<Option<Status>> {
        self.status.as_deref().map(Status::parse).transpose()
    }

    fn page(&self) -> Page {
        let default = Page::default();
        Page::new(
            self.offset.unwrap_or(default.offset),
            self.limit.unwrap_or(default.limit),
        )
    }
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
struct AgencyNameRequest {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemRequest {
    value: String,
}

#[derive(Debug, Deserialize)]
struct BulkItemsRequest {
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AssignPlanRequest {
    plan_code: String,
}

#[derive(Debug, Deserialize)]
struct AttachRuleRequest {
    bin: String,
    validation_code: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RuleValueRequest {
    value: serde_json::Value,
}

// ============================================================================
// API Handlers - BINs
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/bins
async fn create_bin(State(state): State<AppState>, headers: HeaderMap, Json(cmd): Json<NewBin>) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| engine.create_bin(&cmd, &actor))
}

/// GET /api/bins?status=&offset=&limit=
async fn list_bins(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_bins(query.status()?, query.page())
    })
}

/// GET /api/bins/:bin
async fn get_bin(State(state): State<AppState>, Path(bin): Path<String>) -> Response {
    run(&state, StatusCode::OK, |engine| engine.get_bin(&bin))
}

/// PUT /api/bins/:bin
async fn update_bin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(bin): Path<String>,
    Json(changes): Json<BinChanges>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| engine.update_bin(&bin, &changes, &actor))
}

/// PUT /api/bins/:bin/status
async fn change_bin_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(bin): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_bin_status(&bin, &req.status, &actor)
    })
}

// ============================================================================
// API Handlers - Subtypes & Agencies
// ============================================================================

/// POST /api/subtypes
async fn create_subtype(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<NewSubtype>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| engine.create_subtype(&cmd, &actor))
}

/// GET /api/subtypes?bin=&status=&offset=&limit=
async fn list_subtypes(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_subtypes(query.bin.as_deref(), query.status()?, query.page())
    })
}

/// GET /api/subtypes/:code
async fn get_subtype(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    run(&state, StatusCode::OK, |engine| engine.get_subtype(&code))
}

/// PUT /api/subtypes/:code
async fn update_subtype(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(changes): Json<SubtypeChanges>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.update_subtype(&code, &changes, &actor)
    })
}

/// PUT /api/subtypes/:code/status
async fn change_subtype_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_subtype_status(&code, &req.status, &actor)
    })
}

/// POST /api/agencies
async fn create_agency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<NewAgency>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| engine.create_agency(&cmd, &actor))
}

/// GET /api/subtypes/:code/agencies
async fn list_agencies(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_agencies(&code, query.status()?, query.page())
    })
}

/// GET /api/agencies/:subtype/:agency
async fn get_agency(
    State(state): State<AppState>,
    Path((subtype, agency)): Path<(String, String)>,
) -> Response {
    run(&state, StatusCode::OK, |engine| engine.get_agency(&subtype, &agency))
}

/// PUT /api/agencies/:subtype/:agency
async fn update_agency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((subtype, agency)): Path<(String, String)>,
    Json(req): Json<AgencyNameRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.update_agency(&subtype, &agency, req.name.as_deref(), &actor)
    })
}

/// PUT /api/agencies/:subtype/:agency/status
async fn change_agency_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((subtype, agency)): Path<(String, String)>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_agency_status(&subtype, &agency, &req.status, &actor)
    })
}

// ============================================================================
// API Handlers - Commerce Plans
// ============================================================================

/// POST /api/plans
async fn create_plan(State(state): State<AppState>, headers: HeaderMap, Json(cmd): Json<NewPlan>) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| engine.create_plan(&cmd, &actor))
}

/// GET /api/plans
async fn list_plans(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_plans(query.status()?, query.page())
    })
}

/// GET /api/plans/:code
async fn get_plan(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    run(&state, StatusCode::OK, |engine| engine.get_plan(&code))
}

/// PUT /api/plans/:code
async fn update_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(changes): Json<PlanChanges>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| engine.update_plan(&code, &changes, &actor))
}

/// PUT /api/plans/:code/status
async fn change_plan_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_plan_status(&code, &req.status, &actor)
    })
}

/// GET /api/plans/:code/items
async fn list_plan_items(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_plan_items(&code, query.status()?, query.page())
    })
}

/// POST /api/plans/:code/items
async fn add_plan_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<ItemRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| {
        engine.add_plan_item(&code, &req.value, &actor)
    })
}

/// POST /api/plans/:code/items/bulk
async fn bulk_add_plan_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<BulkItemsRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.bulk_add_plan_items(&code, &req.values, &actor)
    })
}

/// PUT /api/plans/:code/items/:id/status
async fn change_plan_item_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((code, item_id)): Path<(String, i64)>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_plan_item_status(&code, item_id, &req.status, &actor)
    })
}

/// GET /api/subtypes/:code/plan
async fn get_subtype_plan(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    run(&state, StatusCode::OK, |engine| engine.get_subtype_plan(&code))
}

/// PUT /api/subtypes/:code/plan
async fn assign_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<AssignPlanRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.assign_plan(&code, &req.plan_code, &actor)
    })
}

/// DELETE /api/subtypes/:code/plan
async fn unassign_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| engine.unassign_plan(&code, &actor))
}

// ============================================================================
// API Handlers - Validations & Rules
// ============================================================================

/// POST /api/validations
async fn create_validation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<NewValidation>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| {
        engine.create_validation(&cmd, &actor)
    })
}

/// GET /api/validations
async fn list_validations(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_validations(query.status()?, query.page())
    })
}

/// GET /api/validations/:code
async fn get_validation(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    run(&state, StatusCode::OK, |engine| engine.get_validation(&code))
}

/// PUT /api/validations/:code/status
async fn change_validation_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_validation_status(&code, &req.status, &actor)
    })
}

/// GET /api/subtypes/:code/rules?bin=
async fn list_rules(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    run(&state, StatusCode::OK, |engine| {
        engine.list_rules(&code, query.bin.as_deref(), query.page())
    })
}

/// POST /api/subtypes/:code/rules
async fn attach_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<AttachRuleRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::CREATED, |engine| {
        engine.attach_rule(&code, &req.bin, &req.validation_code, &req.value, &actor)
    })
}

/// PUT /api/subtypes/:code/rules/:bin/:validation
async fn update_rule_value(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((code, bin, validation)): Path<(String, String, String)>,
    Json(req): Json<RuleValueRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.update_rule_value(&code, &bin, &validation, &req.value, &actor)
    })
}

/// PUT /api/subtypes/:code/rules/:bin/:validation/status
async fn change_rule_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((code, bin, validation)): Path<(String, String, String)>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let actor = actor(&state, &headers);
    run(&state, StatusCode::OK, |engine| {
        engine.change_rule_status(&code, &bin, &validation, &req.status, &actor)
    })
}

// ============================================================================
// Main Server
// ============================================================================

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/bins", post(create_bin).get(list_bins))
        .route("/bins/:bin", get(get_bin).put(update_bin))
        .route("/bins/:bin/status", put(change_bin_status))
        .route("/subtypes", post(create_subtype).get(list_subtypes))
        .route("/subtypes/:code", get(get_subtype).put(update_subtype))
        .route("/subtypes/:code/status", put(change_subtype_status))
        .route("/subtypes/:code/agencies", get(list_agencies))
        .route(
            "/subtypes/:code/plan",
            get(get_subtype_plan).put(assign_plan).delete(unassign_plan),
        )
        .route("/subtypes/:code/rules", get(list_rules).post(attach_rule))
        .route("/subtypes/:code/rules/:bin/:validation", put(update_rule_value))
        .route(
            "/subtypes/:code/rules/:bin/:validation/status",
            put(change_rule_status),
        )
        .route("/agencies", post(create_agency))
        .route("/agencies/:subtype/:agency", get(get_agency).put(update_agency))
        .route("/agencies/:subtype/:agency/status", put(change_agency_status))
        .route("/plans", post(create_plan).get(list_plans))
        .route("/plans/:code", get(get_plan).put(update_plan))
        .route("/plans/:code/status", put(change_plan_status))
        .route("/plans/:code/items", get(list_plan_items).post(add_plan_item))
        .route("/plans/:code/items/bulk", post(bulk_add_plan_items))
        .route("/plans/:code/items/:id/status", put(change_plan_item_status))
        .route("/validations", post(create_validation).get(list_validations))
        .route("/validations/:code", get(get_validation))
        .route("/validations/:code/status", put(change_validation_status))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = CatalogConfig::load(config_path.as_deref())?;
    init_logging(&config.logging);

    let conn = open_database(&config.database.path)?;
    info!(path = %config.database.path.display(), "database opened");

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        settings: config.engine_settings(),
        default_actor: config.default_actor.clone(),
    };

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!(bind = %config.server.bind, "catalog server listening");

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
