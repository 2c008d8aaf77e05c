//! REST API for the allocation engine.
//!
//! One session corresponds to one shipment-in-progress: it is created from
//! an allocation run and then edited through the registry commands. Every
//! mutation re-triggers the debounced cost estimate for the session.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::allocator::{AllocationResult, AllocatorConfig, allocate};
use crate::config::{ApiConfig, EngineConfig, EstimatorConfig};
use crate::estimator::{
    EstimateRequest, EstimateScheduler, EstimateStatus, HttpCostEstimator, ShippingPriority,
};
use crate::insurance::{self, InsuranceAssignment, TierKind, TierTable};
use crate::manual::{self, ManualBoxInput, ManualPart, WeightMismatch};
use crate::model::{
    BoxId, BoxLine, EngineError, ItemSnapshot, SelectionLine, ShippingBox,
};
use crate::registry::BoxRegistry;
use crate::types::{BoxDims, Grams, Money};

#[derive(Clone)]
struct ApiState {
    engine: EngineConfig,
    estimator: EstimatorConfig,
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

/// One shipment-in-progress: the editable registry plus its estimator.
struct Session {
    registry: BoxRegistry,
    priority: ShippingPriority,
    scheduler: EstimateScheduler<HttpCostEstimator>,
}

impl Session {
    fn new(registry: BoxRegistry, priority: ShippingPriority, estimator: &EstimatorConfig) -> Self {
        let source = estimator.endpoint().and_then(|endpoint| {
            match HttpCostEstimator::new(endpoint.to_string()) {
                Ok(client) => Some(client),
                Err(err) => {
                    eprintln!("⚠️ Could not build estimator client: {err}");
                    None
                }
            }
        });
        Self {
            registry,
            priority,
            scheduler: EstimateScheduler::new(source, estimator.debounce()),
        }
    }

    /// Schedules a fresh cost estimate for the current box set.
    fn trigger_estimate(&self) {
        self.scheduler.trigger(EstimateRequest {
            box_count: self.registry.box_count(),
            total_weight_kg: self.registry.total_weight_g() as f64 / 1000.0,
            declared_value: self.registry.total_value(),
            priority: self.priority,
        });
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>boxwise API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the stateless allocation endpoint.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "lines": [
            {
                "item_id": "PRT-1042",
                "name": "Bearing housing",
                "unit_weight_g": 3000,
                "unit_price": 12000,
                "available_qty": 4,
                "quantity": 1
            }
        ],
        "weight_ceiling_g": 10000
    })
)]
pub struct AllocateRequest {
    pub lines: Vec<SelectionLine>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub weight_ceiling_g: Option<Grams>,
}

/// Response structure with the allocated, insurance-annotated boxes.
#[derive(Serialize, ToSchema)]
pub struct AllocateResponse {
    pub boxes: Vec<ShippingBox>,
    pub box_count: usize,
    pub total_weight_g: Grams,
    pub total_value: Money,
    pub oversized_box_count: usize,
}

impl AllocateResponse {
    fn from_result(result: AllocationResult) -> Self {
        Self {
            box_count: result.box_count(),
            total_weight_g: result.total_weight_g(),
            total_value: result.total_value(),
            oversized_box_count: result.oversized_box_count(),
            boxes: result.boxes,
        }
    }
}

/// Request structure for opening an editable shipment session.
#[derive(Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub lines: Vec<SelectionLine>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub weight_ceiling_g: Option<Grams>,
    #[serde(default)]
    pub priority: ShippingPriority,
}

/// Current state of one shipment session.
#[derive(Serialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    pub boxes: Vec<ShippingBox>,
    pub box_count: usize,
    pub total_weight_g: Grams,
    pub total_value: Money,
    pub estimate: EstimateStatus,
}

/// Request to move part of a line between two boxes.
#[derive(Deserialize, ToSchema)]
pub struct ReassignRequest {
    pub from_box: BoxId,
    pub to_box: BoxId,
    pub item_id: String,
    pub quantity: u32,
}

/// Request to replace a session's boxes with a manual allocation.
#[derive(Deserialize, ToSchema)]
pub struct ManualAllocationRequest {
    pub boxes: Vec<ManualBoxInput>,
}

/// Session state after a manual replacement, plus any weight mismatches
/// between the tool's reported and the recomputed box weights.
#[derive(Serialize, ToSchema)]
pub struct ManualAllocationResponse {
    #[serde(flatten)]
    pub session: SessionView,
    pub weight_mismatches: Vec<WeightMismatch>,
}

/// One box reduced to the shape the submission collaborator expects.
#[derive(Serialize, ToSchema)]
pub struct SubmissionBox {
    pub lines: Vec<BoxLine>,
    pub dims: BoxDims,
}

/// Finalized box list for the shipment-submission collaborator.
#[derive(Serialize, ToSchema)]
pub struct SubmissionResponse {
    pub boxes: Vec<SubmissionBox>,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn engine_error_response(err: &EngineError) -> Response {
    let (status, label) = match err {
        EngineError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data"),
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "Unknown resource"),
        EngineError::InvariantViolation(_) => (StatusCode::CONFLICT, "Invariant violation"),
    };
    error_response(status, label, err.to_string())
}

fn session_not_found(id: Uuid) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "Unknown session",
        format!("No session with id {id}"),
    )
}

fn parse_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(err) => Err(json_deserialize_error(err)),
    }
}

fn allocator_config(engine: &EngineConfig, ceiling: Option<Grams>) -> Result<AllocatorConfig, EngineError> {
    match ceiling {
        Some(weight_ceiling_g) => AllocatorConfig::with_ceiling(weight_ceiling_g),
        None => Ok(engine.allocator_config()),
    }
}

fn session_view(session_id: Uuid, session: &Session) -> SessionView {
    SessionView {
        session_id,
        boxes: session.registry.boxes().to_vec(),
        box_count: session.registry.box_count(),
        total_weight_g: session.registry.total_weight_g(),
        total_value: session.registry.total_value(),
        estimate: session.scheduler.status(),
    }
}

/// Applies one registry command to a session, re-triggers the estimate and
/// returns the updated view. A rejected command maps to its error status
/// with the session untouched.
async fn mutate_session<F>(state: &ApiState, session_id: Uuid, command: F) -> Response
where
    F: FnOnce(&mut Session) -> Result<(), EngineError>,
{
    let mut sessions = state.sessions.lock().await;
    let Some(session) = sessions.get_mut(&session_id) else {
        return session_not_found(session_id);
    };
    match command(session) {
        Ok(()) => {
            session.trigger_estimate();
            (StatusCode::OK, Json(session_view(session_id, session))).into_response()
        }
        Err(err) => engine_error_response(&err),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_allocate,
        handle_create_session,
        handle_get_session,
        handle_close_session,
        handle_add_box,
        handle_remove_box,
        handle_duplicate_box,
        handle_update_dimensions,
        handle_reassign,
        handle_manual_replace,
        handle_submission,
        handle_estimate_stream
    ),
    components(
        schemas(
            AllocateRequest,
            AllocateResponse,
            CreateSessionRequest,
            SessionView,
            ReassignRequest,
            ManualAllocationRequest,
            ManualAllocationResponse,
            SubmissionBox,
            SubmissionResponse,
            ErrorResponse,
            SelectionLine,
            ItemSnapshot,
            ShippingBox,
            BoxLine,
            BoxId,
            BoxDims,
            InsuranceAssignment,
            TierKind,
            ManualBoxInput,
            ManualPart,
            WeightMismatch,
            EstimateStatus,
            ShippingPriority
        )
    ),
    tags(
        (name = "allocation", description = "Stateless box allocation"),
        (name = "sessions", description = "Editable shipment sessions")
    )
)]
struct ApiDoc;

/// Starts the API server.
///
/// Configures CORS for cross-origin requests from the dashboard frontend.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    engine: EngineConfig,
    estimator: EstimatorConfig,
) {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState {
        engine,
        estimator,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = Router::new()
        // Stateless allocation
        .route("/allocate", post(handle_allocate))
        // Shipment sessions
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_close_session),
        )
        .route("/sessions/{id}/boxes", post(handle_add_box))
        .route("/sessions/{id}/boxes/{box_id}", delete(handle_remove_box))
        .route(
            "/sessions/{id}/boxes/{box_id}/duplicate",
            post(handle_duplicate_box),
        )
        .route(
            "/sessions/{id}/boxes/{box_id}/dimensions",
            put(handle_update_dimensions),
        )
        .route("/sessions/{id}/reassign", post(handle_reassign))
        .route("/sessions/{id}/manual", put(handle_manual_replace))
        .route("/sessions/{id}/submission", get(handle_submission))
        .route("/sessions/{id}/estimate/stream", get(handle_estimate_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            panic!("❌ Could not bind API server to {}: {}", addr, err);
        }
    };

    let display_host = config.display_host().to_string();
    println!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("📦 API Endpoints:");
    println!("   - POST /allocate");
    println!("   - POST /sessions");
    println!("   - GET/POST/PUT/DELETE /sessions/{{id}}/...");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /allocate.
///
/// Runs one allocation pass over the supplied selection lines and annotates
/// each resulting box with its recommended insurance tier. Stateless; use
/// POST /sessions for an editable result.
#[utoipa::path(
    post,
    path = "/allocate",
    request_body = AllocateRequest,
    responses(
        (status = 200, description = "Successfully allocated boxes", body = AllocateResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid selection lines or weight ceiling",
            body = ErrorResponse
        )
    ),
    tag = "allocation"
)]
async fn handle_allocate(
    State(state): State<ApiState>,
    payload: Result<Json<AllocateRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let result = allocator_config(&state.engine, request.weight_ceiling_g)
        .and_then(|config| allocate(&request.lines, &config));
    let mut result = match result {
        Ok(result) => result,
        Err(err) => return engine_error_response(&err),
    };

    let table = TierTable::default();
    for package in &mut result.boxes {
        package.insurance = Some(insurance::recommend(package.value, &table));
    }

    println!(
        "📥 Allocation request: {} lines -> {} boxes",
        request.lines.len(),
        result.box_count()
    );
    (StatusCode::OK, Json(AllocateResponse::from_result(result))).into_response()
}

/// Handler for POST /sessions.
///
/// Allocates the selection into boxes and opens an editable session holding
/// the result. The first cost estimate is triggered immediately.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionView),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid selection lines or weight ceiling",
            body = ErrorResponse
        )
    ),
    tag = "sessions"
)]
async fn handle_create_session(
    State(state): State<ApiState>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let outcome = allocator_config(&state.engine, request.weight_ceiling_g)
        .and_then(|config| allocate(&request.lines, &config))
        .and_then(|result| {
            BoxRegistry::new(result.boxes, result.catalog, TierTable::default())
        });
    let registry = match outcome {
        Ok(registry) => registry,
        Err(err) => return engine_error_response(&err),
    };

    let session = Session::new(registry, request.priority, &state.estimator);
    session.trigger_estimate();

    let session_id = Uuid::new_v4();
    let view = session_view(session_id, &session);
    state.sessions.lock().await.insert(session_id, session);

    println!(
        "📦 Session {} opened with {} boxes",
        session_id, view.box_count
    );
    (StatusCode::CREATED, Json(view)).into_response()
}

/// Handler for GET /sessions/{id}.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Current session state", body = SessionView),
        (status = NOT_FOUND, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_get_session(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let sessions = state.sessions.lock().await;
    match sessions.get(&id) {
        Some(session) => (StatusCode::OK, Json(session_view(id, session))).into_response(),
        None => session_not_found(id),
    }
}

/// Handler for DELETE /sessions/{id}.
///
/// Discards a shipment-in-progress, typically after its submission payload
/// was handed to the shipment collaborator. Dropping the session also drops
/// its estimate scheduler.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session discarded"),
        (status = NOT_FOUND, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_close_session(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    match state.sessions.lock().await.remove(&id) {
        Some(_) => {
            println!("📦 Session {} discarded", id);
            StatusCode::NO_CONTENT.into_response()
        }
        None => session_not_found(id),
    }
}

/// Handler for POST /sessions/{id}/boxes.
///
/// Appends a new empty box with default dimensions. Always succeeds for a
/// known session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/boxes",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Box added", body = SessionView),
        (status = NOT_FOUND, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_add_box(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    mutate_session(&state, id, |session| {
        session.registry.add_box();
        Ok(())
    })
    .await
}

/// Handler for DELETE /sessions/{id}/boxes/{box_id}.
///
/// Removing the last remaining box is an invariant violation and is
/// rejected with 409.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/boxes/{box_id}",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("box_id" = Uuid, Path, description = "Box id")
    ),
    responses(
        (status = 200, description = "Box removed", body = SessionView),
        (status = NOT_FOUND, description = "Unknown session or box", body = ErrorResponse),
        (status = CONFLICT, description = "Last box cannot be removed", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_remove_box(
    State(state): State<ApiState>,
    Path((id, box_id)): Path<(Uuid, Uuid)>,
) -> Response {
    mutate_session(&state, id, |session| {
        session.registry.remove_box(BoxId(box_id))
    })
    .await
}

/// Handler for POST /sessions/{id}/boxes/{box_id}/duplicate.
#[utoipa::path(
    post,
    path = "/sessions/{id}/boxes/{box_id}/duplicate",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("box_id" = Uuid, Path, description = "Box id")
    ),
    responses(
        (status = 200, description = "Box duplicated", body = SessionView),
        (status = NOT_FOUND, description = "Unknown session or box", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_duplicate_box(
    State(state): State<ApiState>,
    Path((id, box_id)): Path<(Uuid, Uuid)>,
) -> Response {
    mutate_session(&state, id, |session| {
        session.registry.duplicate_box(BoxId(box_id)).map(|_| ())
    })
    .await
}

/// Handler for PUT /sessions/{id}/boxes/{box_id}/dimensions.
#[utoipa::path(
    put,
    path = "/sessions/{id}/boxes/{box_id}/dimensions",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("box_id" = Uuid, Path, description = "Box id")
    ),
    request_body = BoxDims,
    responses(
        (status = 200, description = "Dimensions updated", body = SessionView),
        (status = NOT_FOUND, description = "Unknown session or box", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid dimensions", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_update_dimensions(
    State(state): State<ApiState>,
    Path((id, box_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<BoxDims>, JsonRejection>,
) -> Response {
    let dims = match parse_json(payload) {
        Ok(dims) => dims,
        Err(response) => return response,
    };
    mutate_session(&state, id, |session| {
        session.registry.update_dimensions(BoxId(box_id), dims)
    })
    .await
}

/// Handler for POST /sessions/{id}/reassign.
///
/// Moves a quantity of one item between two boxes; both boxes are fully
/// recomputed afterwards.
#[utoipa::path(
    post,
    path = "/sessions/{id}/reassign",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ReassignRequest,
    responses(
        (status = 200, description = "Line reassigned", body = SessionView),
        (status = NOT_FOUND, description = "Unknown session, box or item", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid reassignment", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_reassign(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    mutate_session(&state, id, |session| {
        session.registry.reassign_line(
            request.from_box,
            request.to_box,
            &request.item_id,
            request.quantity,
        )
    })
    .await
}

/// Handler for PUT /sessions/{id}/manual.
///
/// Replaces the session's boxes with the adapted output of the external
/// manual-packing tool. Weight mismatches between reported and recomputed
/// box weights are returned alongside the new state, not treated as errors.
#[utoipa::path(
    put,
    path = "/sessions/{id}/manual",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ManualAllocationRequest,
    responses(
        (status = 200, description = "Boxes replaced", body = ManualAllocationResponse),
        (status = NOT_FOUND, description = "Unknown session or part", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid manual allocation", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_manual_replace(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ManualAllocationRequest>, JsonRejection>,
) -> Response {
    let request = match parse_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let mut sessions = state.sessions.lock().await;
    let Some(session) = sessions.get_mut(&id) else {
        return session_not_found(id);
    };

    let table = TierTable::default();
    let outcome = manual::adapt(&request.boxes, session.registry.catalog(), &table)
        .and_then(|adaptation| {
            let registry = BoxRegistry::new(
                adaptation.boxes,
                session.registry.catalog().clone(),
                table.clone(),
            )?;
            Ok((registry, adaptation.weight_mismatches))
        });
    match outcome {
        Ok((registry, weight_mismatches)) => {
            session.registry = registry;
            session.trigger_estimate();
            let response = ManualAllocationResponse {
                session: session_view(id, session),
                weight_mismatches,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => engine_error_response(&err),
    }
}

/// Handler for GET /sessions/{id}/submission.
///
/// Reduces the current box set to the shape the shipment-submission
/// collaborator expects.
#[utoipa::path(
    get,
    path = "/sessions/{id}/submission",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Submission payload", body = SubmissionResponse),
        (status = NOT_FOUND, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_submission(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let sessions = state.sessions.lock().await;
    let Some(session) = sessions.get(&id) else {
        return session_not_found(id);
    };
    let boxes = session
        .registry
        .boxes()
        .iter()
        .map(|package| SubmissionBox {
            lines: package.lines.clone(),
            dims: package.dims,
        })
        .collect();
    (StatusCode::OK, Json(SubmissionResponse { boxes })).into_response()
}

/// Handler for GET /sessions/{id}/estimate/stream (SSE).
///
/// Streams cost-estimate status changes for the session as Server-Sent
/// Events, starting with the current status. Superseded estimates never
/// appear on the stream; only the latest issued request's outcome does.
#[utoipa::path(
    get,
    path = "/sessions/{id}/estimate/stream",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (
            status = 200,
            description = "Streams estimate status changes",
            content_type = "text/event-stream",
            body = String
        ),
        (status = NOT_FOUND, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "sessions"
)]
async fn handle_estimate_stream(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let receiver = {
        let sessions = state.sessions.lock().await;
        match sessions.get(&id) {
            Some(session) => session.scheduler.subscribe(),
            None => return session_not_found(id),
        }
    };

    let stream = WatchStream::new(receiver).filter_map(|status| {
        serde_json::to_string(&status)
            .ok()
            .map(|json| Ok::<_, std::convert::Infallible>(Event::default().data(json)))
    });
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::line;

    fn test_state() -> ApiState {
        ApiState {
            engine: EngineConfig::default_for_tests(),
            estimator: EstimatorConfig::disabled_for_tests(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn create_request() -> CreateSessionRequest {
        CreateSessionRequest {
            lines: vec![line("A", 3000, 100, 1), line("B", 8000, 30_000, 1)],
            weight_ceiling_g: None,
            priority: ShippingPriority::Standard,
        }
    }

    async fn open_session(state: &ApiState) -> Uuid {
        let response =
            handle_create_session(State(state.clone()), Ok(Json(create_request()))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        *state
            .sessions
            .lock()
            .await
            .keys()
            .next()
            .expect("session was stored")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in [
            "/allocate",
            "/sessions",
            "/sessions/{id}",
            "/sessions/{id}/boxes",
            "/sessions/{id}/boxes/{box_id}",
            "/sessions/{id}/boxes/{box_id}/duplicate",
            "/sessions/{id}/boxes/{box_id}/dimensions",
            "/sessions/{id}/reassign",
            "/sessions/{id}/manual",
            "/sessions/{id}/submission",
            "/sessions/{id}/estimate/stream",
        ] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in [
            "AllocateRequest",
            "AllocateResponse",
            "SessionView",
            "ManualBoxInput",
            "EstimateStatus",
            "ErrorResponse",
        ] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn allocate_request_parses_optional_ceiling() {
        let json = r#"{
            "lines": [{
                "item_id": "A",
                "name": "Item A",
                "unit_weight_g": 3000,
                "unit_price": 100,
                "available_qty": 1,
                "quantity": 1
            }]
        }"#;
        let request: AllocateRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.weight_ceiling_g, None);

        let json = r#"{
            "lines": [{
                "item_id": "A",
                "name": "Item A",
                "unit_weight_g": 3000,
                "unit_price": 100,
                "available_qty": 1,
                "quantity": 1
            }],
            "weight_ceiling_g": 5000
        }"#;
        let request: AllocateRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.weight_ceiling_g, Some(5000));
    }

    #[tokio::test]
    async fn allocate_endpoint_annotates_insurance() {
        let state = test_state();
        let request = AllocateRequest {
            lines: vec![line("A", 2000, 30_000, 1)],
            weight_ceiling_g: None,
        };
        let response = handle_allocate(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn allocate_endpoint_rejects_invalid_lines() {
        let state = test_state();
        let request = AllocateRequest {
            lines: Vec::new(),
            weight_ceiling_g: None,
        };
        let response = handle_allocate(State(state), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn session_lifecycle_roundtrip() {
        let state = test_state();
        let id = open_session(&state).await;

        let response = handle_get_session(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_add_box(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Three boxes now; removing one works, removing the added one again
        // by unknown id does not.
        let box_id = {
            let sessions = state.sessions.lock().await;
            sessions[&id].registry.boxes()[2].id
        };
        let response =
            handle_remove_box(State(state.clone()), Path((id, box_id.0))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            handle_remove_box(State(state.clone()), Path((id, Uuid::new_v4()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn removing_the_final_box_maps_to_conflict() {
        let state = test_state();
        let response = handle_create_session(
            State(state.clone()),
            Ok(Json(CreateSessionRequest {
                lines: vec![line("A", 2000, 100, 1)],
                weight_ceiling_g: None,
                priority: ShippingPriority::Standard,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let id = *state.sessions.lock().await.keys().next().unwrap();
        let box_id = {
            let sessions = state.sessions.lock().await;
            sessions[&id].registry.boxes()[0].id
        };
        let response = handle_remove_box(State(state.clone()), Path((id, box_id.0))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // The box is still there.
        let sessions = state.sessions.lock().await;
        assert_eq!(sessions[&id].registry.box_count(), 1);
    }

    #[tokio::test]
    async fn unknown_session_maps_to_not_found() {
        let state = test_state();
        let response = handle_get_session(State(state.clone()), Path(Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_add_box(State(state), Path(Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn closed_session_is_discarded() {
        let state = test_state();
        let id = open_session(&state).await;

        let response = handle_close_session(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.sessions.lock().await.is_empty());

        // The session is gone for every follow-up request.
        let response = handle_get_session(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = handle_close_session(State(state), Path(id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_replacement_swaps_the_box_set() {
        let state = test_state();
        let id = open_session(&state).await;

        let request = ManualAllocationRequest {
            boxes: vec![ManualBoxInput {
                box_number: 1,
                parts: vec![ManualPart {
                    item_id: "A".to_string(),
                    quantity: 1,
                }],
                dims: BoxDims::default(),
                total_weight_g: 3000,
            }],
        };
        let response =
            handle_manual_replace(State(state.clone()), Path(id), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let sessions = state.sessions.lock().await;
        assert_eq!(sessions[&id].registry.box_count(), 1);
        assert_eq!(
            sessions[&id].registry.boxes()[0].id,
            BoxId::for_manual_box_number(1)
        );
    }

    #[tokio::test]
    async fn submission_reduces_boxes_to_lines_and_dims() {
        let state = test_state();
        let id = open_session(&state).await;
        let response = handle_submission(State(state), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
