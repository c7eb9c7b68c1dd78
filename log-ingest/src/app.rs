use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK},
        HeaderName, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, warn};

use crate::fetch::TimeRange;
use crate::pipeline::{IngestionPipeline, RunOutcome};
use crate::row::WarehouseRow;

pub const RECENT_LOGS_LIMIT: usize = 100;

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub services: Arc<Vec<String>>,
    pub range: TimeRange,
    pub run_lock: Arc<Semaphore>,
}

impl AppState {
    pub fn new(pipeline: IngestionPipeline, services: Vec<String>, range: TimeRange) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            services: Arc::new(services),
            range,
            run_lock: Arc::new(Semaphore::new(1)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub processed: usize,
    pub conversion_failures: usize,
}

impl From<RunOutcome> for ProcessResponse {
    fn from(outcome: RunOutcome) -> Self {
        let status = match outcome {
            RunOutcome::NoEntries => "No log entries to process",
            RunOutcome::Ingested(_) => "Logs processed successfully",
        };

        Self {
            status,
            processed: outcome.processed(),
            conversion_failures: outcome.conversion_failures(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentLogsResponse {
    pub logs: Vec<WarehouseRow>,
    pub last_updated: String,
}

impl RecentLogsResponse {
    pub fn new(logs: Vec<WarehouseRow>, at: DateTime<Utc>) -> Self {
        Self {
            logs,
            last_updated: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Any origin may call the API with credentials; browsers get the origin
/// echoed back since a wildcard is not allowed alongside credentials.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([LINK])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(liveness))
        .route("/_readiness", get(readiness))
        .route("/health", get(health));

    Router::new()
        .route("/process", post(process))
        .route("/logs", get(recent_logs))
        .merge(health_routes)
        .layer(cors_layer())
        .with_state(state)
}

async fn index() -> &'static str {
    "log-ingest service"
}

async fn liveness() -> &'static str {
    "ok"
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness(State(state): State<AppState>) -> Result<&'static str, StatusCode> {
    state
        .pipeline
        .inserter()
        .warehouse()
        .health_check()
        .await
        .map_err(|e| {
            warn!(error = %e, "warehouse health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok("ok")
}

/// Runs the pipeline over the configured services and date range. Requests
/// queue behind the run lock, so at most one run is in flight.
async fn process(State(state): State<AppState>) -> Response {
    let Ok(_permit) = state.run_lock.acquire().await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    match state.pipeline.run(&state.services, &state.range).await {
        Ok(outcome) => Json(ProcessResponse::from(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// The newest rows in the configured table, latest first.
async fn recent_logs(State(state): State<AppState>) -> Response {
    let inserter = state.pipeline.inserter();
    let result = inserter
        .warehouse()
        .recent_rows(inserter.dataset(), inserter.table(), RECENT_LOGS_LIMIT)
        .await;

    match result {
        Ok(logs) => Json(RecentLogsResponse::new(logs, Utc::now())).into_response(),
        Err(e) => {
            error!(error = %e, "failed to read recent logs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch logs",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
