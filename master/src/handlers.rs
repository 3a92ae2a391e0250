use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    ExecuteGraphRequest, GraphInfo, GraphStatus, OutputLines, PartitionInfo, PartitionQuery,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::{lock, AppState};
use crate::validate::check_graph;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/graphs", post(execute_graph).get(list_graphs))
        .route("/api/v1/graphs/:id", get(get_graph))
        .route("/api/v1/partitions", get(list_partitions))
        .route("/api/v1/output", post(write_output).get(read_output))
        .route("/api/v1/log", post(log_line))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Recibe un grafo resuelto. Se guarda siempre; si no valida queda como Rejected
async fn execute_graph(
    State(state): State<AppState>,
    Json(req): Json<ExecuteGraphRequest>,
) -> (StatusCode, Json<GraphInfo>) {
    let graph_id = uuid::Uuid::new_v4().to_string();

    let (status, info) = match check_graph(&state.runtime, &req) {
        Ok(jobs) => {
            info!(
                "grafo {} aceptado: raíz {} con {} jobs",
                graph_id,
                req.root_job_id,
                jobs.len()
            );
            let info = GraphInfo {
                id: graph_id,
                root_job_id: req.root_job_id,
                root_op: jobs.first().map(|j| j.op().to_string()),
                status: GraphStatus::Accepted,
                jobs,
                submitted_at: Utc::now(),
                error: None,
            };
            (StatusCode::OK, info)
        }
        Err(e) => {
            warn!("grafo {} rechazado (raíz {}): {:#}", graph_id, req.root_job_id, e);
            let info = GraphInfo {
                id: graph_id,
                root_job_id: req.root_job_id,
                root_op: None,
                status: GraphStatus::Rejected,
                jobs: Vec::new(),
                submitted_at: Utc::now(),
                error: Some(format!("{:#}", e)),
            };
            (StatusCode::UNPROCESSABLE_ENTITY, info)
        }
    };

    lock(&state.graphs).push(info.clone());
    (status, Json(info))
}

async fn list_graphs(State(state): State<AppState>) -> Json<Vec<GraphInfo>> {
    Json(lock(&state.graphs).clone())
}

async fn get_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GraphInfo>, StatusCode> {
    let graphs = lock(&state.graphs);

    if let Some(graph) = graphs.iter().find(|g| g.id == id) {
        Ok(Json(graph.clone()))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn list_partitions(
    State(state): State<AppState>,
    Query(q): Query<PartitionQuery>,
) -> Result<Json<Vec<PartitionInfo>>, (StatusCode, String)> {
    match state.catalog.list_text(&q.table, &q.from, &q.until) {
        Ok(parts) => {
            info!(
                "particiones de {} en [{}, {}): {}",
                q.table,
                q.from,
                q.until,
                parts.len()
            );
            Ok(Json(parts))
        }
        Err(e) => Err((StatusCode::BAD_REQUEST, format!("{:#}", e))),
    }
}

async fn write_output(State(state): State<AppState>, body: String) -> StatusCode {
    info!("salida: {} bytes", body.len());
    lock(&state.outputs).push(body);
    StatusCode::NO_CONTENT
}

async fn read_output(State(state): State<AppState>) -> Json<OutputLines> {
    Json(OutputLines {
        lines: lock(&state.outputs).clone(),
    })
}

async fn log_line(body: String) -> StatusCode {
    info!(target: "script_log", "{}", body);
    StatusCode::NO_CONTENT
}
