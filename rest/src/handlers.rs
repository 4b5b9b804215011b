use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Path, Request, State},
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nbgwas_common::{
    query_status, read_done_task, ErrorResponse, Payload, StatusKind, StatusReport, SubmitError,
    SubmitResponse, TaskKind,
};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{form::SubmitForm, state::AppState};

const DESCRIPTION: &str = "Network Boosted GWAS: propagates GWAS seed genes over a \
molecular network. POST /nbgwas/tasks or /nbgwas/snpanalyzer to submit, \
GET /nbgwas/tasks/{id} to query.";

pub fn build_router(state: AppState) -> Router {
    let body_limit = match state.config.max_upload_bytes {
        0 => DefaultBodyLimit::disable(),
        max => DefaultBodyLimit::max(max),
    };

    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .route("/nbgwas", post(submit_and_wait))
        .route("/nbgwas/tasks", post(submit_network_task))
        .route("/nbgwas/snpanalyzer", post(submit_snp_task))
        .route("/nbgwas/tasks/:id", get(get_task).delete(delete_task))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- respuestas ---------------- */

fn error_response(err: &SubmitError) -> Response {
    if err.is_validation() {
        warn!("pedido rechazado: {}", err);
    } else {
        error!("error interno al encolar tarea: {}", err);
    }
    // 500 en ambos casos, el cuerpo dice cuál fue
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

fn status_code_for(report: &StatusReport) -> StatusCode {
    match report.status {
        StatusKind::Notfound => StatusCode::GONE,
        StatusKind::Error => StatusCode::INTERNAL_SERVER_ERROR,
        StatusKind::Submitted | StatusKind::Processing | StatusKind::Done => StatusCode::OK,
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn describe() -> &'static str {
    DESCRIPTION
}

async fn health() -> &'static str {
    "ok"
}

type FormParser = fn(&SubmitForm) -> Result<(TaskKind, Vec<Payload>), SubmitError>;

// Lee el formulario, lo convierte en tarea y la deja en submitted
async fn enqueue(
    state: &AppState,
    addr: SocketAddr,
    request: Request,
    parse: FormParser,
) -> Result<String, SubmitError> {
    let form = SubmitForm::from_request(request, &state.config.spool_dir()).await?;
    let (kind, payloads) = parse(&form)?;
    let remote_ip = addr.ip().to_string();
    // al soltar `form` se borran los temporales que no se movieron
    state.store.submit(&remote_ip, kind, payloads)
}

fn accepted(state: &AppState, task_id: String) -> Response {
    let location = format!("{}/nbgwas/tasks/{}", state.config.location_prefix, task_id);
    (
        StatusCode::ACCEPTED,
        [(LOCATION, location.clone())],
        Json(SubmitResponse { task_id, location }),
    )
        .into_response()
}

async fn submit_network_task(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    match enqueue(&state, addr, request, SubmitForm::into_network_task).await {
        Ok(task_id) => accepted(&state, task_id),
        Err(e) => error_response(&e),
    }
}

async fn submit_snp_task(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    match enqueue(&state, addr, request, SubmitForm::into_snp_task).await {
        Ok(task_id) => accepted(&state, task_id),
        Err(e) => error_response(&e),
    }
}

// Estado de una tarea; no toca el disco más allá de leer
async fn get_task(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> (StatusCode, Json<StatusReport>) {
    let hint = addr.ip().to_string();
    let report = query_status(&state.store, &id, Some(hint.as_str()));
    (status_code_for(&report), Json(report))
}

async fn delete_task(Path(id): Path<String>) -> (StatusCode, &'static str) {
    info!("se pidió borrar la tarea {}, no soportado", id);
    (StatusCode::SERVICE_UNAVAILABLE, "Task deletion is not supported")
}

// Endpoint viejo: encola una tarea de red y mantiene la conexión hasta que termina
async fn submit_and_wait(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let task_id = match enqueue(&state, addr, request, SubmitForm::into_network_task).await {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };

    let hint = addr.ip().to_string();
    let done = state
        .store
        .wait_until_done(
            &task_id,
            Some(hint.as_str()),
            state.config.wait_count,
            state.config.sleep_time,
        )
        .await;

    let Some(taskdir) = done else {
        warn!("la tarea {} no terminó a tiempo", task_id);
        let report = StatusReport::of(StatusKind::Notfound);
        return (status_code_for(&report), Json(report)).into_response();
    };

    let report = read_done_task(&taskdir);
    match (report.status, report.result) {
        (StatusKind::Done, Some(result)) => (StatusCode::OK, Json(result)).into_response(),
        (status, result) => {
            let report = StatusReport {
                status,
                result,
                message: report.message,
            };
            (status_code_for(&report), Json(report)).into_response()
        }
    }
}
