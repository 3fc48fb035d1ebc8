use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Router,
    Json,
    http::Method,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use crate::{
    AppState,
    controller::{AnalysisOutcome, Completion, Snapshot, UploadTicket},
    error::AppError,
    models::{ChartSelection, View},
    services::{ingest, prompt::SUGGESTED_QUESTIONS},
};
use tower_http::cors::{CorsLayer, Any};

/// Headroom for multipart framing on top of the configured file size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn routes(max_file_size: usize) -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/workbook", get(current_state))
        .route(
            "/workbook/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_file_size + MULTIPART_OVERHEAD)),
        )
        .route("/workbook/reset", post(reset))
        .route("/workbook/sheet", post(switch_sheet))
        .route("/workbook/view", post(set_view))
        .route("/workbook/rows", get(table_rows))
        .route("/workbook/sort", post(sort_rows))
        .route("/workbook/columns", get(axis_options))
        .route("/workbook/chart", post(select_chart))
        .route("/workbook/analyze", post(analyze))
        .route("/analysis/suggestions", get(suggestions))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct SheetRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    view: View,
}

#[derive(Debug, Deserialize)]
pub struct SortRequest {
    column: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    question: String,
}

fn nothing_loaded() -> AppError {
    AppError::InvalidInput("No file has been loaded.".to_string())
}

async fn current_state(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.controller.lock().snapshot())
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("Uploaded file has no name".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;

        return Ok((file_name, data));
    }

    Err(AppError::InvalidInput("No file provided".to_string()))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Snapshot>, AppError> {
    let (file_name, data) = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(err) => return Err(state.controller.lock().reject_upload(err)),
    };
    tracing::info!("Received upload {} ({}KB)", file_name, data.len() / 1024);

    if data.len() > state.config.max_file_size {
        let err = AppError::InvalidInput(format!(
            "File is too large ({} bytes, limit is {} bytes).",
            data.len(),
            state.config.max_file_size
        ));
        return Err(state.controller.lock().reject_upload(err));
    }

    let ticket = state.controller.lock().begin_upload(&file_name)?;
    parse_upload(Arc::clone(&state), ticket, data).await?;

    Ok(Json(state.controller.lock().snapshot()))
}

/// Parses on the blocking pool and records the result there, so the upload still completes
/// if the request that started it goes away.
async fn parse_upload(
    state: Arc<AppState>,
    ticket: UploadTicket,
    data: Bytes,
) -> Result<Completion, AppError> {
    let worker_state = Arc::clone(&state);
    let job = ticket.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        let result = ingest::ingest(&job.file_name, job.format, data);
        worker_state.controller.lock().complete_upload(&job, result)
    })
    .await;

    match parsed {
        Ok(completion) => completion,
        Err(err) => state.controller.lock().complete_upload(&ticket, Err(err.into())),
    }
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    let mut controller = state.controller.lock();
    controller.reset();
    Json(controller.snapshot())
}

async fn switch_sheet(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SheetRequest>,
) -> Result<Json<Snapshot>, AppError> {
    let mut controller = state.controller.lock();
    controller.switch_sheet(request.index)?;
    Ok(Json(controller.snapshot()))
}

async fn set_view(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ViewRequest>,
) -> Json<Snapshot> {
    let mut controller = state.controller.lock();
    controller.set_view(request.view);
    Json(controller.snapshot())
}

async fn table_rows(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let controller = state.controller.lock();
    let view = controller.table_view().ok_or_else(nothing_loaded)?;
    Ok(Json(serde_json::to_value(view)?))
}

async fn sort_rows(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SortRequest>,
) -> Result<Json<Value>, AppError> {
    let mut controller = state.controller.lock();
    controller.request_sort(&request.column)?;
    let view = controller.table_view().ok_or_else(nothing_loaded)?;
    Ok(Json(serde_json::to_value(view)?))
}

async fn axis_options(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let options = state.controller.lock().axis_options().ok_or_else(nothing_loaded)?;
    Ok(Json(serde_json::to_value(options)?))
}

async fn select_chart(
    State(state): State<Arc<AppState>>,
    Json(selection): Json<ChartSelection>,
) -> Result<Json<Value>, AppError> {
    let mut controller = state.controller.lock();
    controller.select_chart(selection)?;
    let chart = controller.chart().ok_or_else(nothing_loaded)?;
    Ok(Json(serde_json::to_value(chart)?))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisOutcome>, AppError> {
    let start = std::time::Instant::now();
    let ticket = state
        .controller
        .lock()
        .begin_analysis(&request.question, state.config.analysis_sample_rows)?;

    let request_id = ticket.request_id;

    // Detached: the answer is recorded even when the caller stops waiting for it.
    let worker_state = Arc::clone(&state);
    let job = ticket.clone();
    let answered = tokio::spawn(async move {
        let result = worker_state.analyst.generate(&job.prompt).await;
        let outcome = worker_state.controller.lock().complete_analysis(&job, result);
        outcome
    })
    .await;

    let outcome = match answered {
        Ok(outcome) => outcome?,
        Err(err) => state.controller.lock().complete_analysis(&ticket, Err(err.into()))?,
    };
    tracing::info!("Analysis request {} finished in {:?}", request_id, start.elapsed());
    Ok(Json(outcome))
}

async fn suggestions() -> Json<Vec<&'static str>> {
    Json(SUGGESTED_QUESTIONS.to_vec())
}
