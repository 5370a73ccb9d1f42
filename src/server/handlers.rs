use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::extract::{run_batch, to_pretty_json};
use crate::pipeline::input::InputFile;
use crate::schema::SchemaCatalog;
use crate::session::{ActiveView, SessionError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct SetViewRequest {
    pub view: ActiveView,
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    pub filename: String,
    pub data_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    /// Catalog schema name.
    #[serde(default)]
    pub schema: Option<String>,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn session_error(e: SessionError) -> Response {
    let status = match e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::NoResults | SessionError::Busy => StatusCode::CONFLICT,
    };
    error_response(status, e.to_string())
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": VERSION,
            "backend": state.extractor.backend(),
            "extractor": state.extractor.describe(),
            "sessions": state.sessions.len(),
        })),
    )
}

/// GET /api/schemas: catalog names, re-read on every call.
pub async fn list_schemas(State(state): State<AppState>) -> Response {
    match SchemaCatalog::load(&state.config.schema_dir) {
        Ok(catalog) => (
            StatusCode::OK,
            Json(serde_json::json!({ "schemas": catalog.names() })),
        )
            .into_response(),
        Err(e) => {
            error!("Schema listing failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/sessions
pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.sessions.create();
    info!(%session_id, "Session created");
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id }))
}

/// GET /api/sessions/{id}
pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.sessions.get(id) {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => session_error(e),
    }
}

/// PUT /api/sessions/{id}/view
pub async fn set_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetViewRequest>,
) -> Response {
    match state.sessions.update(id, |s| s.set_view(req.view)) {
        Ok(Ok(())) => get_session(State(state), Path(id)).await,
        Ok(Err(e)) | Err(e) => session_error(e),
    }
}

/// POST /api/sessions/{id}/extract: run a batch over uploaded images.
///
/// Runs to completion before responding; the result is also kept in the
/// session for `download`.
pub async fn extract(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExtractRequest>,
) -> Response {
    if req.files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no files uploaded");
    }

    let mut files = Vec::with_capacity(req.files.len());
    for upload in req.files {
        let bytes = match STANDARD.decode(upload.data_base64.trim()) {
            Ok(b) => b,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("{}: invalid base64: {e}", upload.filename),
                )
            }
        };
        match InputFile::from_bytes(upload.filename, bytes) {
            Ok(f) => files.push(f),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    let schema = match req.schema.as_deref().filter(|s| !s.is_empty()) {
        Some(name) => {
            let text = SchemaCatalog::load(&state.config.schema_dir).and_then(|c| c.get(name));
            match text {
                Ok(text) => Some(text),
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            }
        }
        None => None,
    };

    let names: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
    match state.sessions.update(id, |s| s.begin_extraction(names)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) | Err(e) => return session_error(e),
    }
    let _running = RunningExtraction {
        state: &state,
        id,
    };

    info!(%id, files = files.len(), "Extraction started");
    let output = run_batch(&files, state.extractor.as_ref(), schema.as_deref(), None).await;
    if !output.failures.is_empty() {
        warn!(%id, failed = output.failures.len(), "Extraction finished with failures");
    }

    match state.sessions.update(id, |s| s.store_results(output.clone())) {
        Ok(()) => (StatusCode::OK, Json(output)).into_response(),
        // Deleted while the batch ran.
        Err(e) => session_error(e),
    }
}

/// Clears the session's in-flight flag when the request ends, including when
/// the client disconnects mid-batch.
struct RunningExtraction<'a> {
    state: &'a AppState,
    id: Uuid,
}

impl Drop for RunningExtraction<'_> {
    fn drop(&mut self) {
        // Gone already if the session was deleted meanwhile.
        let _ = self.state.sessions.update(self.id, |s| s.end_extraction());
    }
}

/// `Content-Disposition` value for a download name.
///
/// Non-ASCII names get an ASCII fallback plus an RFC 5987 `filename*`.
fn content_disposition(name: &str) -> String {
    if name.is_ascii() {
        return format!("attachment; filename=\"{name}\"");
    }
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}

/// GET /api/sessions/{id}/download: the single document or the
/// consolidated array, as an attachment.
pub async fn download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let (name, value) = match state.sessions.get(id).and_then(|s| s.download()) {
        Ok(d) => d,
        Err(e) => return session_error(e),
    };
    let body = match to_pretty_json(&value) {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&name)),
        ],
        body,
    )
        .into_response()
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.sessions.remove(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => session_error(e),
    }
}
