//! # API REST
//!
//! REST API implementation for the fleischchan letter board.
//!
//! Handles:
//! - HTTP endpoints with axum under `/api/v1/letters` and `/api/v1/files`
//! - Multipart uploads and file downloads with `Content-Disposition`
//! - OpenAPI documentation at `/api-docs/openapi.json`
//!
//! Storage work is synchronous and runs on tokio's blocking pool.

#![warn(rust_2018_idioms)]

pub mod models;
mod upload;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use fleischchan_core::{Board, BoardError};
use std::io;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

use models::{AttachImageReq, FileRecordRes, HealthRes, LetterReq, LetterRes};

/// Largest accepted request body, multipart framing included.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Name of the multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

type ApiError = (StatusCode, &'static str);

/// Application state for the REST API server
#[derive(Clone)]
struct AppState {
    board: Board,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_letters,
        get_letter,
        create_letter,
        update_letter,
        delete_letter,
        attach_image,
        upload_file,
        get_file,
        serve_file_content,
    ),
    components(schemas(HealthRes, FileRecordRes, LetterRes, LetterReq, AttachImageReq))
)]
pub struct ApiDoc;

/// Builds the application router.
pub fn router(board: Board) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/api/v1/letters", get(list_letters).post(create_letter))
        .route(
            "/api/v1/letters/:id",
            get(get_letter).put(update_letter).delete(delete_letter),
        )
        .route("/api/v1/letters/:id/attachedImage", put(attach_image))
        .route("/api/v1/files", post(upload_file))
        .route("/api/v1/files/", post(upload_file))
        .route("/api/v1/files/:id", get(get_file))
        .route("/api/v1/files/:file_ref/content", get(serve_file_content))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(AppState { board })
}

/// Binds `addr` and serves the API until the process is stopped.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails while running.
pub async fn serve(board: Board, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("-- Serving fleischchan REST API on {}", listener.local_addr()?);
    axum::serve(listener, router(board)).await?;
    Ok(())
}

/// Maps a core error to a status code, logging server-side failures.
fn board_error(operation: &str, e: BoardError) -> ApiError {
    if e.is_invalid_input() {
        tracing::warn!("{} rejected: {}", operation, e);
        (StatusCode::BAD_REQUEST, "Bad request")
    } else if e.is_not_found() {
        tracing::debug!("{}: {}", operation, e);
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        tracing::error!("{} error: {:?}", operation, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }
}

/// Runs storage work on the blocking pool.
async fn blocking<T, F>(operation: &'static str, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, BoardError> + Send + 'static,
    T: Send + 'static,
{
    join(operation, tokio::task::spawn_blocking(work)).await
}

/// Waits for blocking storage work and maps its outcome.
async fn join<T>(
    operation: &'static str,
    task: JoinHandle<Result<T, BoardError>>,
) -> Result<T, ApiError> {
    match task.await {
        Ok(result) => result.map_err(|e| board_error(operation, e)),
        Err(e) => {
            tracing::error!("{} task failed: {:?}", operation, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

/// Renders a `Content-Disposition` value that cannot break out of its quotes.
fn content_disposition(original_name: &str) -> String {
    let safe: String = original_name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "fleischchan REST API is alive".into(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/api/v1/letters",
    responses(
        (status = 200, description = "All letters, newest first", body = [LetterRes]),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
async fn list_letters(State(state): State<AppState>) -> Result<Json<Vec<LetterRes>>, ApiError> {
    let letters = state
        .board
        .letters
        .list_letters()
        .map_err(|e| board_error("List letters", e))?;
    Ok(Json(letters.into_iter().map(LetterRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/letters/{id}",
    params(("id" = i32, Path, description = "Letter id")),
    responses(
        (status = 200, description = "The letter", body = LetterRes),
        (status = 404, description = "No such letter")
    )
)]
#[axum::debug_handler]
async fn get_letter(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i32>,
) -> Result<Json<LetterRes>, ApiError> {
    let letter = state
        .board
        .letters
        .get_letter(id)
        .map_err(|e| board_error("Get letter", e))?;
    Ok(Json(letter.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/letters",
    request_body = LetterReq,
    responses(
        (status = 200, description = "Letter created", body = LetterRes),
        (status = 400, description = "A field exceeds its maximum length"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
async fn create_letter(
    State(state): State<AppState>,
    Json(req): Json<LetterReq>,
) -> Result<Json<LetterRes>, ApiError> {
    let letter = state
        .board
        .letters
        .create(req.into())
        .map_err(|e| board_error("Create letter", e))?;
    Ok(Json(letter.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/letters/{id}",
    params(("id" = i32, Path, description = "Letter id")),
    request_body = LetterReq,
    responses(
        (status = 200, description = "Letter updated", body = LetterRes),
        (status = 400, description = "A field exceeds its maximum length"),
        (status = 404, description = "No such letter")
    )
)]
#[axum::debug_handler]
async fn update_letter(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i32>,
    Json(req): Json<LetterReq>,
) -> Result<Json<LetterRes>, ApiError> {
    let letter = state
        .board
        .letters
        .update(id, req.into())
        .map_err(|e| board_error("Update letter", e))?;
    Ok(Json(letter.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/letters/{id}",
    params(("id" = i32, Path, description = "Letter id")),
    responses(
        (status = 200, description = "The deleted letter", body = LetterRes),
        (status = 404, description = "No such letter")
    )
)]
#[axum::debug_handler]
async fn delete_letter(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i32>,
) -> Result<Json<LetterRes>, ApiError> {
    let letter = state
        .board
        .letters
        .delete_letter(id)
        .map_err(|e| board_error("Delete letter", e))?;
    Ok(Json(letter.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/letters/{id}/attachedImage",
    params(("id" = i32, Path, description = "Letter id")),
    request_body = AttachImageReq,
    responses(
        (status = 200, description = "The letter; unchanged if it already had an image", body = LetterRes),
        (status = 404, description = "No such letter or file")
    )
)]
/// Attaches a previously uploaded file to a letter
///
/// The frontend posts the file record it got from the upload endpoint. A letter keeps the
/// first image attached to it; later calls leave it unchanged.
#[axum::debug_handler]
async fn attach_image(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i32>,
    Json(req): Json<AttachImageReq>,
) -> Result<Json<LetterRes>, ApiError> {
    let letter = state
        .board
        .letters
        .attach_image(id, req.id)
        .map_err(|e| board_error("Attach image", e))?;
    Ok(Json(letter.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/files/",
    request_body(
        content = Vec<u8>,
        description = "multipart/form-data with a `file` field that carries a filename",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "File stored", body = FileRecordRes),
        (status = 400, description = "Missing file field or filename"),
        (status = 500, description = "Internal server error")
    )
)]
/// Upload a file
///
/// The bytes are stored under their content key; uploading identical bytes again creates a
/// new record that shares the stored file.
#[axum::debug_handler]
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileRecordRes>, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Malformed multipart upload: {}", e);
        (StatusCode::BAD_REQUEST, "Malformed multipart body")
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(str::to_owned);
        let (chunks, reader) = upload::channel();
        let images = state.board.images.clone();
        let task = tokio::task::spawn_blocking(move || {
            images.store(original_name.as_deref(), reader)
        });

        let mut interrupted = false;
        loop {
            let chunk = field.chunk().await.map_err(|e| {
                tracing::warn!("Upload stream failed: {}", e);
                interrupted = true;
                io::Error::new(io::ErrorKind::ConnectionAborted, e.to_string())
            });
            let last = !matches!(chunk, Ok(Some(_)));
            // A closed channel means the writer already gave up; its error is reported below.
            if chunks.send(chunk).await.is_err() || last {
                break;
            }
        }
        drop(chunks);

        let stored = join("Upload file", task).await;
        if interrupted {
            return Err((StatusCode::BAD_REQUEST, "Upload interrupted"));
        }
        return Ok(Json(stored?.into()));
    }

    Err((StatusCode::BAD_REQUEST, "Missing multipart field 'file'"))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    params(("id" = i32, Path, description = "File record id")),
    responses(
        (status = 200, description = "The file record", body = FileRecordRes),
        (status = 404, description = "No such file record")
    )
)]
#[axum::debug_handler]
async fn get_file(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i32>,
) -> Result<Json<FileRecordRes>, ApiError> {
    let record = state
        .board
        .images
        .get_by_id(id)
        .map_err(|e| board_error("Get file", e))?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{file_ref}/content",
    params(("file_ref" = String, Path, description = "Numeric record id or content key")),
    responses(
        (status = 200, description = "The stored bytes as an attachment", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "No such record, or its file is missing")
    )
)]
/// Download a file by record id or by content key
///
/// An all-digit reference is a record id; anything else is treated as a content key, which
/// lets clients cache downloads by content.
#[axum::debug_handler]
async fn serve_file_content(
    State(state): State<AppState>,
    AxumPath(file_ref): AxumPath<String>,
) -> Result<Response, ApiError> {
    let images = state.board.images.clone();
    let (record, bytes) = blocking("Serve file", move || {
        let record = if !file_ref.is_empty() && file_ref.bytes().all(|b| b.is_ascii_digit()) {
            let id = file_ref
                .parse::<i32>()
                .map_err(|_| BoardError::FileRecordNotFound(format!("id {}", file_ref)))?;
            images.get_by_id(id)?
        } else {
            images.get_by_content_key(&file_ref)?
        };
        let bytes = images.read(&record)?;
        Ok((record, bytes))
    })
    .await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&record.original_name),
            ),
        ],
        bytes,
    )
        .into_response())
}
