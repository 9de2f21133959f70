use std::path::Path;

use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use doc_translator_core::{
    batch, DocumentFormat, FileInfo, ServiceError, Task, TaskStatus, TranslationOptions,
};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_BATCH_FILES: usize = 10;

pub fn router(state: AppState) -> Router {
    let translations = Router::new()
        .route("/", post(create_translation).get(list_translations))
        .route("/batch", post(create_batch))
        .route("/batch/progress", post(batch_progress))
        .route("/batch/download", post(batch_download))
        .route("/:id", get(get_translation).delete(delete_translation))
        .route("/:id/download", get(download_translation))
        .route("/:id/retry", post(retry_translation));

    Router::new()
        .route("/health", get(health))
        .nest("/api/translations", translations)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The caller's opaque identity, scoping task visibility and mutation.
fn owner_token(headers: &HeaderMap) -> String {
    headers
        .get("x-owner-token")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    message: String,
    task_id: Uuid,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreatedResponse {
    message: String,
    batch_id: Uuid,
    task_ids: Vec<Uuid>,
    status: TaskStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIdsBody {
    task_ids: Vec<Uuid>,
}

/// One uploaded file plus the translation options carried in sibling
/// multipart fields.
#[derive(Default)]
struct UploadForm {
    files: Vec<(String, Vec<u8>, Option<String>)>,
    target_language: Option<String>,
    source_language: Option<String>,
    preserve_formatting: Option<String>,
}

async fn read_upload_form(state: &AppState, multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| state.reject(ServiceError::Validation(format!("malformed multipart body: {}", e))))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref().unwrap_or("") {
            "file" | "files" => {
                let Some(filename) = field.file_name().map(|s| s.to_string()) else {
                    continue;
                };
                let content_type = field.content_type().map(|s| s.to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    state.reject(ServiceError::Validation(format!("upload read error: {}", e)))
                })?;
                form.files.push((filename, bytes.to_vec(), content_type));
            }
            "targetLanguage" => form.target_language = read_text_field(state, field).await?,
            "sourceLanguage" => form.source_language = read_text_field(state, field).await?,
            "preserveFormatting" => form.preserve_formatting = read_text_field(state, field).await?,
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text_field(
    state: &AppState,
    field: axum::extract::multipart::Field<'_>,
) -> Result<Option<String>, ApiError> {
    let value = field
        .text()
        .await
        .map_err(|e| state.reject(ServiceError::Validation(format!("malformed field: {}", e))))?;
    let value = value.trim().to_string();
    Ok((!value.is_empty()).then_some(value))
}

impl UploadForm {
    fn options(&self) -> TranslationOptions {
        TranslationOptions {
            target_language: self
                .target_language
                .clone()
                .unwrap_or_else(|| "Chinese".into()),
            source_language: self.source_language.clone(),
            preserve_formatting: self.preserve_formatting.as_deref() != Some("false"),
        }
    }
}

/// Write one uploaded file into the upload directory under a collision-free
/// name and produce its task file record.
async fn store_upload(
    state: &AppState,
    original_name: &str,
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<FileInfo, ApiError> {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let format = DocumentFormat::from_extension(&extension).ok_or_else(|| {
        state.reject(ServiceError::UnsupportedFormat(format!(
            "{} (supported: {})",
            original_name,
            DocumentFormat::extensions().join(", ")
        )))
    })?;

    if bytes.is_empty() && format.is_binary() {
        return Err(state.reject(ServiceError::Validation(format!(
            "uploaded file {} is empty",
            original_name
        ))));
    }

    if bytes.len() as u64 > state.config.files.max_file_size {
        return Err(state.reject(ServiceError::Validation(format!(
            "file exceeds the {} byte upload limit",
            state.config.files.max_file_size
        ))));
    }

    let stored_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name));
    let stored_path = state.config.files.upload_dir.join(stored_name);
    tokio::fs::write(&stored_path, bytes)
        .await
        .map_err(|e| state.reject(ServiceError::Io(e)))?;

    Ok(FileInfo {
        original_name: original_name.to_string(),
        stored_path,
        size: bytes.len() as u64,
        mime_type: content_type.unwrap_or("application/octet-stream").to_string(),
        extension,
        format,
    })
}

/// Keep the basename only and squash anything outside a conservative
/// character set.
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn create_translation(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let owner = owner_token(&headers);
    let form = read_upload_form(&state, &mut multipart).await?;

    let Some((name, bytes, content_type)) = form.files.first() else {
        return Err(state.reject(ServiceError::Validation("no file uploaded".into())));
    };

    let file_info = store_upload(&state, name, bytes, content_type.as_deref()).await?;
    let task = state
        .store
        .create(file_info, form.options(), owner)
        .map_err(|e| state.reject(e))?;

    info!(task_id = %task.id, file = %task.file_info.original_name, "translation task created");
    state.scheduler.kick();

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "translation task created".into(),
            task_id: task.id,
            status: task.status,
        }),
    ))
}

async fn create_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchCreatedResponse>), ApiError> {
    let owner = owner_token(&headers);
    let form = read_upload_form(&state, &mut multipart).await?;

    if form.files.is_empty() {
        return Err(state.reject(ServiceError::Validation("no files uploaded".into())));
    }
    if form.files.len() > MAX_BATCH_FILES {
        return Err(state.reject(ServiceError::Validation(format!(
            "at most {} files per batch",
            MAX_BATCH_FILES
        ))));
    }

    let options = form.options();
    let mut task_ids = Vec::with_capacity(form.files.len());
    for (name, bytes, content_type) in &form.files {
        let file_info = store_upload(&state, name, bytes, content_type.as_deref()).await?;
        let task = state
            .store
            .create(file_info, options.clone(), owner.clone())
            .map_err(|e| state.reject(e))?;
        task_ids.push(task.id);
    }

    let group = state.batches.create(task_ids.clone());
    info!(batch_id = %group.batch_id, count = task_ids.len(), "batch created");
    state.scheduler.kick();

    Ok((
        StatusCode::CREATED,
        Json(BatchCreatedResponse {
            message: "batch translation tasks created".into(),
            batch_id: group.batch_id,
            task_ids,
            status: TaskStatus::Pending,
        }),
    ))
}

async fn list_translations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<Task>> {
    Json(state.store.list_by_owner(&owner_token(&headers)))
}

async fn get_translation(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let task = owned_task(&state, &headers, id)?;
    Ok(Json(task))
}

async fn delete_translation(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    owned_task(&state, &headers, id)?;
    let removed = state.store.delete(id).map_err(|e| state.reject(e))?;
    if !removed {
        return Err(state.reject(ServiceError::NotFound(format!("task {}", id))));
    }
    Ok(Json(serde_json::json!({ "message": "task deleted" })))
}

async fn download_translation(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Response, ApiError> {
    let task = owned_task(&state, &headers, id)?;

    if task.status != TaskStatus::Completed {
        return Err(state.reject(ServiceError::Validation(
            "translation is not completed yet".into(),
        )));
    }

    let output = task.output_path.as_ref().ok_or_else(|| {
        state.reject(ServiceError::NotFound("translation artifact".into()))
    })?;
    let bytes = tokio::fs::read(output).await.map_err(|_| {
        state.reject(ServiceError::NotFound(format!(
            "translation artifact {}",
            output.display()
        )))
    })?;

    let filename = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("translated");
    Ok(file_response(filename, bytes))
}

async fn retry_translation(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<Uuid>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let task = state
        .scheduler
        .user_retry(id, &owner_token(&headers))
        .map_err(|e| state.reject(e))?;

    Ok(Json(CreatedResponse {
        message: "translation task queued for retry".into(),
        task_id: task.id,
        status: task.status,
    }))
}

async fn batch_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TaskIdsBody>,
) -> Result<Json<batch::BatchProgress>, ApiError> {
    if body.task_ids.is_empty() {
        return Err(state.reject(ServiceError::Validation("taskIds must not be empty".into())));
    }
    Ok(Json(batch::aggregate_progress(
        &state.store,
        &body.task_ids,
        &owner_token(&headers),
    )))
}

async fn batch_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TaskIdsBody>,
) -> Result<Response, ApiError> {
    if body.task_ids.is_empty() {
        return Err(state.reject(ServiceError::Validation("taskIds must not be empty".into())));
    }

    let tasks = batch::downloadable_tasks(&state.store, &body.task_ids, &owner_token(&headers));

    // A single completed artifact ships directly rather than wrapped in an
    // archive.
    if tasks.len() == 1 {
        let output = tasks[0].output_path.clone().unwrap_or_default();
        let bytes = tokio::fs::read(&output).await.map_err(|_| {
            state.reject(ServiceError::NotFound(format!(
                "translation artifact {}",
                output.display()
            )))
        })?;
        let filename = output
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("translated");
        return Ok(file_response(filename, bytes));
    }

    let archive = batch::zip_outputs(&tasks).map_err(|e| state.reject(e))?;
    Ok(file_response("translations.zip", archive))
}

fn file_response(filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Fetch a task and enforce ownership: unknown id is 404, a foreign owner
/// token is 403.
fn owned_task(state: &AppState, headers: &HeaderMap, id: Uuid) -> Result<Task, ApiError> {
    let task = state
        .store
        .get(id)
        .ok_or_else(|| state.reject(ServiceError::NotFound(format!("task {}", id))))?;
    if !task.is_owned_by(&owner_token(headers)) {
        return Err(state.reject(ServiceError::Ownership));
    }
    Ok(task)
}
