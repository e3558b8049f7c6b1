//! HTTP front end for the job registry.

use crate::jobs::{JobError, JobRegistry, JobState, JobStatus, SubmitOptions};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
    status: JobState,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitQuery {
    filename: Option<String>,
    text_redaction_mode: Option<String>,
    visual_redaction_mode: Option<String>,
    create_overlay_pdf: Option<bool>,
}

fn api_error(err: JobError) -> ApiError {
    let status = match &err {
        JobError::UnknownJob(_) => StatusCode::NOT_FOUND,
        JobError::UnknownArtifact(_) | JobError::NotReady { .. } | JobError::InvalidPolicy { .. } => {
            StatusCode::BAD_REQUEST
        }
        JobError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Routes for the job API.
pub fn router(registry: Arc<JobRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/:id", get(job_status).delete(delete_job))
        .route("/jobs/:id/files/:key", get(fetch_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(registry)
}

/// Serves the API until the process is stopped.
pub async fn serve(addr: SocketAddr, registry: Arc<JobRegistry>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, jobs_dir = %registry.root().display(), "listening");
    axum::serve(listener, router(registry)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn submit_job(
    State(registry): State<Arc<JobRegistry>>,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    if body.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "request body must contain the PDF".to_string(),
            }),
        ));
    }

    let filename = query.filename.unwrap_or_else(|| "document.pdf".to_string());
    let options = SubmitOptions {
        text_redaction_mode: query.text_redaction_mode,
        visual_redaction_mode: query.visual_redaction_mode,
        create_overlay_pdf: query.create_overlay_pdf,
    };
    let job_id = registry
        .submit(body.to_vec(), &filename, options)
        .map_err(api_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobState::Uploaded,
        }),
    ))
}

async fn list_jobs(State(registry): State<Arc<JobRegistry>>) -> Json<Vec<JobStatus>> {
    Json(registry.list())
}

async fn job_status(
    State(registry): State<Arc<JobRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    registry.status(&id).map(Json).map_err(api_error)
}

async fn fetch_file(
    State(registry): State<Arc<JobRegistry>>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let artifact = registry.fetch(&id, &key).await.map_err(api_error)?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

async fn delete_job(
    State(registry): State<Arc<JobRegistry>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    registry.delete(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(api_error(JobError::UnknownJob("x".into())).0, StatusCode::NOT_FOUND);
        assert_eq!(
            api_error(JobError::UnknownArtifact("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            api_error(JobError::InvalidPolicy {
                parameter: "p".into(),
                reason: "r".into()
            })
            .0,
            StatusCode::BAD_REQUEST
        );
    }
}
