//! Catalog extraction and download handlers.

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{ProcessingError, ServiceError};
use crate::service::ExtractionResponse;

use super::AppState;

/// Extract swatches from an uploaded catalog PDF (multipart field `pdf`)
pub async fn extract_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ExtractionResponse>, ServiceError> {
    let mut file_data: Option<(Bytes, String)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        if name != "pdf" {
            continue;
        }

        let filename = field.file_name().unwrap_or("catalog.pdf").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::InvalidRequest {
                message: e.to_string(),
            })?;
        file_data = Some((data, filename));
    }

    let (data, filename) = file_data.ok_or_else(|| ServiceError::InvalidRequest {
        message: "No file provided".to_string(),
    })?;
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ServiceError::InvalidRequest {
            message: format!("Expected a PDF file, got {}", filename),
        });
    }

    info!(filename = %filename, size = data.len(), "Received catalog upload");
    let response = state.service.extract_upload(data).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub path: String,
}

/// Serve a file from the output root as an attachment
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ServiceError> {
    let path = state.service.resolve_download(&params.path)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| ServiceError::Processing(ProcessingError::Io(e)))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&path).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    )
        .into_response())
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}
