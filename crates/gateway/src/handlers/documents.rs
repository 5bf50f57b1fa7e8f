//! Document listing and PDF upload

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::time::Instant;

use crate::AppState;
use askroute_common::{
    errors::{AppError, Result},
    ingest::{self, is_pdf},
};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub processed_chunks: usize,
}

/// Every document id known to the knowledge base
pub async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.store.list_sources().await?))
}

/// Accept one PDF in the multipart field `file`, extract and index it.
/// The file name becomes the document id; uploading it again replaces its chunks.
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let start = Instant::now();

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidFormat {
            message: e.to_string(),
        })?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| AppError::InvalidFormat {
            message: e.to_string(),
        })?;
        upload = Some((filename, content_type, bytes));
        break;
    }

    let (filename, content_type, bytes) = upload.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;

    if filename.is_empty() || !is_pdf(&filename, content_type.as_deref()) {
        return Err(AppError::UnsupportedDocument {
            message: "Only PDF files are supported.".to_string(),
        });
    }

    // lopdf parsing is CPU-bound
    let name = filename.clone();
    let text = tokio::task::spawn_blocking(move || ingest::extract_text(&bytes, &name))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("PDF extraction task failed: {}", e),
        })??;

    let processed_chunks = state.store.ingest(&text, &filename).await?;

    tracing::info!(
        filename = %filename,
        chunks = processed_chunks,
        latency_ms = start.elapsed().as_millis() as u64,
        "Document indexed"
    );

    Ok(Json(UploadResponse {
        message: format!("PDF '{}' uploaded and indexed.", filename),
        filename,
        processed_chunks,
    }))
}
