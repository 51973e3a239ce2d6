use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;

use crate::{
    error::AppError,
    services::{
        catalog,
        normalizer::{self, NumericPolicy},
        table::RawTable,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/import", post(import_csv))
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    success: bool,
    inserted: usize,
    message: String,
}

struct Upload {
    filename: String,
    data: Bytes,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;
        return Ok(Upload { filename, data });
    }
    Err(AppError::InvalidInput("No file provided".to_string()))
}

#[axum::debug_handler]
async fn import_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ImportResponse>, AppError> {
    let start = std::time::Instant::now();
    let upload = read_upload(multipart).await?;
    tracing::info!("Received upload {} ({} bytes)", upload.filename, upload.data.len());

    if !upload.filename.to_lowercase().ends_with(".csv") {
        return Err(AppError::InvalidInput("Only CSV files are allowed".to_string()));
    }

    let text = std::str::from_utf8(&upload.data)
        .map_err(|_| AppError::InvalidInput("File must be UTF-8 encoded text".to_string()))?;
    let table = RawTable::from_csv(text)?;
    let batch = normalizer::normalize(&table, NumericPolicy::Reject)?;
    batch.report.log(&upload.filename);

    let store = state.store()?;
    let inserted = catalog::upsert_rows(store.as_ref(), &batch.rows).await?;
    tracing::info!("Imported {} rows from {} in {:?}", inserted, upload.filename, start.elapsed());

    Ok(Json(ImportResponse {
        success: true,
        inserted,
        message: format!("Successfully processed {} records", inserted),
    }))
}
