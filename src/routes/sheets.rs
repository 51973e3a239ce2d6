use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{error::AppError, models::SpreadsheetInfo, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sheets/health", get(sheets_health))
        .route("/api/sheets", get(list_sheets))
        .route("/api/sheets/:spreadsheet_id", get(read_sheet))
}

#[derive(Debug, Serialize)]
pub struct SheetSummary {
    id: String,
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    sheet_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SheetData {
    metadata: SpreadsheetInfo,
    rows: usize,
    columns: Vec<String>,
    data: Vec<Map<String, Value>>,
}

async fn sheets_health(State(state): State<Arc<AppState>>) -> Response {
    let unhealthy = |message: String| {
        tracing::error!("Spreadsheet service unhealthy: {}", message);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": { "status": "unhealthy", "message": message } })),
        )
            .into_response()
    };

    let sheets = match state.sheets() {
        Ok(sheets) => sheets,
        Err(e) => return unhealthy(e.to_string()),
    };
    match sheets.list_spreadsheets(None).await {
        Ok(files) => Json(json!({
            "status": "healthy",
            "message": "Google Sheets connection is working",
            "spreadsheets_count": files.len(),
        }))
        .into_response(),
        Err(e) => unhealthy(e.to_string()),
    }
}

async fn list_sheets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SheetSummary>>, AppError> {
    let files = state.sheets()?.list_spreadsheets(None).await?;
    tracing::info!("Listing {} spreadsheets", files.len());
    Ok(Json(
        files
            .into_iter()
            .map(|f| SheetSummary { url: f.spreadsheet_url(), id: f.id, name: f.name })
            .collect(),
    ))
}

async fn read_sheet(
    State(state): State<Arc<AppState>>,
    Path(spreadsheet_id): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Json<SheetData>, AppError> {
    let sheets = state.sheets()?;
    let metadata = sheets.spreadsheet_info(&spreadsheet_id).await?;
    let worksheet = params.sheet_name.as_deref().filter(|s| !s.trim().is_empty());
    if let Some(name) = worksheet {
        if !metadata.sheets.iter().any(|s| s == name) {
            return Err(AppError::NotFound(format!(
                "Worksheet '{}' not found in spreadsheet {}",
                name, spreadsheet_id
            )));
        }
    }

    let table = sheets.read_sheet(&spreadsheet_id, worksheet).await?;
    let data = table.records();
    Ok(Json(SheetData {
        metadata,
        rows: data.len(),
        columns: table.headers,
        data,
    }))
}
