use crate::clients::{DataStore, SpreadsheetService};
use crate::error::AppError;
use crate::models::DriveFile;
use crate::services::catalog;
use crate::services::normalizer::{normalize, NumericPolicy};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub files_found: usize,
    pub processed: Vec<DriveFile>,
    pub failed: Vec<DriveFile>,
    pub deleted: Vec<DriveFile>,
    pub delete_failures: Vec<DriveFile>,
    pub rows_upserted: usize,
}

pub struct SheetImporter<'a> {
    sheets: &'a dyn SpreadsheetService,
    store: &'a dyn DataStore,
}

impl<'a> SheetImporter<'a> {
    pub fn new(sheets: &'a dyn SpreadsheetService, store: &'a dyn DataStore) -> Self {
        Self { sheets, store }
    }

    /// Imports every spreadsheet in `folder_name`, then deletes the ones
    /// that produced at least one upserted row.
    pub async fn import_folder(&self, folder_name: &str) -> Result<ImportSummary, AppError> {
        tracing::info!("Searching for '{}' folder in Google Drive", folder_name);
        let folder = self
            .sheets
            .find_folder(folder_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Folder '{}' not found", folder_name)))?;
        tracing::info!("Found folder: {} (ID: {})", folder.name, folder.id);

        let files = self.sheets.list_spreadsheets(Some(&folder.id)).await?;
        let mut summary = ImportSummary {
            files_found: files.len(),
            ..ImportSummary::default()
        };

        if files.is_empty() {
            tracing::warn!("No Google Sheets found in folder '{}'", folder_name);
            return Ok(summary);
        }
        tracing::info!("Found {} Google Sheets in folder, processing all files", files.len());

        for file in files {
            tracing::info!("=== Processing file: {} ===", file.name);
            match self.import_spreadsheet(&file).await {
                Ok(0) => {
                    tracing::warn!("No worksheets were successfully processed in file: {}", file.name);
                    summary.failed.push(file);
                }
                Ok(rows) => {
                    tracing::info!("Successfully processed file: {} ({} rows)", file.name, rows);
                    summary.rows_upserted += rows;
                    summary.processed.push(file);
                }
                Err(e) => {
                    tracing::error!("Error processing file {}: {}", file.name, e);
                    summary.failed.push(file);
                }
            }
        }

        // Separate pass so one failed delete does not block the others.
        if summary.processed.is_empty() {
            tracing::warn!("No files were successfully processed. Nothing to delete.");
        } else {
            tracing::info!("=== Deleting {} successfully processed files ===", summary.processed.len());
        }
        for file in summary.processed.clone() {
            match self.sheets.delete(&file.id).await {
                Ok(()) => {
                    tracing::info!("Deleted: {}", file.name);
                    summary.deleted.push(file);
                }
                Err(e) => {
                    tracing::error!("Error deleting file {}: {}", file.name, e);
                    summary.delete_failures.push(file);
                }
            }
        }

        Ok(summary)
    }

    /// Rows upserted across all worksheets of one spreadsheet. Worksheet
    /// failures are logged and skipped.
    pub async fn import_spreadsheet(&self, file: &DriveFile) -> Result<usize, AppError> {
        let info = self.sheets.spreadsheet_info(&file.id).await?;

        let mut total = 0;
        for worksheet in &info.sheets {
            match self.import_worksheet(&file.id, worksheet).await {
                Ok(rows) => total += rows,
                Err(e) => tracing::warn!("Skipping worksheet {}: {}", worksheet, e),
            }
        }
        Ok(total)
    }

    async fn import_worksheet(&self, spreadsheet_id: &str, worksheet: &str) -> Result<usize, AppError> {
        tracing::info!("Processing worksheet: {}", worksheet);
        let table = self.sheets.read_sheet(spreadsheet_id, Some(worksheet)).await?;
        if table.is_empty() {
            tracing::warn!("Worksheet {} is empty or has no header row, skipping", worksheet);
            return Ok(0);
        }

        let batch = normalize(&table, NumericPolicy::CoerceToZero)?;
        batch.report.log(worksheet);

        if batch.rows.is_empty() {
            tracing::warn!("No valid records found in {} after validation, skipping", worksheet);
            return Ok(0);
        }

        tracing::info!("Upserting {} rows from {} to catalog table", batch.rows.len(), worksheet);
        let written = catalog::upsert_rows(self.store, &batch.rows).await?;
        tracing::info!("Successfully imported {} rows from {}", written, worksheet);
        Ok(written)
    }
}
