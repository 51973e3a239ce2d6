use chrono::Local;
use serde_json::Value;

use crate::clients::{DataStore, SpreadsheetService};
use crate::error::AppError;
use crate::models::{CatalogColumn, CatalogRow, CATALOG_TABLE};
use crate::services::catalog;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub spreadsheet_id: String,
    pub url: String,
    pub folder_id: String,
    pub folder_created: bool,
    pub rows_written: usize,
    pub seeded: bool,
}

/// Demonstration rows written to an empty catalog on first run.
pub fn sample_rows() -> Vec<CatalogRow> {
    let row = |room_type: &str, room: &str, block: &str, sq_m: &str, price: f64, stock: u32| CatalogRow {
        id: None,
        developer: "Example Developer".to_string(),
        project_name: "Sample Project".to_string(),
        room_type: room_type.to_string(),
        room_number: room.to_string(),
        block: block.to_string(),
        sq_m: sq_m.to_string(),
        price_baht: price,
        stock_qty: stock,
        updated_at: None,
    };
    vec![
        row("1-Bedroom", "A101", "A", "45", 2_500_000.0, 5),
        row("2-Bedroom", "B202", "B", "65", 3_500_000.0, 3),
    ]
}

pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

/// Display columns that at least one row actually carries, in display order.
pub fn display_columns(present: &[String]) -> Vec<CatalogColumn> {
    let known: Vec<CatalogColumn> = present
        .iter()
        .filter_map(|name| CatalogColumn::from_header(name))
        .collect();
    CatalogColumn::DISPLAY_ORDER
        .into_iter()
        .filter(|col| {
            let found = known.contains(col);
            if !found {
                tracing::warn!("Column '{}' not found in data. Skipping.", col);
            }
            found
        })
        .collect()
}

/// Header row followed by one row per catalog entry.
pub fn sheet_values(rows: &[CatalogRow], columns: &[CatalogColumn]) -> Vec<Vec<Value>> {
    let mut values = Vec::with_capacity(rows.len() + 1);
    values.push(columns.iter().map(|c| Value::from(c.as_str())).collect());
    values.extend(
        rows.iter()
            .map(|row| columns.iter().map(|c| row.cell(*c)).collect()),
    );
    values
}

pub struct CatalogExporter<'a> {
    sheets: &'a dyn SpreadsheetService,
    store: &'a dyn DataStore,
}

impl<'a> CatalogExporter<'a> {
    pub fn new(sheets: &'a dyn SpreadsheetService, store: &'a dyn DataStore) -> Self {
        Self { sheets, store }
    }

    /// Writes the whole catalog to a new timestamped spreadsheet in
    /// `folder_name` and shares it with `email`.
    pub async fn export(&self, folder_name: &str, email: &str) -> Result<ExportOutcome, AppError> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(AppError::InvalidInput(format!("Invalid email address: '{}'", email)));
        }

        tracing::info!("Fetching catalog data from store");
        let (mut rows, mut present) = catalog::fetch_all(self.store).await?;
        tracing::info!("Fetched {} catalog entries", rows.len());

        let mut seeded = false;
        if rows.is_empty() {
            tracing::info!("No data found in the catalog table, inserting sample data");
            let samples = sample_rows();
            let records = samples
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            match self.store.insert(CATALOG_TABLE, &records).await {
                Ok(inserted) => {
                    tracing::info!("Inserted {} sample records", samples.len());
                    seeded = true;
                    (rows, present) = if inserted.is_empty() {
                        catalog::parse_rows(records)
                    } else {
                        catalog::parse_rows(inserted)
                    };
                }
                Err(e) => tracing::error!("Failed to insert sample data: {}", e),
            }
        }

        let title = format!("Property_Catalog_{}", Local::now().format("%Y%m%d_%H%M%S"));

        let (folder_id, folder_created) = match self.sheets.find_folder(folder_name).await? {
            Some(folder) => {
                tracing::info!("Found folder: {} (ID: {})", folder.name, folder.id);
                (folder.id, false)
            }
            None => {
                tracing::info!("Folder '{}' not found, creating it", folder_name);
                let folder = self.sheets.create_folder(folder_name).await?;
                tracing::info!("Created folder: {} (ID: {})", folder.name, folder.id);
                self.sheets.share(&folder.id, email).await?;
                tracing::info!("Folder shared with {}", email);
                (folder.id, true)
            }
        };

        tracing::info!("Creating new spreadsheet: {}", title);
        let (spreadsheet, worksheet) = self.sheets.create_spreadsheet(&title).await?;
        self.sheets.share(&spreadsheet.id, email).await?;
        tracing::info!("Spreadsheet shared with {}", email);

        self.sheets.move_to_folder(&spreadsheet.id, &folder_id).await?;
        tracing::info!("Moved spreadsheet to '{}' folder", folder_name);

        let columns = display_columns(&present);
        let values = sheet_values(&rows, &columns);
        self.sheets.write_rows(&spreadsheet.id, &worksheet, values).await?;

        let url = spreadsheet.spreadsheet_url();
        tracing::info!("Catalog data pushed to Google Sheets: {}", url);

        Ok(ExportOutcome {
            spreadsheet_id: spreadsheet.id,
            url,
            folder_id,
            folder_created,
            rows_written: rows.len(),
            seeded,
        })
    }
}
