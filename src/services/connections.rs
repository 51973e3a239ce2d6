use crate::clients::{DataStore, SpreadsheetService};
use crate::models::CATALOG_TABLE;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub service: &'static str,
    pub ok: bool,
    pub message: String,
}

/// Runs a one-row select against the catalog table.
pub async fn check_store(store: &dyn DataStore) -> CheckResult {
    match store.select(CATALOG_TABLE, &[], Some(1)).await {
        Ok(_) => CheckResult {
            service: "store",
            ok: true,
            message: "Successfully connected to the store".to_string(),
        },
        Err(e) => CheckResult {
            service: "store",
            ok: false,
            message: format!("Failed to connect to the store: {}", e),
        },
    }
}

/// Lists accessible spreadsheets.
pub async fn check_sheets(sheets: &dyn SpreadsheetService) -> CheckResult {
    match sheets.list_spreadsheets(None).await {
        Ok(files) => CheckResult {
            service: "google",
            ok: true,
            message: format!(
                "Successfully connected to Google Drive, found {} accessible spreadsheets",
                files.len()
            ),
        },
        Err(e) => CheckResult {
            service: "google",
            ok: false,
            message: format!("Failed to connect to Google Drive: {}", e),
        },
    }
}
