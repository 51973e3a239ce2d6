//! Moves the property catalog between Google Sheets/Drive and the hosted
//! store, validating and normalizing rows on the way in.

use std::sync::Arc;

pub mod clients;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

use clients::{DataStore, SpreadsheetService};
use config::Config;
use error::AppError;

// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    store: Option<Arc<dyn DataStore>>,
    sheets: Option<Arc<dyn SpreadsheetService>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Option<Arc<dyn DataStore>>,
        sheets: Option<Arc<dyn SpreadsheetService>>,
    ) -> Self {
        Self { config, store, sheets }
    }

    /// Builds whichever clients the configuration allows. A missing backend
    /// is logged here and reported again on each request that needs it.
    pub fn from_config(config: Config) -> Self {
        let store = match clients::connect_store(&config) {
            Ok(store) => Some(Arc::new(store) as Arc<dyn DataStore>),
            Err(e) => {
                tracing::warn!("Store unavailable: {}", e);
                None
            }
        };
        let sheets = match clients::connect_sheets(&config) {
            Ok(sheets) => Some(Arc::new(sheets) as Arc<dyn SpreadsheetService>),
            Err(e) => {
                tracing::warn!("Spreadsheet service unavailable: {}", e);
                None
            }
        };
        Self::new(config, store, sheets)
    }

    pub fn store(&self) -> Result<Arc<dyn DataStore>, AppError> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Err(self.config.store().err().unwrap_or_else(|| {
                AppError::Config("Store client is not configured".to_string())
            })),
        }
    }

    pub fn sheets(&self) -> Result<Arc<dyn SpreadsheetService>, AppError> {
        match &self.sheets {
            Some(sheets) => Ok(sheets.clone()),
            None => Err(self.config.google_credentials_path().err().unwrap_or_else(|| {
                AppError::Config("Spreadsheet service is not configured".to_string())
            })),
        }
    }
}
