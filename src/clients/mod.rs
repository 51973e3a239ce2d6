//! Thin REST clients for the three remote collaborators. Each sits behind
//! a trait so services can run against fakes.

pub mod google_auth;
pub mod rates;
pub mod sheets;
pub mod store;

pub use google_auth::{ServiceAccountAuth, TokenSource};
pub use rates::{OpenErApi, RateSource};
pub use sheets::{GoogleSheetsClient, SpreadsheetService};
pub use store::{DataStore, Filter, SupabaseStore};

use std::sync::Arc;

use reqwest::{Client, Response};

use crate::config::Config;
use crate::error::AppError;

/// Store client for the configured endpoint.
pub fn connect_store(config: &Config) -> Result<SupabaseStore, AppError> {
    let settings = config.store()?;
    tracing::info!("Connecting to store at {}", settings.url);
    Ok(SupabaseStore::new(settings))
}

/// Drive/Sheets client authenticated with the configured service account.
pub fn connect_sheets(config: &Config) -> Result<GoogleSheetsClient, AppError> {
    let path = config.google_credentials_path()?;
    let http = Client::new();
    let auth = ServiceAccountAuth::from_file(http.clone(), path)?;
    Ok(GoogleSheetsClient::new(http, auth as Arc<dyn TokenSource>))
}

/// Body of a failed response for error messages. A body that cannot be read
/// is named as such instead of being left blank.
pub(crate) async fn error_body(response: Response) -> String {
    body_or_placeholder(response.text().await)
}

fn body_or_placeholder(body: Result<String, reqwest::Error>) -> String {
    body.unwrap_or_else(|e| format!("<unreadable body: {}>", e))
}
