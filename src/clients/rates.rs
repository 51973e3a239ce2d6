use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::AppError;

/// Source of current exchange rates, quote currency → units per one `base`.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn latest(&self, base: &str) -> Result<HashMap<String, f64>, AppError>;
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    result: Option<String>,
    rates: Option<HashMap<String, f64>>,
}

/// Client for the open.er-api.com public endpoint.
pub struct OpenErApi {
    client: Client,
    base_url: String,
}

impl OpenErApi {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RateSource for OpenErApi {
    async fn latest(&self, base: &str) -> Result<HashMap<String, f64>, AppError> {
        let url = format!("{}/v6/latest/{}", self.base_url, base);
        tracing::info!("Fetching exchange rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::RateApi(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::RateApi(format!(
                "API request failed with status {}",
                response.status()
            )));
        }

        let body: LatestResponse = response
            .json()
            .await
            .map_err(|e| AppError::RateApi(format!("Invalid API response format: {}", e)))?;

        if let Some(result) = body.result.as_deref() {
            if result != "success" {
                return Err(AppError::RateApi(format!("API reported result '{}'", result)));
            }
        }

        body.rates
            .ok_or_else(|| AppError::RateApi("Invalid API response format: no rates".to_string()))
    }
}
