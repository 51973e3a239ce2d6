use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::config::StoreSettings;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
}

impl FilterOp {
    fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
        }
    }
}

/// A single `column op value` row filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<String>) -> Self {
        Filter { column: column.to_string(), op: FilterOp::Eq, value: value.into() }
    }

    pub fn gte(column: &str, value: impl Into<String>) -> Self {
        Filter { column: column.to_string(), op: FilterOp::Gte, value: value.into() }
    }

    pub fn lt(column: &str, value: impl Into<String>) -> Self {
        Filter { column: column.to_string(), op: FilterOp::Lt, value: value.into() }
    }

    fn query_pair(&self) -> (String, String) {
        (self.column.clone(), format!("{}.{}", self.op.as_str(), self.value))
    }
}

/// Table-level access to the hosted data store. Records travel as JSON
/// objects; callers serialize their typed rows at this boundary.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, filters: &[Filter], limit: Option<usize>) -> Result<Vec<Value>, AppError>;

    async fn insert(&self, table: &str, records: &[Value]) -> Result<Vec<Value>, AppError>;

    /// Insert, merging into existing rows that collide on `on_conflict`.
    async fn upsert(&self, table: &str, records: &[Value], on_conflict: Option<&str>) -> Result<Vec<Value>, AppError>;

    /// Patches every row matching `filters` and returns the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: &Value) -> Result<Vec<Value>, AppError>;
}

/// PostgREST client for a Supabase project.
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(settings: &StoreSettings) -> Self {
        Self::with_client(Client::new(), settings)
    }

    pub fn with_client(client: Client, settings: &StoreSettings) -> Self {
        Self {
            client,
            rest_url: format!("{}/rest/v1", settings.url.trim_end_matches('/')),
            service_key: settings.service_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn rows(response: Result<Response, reqwest::Error>, action: &str, table: &str) -> Result<Vec<Value>, AppError> {
        let response = response
            .map_err(|e| AppError::Store(format!("Failed to {} {}: {}", action, table, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Store(format!("Failed to read {} response: {}", table, e)))?;

        if !status.is_success() {
            return Err(AppError::Store(format!(
                "{} {} failed with status {}: {}",
                action, table, status, body
            )));
        }

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&body)
            .map_err(|e| AppError::Store(format!("Unexpected {} response: {}", table, e)))?
        {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            single => Ok(vec![single]),
        }
    }
}

#[async_trait]
impl DataStore for SupabaseStore {
    async fn select(&self, table: &str, filters: &[Filter], limit: Option<usize>) -> Result<Vec<Value>, AppError> {
        let mut query: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        query.extend(filters.iter().map(Filter::query_pair));
        if let Some(limit) = limit {
            query.push(("limit".to_string(), limit.to_string()));
        }

        tracing::debug!("Selecting from {} with {} filters", table, filters.len());
        let response = self
            .request(reqwest::Method::GET, table)
            .query(&query)
            .send()
            .await;
        Self::rows(response, "select from", table).await
    }

    async fn insert(&self, table: &str, records: &[Value]) -> Result<Vec<Value>, AppError> {
        tracing::debug!("Inserting {} records into {}", records.len(), table);
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(records)
            .send()
            .await;
        Self::rows(response, "insert into", table).await
    }

    async fn upsert(&self, table: &str, records: &[Value], on_conflict: Option<&str>) -> Result<Vec<Value>, AppError> {
        tracing::debug!("Upserting {} records into {}", records.len(), table);
        let mut request = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "resolution=merge-duplicates,return=representation");
        if let Some(columns) = on_conflict {
            request = request.query(&[("on_conflict", columns)]);
        }
        let response = request.json(records).send().await;
        Self::rows(response, "upsert into", table).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: &Value) -> Result<Vec<Value>, AppError> {
        if filters.is_empty() {
            return Err(AppError::Internal(format!(
                "Refusing to update every row of {}",
                table
            )));
        }

        let query: Vec<(String, String)> = filters.iter().map(Filter::query_pair).collect();
        let response = self
            .request(reqwest::Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&query)
            .json(patch)
            .send()
            .await;
        Self::rows(response, "update", table).await
    }
}
