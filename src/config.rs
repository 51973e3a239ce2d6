use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use dotenvy::dotenv;

use crate::error::AppError;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DRIVE_FOLDER: &str = "MCP_sandbox_app";
pub const DEFAULT_FX_API_URL: &str = "https://open.er-api.com";

fn default_max_upload_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

/// Endpoint and service credential for the hosted data store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: Option<StoreSettings>,
    pub google_credentials: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    pub drive_folder: String,
    pub fx_api_url: String,
    pub max_upload_size: usize,
}

impl Config {
    /// Loads `.env` (if any) and then reads the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => Some(StoreSettings {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            _ => None,
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("Invalid BIND_ADDR: {}", e)))?;

        let max_upload_size = match get("MAX_UPLOAD_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| AppError::Config(format!("Invalid MAX_UPLOAD_SIZE: {}", e)))?,
            None => default_max_upload_size(),
        };

        Ok(Config {
            store,
            google_credentials: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            bind_addr,
            drive_folder: get("DRIVE_FOLDER").unwrap_or_else(|| DEFAULT_DRIVE_FOLDER.to_string()),
            fx_api_url: get("FX_API_URL")
                .unwrap_or_else(|| DEFAULT_FX_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_upload_size,
        })
    }

    pub fn store(&self) -> Result<&StoreSettings, AppError> {
        self.store.as_ref().ok_or_else(|| {
            AppError::Config(
                "Store credentials not found: set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY".to_string(),
            )
        })
    }

    pub fn google_credentials_path(&self) -> Result<&Path, AppError> {
        self.google_credentials.as_deref().ok_or_else(|| {
            AppError::Config(
                "Google credentials path not found: set GOOGLE_APPLICATION_CREDENTIALS".to_string(),
            )
        })
    }
}

/// Renders the `.env` file written by `catalog-sync init-env`.
pub fn render_env_file(supabase_url: &str, supabase_key: &str, google_creds: &Path) -> String {
    format!(
        "# Store configuration\n\
         SUPABASE_URL={}\n\
         SUPABASE_SERVICE_ROLE_KEY={}\n\n\
         # Google Drive configuration\n\
         GOOGLE_APPLICATION_CREDENTIALS={}\n",
        supabase_url,
        supabase_key,
        google_creds.display()
    )
}
