use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Input;

use catalog_sync::{
    clients::{self, OpenErApi},
    config::{self, Config},
    logging,
    routes,
    services::{connections, exporter, fx_updater::FxOutcome, CatalogExporter, FxUpdater, SheetImporter},
    AppState,
};

#[derive(Debug, Parser)]
#[command(name = "catalog-sync", version, about = "Sync the property catalog between Google Sheets and the store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Address to listen on, overrides BIND_ADDR
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Import every spreadsheet in a Drive folder into the catalog
    ImportAll {
        /// Drive folder name, overrides DRIVE_FOLDER
        #[arg(long)]
        folder: Option<String>,
    },
    /// Export the catalog to a new shared spreadsheet
    Export {
        /// Address to share the spreadsheet with; prompted for when omitted
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Fetch current exchange rates and store them
    FxUpdate {
        /// Do nothing when today's rates are already stored
        #[arg(long)]
        skip_if_fresh: bool,
    },
    /// Verify store and Google credentials
    CheckConnections {
        #[arg(long, value_enum, default_value_t = Service::All)]
        service: Service,
    },
    /// Write a .env file with the given credentials
    InitEnv {
        #[arg(long)]
        supabase_url: String,
        #[arg(long)]
        supabase_key: String,
        #[arg(long)]
        google_creds: PathBuf,
        #[arg(long, default_value = ".env")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Service {
    Store,
    Google,
    All,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    logging::init_logging()?;

    let cli = Cli::parse();
    if let Command::InitEnv { supabase_url, supabase_key, google_creds, path } = &cli.command {
        std::fs::write(path, config::render_env_file(supabase_url, supabase_key, google_creds))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { addr } => serve(config, addr).await?,
        Command::ImportAll { folder } => import_all(&config, folder).await?,
        Command::Export { email, folder } => export(&config, email, folder).await?,
        Command::FxUpdate { skip_if_fresh } => fx_update(&config, skip_if_fresh).await?,
        Command::CheckConnections { service } => {
            if !check_connections(&config, service).await {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::InitEnv { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(config: Config, addr: Option<SocketAddr>) -> Result<()> {
    let addr = addr.unwrap_or(config.bind_addr);
    let state = Arc::new(AppState::from_config(config));
    let app = routes::router(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn import_all(config: &Config, folder: Option<String>) -> Result<()> {
    let folder = folder.unwrap_or_else(|| config.drive_folder.clone());
    let store = clients::connect_store(config).context("Cannot connect to the store")?;
    let sheets = clients::connect_sheets(config).context("Cannot connect to Google Drive")?;

    let summary = SheetImporter::new(&sheets, &store).import_folder(&folder).await?;

    println!("\nImport summary for '{}':", folder);
    println!("  Spreadsheets found:      {}", summary.files_found);
    println!("  Successfully processed:  {}", summary.processed.len());
    println!("  Failed:                  {}", summary.failed.len());
    println!("  Rows upserted:           {}", summary.rows_upserted);
    println!("  Deleted from Drive:      {}", summary.deleted.len());
    for file in &summary.failed {
        println!("  left in place: {} ({})", file.name, file.id);
    }
    for file in &summary.delete_failures {
        println!("  could not delete: {} ({})", file.name, file.id);
    }
    Ok(())
}

async fn export(config: &Config, email: Option<String>, folder: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => Input::<String>::new()
            .with_prompt("Email address to share the spreadsheet with")
            .validate_with(|input: &String| {
                if exporter::is_plausible_email(input) {
                    Ok(())
                } else {
                    Err("Please enter a valid email address")
                }
            })
            .interact_text()?,
    };
    let folder = folder.unwrap_or_else(|| config.drive_folder.clone());
    let store = clients::connect_store(config).context("Cannot connect to the store")?;
    let sheets = clients::connect_sheets(config).context("Cannot connect to Google Drive")?;

    let outcome = CatalogExporter::new(&sheets, &store).export(&folder, &email).await?;

    if outcome.seeded {
        println!("Catalog was empty, seeded it with sample rows");
    }
    if outcome.folder_created {
        println!("Created folder '{}' ({})", folder, outcome.folder_id);
    }
    println!("Exported {} rows", outcome.rows_written);
    println!("Spreadsheet shared with {}: {}", email, outcome.url);
    Ok(())
}

async fn fx_update(config: &Config, skip_if_fresh: bool) -> Result<()> {
    let store = clients::connect_store(config).context("Cannot connect to the store")?;
    let rates = OpenErApi::new(reqwest::Client::new(), &config.fx_api_url);

    let outcome = FxUpdater::new(&rates, &store).run(skip_if_fresh).await?;
    if outcome == FxOutcome::Skipped {
        println!("Rates for today already stored, nothing to do");
        return Ok(());
    }
    match outcome.updated_currencies().as_slice() {
        [] => println!("No exchange rates were updated"),
        updated => println!("Updated exchange rates: {}", updated.join(", ")),
    }
    Ok(())
}

async fn check_connections(config: &Config, service: Service) -> bool {
    let mut results = Vec::new();
    if matches!(service, Service::Store | Service::All) {
        results.push(match clients::connect_store(config) {
            Ok(store) => connections::check_store(&store).await,
            Err(e) => connections::CheckResult { service: "store", ok: false, message: e.to_string() },
        });
    }
    if matches!(service, Service::Google | Service::All) {
        results.push(match clients::connect_sheets(config) {
            Ok(sheets) => connections::check_sheets(&sheets).await,
            Err(e) => connections::CheckResult { service: "google", ok: false, message: e.to_string() },
        });
    }

    for result in &results {
        let mark = if result.ok { "OK" } else { "FAILED" };
        println!("[{}] {}: {}", mark, result.service, result.message);
    }
    results.iter().all(|r| r.ok)
}
