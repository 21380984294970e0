pub mod analysis;
pub mod blocks;
pub mod db;
pub mod delta;
pub mod errors;
pub mod events;
pub mod models;
pub mod notebook;
pub mod render;
pub mod report;
pub mod scheduler;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod transport;

pub use errors::{AppError, AppResult};
pub use notebook::Notebook;

use crate::db::SqliteStore;
use crate::settings::load_settings;
use crate::store::Persistence;
use crate::transport::HttpSaveTransport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

pub const DATA_DIR_ENV: &str = "LAB_NOTEBOOK_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "./lab-notebook-data";
const STORE_FILE: &str = "notebook.sqlite";

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub fn default_data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Opens the durable store under `data_dir`.
pub fn open_persistence(data_dir: &Path) -> AppResult<Persistence> {
    let store = SqliteStore::new(&data_dir.join(STORE_FILE))?;
    tracing::info!(store = %store.path().display(), "notebook store opened");
    Ok(Persistence::new(Arc::new(store)))
}

/// Opens the notebook stored under `data_dir`, saving to the configured endpoint.
pub fn open_notebook(data_dir: &Path) -> AppResult<Notebook> {
    let persistence = open_persistence(data_dir)?;
    let settings = load_settings(&persistence);
    let transport = HttpSaveTransport::new(
        settings.save_endpoint.clone(),
        Duration::from_millis(settings.request_timeout_ms),
    );
    tracing::info!(
        data_dir = %data_dir.display(),
        save_endpoint = %transport.endpoint(),
        "opening notebook"
    );
    Ok(Notebook::open(persistence, settings, Arc::new(transport)))
}

pub fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "notebook.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
