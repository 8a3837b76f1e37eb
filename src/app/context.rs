use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::error::{DreaderError, Result};
use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::config::Config;
use crate::scraper::{ScrapeConfig, ScrapeOrchestrator};
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub config: Config,
}

impl AppContext {
    pub fn new(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);

        Ok(Self { store, config })
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Ok(Self { store, config })
    }

    /// Drop every table and rebuild the schema at `db_path`.
    pub fn reset(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::recreate(&db_path)?);

        Ok(Self { store, config })
    }

    /// Scrape orchestrator over this context's store, launching Chrome.
    pub fn orchestrator(&self, scraper: ScrapeConfig) -> ScrapeOrchestrator<SqliteStore> {
        let launcher: Arc<dyn BrowserLauncher> = Arc::new(ChromeLauncher::new(scraper.clone()));
        ScrapeOrchestrator::new(
            self.store.clone(),
            launcher,
            scraper,
            self.config.locators.clone(),
        )
    }

    pub fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| DreaderError::Config("Could not find data directory".into()))?;
        let dreader_dir = data_dir.join("dreader");
        std::fs::create_dir_all(&dreader_dir)?;
        Ok(dreader_dir.join("dreader.db"))
    }

    pub fn db_exists(path: &Path) -> bool {
        path.is_file()
    }
}
