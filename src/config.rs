use crate::core::indices::{BandRegistry, EviParams};
use crate::core::metadata::{DEFAULT_SCHEMA, DEFAULT_TABLE};
use crate::types::{CloudCoverRange, DateRange, GreenscanError, GreenscanResult};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Run parameters, loaded once and handed to the pipeline by value
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub run: RunConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub bands: BandRegistry,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub indices: EviParams,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Working root; defaults to the platform data directory
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    pub aoi: PathBuf,
    #[serde(default = "default_keep_raw")]
    pub keep_raw: bool,
}

fn default_keep_raw() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub min_cloud_cover: f64,
    #[serde(default = "default_max_cloud_cover")]
    pub max_cloud_cover: f64,
}

fn default_max_cloud_cover() -> f64 {
    100.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Name of the environment variable holding a bearer token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            download_url: default_download_url(),
            token_env: None,
            timeout_secs: default_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://catalogue.dataspace.copernicus.eu/odata/v1".to_string()
}
fn default_download_url() -> String {
    "https://zipper.dataspace.copernicus.eu/odata/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_results() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            schema: default_schema(),
            table: default_table(),
        }
    }
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl PipelineConfig {
    pub fn load(path: &Path) -> GreenscanResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GreenscanError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> GreenscanResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GreenscanError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GreenscanResult<()> {
        self.date_range()?;
        self.cloud_cover()?;
        self.bands.validate()?;

        if self.catalog.timeout_secs == 0 {
            return Err(GreenscanError::Config("catalog.timeout_secs must be > 0".to_string()));
        }
        if self.catalog.max_results == 0 {
            return Err(GreenscanError::Config("catalog.max_results must be > 0".to_string()));
        }
        if self.store.schema.is_empty() || self.store.table.is_empty() {
            return Err(GreenscanError::Config(
                "store.schema and store.table must not be empty".to_string(),
            ));
        }
        let p = &self.indices;
        if !(p.l.is_finite() && p.g.is_finite() && p.c.is_finite()) {
            return Err(GreenscanError::Config("EVI coefficients must be finite".to_string()));
        }
        Ok(())
    }

    pub fn date_range(&self) -> GreenscanResult<DateRange> {
        DateRange::new(self.search.start_date, self.search.end_date)
            .map_err(|e| GreenscanError::Config(e.to_string()))
    }

    pub fn cloud_cover(&self) -> GreenscanResult<CloudCoverRange> {
        CloudCoverRange::new(self.search.min_cloud_cover, self.search.max_cloud_cover)
            .map_err(|e| GreenscanError::Config(e.to_string()))
    }

    pub fn base_dir(&self) -> GreenscanResult<PathBuf> {
        match &self.run.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("greenscan"))
                .ok_or_else(|| GreenscanError::Config("No base_dir set and no data directory".to_string())),
        }
    }

    /// Where the metadata table lives; `<base>/store` unless configured
    pub fn store_root(&self) -> GreenscanResult<PathBuf> {
        match &self.store.root {
            Some(root) => Ok(root.clone()),
            None => Ok(self.base_dir()?.join("store")),
        }
    }
}
