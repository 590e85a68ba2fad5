//! # greenscan CLI
//!
//! ```bash
//! greenscan --config ./config/greenscan.toml run
//! greenscan --config ./config/greenscan.toml footprints
//! greenscan --config ./config/greenscan.toml lookup <product-id>
//! greenscan --config ./config/greenscan.toml search --start 2022-09-01 --end 2022-11-30
//! greenscan --config ./config/greenscan.toml indices --processed ./processed --out ./indices
//! ```
//!
//! Logging goes through `RUST_LOG`, e.g. `RUST_LOG=greenscan=debug`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use greenscan::core::indices::IndexProcessor;
use greenscan::core::metadata::feature_collection;
use greenscan::pipeline::derive_from_directory;
use greenscan::{DateRange, JsonLinesStore, ODataCatalog, Pipeline, PipelineConfig};
use std::path::PathBuf;

/// Sentinel-2 AOI clipping and vegetation index pipeline
#[derive(Parser)]
#[command(name = "greenscan", version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long, global = true, default_value = "./config/greenscan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select, download, clip and derive indices for the configured AOI
    Run,

    /// Print stored footprints as a GeoJSON FeatureCollection
    Footprints {
        /// Only this product
        #[arg(long)]
        id: Option<String>,
    },

    /// Print every stored attribute of one product
    Lookup {
        id: String,
    },

    /// Print stored products acquired between two dates, inclusive
    Search {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },

    /// Derive NDVI, GCI and EVI from clipped bands already on disk
    Indices {
        #[arg(long)]
        processed: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn open_store(config: &PipelineConfig) -> Result<JsonLinesStore> {
    let root = config.store_root()?;
    Ok(JsonLinesStore::new(root, config.store.schema.clone(), config.store.table.clone()))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run => {
            let catalog = ODataCatalog::from_config(&config.catalog)?;
            let store = open_store(&config)?;
            let mut pipeline = Pipeline::new(config, catalog, store)?;
            let report = pipeline.run().context("pipeline run failed")?;

            println!("product: {} ({})", report.product.title, report.product.id);
            for path in &report.clipped_bands {
                println!("band:    {}", path.display());
            }
            for path in &report.index_rasters {
                println!("index:   {}", path.display());
            }
        }
        Commands::Footprints { id } => {
            let store = open_store(&config)?;
            let products = match id {
                Some(id) => store.find_by_id(&id)?.into_iter().collect(),
                None => store.load()?,
            };
            println!("{}", serde_json::to_string_pretty(&feature_collection(&products))?);
        }
        Commands::Lookup { id } => {
            let store = open_store(&config)?;
            let product = store
                .find_by_id(&id)?
                .with_context(|| format!("no product with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }
        Commands::Search { start, end } => {
            let store = open_store(&config)?;
            let range = DateRange::new(start, end)?;
            let products = store.search_by_date(&range)?;
            println!("{}", serde_json::to_string_pretty(&products)?);
        }
        Commands::Indices { processed, out } => {
            let processor = IndexProcessor::new(config.indices);
            let written = derive_from_directory(&config.bands, &processor, &processed, &out)?;
            for path in written {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
