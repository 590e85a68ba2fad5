//! greenscan: Sentinel-2 vegetation index pipeline
//!
//! Picks the least cloudy Level-2A scene over an area of interest, clips its
//! 10 m visible and near-infrared bands to that area, derives NDVI, GCI and EVI
//! rasters, and records the scene's metadata for later footprint queries.

pub mod types;
pub mod io;
pub mod core;
pub mod config;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    BandRaster, BandRole, Candidate, CloudCoverRange, DateRange, GeoReference, GeoTransform,
    GreenscanError, GreenscanResult, IndexKind, IndexRaster, Product, RasterGrid,
};

pub use config::PipelineConfig;
pub use io::{AoiShape, Catalog, JsonLinesStore, MetadataSink, ODataCatalog};
pub use pipeline::{Pipeline, PipelineStage, RunReport, WorkDirs};
