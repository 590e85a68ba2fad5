//! Raster, vector, catalog and metadata storage I/O

pub mod aoi;
pub mod band_store;
pub mod catalog;
pub mod store;

pub use aoi::AoiShape;
pub use catalog::{BandFilter, Catalog, CatalogQuery, ODataCatalog};
pub use store::{JsonLinesStore, MemorySink, MetadataSink};
