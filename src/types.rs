use chrono::{DateTime, NaiveDate, Utc};
use gdal::raster::GdalDataType;
use geo::Polygon;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Digital numbers are divided by this to obtain unit-scale reflectance
pub const MAX_DIGITAL_NUMBER: f32 = 65535.0;

/// Spectral role a band plays in the index formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BandRole {
    Blue,
    Green,
    Red,
    Nir,
}

impl BandRole {
    pub const ALL: [BandRole; 4] = [BandRole::Blue, BandRole::Green, BandRole::Red, BandRole::Nir];
}

impl std::fmt::Display for BandRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BandRole::Blue => write!(f, "blue"),
            BandRole::Green => write!(f, "green"),
            BandRole::Red => write!(f, "red"),
            BandRole::Nir => write!(f, "nir"),
        }
    }
}

/// Spectral indices derived by the index engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Ndvi,
    Gci,
    Evi,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [IndexKind::Ndvi, IndexKind::Gci, IndexKind::Evi];

    /// Bands read by the formula
    pub fn required_roles(&self) -> &'static [BandRole] {
        match self {
            IndexKind::Ndvi => &[BandRole::Red, BandRole::Nir],
            IndexKind::Gci => &[BandRole::Green, BandRole::Nir],
            IndexKind::Evi => &[BandRole::Blue, BandRole::Red, BandRole::Nir],
        }
    }

    /// Band whose CRS and transform are copied to the output
    pub fn reference_role(&self) -> BandRole {
        match self {
            IndexKind::Ndvi | IndexKind::Evi => BandRole::Red,
            IndexKind::Gci => BandRole::Green,
        }
    }

    /// Band whose file stem names the output file
    pub fn naming_role(&self) -> BandRole {
        match self {
            IndexKind::Ndvi => BandRole::Red,
            IndexKind::Gci => BandRole::Green,
            IndexKind::Evi => BandRole::Blue,
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Ndvi => write!(f, "ndvi"),
            IndexKind::Gci => write!(f, "gci"),
            IndexKind::Evi => write!(f, "evi"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Transform of a sub-window starting at (row_off, col_off)
    pub fn shifted(&self, row_off: usize, col_off: usize) -> Self {
        let (r, c) = (row_off as f64, col_off as f64);
        Self {
            top_left_x: self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            top_left_y: self.top_left_y + c * self.rotation_y + r * self.pixel_height,
            ..*self
        }
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (r, c) = (row as f64 + 0.5, col as f64 + 0.5);
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }
}

/// Placement of a grid on the earth: affine transform plus CRS as WKT
#[derive(Debug, Clone, PartialEq)]
pub struct GeoReference {
    pub transform: GeoTransform,
    pub crs_wkt: String,
}

/// In-memory single-band grid with its georeferencing
#[derive(Debug, Clone)]
pub struct RasterGrid<T> {
    pub data: Array2<T>,
    pub georef: GeoReference,
    pub nodata: Option<f64>,
}

impl<T> RasterGrid<T> {
    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// A single-band raster persisted in the band store
#[derive(Debug, Clone)]
pub struct BandRaster {
    pub band_code: String,
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub georef: GeoReference,
    pub dtype: GdalDataType,
    pub nodata: Option<f64>,
}

/// A derived index raster and the file it was written to
#[derive(Debug, Clone)]
pub struct IndexRaster {
    pub kind: IndexKind,
    pub path: PathBuf,
    pub grid: RasterGrid<f32>,
}

/// Inclusive acquisition date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> GreenscanResult<Self> {
        if start > end {
            return Err(GreenscanError::Input(format!(
                "Date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Inclusive cloud cover percentage window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudCoverRange {
    pub min: f64,
    pub max: f64,
}

impl CloudCoverRange {
    pub fn new(min: f64, max: f64) -> GreenscanResult<Self> {
        if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min > max {
            return Err(GreenscanError::Input(format!(
                "Cloud cover range [{}, {}] must satisfy 0 <= min <= max <= 100",
                min, max
            )));
        }
        Ok(Self { min, max })
    }
}

/// Summary row returned by a catalog search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub cloud_cover_percentage: f64,
    pub acquisition_date: Option<DateTime<Utc>>,
}

/// Native attribute mapping of a catalog product
pub type RawAttributes = BTreeMap<String, serde_json::Value>;

/// Normalized metadata record of one satellite scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    #[serde(with = "crate::core::metadata::polygon_wkt")]
    pub footprint: Polygon<f64>,
    #[serde(rename = "date")]
    pub acquisition_date: DateTime<Utc>,
    pub cloud_cover_percentage: f64,
    pub processing_level: String,
    pub product_type: String,
    pub quicklook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illumination_azimuth_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illumination_zenith_angle: Option<f64>,
}

/// Error types for the imagery pipeline
#[derive(Debug, thiserror::Error)]
pub enum GreenscanError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Clip error: {0}")]
    Clip(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Band mismatch: {0}")]
    BandMismatch(String),

    #[error("No product found: {0}")]
    NoProductFound(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled before {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for pipeline operations
pub type GreenscanResult<T> = Result<T, GreenscanError>;
