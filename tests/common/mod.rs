#![allow(dead_code)]

use gdal::spatial_ref::SpatialRef;
use greenscan::io::band_store;
use greenscan::{GeoReference, GeoTransform, RasterGrid};
use ndarray::Array2;
use std::path::{Path, PathBuf};

pub const BAND_CODES: [&str; 4] = ["B02", "B03", "B04", "B08"];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn utm30n_wkt() -> String {
    SpatialRef::from_epsg(32630).unwrap().to_wkt().unwrap()
}

/// Constant-valued UInt16 band in UTM 30N
pub fn write_u16_band(path: &Path, transform: GeoTransform, shape: (usize, usize), value: u16) -> PathBuf {
    write_u16_grid(path, transform, Array2::from_elem(shape, value))
}

pub fn write_u16_grid(path: &Path, transform: GeoTransform, data: Array2<u16>) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let grid = RasterGrid {
        data,
        georef: GeoReference { transform, crs_wkt: utm30n_wkt() },
        nodata: None,
    };
    band_store::write_grid(&grid, path).unwrap();
    path.to_path_buf()
}

/// Rectangle in EPSG:32630 written as GeoJSON with a named CRS member
pub fn write_utm_aoi(path: &Path, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> PathBuf {
    let geojson = format!(
        r#"{{
  "type": "FeatureCollection",
  "crs": {{"type": "name", "properties": {{"name": "urn:ogc:def:crs:EPSG::32630"}}}},
  "features": [
    {{"type": "Feature", "properties": {{}},
      "geometry": {{"type": "Polygon", "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]]}}}}
  ]
}}"#,
        x0 = min_x,
        y0 = min_y,
        x1 = max_x,
        y1 = max_y
    );
    std::fs::write(path, geojson).unwrap();
    path.to_path_buf()
}

/// Small square in central Madrid, WGS84
pub fn write_madrid_aoi(path: &Path) -> PathBuf {
    let geojson = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"name": "Retiro"},
     "geometry": {"type": "Polygon", "coordinates": [[[-3.70, 40.40], [-3.68, 40.40], [-3.68, 40.42], [-3.70, 40.42], [-3.70, 40.40]]]}}
  ]
}"#;
    std::fs::write(path, geojson).unwrap();
    path.to_path_buf()
}
