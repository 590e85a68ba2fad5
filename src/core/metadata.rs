//! Normalized scene metadata and its GeoJSON shape

use crate::io::store::MetadataSink;
use crate::types::{GreenscanError, GreenscanResult, Product, RawAttributes};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use gdal::vector::{Geometry, ToGdal};
use geo::{Line, Polygon};
use serde_json::{json, Value};

/// Table the recorder appends to
pub const DEFAULT_TABLE: &str = "image_meta";
/// Schema of that table
pub const DEFAULT_SCHEMA: &str = "sa";

/// Parse a WKT polygon, rejecting open or self-intersecting rings
pub fn parse_footprint(wkt: &str) -> GreenscanResult<Polygon<f64>> {
    let geometry = Geometry::from_wkt(wkt)
        .map_err(|e| GreenscanError::Metadata(format!("Invalid footprint WKT: {}", e)))?
        .to_geo()
        .map_err(|e| GreenscanError::Metadata(format!("Invalid footprint geometry: {}", e)))?;

    let polygon = match geometry {
        geo::Geometry::Polygon(p) => p,
        geo::Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => mp.0.remove(0),
        _ => {
            return Err(GreenscanError::Metadata(
                "Footprint is not a single polygon".to_string(),
            ))
        }
    };

    let ring: Vec<_> = polygon.exterior().0.clone();
    if ring.len() < 4 || ring.first() != ring.last() {
        return Err(GreenscanError::Metadata(
            "Footprint exterior ring is not closed".to_string(),
        ));
    }
    if ring_self_intersects(&ring) {
        return Err(GreenscanError::Metadata(
            "Footprint exterior ring intersects itself".to_string(),
        ));
    }
    Ok(polygon)
}

fn ring_self_intersects(ring: &[geo::Coord<f64>]) -> bool {
    use geo::line_intersection::line_intersection;

    let segments: Vec<Line<f64>> = ring.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(geo::LineIntersection::SinglePoint { is_proper, .. }) => {
                    if is_proper || !adjacent {
                        return true;
                    }
                }
                Some(geo::LineIntersection::Collinear { .. }) => return true,
            }
        }
    }
    false
}

fn required<'a>(raw: &'a RawAttributes, key: &str) -> GreenscanResult<&'a serde_json::Value> {
    match raw.get(key) {
        Some(Value::Null) | None => Err(GreenscanError::Metadata(format!(
            "Required attribute '{}' is missing",
            key
        ))),
        Some(value) => Ok(value),
    }
}

fn required_str(raw: &RawAttributes, key: &str) -> GreenscanResult<String> {
    match required(raw, key)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(GreenscanError::Metadata(format!(
            "Attribute '{}' is not text: {}",
            key, other
        ))),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn optional_number(raw: &RawAttributes, key: &str) -> Option<f64> {
    raw.get(key).and_then(as_number)
}

fn optional_str(raw: &RawAttributes, key: &str) -> Option<String> {
    match raw.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC
pub fn parse_timestamp(text: &str) -> GreenscanResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(GreenscanError::Metadata(format!("Unparseable date: {}", text)))
}

/// Assemble the normalized record from the catalog's attribute dictionary
pub fn build_record(raw: &RawAttributes) -> GreenscanResult<Product> {
    let cloud_value = required(raw, "Cloud cover percentage")?;
    let cloud_cover_percentage = as_number(cloud_value).ok_or_else(|| {
        GreenscanError::Metadata(format!("Cloud cover percentage is not numeric: {}", cloud_value))
    })?;
    if !(0.0..=100.0).contains(&cloud_cover_percentage) {
        return Err(GreenscanError::Metadata(format!(
            "Cloud cover percentage {} outside 0-100",
            cloud_cover_percentage
        )));
    }

    let product = Product {
        id: required_str(raw, "id")?,
        title: required_str(raw, "title")?,
        footprint: parse_footprint(&required_str(raw, "footprint")?)?,
        acquisition_date: parse_timestamp(&required_str(raw, "date")?)?,
        cloud_cover_percentage,
        processing_level: required_str(raw, "Processing level")?,
        product_type: required_str(raw, "Product type")?,
        quicklook_url: required_str(raw, "quicklook_url")?,
        identifier: optional_str(raw, "Identifier"),
        size: optional_str(raw, "Size"),
        illumination_azimuth_angle: optional_number(raw, "Illumination Azimuth Angle"),
        illumination_zenith_angle: optional_number(raw, "Illumination Zenith Angle"),
    };
    log::debug!("Built metadata record for {}", product.id);
    Ok(product)
}

/// Builds product records and appends them to the persistence sink
pub struct MetadataRecorder {
    schema: String,
    table: String,
}

impl MetadataRecorder {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn build_record(&self, raw: &RawAttributes) -> GreenscanResult<Product> {
        build_record(raw)
    }

    /// Append one row; earlier rows with the same id are left alone
    pub fn record<S: MetadataSink + ?Sized>(&self, product: &Product, sink: &S) -> GreenscanResult<()> {
        log::info!(
            "Recording metadata for {} into {}.{}",
            product.id,
            self.schema,
            self.table
        );
        sink.append_row(&self.schema, &self.table, product)
    }
}

impl Default for MetadataRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA, DEFAULT_TABLE)
    }
}

fn ring_coordinates(ring: &geo::LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

impl Product {
    /// GeoJSON Feature with the properties the map viewer reads
    pub fn to_feature(&self) -> Value {
        let mut rings = vec![ring_coordinates(self.footprint.exterior())];
        rings.extend(self.footprint.interiors().iter().map(ring_coordinates));
        json!({
            "type": "Feature",
            "id": self.id,
            "geometry": {
                "type": "Polygon",
                "coordinates": rings,
            },
            "properties": {
                "Date": self.acquisition_date.to_rfc3339(),
                "Processing Level": self.processing_level,
                "Cloud Cover Percentage": self.cloud_cover_percentage,
                "Product Type": self.product_type,
            }
        })
    }
}

/// GeoJSON FeatureCollection of footprints
pub fn feature_collection(products: &[Product]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": products.iter().map(Product::to_feature).collect::<Vec<_>>(),
    })
}

/// Serde adapter storing a polygon as WKT text
pub mod polygon_wkt {
    use super::*;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(polygon: &Polygon<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let wkt = polygon
            .to_gdal()
            .and_then(|g| g.wkt())
            .map_err(ser::Error::custom)?;
        serializer.serialize_str(&wkt)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Polygon<f64>, D::Error> {
        let wkt = String::deserialize(deserializer)?;
        parse_footprint(&wkt).map_err(de::Error::custom)
    }
}
