//! Area-of-interest loading and reprojection

use crate::io::band_store::same_crs;
use crate::types::{BoundingBox, GreenscanError, GreenscanResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::{LayerAccess, ToGdal};
use gdal::Dataset;
use geo::{BoundingRect, Intersects, MultiPolygon, Point, Polygon};
use std::path::Path;

/// Clip boundary: the union of every polygon found in the AOI file, with its CRS
#[derive(Debug, Clone)]
pub struct AoiShape {
    pub geometry: MultiPolygon<f64>,
    pub crs_wkt: String,
}

fn traditional_order(srs: &SpatialRef) {
    srs.set_axis_mapping_strategy(
        gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER,
    );
}

fn wgs84_wkt() -> GreenscanResult<String> {
    Ok(SpatialRef::from_epsg(4326)?.to_wkt()?)
}

impl AoiShape {
    pub fn new(geometry: MultiPolygon<f64>, crs_wkt: impl Into<String>) -> Self {
        Self {
            geometry,
            crs_wkt: crs_wkt.into(),
        }
    }

    /// Load the polygons of the first layer of a vector file.
    ///
    /// Polygon and multipolygon features are merged into one multipolygon;
    /// other geometry types are skipped. Layers without a spatial reference are
    /// taken to be EPSG:4326, which is what GeoJSON mandates.
    pub fn load<P: AsRef<Path>>(path: P) -> GreenscanResult<Self> {
        let path = path.as_ref();
        log::info!("Loading area of interest from: {}", path.display());

        if !path.exists() {
            return Err(GreenscanError::Input(format!(
                "AOI file not found: {}",
                path.display()
            )));
        }

        let dataset = Dataset::open(path).map_err(|e| {
            GreenscanError::Input(format!("Cannot read AOI file {}: {}", path.display(), e))
        })?;
        let mut layer = dataset.layer(0).map_err(|e| {
            GreenscanError::Input(format!("AOI file {} has no layer: {}", path.display(), e))
        })?;

        let crs_wkt = match layer.spatial_ref() {
            Some(srs) => srs.to_wkt().map_err(|e| {
                GreenscanError::Input(format!("AOI file {} has an unreadable CRS: {}", path.display(), e))
            })?,
            None => {
                log::warn!("AOI layer has no spatial reference, assuming EPSG:4326");
                wgs84_wkt()?
            }
        };

        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        for (i, feature) in layer.features().enumerate() {
            let Some(geometry) = feature.geometry() else {
                log::warn!("AOI feature {} has no geometry, skipping", i);
                continue;
            };
            let geometry = geometry.to_geo().map_err(|e| {
                GreenscanError::Input(format!("AOI feature {} has an unreadable geometry: {}", i, e))
            })?;
            match geometry {
                geo::Geometry::Polygon(p) => polygons.push(p),
                geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                other => log::warn!(
                    "AOI feature {} is not polygonal ({}), skipping",
                    i,
                    geometry_name(&other)
                ),
            }
        }

        if polygons.is_empty() {
            return Err(GreenscanError::Input(format!(
                "AOI file {} contains no polygon geometry",
                path.display()
            )));
        }
        if polygons.len() > 1 {
            log::info!("AOI holds {} polygons, using their union", polygons.len());
        }

        Ok(Self::new(MultiPolygon::new(polygons), crs_wkt))
    }

    /// Express the AOI in the target CRS; returns a copy when the CRS already matches
    pub fn reproject_to(&self, target_crs_wkt: &str) -> GreenscanResult<AoiShape> {
        let crs_error = |e: GreenscanError| GreenscanError::Clip(format!("Cannot resolve AOI CRS: {}", e));
        if same_crs(&self.crs_wkt, target_crs_wkt).map_err(crs_error)? {
            return Ok(self.clone());
        }

        log::debug!("Reprojecting AOI into raster CRS");
        let source = SpatialRef::from_wkt(&self.crs_wkt)
            .map_err(|e| GreenscanError::Clip(format!("Cannot parse AOI CRS: {}", e)))?;
        let target = SpatialRef::from_wkt(target_crs_wkt)
            .map_err(|e| GreenscanError::Clip(format!("Cannot parse target CRS: {}", e)))?;
        traditional_order(&source);
        traditional_order(&target);

        let transform = CoordTransform::new(&source, &target).map_err(|e| {
            GreenscanError::Clip(format!("Cannot build AOI coordinate transformation: {}", e))
        })?;

        let reprojected = self
            .geometry
            .to_gdal()
            .and_then(|geometry| geometry.transform(&transform))
            .and_then(|geometry| geometry.to_geo())
            .map_err(|e| GreenscanError::Clip(format!("AOI reprojection failed: {}", e)))?;

        let geometry = match reprojected {
            geo::Geometry::MultiPolygon(mp) => mp,
            geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            other => {
                return Err(GreenscanError::Clip(format!(
                    "AOI reprojection produced a {}",
                    geometry_name(&other)
                )))
            }
        };

        Ok(AoiShape::new(geometry, target_crs_wkt))
    }

    /// AOI as WKT in EPSG:4326, the form catalog searches expect
    pub fn footprint_wkt(&self) -> GreenscanResult<String> {
        let wgs84 = self.reproject_to(&wgs84_wkt()?)?;
        let geometry = if wgs84.geometry.0.len() == 1 {
            wgs84.geometry.0[0].to_gdal()
        } else {
            wgs84.geometry.to_gdal()
        };
        geometry
            .and_then(|g| g.wkt())
            .map_err(|e| GreenscanError::Clip(format!("Cannot write AOI footprint: {}", e)))
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.geometry.bounding_rect().map(|rect| BoundingBox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    /// Boundary-inclusive point test in the AOI's own CRS
    pub fn covers(&self, x: f64, y: f64) -> bool {
        self.geometry.intersects(&Point::new(x, y))
    }
}

fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
