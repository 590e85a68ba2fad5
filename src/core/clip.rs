use crate::core::cancel::CancellationToken;
use crate::io::aoi::AoiShape;
use crate::io::band_store::{self, PixelWindow, RasterInfo, StagingDir};
use crate::types::{BandRaster, GeoReference, GeoTransform, GreenscanError, GreenscanResult};
use gdal::raster::{GdalDataType, GdalType};
use ndarray::{Array2, Zip};
use num_traits::{NumCast, Zero};
use std::path::Path;

/// Pixel window of a raster covered by the AOI bounding box.
///
/// The box is rounded outward to whole pixels and intersected with the raster
/// extent; `None` means the box misses the raster entirely.
pub fn aoi_window(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    aoi: &AoiShape,
) -> GreenscanResult<Option<PixelWindow>> {
    if !transform.is_north_up() {
        return Err(GreenscanError::Clip(
            "Rotated geotransforms are not supported".to_string(),
        ));
    }
    let Some(bounds) = aoi.bounds() else {
        return Ok(None);
    };

    let c1 = (bounds.min_x - transform.top_left_x) / transform.pixel_width;
    let c2 = (bounds.max_x - transform.top_left_x) / transform.pixel_width;
    let r1 = (bounds.min_y - transform.top_left_y) / transform.pixel_height;
    let r2 = (bounds.max_y - transform.top_left_y) / transform.pixel_height;

    let col_lo = c1.min(c2).floor().max(0.0);
    let col_hi = c1.max(c2).ceil().min(width as f64);
    let row_lo = r1.min(r2).floor().max(0.0);
    let row_hi = r1.max(r2).ceil().min(height as f64);

    if !(col_hi > col_lo && row_hi > row_lo) {
        return Ok(None);
    }

    Ok(Some(PixelWindow {
        row_off: row_lo as usize,
        col_off: col_lo as usize,
        rows: (row_hi - row_lo) as usize,
        cols: (col_hi - col_lo) as usize,
    }))
}

/// Cells whose centre falls inside the AOI
pub fn coverage_mask(shape: (usize, usize), transform: &GeoTransform, aoi: &AoiShape) -> Array2<bool> {
    let mut mask = Array2::from_elem(shape, false);
    Zip::indexed(&mut mask).par_for_each(|(row, col), inside| {
        let (x, y) = transform.pixel_center(row, col);
        *inside = aoi.covers(x, y);
    });
    mask
}

/// Set every cell outside `mask` to `fill`
pub fn apply_mask<T: Copy + Send + Sync>(data: &mut Array2<T>, mask: &Array2<bool>, fill: T) {
    Zip::from(data).and(mask).par_for_each(|value, &inside| {
        if !inside {
            *value = fill;
        }
    });
}

/// Crops and masks single-band rasters to an area of interest
pub struct ClipProcessor {
    aoi: AoiShape,
}

impl ClipProcessor {
    pub fn new(aoi: AoiShape) -> Self {
        Self { aoi }
    }

    pub fn aoi(&self) -> &AoiShape {
        &self.aoi
    }

    /// Clip one raster to the AOI and write the result to `output_path`.
    ///
    /// The output keeps the source CRS, pixel size and sample type, covers the
    /// minimal window around the AOI and holds nodata outside the polygon.
    /// Nothing is written when the AOI and raster do not overlap.
    pub fn clip<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        raster_path: P,
        output_path: Q,
    ) -> GreenscanResult<BandRaster> {
        let raster_path = raster_path.as_ref();
        let output_path = output_path.as_ref();
        log::info!("Clipping {} to AOI", raster_path.display());

        let info = band_store::read_info(raster_path)?;
        let aoi = self.aoi.reproject_to(&info.georef.crs_wkt)?;

        let window = aoi_window(&info.georef.transform, info.width, info.height, &aoi)?
            .ok_or_else(|| {
                GreenscanError::Clip(format!(
                    "AOI does not intersect raster {}",
                    raster_path.display()
                ))
            })?;
        log::debug!(
            "Raster {}x{}, clip window {:?}",
            info.width,
            info.height,
            window
        );

        match info.dtype {
            GdalDataType::UInt8 => clip_typed::<u8>(raster_path, output_path, &info, window, &aoi),
            GdalDataType::UInt16 => clip_typed::<u16>(raster_path, output_path, &info, window, &aoi),
            GdalDataType::Int16 => clip_typed::<i16>(raster_path, output_path, &info, window, &aoi),
            GdalDataType::UInt32 => clip_typed::<u32>(raster_path, output_path, &info, window, &aoi),
            GdalDataType::Int32 => clip_typed::<i32>(raster_path, output_path, &info, window, &aoi),
            GdalDataType::Float32 => clip_typed::<f32>(raster_path, output_path, &info, window, &aoi),
            GdalDataType::Float64 => clip_typed::<f64>(raster_path, output_path, &info, window, &aoi),
            other => Err(GreenscanError::Input(format!(
                "Unsupported sample type {:?} in {}",
                other,
                raster_path.display()
            ))),
        }
    }

    /// Clip every band into `output_dir`, replacing earlier outputs of the same name.
    ///
    /// Outputs are named after the source file stem with a `.tif` extension so
    /// the band code survives. Results follow the input order. Bands are clipped
    /// into a staging directory and moved into `output_dir` only when every band
    /// succeeded; on any error `output_dir` is left as it was.
    pub fn clip_all<P: AsRef<Path> + Sync>(
        &self,
        bands: &[P],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> GreenscanResult<Vec<BandRaster>> {
        log::info!("Clipping {} bands into {}", bands.len(), output_dir.display());
        let staging = StagingDir::new(output_dir)?;

        let jobs: Vec<(&Path, String)> = bands
            .iter()
            .map(|band| {
                let band = band.as_ref();
                clipped_name(band).map(|name| (band, name))
            })
            .collect::<GreenscanResult<_>>()?;

        let run = |(source, name): &(&Path, String)| -> GreenscanResult<BandRaster> {
            cancel.check(&format!("clipping {}", source.display()))?;
            self.clip(source, staging.path().join(name))
        };

        #[cfg(feature = "parallel")]
        let results: Vec<GreenscanResult<BandRaster>> = {
            use rayon::prelude::*;
            jobs.par_iter().map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<GreenscanResult<BandRaster>> = jobs.iter().map(run).collect();

        let mut clipped = results.into_iter().collect::<GreenscanResult<Vec<_>>>()?;
        cancel.check("committing clipped bands")?;

        let names: Vec<&str> = jobs.iter().map(|(_, name)| name.as_str()).collect();
        let committed = staging.commit(&names)?;
        for (band, path) in clipped.iter_mut().zip(committed) {
            band.path = path;
        }
        log::info!("Clipped {} bands", clipped.len());
        Ok(clipped)
    }
}

/// `<stem>.tif` for a source band file
pub fn clipped_name(band: &Path) -> GreenscanResult<String> {
    band.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| format!("{}.tif", stem))
        .ok_or_else(|| {
            GreenscanError::Input(format!("Band path has no file name: {}", band.display()))
        })
}

/// Band code parsed from a Sentinel-2 file name such as `..._B04_10m.jp2`
pub fn band_code_of(path: &Path) -> String {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    name.split('_')
        .find(|part| part.len() == 3 && part.starts_with('B') && part[1..].chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(name)
        .to_string()
}

fn clip_typed<T>(
    raster_path: &Path,
    output_path: &Path,
    info: &RasterInfo,
    window: PixelWindow,
    aoi: &AoiShape,
) -> GreenscanResult<BandRaster>
where
    T: GdalType + Copy + Send + Sync + NumCast + Zero,
{
    let mut grid = band_store::read_window::<T>(raster_path, window)?;

    let fill: T = match info.nodata {
        Some(nodata) => NumCast::from(nodata).ok_or_else(|| {
            GreenscanError::Input(format!(
                "Nodata value {} does not fit the sample type of {}",
                nodata,
                raster_path.display()
            ))
        })?,
        None => T::zero(),
    };

    let mask = coverage_mask(grid.shape(), &grid.georef.transform, aoi);
    let covered = mask.iter().filter(|&&inside| inside).count();
    if covered == 0 {
        return Err(GreenscanError::Clip(format!(
            "AOI covers no pixel centre of raster {}",
            raster_path.display()
        )));
    }
    apply_mask(&mut grid.data, &mask, fill);
    grid.nodata = Some(info.nodata.unwrap_or(0.0));

    band_store::write_grid(&grid, output_path)?;
    log::debug!(
        "{} of {} pixels inside AOI for {}",
        covered,
        mask.len(),
        output_path.display()
    );

    Ok(BandRaster {
        band_code: band_code_of(raster_path),
        path: output_path.to_path_buf(),
        width: window.cols,
        height: window.rows,
        georef: GeoReference {
            transform: grid.georef.transform,
            crs_wkt: grid.georef.crs_wkt,
        },
        dtype: info.dtype,
        nodata: grid.nodata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::types::RasterGrid;
    use gdal::spatial_ref::SpatialRef;
    use geo::{polygon, MultiPolygon};
    use tempfile::TempDir;

    fn utm_wkt() -> String {
        SpatialRef::from_epsg(32630).unwrap().to_wkt().unwrap()
    }

    fn transform() -> GeoTransform {
        GeoTransform::from_gdal([400000.0, 10.0, 0.0, 4500000.0, 0.0, -10.0])
    }

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> AoiShape {
        let poly = polygon![
            (x: min_x, y: min_y),
            (x: max_x, y: min_y),
            (x: max_x, y: max_y),
            (x: min_x, y: max_y),
            (x: min_x, y: min_y),
        ];
        AoiShape::new(MultiPolygon::new(vec![poly]), utm_wkt())
    }

    fn write_band(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let grid = RasterGrid {
            data: Array2::from_shape_fn((100, 100), |(r, c)| (1000 + r * 100 + c) as u16),
            georef: GeoReference { transform: transform(), crs_wkt: utm_wkt() },
            nodata: None,
        };
        band_store::write_grid(&grid, &path).unwrap();
        path
    }

    #[test]
    fn test_window_rounds_outward_and_clamps() {
        let aoi = square(400105.0, 4499795.0, 400195.0, 4499895.0);
        let window = aoi_window(&transform(), 100, 100, &aoi).unwrap().unwrap();
        assert_eq!(window, PixelWindow { row_off: 10, col_off: 10, rows: 11, cols: 10 });

        // half outside on the left edge
        let aoi = square(399950.0, 4499900.0, 400050.0, 4500000.0);
        let window = aoi_window(&transform(), 100, 100, &aoi).unwrap().unwrap();
        assert_eq!(window, PixelWindow { row_off: 0, col_off: 0, rows: 10, cols: 5 });

        let outside = square(500000.0, 4400000.0, 500100.0, 4400100.0);
        assert!(aoi_window(&transform(), 100, 100, &outside).unwrap().is_none());
    }

    #[test]
    fn test_mask_triangle() {
        let poly = polygon![
            (x: 400000.0, y: 4500000.0),
            (x: 400040.0, y: 4500000.0),
            (x: 400000.0, y: 4499960.0),
            (x: 400000.0, y: 4500000.0),
        ];
        let aoi = AoiShape::new(MultiPolygon::new(vec![poly]), utm_wkt());
        let mask = coverage_mask((4, 4), &transform(), &aoi);
        assert!(mask[[0, 0]]);
        assert!(mask[[0, 2]]);
        assert!(!mask[[3, 3]]);
        assert!(!mask[[2, 2]]);

        let mut data = Array2::from_elem((4, 4), 7u16);
        apply_mask(&mut data, &mask, 0);
        assert_eq!(data[[0, 0]], 7);
        assert_eq!(data[[3, 3]], 0);
    }

    #[test]
    fn test_clip_preserves_type_and_georeference() {
        let dir = TempDir::new().unwrap();
        let source = write_band(dir.path(), "T30TVK_B04_10m.tif");
        let output = dir.path().join("out").join("T30TVK_B04_10m.tif");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();

        let clipper = ClipProcessor::new(square(400200.0, 4499500.0, 400400.0, 4499700.0));
        let band = clipper.clip(&source, &output).unwrap();

        assert_eq!(band.band_code, "B04");
        assert_eq!((band.width, band.height), (20, 20));
        assert_eq!(band.dtype, GdalDataType::UInt16);
        assert_eq!(band.georef.transform.top_left_x, 400200.0);
        assert_eq!(band.georef.transform.top_left_y, 4499700.0);
        assert_eq!(band.georef.transform.pixel_width, 10.0);

        let grid = band_store::read_band::<u16>(&output).unwrap();
        // row 30, col 20 of the source
        assert_eq!(grid.data[[0, 0]], 1000 + 30 * 100 + 20);
        assert_eq!(grid.nodata, Some(0.0));
    }

    #[test]
    fn test_disjoint_aoi_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let source = write_band(dir.path(), "T30TVK_B02_10m.tif");
        let output = dir.path().join("clipped_B02.tif");

        let clipper = ClipProcessor::new(square(600000.0, 4000000.0, 602000.0, 4002000.0));
        let result = clipper.clip(&source, &output);

        assert!(matches!(result, Err(GreenscanError::Clip(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_band_code_of() {
        assert_eq!(band_code_of(Path::new("T30TVK_20221001T105031_B08_10m.jp2")), "B08");
        assert_eq!(band_code_of(Path::new("/x/T30TVK_20221001T105031_B02_10m.tif")), "B02");
        assert_eq!(clipped_name(Path::new("/a/b/T30_B03_10m.jp2")).unwrap(), "T30_B03_10m.tif");
    }
}
