use crate::types::{GeoReference, GeoTransform, GreenscanError, GreenscanResult, RasterGrid};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Header information of a single-band raster on disk
#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub georef: GeoReference,
    pub dtype: GdalDataType,
    pub nodata: Option<f64>,
}

/// Pixel window inside a raster, in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Open a raster, reporting a missing path as an input error rather than a GDAL failure
pub fn open_raster(path: &Path) -> GreenscanResult<Dataset> {
    if !path.exists() {
        return Err(GreenscanError::Input(format!(
            "Raster not found: {}",
            path.display()
        )));
    }
    Dataset::open(path).map_err(|e| {
        GreenscanError::Input(format!("Cannot open raster {}: {}", path.display(), e))
    })
}

fn georeference(dataset: &Dataset, path: &Path) -> GreenscanResult<GeoReference> {
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let crs_wkt = dataset.projection();
    if crs_wkt.trim().is_empty() {
        return Err(GreenscanError::Input(format!(
            "Raster {} has no coordinate reference system",
            path.display()
        )));
    }
    Ok(GeoReference { transform, crs_wkt })
}

/// Read size, georeferencing, sample type and nodata of band 1
pub fn read_info(path: &Path) -> GreenscanResult<RasterInfo> {
    let dataset = open_raster(path)?;
    let (width, height) = dataset.raster_size();
    let georef = georeference(&dataset, path)?;
    let band = dataset.rasterband(1)?;

    Ok(RasterInfo {
        width,
        height,
        georef,
        dtype: band.band_type(),
        nodata: band.no_data_value(),
    })
}

/// Read a pixel window of band 1 converted to `T`
pub fn read_window<T: GdalType + Copy>(
    path: &Path,
    window: PixelWindow,
) -> GreenscanResult<RasterGrid<T>> {
    let dataset = open_raster(path)?;
    let georef = georeference(&dataset, path)?;
    let band = dataset.rasterband(1)?;

    log::debug!(
        "Reading window {:?} from {}",
        window,
        path.display()
    );

    let buffer = band.read_as::<T>(
        (window.col_off as isize, window.row_off as isize),
        (window.cols, window.rows),
        (window.cols, window.rows),
        None,
    )?;

    let data = Array2::from_shape_vec((window.rows, window.cols), buffer.data)
        .map_err(|e| GreenscanError::Input(format!("Failed to reshape raster data: {}", e)))?;

    Ok(RasterGrid {
        data,
        georef: GeoReference {
            transform: georef.transform.shifted(window.row_off, window.col_off),
            crs_wkt: georef.crs_wkt,
        },
        nodata: band.no_data_value(),
    })
}

/// Read all of band 1 converted to `T`
pub fn read_band<T: GdalType + Copy>(path: &Path) -> GreenscanResult<RasterGrid<T>> {
    let info = read_info(path)?;
    read_window(
        path,
        PixelWindow {
            row_off: 0,
            col_off: 0,
            rows: info.height,
            cols: info.width,
        },
    )
}

/// Write a grid as a single-band GeoTIFF.
///
/// The raster is created under a temporary name in the destination directory
/// and renamed over `output_path` only once GDAL has flushed and closed it, so
/// readers never observe a partially written file and an existing output is
/// replaced in one step.
pub fn write_grid<T: GdalType + Copy>(
    grid: &RasterGrid<T>,
    output_path: &Path,
) -> GreenscanResult<()> {
    let (height, width) = grid.shape();
    if height == 0 || width == 0 {
        return Err(GreenscanError::Input(format!(
            "Refusing to write empty raster {}",
            output_path.display()
        )));
    }

    let dir = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp_path = tempfile::Builder::new()
        .prefix(".greenscan-")
        .suffix(".tif")
        .tempfile_in(dir)?
        .into_temp_path();

    {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<T, _>(
            &temp_path,
            width as isize,
            height as isize,
            1,
        )?;

        dataset.set_geo_transform(&grid.georef.transform.to_gdal())?;
        dataset.set_projection(&grid.georef.crs_wkt)?;

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<T> = grid.data.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        if let Some(nodata) = grid.nodata {
            rasterband.set_no_data_value(Some(nodata))?;
        }
    }

    temp_path
        .persist(output_path)
        .map_err(|e| GreenscanError::Io(e.error))?;

    log::debug!("Wrote {}x{} raster to {}", width, height, output_path.display());
    Ok(())
}

/// Whether two WKT strings describe the same coordinate reference system
pub fn same_crs(a_wkt: &str, b_wkt: &str) -> GreenscanResult<bool> {
    if a_wkt == b_wkt {
        return Ok(true);
    }
    let a = SpatialRef::from_wkt(a_wkt)?;
    let b = SpatialRef::from_wkt(b_wkt)?;
    Ok(a == b)
}

/// Hidden scratch directory inside an output directory.
///
/// A stage writes every output here and calls `commit` once all of them
/// succeeded; dropping it without committing removes the partial outputs, so
/// the target directory only ever receives complete sets.
pub struct StagingDir {
    dir: tempfile::TempDir,
    target: PathBuf,
}

impl StagingDir {
    pub fn new(target: &Path) -> GreenscanResult<Self> {
        std::fs::create_dir_all(target)?;
        let dir = tempfile::Builder::new()
            .prefix(".greenscan-stage-")
            .tempdir_in(target)?;
        Ok(Self {
            dir,
            target: target.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Move staged files, given relative to the staging directory, into the target
    pub fn commit<P: AsRef<Path>>(self, relative: &[P]) -> GreenscanResult<Vec<PathBuf>> {
        let mut moved = Vec::with_capacity(relative.len());
        for rel in relative {
            let rel = rel.as_ref();
            let destination = self.target.join(rel);
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(self.dir.path().join(rel), &destination)?;
            moved.push(destination);
        }
        log::debug!("Committed {} files into {}", moved.len(), self.target.display());
        Ok(moved)
    }
}
