//! Spectral vegetation indices from clipped Sentinel-2 bands
//!
//! Formulas work on unit-scale reflectance. Integer digital numbers are divided
//! by 65535 and nodata samples turned into NaN before any arithmetic, and
//! division follows IEEE-754: `0/0` gives NaN and `x/0` gives an infinity.

use crate::core::cancel::CancellationToken;
use crate::io::band_store::{self, same_crs, StagingDir};
use crate::types::{
    BandRole, GreenscanError, GreenscanResult, IndexKind, IndexRaster, RasterGrid,
    MAX_DIGITAL_NUMBER,
};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping from spectral role to the band code found in file names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRegistry {
    pub blue: String,
    pub green: String,
    pub red: String,
    pub nir: String,
}

impl Default for BandRegistry {
    fn default() -> Self {
        Self {
            blue: "B02".to_string(),
            green: "B03".to_string(),
            red: "B04".to_string(),
            nir: "B08".to_string(),
        }
    }
}

impl BandRegistry {
    pub fn code(&self, role: BandRole) -> &str {
        match role {
            BandRole::Blue => &self.blue,
            BandRole::Green => &self.green,
            BandRole::Red => &self.red,
            BandRole::Nir => &self.nir,
        }
    }

    /// Codes in role order: blue, green, red, nir
    pub fn codes(&self) -> Vec<&str> {
        BandRole::ALL.iter().map(|role| self.code(*role)).collect()
    }

    /// Codes must be non-empty and distinct, and no code may contain another
    pub fn validate(&self) -> GreenscanResult<()> {
        for role in BandRole::ALL {
            if self.code(role).trim().is_empty() {
                return Err(GreenscanError::Config(format!("Empty band code for {}", role)));
            }
        }
        for a in BandRole::ALL {
            for b in BandRole::ALL {
                if a != b && self.code(a).contains(self.code(b)) {
                    return Err(GreenscanError::Config(format!(
                        "Band code {} ({}) overlaps {} ({})",
                        self.code(a),
                        a,
                        self.code(b),
                        b
                    )));
                }
            }
        }
        Ok(())
    }

    /// Assign each role the single path whose file name contains its code
    pub fn assign<P: AsRef<Path>>(&self, paths: &[P]) -> GreenscanResult<BandSet> {
        let mut bands = BTreeMap::new();
        for role in BandRole::ALL {
            let code = self.code(role);
            let matches: Vec<&Path> = paths
                .iter()
                .map(|p| p.as_ref())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| n.contains(code))
                })
                .collect();
            match matches.as_slice() {
                [] => return Err(GreenscanError::MissingBand(code.to_string())),
                [single] => {
                    bands.insert(role, single.to_path_buf());
                }
                many => {
                    return Err(GreenscanError::Input(format!(
                        "Band code {} matches {} files: {:?}",
                        code,
                        many.len(),
                        many
                    )))
                }
            }
        }
        Ok(BandSet { bands })
    }

    /// Scan a directory of clipped bands once and resolve every role
    pub fn scan(&self, dir: &Path) -> GreenscanResult<BandSet> {
        log::debug!("Scanning {} for bands", dir.display());
        if !dir.is_dir() {
            return Err(GreenscanError::Input(format!(
                "Band directory not found: {}",
                dir.display()
            )));
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        self.assign(&paths)
    }
}

/// Resolved band files keyed by role
#[derive(Debug, Clone, PartialEq)]
pub struct BandSet {
    bands: BTreeMap<BandRole, PathBuf>,
}

impl BandSet {
    pub fn path(&self, role: BandRole) -> &Path {
        // every role is filled by BandRegistry::assign
        &self.bands[&role]
    }

    pub fn paths(&self) -> impl Iterator<Item = (BandRole, &Path)> {
        self.bands.iter().map(|(role, path)| (*role, path.as_path()))
    }
}

/// EVI coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EviParams {
    /// Canopy background adjustment
    pub l: f32,
    /// Gain
    pub g: f32,
    /// Aerosol resistance weight on the blue band
    pub c: f32,
}

impl Default for EviParams {
    fn default() -> Self {
        Self {
            l: 2.5,
            g: 2.5,
            c: 6.0,
        }
    }
}

fn check_same_shape(a: &Array2<f32>, b: &Array2<f32>, what: &str) -> GreenscanResult<()> {
    if a.dim() != b.dim() {
        return Err(GreenscanError::BandMismatch(format!(
            "{}: shapes {:?} and {:?} differ",
            what,
            a.dim(),
            b.dim()
        )));
    }
    Ok(())
}

/// `(nir - red) / (nir + red)`
pub fn ndvi(red: &Array2<f32>, nir: &Array2<f32>) -> GreenscanResult<Array2<f32>> {
    check_same_shape(red, nir, "ndvi")?;
    Ok(Zip::from(red)
        .and(nir)
        .par_map_collect(|&r, &n| (n - r) / (n + r)))
}

/// `nir / green - 1`
pub fn gci(green: &Array2<f32>, nir: &Array2<f32>) -> GreenscanResult<Array2<f32>> {
    check_same_shape(green, nir, "gci")?;
    Ok(Zip::from(green)
        .and(nir)
        .par_map_collect(|&g, &n| (n / g) - 1.0))
}

/// `G * (nir - red) / (nir + L*red - C*blue + 1)`
pub fn evi(
    red: &Array2<f32>,
    blue: &Array2<f32>,
    nir: &Array2<f32>,
    params: EviParams,
) -> GreenscanResult<Array2<f32>> {
    check_same_shape(red, blue, "evi")?;
    check_same_shape(red, nir, "evi")?;
    let EviParams { l, g, c } = params;
    Ok(Zip::from(red)
        .and(blue)
        .and(nir)
        .par_map_collect(|&r, &b, &n| g * ((n - r) / (n + (l * r) - (c * b) + 1.0))))
}

/// Scale digital numbers to unit reflectance, nodata becoming NaN
pub fn normalize(grid: &RasterGrid<f32>) -> Array2<f32> {
    let nodata = grid.nodata;
    grid.data.mapv(|dn| match nodata {
        Some(nd) if dn as f64 == nd => f32::NAN,
        _ => dn / MAX_DIGITAL_NUMBER,
    })
}

/// Derives index rasters from a resolved band set
pub struct IndexProcessor {
    evi_params: EviParams,
}

impl IndexProcessor {
    pub fn new(evi_params: EviParams) -> Self {
        Self { evi_params }
    }

    /// Read and normalize the given roles, rejecting misaligned bands
    fn load(
        &self,
        bands: &BandSet,
        roles: &[BandRole],
    ) -> GreenscanResult<BTreeMap<BandRole, RasterGrid<f32>>> {
        let mut loaded: BTreeMap<BandRole, RasterGrid<f32>> = BTreeMap::new();
        for &role in roles {
            let path = bands.path(role);
            let grid = band_store::read_band::<f32>(path)?;
            if let Some((first_role, first)) = loaded.iter().next() {
                check_alignment(*first_role, first, role, &grid)?;
            }
            let normalized = RasterGrid {
                data: normalize(&grid),
                georef: grid.georef,
                nodata: Some(f64::NAN),
            };
            loaded.insert(role, normalized);
        }
        Ok(loaded)
    }

    fn compute(
        &self,
        kind: IndexKind,
        loaded: &BTreeMap<BandRole, RasterGrid<f32>>,
    ) -> GreenscanResult<Array2<f32>> {
        let band = |role: BandRole| -> GreenscanResult<&Array2<f32>> {
            loaded
                .get(&role)
                .map(|g| &g.data)
                .ok_or_else(|| GreenscanError::MissingBand(role.to_string()))
        };
        match kind {
            IndexKind::Ndvi => ndvi(band(BandRole::Red)?, band(BandRole::Nir)?),
            IndexKind::Gci => gci(band(BandRole::Green)?, band(BandRole::Nir)?),
            IndexKind::Evi => evi(
                band(BandRole::Red)?,
                band(BandRole::Blue)?,
                band(BandRole::Nir)?,
                self.evi_params,
            ),
        }
    }

    fn write(
        &self,
        kind: IndexKind,
        bands: &BandSet,
        loaded: &BTreeMap<BandRole, RasterGrid<f32>>,
        indices_dir: &Path,
    ) -> GreenscanResult<IndexRaster> {
        let data = self.compute(kind, loaded)?;
        let reference = &loaded[&kind.reference_role()];
        let grid = RasterGrid {
            data,
            georef: reference.georef.clone(),
            nodata: Some(f64::NAN),
        };

        let path = indices_dir.join(index_file_name(kind, bands.path(kind.naming_role()))?);
        band_store::write_grid(&grid, &path)?;
        log::info!("Wrote {} to {}", kind, path.display());

        Ok(IndexRaster { kind, path, grid })
    }

    /// Compute one index and write it into `indices_dir`
    pub fn derive(
        &self,
        kind: IndexKind,
        bands: &BandSet,
        indices_dir: &Path,
    ) -> GreenscanResult<IndexRaster> {
        log::info!("Deriving {}", kind);
        std::fs::create_dir_all(indices_dir)?;
        let loaded = self.load(bands, kind.required_roles())?;
        self.write(kind, bands, &loaded, indices_dir)
    }

    /// Compute NDVI, GCI and EVI, reading each band once.
    ///
    /// Outputs are staged next to `indices_dir` and moved in together, so a
    /// failure or cancellation part way leaves no index files behind.
    pub fn derive_all(
        &self,
        bands: &BandSet,
        indices_dir: &Path,
        cancel: &CancellationToken,
    ) -> GreenscanResult<Vec<IndexRaster>> {
        self.derive_kinds(bands, indices_dir, |kind| {
            cancel.check(&format!("deriving {}", kind))
        })
    }

    fn derive_kinds<F>(
        &self,
        bands: &BandSet,
        indices_dir: &Path,
        mut checkpoint: F,
    ) -> GreenscanResult<Vec<IndexRaster>>
    where
        F: FnMut(IndexKind) -> GreenscanResult<()>,
    {
        log::info!("Deriving all indices into {}", indices_dir.display());
        let loaded = self.load(bands, &BandRole::ALL)?;
        let staging = StagingDir::new(indices_dir)?;

        let mut outputs = Vec::with_capacity(IndexKind::ALL.len());
        for kind in IndexKind::ALL {
            checkpoint(kind)?;
            outputs.push(self.write(kind, bands, &loaded, staging.path())?);
        }

        let names: Vec<PathBuf> = outputs
            .iter()
            .filter_map(|raster| raster.path.file_name().map(PathBuf::from))
            .collect();
        let committed = staging.commit(&names)?;
        for (raster, path) in outputs.iter_mut().zip(committed) {
            raster.path = path;
        }
        Ok(outputs)
    }
}

impl Default for IndexProcessor {
    fn default() -> Self {
        Self::new(EviParams::default())
    }
}

fn check_alignment(
    a_role: BandRole,
    a: &RasterGrid<f32>,
    b_role: BandRole,
    b: &RasterGrid<f32>,
) -> GreenscanResult<()> {
    if a.shape() != b.shape() {
        return Err(GreenscanError::BandMismatch(format!(
            "{} is {:?} but {} is {:?}",
            a_role,
            a.shape(),
            b_role,
            b.shape()
        )));
    }
    if a.georef.transform != b.georef.transform {
        return Err(GreenscanError::BandMismatch(format!(
            "{} and {} have different geotransforms",
            a_role, b_role
        )));
    }
    if !same_crs(&a.georef.crs_wkt, &b.georef.crs_wkt)? {
        return Err(GreenscanError::BandMismatch(format!(
            "{} and {} have different coordinate reference systems",
            a_role, b_role
        )));
    }
    Ok(())
}

/// `<source-band-stem>_<index>.tif`
pub fn index_file_name(kind: IndexKind, source: &Path) -> GreenscanResult<String> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            GreenscanError::Input(format!("Band path has no file name: {}", source.display()))
        })?;
    Ok(format!("{}_{}.tif", stem, kind))
}
