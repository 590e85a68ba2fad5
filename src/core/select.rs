use crate::io::catalog::{BandFilter, Catalog, CatalogQuery};
use crate::types::{Candidate, CloudCoverRange, DateRange, GreenscanError, GreenscanResult};
use std::path::{Path, PathBuf};

/// Platform searched by this deployment
pub const PLATFORM: &str = "Sentinel-2";

/// Processing level searched by this deployment
pub const PROCESSING_LEVEL: &str = "Level-2A";

/// Order candidates by ascending cloud cover, ties broken by id
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        a.cloud_cover_percentage
            .total_cmp(&b.cloud_cover_percentage)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates
}

/// Chooses one scene from the catalog and retrieves its bands
pub struct ProductSelector {
    platform: String,
    processing_level: String,
    band_filter: BandFilter,
}

impl ProductSelector {
    pub fn new(band_filter: BandFilter) -> Self {
        Self {
            platform: PLATFORM.to_string(),
            processing_level: PROCESSING_LEVEL.to_string(),
            band_filter,
        }
    }

    pub fn band_filter(&self) -> &BandFilter {
        &self.band_filter
    }

    /// Query the catalog and pick the least cloudy candidate.
    ///
    /// An empty result is `NoProductFound`; transport failures surface as
    /// whatever the catalog reported, typically `CatalogUnavailable`.
    pub fn select<C: Catalog + ?Sized>(
        &self,
        footprint_wkt: &str,
        date_range: &DateRange,
        cloud_cover: &CloudCoverRange,
        catalog: &C,
    ) -> GreenscanResult<Candidate> {
        let query = CatalogQuery {
            footprint_wkt: footprint_wkt.to_string(),
            date_range: DateRange::new(date_range.start, date_range.end)?,
            platform: self.platform.clone(),
            processing_level: self.processing_level.clone(),
            cloud_cover: CloudCoverRange::new(cloud_cover.min, cloud_cover.max)?,
        };

        let candidates = catalog.query(&query)?;
        log::debug!("{} candidates before ranking", candidates.len());

        let best = rank_candidates(candidates).into_iter().next().ok_or_else(|| {
            GreenscanError::NoProductFound(format!(
                "no {} {} scene between {} and {} with cloud cover {}-{}%",
                self.platform,
                self.processing_level,
                date_range.start,
                date_range.end,
                cloud_cover.min,
                cloud_cover.max
            ))
        })?;

        log::info!(
            "Selected {} ({}) with {:.2}% cloud cover",
            best.title,
            best.id,
            best.cloud_cover_percentage
        );
        Ok(best)
    }

    /// Download the 10 m visible and near-infrared bands of the chosen scene
    pub fn retrieve<C: Catalog + ?Sized>(
        &self,
        candidate: &Candidate,
        catalog: &C,
        download_dir: &Path,
    ) -> GreenscanResult<Vec<PathBuf>> {
        let mut files = catalog.fetch(&candidate.id, &candidate.title, &self.band_filter, download_dir)?;
        files.sort();
        log::info!("Retrieved {} band files for {}", files.len(), candidate.title);
        Ok(files)
    }
}
