//! Download → clip → derive → persist orchestration for one scene

use crate::config::PipelineConfig;
use crate::core::cancel::CancellationToken;
use crate::core::clip::ClipProcessor;
use crate::core::indices::{BandRegistry, IndexProcessor};
use crate::core::metadata::MetadataRecorder;
use crate::core::select::ProductSelector;
use crate::io::aoi::AoiShape;
use crate::io::catalog::{BandFilter, Catalog};
use crate::io::store::MetadataSink;
use crate::types::{GreenscanError, GreenscanResult, Product};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Discover,
    Fetch,
    Clip,
    Derive,
    Persist,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "INIT",
            PipelineStage::Discover => "DISCOVER",
            PipelineStage::Fetch => "FETCH",
            PipelineStage::Clip => "CLIP",
            PipelineStage::Derive => "DERIVE",
            PipelineStage::Persist => "PERSIST",
            PipelineStage::Done => "DONE",
            PipelineStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Working directory layout under the base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
    pub root: PathBuf,
    pub download: PathBuf,
    pub processed: PathBuf,
    pub indices: PathBuf,
}

impl WorkDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            download: root.join("download"),
            processed: root.join("processed"),
            indices: root.join("indices"),
            root,
        }
    }

    /// Create every directory; existing ones are kept
    pub fn prepare(&self) -> GreenscanResult<()> {
        for dir in [&self.download, &self.processed, &self.indices] {
            std::fs::create_dir_all(dir).map_err(|e| {
                GreenscanError::Input(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        log::debug!("Working directories ready under {}", self.root.display());
        Ok(())
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub product: Product,
    pub clipped_bands: Vec<PathBuf>,
    pub index_rasters: Vec<PathBuf>,
}

/// Single-use orchestrator for one AOI and date window
pub struct Pipeline<C: Catalog, S: MetadataSink> {
    config: PipelineConfig,
    catalog: C,
    sink: S,
    selector: ProductSelector,
    recorder: MetadataRecorder,
    cancel: CancellationToken,
    stage: PipelineStage,
    history: Vec<PipelineStage>,
}

impl<C: Catalog, S: MetadataSink> Pipeline<C, S> {
    pub fn new(config: PipelineConfig, catalog: C, sink: S) -> GreenscanResult<Self> {
        config.validate()?;
        let selector = ProductSelector::new(BandFilter::for_codes(&config.bands.codes())?);
        let recorder = MetadataRecorder::new(config.store.schema.clone(), config.store.table.clone());
        Ok(Self {
            config,
            catalog,
            sink,
            selector,
            recorder,
            cancel: CancellationToken::new(),
            stage: PipelineStage::Init,
            history: vec![PipelineStage::Init],
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn history(&self) -> &[PipelineStage] {
        &self.history
    }

    fn advance(&mut self, stage: PipelineStage) {
        log::info!("Pipeline stage {} -> {}", self.stage, stage);
        self.stage = stage;
        self.history.push(stage);
    }

    fn enter(&mut self, stage: PipelineStage) -> GreenscanResult<()> {
        self.cancel.check(&stage.to_string())?;
        self.advance(stage);
        Ok(())
    }

    /// Run every stage once.
    ///
    /// Any error moves the pipeline to `FAILED` and is returned as is.
    pub fn run(&mut self) -> GreenscanResult<RunReport> {
        if self.stage != PipelineStage::Init {
            return Err(GreenscanError::Input(format!(
                "Pipeline already ran and is in state {}",
                self.stage
            )));
        }

        match self.execute() {
            Ok(report) => {
                self.advance(PipelineStage::Done);
                log::info!(
                    "Run finished for {}: {} bands, {} indices",
                    report.product.title,
                    report.clipped_bands.len(),
                    report.index_rasters.len()
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Run failed during {}: {}", self.stage, e);
                self.advance(PipelineStage::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> GreenscanResult<RunReport> {
        let dirs = WorkDirs::new(self.config.base_dir()?);
        dirs.prepare()?;
        let aoi = AoiShape::load(&self.config.run.aoi)?;
        let registry: BandRegistry = self.config.bands.clone();

        self.enter(PipelineStage::Discover)?;
        let footprint = aoi.footprint_wkt()?;
        let candidate = self.selector.select(
            &footprint,
            &self.config.date_range()?,
            &self.config.cloud_cover()?,
            &self.catalog,
        )?;

        self.enter(PipelineStage::Fetch)?;
        let fetched = self.selector.retrieve(&candidate, &self.catalog, &dirs.download)?;
        let raw = registry.assign(&fetched)?;
        let raw_paths: Vec<PathBuf> = raw.paths().map(|(_, p)| p.to_path_buf()).collect();

        self.enter(PipelineStage::Clip)?;
        let clipped = ClipProcessor::new(aoi).clip_all(&raw_paths, &dirs.processed, &self.cancel)?;
        let clipped_paths: Vec<PathBuf> = clipped.into_iter().map(|b| b.path).collect();
        if !self.config.run.keep_raw {
            remove_raw(&fetched)?;
        }

        self.enter(PipelineStage::Derive)?;
        let bands = registry.assign(&clipped_paths)?;
        let indices = IndexProcessor::new(self.config.indices).derive_all(&bands, &dirs.indices, &self.cancel)?;

        self.enter(PipelineStage::Persist)?;
        let attributes = self.catalog.get_attributes(&candidate.id)?;
        let product = self.recorder.build_record(&attributes)?;
        self.recorder.record(&product, &self.sink)?;

        Ok(RunReport {
            product,
            clipped_bands: clipped_paths,
            index_rasters: indices.into_iter().map(|r| r.path).collect(),
        })
    }
}

fn remove_raw(files: &[PathBuf]) -> GreenscanResult<()> {
    for file in files {
        std::fs::remove_file(file)?;
        log::debug!("Removed raw band {}", file.display());
    }
    Ok(())
}

/// Derive every index from clipped bands already on disk, skipping the catalog
pub fn derive_from_directory(
    registry: &BandRegistry,
    processor: &IndexProcessor,
    processed_dir: &Path,
    indices_dir: &Path,
) -> GreenscanResult<Vec<PathBuf>> {
    registry.validate()?;
    let bands = registry.scan(processed_dir)?;
    let rasters = processor.derive_all(&bands, indices_dir, &CancellationToken::new())?;
    Ok(rasters.into_iter().map(|r| r.path).collect())
}
