//! Per-band extraction pipeline
//!
//! Raw collections are corrected scene by scene (harmonize, mask, optional
//! indices), merged across sensor families, then reduced once per configured
//! band into a tall table and a day-resolved wide table.

use crate::config::PipelineConfig;
use crate::core::{
    check_join_integrity, granule_table, pivot_wide, tall_table, BandHarmonizer, DayMerger,
    IndexDeriver, QualityMaskBuilder, TemporalMerger, ZonalExtractor,
};
use crate::io::{write_band_tables, SceneSource};
use crate::types::{BandTables, Band, RawScene, Region, Scene, SeriesError, SeriesResult};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct Pipeline {
    config: PipelineConfig,
    regions: Vec<Region>,
    extractor: ZonalExtractor,
    day_merger: DayMerger,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> SeriesResult<Self> {
        config.validate()?;
        let regions = config.regions()?;
        let extractor = ZonalExtractor::with_scale(config.scale)?;
        let day_merger = DayMerger::new()?;

        log::info!(
            "Pipeline: {} regions, {} sensor windows, {} bands, scale {}",
            regions.len(),
            config.sensors.len(),
            config.bands.len(),
            config.scale
        );

        Ok(Self {
            config,
            regions,
            extractor,
            day_merger,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Harmonize, mask and (when enabled) derive indices for one raw scene
    pub fn correct_scene(&self, raw: &RawScene) -> SeriesResult<Scene> {
        let scene = BandHarmonizer::harmonize(raw)?;
        let mask = QualityMaskBuilder::build(raw)?;
        let scene = QualityMaskBuilder::apply(scene, &mask)?;
        if self.config.derive_indices {
            IndexDeriver::derive(scene)
        } else {
            Ok(scene)
        }
    }

    /// Correct a collection, skipping scenes whose schema or shape is unusable
    fn correct_collection(&self, raws: &[RawScene]) -> SeriesResult<Vec<Scene>> {
        #[cfg(feature = "parallel")]
        let results: Vec<SeriesResult<Scene>> = {
            use rayon::prelude::*;
            raws.par_iter().map(|raw| self.correct_scene(raw)).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<SeriesResult<Scene>> =
            raws.iter().map(|raw| self.correct_scene(raw)).collect();

        let mut scenes = Vec::with_capacity(results.len());
        for (raw, result) in raws.iter().zip(results) {
            match result {
                Ok(scene) => {
                    log::debug!(
                        "Corrected {} ({}): {:.1}% valid",
                        scene.id,
                        scene.timestamp_key(),
                        scene.valid_fraction() * 100.0
                    );
                    scenes.push(scene)
                }
                Err(e) if e.is_scene_local() => {
                    log::warn!("Skipping scene {}: {}", raw.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scenes)
    }

    /// Load every configured family, correct its scenes and merge them into
    /// one time-ordered collection
    pub fn prepare_scenes<S: SceneSource + ?Sized>(&self, source: &S) -> SeriesResult<Vec<Scene>> {
        let start = Instant::now();
        let mut collections = Vec::with_capacity(self.config.sensors.len());

        for window in &self.config.sensors {
            let collection = source
                .load_collection(window.sensor.dataset_id())?
                .filter_date(window.start, window.end)
                .filter_bounds(&self.regions);
            log::info!(
                "{}: {} candidate scenes from {}",
                window.sensor,
                collection.len(),
                window.sensor.dataset_id()
            );

            let scenes = self.correct_collection(collection.scenes())?;
            collections.push((window.sensor, scenes));
        }

        let merged = TemporalMerger::new(self.config.sensors.clone()).merge(collections, &self.regions);
        log::info!(
            "Prepared {} scenes in {:.2} seconds",
            merged.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(merged)
    }

    /// Tall and wide tables of one band over a prepared collection.
    ///
    /// The wide pivot gets one column per scene, is checked against those
    /// records, and only then are same-day granules resolved to their maximum.
    pub fn extract_band(&self, band: Band, scenes: &[Scene]) -> SeriesResult<BandTables> {
        if band.is_index() && !self.config.derive_indices {
            return Err(SeriesError::Config(format!(
                "Band {} requires index derivation",
                band
            )));
        }

        let observations = self.extractor.extract(band, scenes, &self.regions);

        let granules = granule_table(&observations);
        let wide = pivot_wide(&granules, self.regions.iter().map(|r| r.id()));
        check_join_integrity(&granules, &wide)?;
        let wide = self.day_merger.merge_all(&wide);

        let tall = tall_table(&observations, self.config.tall_date_key);

        log::info!(
            "{}: {} tall rows, {} wide rows",
            band,
            tall.len(),
            wide.len()
        );
        Ok(BandTables { band, tall, wide })
    }

    /// Run every configured band
    pub fn run<S: SceneSource + ?Sized>(&self, source: &S) -> SeriesResult<Vec<BandTables>> {
        let scenes = self.prepare_scenes(source)?;
        self.config
            .bands
            .iter()
            .map(|&band| self.extract_band(band, &scenes))
            .collect()
    }

    /// Run every configured band and write its CSV tables into `dir`
    pub fn run_to_dir<S: SceneSource + ?Sized>(&self, source: &S, dir: &Path) -> SeriesResult<Vec<PathBuf>> {
        let tables = self.run(source)?;
        write_band_tables(dir, &tables)
    }
}
