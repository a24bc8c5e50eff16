use crate::types::{Band, Observation, Region, Scene, SeriesError, SeriesResult};
use geo::{BoundingRect, Centroid, Contains, Intersects, Point};

/// Parameters for zonal extraction
#[derive(Debug, Clone)]
pub struct ZonalParams {
    /// Ground sample distance of the sampling grid, in map units
    pub scale: f64,
}

impl Default for ZonalParams {
    fn default() -> Self {
        Self { scale: 30.0 } // Landsat native resolution
    }
}

/// Sample locations of one region at the extraction scale
#[derive(Debug, Clone)]
pub struct RegionSamples {
    pub region_id: String,
    pub points: Vec<(f64, f64)>,
}

impl RegionSamples {
    /// Grid cell centres at `scale` spacing over the region's bounding box that
    /// fall inside the polygon. A polygon too small to contain any centre is
    /// represented by its centroid.
    pub fn for_region(region: &Region, scale: f64) -> Self {
        let geometry = region.geometry();
        let mut points = Vec::new();

        if let Some(rect) = geometry.bounding_rect() {
            let cols = (rect.width() / scale).ceil().max(1.0) as usize;
            let rows = (rect.height() / scale).ceil().max(1.0) as usize;
            for i in 0..rows {
                let y = rect.min().y + (i as f64 + 0.5) * scale;
                for j in 0..cols {
                    let x = rect.min().x + (j as f64 + 0.5) * scale;
                    if geometry.contains(&Point::new(x, y)) {
                        points.push((x, y));
                    }
                }
            }
        }

        if points.is_empty() {
            if let Some(c) = geometry.centroid() {
                points.push((c.x(), c.y()));
            }
        }

        Self {
            region_id: region.id().to_string(),
            points,
        }
    }
}

/// Computes per-region area means of one band across a scene collection
pub struct ZonalExtractor {
    params: ZonalParams,
}

impl ZonalExtractor {
    pub fn new(params: ZonalParams) -> SeriesResult<Self> {
        if !(params.scale.is_finite() && params.scale > 0.0) {
            return Err(SeriesError::Config(format!(
                "Extraction scale must be positive, got {}",
                params.scale
            )));
        }
        Ok(Self { params })
    }

    /// Create an extractor at the given scale
    pub fn with_scale(scale: f64) -> SeriesResult<Self> {
        Self::new(ZonalParams { scale })
    }

    pub fn scale(&self) -> f64 {
        self.params.scale
    }

    /// Unweighted mean of the valid pixels of `band` under `samples`.
    /// `None` when no valid pixel intersects the region.
    pub fn zonal_mean(&self, scene: &Scene, band: Band, samples: &RegionSamples) -> Option<f64> {
        let data = scene.band(band)?;
        let dims = data.dim();

        let (sum, count) = samples
            .points
            .iter()
            .filter_map(|&(x, y)| scene.geo_transform.pixel_at(x, y, dims))
            .map(|(row, col)| data[[row, col]])
            .filter(|v| v.is_finite())
            .fold((0.0f64, 0usize), |(sum, count), v| (sum + v as f64, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    fn observe(&self, band: Band, scene: &Scene, region: &Region, samples: &RegionSamples) -> Observation {
        let value = if scene.footprint.intersects(region.geometry()) {
            self.zonal_mean(scene, band, samples)
        } else {
            None
        };

        Observation {
            region_id: region.id().to_string(),
            scene_id: scene.id.clone(),
            acquired: scene.acquired,
            band,
            value,
        }
    }

    /// One observation per (scene, region) pair, scene-major
    pub fn extract(&self, band: Band, scenes: &[Scene], regions: &[Region]) -> Vec<Observation> {
        log::info!(
            "Extracting {} for {} scenes x {} regions at scale {}",
            band,
            scenes.len(),
            regions.len(),
            self.params.scale
        );

        let samples: Vec<RegionSamples> = regions
            .iter()
            .map(|r| RegionSamples::for_region(r, self.params.scale))
            .collect();

        #[cfg(feature = "parallel")]
        let observations = self.extract_parallel(band, scenes, regions, &samples);
        #[cfg(not(feature = "parallel"))]
        let observations = self.extract_sequential(band, scenes, regions, &samples);

        let missing = observations.iter().filter(|o| o.value.is_none()).count();
        log::info!(
            "Extracted {} observations for {} ({} without valid pixels)",
            observations.len(),
            band,
            missing
        );
        observations
    }

    #[cfg(not(feature = "parallel"))]
    fn extract_sequential(
        &self,
        band: Band,
        scenes: &[Scene],
        regions: &[Region],
        samples: &[RegionSamples],
    ) -> Vec<Observation> {
        scenes
            .iter()
            .flat_map(|scene| {
                regions
                    .iter()
                    .zip(samples)
                    .map(move |(region, s)| self.observe(band, scene, region, s))
            })
            .collect()
    }

    /// Parallel extraction using Rayon; pairs are independent
    #[cfg(feature = "parallel")]
    fn extract_parallel(
        &self,
        band: Band,
        scenes: &[Scene],
        regions: &[Region],
        samples: &[RegionSamples],
    ) -> Vec<Observation> {
        use rayon::prelude::*;

        let pairs: Vec<(usize, usize)> = (0..scenes.len())
            .flat_map(|i| (0..regions.len()).map(move |j| (i, j)))
            .collect();

        pairs
            .into_par_iter()
            .map(|(i, j)| self.observe(band, &scenes[i], &regions[j], &samples[j]))
            .collect()
    }
}
