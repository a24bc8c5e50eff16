//! Static pipeline parameters

use crate::core::{DateKey, SensorWindow};
use crate::types::{Band, Region, SensorFamily, SeriesError, SeriesResult, CANONICAL_BANDS, INDEX_BANDS};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// A region of interest as written in a configuration file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionConfig {
    /// Defaults to `polygon_<index>` when omitted
    #[serde(default)]
    pub id: Option<String>,
    /// Closed exterior ring of `[x, y]` vertices
    pub polygon: Vec<[f64; 2]>,
}

impl RegionConfig {
    pub fn new(id: Option<String>, polygon: Vec<[f64; 2]>) -> Self {
        Self { id, polygon }
    }

    pub fn rectangle(id: Option<String>, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            id,
            polygon: vec![
                [min_x, min_y],
                [max_x, min_y],
                [max_x, max_y],
                [min_x, max_y],
                [min_x, min_y],
            ],
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub regions: Vec<RegionConfig>,
    /// Sensor families to merge and the window each contributes
    pub sensors: Vec<SensorWindow>,
    /// Bands exported, one tall and one wide table each
    pub bands: Vec<Band>,
    /// Sampling scale in map units
    pub scale: f64,
    pub derive_indices: bool,
    pub tall_date_key: DateKey,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            sensors: vec![
                SensorWindow::operational(SensorFamily::Landsat5),
                SensorWindow::operational(SensorFamily::Landsat7),
                SensorWindow::operational(SensorFamily::Landsat8),
            ],
            bands: CANONICAL_BANDS.to_vec(),
            scale: 30.0,
            derive_indices: false,
            tall_date_key: DateKey::Granule,
        }
    }
}

impl PipelineConfig {
    /// Harmonized Landsat 5/7/8 reflectance at 30 m
    pub fn landsat_harmonized(regions: Vec<RegionConfig>) -> Self {
        Self {
            regions,
            ..Self::default()
        }
    }

    /// Sentinel-2 spectral indices at 10 m, 2019 through 2022
    pub fn sentinel2_indices(regions: Vec<RegionConfig>) -> Self {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(2022, 12, 31).unwrap_or(NaiveDate::MAX);
        Self {
            regions,
            sensors: vec![SensorWindow::new(SensorFamily::Sentinel2, start, end)],
            bands: INDEX_BANDS.to_vec(),
            scale: 10.0,
            derive_indices: true,
            tall_date_key: DateKey::Day,
        }
    }

    pub fn from_toml_str(text: &str) -> SeriesResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SeriesResult<Self> {
        let path = path.as_ref();
        log::info!("Loading pipeline configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Resolved regions with default ids filled in
    pub fn regions(&self) -> SeriesResult<Vec<Region>> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, rc)| {
                let id = rc.id.clone().unwrap_or_else(|| format!("polygon_{}", i));
                Region::from_ring(id, &rc.polygon)
            })
            .collect()
    }

    pub fn validate(&self) -> SeriesResult<()> {
        if self.regions.is_empty() {
            return Err(SeriesError::Config("No regions configured".to_string()));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(SeriesError::Config(format!(
                "Scale must be positive, got {}",
                self.scale
            )));
        }
        if self.bands.is_empty() {
            return Err(SeriesError::Config("No bands configured".to_string()));
        }
        if self.sensors.is_empty() {
            return Err(SeriesError::Config("No sensor windows configured".to_string()));
        }

        let mut families = HashSet::new();
        for window in &self.sensors {
            if window.start >= window.end {
                return Err(SeriesError::Config(format!(
                    "Empty window for {}: {} .. {}",
                    window.sensor, window.start, window.end
                )));
            }
            if !families.insert(window.sensor) {
                return Err(SeriesError::Config(format!(
                    "{} has more than one window",
                    window.sensor
                )));
            }
        }

        if !self.derive_indices {
            if let Some(band) = self.bands.iter().find(|b| b.is_index()) {
                return Err(SeriesError::Config(format!(
                    "Band {} requires derive_indices = true",
                    band
                )));
            }
        }

        let regions = self.regions()?;
        let mut ids = HashSet::new();
        for region in &regions {
            if !ids.insert(region.id()) {
                return Err(SeriesError::Config(format!(
                    "Duplicate region id: {}",
                    region.id()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
scale = 10.0
derive_indices = true
bands = ["ndvi", "nir"]
tall_date_key = "day"

[[regions]]
id = "field_a"
polygon = [[0.0, 10.0], [20.0, 10.0], [20.0, 20.0], [0.0, 20.0], [0.0, 10.0]]

[[regions]]
polygon = [[0.0, 0.0], [20.0, 0.0], [20.0, 10.0], [0.0, 10.0], [0.0, 0.0]]

[[sensors]]
sensor = "sentinel2"
start = "2019-01-01"
end = "2022-12-31"
"#;

    #[test]
    fn test_parse_toml() {
        let config = PipelineConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.scale, 10.0);
        assert_eq!(config.bands, vec![Band::Ndvi, Band::Nir]);
        assert_eq!(config.tall_date_key, DateKey::Day);
        assert_eq!(config.sensors[0].sensor, SensorFamily::Sentinel2);

        let regions = config.regions().unwrap();
        assert_eq!(regions[0].id(), "field_a");
        assert_eq!(regions[1].id(), "polygon_1");
    }

    #[test]
    fn test_defaults_fill_omitted_fields() {
        let config = PipelineConfig::from_toml_str(
            "[[regions]]\npolygon = [[0.0, 0.0], [30.0, 0.0], [30.0, 30.0], [0.0, 0.0]]\n",
        )
        .unwrap();
        assert_eq!(config.scale, 30.0);
        assert_eq!(config.bands, CANONICAL_BANDS.to_vec());
        assert_eq!(config.sensors.len(), 3);
        assert_eq!(config.tall_date_key, DateKey::Granule);
    }

    #[test]
    fn test_validation() {
        let region = RegionConfig::rectangle(None, 0.0, 0.0, 30.0, 30.0);

        assert!(PipelineConfig::default().validate().is_err());

        let mut config = PipelineConfig::landsat_harmonized(vec![region.clone()]);
        config.validate().unwrap();

        config.scale = 0.0;
        assert!(matches!(config.validate(), Err(SeriesError::Config(_))));

        let mut config = PipelineConfig::landsat_harmonized(vec![region.clone()]);
        config.bands.push(Band::Ndvi);
        assert!(config.validate().is_err());

        let named = RegionConfig::rectangle(Some("polygon_0".to_string()), 0.0, 0.0, 30.0, 30.0);
        let config = PipelineConfig::landsat_harmonized(vec![region, named]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets() {
        let regions = vec![RegionConfig::rectangle(None, 0.0, 0.0, 100.0, 100.0)];

        let landsat = PipelineConfig::landsat_harmonized(regions.clone());
        assert_eq!(landsat.scale, 30.0);
        assert!(landsat.sensors.iter().all(|w| w.sensor.is_landsat()));
        landsat.validate().unwrap();

        let s2 = PipelineConfig::sentinel2_indices(regions);
        assert_eq!(s2.scale, 10.0);
        assert!(s2.derive_indices);
        assert_eq!(s2.bands.len(), 5);
        assert_eq!(s2.tall_date_key, DateKey::Day);
        s2.validate().unwrap();
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, CONFIG).unwrap();
        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.regions.len(), 2);

        assert!(matches!(
            PipelineConfig::from_path(dir.path().join("missing.toml")),
            Err(SeriesError::Io(_))
        ));
    }
}
