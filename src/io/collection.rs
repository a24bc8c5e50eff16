use crate::types::{RawScene, Region, SeriesResult};
use chrono::NaiveDate;
use geo::Intersects;
use std::collections::HashMap;

/// Provider of raw archive collections, keyed by dataset id
pub trait SceneSource {
    fn load_collection(&self, dataset_id: &str) -> SeriesResult<RawCollection>;
}

/// A sequence of raw scenes with the archive's date and bounds filters
#[derive(Debug, Clone, Default)]
pub struct RawCollection {
    scenes: Vec<RawScene>,
}

impl RawCollection {
    pub fn new(scenes: Vec<RawScene>) -> Self {
        Self { scenes }
    }

    /// Scenes acquired on or after `start` and before `end`
    pub fn filter_date(self, start: NaiveDate, end: NaiveDate) -> Self {
        let scenes = self
            .scenes
            .into_iter()
            .filter(|s| {
                let day = s.acquired.date_naive();
                day >= start && day < end
            })
            .collect();
        Self { scenes }
    }

    /// Scenes whose footprint intersects at least one region
    pub fn filter_bounds(self, regions: &[Region]) -> Self {
        let scenes = self
            .scenes
            .into_iter()
            .filter(|s| regions.iter().any(|r| s.footprint.intersects(r.geometry())))
            .collect();
        Self { scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[RawScene] {
        &self.scenes
    }

    pub fn into_scenes(self) -> Vec<RawScene> {
        self.scenes
    }
}

/// Collections held in memory; unknown datasets load as empty collections
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    collections: HashMap<String, Vec<RawScene>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene to the collection of its sensor family
    pub fn insert(&mut self, scene: RawScene) {
        self.collections
            .entry(scene.sensor.dataset_id().to_string())
            .or_default()
            .push(scene);
    }

    pub fn with_scenes(scenes: impl IntoIterator<Item = RawScene>) -> Self {
        let mut source = Self::new();
        for scene in scenes {
            source.insert(scene);
        }
        source
    }
}

impl SceneSource for InMemorySource {
    fn load_collection(&self, dataset_id: &str) -> SeriesResult<RawCollection> {
        let scenes = self.collections.get(dataset_id).cloned().unwrap_or_default();
        log::debug!("Loaded {} scenes from {}", scenes.len(), dataset_id);
        Ok(RawCollection::new(scenes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, SensorFamily};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn raw(id: &str, sensor: SensorFamily, year: i32, origin_x: f64) -> RawScene {
        let mut bands = HashMap::new();
        bands.insert("SR_B2".to_string(), Array2::<u16>::zeros((4, 4)));
        RawScene::new(
            id,
            Utc.with_ymd_and_hms(year, 7, 1, 14, 0, 0).unwrap(),
            sensor,
            GeoTransform::north_up(origin_x, 120.0, 30.0),
            bands,
        )
    }

    #[test]
    fn test_source_groups_by_dataset() {
        let source = InMemorySource::with_scenes(vec![
            raw("LC08_1", SensorFamily::Landsat8, 2016, 0.0),
            raw("LC08_2", SensorFamily::Landsat8, 2017, 0.0),
            raw("LE07_1", SensorFamily::Landsat7, 2016, 0.0),
        ]);
        assert_eq!(source.load_collection("LANDSAT/LC08/C02/T1_L2").unwrap().len(), 2);
        assert_eq!(source.load_collection("LANDSAT/LE07/C02/T1_L2").unwrap().len(), 1);
        assert!(source.load_collection("COPERNICUS/S2_SR").unwrap().is_empty());
    }

    #[test]
    fn test_filters() {
        let region = Region::rectangle("polygon_0", 30.0, 30.0, 60.0, 60.0).unwrap();
        let collection = RawCollection::new(vec![
            raw("a", SensorFamily::Landsat8, 2016, 0.0),
            raw("b", SensorFamily::Landsat8, 2018, 0.0),
            raw("c", SensorFamily::Landsat8, 2016, 9000.0),
        ]);
        let filtered = collection
            .filter_date(
                NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2017, 1, 1).unwrap(),
            )
            .filter_bounds(&[region]);
        let ids: Vec<&str> = filtered.scenes().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }
}
