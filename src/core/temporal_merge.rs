use crate::types::{Region, Scene, SensorFamily};
use chrono::NaiveDate;
use geo::Intersects;
use serde::{Deserialize, Serialize};

/// Date range a sensor family contributes to the merged series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorWindow {
    pub sensor: SensorFamily,
    /// Inclusive
    pub start: NaiveDate,
    /// Exclusive
    pub end: NaiveDate,
}

impl SensorWindow {
    pub fn new(sensor: SensorFamily, start: NaiveDate, end: NaiveDate) -> Self {
        Self { sensor, start, end }
    }

    /// The family's full operational window
    pub fn operational(sensor: SensorFamily) -> Self {
        let (start, end) = sensor.operational_window();
        Self { sensor, start, end }
    }

    pub fn contains(&self, scene: &Scene) -> bool {
        let day = scene.acquired.date_naive();
        day >= self.start && day < self.end
    }
}

/// Filters per-family collections to their windows and regions of interest
/// and concatenates them into one time-ordered collection
pub struct TemporalMerger {
    windows: Vec<SensorWindow>,
}

impl TemporalMerger {
    pub fn new(windows: Vec<SensorWindow>) -> Self {
        Self { windows }
    }

    fn window_for(&self, sensor: SensorFamily) -> Option<&SensorWindow> {
        self.windows.iter().find(|w| w.sensor == sensor)
    }

    /// Merge corrected collections. Families without a configured window
    /// contribute nothing.
    pub fn merge(&self, collections: Vec<(SensorFamily, Vec<Scene>)>, regions: &[Region]) -> Vec<Scene> {
        let mut merged = Vec::new();

        for (sensor, scenes) in collections {
            let Some(window) = self.window_for(sensor) else {
                log::warn!("No window configured for {}, dropping {} scenes", sensor, scenes.len());
                continue;
            };

            let total = scenes.len();
            let before = merged.len();
            merged.extend(scenes.into_iter().filter(|scene| {
                scene.sensor == sensor
                    && window.contains(scene)
                    && intersects_any(scene, regions)
            }));
            log::info!(
                "{}: kept {}/{} scenes in {}..{}",
                sensor,
                merged.len() - before,
                total,
                window.start,
                window.end
            );
        }

        merged.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));
        merged
    }
}

fn intersects_any(scene: &Scene, regions: &[Region]) -> bool {
    regions.iter().any(|r| scene.footprint.intersects(r.geometry()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn scene(id: &str, sensor: SensorFamily, y: i32, m: u32, d: u32, origin_x: f64) -> Scene {
        let gt = GeoTransform::north_up(origin_x, 100.0, 10.0);
        Scene {
            id: id.to_string(),
            acquired: Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap(),
            sensor,
            footprint: gt.footprint((10, 10)),
            geo_transform: gt,
            bands: BTreeMap::new(),
            mask: Array2::from_elem((10, 10), true),
            surface_temperature: None,
            narrow_nir: None,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let window = SensorWindow::new(SensorFamily::Landsat5, ymd(2005, 1, 1), ymd(2006, 1, 1));
        assert!(window.contains(&scene("a", SensorFamily::Landsat5, 2005, 1, 1, 0.0)));
        assert!(!window.contains(&scene("b", SensorFamily::Landsat5, 2006, 1, 1, 0.0)));
        assert!(!window.contains(&scene("c", SensorFamily::Landsat5, 2004, 12, 31, 0.0)));
    }

    #[test]
    fn test_merge_filters_and_orders() {
        let regions = vec![Region::rectangle("polygon_0", 20.0, 20.0, 40.0, 40.0).unwrap()];
        let merger = TemporalMerger::new(vec![
            SensorWindow::operational(SensorFamily::Landsat7),
            SensorWindow::operational(SensorFamily::Landsat8),
        ]);

        let merged = merger.merge(
            vec![
                (
                    SensorFamily::Landsat7,
                    vec![
                        scene("LE07_b", SensorFamily::Landsat7, 2016, 5, 2, 0.0),
                        scene("LE07_late", SensorFamily::Landsat7, 2023, 12, 1, 0.0),
                        scene("LE07_far", SensorFamily::Landsat7, 2016, 5, 10, 5000.0),
                    ],
                ),
                (
                    SensorFamily::Landsat8,
                    vec![
                        scene("LC08_a", SensorFamily::Landsat8, 2016, 4, 24, 0.0),
                        scene("LC08_early", SensorFamily::Landsat8, 2012, 1, 1, 0.0),
                    ],
                ),
                (
                    SensorFamily::Landsat5,
                    vec![scene("LT05_x", SensorFamily::Landsat5, 2005, 1, 1, 0.0)],
                ),
            ],
            &regions,
        );

        let ids: Vec<&str> = merged.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["LC08_a", "LE07_b"]);
    }

    #[test]
    fn test_empty_window_is_valid() {
        let regions = vec![Region::rectangle("polygon_0", 20.0, 20.0, 40.0, 40.0).unwrap()];
        let merger = TemporalMerger::new(vec![SensorWindow::new(
            SensorFamily::Sentinel2,
            ymd(2030, 1, 1),
            ymd(2031, 1, 1),
        )]);
        let merged = merger.merge(
            vec![(
                SensorFamily::Sentinel2,
                vec![scene("S2", SensorFamily::Sentinel2, 2020, 1, 1, 0.0)],
            )],
            &regions,
        );
        assert!(merged.is_empty());
    }
}
