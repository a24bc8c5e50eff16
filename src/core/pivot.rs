use crate::types::{timestamp_key, Observation, SeriesError, SeriesResult, TallRecord, WideRow, NODATA};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Date-like column keys: a leading `YYYYMMDD` calendar day
const DAY_KEY_PATTERN: &str = r"^(\d{8})";

/// Resolution of the tall table's date column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateKey {
    /// Granule timestamp `YYYYMMDDTHHMMSS`; same-day granules stay distinct
    #[default]
    Granule,
    /// Calendar day `YYYYMMDD`; same-day granules collapse to one row
    Day,
}

impl DateKey {
    pub fn key_for(&self, acquired: &DateTime<Utc>) -> String {
        match self {
            DateKey::Granule => timestamp_key(acquired),
            DateKey::Day => acquired.format("%Y%m%d").to_string(),
        }
    }
}

/// Tall export: drop observations without data, keep the first row per
/// (region, date key), and order by region id.
///
/// Which duplicate survives a literal key collision is extraction order,
/// not a semantic choice.
pub fn tall_table(observations: &[Observation], date_key: DateKey) -> Vec<TallRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();

    let mut records: Vec<TallRecord> = observations
        .iter()
        .filter_map(|obs| {
            let value = obs.value.filter(|v| v.is_finite() && *v != NODATA)?;
            let date = date_key.key_for(&obs.acquired);
            if !seen.insert((obs.region_id.clone(), date.clone())) {
                return None;
            }
            Some(TallRecord {
                region_id: obs.region_id.clone(),
                date,
                band: obs.band,
                value,
            })
        })
        .collect();

    records.sort_by(|a, b| a.region_id.cmp(&b.region_id));

    log::debug!(
        "Tall table: {} rows from {} observations",
        records.len(),
        observations.len()
    );
    records
}

/// Per-granule column key `YYYYMMDDTHHMMSS_<scene id>`: unique per scene and
/// led by the calendar day. Overlapping tiles of one datatake share a sensing
/// time but not an id.
pub fn granule_key(obs: &Observation) -> String {
    format!("{}_{}", timestamp_key(&obs.acquired), obs.scene_id)
}

/// Records keyed by granule, ahead of the wide pivot: observations without
/// data are dropped and every scene keeps its own column
pub fn granule_table(observations: &[Observation]) -> Vec<TallRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();

    observations
        .iter()
        .filter_map(|obs| {
            let value = obs.value.filter(|v| v.is_finite() && *v != NODATA)?;
            let key = granule_key(obs);
            if !seen.insert((obs.region_id.clone(), key.clone())) {
                log::warn!(
                    "Scene {} observed twice for region {}, keeping the first",
                    obs.scene_id,
                    obs.region_id
                );
                return None;
            }
            Some(TallRecord {
                region_id: obs.region_id.clone(),
                date: key,
                band: obs.band,
                value,
            })
        })
        .collect()
}

/// Pivot tall records to one row per region, one column per date key.
///
/// Every listed region gets a row, empty when it has no records. Each row is
/// built only from records carrying its own region id.
pub fn pivot_wide<'a, I>(records: &[TallRecord], region_ids: I) -> Vec<WideRow>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut by_region: HashMap<&str, Vec<&TallRecord>> = HashMap::new();
    for record in records {
        by_region.entry(record.region_id.as_str()).or_default().push(record);
    }

    let mut emitted: HashSet<&str> = HashSet::new();
    region_ids
        .into_iter()
        .filter(|id| emitted.insert(*id))
        .map(|id| {
            let mut row = WideRow::new(id);
            for record in by_region.get(id).into_iter().flatten() {
                row.columns.entry(record.date.clone()).or_insert(record.value);
            }
            row
        })
        .collect()
}

/// Verify that a pivot holds exactly the tall records of each region and
/// nothing from any other region
pub fn check_join_integrity(records: &[TallRecord], rows: &[WideRow]) -> SeriesResult<()> {
    let mut expected: HashMap<&str, HashMap<&str, f64>> = HashMap::new();
    for record in records {
        let previous = expected
            .entry(record.region_id.as_str())
            .or_default()
            .insert(record.date.as_str(), record.value);
        if previous.is_some() {
            return Err(SeriesError::JoinIntegrity(format!(
                "duplicate tall key ({}, {})",
                record.region_id, record.date
            )));
        }
    }

    let mut seen_rows: HashSet<&str> = HashSet::new();
    for row in rows {
        if !seen_rows.insert(row.region_id.as_str()) {
            return Err(SeriesError::JoinIntegrity(format!(
                "region {} pivoted into more than one row",
                row.region_id
            )));
        }

        let own = expected.get(row.region_id.as_str());
        for (key, value) in &row.columns {
            match own.and_then(|cols| cols.get(key.as_str())) {
                Some(v) if v.to_bits() == value.to_bits() => {}
                _ => {
                    return Err(SeriesError::JoinIntegrity(format!(
                        "row {} column {} holds {} which is not one of its own records",
                        row.region_id, key, value
                    )))
                }
            }
        }

        let expected_count = own.map(|cols| cols.len()).unwrap_or(0);
        if row.columns.len() != expected_count {
            return Err(SeriesError::JoinIntegrity(format!(
                "row {} has {} columns for {} records",
                row.region_id,
                row.columns.len(),
                expected_count
            )));
        }
    }

    if let Some(orphan) = expected.keys().find(|id| !seen_rows.contains(*id)) {
        return Err(SeriesError::JoinIntegrity(format!(
            "records of region {} have no wide row",
            orphan
        )));
    }

    Ok(())
}

/// Collapses same-day granule columns to one value per calendar day
pub struct DayMerger {
    pattern: Regex,
}

impl DayMerger {
    pub fn new() -> SeriesResult<Self> {
        let pattern = Regex::new(DAY_KEY_PATTERN)
            .map_err(|e| SeriesError::Processing(format!("Regex error: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Calendar day of a date-like column key
    pub fn day_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        self.pattern
            .captures(key)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Group date-like columns by day and keep the maximum of each group;
    /// other columns are carried over unchanged
    pub fn merge(&self, row: &WideRow) -> WideRow {
        let mut merged: BTreeMap<String, f64> = BTreeMap::new();

        for (key, &value) in &row.columns {
            match self.day_of(key) {
                Some(day) => {
                    merged
                        .entry(day.to_string())
                        .and_modify(|v| *v = v.max(value))
                        .or_insert(value);
                }
                None => {
                    log::warn!(
                        "Column {} of {} is not date-like, carried over unmerged",
                        key,
                        row.region_id
                    );
                    merged.insert(key.clone(), value);
                }
            }
        }

        WideRow {
            region_id: row.region_id.clone(),
            columns: merged,
        }
    }

    pub fn merge_all(&self, rows: &[WideRow]) -> Vec<WideRow> {
        rows.iter().map(|row| self.merge(row)).collect()
    }
}

/// Resolve one wide row to a single value per calendar day
pub fn merge_same_day(row: &WideRow) -> SeriesResult<WideRow> {
    Ok(DayMerger::new()?.merge(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Band;
    use chrono::TimeZone;

    fn obs(region: &str, scene: &str, minute: u32, day: u32, value: Option<f64>) -> Observation {
        Observation {
            region_id: region.to_string(),
            scene_id: scene.to_string(),
            acquired: Utc.with_ymd_and_hms(2021, 3, day, 13, minute, 0).unwrap(),
            band: Band::Ndmi,
            value,
        }
    }

    fn record(region: &str, date: &str, value: f64) -> TallRecord {
        TallRecord {
            region_id: region.to_string(),
            date: date.to_string(),
            band: Band::Ndmi,
            value,
        }
    }

    #[test]
    fn test_tall_drops_nodata_and_sorts() {
        let observations = vec![
            obs("polygon_1", "s1", 0, 5, Some(0.3)),
            obs("polygon_0", "s1", 0, 5, None),
            obs("polygon_0", "s2", 0, 15, Some(0.2)),
            obs("polygon_1", "s2", 0, 15, Some(NODATA)),
        ];
        let tall = tall_table(&observations, DateKey::Granule);
        assert_eq!(tall.len(), 2);
        assert_eq!(tall[0].region_id, "polygon_0");
        assert_eq!(tall[0].date, "20210315T130000");
        assert_eq!(tall[1].region_id, "polygon_1");
        assert!(tall.iter().all(|r| r.value != NODATA));

        // filtering is idempotent
        let again: Vec<Observation> = tall
            .iter()
            .map(|r| Observation {
                region_id: r.region_id.clone(),
                scene_id: String::new(),
                acquired: Utc
                    .with_ymd_and_hms(2021, 3, if r.region_id == "polygon_0" { 15 } else { 5 }, 13, 0, 0)
                    .unwrap(),
                band: r.band,
                value: Some(r.value),
            })
            .collect();
        assert_eq!(tall_table(&again, DateKey::Granule), tall);
    }

    #[test]
    fn test_tall_dedup_by_region_and_date() {
        let observations = vec![
            obs("polygon_0", "a", 0, 5, Some(0.12)),
            obs("polygon_0", "b", 3, 5, Some(0.31)),
            obs("polygon_0", "a-copy", 0, 5, Some(0.5)),
        ];
        let granule = tall_table(&observations, DateKey::Granule);
        assert_eq!(granule.len(), 2);
        assert_eq!(granule[0].value, 0.12);

        let day = tall_table(&observations, DateKey::Day);
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].date, "20210305");

        let unique: HashSet<(&str, &str)> = granule
            .iter()
            .map(|r| (r.region_id.as_str(), r.date.as_str()))
            .collect();
        assert_eq!(unique.len(), granule.len());
    }

    #[test]
    fn test_pivot_keeps_regions_apart() {
        let tall = vec![
            record("polygon_0", "20210305T130000", 0.12),
            record("polygon_0", "20210305T130300", 0.31),
            record("polygon_1", "20210305T130000", 0.77),
        ];
        let wide = pivot_wide(&tall, ["polygon_0", "polygon_1", "polygon_2"]);
        assert_eq!(wide.len(), 3);
        assert_eq!(wide[0].columns.len(), 2);
        assert_eq!(wide[1].columns.values().copied().collect::<Vec<_>>(), vec![0.77]);
        assert!(wide[2].columns.is_empty());
        check_join_integrity(&tall, &wide).unwrap();
    }

    #[test]
    fn test_join_integrity_detects_leakage() {
        let tall = vec![
            record("polygon_0", "20210305T130000", 0.12),
            record("polygon_1", "20210305T130000", 0.77),
        ];
        let mut wide = pivot_wide(&tall, ["polygon_0", "polygon_1"]);
        wide[0].columns.insert("20210305T130000".to_string(), 0.77);
        assert!(matches!(
            check_join_integrity(&tall, &wide),
            Err(SeriesError::JoinIntegrity(_))
        ));

        let missing_row = pivot_wide(&tall, ["polygon_0"]);
        assert!(check_join_integrity(&tall, &missing_row).is_err());

        let mut extra_column = pivot_wide(&tall, ["polygon_0", "polygon_1"]);
        extra_column[1].columns.insert("20210306T130000".to_string(), 0.77);
        assert!(check_join_integrity(&tall, &extra_column).is_err());
    }

    #[test]
    fn test_same_day_merge_takes_max() {
        let merger = DayMerger::new().unwrap();
        let mut row = WideRow::new("polygon_0");
        row.columns.insert("20210305T130000".to_string(), 0.12);
        row.columns.insert("20210305T130300".to_string(), 0.31);
        row.columns.insert("20210315T130000".to_string(), 0.05);

        let merged = merger.merge(&row);
        assert_eq!(merged.columns.len(), 2);
        assert_eq!(merged.columns["20210305"], 0.31);
        assert_eq!(merged.columns["20210315"], 0.05);
        assert_eq!(merge_same_day(&row).unwrap(), merged);
    }

    #[test]
    fn test_merge_leaves_non_date_columns_alone() {
        let merger = DayMerger::new().unwrap();
        let mut row = WideRow::new("polygon_0");
        row.columns.insert("20210305T130000".to_string(), 0.12);
        row.columns.insert("system:index".to_string(), 42.0);

        let merged = merger.merge(&row);
        assert_eq!(merged.columns["system:index"], 42.0);
        assert_eq!(merged.columns["20210305"], 0.12);
        assert_eq!(merger.day_of("2021-03-05"), None);
    }

    #[test]
    fn test_same_timestamp_tiles_keep_own_columns() {
        let observations = vec![
            obs("polygon_0", "20210305T130000_T22LDL", 0, 5, Some(0.12)),
            obs("polygon_0", "20210305T130000_T22LDM", 0, 5, Some(0.31)),
        ];

        // the tall export still collapses them on the date key
        assert_eq!(tall_table(&observations, DateKey::Granule).len(), 1);

        let granules = granule_table(&observations);
        assert_eq!(granules.len(), 2);
        assert!(granules.iter().all(|r| r.date.starts_with("20210305T130000_")));

        let wide = pivot_wide(&granules, ["polygon_0"]);
        assert_eq!(wide[0].columns.len(), 2);
        check_join_integrity(&granules, &wide).unwrap();

        let merged = DayMerger::new().unwrap().merge(&wide[0]);
        assert_eq!(merged.columns.len(), 1);
        assert_eq!(merged.columns["20210305"], 0.31);
    }

    #[test]
    fn test_granule_table_drops_nodata_only() {
        let observations = vec![
            obs("polygon_0", "a", 0, 5, None),
            obs("polygon_0", "b", 0, 5, Some(NODATA)),
            obs("polygon_1", "a", 0, 5, Some(0.4)),
            obs("polygon_1", "a", 0, 5, Some(0.9)),
        ];
        let granules = granule_table(&observations);
        assert_eq!(granules.len(), 1);
        assert_eq!(granules[0].date, "20210305T130000_a");
        assert_eq!(granules[0].value, 0.4);
    }

    #[test]
    fn test_empty_region_row() {
        let merger = DayMerger::new().unwrap();
        let rows = pivot_wide(&[], ["polygon_9"]);
        let merged = merger.merge_all(&rows);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].columns.is_empty());
    }
}
