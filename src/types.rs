use chrono::{DateTime, NaiveDate, Utc};
use geo::{Coord, LineString, Polygon, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Reflectance or index value after harmonization
pub type Reflectance = f32;

/// 2D harmonized raster (rows x cols)
pub type ReflectanceImage = Array2<Reflectance>;

/// 2D raw digital-number raster as delivered by the archive
pub type RawImage = Array2<u16>;

/// 2D per-pixel validity mask
pub type ValidityMask = Array2<bool>;

/// Reserved out-of-range value written wherever a cell has no valid observation.
///
/// Valid reflectance lives roughly in [-0.2, 1.6] and every derived index in
/// [-1, 1] (EVI can stray a little further), so the sentinel can never collide
/// with a measurement. Internally missing values are `None`; this constant is
/// only materialized by the CSV writers.
pub const NODATA: f64 = -9999.0;

/// Sensor families the archive delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFamily {
    Landsat5,
    Landsat7,
    Landsat8,
    Sentinel2,
}

impl SensorFamily {
    pub const ALL: [SensorFamily; 4] = [
        SensorFamily::Landsat5,
        SensorFamily::Landsat7,
        SensorFamily::Landsat8,
        SensorFamily::Sentinel2,
    ];

    /// Archive collection identifier for the family
    pub fn dataset_id(&self) -> &'static str {
        match self {
            SensorFamily::Landsat5 => "LANDSAT/LT05/C02/T1_L2",
            SensorFamily::Landsat7 => "LANDSAT/LE07/C02/T1_L2",
            SensorFamily::Landsat8 => "LANDSAT/LC08/C02/T1_L2",
            SensorFamily::Sentinel2 => "COPERNICUS/S2_SR",
        }
    }

    /// Known operational window, start inclusive and end exclusive
    pub fn operational_window(&self) -> (NaiveDate, NaiveDate) {
        let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
        match self {
            SensorFamily::Landsat5 => (ymd(1984, 3, 16), ymd(2012, 5, 5)),
            SensorFamily::Landsat7 => (ymd(1999, 5, 28), ymd(2023, 11, 11)),
            SensorFamily::Landsat8 => (ymd(2013, 3, 18), ymd(2023, 11, 27)),
            SensorFamily::Sentinel2 => (ymd(2019, 1, 1), ymd(2022, 12, 31)),
        }
    }

    /// Whether quality masking uses the Collection-2 QA bit flags
    pub fn is_landsat(&self) -> bool {
        !matches!(self, SensorFamily::Sentinel2)
    }
}

impl std::fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorFamily::Landsat5 => write!(f, "Landsat-5"),
            SensorFamily::Landsat7 => write!(f, "Landsat-7"),
            SensorFamily::Landsat8 => write!(f, "Landsat-8"),
            SensorFamily::Sentinel2 => write!(f, "Sentinel-2"),
        }
    }
}

/// Canonical band and derived index names shared across sensor families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
    Ndvi,
    Evi,
    Msavi,
    Ndmi,
    Ndre,
}

/// Harmonized reflectance bands, in canonical order
pub const CANONICAL_BANDS: [Band; 6] = [
    Band::Blue,
    Band::Green,
    Band::Red,
    Band::Nir,
    Band::Swir1,
    Band::Swir2,
];

/// Derived spectral indices, in canonical order
pub const INDEX_BANDS: [Band; 5] = [Band::Ndvi, Band::Evi, Band::Msavi, Band::Ndmi, Band::Ndre];

impl Band {
    pub fn name(&self) -> &'static str {
        match self {
            Band::Blue => "blue",
            Band::Green => "green",
            Band::Red => "red",
            Band::Nir => "nir",
            Band::Swir1 => "swir1",
            Band::Swir2 => "swir2",
            Band::Ndvi => "ndvi",
            Band::Evi => "evi",
            Band::Msavi => "msavi",
            Band::Ndmi => "ndmi",
            Band::Ndre => "ndre",
        }
    }

    pub fn is_index(&self) -> bool {
        INDEX_BANDS.contains(self)
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Band {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        CANONICAL_BANDS
            .iter()
            .chain(INDEX_BANDS.iter())
            .find(|band| band.name() == lowered)
            .copied()
            .ok_or_else(|| SeriesError::Config(format!("Unknown band: {}", s)))
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up grid with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Map coordinate of a (fractional) pixel position
    pub fn map_coord(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Pixel containing a map coordinate, or `None` outside a grid of `dims`
    pub fn pixel_at(&self, x: f64, y: f64, dims: (usize, usize)) -> Option<(usize, usize)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < f64::EPSILON {
            return None;
        }

        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;

        if !(col.is_finite() && row.is_finite()) || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        if row >= dims.0 || col >= dims.1 {
            return None;
        }
        Some((row, col))
    }

    /// Outline of a grid of `dims` pixels
    pub fn footprint(&self, dims: (usize, usize)) -> Polygon<f64> {
        let (rows, cols) = (dims.0 as f64, dims.1 as f64);
        let corners = [
            self.map_coord(0.0, 0.0),
            self.map_coord(0.0, cols),
            self.map_coord(rows, cols),
            self.map_coord(rows, 0.0),
        ];
        Polygon::new(
            LineString::from(corners.iter().map(|&(x, y)| Coord { x, y }).collect::<Vec<_>>()),
            vec![],
        )
    }
}

/// A region of interest: stable identifier plus polygon
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    id: String,
    geometry: Polygon<f64>,
}

impl Region {
    pub fn new(id: impl Into<String>, geometry: Polygon<f64>) -> SeriesResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SeriesError::Geometry("Region id must not be empty".to_string()));
        }
        if geometry
            .exterior()
            .coords()
            .any(|c| !(c.x.is_finite() && c.y.is_finite()))
        {
            return Err(SeriesError::Geometry(format!(
                "Region {} has a non-finite vertex",
                id
            )));
        }
        // A closed ring of a non-degenerate polygon has at least 4 coordinates
        if geometry.exterior().0.len() < 4 {
            return Err(SeriesError::Geometry(format!(
                "Region {} needs at least three distinct vertices",
                id
            )));
        }
        Ok(Self { id, geometry })
    }

    /// Region from an exterior ring of `[x, y]` vertices; the ring is closed automatically
    pub fn from_ring(id: impl Into<String>, ring: &[[f64; 2]]) -> SeriesResult<Self> {
        let coords: Vec<Coord<f64>> = ring.iter().map(|&[x, y]| Coord { x, y }).collect();
        Self::new(id, Polygon::new(LineString::from(coords), vec![]))
    }

    /// Axis-aligned rectangular region
    pub fn rectangle(
        id: impl Into<String>,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> SeriesResult<Self> {
        if min_x >= max_x || min_y >= max_y {
            return Err(SeriesError::Geometry(format!(
                "Degenerate rectangle ({}, {}) - ({}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        Self::new(id, rect.to_polygon())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> &Polygon<f64> {
        &self.geometry
    }
}

/// One raw archive image with sensor-native band identifiers
#[derive(Debug, Clone)]
pub struct RawScene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub sensor: SensorFamily,
    pub footprint: Polygon<f64>,
    pub geo_transform: GeoTransform,
    pub bands: HashMap<String, RawImage>,
}

impl RawScene {
    /// Raw scene whose footprint is the full extent of its grid
    pub fn new(
        id: impl Into<String>,
        acquired: DateTime<Utc>,
        sensor: SensorFamily,
        geo_transform: GeoTransform,
        bands: HashMap<String, RawImage>,
    ) -> Self {
        let dims = bands.values().next().map(|b| b.dim()).unwrap_or((0, 0));
        Self {
            id: id.into(),
            acquired,
            sensor,
            footprint: geo_transform.footprint(dims),
            geo_transform,
            bands,
        }
    }

    pub fn band(&self, name: &str) -> SeriesResult<&RawImage> {
        self.bands.get(name).ok_or_else(|| SeriesError::SchemaMismatch {
            scene_id: self.id.clone(),
            band: name.to_string(),
        })
    }
}

/// A harmonized scene: canonical bands in reflectance units, masked pixels as NaN
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub sensor: SensorFamily,
    pub footprint: Polygon<f64>,
    pub geo_transform: GeoTransform,
    pub bands: BTreeMap<Band, ReflectanceImage>,
    pub mask: ValidityMask,
    /// Surface temperature in Kelvin, when the sensor carries a thermal band
    pub surface_temperature: Option<ReflectanceImage>,
    /// Narrow NIR reflectance (Sentinel-2 B8A), kept for the red-edge index
    pub narrow_nir: Option<ReflectanceImage>,
}

impl Scene {
    /// Raster dimensions (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }

    pub fn band(&self, band: Band) -> Option<&ReflectanceImage> {
        self.bands.get(&band)
    }

    /// Granule key `YYYYMMDDTHHMMSS` derived from the acquisition time
    pub fn timestamp_key(&self) -> String {
        timestamp_key(&self.acquired)
    }

    /// Fraction of pixels passing the quality mask
    pub fn valid_fraction(&self) -> f64 {
        let total = self.mask.len();
        if total == 0 {
            return 0.0;
        }
        self.mask.iter().filter(|&&v| v).count() as f64 / total as f64
    }
}

/// Format an acquisition time as a granule key; its first 8 characters are the day
pub fn timestamp_key(acquired: &DateTime<Utc>) -> String {
    acquired.format("%Y%m%dT%H%M%S").to_string()
}

/// Zonal mean of one band for one (scene, region) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub region_id: String,
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    pub band: Band,
    /// `None` when no valid pixel intersects the region
    pub value: Option<f64>,
}

impl Observation {
    /// Value with the NODATA sentinel substituted for missing data
    pub fn value_or_nodata(&self) -> f64 {
        self.value.unwrap_or(NODATA)
    }
}

/// Exported tall-table row
#[derive(Debug, Clone, PartialEq)]
pub struct TallRecord {
    pub region_id: String,
    pub date: String,
    pub band: Band,
    pub value: f64,
}

/// One region pivoted to one column per date key
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub region_id: String,
    pub columns: BTreeMap<String, f64>,
}

impl WideRow {
    pub fn new(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            columns: BTreeMap::new(),
        }
    }
}

/// Tall and wide outputs of one band
#[derive(Debug, Clone)]
pub struct BandTables {
    pub band: Band,
    pub tall: Vec<TallRecord>,
    pub wide: Vec<WideRow>,
}

/// Error types for time series extraction
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Scene {scene_id} is missing band {band}")]
    SchemaMismatch { scene_id: String, band: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Join integrity violation: {0}")]
    JoinIntegrity(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl SeriesError {
    /// Errors that invalidate a single scene rather than the run
    pub fn is_scene_local(&self) -> bool {
        matches!(
            self,
            SeriesError::SchemaMismatch { .. } | SeriesError::ShapeMismatch(_)
        )
    }
}

/// Result type for time series operations
pub type SeriesResult<T> = Result<T, SeriesError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pixel_lookup_round_trips_map_coords() {
        let gt = GeoTransform::north_up(500_000.0, 9_700_000.0, 30.0);
        let (x, y) = gt.map_coord(2.5, 3.5);
        assert_eq!(gt.pixel_at(x, y, (10, 10)), Some((2, 3)));
        assert_eq!(gt.pixel_at(x, y, (2, 10)), None);
        assert_eq!(gt.pixel_at(499_990.0, 9_699_990.0, (10, 10)), None);
    }

    #[test]
    fn test_pixel_lookup_rejects_non_finite_coords() {
        let gt = GeoTransform::north_up(0.0, 20.0, 10.0);
        assert_eq!(gt.pixel_at(f64::NAN, 15.0, (2, 2)), None);
        assert_eq!(gt.pixel_at(5.0, f64::NAN, (2, 2)), None);
        assert_eq!(gt.pixel_at(f64::INFINITY, 15.0, (2, 2)), None);
        assert_eq!(gt.pixel_at(5.0, 15.0, (2, 2)), Some((0, 0)));
    }

    #[test]
    fn test_timestamp_key_day_prefix() {
        let t = Utc.with_ymd_and_hms(2020, 6, 1, 13, 42, 11).unwrap();
        let key = timestamp_key(&t);
        assert_eq!(key, "20200601T134211");
        assert_eq!(&key[..8], "20200601");
    }

    #[test]
    fn test_band_parsing() {
        assert_eq!("NIR".parse::<Band>().unwrap(), Band::Nir);
        assert_eq!("ndmi".parse::<Band>().unwrap(), Band::Ndmi);
        assert!("thermal".parse::<Band>().is_err());
        assert!(Band::Evi.is_index());
        assert!(!Band::Swir2.is_index());
    }

    #[test]
    fn test_region_validation() {
        assert!(Region::rectangle("a", 0.0, 0.0, 10.0, 10.0).is_ok());
        assert!(Region::rectangle("a", 10.0, 0.0, 10.0, 10.0).is_err());
        assert!(Region::rectangle("", 0.0, 0.0, 1.0, 1.0).is_err());
        assert!(Region::from_ring("tri", &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]).is_ok());
        assert!(Region::from_ring("line", &[[0.0, 0.0], [1.0, 0.0]]).is_err());
        assert!(Region::from_ring("nan", &[[0.0, 0.0], [f64::NAN, 0.0], [0.0, 1.0]]).is_err());
    }

    #[test]
    fn test_operational_windows_are_ordered() {
        for sensor in SensorFamily::ALL {
            let (start, end) = sensor.operational_window();
            assert!(start < end, "{} window inverted", sensor);
        }
    }
}
