use crate::types::{
    Band, RawImage, RawScene, ReflectanceImage, Scene, SensorFamily, SeriesError, SeriesResult,
    CANONICAL_BANDS,
};
use ndarray::{Array2, Zip};
use std::collections::BTreeMap;

/// Collection-2 surface reflectance scale factor
pub const LANDSAT_OPTICAL_SCALE: f32 = 2.75e-5;
/// Collection-2 surface reflectance offset
pub const LANDSAT_OPTICAL_OFFSET: f32 = -0.2;
/// Collection-2 surface temperature scale factor (Kelvin per DN)
pub const LANDSAT_THERMAL_SCALE: f32 = 3.41802e-3;
/// Collection-2 surface temperature offset (Kelvin)
pub const LANDSAT_THERMAL_OFFSET: f32 = 149.0;
/// Sentinel-2 L2A quantification value is 10000
pub const SENTINEL2_OPTICAL_SCALE: f32 = 1.0e-4;

/// Digital number reserved for fill pixels in every supported product
pub const FILL_DN: u16 = 0;

/// Linear DN to physical unit conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub scale: f32,
    pub offset: f32,
}

impl ScaleFactors {
    pub fn landsat_optical() -> Self {
        Self { scale: LANDSAT_OPTICAL_SCALE, offset: LANDSAT_OPTICAL_OFFSET }
    }

    pub fn landsat_thermal() -> Self {
        Self { scale: LANDSAT_THERMAL_SCALE, offset: LANDSAT_THERMAL_OFFSET }
    }

    pub fn sentinel2_optical() -> Self {
        Self { scale: SENTINEL2_OPTICAL_SCALE, offset: 0.0 }
    }

    /// Convert one digital number
    pub fn apply(&self, dn: u16) -> f32 {
        dn as f32 * self.scale + self.offset
    }

    /// Convert a raster, turning fill pixels into NaN
    pub fn rescale(&self, raw: &RawImage) -> ReflectanceImage {
        raw.mapv(|dn| if dn == FILL_DN { f32::NAN } else { self.apply(dn) })
    }
}

/// Native band layout and scaling of one sensor family
#[derive(Debug, Clone)]
pub struct SensorProfile {
    pub sensor: SensorFamily,
    /// Native band id for each canonical band, in canonical order
    pub optical: [&'static str; 6],
    pub optical_scale: ScaleFactors,
    pub thermal: Option<&'static str>,
    /// Narrow NIR band used by the red-edge index, when the sensor has one
    pub narrow_nir: Option<&'static str>,
}

impl SensorProfile {
    pub fn for_sensor(sensor: SensorFamily) -> Self {
        match sensor {
            SensorFamily::Landsat5 | SensorFamily::Landsat7 => Self {
                sensor,
                optical: ["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B7"],
                optical_scale: ScaleFactors::landsat_optical(),
                thermal: Some("ST_B6"),
                narrow_nir: None,
            },
            SensorFamily::Landsat8 => Self {
                sensor,
                optical: ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7"],
                optical_scale: ScaleFactors::landsat_optical(),
                thermal: Some("ST_B10"),
                narrow_nir: None,
            },
            SensorFamily::Sentinel2 => Self {
                sensor,
                optical: ["B2", "B3", "B4", "B8", "B11", "B12"],
                optical_scale: ScaleFactors::sentinel2_optical(),
                thermal: None,
                narrow_nir: Some("B8A"),
            },
        }
    }

    /// Native identifier of a canonical band
    pub fn native_band(&self, band: Band) -> Option<&'static str> {
        CANONICAL_BANDS
            .iter()
            .position(|&b| b == band)
            .map(|i| self.optical[i])
    }
}

/// Renames sensor-native bands to the canonical set and rescales them to
/// physical units
pub struct BandHarmonizer;

impl BandHarmonizer {
    /// Harmonize one raw scene. The returned scene carries exactly the
    /// canonical band set; fill pixels are NaN and already invalid in the mask.
    pub fn harmonize(raw: &RawScene) -> SeriesResult<Scene> {
        let profile = SensorProfile::for_sensor(raw.sensor);
        let mut bands = BTreeMap::new();
        let mut dims: Option<(usize, usize)> = None;

        for (band, native) in CANONICAL_BANDS.iter().zip(profile.optical.iter()) {
            let data = raw.band(native)?;
            check_dims(&raw.id, native, data.dim(), &mut dims)?;
            bands.insert(*band, profile.optical_scale.rescale(data));
        }

        // Thermal and narrow NIR are optional: a scene missing them still harmonizes
        let surface_temperature = match profile.thermal.and_then(|t| raw.bands.get(t).map(|d| (t, d))) {
            Some((native, data)) => {
                check_dims(&raw.id, native, data.dim(), &mut dims)?;
                Some(ScaleFactors::landsat_thermal().rescale(data))
            }
            None => None,
        };
        let narrow_nir = match profile.narrow_nir.and_then(|n| raw.bands.get(n).map(|d| (n, d))) {
            Some((native, data)) => {
                check_dims(&raw.id, native, data.dim(), &mut dims)?;
                Some(profile.optical_scale.rescale(data))
            }
            None => None,
        };

        let dims = dims.unwrap_or((0, 0));
        let mut mask = Array2::from_elem(dims, true);
        for data in bands.values() {
            Zip::from(&mut mask)
                .and(data)
                .for_each(|valid, &v| *valid = *valid && v.is_finite());
        }

        log::debug!(
            "Harmonized {} scene {} ({}x{}, {} fill pixels)",
            raw.sensor,
            raw.id,
            dims.0,
            dims.1,
            mask.iter().filter(|&&v| !v).count()
        );

        Ok(Scene {
            id: raw.id.clone(),
            acquired: raw.acquired,
            sensor: raw.sensor,
            footprint: raw.footprint.clone(),
            geo_transform: raw.geo_transform,
            bands,
            mask,
            surface_temperature,
            narrow_nir,
        })
    }
}

fn check_dims(
    scene_id: &str,
    band: &str,
    dim: (usize, usize),
    expected: &mut Option<(usize, usize)>,
) -> SeriesResult<()> {
    match *expected {
        Some(e) if e != dim => Err(SeriesError::ShapeMismatch(format!(
            "scene {} band {} is {:?}, expected {:?}",
            scene_id, band, dim, e
        ))),
        Some(_) => Ok(()),
        None => {
            *expected = Some(dim);
            Ok(())
        }
    }
}
