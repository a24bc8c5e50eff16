use crate::types::{Band, ReflectanceImage, Scene, SeriesError, SeriesResult, INDEX_BANDS};
use ndarray::Zip;

/// EVI gain
const EVI_G: f32 = 2.5;
/// EVI aerosol resistance coefficient (red)
const EVI_C1: f32 = 6.0;
/// EVI aerosol resistance coefficient (blue)
const EVI_C2: f32 = 7.5;
/// EVI canopy background adjustment
const EVI_L: f32 = 1.0;

/// Non-finite results are invalid pixels
#[inline]
fn finite_or_nan(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        f32::NAN
    }
}

/// Normalized difference (a - b) / (a + b)
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    finite_or_nan((a - b) / (a + b))
}

/// Enhanced vegetation index
pub fn evi(nir: f32, red: f32, blue: f32) -> f32 {
    finite_or_nan(EVI_G * (nir - red) / (nir + EVI_C1 * red - EVI_C2 * blue + EVI_L))
}

/// Modified soil-adjusted vegetation index
pub fn msavi(nir: f32, red: f32) -> f32 {
    let a = 2.0 * nir + 1.0;
    finite_or_nan((a - (a * a - 8.0 * (nir - red)).sqrt()) / 2.0)
}

fn required(scene: &Scene, band: Band) -> SeriesResult<&ReflectanceImage> {
    scene.band(band).ok_or_else(|| SeriesError::SchemaMismatch {
        scene_id: scene.id.clone(),
        band: band.name().to_string(),
    })
}

/// NIR used by the red-edge index: Sentinel-2's narrow B8A, the canonical
/// NIR for sensors without one
fn red_edge_nir(scene: &Scene) -> SeriesResult<&ReflectanceImage> {
    if scene.sensor.is_landsat() {
        return required(scene, Band::Nir);
    }
    let narrow = scene.narrow_nir.as_ref().ok_or_else(|| SeriesError::SchemaMismatch {
        scene_id: scene.id.clone(),
        band: "B8A".to_string(),
    })?;
    if narrow.dim() != scene.dim() {
        return Err(SeriesError::ShapeMismatch(format!(
            "scene {} narrow NIR is {:?}, expected {:?}",
            scene.id,
            narrow.dim(),
            scene.dim()
        )));
    }
    Ok(narrow)
}

/// Appends derived spectral indices computed from canonical bands
pub struct IndexDeriver;

impl IndexDeriver {
    /// Add ndvi, evi, msavi, ndmi and ndre to a harmonized scene.
    /// A Sentinel-2 scene without B8A is a schema mismatch.
    pub fn derive(mut scene: Scene) -> SeriesResult<Scene> {
        let derived = {
            let blue = required(&scene, Band::Blue)?;
            let red = required(&scene, Band::Red)?;
            let nir = required(&scene, Band::Nir)?;
            let swir1 = required(&scene, Band::Swir1)?;
            let swir2 = required(&scene, Band::Swir2)?;
            let narrow_nir = red_edge_nir(&scene)?;

            [
                Zip::from(nir).and(red).map_collect(|&n, &r| normalized_difference(n, r)),
                Zip::from(nir).and(red).and(blue).map_collect(|&n, &r, &b| evi(n, r, b)),
                Zip::from(nir).and(red).map_collect(|&n, &r| msavi(n, r)),
                Zip::from(nir).and(swir1).map_collect(|&n, &s| normalized_difference(n, s)),
                Zip::from(narrow_nir).and(swir2).map_collect(|&n, &s| normalized_difference(n, s)),
            ]
        };

        for (band, data) in INDEX_BANDS.iter().zip(derived) {
            scene.bands.insert(*band, data);
        }

        log::debug!("Derived {} indices for {}", INDEX_BANDS.len(), scene.id);
        Ok(scene)
    }
}
