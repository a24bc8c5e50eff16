use crate::types::{RawScene, Scene, SensorFamily, SeriesError, SeriesResult, ValidityMask};
use ndarray::Zip;

/// QA_PIXEL bits 0-4: fill, dilated cloud, cirrus, cloud, cloud shadow
pub const QA_PIXEL_CLOUD_BITS: u16 = 0b11111;

/// Sentinel-2 probability layers must stay strictly below this percentage
pub const S2_PROBABILITY_THRESHOLD: u16 = 5;

/// Scene classification value for cloud shadow
pub const SCL_CLOUD_SHADOW: u16 = 3;
/// Scene classification value for thin cirrus
pub const SCL_CIRRUS: u16 = 10;

/// Per-family pixel validity rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// Landsat Collection-2 QA_PIXEL bit flags plus radiometric saturation
    QaBits,
    /// Sentinel-2 cloud/snow probabilities plus scene classification
    ProbabilityLayers,
}

impl MaskPolicy {
    pub fn for_sensor(sensor: SensorFamily) -> Self {
        if sensor.is_landsat() {
            MaskPolicy::QaBits
        } else {
            MaskPolicy::ProbabilityLayers
        }
    }
}

/// Pixel is clear of cloud, shadow, snow, cirrus and fill, and unsaturated
pub fn landsat_pixel_valid(qa_pixel: u16, qa_radsat: u16) -> bool {
    qa_pixel & QA_PIXEL_CLOUD_BITS == 0 && qa_radsat == 0
}

/// Pixel has low cloud and snow probability and is neither shadow nor cirrus
pub fn sentinel2_pixel_valid(cloud_prob: u16, snow_prob: u16, scl: u16) -> bool {
    cloud_prob < S2_PROBABILITY_THRESHOLD
        && snow_prob < S2_PROBABILITY_THRESHOLD
        && scl != SCL_CLOUD_SHADOW
        && scl != SCL_CIRRUS
}

/// Builds per-pixel validity masks from quality bands and applies them
pub struct QualityMaskBuilder;

impl QualityMaskBuilder {
    /// Build the validity mask of a raw scene under its family's policy
    pub fn build(raw: &RawScene) -> SeriesResult<ValidityMask> {
        let policy = MaskPolicy::for_sensor(raw.sensor);
        let mask = match policy {
            MaskPolicy::QaBits => {
                let qa_pixel = raw.band("QA_PIXEL")?;
                let qa_radsat = raw.band("QA_RADSAT")?;
                if qa_pixel.dim() != qa_radsat.dim() {
                    return Err(SeriesError::ShapeMismatch(format!(
                        "scene {} QA bands differ: {:?} vs {:?}",
                        raw.id,
                        qa_pixel.dim(),
                        qa_radsat.dim()
                    )));
                }
                Zip::from(qa_pixel)
                    .and(qa_radsat)
                    .map_collect(|&qa, &sat| landsat_pixel_valid(qa, sat))
            }
            MaskPolicy::ProbabilityLayers => {
                let cloud = raw.band("MSK_CLDPRB")?;
                let snow = raw.band("MSK_SNWPRB")?;
                let scl = raw.band("SCL")?;
                if cloud.dim() != snow.dim() || cloud.dim() != scl.dim() {
                    return Err(SeriesError::ShapeMismatch(format!(
                        "scene {} quality layers differ in shape",
                        raw.id
                    )));
                }
                Zip::from(cloud)
                    .and(snow)
                    .and(scl)
                    .map_collect(|&c, &s, &class| sentinel2_pixel_valid(c, s, class))
            }
        };

        log::debug!(
            "Built {:?} mask for {}: {}/{} pixels valid",
            policy,
            raw.id,
            mask.iter().filter(|&&v| v).count(),
            mask.len()
        );
        Ok(mask)
    }

    /// Intersect a mask with a scene: the scene mask becomes the AND of both
    /// and every masked pixel is set to NaN in every band
    pub fn apply(mut scene: Scene, mask: &ValidityMask) -> SeriesResult<Scene> {
        if scene.dim() != mask.dim() {
            return Err(SeriesError::ShapeMismatch(format!(
                "mask {:?} does not match scene {} {:?}",
                mask.dim(),
                scene.id,
                scene.dim()
            )));
        }

        Zip::from(&mut scene.mask)
            .and(mask)
            .for_each(|valid, &m| *valid = *valid && m);

        let combined = &scene.mask;
        let auxiliary = scene
            .surface_temperature
            .iter_mut()
            .chain(scene.narrow_nir.iter_mut());
        for data in scene.bands.values_mut().chain(auxiliary) {
            Zip::from(data).and(combined).for_each(|v, &valid| {
                if !valid {
                    *v = f32::NAN;
                }
            });
        }

        Ok(scene)
    }
}
