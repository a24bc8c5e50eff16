//! LandSeries: multi-sensor reflectance time series for small regions
//!
//! Harmonizes Landsat 5/7/8 and Sentinel-2 surface reflectance into one
//! canonical band set, masks clouds and saturation per pixel, derives
//! spectral indices, and reduces a merged scene collection to per-region
//! tall and wide time series tables.

pub mod types;
pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    Band, BandTables, GeoTransform, Observation, RawScene, Region, Scene, SensorFamily,
    SeriesError, SeriesResult, TallRecord, WideRow, NODATA,
};

pub use config::{PipelineConfig, RegionConfig};
pub use io::{InMemorySource, RawCollection, SceneSource};
pub use pipeline::Pipeline;
