//! Core harmonization and aggregation stages

pub mod harmonize;
pub mod quality_mask;
pub mod indices;
pub mod temporal_merge;
pub mod zonal;
pub mod pivot;

// Re-export main types
pub use harmonize::{BandHarmonizer, ScaleFactors, SensorProfile};
pub use quality_mask::{MaskPolicy, QualityMaskBuilder};
pub use indices::IndexDeriver;
pub use temporal_merge::{SensorWindow, TemporalMerger};
pub use zonal::{RegionSamples, ZonalExtractor, ZonalParams};
pub use pivot::{
    check_join_integrity, granule_key, granule_table, merge_same_day, pivot_wide, tall_table,
    DateKey, DayMerger,
};
