//! Archive access and table export

pub mod collection;
pub mod export;

pub use collection::{InMemorySource, RawCollection, SceneSource};
pub use export::{write_band_tables, write_tall_csv, write_wide_csv};
