//! Paged raster storage: header store, block window, statistics and the engine.

mod geotransform;
mod header;
mod stats;
mod store;
mod window;

pub use geotransform::GeoTransform;
pub use header::{
    data_file_path, stats_file_path, DataScale, RasterHeader, DEFAULT_NODATA, DEFAULT_PALETTE, NOT_SPECIFIED,
};
pub use stats::{float_bin_count, Statistics, StatsBuilder};
pub use store::{AccessMode, IoCounters, PagedRaster, RasterOptions};
pub use window::{block_size_for, AccessTracker, BlockWindow, ReadDirection, DEFAULT_BUFFER_BYTES};
