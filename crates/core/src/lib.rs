//! # GridStore Core
//!
//! Disk-backed raster storage for grids larger than memory.
//!
//! This crate provides:
//! - `PagedRaster`: a raster handle that pages one block of cells at a time
//! - `RasterHeader`: the `.dep` text header and its `.tas` data companion
//! - `Statistics`: histogram based statistics with a `.wstat` sidecar
//! - `CellCodec`: fixed-width cell encoding for the four storage types
//! - `Crs` and vector value types shared with the file format codecs

pub mod codec;
pub mod crs;
pub mod error;
pub mod progress;
pub mod raster;
pub mod vector;

pub use codec::{ByteOrder, CellCodec, DataType};
pub use crs::Crs;
pub use error::{Error, Result};
pub use raster::{AccessMode, GeoTransform, PagedRaster, RasterHeader, RasterOptions, Statistics};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::codec::{ByteOrder, DataType};
    pub use crate::crs::Crs;
    pub use crate::error::{Error, Result};
    pub use crate::progress::{FeedbackSink, ProgressSink};
    pub use crate::raster::{AccessMode, DataScale, GeoTransform, PagedRaster, RasterHeader, RasterOptions, Statistics};
    pub use crate::vector::{AttributeValue, BoundingBox, Feature, FeatureCollection};
}
