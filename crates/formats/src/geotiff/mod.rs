//! GeoTIFF reading and writing.
//!
//! - [`ifd`]: TIFF header and IFD chain parsing, typed tag values
//! - [`keys`]: GeoKey directory decoding/assembly and georeferencing tags
//! - [`reader`]: row-by-row decoding of strip-organised images
//! - [`writer`]: single-strip big-endian writer
//! - [`convert`]: import/export against paged rasters

pub mod convert;
pub mod ifd;
pub mod keys;
pub mod reader;
pub mod writer;

pub use convert::{export_geotiff, import_geotiff};
pub use ifd::{IfdEntry, TagValue, TiffByteOrder};
pub use keys::{GeoKey, GeoKeyDirectory, GeoKeyValue};
pub use reader::{GeoTiffReader, SampleKind};
pub use writer::{GeoTiffWriter, SampleType};
