//! # GridStore Formats
//!
//! Binary file codecs that sit next to the paged raster engine.
//!
//! - `geotiff`: strip GeoTIFF reader and writer, GeoKey directory, and
//!   conversion to and from `.dep` rasters
//! - `las`: LAS 1.x point cloud reader with a paging point buffer
//! - `shapefile`: `.shp`/`.shx` reading and writing with every shape type
//! - `dbf`: dBASE attribute tables joined to shapefile records by position

pub mod dbf;
pub mod error;
pub mod geotiff;
pub mod las;
pub mod shapefile;

pub use dbf::{AttributeTable, DbfField, FieldType};
pub use error::{FormatError, Result};
pub use geotiff::{export_geotiff, import_geotiff, GeoTiffReader, GeoTiffWriter};
pub use las::{LasHeader, LasReader, PointRecord};
pub use shapefile::{Geometry, ShapeFile, ShapeRecord, ShapeType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dbf::{AttributeTable, DbfField, FieldType};
    pub use crate::error::{FormatError, Result};
    pub use crate::geotiff::{GeoTiffReader, GeoTiffWriter, SampleType};
    pub use crate::las::{LasReader, LasReaderOptions, PointRecord};
    pub use crate::shapefile::{Geometry, ShapeFile, ShapeType};
}
