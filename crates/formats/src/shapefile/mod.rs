//! ESRI Shapefile reading and writing.

pub mod file;
pub mod geometry;
pub mod header;
pub mod record;

pub use file::{read_index, ShapeFile};
pub use geometry::{Geometry, Parts, PartType, ShapePoint, ShapeType, Vertices};
pub use header::ShapeHeader;
pub use record::{RecordSummary, ShapeRecord};
