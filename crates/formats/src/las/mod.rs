//! LAS point cloud reading (versions 1.x, point formats 0-5).

pub mod header;
pub mod point;
pub mod reader;

pub use header::{GlobalEncoding, LasHeader, Vlr};
pub use point::{Classification, PointRecord, ReturnInfo, Rgb};
pub use reader::{LasReader, LasReaderOptions, DEFAULT_BUFFER_SIZE};
