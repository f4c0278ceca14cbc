//! dBASE (`.dbf`) attribute tables joined to shapefile records by position.

pub mod field;
pub mod table;

pub use field::{DbfField, FieldType};
pub use table::AttributeTable;
