//! Fixed-width cell encoding.
//!
//! Every on-disk cell type is widened to `f64` in memory. Narrow types are
//! written with a lossy cast (saturate to `i32`, then wrap) unless the codec
//! is built in strict mode, in which case out-of-range values are rejected.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Storage type of a raster cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataType {
    /// 8-byte IEEE double
    Double,
    /// 4-byte IEEE float
    #[default]
    Float,
    /// 2-byte signed integer
    Integer,
    /// 1-byte unsigned integer
    Byte,
}

impl DataType {
    /// Number of bytes one cell occupies on disk.
    pub fn byte_width(self) -> usize {
        match self {
            DataType::Double => 8,
            DataType::Float => 4,
            DataType::Integer => 2,
            DataType::Byte => 1,
        }
    }

    /// True for the integral storage types.
    pub fn is_integral(self) -> bool {
        matches!(self, DataType::Integer | DataType::Byte)
    }

    /// Name used in header files.
    pub fn as_header_str(self) -> &'static str {
        match self {
            DataType::Double => "DOUBLE",
            DataType::Float => "FLOAT",
            DataType::Integer => "INTEGER",
            DataType::Byte => "BYTE",
        }
    }

    /// Loose parse of a header value: any string containing the type name matches.
    pub fn from_header_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        if s.contains("double") {
            Some(DataType::Double)
        } else if s.contains("float") {
            Some(DataType::Float)
        } else if s.contains("integer") {
            Some(DataType::Integer)
        } else if s.contains("byte") {
            Some(DataType::Byte)
        } else {
            None
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_header_str())
    }
}

/// Byte order of a binary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Name used in header files.
    pub fn as_header_str(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "LITTLE_ENDIAN",
            ByteOrder::BigEndian => "BIG_ENDIAN",
        }
    }

    /// Anything mentioning little, lsb, least or intel is little-endian;
    /// every other value is big-endian.
    pub fn from_header_str(s: &str) -> Self {
        let s = s.to_lowercase();
        if s.contains("little") || s.contains("lsb") || s.contains("least") || s.contains("intel")
        {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_header_str())
    }
}

/// Decode one cell value from the start of `bytes`.
///
/// `bytes` must hold at least `data_type.byte_width()` bytes.
pub fn read_value(bytes: &[u8], data_type: DataType, order: ByteOrder) -> f64 {
    match (data_type, order) {
        (DataType::Double, ByteOrder::LittleEndian) => LittleEndian::read_f64(bytes),
        (DataType::Double, ByteOrder::BigEndian) => BigEndian::read_f64(bytes),
        (DataType::Float, ByteOrder::LittleEndian) => LittleEndian::read_f32(bytes) as f64,
        (DataType::Float, ByteOrder::BigEndian) => BigEndian::read_f32(bytes) as f64,
        (DataType::Integer, ByteOrder::LittleEndian) => LittleEndian::read_i16(bytes) as f64,
        (DataType::Integer, ByteOrder::BigEndian) => BigEndian::read_i16(bytes) as f64,
        (DataType::Byte, _) => bytes[0] as f64,
    }
}

/// Encode one cell value into the start of `out` with the lossy narrowing cast.
pub fn write_value(value: f64, data_type: DataType, order: ByteOrder, out: &mut [u8]) {
    match (data_type, order) {
        (DataType::Double, ByteOrder::LittleEndian) => LittleEndian::write_f64(out, value),
        (DataType::Double, ByteOrder::BigEndian) => BigEndian::write_f64(out, value),
        (DataType::Float, ByteOrder::LittleEndian) => LittleEndian::write_f32(out, value as f32),
        (DataType::Float, ByteOrder::BigEndian) => BigEndian::write_f32(out, value as f32),
        (DataType::Integer, ByteOrder::LittleEndian) => {
            LittleEndian::write_i16(out, value as i32 as i16)
        }
        (DataType::Integer, ByteOrder::BigEndian) => BigEndian::write_i16(out, value as i32 as i16),
        (DataType::Byte, _) => out[0] = value as i32 as u8,
    }
}

/// Check that `value` survives a store into `data_type` without truncation.
pub fn check_range(value: f64, data_type: DataType) -> Result<()> {
    let fits = match data_type {
        DataType::Double => true,
        DataType::Float => !value.is_finite() || value.abs() <= f32::MAX as f64,
        DataType::Integer => num_traits::cast::<f64, i16>(value).is_some(),
        DataType::Byte => num_traits::cast::<f64, u8>(value).is_some(),
    };
    if fits {
        Ok(())
    } else {
        Err(Error::ValueOutOfRange {
            value,
            data_type: data_type.as_header_str(),
        })
    }
}

/// Encoder/decoder bound to one storage type and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCodec {
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    /// Reject values that would be truncated instead of narrowing them.
    pub strict: bool,
}

impl CellCodec {
    pub fn new(data_type: DataType, byte_order: ByteOrder) -> Self {
        Self {
            data_type,
            byte_order,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn width(&self) -> usize {
        self.data_type.byte_width()
    }

    /// Decode `out.len()` consecutive cells from `bytes`.
    pub fn decode_into(&self, bytes: &[u8], out: &mut [f64]) {
        let w = self.width();
        for (i, v) in out.iter_mut().enumerate() {
            *v = read_value(&bytes[i * w..], self.data_type, self.byte_order);
        }
    }

    /// Decode every complete cell in `bytes`.
    pub fn decode_vec(&self, bytes: &[u8]) -> Vec<f64> {
        let mut out = vec![0.0; bytes.len() / self.width()];
        self.decode_into(bytes, &mut out);
        out
    }

    /// Encode `values` into a freshly allocated byte buffer.
    pub fn encode_vec(&self, values: &[f64]) -> Result<Vec<u8>> {
        let w = self.width();
        let mut out = vec![0u8; values.len() * w];
        for (i, &v) in values.iter().enumerate() {
            if self.strict {
                check_range(v, self.data_type)?;
            }
            write_value(v, self.data_type, self.byte_order, &mut out[i * w..]);
        }
        Ok(out)
    }
}
