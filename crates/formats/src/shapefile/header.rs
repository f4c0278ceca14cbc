//! The 100-byte main file header shared by `.shp` and `.shx`.
//!
//! File code and file length are big-endian, everything after them is
//! little-endian.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use gridstore_core::vector::BoundingBox;

use crate::error::{invalid_shapefile, Result};
use crate::shapefile::geometry::ShapeType;

pub const HEADER_LEN: usize = 100;
pub const FILE_CODE: i32 = 9994;
pub const VERSION: i32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeHeader {
    /// Total file length in 16-bit words, header included.
    pub file_length: u32,
    pub version: i32,
    pub shape_type: ShapeType,
    pub bbox: BoundingBox,
    pub z_range: (f64, f64),
    pub m_range: (f64, f64),
}

impl ShapeHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(invalid_shapefile("file is shorter than the 100-byte header"));
        }
        let code = BigEndian::read_i32(&bytes[0..4]);
        if code != FILE_CODE {
            return Err(invalid_shapefile(format!("bad file code {}", code)));
        }
        let shape_code = LittleEndian::read_i32(&bytes[32..36]);
        let shape_type = ShapeType::from_code(shape_code)
            .ok_or_else(|| invalid_shapefile(format!("unknown shape type {}", shape_code)))?;
        let f = |at: usize| LittleEndian::read_f64(&bytes[at..at + 8]);
        Ok(Self {
            file_length: BigEndian::read_u32(&bytes[24..28]),
            version: LittleEndian::read_i32(&bytes[28..32]),
            shape_type,
            bbox: BoundingBox::new(f(36), f(44), f(52), f(60)),
            z_range: (f(68), f(76)),
            m_range: (f(84), f(92)),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        BigEndian::write_i32(&mut out[0..4], FILE_CODE);
        BigEndian::write_u32(&mut out[24..28], self.file_length);
        LittleEndian::write_i32(&mut out[28..32], self.version);
        LittleEndian::write_i32(&mut out[32..36], self.shape_type.code());
        // an empty extent is stored as zeros
        let bbox = if self.bbox.is_empty() {
            BoundingBox::new(0.0, 0.0, 0.0, 0.0)
        } else {
            self.bbox
        };
        let values = [
            bbox.min_x,
            bbox.min_y,
            bbox.max_x,
            bbox.max_y,
            self.z_range.0,
            self.z_range.1,
            self.m_range.0,
            self.m_range.1,
        ];
        for (i, v) in values.iter().enumerate() {
            let at = 36 + i * 8;
            LittleEndian::write_f64(&mut out[at..at + 8], *v);
        }
        out
    }
}
