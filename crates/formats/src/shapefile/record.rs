//! Record framing: an 8-byte big-endian header (number, content length)
//! followed by the little-endian shape type and payload.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;
use tracing::warn;

use crate::error::{invalid_shapefile, Result};
use crate::shapefile::geometry::{Geometry, ShapeType};
use crate::shapefile::header::HEADER_LEN;

/// Size of the record number and content length pair.
pub const RECORD_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    number: u32,
    geometry: Geometry,
}

/// Summary of a record for listings.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub number: u32,
    pub shape_type: ShapeType,
    pub points: usize,
    pub content_length: u32,
}

impl ShapeRecord {
    pub fn new(number: u32, geometry: Geometry) -> Self {
        Self { number, geometry }
    }

    /// One-based record number.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        self.number = number;
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn into_geometry(self) -> Geometry {
        self.geometry
    }

    pub fn shape_type(&self) -> ShapeType {
        self.geometry.shape_type()
    }

    /// Content length in 16-bit words, shape type included.
    pub fn content_length(&self) -> u32 {
        ((4 + self.geometry.encoded_len()) / 2) as u32
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            number: self.number,
            shape_type: self.shape_type(),
            points: self.geometry.num_points(),
            content_length: self.content_length(),
        }
    }

    /// Append the framed record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let payload = self.geometry.encode()?;
        let mut head = [0u8; RECORD_HEADER_LEN + 4];
        BigEndian::write_u32(&mut head[0..4], self.number);
        BigEndian::write_u32(&mut head[4..8], ((4 + payload.len()) / 2) as u32);
        LittleEndian::write_i32(&mut head[8..12], self.shape_type().code());
        out.extend_from_slice(&head);
        out.extend_from_slice(&payload);
        Ok(())
    }
}

/// Decode every record of a `.shp` image, stopping at the declared file
/// length or the end of the data, whichever comes first.
pub fn read_records(bytes: &[u8], file_length_words: u32) -> Result<Vec<ShapeRecord>> {
    let end = (file_length_words as usize * 2).min(bytes.len());
    if end < file_length_words as usize * 2 {
        warn!(
            declared = file_length_words as usize * 2,
            actual = bytes.len(),
            "shapefile is shorter than its header says"
        );
    }
    let mut records = Vec::new();
    let mut pos = HEADER_LEN;
    while pos + RECORD_HEADER_LEN + 4 <= end {
        let number = BigEndian::read_u32(&bytes[pos..pos + 4]);
        let content_len = BigEndian::read_u32(&bytes[pos + 4..pos + 8]) as usize * 2;
        if content_len < 4 || pos + RECORD_HEADER_LEN + content_len > end {
            return Err(invalid_shapefile(format!(
                "record {} at byte {} has a bad content length {}",
                number, pos, content_len
            )));
        }
        let code = LittleEndian::read_i32(&bytes[pos + 8..pos + 12]);
        let shape_type = ShapeType::from_code(code)
            .ok_or_else(|| invalid_shapefile(format!("record {} has unknown shape type {}", number, code)))?;
        let payload = &bytes[pos + 12..pos + RECORD_HEADER_LEN + content_len];
        records.push(ShapeRecord::new(number, Geometry::decode(shape_type, payload)?));
        pos += RECORD_HEADER_LEN + content_len;
    }
    Ok(records)
}
