//! TIFF IFD (Image File Directory) parsing and encoding.
//!
//! Entries are first parsed into [`RawTagEntry`] values straight from the
//! 12-byte directory records, then resolved into typed [`TagValue`]s by
//! following the value offset when the payload does not fit in 4 bytes.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

use crate::error::{invalid_tiff, Result};

/// Byte order of the TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

/// Well-known TIFF tag IDs.
pub mod tags {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GEO_DOUBLE_PARAMS: u16 = 34736;
    pub const GEO_ASCII_PARAMS: u16 = 34737;
    pub const GDAL_NODATA: u16 = 42113;
}

/// TIFF field type IDs.
pub mod field_type {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
}

/// TIFF data type IDs and their byte sizes.
pub fn type_byte_size(type_id: u16) -> Option<usize> {
    match type_id {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// A raw IFD tag entry before value resolution.
#[derive(Debug, Clone)]
pub struct RawTagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u32,
    /// The 4 value bytes as stored in the file.
    pub value_bytes: [u8; 4],
    /// True if the value data is inline (fits in 4 bytes).
    pub inline: bool,
}

impl RawTagEntry {
    /// The value field read as a file offset.
    pub fn offset(&self, order: TiffByteOrder) -> u32 {
        read_u32(order, &self.value_bytes)
    }

    /// Bytes occupied by the value.
    pub fn value_size(&self) -> u64 {
        (type_byte_size(self.type_id).unwrap_or(1) as u64).saturating_mul(self.count as u64)
    }
}

/// Parsed TIFF header.
#[derive(Debug, Clone)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u32,
}

/// A single parsed IFD with all tag entries and the offset to the next IFD.
#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<RawTagEntry>,
    pub next_ifd_offset: u32,
}

/// A typed tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bytes(Vec<u8>),
    /// ASCII text without the trailing NUL.
    Ascii(String),
    Shorts(Vec<u16>),
    Longs(Vec<u32>),
    Rationals(Vec<(u32, u32)>),
    SBytes(Vec<i8>),
    Undefined(Vec<u8>),
    SShorts(Vec<i16>),
    SLongs(Vec<i32>),
    SRationals(Vec<(i32, i32)>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl TagValue {
    pub fn type_id(&self) -> u16 {
        match self {
            TagValue::Bytes(_) => field_type::BYTE,
            TagValue::Ascii(_) => field_type::ASCII,
            TagValue::Shorts(_) => field_type::SHORT,
            TagValue::Longs(_) => field_type::LONG,
            TagValue::Rationals(_) => field_type::RATIONAL,
            TagValue::SBytes(_) => field_type::SBYTE,
            TagValue::Undefined(_) => field_type::UNDEFINED,
            TagValue::SShorts(_) => field_type::SSHORT,
            TagValue::SLongs(_) => field_type::SLONG,
            TagValue::SRationals(_) => field_type::SRATIONAL,
            TagValue::Floats(_) => field_type::FLOAT,
            TagValue::Doubles(_) => field_type::DOUBLE,
        }
    }

    /// TIFF count: number of values, or bytes including the NUL for ASCII.
    pub fn count(&self) -> u32 {
        let n = match self {
            TagValue::Bytes(v) | TagValue::Undefined(v) => v.len(),
            TagValue::Ascii(s) => s.len() + 1,
            TagValue::Shorts(v) => v.len(),
            TagValue::Longs(v) => v.len(),
            TagValue::Rationals(v) => v.len(),
            TagValue::SBytes(v) => v.len(),
            TagValue::SShorts(v) => v.len(),
            TagValue::SLongs(v) => v.len(),
            TagValue::SRationals(v) => v.len(),
            TagValue::Floats(v) => v.len(),
            TagValue::Doubles(v) => v.len(),
        };
        n as u32
    }

    /// Integer values widened to `u64`; `None` for non-integer types.
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            TagValue::Bytes(v) | TagValue::Undefined(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Shorts(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Longs(v) => Some(v.iter().map(|&x| x as u64).collect()),
            _ => None,
        }
    }

    pub fn first_u64(&self) -> Option<u64> {
        self.as_u64_vec().and_then(|v| v.first().copied())
    }

    /// Numeric values widened to `f64`.
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Floats(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::Doubles(v) => Some(v.clone()),
            TagValue::SShorts(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::SLongs(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::Rationals(v) => Some(v.iter().map(|&(n, d)| n as f64 / d as f64).collect()),
            _ => self.as_u64_vec().map(|v| v.into_iter().map(|x| x as f64).collect()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Decode `count` values of `type_id` from `data`.
    pub fn decode(order: TiffByteOrder, type_id: u16, count: u32, data: &[u8]) -> Option<TagValue> {
        let n = count as usize;
        let size = type_byte_size(type_id)?;
        if data.len() < n * size {
            return None;
        }
        let at = |i: usize| &data[i * size..(i + 1) * size];
        let value = match type_id {
            field_type::BYTE => TagValue::Bytes(data[..n].to_vec()),
            field_type::UNDEFINED => TagValue::Undefined(data[..n].to_vec()),
            field_type::SBYTE => TagValue::SBytes(data[..n].iter().map(|&b| b as i8).collect()),
            field_type::ASCII => {
                let bytes = &data[..n];
                // trailing NULs only; GeoAsciiParams packs several strings
                let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                TagValue::Ascii(String::from_utf8_lossy(&bytes[..end]).to_string())
            }
            field_type::SHORT => TagValue::Shorts((0..n).map(|i| read_u16(order, at(i))).collect()),
            field_type::SSHORT => TagValue::SShorts((0..n).map(|i| read_u16(order, at(i)) as i16).collect()),
            field_type::LONG => TagValue::Longs((0..n).map(|i| read_u32(order, at(i))).collect()),
            field_type::SLONG => TagValue::SLongs((0..n).map(|i| read_u32(order, at(i)) as i32).collect()),
            field_type::RATIONAL => TagValue::Rationals(
                (0..n)
                    .map(|i| (read_u32(order, &at(i)[..4]), read_u32(order, &at(i)[4..])))
                    .collect(),
            ),
            field_type::SRATIONAL => TagValue::SRationals(
                (0..n)
                    .map(|i| (read_u32(order, &at(i)[..4]) as i32, read_u32(order, &at(i)[4..]) as i32))
                    .collect(),
            ),
            field_type::FLOAT => TagValue::Floats((0..n).map(|i| read_f32(order, at(i))).collect()),
            field_type::DOUBLE => TagValue::Doubles((0..n).map(|i| read_f64(order, at(i))).collect()),
            _ => return None,
        };
        Some(value)
    }

    /// Encode the payload in `order`. ASCII gets its NUL terminator.
    pub fn encode(&self, order: TiffByteOrder) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TagValue::Bytes(v) | TagValue::Undefined(v) => out.extend_from_slice(v),
            TagValue::SBytes(v) => out.extend(v.iter().map(|&b| b as u8)),
            TagValue::Ascii(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TagValue::Shorts(v) => v.iter().for_each(|&x| push_u16(order, &mut out, x)),
            TagValue::SShorts(v) => v.iter().for_each(|&x| push_u16(order, &mut out, x as u16)),
            TagValue::Longs(v) => v.iter().for_each(|&x| push_u32(order, &mut out, x)),
            TagValue::SLongs(v) => v.iter().for_each(|&x| push_u32(order, &mut out, x as u32)),
            TagValue::Rationals(v) => v.iter().for_each(|&(n, d)| {
                push_u32(order, &mut out, n);
                push_u32(order, &mut out, d);
            }),
            TagValue::SRationals(v) => v.iter().for_each(|&(n, d)| {
                push_u32(order, &mut out, n as u32);
                push_u32(order, &mut out, d as u32);
            }),
            TagValue::Floats(v) => v.iter().for_each(|&x| push_u32(order, &mut out, x.to_bits())),
            TagValue::Doubles(v) => v.iter().for_each(|&x| push_u64(order, &mut out, x.to_bits())),
        }
        out
    }
}

/// A resolved IFD entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IfdEntry {
    pub tag: u16,
    pub value: TagValue,
}

impl IfdEntry {
    pub fn new(tag: u16, value: TagValue) -> Self {
        Self { tag, value }
    }
}

/// Parse the 8-byte TIFF header.
pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < 8 {
        return Err(invalid_tiff("header too short"));
    }

    let byte_order = match (data[0], data[1]) {
        (b'I', b'I') => TiffByteOrder::LittleEndian,
        (b'M', b'M') => TiffByteOrder::BigEndian,
        _ => return Err(invalid_tiff("invalid byte order marker")),
    };

    let magic = read_u16(byte_order, &data[2..4]);
    if magic != 42 {
        return Err(invalid_tiff(format!("expected magic 42, got {}", magic)));
    }

    let first_ifd_offset = read_u32(byte_order, &data[4..8]);

    Ok(TiffHeader {
        byte_order,
        first_ifd_offset,
    })
}

/// Parse one IFD from raw bytes.
///
/// `data` must start at the IFD offset and contain enough bytes to parse
/// all entries plus the 4-byte next-IFD pointer.
pub fn parse_ifd(byte_order: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    if data.len() < 2 {
        return Err(invalid_tiff("IFD too short"));
    }

    let entry_count = read_u16(byte_order, &data[0..2]) as usize;
    let needed = 2 + entry_count * 12 + 4;

    if data.len() < needed {
        return Err(invalid_tiff(format!(
            "IFD needs {} bytes but only {} available",
            needed,
            data.len()
        )));
    }

    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let offset = 2 + i * 12;
        let tag = read_u16(byte_order, &data[offset..offset + 2]);
        let type_id = read_u16(byte_order, &data[offset + 2..offset + 4]);
        let count = read_u32(byte_order, &data[offset + 4..offset + 8]);
        let mut value_bytes = [0u8; 4];
        value_bytes.copy_from_slice(&data[offset + 8..offset + 12]);

        let total_bytes = type_byte_size(type_id).unwrap_or(1) as u64 * count as u64;
        entries.push(RawTagEntry {
            tag,
            type_id,
            count,
            value_bytes,
            inline: total_bytes <= 4,
        });
    }

    let next_offset_pos = 2 + entry_count * 12;
    let next_ifd_offset = read_u32(byte_order, &data[next_offset_pos..next_offset_pos + 4]);

    Ok(RawIfd {
        entries,
        next_ifd_offset,
    })
}

/// Resolve a raw entry, reading out-of-line values from `reader`.
///
/// Entries with an unknown field type resolve to `None`.
pub fn resolve_entry<R: Read + Seek>(
    reader: &mut R,
    byte_order: TiffByteOrder,
    raw: &RawTagEntry,
) -> Result<Option<IfdEntry>> {
    if type_byte_size(raw.type_id).is_none() {
        return Ok(None);
    }
    let value = if raw.inline {
        TagValue::decode(byte_order, raw.type_id, raw.count, &raw.value_bytes)
    } else {
        let file_len = reader.seek(SeekFrom::End(0))?;
        let offset = raw.offset(byte_order) as u64;
        let size = raw.value_size();
        if size > file_len || offset.saturating_add(size) > file_len {
            return Err(invalid_tiff(format!(
                "tag {} holds {} bytes at offset {}, past the end of a {} byte file",
                raw.tag, size, offset, file_len
            )));
        }
        let mut data = vec![0u8; size as usize];
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut data)?;
        TagValue::decode(byte_order, raw.type_id, raw.count, &data)
    };
    Ok(value.map(|value| IfdEntry { tag: raw.tag, value }))
}

/// Walk the IFD chain starting after the file header.
pub fn read_ifd_chain<R: Read + Seek>(reader: &mut R) -> Result<(TiffByteOrder, Vec<Vec<IfdEntry>>)> {
    let mut head = [0u8; 8];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut head)?;
    let header = parse_header(&head)?;
    let order = header.byte_order;

    let mut ifds = Vec::new();
    let mut seen = HashSet::new();
    let mut next = header.first_ifd_offset;
    while next != 0 {
        if !seen.insert(next) {
            return Err(invalid_tiff(format!("IFD chain loops back to offset {}", next)));
        }
        reader.seek(SeekFrom::Start(next as u64))?;
        let mut count = [0u8; 2];
        reader.read_exact(&mut count)?;
        let n = read_u16(order, &count) as usize;

        let mut data = vec![0u8; 2 + n * 12 + 4];
        data[..2].copy_from_slice(&count);
        reader.read_exact(&mut data[2..])?;
        let raw = parse_ifd(order, &data)?;

        let mut entries = Vec::with_capacity(raw.entries.len());
        for entry in &raw.entries {
            if let Some(resolved) = resolve_entry(reader, order, entry)? {
                entries.push(resolved);
            }
        }
        ifds.push(entries);
        next = raw.next_ifd_offset;
    }
    Ok((order, ifds))
}

// ---- Byte order helpers ----

pub(crate) fn read_u16(order: TiffByteOrder, data: &[u8]) -> u16 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(data),
        TiffByteOrder::BigEndian => BigEndian::read_u16(data),
    }
}

pub(crate) fn read_u32(order: TiffByteOrder, data: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(data),
        TiffByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}

pub(crate) fn read_u64(order: TiffByteOrder, data: &[u8]) -> u64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u64(data),
        TiffByteOrder::BigEndian => BigEndian::read_u64(data),
    }
}

pub(crate) fn read_f32(order: TiffByteOrder, data: &[u8]) -> f32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f32(data),
        TiffByteOrder::BigEndian => BigEndian::read_f32(data),
    }
}

pub(crate) fn read_f64(order: TiffByteOrder, data: &[u8]) -> f64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f64(data),
        TiffByteOrder::BigEndian => BigEndian::read_f64(data),
    }
}

pub(crate) fn push_u16(order: TiffByteOrder, out: &mut Vec<u8>, v: u16) {
    let mut b = [0u8; 2];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u16(&mut b, v),
        TiffByteOrder::BigEndian => BigEndian::write_u16(&mut b, v),
    }
    out.extend_from_slice(&b);
}

pub(crate) fn push_u32(order: TiffByteOrder, out: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u32(&mut b, v),
        TiffByteOrder::BigEndian => BigEndian::write_u32(&mut b, v),
    }
    out.extend_from_slice(&b);
}

pub(crate) fn push_u64(order: TiffByteOrder, out: &mut Vec<u8>, v: u64) {
    let mut b = [0u8; 8];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u64(&mut b, v),
        TiffByteOrder::BigEndian => BigEndian::write_u64(&mut b, v),
    }
    out.extend_from_slice(&b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_header_le() {
        // II (little-endian), magic 42, first IFD at offset 8
        let mut data = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
        let header = parse_header(&data).unwrap();
        assert_eq!(header.byte_order, TiffByteOrder::LittleEndian);
        assert_eq!(header.first_ifd_offset, 8);

        // Big-endian
        data = vec![b'M', b'M', 0, 42, 0, 0, 0, 8];
        let header = parse_header(&data).unwrap();
        assert_eq!(header.byte_order, TiffByteOrder::BigEndian);
        assert_eq!(header.first_ifd_offset, 8);

        assert!(parse_header(&[b'X', b'X', 0, 42, 0, 0, 0, 8]).is_err());
        assert!(parse_header(&[b'M', b'M', 0, 43, 0, 0, 0, 8]).is_err());
    }

    #[test]
    fn test_parse_ifd_empty() {
        // 0 entries, next IFD = 0
        let data = vec![0, 0, 0, 0, 0, 0];
        let ifd = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        assert_eq!(ifd.entries.len(), 0);
        assert_eq!(ifd.next_ifd_offset, 0);
    }

    #[test]
    fn test_parse_ifd_one_entry() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes());
        // tag = 256 (ImageWidth), SHORT, count 1, value 512
        data.extend_from_slice(&256u16.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&512u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());

        let ifd = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        assert_eq!(ifd.entries.len(), 1);
        let raw = &ifd.entries[0];
        assert_eq!(raw.tag, 256);
        assert!(raw.inline);
        let value = TagValue::decode(TiffByteOrder::LittleEndian, raw.type_id, raw.count, &raw.value_bytes).unwrap();
        assert_eq!(value, TagValue::Shorts(vec![512]));
    }

    #[test]
    fn test_inline_short_big_endian() {
        // a SHORT is left-justified in the value field
        let raw = RawTagEntry {
            tag: tags::COMPRESSION,
            type_id: field_type::SHORT,
            count: 1,
            value_bytes: [0, 1, 0, 0],
            inline: true,
        };
        let mut cursor = Cursor::new(Vec::new());
        let entry = resolve_entry(&mut cursor, TiffByteOrder::BigEndian, &raw).unwrap().unwrap();
        assert_eq!(entry.value.first_u64(), Some(1));
    }

    #[test]
    fn test_out_of_line_doubles() {
        let mut file = vec![0u8; 16];
        for v in [10.0f64, 20.0, 0.0] {
            file.extend_from_slice(&v.to_be_bytes());
        }
        let raw = RawTagEntry {
            tag: tags::MODEL_PIXEL_SCALE,
            type_id: field_type::DOUBLE,
            count: 3,
            value_bytes: 16u32.to_be_bytes(),
            inline: false,
        };
        let mut cursor = Cursor::new(file);
        let entry = resolve_entry(&mut cursor, TiffByteOrder::BigEndian, &raw).unwrap().unwrap();
        assert_eq!(entry.value.as_f64_vec().unwrap(), vec![10.0, 20.0, 0.0]);
    }

    #[test]
    fn test_out_of_line_value_past_end_of_file() {
        let raw = RawTagEntry {
            tag: tags::STRIP_OFFSETS,
            type_id: field_type::LONG,
            count: u32::MAX,
            value_bytes: 8u32.to_le_bytes(),
            inline: false,
        };
        let mut cursor = Cursor::new(vec![0u8; 64]);
        assert!(resolve_entry(&mut cursor, TiffByteOrder::LittleEndian, &raw).is_err());

        let short = RawTagEntry { count: 15, ..raw };
        assert!(resolve_entry(&mut cursor, TiffByteOrder::LittleEndian, &short).is_err());
        let fits = RawTagEntry { count: 14, ..raw };
        let entry = resolve_entry(&mut cursor, TiffByteOrder::LittleEndian, &fits).unwrap().unwrap();
        assert_eq!(entry.value.as_u64_vec().map(|v| v.len()), Some(14));
    }

    #[test]
    fn test_ascii_encode_keeps_terminator() {
        let v = TagValue::Ascii("-9999".to_string());
        assert_eq!(v.count(), 6);
        let bytes = v.encode(TiffByteOrder::BigEndian);
        assert_eq!(bytes, b"-9999\0".to_vec());
        let back = TagValue::decode(TiffByteOrder::BigEndian, field_type::ASCII, 6, &bytes).unwrap();
        assert_eq!(back, v);
    }
}
