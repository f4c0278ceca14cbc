//! Single-strip, uncompressed GeoTIFF writer.
//!
//! Files are big-endian (`MM`). Image data follows the 8-byte header
//! directly, and the IFD comes after the data, so rows can be streamed to
//! disk without knowing their values in advance. Values longer than 4 bytes
//! go to an overflow region after the IFD table, each padded to an even
//! length.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use gridstore_core::raster::GeoTransform;
use tracing::{debug, info};

use crate::error::{invalid_tiff, Result};
use crate::geotiff::ifd::{push_u16, push_u32, tags, IfdEntry, TagValue, TiffByteOrder};
use crate::geotiff::keys::{key_ids, GeoKey, GeoKeyDirectory, MODEL_TYPE_GEOGRAPHIC, MODEL_TYPE_PROJECTED, RASTER_PIXEL_IS_AREA};
use crate::geotiff::reader::sample_format;

const ORDER: TiffByteOrder = TiffByteOrder::BigEndian;
const HEADER_LEN: u64 = 8;

/// Sample type of the written image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl SampleType {
    pub fn bytes(self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    pub fn bits(self) -> u16 {
        self.bytes() as u16 * 8
    }

    pub fn sample_format(self) -> u16 {
        match self {
            SampleType::U8 | SampleType::U16 | SampleType::U32 => sample_format::UNSIGNED,
            SampleType::I8 | SampleType::I16 | SampleType::I32 => sample_format::SIGNED,
            SampleType::F32 | SampleType::F64 => sample_format::FLOAT,
        }
    }

    /// Append `value` big-endian. Integer types saturate.
    fn push(self, value: f64, out: &mut Vec<u8>) {
        match self {
            SampleType::U8 => out.push(value as u8),
            SampleType::I8 => out.push(value as i8 as u8),
            SampleType::U16 => out.extend_from_slice(&(value as u16).to_be_bytes()),
            SampleType::I16 => out.extend_from_slice(&(value as i16).to_be_bytes()),
            SampleType::U32 => out.extend_from_slice(&(value as u32).to_be_bytes()),
            SampleType::I32 => out.extend_from_slice(&(value as i32).to_be_bytes()),
            SampleType::F32 => out.extend_from_slice(&(value as f32).to_be_bytes()),
            SampleType::F64 => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// Builds a GeoTIFF file from rows of `f64` values.
#[derive(Debug, Clone)]
pub struct GeoTiffWriter {
    path: PathBuf,
    rows: usize,
    columns: usize,
    sample_type: SampleType,
    geo_transform: Option<GeoTransform>,
    nodata: Option<f64>,
    geo_keys: GeoKeyDirectory,
    extra_tags: Vec<IfdEntry>,
}

impl GeoTiffWriter {
    pub fn new(path: impl AsRef<Path>, rows: usize, columns: usize, sample_type: SampleType) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rows,
            columns,
            sample_type,
            geo_transform: None,
            nodata: None,
            geo_keys: GeoKeyDirectory::default(),
            extra_tags: Vec::new(),
        }
    }

    /// Georeference through ModelTiepoint + ModelPixelScale.
    pub fn set_geo_transform(&mut self, transform: GeoTransform) -> &mut Self {
        self.geo_transform = Some(transform);
        self
    }

    /// Written as the GDAL_NODATA ASCII tag.
    pub fn set_nodata(&mut self, nodata: f64) -> &mut Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn add_geo_key(&mut self, key: GeoKey) -> &mut Self {
        self.geo_keys.insert(key);
        self
    }

    /// Declare an EPSG coordinate system. Codes in the 4000 range are
    /// treated as geographic, everything else as projected.
    pub fn set_epsg(&mut self, code: u16) -> &mut Self {
        let geographic = (4000..5000).contains(&code);
        let (model, key) = if geographic {
            (MODEL_TYPE_GEOGRAPHIC, key_ids::GEOGRAPHIC_TYPE)
        } else {
            (MODEL_TYPE_PROJECTED, key_ids::PROJECTED_CS_TYPE)
        };
        self.add_geo_key(GeoKey::short(key_ids::GT_MODEL_TYPE, model));
        self.add_geo_key(GeoKey::short(key_ids::GT_RASTER_TYPE, RASTER_PIXEL_IS_AREA));
        self.add_geo_key(GeoKey::short(key, code))
    }

    /// Add or replace an arbitrary tag.
    pub fn add_tag(&mut self, entry: IfdEntry) -> &mut Self {
        self.extra_tags.retain(|e| e.tag != entry.tag);
        self.extra_tags.push(entry);
        self
    }

    fn data_len(&self) -> u64 {
        (self.rows * self.columns * self.sample_type.bytes()) as u64
    }

    /// Every tag of the IFD, sorted by tag code.
    pub fn ifd_entries(&self) -> Vec<IfdEntry> {
        let data_len = self.data_len() as u32;
        let mut entries = vec![
            IfdEntry::new(tags::IMAGE_WIDTH, TagValue::Longs(vec![self.columns as u32])),
            IfdEntry::new(tags::IMAGE_LENGTH, TagValue::Longs(vec![self.rows as u32])),
            IfdEntry::new(tags::BITS_PER_SAMPLE, TagValue::Shorts(vec![self.sample_type.bits()])),
            IfdEntry::new(tags::COMPRESSION, TagValue::Shorts(vec![1])),
            // BlackIsZero
            IfdEntry::new(tags::PHOTOMETRIC, TagValue::Shorts(vec![1])),
            IfdEntry::new(tags::STRIP_OFFSETS, TagValue::Longs(vec![HEADER_LEN as u32])),
            IfdEntry::new(tags::SAMPLES_PER_PIXEL, TagValue::Shorts(vec![1])),
            IfdEntry::new(tags::ROWS_PER_STRIP, TagValue::Longs(vec![self.rows as u32])),
            IfdEntry::new(tags::STRIP_BYTE_COUNTS, TagValue::Longs(vec![data_len])),
            IfdEntry::new(tags::PLANAR_CONFIG, TagValue::Shorts(vec![1])),
            IfdEntry::new(tags::SAMPLE_FORMAT, TagValue::Shorts(vec![self.sample_type.sample_format()])),
        ];
        if let Some(gt) = &self.geo_transform {
            entries.push(IfdEntry::new(
                tags::MODEL_PIXEL_SCALE,
                TagValue::Doubles(vec![gt.pixel_width, -gt.pixel_height, 0.0]),
            ));
            entries.push(IfdEntry::new(
                tags::MODEL_TIEPOINT,
                TagValue::Doubles(vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0]),
            ));
        }
        if !self.geo_keys.is_empty() {
            entries.extend(self.geo_keys.to_tags());
        }
        if let Some(nodata) = self.nodata {
            entries.push(IfdEntry::new(tags::GDAL_NODATA, TagValue::Ascii(format_nodata(nodata))));
        }
        for extra in &self.extra_tags {
            entries.retain(|e| e.tag != extra.tag);
            entries.push(extra.clone());
        }
        entries.sort_by_key(|e| e.tag);
        entries
    }

    /// Stream the image to disk, asking `next_row` for each row in order.
    pub fn write_rows<F>(&self, mut next_row: F) -> Result<()>
    where
        F: FnMut(usize) -> Result<Vec<f64>>,
    {
        if self.rows == 0 || self.columns == 0 {
            return Err(invalid_tiff("image has no rows or columns"));
        }
        let data_len = self.data_len();
        let pad = data_len % 2;
        let ifd_offset = HEADER_LEN + data_len + pad;
        if ifd_offset > u32::MAX as u64 {
            return Err(invalid_tiff("image too large for a classic TIFF"));
        }

        let mut out = BufWriter::new(File::create(&self.path)?);
        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.extend_from_slice(b"MM");
        push_u16(ORDER, &mut header, 42);
        push_u32(ORDER, &mut header, ifd_offset as u32);
        out.write_all(&header)?;

        let mut buf = Vec::with_capacity(self.columns * self.sample_type.bytes());
        for row in 0..self.rows {
            let values = next_row(row)?;
            if values.len() != self.columns {
                return Err(gridstore_core::Error::RowLengthMismatch {
                    expected: self.columns,
                    actual: values.len(),
                }
                .into());
            }
            buf.clear();
            for &v in &values {
                self.sample_type.push(v, &mut buf);
            }
            out.write_all(&buf)?;
        }
        if pad == 1 {
            out.write_all(&[0])?;
        }

        let entries = self.ifd_entries();
        out.write_all(&encode_ifd(ORDER, &entries, ifd_offset as u32))?;
        out.flush()?;

        info!(
            path = %self.path.display(),
            rows = self.rows,
            cols = self.columns,
            tags = entries.len(),
            "wrote GeoTIFF"
        );
        Ok(())
    }

    /// Write a complete row-major buffer.
    pub fn write(&self, values: &[f64]) -> Result<()> {
        let expected = self.rows * self.columns;
        if values.len() != expected {
            return Err(gridstore_core::Error::RowLengthMismatch {
                expected,
                actual: values.len(),
            }
            .into());
        }
        self.write_rows(|row| Ok(values[row * self.columns..(row + 1) * self.columns].to_vec()))
    }
}

/// Serialise an IFD located at `ifd_offset`, followed by its overflow values.
///
/// Entries must already be sorted by tag. The next-IFD pointer is 0.
pub fn encode_ifd(order: TiffByteOrder, entries: &[IfdEntry], ifd_offset: u32) -> Vec<u8> {
    let table_len = 2 + 12 * entries.len() as u32 + 4;
    let mut cursor = ifd_offset + table_len;
    let mut table = Vec::with_capacity(table_len as usize);
    let mut overflow = Vec::new();

    push_u16(order, &mut table, entries.len() as u16);
    for entry in entries {
        let mut bytes = entry.value.encode(order);
        push_u16(order, &mut table, entry.tag);
        push_u16(order, &mut table, entry.value.type_id());
        push_u32(order, &mut table, entry.value.count());
        if bytes.len() <= 4 {
            bytes.resize(4, 0);
            table.extend_from_slice(&bytes);
        } else {
            push_u32(order, &mut table, cursor);
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            cursor += bytes.len() as u32;
            overflow.extend_from_slice(&bytes);
        }
    }
    push_u32(order, &mut table, 0);
    debug!(entries = entries.len(), overflow = overflow.len(), "encoded IFD");

    table.extend_from_slice(&overflow);
    table
}

fn format_nodata(nodata: f64) -> String {
    if nodata.fract() == 0.0 && nodata.abs() < 1e15 {
        format!("{}", nodata as i64)
    } else {
        format!("{}", nodata)
    }
}
