//! Strip-organised GeoTIFF reading, one image row at a time.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use gridstore_core::raster::{GeoTransform, DEFAULT_NODATA};
use gridstore_core::vector::BoundingBox;
use gridstore_core::Crs;
use tracing::{debug, warn};

use crate::error::{invalid_tiff, FormatError, Result};
use crate::geotiff::ifd::{read_ifd_chain, tags, IfdEntry, TagValue, TiffByteOrder};
use crate::geotiff::keys::{geo_transform_from_tags, GeoKeyDirectory};

/// TIFF SampleFormat codes.
pub mod sample_format {
    pub const UNSIGNED: u16 = 1;
    pub const SIGNED: u16 = 2;
    pub const FLOAT: u16 = 3;
}

pub const PHOTOMETRIC_RGB: u16 = 2;
pub const COMPRESSION_NONE: u16 = 1;

/// How one pixel of a row is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    I64,
    F32,
    F64,
    /// 8-bit RGB or RGBA, packed into `a << 24 | b << 16 | g << 8 | r`.
    PackedRgb { alpha: bool },
}

impl SampleKind {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            SampleKind::U8 | SampleKind::I8 => 1,
            SampleKind::U16 | SampleKind::I16 => 2,
            SampleKind::U32 | SampleKind::I32 | SampleKind::F32 => 4,
            SampleKind::I64 | SampleKind::F64 => 8,
            SampleKind::PackedRgb { alpha } => {
                if alpha {
                    4
                } else {
                    3
                }
            }
        }
    }

    /// Resolve from the sample tags; `None` for layouts rows cannot be decoded from.
    pub fn from_tags(bits: &[u16], format: u16, photometric: Option<u16>) -> Option<Self> {
        if photometric == Some(PHOTOMETRIC_RGB) {
            let all_bytes = bits.iter().all(|&b| b == 8);
            return match bits.len() {
                3 if all_bytes => Some(SampleKind::PackedRgb { alpha: false }),
                4 if all_bytes => Some(SampleKind::PackedRgb { alpha: true }),
                _ => None,
            };
        }
        if bits.len() != 1 {
            return None;
        }
        match (format, bits[0]) {
            (sample_format::UNSIGNED, 8) => Some(SampleKind::U8),
            (sample_format::SIGNED, 8) => Some(SampleKind::I8),
            (sample_format::UNSIGNED, 16) => Some(SampleKind::U16),
            (sample_format::SIGNED, 16) => Some(SampleKind::I16),
            (sample_format::UNSIGNED, 32) => Some(SampleKind::U32),
            (sample_format::SIGNED, 32) => Some(SampleKind::I32),
            (sample_format::SIGNED, 64) => Some(SampleKind::I64),
            (sample_format::FLOAT, 32) => Some(SampleKind::F32),
            (sample_format::FLOAT, 64) => Some(SampleKind::F64),
            _ => None,
        }
    }

    fn decode<B: ByteOrder>(self, bytes: &[u8], out: &mut [f64]) {
        let width = self.bytes_per_pixel();
        for (v, chunk) in out.iter_mut().zip(bytes.chunks_exact(width)) {
            *v = match self {
                SampleKind::U8 => chunk[0] as f64,
                SampleKind::I8 => chunk[0] as i8 as f64,
                SampleKind::U16 => B::read_u16(chunk) as f64,
                SampleKind::I16 => B::read_i16(chunk) as f64,
                SampleKind::U32 => B::read_u32(chunk) as f64,
                SampleKind::I32 => B::read_i32(chunk) as f64,
                SampleKind::I64 => B::read_i64(chunk) as f64,
                SampleKind::F32 => B::read_f32(chunk) as f64,
                SampleKind::F64 => B::read_f64(chunk),
                SampleKind::PackedRgb { alpha } => {
                    let a = if alpha { chunk[3] as u32 } else { 255 };
                    let packed = a << 24 | (chunk[2] as u32) << 16 | (chunk[1] as u32) << 8 | chunk[0] as u32;
                    packed as f64
                }
            };
        }
    }
}

/// An open GeoTIFF file. Image properties come from the first IFD.
#[derive(Debug)]
pub struct GeoTiffReader {
    path: PathBuf,
    file: File,
    byte_order: TiffByteOrder,
    ifds: Vec<Vec<IfdEntry>>,
    rows: usize,
    columns: usize,
    bits_per_sample: Vec<u16>,
    sample_format: u16,
    photometric: Option<u16>,
    compression: u16,
    planar_config: u16,
    rows_per_strip: usize,
    strip_offsets: Vec<u64>,
    nodata: f64,
    geo_transform: Option<GeoTransform>,
    geo_keys: GeoKeyDirectory,
}

impl GeoTiffReader {
    /// Open a file and decode every IFD in the chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let (byte_order, ifds) = read_ifd_chain(&mut file)?;
        if ifds.is_empty() {
            return Err(invalid_tiff("file holds no image directory"));
        }
        debug!(path = %path.display(), ifds = ifds.len(), "reading TIFF");

        let first = &ifds[0];
        let find = |tag: u16| first.iter().find(|e| e.tag == tag).map(|e| &e.value);
        let first_int = |tag: u16| find(tag).and_then(TagValue::first_u64);
        let doubles = |tag: u16| find(tag).and_then(TagValue::as_f64_vec);

        let columns = first_int(tags::IMAGE_WIDTH).ok_or_else(|| invalid_tiff("missing ImageWidth"))? as usize;
        let rows = first_int(tags::IMAGE_LENGTH).ok_or_else(|| invalid_tiff("missing ImageLength"))? as usize;
        let bits_per_sample = find(tags::BITS_PER_SAMPLE)
            .and_then(TagValue::as_u64_vec)
            .map(|v| v.into_iter().map(|b| b as u16).collect())
            .unwrap_or_else(|| vec![1]);
        let sample_format = first_int(tags::SAMPLE_FORMAT).unwrap_or(sample_format::UNSIGNED as u64) as u16;
        let photometric = first_int(tags::PHOTOMETRIC).map(|v| v as u16);
        let compression = first_int(tags::COMPRESSION).unwrap_or(COMPRESSION_NONE as u64) as u16;
        let planar_config = first_int(tags::PLANAR_CONFIG).unwrap_or(1) as u16;
        let rows_per_strip = first_int(tags::ROWS_PER_STRIP)
            .map(|v| (v as usize).clamp(1, rows.max(1)))
            .unwrap_or(rows.max(1));
        let strip_offsets = find(tags::STRIP_OFFSETS).and_then(TagValue::as_u64_vec).unwrap_or_default();

        let nodata = find(tags::GDAL_NODATA)
            .and_then(TagValue::as_str)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(DEFAULT_NODATA);

        let geo_transform = geo_transform_from_tags(
            doubles(tags::MODEL_PIXEL_SCALE).as_deref(),
            doubles(tags::MODEL_TIEPOINT).as_deref(),
            doubles(tags::MODEL_TRANSFORMATION).as_deref(),
        );

        let geo_keys = match find(tags::GEO_KEY_DIRECTORY).and_then(TagValue::as_u64_vec) {
            Some(dir) => {
                let dir: Vec<u16> = dir.into_iter().map(|v| v as u16).collect();
                let dparams = doubles(tags::GEO_DOUBLE_PARAMS).unwrap_or_default();
                let aparams = find(tags::GEO_ASCII_PARAMS).and_then(TagValue::as_str).unwrap_or("");
                GeoKeyDirectory::parse(&dir, &dparams, aparams)?
            }
            None => GeoKeyDirectory::default(),
        };

        Ok(Self {
            path,
            file,
            byte_order,
            ifds,
            rows,
            columns,
            bits_per_sample,
            sample_format,
            photometric,
            compression,
            planar_config,
            rows_per_strip,
            strip_offsets,
            nodata,
            geo_transform,
            geo_keys,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_order(&self) -> TiffByteOrder {
        self.byte_order
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// First BitsPerSample value.
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.first().copied().unwrap_or(1)
    }

    pub fn samples_per_pixel(&self) -> usize {
        self.bits_per_sample.len()
    }

    pub fn sample_format(&self) -> u16 {
        self.sample_format
    }

    pub fn photometric(&self) -> Option<u16> {
        self.photometric
    }

    pub fn compression(&self) -> u16 {
        self.compression
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    pub fn is_tiled(&self) -> bool {
        self.tag(tags::TILE_OFFSETS).is_some()
    }

    pub fn ifd_count(&self) -> usize {
        self.ifds.len()
    }

    /// Look up a tag in the first IFD.
    pub fn tag(&self, tag: u16) -> Option<&TagValue> {
        self.ifds[0].iter().find(|e| e.tag == tag).map(|e| &e.value)
    }

    /// All entries of IFD `index`.
    pub fn ifd(&self, index: usize) -> Option<&[IfdEntry]> {
        self.ifds.get(index).map(Vec::as_slice)
    }

    pub fn geo_keys(&self) -> &GeoKeyDirectory {
        &self.geo_keys
    }

    pub fn epsg(&self) -> Option<u32> {
        self.geo_keys.epsg()
    }

    pub fn crs(&self) -> Option<Crs> {
        self.epsg().map(Crs::from_epsg)
    }

    pub fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    /// Northern edge; the row count when the file is not georeferenced.
    pub fn north(&self) -> f64 {
        match &self.geo_transform {
            Some(gt) => gt.origin_y,
            None => self.rows as f64,
        }
    }

    pub fn south(&self) -> f64 {
        match &self.geo_transform {
            Some(gt) => gt.origin_y + self.rows as f64 * gt.pixel_height,
            None => 0.0,
        }
    }

    pub fn east(&self) -> f64 {
        match &self.geo_transform {
            Some(gt) => gt.origin_x + self.columns as f64 * gt.pixel_width,
            None => self.columns as f64,
        }
    }

    pub fn west(&self) -> f64 {
        match &self.geo_transform {
            Some(gt) => gt.origin_x,
            None => 0.0,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.west(), self.south(), self.east(), self.north())
    }

    /// Sample layout, if rows of this file can be decoded.
    pub fn sample_kind(&self) -> Option<SampleKind> {
        if self.is_tiled() || self.compression != COMPRESSION_NONE || self.planar_config != 1 {
            return None;
        }
        SampleKind::from_tags(&self.bits_per_sample, self.sample_format, self.photometric)
    }

    /// Decode one row of the first image.
    ///
    /// Returns `Ok(None)` for files this reader cannot decode: tiled or
    /// compressed images, unsigned 64-bit samples and other layouts with no
    /// matching [`SampleKind`].
    pub fn row_data(&mut self, row: usize) -> Result<Option<Vec<f64>>> {
        if row >= self.rows {
            return Err(FormatError::IndexOutOfRange {
                index: row,
                len: self.rows,
            });
        }
        let kind = match self.sample_kind() {
            Some(kind) => kind,
            None => {
                warn!(
                    path = %self.path.display(),
                    bps = self.bits_per_sample(),
                    sample_format = self.sample_format,
                    compression = self.compression,
                    "unsupported TIFF layout"
                );
                return Ok(None);
            }
        };

        let strip = row / self.rows_per_strip;
        let strip_offset = *self
            .strip_offsets
            .get(strip)
            .ok_or_else(|| invalid_tiff(format!("no strip offset for strip {}", strip)))?;
        let file_len = self.file.metadata()?.len();
        let row_bytes = self.columns as u64 * kind.bytes_per_pixel() as u64;
        let offset = strip_offset.saturating_add((row % self.rows_per_strip) as u64 * row_bytes);
        if offset.saturating_add(row_bytes) > file_len {
            return Err(invalid_tiff(format!(
                "row {} ({} bytes at offset {}) runs past the end of a {} byte file",
                row, row_bytes, offset, file_len
            )));
        }

        let mut bytes = vec![0u8; row_bytes as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut bytes)?;

        let mut data = vec![0.0; self.columns];
        match self.byte_order {
            TiffByteOrder::LittleEndian => kind.decode::<LittleEndian>(&bytes, &mut data),
            TiffByteOrder::BigEndian => kind.decode::<BigEndian>(&bytes, &mut data),
        }
        Ok(Some(data))
    }
}
