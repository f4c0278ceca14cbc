//! LAS public header block and variable length records.

use byteorder::{ByteOrder, LittleEndian};
use gridstore_core::vector::BoundingBox;
use serde::Serialize;

use crate::error::{invalid_las, Result};

/// Size of the LAS 1.0-1.2 public header block; later versions extend it.
pub const MIN_HEADER_SIZE: usize = 227;
/// Size of a VLR header before its payload.
pub const VLR_HEADER_SIZE: usize = 54;

const SIGNATURE: &[u8; 4] = b"LASF";

/// Flags of the global encoding word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalEncoding {
    /// GPS time is adjusted standard time rather than GPS week time.
    pub adjusted_gps_time: bool,
    pub waveform_internal: bool,
    pub waveform_external: bool,
    pub synthetic_return_numbers: bool,
}

impl GlobalEncoding {
    pub fn from_bits(bits: u16) -> Self {
        Self {
            adjusted_gps_time: bits & 0b0001 != 0,
            waveform_internal: bits & 0b0010 != 0,
            waveform_external: bits & 0b0100 != 0,
            synthetic_return_numbers: bits & 0b1000 != 0,
        }
    }
}

/// The public header block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LasHeader {
    pub file_source_id: u16,
    pub global_encoding: GlobalEncoding,
    pub project_id_1: u32,
    pub project_id_2: u16,
    pub project_id_3: u16,
    pub project_id_4: [u8; 8],
    pub version_major: u8,
    pub version_minor: u8,
    pub system_identifier: String,
    pub generating_software: String,
    pub creation_day: u16,
    pub creation_year: u16,
    pub header_size: u16,
    pub offset_to_point_data: u32,
    pub num_vlrs: u32,
    pub point_format: u8,
    pub point_record_length: u16,
    pub num_points: u32,
    pub points_by_return: [u32; 5],
    pub x_scale: f64,
    pub y_scale: f64,
    pub z_scale: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub z_offset: f64,
    pub max_x: f64,
    pub min_x: f64,
    pub max_y: f64,
    pub min_y: f64,
    pub max_z: f64,
    pub min_z: f64,
}

impl LasHeader {
    /// Parse the fixed header fields from the start of the file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(invalid_las(format!(
                "header needs {} bytes, got {}",
                MIN_HEADER_SIZE,
                data.len()
            )));
        }
        if &data[0..4] != SIGNATURE {
            return Err(invalid_las("missing LASF signature"));
        }

        let u16_at = |pos: usize| LittleEndian::read_u16(&data[pos..pos + 2]);
        let u32_at = |pos: usize| LittleEndian::read_u32(&data[pos..pos + 4]);
        let f64_at = |pos: usize| LittleEndian::read_f64(&data[pos..pos + 8]);

        let mut project_id_4 = [0u8; 8];
        project_id_4.copy_from_slice(&data[16..24]);
        let mut points_by_return = [0u32; 5];
        for (i, n) in points_by_return.iter_mut().enumerate() {
            *n = u32_at(111 + i * 4);
        }

        let header = Self {
            file_source_id: u16_at(4),
            global_encoding: GlobalEncoding::from_bits(u16_at(6)),
            project_id_1: u32_at(8),
            project_id_2: u16_at(12),
            project_id_3: u16_at(14),
            project_id_4,
            version_major: data[24],
            version_minor: data[25],
            system_identifier: las_ascii(&data[26..58]),
            generating_software: las_ascii(&data[58..90]),
            creation_day: u16_at(90),
            creation_year: u16_at(92),
            header_size: u16_at(94),
            offset_to_point_data: u32_at(96),
            num_vlrs: u32_at(100),
            point_format: data[104],
            point_record_length: u16_at(105),
            num_points: u32_at(107),
            points_by_return,
            x_scale: f64_at(131),
            y_scale: f64_at(139),
            z_scale: f64_at(147),
            x_offset: f64_at(155),
            y_offset: f64_at(163),
            z_offset: f64_at(171),
            max_x: f64_at(179),
            min_x: f64_at(187),
            max_y: f64_at(195),
            min_y: f64_at(203),
            max_z: f64_at(211),
            min_z: f64_at(219),
        };

        if (header.header_size as usize) < MIN_HEADER_SIZE {
            return Err(invalid_las(format!("header size {} is too small", header.header_size)));
        }
        if header.offset_to_point_data < header.header_size as u32 {
            return Err(invalid_las("point data starts inside the header"));
        }
        Ok(header)
    }

    pub fn version(&self) -> String {
        format!("{}.{}", self.version_major, self.version_minor)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// A variable length record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vlr {
    pub reserved: u16,
    pub user_id: String,
    pub record_id: u16,
    pub description: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Vlr {
    /// Parse `count` records packed back to back in `data`.
    pub fn parse_all(data: &[u8], count: usize) -> Result<Vec<Vlr>> {
        let mut vlrs = Vec::with_capacity(count.min(data.len() / VLR_HEADER_SIZE));
        let mut pos = 0;
        for i in 0..count {
            if pos + VLR_HEADER_SIZE > data.len() {
                return Err(invalid_las(format!("VLR {} header runs past the point data offset", i)));
            }
            let head = &data[pos..pos + VLR_HEADER_SIZE];
            let length = LittleEndian::read_u16(&head[20..22]) as usize;
            let start = pos + VLR_HEADER_SIZE;
            if start + length > data.len() {
                return Err(invalid_las(format!("VLR {} payload runs past the point data offset", i)));
            }
            vlrs.push(Vlr {
                reserved: LittleEndian::read_u16(&head[0..2]),
                user_id: las_ascii(&head[2..18]),
                record_id: LittleEndian::read_u16(&head[18..20]),
                description: las_ascii(&head[22..54]),
                data: data[start..start + length].to_vec(),
            });
            pos = start + length;
        }
        Ok(vlrs)
    }
}

/// Decode a fixed-width ASCII field. NULs and other non-printable bytes
/// become spaces; trailing padding is dropped.
pub fn las_ascii(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { ' ' })
        .collect();
    text.trim_end().to_string()
}
