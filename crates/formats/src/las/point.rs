//! Point record decoding for LAS point formats 0-5.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

/// Highest point format this crate decodes.
pub const MAX_POINT_FORMAT: u8 = 5;

/// Bytes every supported format starts with.
const CORE_LEN: usize = 20;

/// Minimum record length of each point format.
pub fn min_record_length(format: u8) -> Option<usize> {
    match format {
        0 => Some(20),
        1 => Some(28),
        2 => Some(26),
        3 => Some(34),
        4 => Some(57),
        5 => Some(63),
        _ => None,
    }
}

pub fn has_gps_time(format: u8) -> bool {
    matches!(format, 1 | 3 | 4 | 5)
}

/// Byte offset of the RGB triple inside a record, for formats that carry one.
pub fn rgb_offset(format: u8) -> Option<usize> {
    match format {
        2 => Some(20),
        3 | 5 => Some(28),
        _ => None,
    }
}

/// Scale and offset applied to the stored integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub scale: [f64; 3],
    pub offset: [f64; 3],
}

/// Flags packed in the return byte (offset 14).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReturnInfo {
    pub return_number: u8,
    pub number_of_returns: u8,
    pub scan_direction: bool,
    pub edge_of_flight_line: bool,
}

impl ReturnInfo {
    pub fn from_byte(b: u8) -> Self {
        Self {
            return_number: b & 0b111,
            number_of_returns: (b >> 3) & 0b111,
            scan_direction: b & 0x40 != 0,
            edge_of_flight_line: b & 0x80 != 0,
        }
    }
}

/// Classification byte (offset 15): 5-bit class plus three flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub class: u8,
    pub synthetic: bool,
    pub key_point: bool,
    pub withheld: bool,
}

impl Classification {
    pub fn from_byte(b: u8) -> Self {
        Self {
            class: b & 0x1f,
            synthetic: b & 0x20 != 0,
            key_point: b & 0x40 != 0,
            withheld: b & 0x80 != 0,
        }
    }
}

/// One decoded point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
    pub returns: ReturnInfo,
    pub classification: Classification,
    pub scan_angle: i8,
    pub user_data: u8,
    pub point_source_id: u16,
    /// Present for point formats 1, 3, 4 and 5.
    pub gps_time: Option<f64>,
}

impl PointRecord {
    /// Decode a record of `format`. `data` must hold at least the format's
    /// minimum record length.
    pub fn decode(data: &[u8], format: u8, q: &Quantization) -> Self {
        debug_assert!(data.len() >= CORE_LEN);
        let coord = |i: usize| {
            let raw = LittleEndian::read_i32(&data[i * 4..i * 4 + 4]);
            raw as f64 * q.scale[i] + q.offset[i]
        };
        let gps_time = if has_gps_time(format) {
            Some(LittleEndian::read_f64(&data[20..28]))
        } else {
            None
        };
        Self {
            x: coord(0),
            y: coord(1),
            z: coord(2),
            intensity: LittleEndian::read_u16(&data[12..14]),
            returns: ReturnInfo::from_byte(data[14]),
            classification: Classification::from_byte(data[15]),
            scan_angle: data[16] as i8,
            user_data: data[17],
            point_source_id: LittleEndian::read_u16(&data[18..20]),
            gps_time,
        }
    }
}

/// 16-bit RGB colour of a point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl Rgb {
    /// Decode the colour of a record, if its format carries one.
    pub fn decode(data: &[u8], format: u8) -> Option<Self> {
        let at = rgb_offset(format)?;
        Some(Self {
            red: LittleEndian::read_u16(&data[at..at + 2]),
            green: LittleEndian::read_u16(&data[at + 2..at + 4]),
            blue: LittleEndian::read_u16(&data[at + 4..at + 6]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: Quantization = Quantization {
        scale: [0.01, 0.01, 0.001],
        offset: [1000.0, 2000.0, 0.0],
    };

    #[test]
    fn test_return_byte() {
        let r = ReturnInfo::from_byte(0b0010_0101);
        assert_eq!(r.return_number, 5);
        assert_eq!(r.number_of_returns, 4);
        assert!(!r.scan_direction);
        assert!(!r.edge_of_flight_line);

        let r = ReturnInfo::from_byte(0b1100_1001);
        assert_eq!(r.return_number, 1);
        assert_eq!(r.number_of_returns, 1);
        assert!(r.scan_direction);
        assert!(r.edge_of_flight_line);
    }

    #[test]
    fn test_classification_byte() {
        let c = Classification::from_byte(0b1010_0010);
        assert_eq!(c.class, 2);
        assert!(c.synthetic);
        assert!(!c.key_point);
        assert!(c.withheld);
        assert_eq!(Classification::from_byte(0x5f).class, 31);
        assert!(Classification::from_byte(0x5f).key_point);
    }

    #[test]
    fn test_decode_format_3() {
        let mut data = vec![0u8; 34];
        LittleEndian::write_i32(&mut data[0..4], 150);
        LittleEndian::write_i32(&mut data[4..8], -250);
        LittleEndian::write_i32(&mut data[8..12], 12345);
        LittleEndian::write_u16(&mut data[12..14], 900);
        data[14] = 0b0001_0010;
        data[15] = 6;
        data[16] = (-12i8) as u8;
        data[17] = 7;
        LittleEndian::write_u16(&mut data[18..20], 42);
        LittleEndian::write_f64(&mut data[20..28], 123.5);
        LittleEndian::write_u16(&mut data[28..30], 65535);
        LittleEndian::write_u16(&mut data[30..32], 256);
        LittleEndian::write_u16(&mut data[32..34], 1);

        let p = PointRecord::decode(&data, 3, &UNIT);
        assert!((p.x - 1001.5).abs() < 1e-9);
        assert!((p.y - 1997.5).abs() < 1e-9);
        assert!((p.z - 12.345).abs() < 1e-9);
        assert_eq!(p.intensity, 900);
        assert_eq!(p.returns.return_number, 2);
        assert_eq!(p.returns.number_of_returns, 2);
        assert_eq!(p.classification.class, 6);
        assert_eq!(p.scan_angle, -12);
        assert_eq!(p.user_data, 7);
        assert_eq!(p.point_source_id, 42);
        assert_eq!(p.gps_time, Some(123.5));
        assert_eq!(
            Rgb::decode(&data, 3),
            Some(Rgb {
                red: 65535,
                green: 256,
                blue: 1
            })
        );
    }

    #[test]
    fn test_format_capabilities() {
        assert!(!has_gps_time(0));
        assert!(!has_gps_time(2));
        assert!(has_gps_time(4));
        assert_eq!(rgb_offset(2), Some(20));
        assert_eq!(rgb_offset(5), Some(28));
        assert_eq!(rgb_offset(1), None);
        assert_eq!(min_record_length(6), None);
        let data = vec![0u8; 20];
        assert_eq!(PointRecord::decode(&data, 0, &UNIT).gps_time, None);
        assert_eq!(Rgb::decode(&data, 0), None);
    }
}
