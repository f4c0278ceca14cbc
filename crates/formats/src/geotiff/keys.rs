//! GeoKey directory decoding and assembly.
//!
//! The GeoKeyDirectory tag (34735) is a table of SHORTs: a 4-value header
//! `[version, revision, minor, key_count]` followed by one
//! `[key_id, location, count, value_or_offset]` record per key. A location
//! of 0 stores a single SHORT inline; otherwise the value lives in
//! GeoDoubleParams (34736), GeoAsciiParams (34737) or past the key records
//! of the directory itself.

use gridstore_core::raster::GeoTransform;
use tracing::warn;

use crate::error::{invalid_tiff, Result};
use crate::geotiff::ifd::{tags, IfdEntry, TagValue};

/// Well-known GeoKey IDs.
pub mod key_ids {
    pub const GT_MODEL_TYPE: u16 = 1024;
    pub const GT_RASTER_TYPE: u16 = 1025;
    pub const GT_CITATION: u16 = 1026;
    pub const GEOGRAPHIC_TYPE: u16 = 2048;
    pub const GEOG_CITATION: u16 = 2049;
    pub const GEOG_ANGULAR_UNITS: u16 = 2054;
    pub const PROJECTED_CS_TYPE: u16 = 3072;
    pub const PCS_CITATION: u16 = 3073;
    pub const PROJ_LINEAR_UNITS: u16 = 3076;
    pub const VERTICAL_CS_TYPE: u16 = 4096;
}

pub const MODEL_TYPE_PROJECTED: u16 = 1;
pub const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Code reserved for user-defined coordinate systems.
const USER_DEFINED: u16 = 32767;

#[derive(Debug, Clone, PartialEq)]
pub enum GeoKeyValue {
    Short(u16),
    Shorts(Vec<u16>),
    Doubles(Vec<f64>),
    Ascii(String),
}

/// One decoded GeoKey.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoKey {
    pub id: u16,
    pub value: GeoKeyValue,
}

impl GeoKey {
    pub fn short(id: u16, value: u16) -> Self {
        Self { id, value: GeoKeyValue::Short(value) }
    }

    pub fn shorts(id: u16, values: Vec<u16>) -> Self {
        Self { id, value: GeoKeyValue::Shorts(values) }
    }

    pub fn doubles(id: u16, values: Vec<f64>) -> Self {
        Self { id, value: GeoKeyValue::Doubles(values) }
    }

    pub fn ascii(id: u16, value: impl Into<String>) -> Self {
        Self { id, value: GeoKeyValue::Ascii(value.into()) }
    }

    pub fn as_short(&self) -> Option<u16> {
        match &self.value {
            GeoKeyValue::Short(v) => Some(*v),
            GeoKeyValue::Shorts(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_doubles(&self) -> Option<&[f64]> {
        match &self.value {
            GeoKeyValue::Doubles(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            GeoKeyValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

/// The decoded content of a GeoKeyDirectory tag.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoKeyDirectory {
    pub version: u16,
    pub revision: u16,
    pub minor: u16,
    keys: Vec<GeoKey>,
}

impl Default for GeoKeyDirectory {
    fn default() -> Self {
        Self {
            version: 1,
            revision: 1,
            minor: 0,
            keys: Vec::new(),
        }
    }
}

impl GeoKeyDirectory {
    pub fn from_keys(keys: Vec<GeoKey>) -> Self {
        let mut dir = Self::default();
        for key in keys {
            dir.insert(key);
        }
        dir
    }

    /// Decode the directory, resolving references into the double and
    /// ASCII parameter tags. Keys whose reference cannot be resolved are
    /// skipped with a warning.
    pub fn parse(directory: &[u16], doubles: &[f64], ascii: &str) -> Result<Self> {
        if directory.len() < 4 {
            return Err(invalid_tiff("GeoKeyDirectory shorter than its header"));
        }
        let key_count = directory[3] as usize;
        if directory.len() < 4 + key_count * 4 {
            return Err(invalid_tiff(format!(
                "GeoKeyDirectory declares {} keys but holds {} values",
                key_count,
                directory.len()
            )));
        }

        let ascii = ascii.as_bytes();
        let mut keys = Vec::with_capacity(key_count);
        for i in 0..key_count {
            let base = 4 + i * 4;
            let id = directory[base];
            let location = directory[base + 1];
            let count = directory[base + 2] as usize;
            let offset = directory[base + 3] as usize;

            let value = match location {
                0 => Some(GeoKeyValue::Short(offset as u16)),
                tags::GEO_DOUBLE_PARAMS => doubles
                    .get(offset..offset + count)
                    .map(|v| GeoKeyValue::Doubles(v.to_vec())),
                tags::GEO_KEY_DIRECTORY => directory
                    .get(offset..offset + count)
                    .map(|v| GeoKeyValue::Shorts(v.to_vec())),
                tags::GEO_ASCII_PARAMS if offset <= ascii.len() => {
                    let end = (offset + count).min(ascii.len());
                    let text = String::from_utf8_lossy(&ascii[offset..end]);
                    Some(GeoKeyValue::Ascii(text.trim_end_matches(['|', '\0']).to_string()))
                }
                _ => None,
            };
            match value {
                Some(value) => keys.push(GeoKey { id, value }),
                None => warn!(key = id, location, "GeoKey references missing parameter data"),
            }
        }

        Ok(Self {
            version: directory[0],
            revision: directory[1],
            minor: directory[2],
            keys,
        })
    }

    /// Replace any key with the same ID, keeping keys sorted by ID.
    pub fn insert(&mut self, key: GeoKey) {
        match self.keys.binary_search_by_key(&key.id, |k| k.id) {
            Ok(i) => self.keys[i] = key,
            Err(i) => self.keys.insert(i, key),
        }
    }

    pub fn get(&self, id: u16) -> Option<&GeoKey> {
        self.keys.iter().find(|k| k.id == id)
    }

    pub fn keys(&self) -> &[GeoKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// EPSG code from ProjectedCSTypeGeoKey, else GeographicTypeGeoKey.
    pub fn epsg(&self) -> Option<u32> {
        [key_ids::PROJECTED_CS_TYPE, key_ids::GEOGRAPHIC_TYPE]
            .iter()
            .filter_map(|&id| self.get(id).and_then(GeoKey::as_short))
            .find(|&code| code > 0 && code != USER_DEFINED)
            .map(u32::from)
    }

    /// Assemble the directory and its parameter tags.
    ///
    /// Multi-value SHORT keys are appended after the key records and
    /// addressed by index into the directory; ASCII values are each
    /// terminated with a NUL that their count does not include.
    pub fn to_tags(&self) -> Vec<IfdEntry> {
        let header_len = (self.keys.len() + 1) * 4;
        let mut directory = vec![self.version, self.revision, self.minor, self.keys.len() as u16];
        let mut extra_shorts = Vec::new();
        let mut doubles = Vec::new();
        let mut ascii = String::new();

        for key in &self.keys {
            directory.push(key.id);
            match &key.value {
                GeoKeyValue::Short(v) => directory.extend_from_slice(&[0, 1, *v]),
                GeoKeyValue::Shorts(v) => {
                    let offset = header_len + extra_shorts.len();
                    directory.extend_from_slice(&[tags::GEO_KEY_DIRECTORY, v.len() as u16, offset as u16]);
                    extra_shorts.extend_from_slice(v);
                }
                GeoKeyValue::Doubles(v) => {
                    directory.extend_from_slice(&[tags::GEO_DOUBLE_PARAMS, v.len() as u16, doubles.len() as u16]);
                    doubles.extend_from_slice(v);
                }
                GeoKeyValue::Ascii(s) => {
                    directory.extend_from_slice(&[tags::GEO_ASCII_PARAMS, s.len() as u16, ascii.len() as u16]);
                    ascii.push_str(s);
                    ascii.push('\0');
                }
            }
        }
        directory.extend(extra_shorts);

        let mut entries = vec![IfdEntry::new(tags::GEO_KEY_DIRECTORY, TagValue::Shorts(directory))];
        if !doubles.is_empty() {
            entries.push(IfdEntry::new(tags::GEO_DOUBLE_PARAMS, TagValue::Doubles(doubles)));
        }
        if !ascii.is_empty() {
            entries.push(IfdEntry::new(tags::GEO_ASCII_PARAMS, TagValue::Ascii(ascii)));
        }
        entries
    }
}

/// Extract a north-up GeoTransform from ModelPixelScale + ModelTiepoint, or
/// from a ModelTransformation matrix without rotation terms.
pub fn geo_transform_from_tags(
    scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    transform: Option<&[f64]>,
) -> Option<GeoTransform> {
    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    // Row-major 4x4: x = t[3] + col * t[0] + row * t[1]
    if let Some(t) = transform {
        if t.len() >= 16 {
            if t[1] != 0.0 || t[4] != 0.0 {
                warn!("rotated ModelTransformation is not supported");
                return None;
            }
            return Some(GeoTransform::new(t[3], t[7], t[0], t[5]));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GeoKeyDirectory {
        GeoKeyDirectory::from_keys(vec![
            GeoKey::short(key_ids::PROJECTED_CS_TYPE, 32617),
            GeoKey::short(key_ids::GT_MODEL_TYPE, MODEL_TYPE_PROJECTED),
            GeoKey::ascii(key_ids::GT_CITATION, "UTM 17N"),
            GeoKey::doubles(4097, vec![1.5, 2.5]),
            GeoKey::shorts(4098, vec![7, 8, 9]),
            GeoKey::ascii(key_ids::PCS_CITATION, "WGS 84"),
        ])
    }

    fn split(entries: &[IfdEntry]) -> (Vec<u16>, Vec<f64>, String) {
        let mut dir = Vec::new();
        let mut doubles = Vec::new();
        let mut ascii = String::new();
        for e in entries {
            match (e.tag, &e.value) {
                (tags::GEO_KEY_DIRECTORY, TagValue::Shorts(v)) => dir = v.clone(),
                (tags::GEO_DOUBLE_PARAMS, TagValue::Doubles(v)) => doubles = v.clone(),
                (tags::GEO_ASCII_PARAMS, TagValue::Ascii(s)) => ascii = s.clone(),
                _ => panic!("unexpected tag {}", e.tag),
            }
        }
        (dir, doubles, ascii)
    }

    #[test]
    fn test_keys_sorted_by_id() {
        let ids: Vec<u16> = sample().keys().iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![1024, 1026, 3072, 3073, 4097, 4098]);
    }

    #[test]
    fn test_directory_layout() {
        let (dir, doubles, ascii) = split(&sample().to_tags());
        assert_eq!(&dir[..4], &[1, 1, 0, 6]);
        // GTModelType inline
        assert_eq!(&dir[4..8], &[1024, 0, 1, 1]);
        // citation in ascii params, count without the NUL
        assert_eq!(&dir[8..12], &[1026, tags::GEO_ASCII_PARAMS, 7, 0]);
        // multi-short key stored after the 7 four-value records
        assert_eq!(&dir[24..28], &[4098, tags::GEO_KEY_DIRECTORY, 3, 28]);
        assert_eq!(&dir[28..], &[7, 8, 9]);
        assert_eq!(doubles, vec![1.5, 2.5]);
        assert_eq!(ascii, "UTM 17N\0WGS 84\0");
    }

    #[test]
    fn test_parse_assembled_directory() {
        let original = sample();
        let (dir, doubles, ascii) = split(&original.to_tags());
        let parsed = GeoKeyDirectory::parse(&dir, &doubles, &ascii).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.epsg(), Some(32617));
        assert_eq!(parsed.get(key_ids::PCS_CITATION).unwrap().as_str(), Some("WGS 84"));
    }

    #[test]
    fn test_pipe_terminated_ascii() {
        let dir = [1, 1, 0, 1, key_ids::GT_CITATION, tags::GEO_ASCII_PARAMS, 8, 0];
        let parsed = GeoKeyDirectory::parse(&dir, &[], "NAD83 z|").unwrap();
        assert_eq!(parsed.get(key_ids::GT_CITATION).unwrap().as_str(), Some("NAD83 z"));
    }

    #[test]
    fn test_epsg_falls_back_to_geographic() {
        let dir = GeoKeyDirectory::from_keys(vec![
            GeoKey::short(key_ids::PROJECTED_CS_TYPE, USER_DEFINED),
            GeoKey::short(key_ids::GEOGRAPHIC_TYPE, 4326),
        ]);
        assert_eq!(dir.epsg(), Some(4326));
        assert_eq!(GeoKeyDirectory::default().epsg(), None);
    }

    #[test]
    fn test_truncated_directory() {
        assert!(GeoKeyDirectory::parse(&[1, 1, 0], &[], "").is_err());
        assert!(GeoKeyDirectory::parse(&[1, 1, 0, 2, 1024, 0, 1, 1], &[], "").is_err());
    }

    #[test]
    fn test_missing_double_reference_is_skipped() {
        let dir = [1, 1, 0, 1, 4097, tags::GEO_DOUBLE_PARAMS, 2, 5];
        let parsed = GeoKeyDirectory::parse(&dir, &[1.0], "").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_geo_transform_from_tiepoint() {
        let gt = geo_transform_from_tags(
            Some(&[10.0, 20.0, 0.0]),
            Some(&[0.0, 0.0, 0.0, 500.0, 1000.0, 0.0]),
            None,
        )
        .unwrap();
        assert_eq!(gt.origin_x, 500.0);
        assert_eq!(gt.origin_y, 1000.0);
        assert_eq!(gt.pixel_width, 10.0);
        assert_eq!(gt.pixel_height, -20.0);

        let mut matrix = [0.0; 16];
        matrix[0] = 2.0;
        matrix[3] = 100.0;
        matrix[5] = -2.0;
        matrix[7] = 50.0;
        let gt = geo_transform_from_tags(None, None, Some(&matrix)).unwrap();
        assert_eq!((gt.origin_x, gt.origin_y, gt.pixel_width, gt.pixel_height), (100.0, 50.0, 2.0, -2.0));
        assert!(geo_transform_from_tags(None, None, None).is_none());
    }
}
