//! Raster header sidecar (`.dep`).
//!
//! A line-oriented `Key:\tValue` text file. Keys are matched by a
//! case-insensitive substring test in a fixed priority order, so line order
//! does not matter and unknown lines are ignored. A line whose value fails to
//! parse is skipped and the field keeps its previous value.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::codec::{ByteOrder, DataType};
use crate::error::Result;
use crate::raster::GeoTransform;

/// Interpretation of cell values. Does not affect storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataScale {
    #[default]
    Continuous,
    Categorical,
    Boolean,
    Rgb,
}

impl DataScale {
    pub fn as_header_str(self) -> &'static str {
        match self {
            DataScale::Continuous => "continuous",
            DataScale::Categorical => "categorical",
            DataScale::Boolean => "boolean",
            DataScale::Rgb => "rgb",
        }
    }

    pub fn from_header_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        if s.contains("continuous") {
            Some(DataScale::Continuous)
        } else if s.contains("categorical") {
            Some(DataScale::Categorical)
        } else if s.contains("bool") {
            Some(DataScale::Boolean)
        } else if s.contains("rgb") {
            Some(DataScale::Rgb)
        } else {
            None
        }
    }
}

pub const DEFAULT_NODATA: f64 = -32768.0;
pub const DEFAULT_PALETTE: &str = "grey.pal";
pub const NOT_SPECIFIED: &str = "not specified";

/// Grid descriptor persisted in the header sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub rows: usize,
    pub cols: usize,
    pub data_type: DataType,
    pub data_scale: DataScale,
    pub z_units: String,
    pub xy_units: String,
    pub projection: String,
    pub nodata: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub display_minimum: f64,
    pub display_maximum: f64,
    pub preferred_palette: String,
    pub byte_order: ByteOrder,
    metadata: Vec<String>,
}

impl Default for RasterHeader {
    fn default() -> Self {
        Self {
            north: 0.0,
            south: 0.0,
            east: 0.0,
            west: 0.0,
            rows: 0,
            cols: 0,
            data_type: DataType::Float,
            data_scale: DataScale::Continuous,
            z_units: NOT_SPECIFIED.to_string(),
            xy_units: NOT_SPECIFIED.to_string(),
            projection: NOT_SPECIFIED.to_string(),
            nodata: DEFAULT_NODATA,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            display_minimum: f64::INFINITY,
            display_maximum: f64::NEG_INFINITY,
            preferred_palette: DEFAULT_PALETTE.to_string(),
            byte_order: ByteOrder::LittleEndian,
            metadata: Vec::new(),
        }
    }
}

impl RasterHeader {
    /// A header for a `rows` x `cols` grid spanning the given bounds.
    pub fn new(
        rows: usize,
        cols: usize,
        north: f64,
        south: f64,
        east: f64,
        west: f64,
        data_type: DataType,
        nodata: f64,
    ) -> Self {
        Self {
            north,
            south,
            east,
            west,
            rows,
            cols,
            data_type,
            nodata,
            ..Self::default()
        }
    }

    /// Copy geometry, scale, units, projection, palette and nodata of `template`
    /// into a fresh header with the given storage type.
    pub fn from_template(template: &RasterHeader, data_type: DataType) -> Self {
        Self {
            north: template.north,
            south: template.south,
            east: template.east,
            west: template.west,
            rows: template.rows,
            cols: template.cols,
            data_type,
            data_scale: template.data_scale,
            xy_units: template.xy_units.clone(),
            projection: template.projection.clone(),
            nodata: template.nodata,
            preferred_palette: template.preferred_palette.clone(),
            ..Self::default()
        }
    }

    /// Read and parse a header file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(Self::parse(&text))
    }

    /// Parse header text. Never fails; bad lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut h = Self::default();
        let mut byte_order_read = false;

        for line in text.lines() {
            let mut parts = line.split('\t');
            let key = parts.next().unwrap_or("").to_lowercase();
            let value = parts.next();
            if !h.apply_line(&key, value, &mut byte_order_read) {
                debug!("skipping header line {:?}", line);
            }
        }

        if h.display_minimum == f64::INFINITY {
            h.display_minimum = h.minimum;
        }
        if h.display_maximum == f64::NEG_INFINITY {
            h.display_maximum = h.maximum;
        }
        if !byte_order_read {
            h.byte_order = ByteOrder::LittleEndian;
        }
        h
    }

    /// Apply one `key`/`value` pair. Returns false when the line was not usable.
    fn apply_line(&mut self, key: &str, value: Option<&str>, byte_order_read: &mut bool) -> bool {
        let Some(value) = value else {
            return false;
        };
        let num = || parse_number(value);

        if key.contains("min:") && !key.contains("display") {
            num().map(|v| self.minimum = v).is_some()
        } else if key.contains("max:") && !key.contains("display") {
            num().map(|v| self.maximum = v).is_some()
        } else if key.contains("north") {
            num().map(|v| self.north = v).is_some()
        } else if key.contains("south") {
            num().map(|v| self.south = v).is_some()
        } else if key.contains("west") {
            num().map(|v| self.west = v).is_some()
        } else if key.contains("east") {
            num().map(|v| self.east = v).is_some()
        } else if key.contains("cols") {
            value.trim().parse().map(|v| self.cols = v).is_ok()
        } else if key.contains("rows") {
            value.trim().parse().map(|v| self.rows = v).is_ok()
        } else if key.contains("data type") {
            DataType::from_header_str(value).map(|t| self.data_type = t).is_some()
        } else if key.contains("data scale") {
            DataScale::from_header_str(value).map(|s| self.data_scale = s).is_some()
        } else if key.contains("z units") {
            self.z_units = value.to_string();
            true
        } else if key.contains("xy units") {
            self.xy_units = value.to_string();
            true
        } else if key.contains("projection") {
            self.projection = value.to_string();
            true
        } else if key.contains("display min") {
            num().map(|v| self.display_minimum = v).is_some()
        } else if key.contains("display max") {
            num().map(|v| self.display_maximum = v).is_some()
        } else if key.contains("preferred palette") {
            self.preferred_palette = value.replace(".plt", ".pal");
            true
        } else if key.contains("byte order") {
            self.byte_order = ByteOrder::from_header_str(value);
            *byte_order_read = true;
            true
        } else if key.contains("nodata") {
            num().map(|v| self.nodata = v).is_some()
        } else if key.contains("metadata entry") {
            self.add_metadata_entry(value);
            true
        } else {
            false
        }
    }

    /// Reset an empty or inverted display range to the data range.
    ///
    /// Returns `true` when min/max themselves are unknown (max < min) and the
    /// caller should rescan the data before relying on the display range.
    pub fn normalize_display_range(&mut self) -> bool {
        if self.display_maximum == f64::NEG_INFINITY {
            self.display_maximum = self.maximum;
        }
        if self.display_minimum == f64::INFINITY {
            self.display_minimum = self.minimum;
        }
        if self.display_maximum <= self.display_minimum {
            self.display_minimum = self.minimum;
            self.display_maximum = self.maximum;
            return self.maximum < self.minimum;
        }
        false
    }

    /// Serialize in the canonical key order.
    pub fn to_text(&self) -> String {
        let mut s = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(s, "Min:\t{}", fmt_number(self.minimum));
        let _ = writeln!(s, "Max:\t{}", fmt_number(self.maximum));
        let _ = writeln!(s, "North:\t{}", fmt_number(self.north));
        let _ = writeln!(s, "South:\t{}", fmt_number(self.south));
        let _ = writeln!(s, "East:\t{}", fmt_number(self.east));
        let _ = writeln!(s, "West:\t{}", fmt_number(self.west));
        let _ = writeln!(s, "Cols:\t{}", self.cols);
        let _ = writeln!(s, "Rows:\t{}", self.rows);
        let _ = writeln!(s, "Data Type:\t{}", self.data_type.as_header_str());
        let _ = writeln!(s, "Z Units:\t{}", self.z_units);
        let _ = writeln!(s, "XY Units:\t{}", self.xy_units);
        let _ = writeln!(s, "Projection:\t{}", self.projection);
        let _ = writeln!(s, "Data Scale:\t{}", self.data_scale.as_header_str());
        let _ = writeln!(s, "Display Min:\t{}", fmt_number(self.display_minimum));
        let _ = writeln!(s, "Display Max:\t{}", fmt_number(self.display_maximum));
        let _ = writeln!(s, "Preferred Palette:\t{}", self.preferred_palette.replace(".plt", ".pal"));
        let _ = writeln!(s, "NoData:\t{}", fmt_number(self.nodata));
        let _ = writeln!(s, "Byte Order:\t{}", self.byte_order.as_header_str());
        for entry in &self.metadata {
            let _ = writeln!(s, "Metadata Entry:\t{}", entry.replace(':', ";"));
        }
        s
    }

    /// Write the header, normalizing the display range first.
    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.normalize_display_range();
        fs::write(path.as_ref(), self.to_text())?;
        Ok(())
    }

    /// Append a free-text metadata line. `;` is stored on disk in place of `:`.
    pub fn add_metadata_entry(&mut self, entry: &str) {
        self.metadata.push(entry.replace(';', ":"));
    }

    /// Remove metadata line `index`; returns the removed line if it existed.
    pub fn delete_metadata_entry(&mut self, index: usize) -> Option<String> {
        if index < self.metadata.len() {
            Some(self.metadata.remove(index))
        } else {
            None
        }
    }

    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }

    /// Number of cells in the grid.
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Size in bytes the data file must have.
    pub fn data_file_len(&self) -> u64 {
        self.cell_count() as u64 * self.data_type.byte_width() as u64
    }

    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform::from_bounds(self.north, self.south, self.east, self.west, self.rows, self.cols)
    }

    pub fn cell_size_x(&self) -> f64 {
        self.geo_transform().cell_size_x()
    }

    pub fn cell_size_y(&self) -> f64 {
        self.geo_transform().cell_size_y()
    }
}

/// Data file companion of a header path (`.dep` → `.tas`).
pub fn data_file_path(header: &Path) -> PathBuf {
    header.with_extension("tas")
}

/// Statistics companion of a header path (`.dep` → `.wstat`).
pub fn stats_file_path(header: &Path) -> PathBuf {
    header.with_extension("wstat")
}

/// Number parser accepting `Infinity`/`-Infinity`/`NaN` spellings.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    match s {
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => s.parse::<f64>().ok(),
    }
}

/// Formats numbers so that integral values keep a trailing `.0`.
pub(crate) fn fmt_number(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Infinity".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{:?}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Min:\t1.0\nMax:\t250.5\nNorth:\t4800000.0\nSouth:\t4790000.0\n\
East:\t510000.0\nWest:\t500000.0\nCols:\t100\nRows:\t50\nData Type:\tFLOAT\n\
Z Units:\tmetres\nXY Units:\tmetres\nProjection:\tUTM 17N\nData Scale:\tcontinuous\n\
Display Min:\t10.0\nDisplay Max:\t200.0\nPreferred Palette:\tspectrum.plt\nNoData:\t-9999.0\n\
Byte Order:\tBIG_ENDIAN\nMetadata Entry:\tcreated by; test\n";

    #[test]
    fn test_parse_sample() {
        let h = RasterHeader::parse(SAMPLE);
        assert_eq!(h.minimum, 1.0);
        assert_eq!(h.maximum, 250.5);
        assert_eq!(h.north, 4_800_000.0);
        assert_eq!(h.west, 500_000.0);
        assert_eq!(h.cols, 100);
        assert_eq!(h.rows, 50);
        assert_eq!(h.data_type, DataType::Float);
        assert_eq!(h.data_scale, DataScale::Continuous);
        assert_eq!(h.projection, "UTM 17N");
        assert_eq!(h.display_minimum, 10.0);
        assert_eq!(h.display_maximum, 200.0);
        assert_eq!(h.preferred_palette, "spectrum.pal");
        assert_eq!(h.nodata, -9999.0);
        assert_eq!(h.byte_order, ByteOrder::BigEndian);
        assert_eq!(h.metadata(), &["created by: test".to_string()]);
    }

    #[test]
    fn test_line_order_irrelevant() {
        let mut lines: Vec<&str> = SAMPLE.lines().collect();
        lines.reverse();
        let reversed = lines.join("\n");
        assert_eq!(RasterHeader::parse(&reversed), RasterHeader::parse(SAMPLE));
    }

    #[test]
    fn test_garbled_line_keeps_default() {
        let h = RasterHeader::parse("North:\tnot-a-number\nSouth:\t5.0\nRows\n");
        assert_eq!(h.north, 0.0);
        assert_eq!(h.south, 5.0);
        assert_eq!(h.rows, 0);
    }

    #[test]
    fn test_defaults() {
        let h = RasterHeader::parse("");
        assert_eq!(h.byte_order, ByteOrder::LittleEndian);
        assert_eq!(h.nodata, DEFAULT_NODATA);
        assert_eq!(h.preferred_palette, DEFAULT_PALETTE);
        assert_eq!(h.z_units, NOT_SPECIFIED);
        assert_eq!(h.display_minimum, f64::INFINITY);
    }

    #[test]
    fn test_display_defaults_to_data_range() {
        let h = RasterHeader::parse("Min:\t2.0\nMax:\t8.0\n");
        assert_eq!(h.display_minimum, 2.0);
        assert_eq!(h.display_maximum, 8.0);
    }

    #[test]
    fn test_text_round_trip() {
        let h = RasterHeader::parse(SAMPLE);
        let text = h.to_text();
        assert!(text.starts_with("Min:\t1.0\nMax:\t250.5\nNorth:"));
        assert!(text.contains("Metadata Entry:\tcreated by; test\n"));
        assert_eq!(RasterHeader::parse(&text), h);
    }

    #[test]
    fn test_normalize_display_range() {
        let mut h = RasterHeader::default();
        h.minimum = 1.0;
        h.maximum = 5.0;
        h.display_minimum = 3.0;
        h.display_maximum = 3.0;
        assert!(!h.normalize_display_range());
        assert_eq!((h.display_minimum, h.display_maximum), (1.0, 5.0));

        let mut empty = RasterHeader::default();
        assert!(empty.normalize_display_range());
    }

    #[test]
    fn test_metadata_delete() {
        let mut h = RasterHeader::default();
        h.add_metadata_entry("a");
        h.add_metadata_entry("b");
        assert_eq!(h.delete_metadata_entry(0).as_deref(), Some("a"));
        assert_eq!(h.delete_metadata_entry(5), None);
        assert_eq!(h.metadata(), &["b".to_string()]);
    }

    #[test]
    fn test_companion_paths() {
        let p = Path::new("/tmp/dem.dep");
        assert_eq!(data_file_path(p), PathBuf::from("/tmp/dem.tas"));
        assert_eq!(stats_file_path(p), PathBuf::from("/tmp/dem.wstat"));
    }
}
