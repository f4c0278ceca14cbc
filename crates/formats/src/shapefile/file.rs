//! A shapefile and its companions: `.shx` index, `.dbf` attributes and
//! `.prj` projection.
//!
//! Records are decoded in full on open and kept in memory. Attributes are
//! joined by position: record `i` owns attribute row `i`.

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use gridstore_core::crs::LinearUnit;
use gridstore_core::vector::{AttributeValue, BoundingBox, Feature, FeatureCollection};
use gridstore_core::Crs;
use tracing::{debug, info, warn};

use crate::dbf::{AttributeTable, DbfField};
use crate::error::{invalid_dbf, FormatError, Result};
use crate::shapefile::geometry::{Geometry, ShapeType};
use crate::shapefile::header::{ShapeHeader, HEADER_LEN, VERSION};
use crate::shapefile::record::{read_records, ShapeRecord, RECORD_HEADER_LEN};

#[derive(Debug)]
pub struct ShapeFile {
    path: PathBuf,
    shape_type: ShapeType,
    bbox: BoundingBox,
    z_range: Option<(f64, f64)>,
    m_range: Option<(f64, f64)>,
    records: Vec<ShapeRecord>,
    attributes: Option<AttributeTable>,
    crs: Option<Crs>,
}

impl ShapeFile {
    /// Read a `.shp` file along with its `.dbf` and `.prj`, when present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        let header = ShapeHeader::parse(&bytes)?;
        let records = read_records(&bytes, header.file_length)?;

        let dbf = path.with_extension("dbf");
        let attributes = if dbf.exists() {
            Some(AttributeTable::open(&dbf)?)
        } else {
            None
        };
        if let Some(table) = &attributes {
            if table.num_records() != records.len() {
                warn!(
                    records = records.len(),
                    rows = table.num_records(),
                    "attribute table row count differs from record count"
                );
            }
        }
        let crs = Crs::read_prj(path.with_extension("prj"))?;

        for (i, r) in records.iter().enumerate() {
            let t = r.shape_type();
            if t != header.shape_type && t != ShapeType::Null {
                warn!(record = i + 1, expected = %header.shape_type, actual = %t, "record shape type differs from file");
            }
        }

        debug!(
            path = %path.display(),
            shape_type = %header.shape_type,
            records = records.len(),
            "opened shapefile"
        );
        Ok(Self {
            path,
            shape_type: header.shape_type,
            bbox: header.bbox,
            z_range: header.shape_type.has_z().then_some(header.z_range),
            m_range: (header.shape_type.has_z() || header.shape_type.requires_m()).then_some(header.m_range),
            records,
            attributes,
            crs,
        })
    }

    /// Start a new, empty shapefile. The attribute table is written at once,
    /// the `.shp` and `.shx` on [`ShapeFile::write`].
    pub fn create(path: impl AsRef<Path>, shape_type: ShapeType, fields: Vec<DbfField>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let attributes = AttributeTable::create(path.with_extension("dbf"), fields)?;
        debug!(path = %path.display(), shape_type = %shape_type, "created shapefile");
        Ok(Self {
            path,
            shape_type,
            bbox: BoundingBox::empty(),
            z_range: None,
            m_range: None,
            records: Vec::new(),
            attributes: Some(attributes),
            crs: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_path(&self) -> PathBuf {
        self.path.with_extension("shx")
    }

    pub fn database_path(&self) -> PathBuf {
        self.path.with_extension("dbf")
    }

    pub fn projection_path(&self) -> PathBuf {
        self.path.with_extension("prj")
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.z_range
    }

    pub fn m_range(&self) -> Option<(f64, f64)> {
        self.m_range
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ShapeRecord] {
        &self.records
    }

    /// Record at zero-based position `index`.
    pub fn record(&self, index: usize) -> Option<&ShapeRecord> {
        self.records.get(index)
    }

    pub fn attributes(&self) -> Option<&AttributeTable> {
        self.attributes.as_ref()
    }

    pub fn attributes_mut(&mut self) -> Option<&mut AttributeTable> {
        self.attributes.as_mut()
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Crs) {
        self.crs = Some(crs);
    }

    /// Horizontal unit named by the projection, if any.
    pub fn xy_units(&self) -> LinearUnit {
        self.crs.as_ref().map_or(LinearUnit::Unknown, Crs::linear_unit)
    }

    /// Append a geometry. Returns `false`, leaving the file untouched, when
    /// its shape type differs from the file's.
    pub fn add_record(&mut self, geometry: Geometry) -> bool {
        let actual = geometry.shape_type();
        if actual != self.shape_type {
            debug!(expected = %self.shape_type, actual = %actual, "rejected record");
            return false;
        }
        self.push(geometry);
        true
    }

    /// Append a geometry and its attribute row.
    pub fn add_record_with_attributes(&mut self, geometry: Geometry, values: Vec<AttributeValue>) -> Result<()> {
        let actual = geometry.shape_type();
        if actual != self.shape_type {
            return Err(FormatError::ShapeTypeMismatch {
                expected: self.shape_type.to_string(),
                actual: actual.to_string(),
            });
        }
        let table = self
            .attributes
            .as_mut()
            .ok_or_else(|| invalid_dbf("shapefile has no attribute table"))?;
        table.add_record(values)?;
        self.push(geometry);
        Ok(())
    }

    fn push(&mut self, geometry: Geometry) {
        self.expand_extents(&geometry);
        let number = self.records.len() as u32 + 1;
        self.records.push(ShapeRecord::new(number, geometry));
    }

    fn expand_extents(&mut self, geometry: &Geometry) {
        self.bbox.expand_to_box(&geometry.bbox());
        if let Some((lo, hi)) = geometry.z_range() {
            self.z_range = Some(match self.z_range {
                Some((a, b)) => (a.min(lo), b.max(hi)),
                None => (lo, hi),
            });
        }
        if let Some((lo, hi)) = geometry.m_range() {
            self.m_range = Some(match self.m_range {
                Some((a, b)) => (a.min(lo), b.max(hi)),
                None => (lo, hi),
            });
        }
    }

    /// Remove the record at `index` and its attribute row, renumber the
    /// rest and rewrite the files.
    pub fn delete_record(&mut self, index: usize) -> Result<ShapeRecord> {
        if index >= self.records.len() {
            return Err(FormatError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        let removed = self.records.remove(index);
        for (i, r) in self.records.iter_mut().enumerate() {
            r.set_number(i as u32 + 1);
        }
        if let Some(table) = self.attributes.as_mut() {
            if index < table.num_records() {
                table.delete_record(index)?;
            }
        }

        self.bbox = BoundingBox::empty();
        self.z_range = None;
        self.m_range = None;
        let geometries: Vec<Geometry> = self.records.iter().map(|r| r.geometry().clone()).collect();
        for g in &geometries {
            self.expand_extents(g);
        }

        self.write()?;
        Ok(removed)
    }

    /// Records worth drawing in `view`: all of them when the file lies
    /// inside it, none when the two do not overlap, otherwise those that
    /// touch `view` and exceed `min_size`.
    pub fn records_in_bbox(&self, view: &BoundingBox, min_size: f64) -> Vec<&ShapeRecord> {
        if self.records.is_empty() {
            return Vec::new();
        }
        if view.contains(&self.bbox) {
            return self.records.iter().collect();
        }
        if !self.bbox.overlaps(view) {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|r| r.geometry().is_mappable(view, min_size))
            .collect()
    }

    /// Records as `geo_types` features carrying their attribute row.
    pub fn features(&self) -> Result<FeatureCollection> {
        let mut collection = FeatureCollection::new();
        for (i, record) in self.records.iter().enumerate() {
            let mut feature = match record.geometry().to_geo() {
                Some(g) => Feature::new(g),
                None => Feature::empty(),
            }
            .with_id(record.number().to_string());
            if let Some(table) = &self.attributes {
                if i < table.num_records() {
                    let values = table.record(i)?;
                    for (field, value) in table.fields().iter().zip(values) {
                        feature.set_property(field.name.clone(), value.clone());
                    }
                }
            }
            collection.push(feature);
        }
        Ok(collection)
    }

    fn header(&self, file_length: u32) -> ShapeHeader {
        ShapeHeader {
            file_length,
            version: VERSION,
            shape_type: self.shape_type,
            bbox: self.bbox,
            z_range: self.z_range.unwrap_or((0.0, 0.0)),
            m_range: self.m_range.unwrap_or((0.0, 0.0)),
        }
    }

    /// Write `.shp`, `.shx`, the attribute table and, for a CRS with WKT,
    /// the `.prj`.
    pub fn write(&mut self) -> Result<()> {
        let mut body = Vec::new();
        let mut index = Vec::with_capacity(self.records.len() * 8);
        for record in &self.records {
            let offset = (HEADER_LEN + body.len()) / 2;
            record.encode_into(&mut body)?;
            let mut entry = [0u8; 8];
            BigEndian::write_u32(&mut entry[0..4], offset as u32);
            BigEndian::write_u32(&mut entry[4..8], record.content_length());
            index.extend_from_slice(&entry);
        }

        let mut shp = self.header(((HEADER_LEN + body.len()) / 2) as u32).encode().to_vec();
        shp.extend_from_slice(&body);
        fs::write(&self.path, &shp)?;

        let mut shx = self.header(((HEADER_LEN + index.len()) / 2) as u32).encode().to_vec();
        shx.extend_from_slice(&index);
        fs::write(self.index_path(), &shx)?;

        if let Some(table) = self.attributes.as_mut() {
            table.write()?;
        }
        if let Some(wkt) = self.crs.as_ref().and_then(Crs::wkt) {
            fs::write(self.projection_path(), wkt)?;
        }

        info!(
            path = %self.path.display(),
            records = self.records.len(),
            bytes = shp.len(),
            "wrote shapefile"
        );
        Ok(())
    }
}

/// Byte offsets of each record, read from a `.shx` image.
pub fn read_index(bytes: &[u8]) -> Result<Vec<(u64, u32)>> {
    let header = ShapeHeader::parse(bytes)?;
    let end = (header.file_length as usize * 2).min(bytes.len());
    Ok(bytes[HEADER_LEN..end]
        .chunks_exact(RECORD_HEADER_LEN)
        .map(|e| {
            (
                BigEndian::read_u32(&e[0..4]) as u64 * 2,
                BigEndian::read_u32(&e[4..8]) * 2,
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fields() -> Vec<DbfField> {
        vec![
            DbfField::character("NAME", 12).unwrap(),
            DbfField::numeric("COUNT", 6, 0).unwrap(),
        ]
    }

    #[test]
    fn test_add_record_enforces_shape_type() {
        let dir = TempDir::new().unwrap();
        let mut shp = ShapeFile::create(dir.path().join("pts.shp"), ShapeType::Point, fields()).unwrap();
        assert!(shp.add_record(Geometry::point(1.0, 2.0)));
        assert!(!shp.add_record(Geometry::point_z(1.0, 2.0, 3.0, None)));
        assert!(!shp.add_record(Geometry::polyline(vec![0], vec![[0.0, 0.0], [1.0, 1.0]])));
        assert_eq!(shp.num_records(), 1);

        let err = shp
            .add_record_with_attributes(Geometry::Null, vec![AttributeValue::Null, AttributeValue::Null])
            .unwrap_err();
        assert!(matches!(err, FormatError::ShapeTypeMismatch { .. }));
        assert_eq!(shp.attributes().unwrap().num_records(), 0);
    }

    #[test]
    fn test_extent_grows_with_records() {
        let dir = TempDir::new().unwrap();
        let mut shp = ShapeFile::create(dir.path().join("pts.shp"), ShapeType::Point, fields()).unwrap();
        assert!(shp.bbox().is_empty());
        shp.add_record(Geometry::point(1.0, 5.0));
        shp.add_record(Geometry::point(-3.0, 2.0));
        assert_eq!(shp.bbox(), BoundingBox::new(-3.0, 2.0, 1.0, 5.0));
    }

    #[test]
    fn test_write_index_offsets() {
        let dir = TempDir::new().unwrap();
        let mut shp = ShapeFile::create(dir.path().join("pts.shp"), ShapeType::Point, fields()).unwrap();
        for i in 0..3 {
            shp.add_record_with_attributes(
                Geometry::point(i as f64, i as f64),
                vec![AttributeValue::String(format!("p{}", i)), AttributeValue::Int(i)],
            )
            .unwrap();
        }
        shp.write().unwrap();

        let index = read_index(&fs::read(shp.index_path()).unwrap()).unwrap();
        assert_eq!(index, vec![(100, 20), (128, 20), (156, 20)]);
        assert_eq!(fs::metadata(shp.path()).unwrap().len(), 184);
    }

    #[test]
    fn test_records_in_bbox() {
        let dir = TempDir::new().unwrap();
        let mut shp = ShapeFile::create(dir.path().join("lines.shp"), ShapeType::PolyLine, Vec::new()).unwrap();
        shp.add_record(Geometry::polyline(vec![0], vec![[0.0, 0.0], [10.0, 0.0]]));
        shp.add_record(Geometry::polyline(vec![0], vec![[50.0, 50.0], [50.1, 50.1]]));
        shp.add_record(Geometry::polyline(vec![0], vec![[90.0, 90.0], [100.0, 100.0]]));

        assert_eq!(shp.records_in_bbox(&BoundingBox::new(-1.0, -1.0, 101.0, 101.0), 5.0).len(), 3);
        let hits = shp.records_in_bbox(&BoundingBox::new(-1.0, -1.0, 60.0, 60.0), 1.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].number(), 1);
        assert!(shp.records_in_bbox(&BoundingBox::new(200.0, 200.0, 300.0, 300.0), 0.0).is_empty());
    }
}
