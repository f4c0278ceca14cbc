//! In-memory dBASE III attribute table.
//!
//! The whole table is decoded on open. Edits stay in memory until
//! [`AttributeTable::write`], which replaces the file through a temporary
//! copy.

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use chrono::{Datelike, Local, NaiveDate};
use gridstore_core::vector::AttributeValue;
use tracing::{debug, info};

use crate::dbf::field::{DbfField, DESCRIPTOR_LEN};
use crate::error::{invalid_dbf, FormatError, Result};

const VERSION: u8 = 0x03;
const HEADER_TERMINATOR: u8 = 0x0D;
const END_OF_DATA: u8 = 0x1A;
const LIVE: u8 = b' ';
const DELETED: u8 = b'*';

#[derive(Debug, Clone)]
pub struct AttributeTable {
    path: PathBuf,
    fields: Vec<DbfField>,
    records: Vec<Vec<AttributeValue>>,
    deleted: Vec<bool>,
    last_update: NaiveDate,
    dirty: bool,
}

impl AttributeTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        let mut table = Self::parse(&bytes)?;
        table.path = path;
        debug!(
            path = %table.path.display(),
            fields = table.fields.len(),
            records = table.records.len(),
            "opened attribute table"
        );
        Ok(table)
    }

    /// Create an empty table and write it to `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, fields: Vec<DbfField>) -> Result<Self> {
        let mut table = Self {
            path: path.as_ref().to_path_buf(),
            fields: Vec::new(),
            records: Vec::new(),
            deleted: Vec::new(),
            last_update: Local::now().date_naive(),
            dirty: true,
        };
        for field in fields {
            table.add_field(field)?;
        }
        table.write()?;
        Ok(table)
    }

    /// Decode a complete `.dbf` image.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 {
            return Err(invalid_dbf("file is shorter than the table header"));
        }
        let num_records = LittleEndian::read_u32(&bytes[4..8]) as usize;
        let header_len = LittleEndian::read_u16(&bytes[8..10]) as usize;
        let record_len = LittleEndian::read_u16(&bytes[10..12]) as usize;
        let last_update =
            NaiveDate::from_ymd_opt(1900 + bytes[1] as i32, bytes[2] as u32, bytes[3] as u32).unwrap_or_default();
        if header_len > bytes.len() {
            return Err(invalid_dbf(format!("header length {} exceeds file size", header_len)));
        }

        let mut fields = Vec::new();
        let mut pos = 32;
        while pos + DESCRIPTOR_LEN <= header_len && bytes[pos] != HEADER_TERMINATOR {
            fields.push(DbfField::from_descriptor(&bytes[pos..pos + DESCRIPTOR_LEN])?);
            pos += DESCRIPTOR_LEN;
        }
        let needed = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();
        if record_len < needed {
            return Err(invalid_dbf(format!(
                "record length {} is shorter than its {} field bytes",
                record_len, needed
            )));
        }

        let end = num_records
            .checked_mul(record_len)
            .and_then(|body| body.checked_add(header_len));
        if !matches!(end, Some(end) if end <= bytes.len()) {
            return Err(invalid_dbf(format!(
                "{} records of {} bytes do not fit a {} byte file",
                num_records,
                record_len,
                bytes.len()
            )));
        }

        let mut records = Vec::with_capacity(num_records);
        let mut deleted = Vec::with_capacity(num_records);
        for i in 0..num_records {
            let start = header_len + i * record_len;
            let raw = bytes
                .get(start..start + record_len)
                .ok_or_else(|| invalid_dbf(format!("record {} is truncated", i)))?;
            deleted.push(raw[0] == DELETED);
            let mut offset = 1;
            let mut values = Vec::with_capacity(fields.len());
            for field in &fields {
                let len = field.length as usize;
                values.push(field.decode(&raw[offset..offset + len])?);
                offset += len;
            }
            records.push(values);
        }

        Ok(Self {
            path: PathBuf::new(),
            fields,
            records,
            deleted,
            last_update,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fields(&self) -> &[DbfField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&DbfField> {
        self.fields.get(index)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Date of last update stored in the header.
    pub fn last_update(&self) -> NaiveDate {
        self.last_update
    }

    /// Whether record `index` carries the deleted flag. Flagged records keep
    /// their position so the table stays aligned with its shapes.
    pub fn is_deleted(&self, index: usize) -> bool {
        self.deleted.get(index).copied().unwrap_or(false)
    }

    pub fn record(&self, index: usize) -> Result<&[AttributeValue]> {
        self.records
            .get(index)
            .map(Vec::as_slice)
            .ok_or(FormatError::IndexOutOfRange {
                index,
                len: self.records.len(),
            })
    }

    pub fn records(&self) -> impl Iterator<Item = &[AttributeValue]> {
        self.records.iter().map(Vec::as_slice)
    }

    /// Value of field `name` in record `index`.
    pub fn value(&self, index: usize, name: &str) -> Result<&AttributeValue> {
        let field = self.field_index(name).ok_or_else(|| FormatError::FieldNotFound {
            field: name.to_string(),
        })?;
        Ok(&self.record(index)?[field])
    }

    fn check_record(&self, values: &[AttributeValue]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(FormatError::FieldCountMismatch {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        for (field, value) in self.fields.iter().zip(values) {
            if !field.accepts(value) {
                return Err(field.mismatch(value));
            }
        }
        Ok(())
    }

    pub fn add_record(&mut self, values: Vec<AttributeValue>) -> Result<()> {
        let at = self.records.len();
        self.insert_record(at, values)
    }

    /// Insert before `index`; `index == num_records()` appends.
    pub fn insert_record(&mut self, index: usize, values: Vec<AttributeValue>) -> Result<()> {
        if index > self.records.len() {
            return Err(FormatError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        self.check_record(&values)?;
        self.records.insert(index, values);
        self.deleted.insert(index, false);
        self.dirty = true;
        Ok(())
    }

    /// Replace record `index`.
    pub fn change_record(&mut self, index: usize, values: Vec<AttributeValue>) -> Result<()> {
        self.check_record(&values)?;
        let len = self.records.len();
        let slot = self
            .records
            .get_mut(index)
            .ok_or(FormatError::IndexOutOfRange { index, len })?;
        *slot = values;
        self.deleted[index] = false;
        self.dirty = true;
        Ok(())
    }

    /// Remove record `index`, shifting later records up.
    pub fn delete_record(&mut self, index: usize) -> Result<Vec<AttributeValue>> {
        if index >= self.records.len() {
            return Err(FormatError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        self.deleted.remove(index);
        self.dirty = true;
        Ok(self.records.remove(index))
    }

    pub fn add_field(&mut self, field: DbfField) -> Result<()> {
        let at = self.fields.len();
        self.insert_field(at, field)
    }

    /// Insert a field before `index`; existing records get null for it.
    pub fn insert_field(&mut self, index: usize, field: DbfField) -> Result<()> {
        if index > self.fields.len() {
            return Err(FormatError::IndexOutOfRange {
                index,
                len: self.fields.len(),
            });
        }
        if self.field_index(&field.name).is_some() {
            return Err(invalid_dbf(format!("field {} already exists", field.name)));
        }
        self.fields.insert(index, field);
        for record in &mut self.records {
            record.insert(index, AttributeValue::Null);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn delete_field(&mut self, index: usize) -> Result<DbfField> {
        if index >= self.fields.len() {
            return Err(FormatError::IndexOutOfRange {
                index,
                len: self.fields.len(),
            });
        }
        for record in &mut self.records {
            record.remove(index);
        }
        self.dirty = true;
        Ok(self.fields.remove(index))
    }

    /// Delete the first field called `name`.
    pub fn delete_field_by_name(&mut self, name: &str) -> Result<DbfField> {
        let index = self.field_index(name).ok_or_else(|| FormatError::FieldNotFound {
            field: name.to_string(),
        })?;
        self.delete_field(index)
    }

    pub fn record_len(&self) -> usize {
        1 + self.fields.iter().map(|f| f.length as usize).sum::<usize>()
    }

    pub fn header_len(&self) -> usize {
        32 + DESCRIPTOR_LEN * self.fields.len() + 1
    }

    /// Encode the complete table.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let record_len = self.record_len();
        let header_len = self.header_len();
        if header_len > u16::MAX as usize || record_len > u16::MAX as usize {
            return Err(invalid_dbf("too many fields for a dBASE header"));
        }

        let mut out = Vec::with_capacity(header_len + record_len * self.records.len() + 1);
        let date = self.last_update;
        out.extend_from_slice(&[
            VERSION,
            (date.year() - 1900).clamp(0, 255) as u8,
            date.month() as u8,
            date.day() as u8,
        ]);
        let mut buf = [0u8; 8];
        LittleEndian::write_u32(&mut buf[0..4], self.records.len() as u32);
        LittleEndian::write_u16(&mut buf[4..6], header_len as u16);
        LittleEndian::write_u16(&mut buf[6..8], record_len as u16);
        out.extend_from_slice(&buf);
        out.resize(32, 0);

        for field in &self.fields {
            out.extend_from_slice(&field.to_descriptor());
        }
        out.push(HEADER_TERMINATOR);

        for (values, &deleted) in self.records.iter().zip(&self.deleted) {
            out.push(if deleted { DELETED } else { LIVE });
            for (field, value) in self.fields.iter().zip(values) {
                field.encode(value, &mut out)?;
            }
        }
        out.push(END_OF_DATA);
        Ok(out)
    }

    /// Write the table to its path.
    pub fn write(&mut self) -> Result<()> {
        self.last_update = Local::now().date_naive();
        let bytes = self.to_bytes()?;
        let tmp = self.path.with_extension("dbf.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        info!(
            path = %self.path.display(),
            fields = self.fields.len(),
            records = self.records.len(),
            "wrote attribute table"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttributeTable {
        let mut t = AttributeTable {
            path: PathBuf::new(),
            fields: Vec::new(),
            records: Vec::new(),
            deleted: Vec::new(),
            last_update: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            dirty: false,
        };
        t.add_field(DbfField::numeric("ID", 5, 0).unwrap()).unwrap();
        t.add_field(DbfField::character("NAME", 8).unwrap()).unwrap();
        t.add_record(vec![AttributeValue::Int(1), AttributeValue::String("a".into())]).unwrap();
        t.add_record(vec![AttributeValue::Int(2), AttributeValue::String("b".into())]).unwrap();
        t
    }

    #[test]
    fn test_record_count_past_end_of_file() {
        let mut bytes = vec![0u8; 34];
        bytes[0] = VERSION;
        LittleEndian::write_u32(&mut bytes[4..8], u32::MAX);
        LittleEndian::write_u16(&mut bytes[8..10], 33);
        LittleEndian::write_u16(&mut bytes[10..12], 1);
        bytes[32] = HEADER_TERMINATOR;
        assert!(matches!(AttributeTable::parse(&bytes), Err(FormatError::InvalidDbf { .. })));
    }

    #[test]
    fn test_last_update_round_trip() {
        let t = sample();
        let back = AttributeTable::parse(&t.to_bytes().unwrap()).unwrap();
        assert_eq!(back.last_update(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_header_layout() {
        let t = sample();
        let bytes = t.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[1..4], &[124, 1, 2]);
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 2);
        assert_eq!(LittleEndian::read_u16(&bytes[8..10]) as usize, 32 + 2 * 32 + 1);
        assert_eq!(LittleEndian::read_u16(&bytes[10..12]), 1 + 5 + 8);
        assert_eq!(bytes[32 + 64], HEADER_TERMINATOR);
        assert_eq!(*bytes.last().unwrap(), END_OF_DATA);
        assert_eq!(bytes.len(), 97 + 2 * 14 + 1);
    }

    #[test]
    fn test_record_type_checks() {
        let mut t = sample();
        assert!(matches!(
            t.add_record(vec![AttributeValue::Int(3)]),
            Err(FormatError::FieldCountMismatch { expected: 2, actual: 1 })
        ));
        assert!(t
            .add_record(vec![AttributeValue::String("x".into()), AttributeValue::Null])
            .is_err());
        assert_eq!(t.num_records(), 2);
    }

    #[test]
    fn test_record_edits() {
        let mut t = sample();
        t.insert_record(0, vec![AttributeValue::Int(0), AttributeValue::Null]).unwrap();
        assert_eq!(t.record(0).unwrap()[0], AttributeValue::Int(0));
        t.change_record(2, vec![AttributeValue::Int(20), AttributeValue::String("z".into())])
            .unwrap();
        assert_eq!(t.value(2, "ID").unwrap(), &AttributeValue::Int(20));
        let removed = t.delete_record(1).unwrap();
        assert_eq!(removed[0], AttributeValue::Int(1));
        assert_eq!(t.num_records(), 2);
        assert!(t.record(2).is_err());
        assert!(t.change_record(5, vec![AttributeValue::Null, AttributeValue::Null]).is_err());
    }

    #[test]
    fn test_field_edits() {
        let mut t = sample();
        t.insert_field(1, DbfField::logical("OK").unwrap()).unwrap();
        assert_eq!(t.field_names(), vec!["ID", "OK", "NAME"]);
        assert_eq!(t.record(0).unwrap()[1], AttributeValue::Null);
        assert!(t.add_field(DbfField::logical("OK").unwrap()).is_err());

        let removed = t.delete_field_by_name("ID").unwrap();
        assert_eq!(removed.name, "ID");
        assert_eq!(t.field_names(), vec!["OK", "NAME"]);
        assert_eq!(t.record(1).unwrap()[1], AttributeValue::String("b".into()));
        assert!(matches!(t.delete_field_by_name("ID"), Err(FormatError::FieldNotFound { .. })));
    }

    #[test]
    fn test_deleted_flag_keeps_position() {
        let t = sample();
        let mut bytes = t.to_bytes().unwrap();
        let first_record = t.header_len();
        bytes[first_record] = DELETED;
        let parsed = AttributeTable::parse(&bytes).unwrap();
        assert_eq!(parsed.num_records(), 2);
        assert!(parsed.is_deleted(0));
        assert!(!parsed.is_deleted(1));
        assert_eq!(parsed.record(0).unwrap()[0], AttributeValue::Int(1));
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }
}
