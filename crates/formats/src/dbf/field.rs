//! DBF field descriptors and per-field value encoding.

use chrono::NaiveDate;
use gridstore_core::vector::AttributeValue;
use serde::Serialize;

use crate::error::{invalid_dbf, FormatError, Result};

/// Size of one field descriptor in the table header.
pub const DESCRIPTOR_LEN: usize = 32;
/// Longest field name the descriptor can hold.
pub const MAX_NAME_LEN: usize = 10;

const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Character,
    Date,
    Float,
    Numeric,
    Logical,
    Memo,
}

impl FieldType {
    pub fn code(self) -> u8 {
        match self {
            FieldType::Character => b'C',
            FieldType::Date => b'D',
            FieldType::Float => b'F',
            FieldType::Numeric => b'N',
            FieldType::Logical => b'L',
            FieldType::Memo => b'M',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'C' => Some(FieldType::Character),
            b'D' => Some(FieldType::Date),
            b'F' => Some(FieldType::Float),
            b'N' => Some(FieldType::Numeric),
            b'L' => Some(FieldType::Logical),
            b'M' => Some(FieldType::Memo),
            _ => None,
        }
    }
}

/// One column of an attribute table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbfField {
    pub name: String,
    pub field_type: FieldType,
    pub length: u8,
    pub decimals: u8,
}

impl DbfField {
    /// Validates the name and the length rules of fixed-width types.
    pub fn new(name: impl Into<String>, field_type: FieldType, length: u8, decimals: u8) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN || !name.is_ascii() {
            return Err(invalid_dbf(format!("field name {:?} must be 1-{} ASCII characters", name, MAX_NAME_LEN)));
        }
        let length = match field_type {
            FieldType::Date => 8,
            FieldType::Logical => 1,
            FieldType::Memo => 10,
            _ => length,
        };
        if length == 0 {
            return Err(invalid_dbf(format!("field {} has zero length", name)));
        }
        let decimals = match field_type {
            FieldType::Float | FieldType::Numeric => decimals,
            _ => 0,
        };
        if decimals > 0 && decimals as usize + 2 > length as usize {
            return Err(invalid_dbf(format!("field {} has {} decimals in width {}", name, decimals, length)));
        }
        Ok(Self {
            name,
            field_type,
            length,
            decimals,
        })
    }

    pub fn character(name: impl Into<String>, length: u8) -> Result<Self> {
        Self::new(name, FieldType::Character, length, 0)
    }

    pub fn numeric(name: impl Into<String>, length: u8, decimals: u8) -> Result<Self> {
        Self::new(name, FieldType::Numeric, length, decimals)
    }

    pub fn float(name: impl Into<String>, length: u8, decimals: u8) -> Result<Self> {
        Self::new(name, FieldType::Float, length, decimals)
    }

    pub fn logical(name: impl Into<String>) -> Result<Self> {
        Self::new(name, FieldType::Logical, 1, 0)
    }

    pub fn date(name: impl Into<String>) -> Result<Self> {
        Self::new(name, FieldType::Date, 8, 0)
    }

    /// Parse a 32-byte descriptor.
    pub fn from_descriptor(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DESCRIPTOR_LEN {
            return Err(invalid_dbf("truncated field descriptor"));
        }
        let name_end = bytes[..11].iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&bytes[..name_end]).trim().to_string();
        let field_type = FieldType::from_code(bytes[11])
            .ok_or_else(|| invalid_dbf(format!("field {} has unknown type {:?}", name, bytes[11] as char)))?;
        Ok(Self {
            name,
            field_type,
            length: bytes[16],
            decimals: bytes[17],
        })
    }

    pub fn to_descriptor(&self) -> [u8; DESCRIPTOR_LEN] {
        let mut d = [0u8; DESCRIPTOR_LEN];
        let name = self.name.as_bytes();
        let n = name.len().min(MAX_NAME_LEN);
        d[..n].copy_from_slice(&name[..n]);
        d[11] = self.field_type.code();
        d[16] = self.length;
        d[17] = self.decimals;
        d
    }

    /// Whether `value` may be stored in this field. Null fits everywhere.
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match (self.field_type, value) {
            (_, AttributeValue::Null) => true,
            (FieldType::Character, AttributeValue::String(_)) => true,
            (FieldType::Date, AttributeValue::Date(_)) => true,
            (FieldType::Float | FieldType::Numeric, AttributeValue::Int(_) | AttributeValue::Float(_)) => true,
            (FieldType::Logical, AttributeValue::Bool(_)) => true,
            (FieldType::Memo, _) => true,
            _ => false,
        }
    }

    /// Decode this field's slice of a record.
    pub fn decode(&self, raw: &[u8]) -> Result<AttributeValue> {
        let text = String::from_utf8_lossy(raw);
        let value = match self.field_type {
            FieldType::Character => AttributeValue::String(text.trim_end_matches([' ', '\0']).to_string()),
            FieldType::Date => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .map(AttributeValue::Date)
                .unwrap_or(AttributeValue::Null),
            FieldType::Float | FieldType::Numeric => {
                let t = text.trim();
                if t.is_empty() || t.contains('?') {
                    AttributeValue::Null
                } else if self.field_type == FieldType::Numeric && self.decimals == 0 {
                    match t.parse::<i64>() {
                        Ok(i) => AttributeValue::Int(i),
                        Err(_) => AttributeValue::Float(self.parse_float(t)?),
                    }
                } else {
                    AttributeValue::Float(self.parse_float(t)?)
                }
            }
            FieldType::Logical => {
                AttributeValue::Bool(matches!(raw.first(), Some(b'Y' | b'y' | b'T' | b't')))
            }
            // memo blocks live in a separate .dbt file
            FieldType::Memo => AttributeValue::Null,
        };
        Ok(value)
    }

    fn parse_float(&self, t: &str) -> Result<f64> {
        t.parse::<f64>()
            .map_err(|_| invalid_dbf(format!("field {}: {:?} is not a number", self.name, t)))
    }

    /// Append exactly `length` bytes encoding `value`.
    pub fn encode(&self, value: &AttributeValue, out: &mut Vec<u8>) -> Result<()> {
        let width = self.length as usize;
        let text = match (self.field_type, value) {
            (FieldType::Character, v) => {
                let s = match v {
                    AttributeValue::Null => String::new(),
                    other => other.to_string(),
                };
                let mut bytes = s.into_bytes();
                bytes.resize(width, b' ');
                out.extend_from_slice(&bytes);
                return Ok(());
            }
            (FieldType::Date, AttributeValue::Date(d)) => d.format(DATE_FORMAT).to_string(),
            (FieldType::Date, _) => " ".repeat(width),
            (FieldType::Float | FieldType::Numeric, AttributeValue::Null) => format!("{:>w$}", "?", w = width),
            (FieldType::Float | FieldType::Numeric, AttributeValue::Int(i)) if self.decimals == 0 => {
                format!("{:>w$}", i, w = width)
            }
            (FieldType::Float | FieldType::Numeric, v) => {
                let n = v.as_f64().ok_or_else(|| self.mismatch(v))?;
                format!("{:>w$.p$}", n, w = width, p = self.decimals as usize)
            }
            (FieldType::Logical, AttributeValue::Bool(true)) => "T".to_string(),
            (FieldType::Logical, AttributeValue::Bool(false)) => "F".to_string(),
            (FieldType::Logical, _) => "?".to_string(),
            (FieldType::Memo, _) => " ".repeat(width),
        };
        if text.len() > width {
            return Err(FormatError::FieldOverflow {
                field: self.name.clone(),
                value: text.trim().to_string(),
                length: width,
            });
        }
        out.extend_from_slice(format!("{:<w$}", text, w = width).as_bytes());
        Ok(())
    }

    pub(crate) fn mismatch(&self, value: &AttributeValue) -> FormatError {
        invalid_dbf(format!(
            "value {} does not fit {:?} field {}",
            value, self.field_type, self.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(field: &DbfField, value: AttributeValue) -> String {
        let mut out = Vec::new();
        field.encode(&value, &mut out).unwrap();
        assert_eq!(out.len(), field.length as usize);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_descriptor_round_trip() {
        let f = DbfField::numeric("AREA", 12, 3).unwrap();
        let d = f.to_descriptor();
        assert_eq!(&d[..5], b"AREA\0");
        assert_eq!(d[11], b'N');
        assert_eq!(DbfField::from_descriptor(&d).unwrap(), f);
    }

    #[test]
    fn test_field_validation() {
        assert!(DbfField::character("", 5).is_err());
        assert!(DbfField::character("ELEVEN_CHAR", 5).is_err());
        assert!(DbfField::numeric("X", 3, 2).is_err());
        assert_eq!(DbfField::date("WHEN").unwrap().length, 8);
        assert_eq!(DbfField::new("FLAG", FieldType::Logical, 9, 4).unwrap().length, 1);
    }

    #[test]
    fn test_numeric_encoding() {
        let f = DbfField::numeric("VAL", 8, 2).unwrap();
        assert_eq!(encode(&f, AttributeValue::Float(3.14159)), "    3.14");
        assert_eq!(encode(&f, AttributeValue::Int(-7)), "   -7.00");
        assert_eq!(encode(&f, AttributeValue::Null), "       ?");
        let mut out = Vec::new();
        assert!(matches!(
            f.encode(&AttributeValue::Float(123456.0), &mut out),
            Err(FormatError::FieldOverflow { .. })
        ));

        let i = DbfField::numeric("ID", 4, 0).unwrap();
        assert_eq!(encode(&i, AttributeValue::Int(42)), "  42");
    }

    #[test]
    fn test_numeric_decoding() {
        let f = DbfField::numeric("VAL", 8, 2).unwrap();
        assert_eq!(f.decode(b"    3.14").unwrap(), AttributeValue::Float(3.14));
        assert_eq!(f.decode(b"       ?").unwrap(), AttributeValue::Null);
        assert_eq!(f.decode(b"        ").unwrap(), AttributeValue::Null);
        assert!(f.decode(b"   abc  ").is_err());

        let i = DbfField::numeric("ID", 4, 0).unwrap();
        assert_eq!(i.decode(b"  42").unwrap(), AttributeValue::Int(42));
    }

    #[test]
    fn test_character_and_logical() {
        let c = DbfField::character("NAME", 6).unwrap();
        assert_eq!(encode(&c, AttributeValue::String("Lake".into())), "Lake  ");
        assert_eq!(encode(&c, AttributeValue::String("Ontario".into())), "Ontari");
        assert_eq!(c.decode(b"Lake  ").unwrap(), AttributeValue::String("Lake".into()));

        let l = DbfField::logical("OK").unwrap();
        assert_eq!(encode(&l, AttributeValue::Bool(true)), "T");
        assert_eq!(encode(&l, AttributeValue::Null), "?");
        for b in [b"Y", b"y", b"T", b"t"] {
            assert_eq!(l.decode(b).unwrap(), AttributeValue::Bool(true));
        }
        assert_eq!(l.decode(b"N").unwrap(), AttributeValue::Bool(false));
        assert_eq!(l.decode(b"?").unwrap(), AttributeValue::Bool(false));
    }

    #[test]
    fn test_dates() {
        let d = DbfField::date("WHEN").unwrap();
        let value = AttributeValue::Date(NaiveDate::from_ymd_opt(2013, 4, 9).unwrap());
        assert_eq!(encode(&d, value.clone()), "20130409");
        assert_eq!(d.decode(b"20130409").unwrap(), value);
        assert_eq!(encode(&d, AttributeValue::Null), "        ");
        assert_eq!(d.decode(b"        ").unwrap(), AttributeValue::Null);
        assert_eq!(d.decode(b"20131399").unwrap(), AttributeValue::Null);
        assert_eq!(d.decode(b"20230229").unwrap(), AttributeValue::Null);
        assert_eq!(
            d.decode(b"20240229").unwrap(),
            AttributeValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
    }

    #[test]
    fn test_accepts() {
        let n = DbfField::numeric("N", 5, 0).unwrap();
        assert!(n.accepts(&AttributeValue::Int(1)));
        assert!(n.accepts(&AttributeValue::Null));
        assert!(!n.accepts(&AttributeValue::String("1".into())));
    }
}
