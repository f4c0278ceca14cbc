//! Coordinate reference system holder
//!
//! Projection strings are carried, compared and printed, never interpreted.
//! The only parsing done is the `.prj` clean-up needed to get readable WKT
//! and a guess at the linear unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Linear unit guessed from a projection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearUnit {
    Metre,
    Foot,
    Degree,
    Unknown,
}

/// Coordinate reference system as WKT and/or an EPSG code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Crs {
    wkt: Option<String>,
    epsg: Option<u32>,
}

impl Crs {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// Parse the text of an ESRI `.prj` file.
    ///
    /// Round brackets become square ones and line breaks are dropped. An
    /// `AUTHORITY["EPSG","n"]` at the end of the text is picked up as the code.
    pub fn from_prj_text(text: &str) -> Self {
        let wkt: String = text
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .map(|c| match c {
                '(' => '[',
                ')' => ']',
                c => c,
            })
            .collect();
        let wkt = wkt.trim().to_string();
        let epsg = last_authority_code(&wkt);
        Self {
            wkt: if wkt.is_empty() { None } else { Some(wkt) },
            epsg,
        }
    }

    /// Read a `.prj` file. Missing files yield `Ok(None)`.
    pub fn read_prj(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(Self::from_prj_text(&text)))
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.wkt.is_none() && self.epsg.is_none()
    }

    /// Linear unit named in the WKT `UNIT[...]` clause, if recognisable.
    pub fn linear_unit(&self) -> LinearUnit {
        let Some(wkt) = &self.wkt else {
            return match self.epsg {
                Some(4326) => LinearUnit::Degree,
                _ => LinearUnit::Unknown,
            };
        };
        // PROJCS units follow the projection parameters, so the last UNIT wins.
        let lower = wkt.to_ascii_lowercase();
        let Some(pos) = lower.rfind("unit[") else {
            return LinearUnit::Unknown;
        };
        let unit = &lower[pos..];
        if unit.contains("metre") || unit.contains("meter") {
            LinearUnit::Metre
        } else if unit.contains("foot") || unit.contains("feet") {
            LinearUnit::Foot
        } else if unit.contains("degree") {
            LinearUnit::Degree
        } else {
            LinearUnit::Unknown
        }
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Short identifier for display
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt.char_indices().nth(50).map(|(i, _)| i).unwrap_or(wkt.len());
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

fn last_authority_code(wkt: &str) -> Option<u32> {
    let pos = wkt.rfind("AUTHORITY[\"EPSG\",")?;
    let rest = &wkt[pos + "AUTHORITY[\"EPSG\",".len()..];
    let digits: String = rest
        .trim_start_matches('"')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
