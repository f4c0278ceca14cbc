//! Shape geometries and the payload layout of each shape type.
//!
//! A payload is the record content after the 4-byte shape type. All values
//! inside it are little-endian.

use std::fmt;
use std::io;
use std::ops::Range;

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use geo_types::{LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use gridstore_core::vector::BoundingBox;
use serde::Serialize;

use crate::error::{invalid_shapefile, FormatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
    PointZ,
    PolyLineZ,
    PolygonZ,
    MultiPointZ,
    PointM,
    PolyLineM,
    PolygonM,
    MultiPointM,
    MultiPatch,
}

impl ShapeType {
    pub fn code(self) -> i32 {
        match self {
            ShapeType::Null => 0,
            ShapeType::Point => 1,
            ShapeType::PolyLine => 3,
            ShapeType::Polygon => 5,
            ShapeType::MultiPoint => 8,
            ShapeType::PointZ => 11,
            ShapeType::PolyLineZ => 13,
            ShapeType::PolygonZ => 15,
            ShapeType::MultiPointZ => 18,
            ShapeType::PointM => 21,
            ShapeType::PolyLineM => 23,
            ShapeType::PolygonM => 25,
            ShapeType::MultiPointM => 28,
            ShapeType::MultiPatch => 31,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ShapeType::Null,
            1 => ShapeType::Point,
            3 => ShapeType::PolyLine,
            5 => ShapeType::Polygon,
            8 => ShapeType::MultiPoint,
            11 => ShapeType::PointZ,
            13 => ShapeType::PolyLineZ,
            15 => ShapeType::PolygonZ,
            18 => ShapeType::MultiPointZ,
            21 => ShapeType::PointM,
            23 => ShapeType::PolyLineM,
            25 => ShapeType::PolygonM,
            28 => ShapeType::MultiPointM,
            31 => ShapeType::MultiPatch,
            _ => return None,
        })
    }

    /// Whether records of this type carry Z values.
    pub fn has_z(self) -> bool {
        matches!(
            self,
            ShapeType::PointZ
                | ShapeType::PolyLineZ
                | ShapeType::PolygonZ
                | ShapeType::MultiPointZ
                | ShapeType::MultiPatch
        )
    }

    /// Whether M values are mandatory. Z types may carry them optionally.
    pub fn requires_m(self) -> bool {
        matches!(
            self,
            ShapeType::PointM | ShapeType::PolyLineM | ShapeType::PolygonM | ShapeType::MultiPointM
        )
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Surface type of one multipatch part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartType {
    TriangleStrip,
    TriangleFan,
    OuterRing,
    InnerRing,
    FirstRing,
    Ring,
}

impl PartType {
    pub fn code(self) -> i32 {
        match self {
            PartType::TriangleStrip => 0,
            PartType::TriangleFan => 1,
            PartType::OuterRing => 2,
            PartType::InnerRing => 3,
            PartType::FirstRing => 4,
            PartType::Ring => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => PartType::TriangleStrip,
            1 => PartType::TriangleFan,
            2 => PartType::OuterRing,
            3 => PartType::InnerRing,
            4 => PartType::FirstRing,
            5 => PartType::Ring,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapePoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

/// Vertex arrays. `z` and `m`, when present, hold one value per vertex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vertices {
    pub xy: Vec<[f64; 2]>,
    pub z: Option<Vec<f64>>,
    pub m: Option<Vec<f64>>,
}

impl Vertices {
    pub fn new(xy: Vec<[f64; 2]>) -> Self {
        Self { xy, z: None, m: None }
    }

    pub fn with_z(mut self, z: Vec<f64>) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_m(mut self, m: Vec<f64>) -> Self {
        self.m = Some(m);
        self
    }

    pub fn len(&self) -> usize {
        self.xy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xy.is_empty()
    }

    fn check(&self) -> Result<()> {
        for (name, values) in [("Z", &self.z), ("M", &self.m)] {
            if let Some(values) = values {
                if values.len() != self.xy.len() {
                    return Err(invalid_shapefile(format!(
                        "{} {} values for {} vertices",
                        values.len(),
                        name,
                        self.xy.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Vertices split into parts (lines, rings or patches).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parts {
    /// Index of the first vertex of each part.
    pub starts: Vec<usize>,
    pub vertices: Vertices,
}

impl Parts {
    pub fn new(starts: Vec<usize>, vertices: Vertices) -> Self {
        Self { starts, vertices }
    }

    /// A single part holding every vertex.
    pub fn single(vertices: Vertices) -> Self {
        Self::new(vec![0], vertices)
    }

    pub fn num_parts(&self) -> usize {
        self.starts.len()
    }

    /// Vertex index range of part `i`.
    pub fn part(&self, i: usize) -> Range<usize> {
        let len = self.vertices.len();
        let start = self.starts.get(i).copied().unwrap_or(len).min(len);
        let end = self.starts.get(i + 1).copied().unwrap_or(len).min(len);
        start..end.max(start)
    }

    fn line_string(&self, i: usize) -> LineString<f64> {
        self.vertices.xy[self.part(i)]
            .iter()
            .map(|p| (p[0], p[1]))
            .collect::<Vec<_>>()
            .into()
    }

    /// Whether ring `i` winds counter-clockwise, which marks a hole.
    pub fn is_hole(&self, i: usize) -> bool {
        let ring = &self.vertices.xy[self.part(i)];
        let n = ring.len();
        let mut area = 0.0;
        for j in 0..n {
            let a = ring[j];
            let b = ring[(j + 1) % n];
            area += a[0] * b[1] - b[0] * a[1];
        }
        area > 0.0
    }

    fn check(&self) -> Result<()> {
        self.vertices.check()?;
        let len = self.vertices.len();
        if self.starts.windows(2).any(|w| w[0] > w[1]) || self.starts.iter().any(|&s| s > len) {
            return Err(invalid_shapefile("part indices are not ascending vertex indices"));
        }
        Ok(())
    }
}

/// One record's geometry.
///
/// The shape type follows from the variant and from which measure arrays
/// are present: Z values make a Z type, M values alone an M type.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Null,
    Point(ShapePoint),
    MultiPoint(Vertices),
    PolyLine(Parts),
    Polygon(Parts),
    MultiPatch { parts: Parts, part_types: Vec<PartType> },
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(ShapePoint { x, y, z: None, m: None })
    }

    pub fn point_z(x: f64, y: f64, z: f64, m: Option<f64>) -> Self {
        Geometry::Point(ShapePoint { x, y, z: Some(z), m })
    }

    pub fn point_m(x: f64, y: f64, m: f64) -> Self {
        Geometry::Point(ShapePoint { x, y, z: None, m: Some(m) })
    }

    pub fn polyline(starts: Vec<usize>, xy: Vec<[f64; 2]>) -> Self {
        Geometry::PolyLine(Parts::new(starts, Vertices::new(xy)))
    }

    pub fn polygon(starts: Vec<usize>, xy: Vec<[f64; 2]>) -> Self {
        Geometry::Polygon(Parts::new(starts, Vertices::new(xy)))
    }

    pub fn multi_point(xy: Vec<[f64; 2]>) -> Self {
        Geometry::MultiPoint(Vertices::new(xy))
    }

    pub fn shape_type(&self) -> ShapeType {
        let (z, m) = match self {
            Geometry::Null => return ShapeType::Null,
            Geometry::MultiPatch { .. } => return ShapeType::MultiPatch,
            Geometry::Point(p) => (p.z.is_some(), p.m.is_some()),
            Geometry::MultiPoint(v) => (v.z.is_some(), v.m.is_some()),
            Geometry::PolyLine(p) | Geometry::Polygon(p) => {
                (p.vertices.z.is_some(), p.vertices.m.is_some())
            }
        };
        match (self, z, m) {
            (Geometry::Point(_), true, _) => ShapeType::PointZ,
            (Geometry::Point(_), false, true) => ShapeType::PointM,
            (Geometry::Point(_), false, false) => ShapeType::Point,
            (Geometry::MultiPoint(_), true, _) => ShapeType::MultiPointZ,
            (Geometry::MultiPoint(_), false, true) => ShapeType::MultiPointM,
            (Geometry::MultiPoint(_), false, false) => ShapeType::MultiPoint,
            (Geometry::PolyLine(_), true, _) => ShapeType::PolyLineZ,
            (Geometry::PolyLine(_), false, true) => ShapeType::PolyLineM,
            (Geometry::PolyLine(_), false, false) => ShapeType::PolyLine,
            (_, true, _) => ShapeType::PolygonZ,
            (_, false, true) => ShapeType::PolygonM,
            _ => ShapeType::Polygon,
        }
    }

    fn vertices(&self) -> Option<&Vertices> {
        match self {
            Geometry::Null | Geometry::Point(_) => None,
            Geometry::MultiPoint(v) => Some(v),
            Geometry::PolyLine(p) | Geometry::Polygon(p) => Some(&p.vertices),
            Geometry::MultiPatch { parts, .. } => Some(&parts.vertices),
        }
    }

    pub fn num_points(&self) -> usize {
        match self {
            Geometry::Null => 0,
            Geometry::Point(_) => 1,
            _ => self.vertices().map_or(0, Vertices::len),
        }
    }

    /// Planar extent; empty for null shapes.
    pub fn bbox(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        match self {
            Geometry::Null => {}
            Geometry::Point(p) => bbox.expand_to_point(p.x, p.y),
            _ => {
                for p in self.vertices().map_or(&[][..], |v| &v.xy[..]) {
                    bbox.expand_to_point(p[0], p[1]);
                }
            }
        }
        bbox
    }

    pub fn z_range(&self) -> Option<(f64, f64)> {
        match self {
            Geometry::Point(p) => p.z.map(|z| (z, z)),
            _ => self.vertices().and_then(|v| v.z.as_deref()).map(range),
        }
    }

    pub fn m_range(&self) -> Option<(f64, f64)> {
        match self {
            Geometry::Point(p) => p.m.map(|m| (m, m)),
            _ => self.vertices().and_then(|v| v.m.as_deref()).map(range),
        }
    }

    /// Larger of the extent's width and height.
    pub fn max_extent(&self) -> f64 {
        let bbox = self.bbox();
        if bbox.is_empty() {
            0.0
        } else {
            bbox.width().max(bbox.height())
        }
    }

    /// Whether the shape touches `view` and, for shapes with extent, is
    /// larger than `min_size` map units.
    pub fn is_mappable(&self, view: &BoundingBox, min_size: f64) -> bool {
        match self {
            Geometry::Null => false,
            Geometry::Point(p) => view.contains_point(p.x, p.y),
            Geometry::MultiPoint(_) => view.overlaps(&self.bbox()),
            _ => view.overlaps(&self.bbox()) && self.max_extent() > min_size,
        }
    }

    /// Payload size in bytes.
    pub fn encoded_len(&self) -> usize {
        let measures = |v: &Vertices| {
            let n = v.len();
            v.z.as_ref().map_or(0, |_| 16 + 8 * n) + v.m.as_ref().map_or(0, |_| 16 + 8 * n)
        };
        match self {
            Geometry::Null => 0,
            Geometry::Point(p) => 16 + p.z.map_or(0, |_| 8) + p.m.map_or(0, |_| 8),
            Geometry::MultiPoint(v) => 32 + 4 + 16 * v.len() + measures(v),
            Geometry::PolyLine(p) | Geometry::Polygon(p) => {
                32 + 8 + 4 * p.num_parts() + 16 * p.vertices.len() + measures(&p.vertices)
            }
            Geometry::MultiPatch { parts, .. } => {
                // multipatches always carry Z
                let n = parts.vertices.len();
                32 + 8 + 8 * parts.num_parts() + 16 * n + 16 + 8 * n + parts.vertices.m.as_ref().map_or(0, |_| 16 + 8 * n)
            }
        }
    }

    /// Decode a payload declared as `shape_type`.
    pub fn decode(shape_type: ShapeType, payload: &[u8]) -> Result<Self> {
        let mut r = payload;
        let geometry = match shape_type {
            ShapeType::Null => Geometry::Null,
            ShapeType::Point | ShapeType::PointM | ShapeType::PointZ => {
                let x = r.read_f64::<LE>().map_err(truncated)?;
                let y = r.read_f64::<LE>().map_err(truncated)?;
                let z = if shape_type.has_z() {
                    Some(r.read_f64::<LE>().map_err(truncated)?)
                } else {
                    None
                };
                let m = if shape_type.requires_m() || (shape_type.has_z() && r.len() >= 8) {
                    Some(r.read_f64::<LE>().map_err(truncated)?)
                } else {
                    None
                };
                Geometry::Point(ShapePoint { x, y, z, m })
            }
            ShapeType::MultiPoint | ShapeType::MultiPointM | ShapeType::MultiPointZ => {
                skip(&mut r, 32)?;
                let n = read_count(&mut r)?;
                let xy = read_xy(&mut r, n)?;
                let (z, m) = read_measures(&mut r, shape_type, n)?;
                Geometry::MultiPoint(Vertices { xy, z, m })
            }
            ShapeType::PolyLine
            | ShapeType::PolyLineM
            | ShapeType::PolyLineZ
            | ShapeType::Polygon
            | ShapeType::PolygonM
            | ShapeType::PolygonZ
            | ShapeType::MultiPatch => {
                skip(&mut r, 32)?;
                let num_parts = read_count(&mut r)?;
                let n = read_count(&mut r)?;
                if r.len() < num_parts * 4 {
                    return Err(truncated_payload());
                }
                let starts = (0..num_parts)
                    .map(|_| r.read_i32::<LE>().map(|s| s.max(0) as usize).map_err(truncated))
                    .collect::<Result<Vec<_>>>()?;
                let part_types = if shape_type == ShapeType::MultiPatch {
                    if r.len() < num_parts * 4 {
                        return Err(truncated_payload());
                    }
                    (0..num_parts)
                        .map(|_| {
                            let code = r.read_i32::<LE>().map_err(truncated)?;
                            PartType::from_code(code)
                                .ok_or_else(|| invalid_shapefile(format!("unknown multipatch part type {}", code)))
                        })
                        .collect::<Result<Vec<_>>>()?
                } else {
                    Vec::new()
                };
                let xy = read_xy(&mut r, n)?;
                let (z, m) = read_measures(&mut r, shape_type, n)?;
                let parts = Parts::new(starts, Vertices { xy, z, m });
                match shape_type {
                    ShapeType::PolyLine | ShapeType::PolyLineM | ShapeType::PolyLineZ => Geometry::PolyLine(parts),
                    ShapeType::MultiPatch => Geometry::MultiPatch { parts, part_types },
                    _ => Geometry::Polygon(parts),
                }
            }
        };
        Ok(geometry)
    }

    /// Encode the payload (without the leading shape type).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        match self {
            Geometry::Null => {}
            Geometry::Point(p) => {
                out.write_f64::<LE>(p.x)?;
                out.write_f64::<LE>(p.y)?;
                if let Some(z) = p.z {
                    out.write_f64::<LE>(z)?;
                }
                if let Some(m) = p.m {
                    out.write_f64::<LE>(m)?;
                }
            }
            Geometry::MultiPoint(v) => {
                v.check()?;
                write_bbox(&mut out, &self.bbox())?;
                out.write_i32::<LE>(v.len() as i32)?;
                write_xy(&mut out, &v.xy)?;
                write_measures(&mut out, v)?;
            }
            Geometry::PolyLine(p) | Geometry::Polygon(p) => {
                p.check()?;
                write_bbox(&mut out, &self.bbox())?;
                out.write_i32::<LE>(p.num_parts() as i32)?;
                out.write_i32::<LE>(p.vertices.len() as i32)?;
                for &s in &p.starts {
                    out.write_i32::<LE>(s as i32)?;
                }
                write_xy(&mut out, &p.vertices.xy)?;
                write_measures(&mut out, &p.vertices)?;
            }
            Geometry::MultiPatch { parts, part_types } => {
                parts.check()?;
                if part_types.len() != parts.num_parts() {
                    return Err(invalid_shapefile(format!(
                        "{} part types for {} parts",
                        part_types.len(),
                        parts.num_parts()
                    )));
                }
                write_bbox(&mut out, &self.bbox())?;
                out.write_i32::<LE>(parts.num_parts() as i32)?;
                out.write_i32::<LE>(parts.vertices.len() as i32)?;
                for &s in &parts.starts {
                    out.write_i32::<LE>(s as i32)?;
                }
                for t in part_types {
                    out.write_i32::<LE>(t.code())?;
                }
                write_xy(&mut out, &parts.vertices.xy)?;
                let zeros;
                let z = match &parts.vertices.z {
                    Some(z) => z,
                    None => {
                        zeros = vec![0.0; parts.vertices.len()];
                        &zeros
                    }
                };
                write_values(&mut out, z)?;
                if let Some(m) = &parts.vertices.m {
                    write_values(&mut out, m)?;
                }
            }
        }
        Ok(out)
    }

    /// Convert to a `geo_types` geometry. Null shapes have none.
    ///
    /// Polygon rings are grouped so each clockwise ring starts a polygon and
    /// the counter-clockwise rings after it become its holes.
    pub fn to_geo(&self) -> Option<geo_types::Geometry<f64>> {
        let geometry: geo_types::Geometry<f64> = match self {
            Geometry::Null => return None,
            Geometry::Point(p) => Point::new(p.x, p.y).into(),
            Geometry::MultiPoint(v) => {
                MultiPoint(v.xy.iter().map(|p| Point::new(p[0], p[1])).collect()).into()
            }
            Geometry::PolyLine(parts) => {
                let mut lines: Vec<_> = (0..parts.num_parts()).map(|i| parts.line_string(i)).collect();
                if lines.len() == 1 {
                    lines.remove(0).into()
                } else {
                    MultiLineString(lines).into()
                }
            }
            Geometry::Polygon(parts) => {
                let rings = (0..parts.num_parts()).map(|i| (parts.line_string(i), parts.is_hole(i)));
                let mut polygons = group_rings(rings);
                if polygons.len() == 1 {
                    polygons.remove(0).into()
                } else {
                    MultiPolygon(polygons).into()
                }
            }
            Geometry::MultiPatch { parts, part_types } => {
                let mut rings = Vec::new();
                for (i, part_type) in part_types.iter().enumerate() {
                    let xy = &parts.vertices.xy[parts.part(i)];
                    match part_type {
                        PartType::TriangleStrip => {
                            for t in xy.windows(3) {
                                rings.push((triangle(t[0], t[1], t[2]), false));
                            }
                        }
                        PartType::TriangleFan => {
                            for j in 1..xy.len().saturating_sub(1) {
                                rings.push((triangle(xy[0], xy[j], xy[j + 1]), false));
                            }
                        }
                        PartType::OuterRing | PartType::FirstRing => rings.push((parts.line_string(i), false)),
                        PartType::InnerRing | PartType::Ring => rings.push((parts.line_string(i), true)),
                    }
                }
                MultiPolygon(group_rings(rings)).into()
            }
        };
        Some(geometry)
    }
}

fn group_rings(rings: impl IntoIterator<Item = (LineString<f64>, bool)>) -> Vec<Polygon<f64>> {
    let mut groups: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for (ring, hole) in rings {
        match groups.last_mut() {
            Some((_, holes)) if hole => holes.push(ring),
            _ => groups.push((ring, Vec::new())),
        }
    }
    groups
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect()
}

fn triangle(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> LineString<f64> {
    vec![(a[0], a[1]), (b[0], b[1]), (c[0], c[1]), (a[0], a[1])].into()
}

fn range(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn truncated(_: io::Error) -> FormatError {
    truncated_payload()
}

fn truncated_payload() -> FormatError {
    invalid_shapefile("record payload is truncated")
}

fn skip(r: &mut &[u8], n: usize) -> Result<()> {
    if r.len() < n {
        return Err(truncated_payload());
    }
    *r = &r[n..];
    Ok(())
}

fn read_count(r: &mut &[u8]) -> Result<usize> {
    let n = r.read_i32::<LE>().map_err(truncated)?;
    usize::try_from(n).map_err(|_| invalid_shapefile(format!("negative count {}", n)))
}

fn read_xy(r: &mut &[u8], n: usize) -> Result<Vec<[f64; 2]>> {
    if r.len() / 16 < n {
        return Err(truncated_payload());
    }
    let mut xy = Vec::with_capacity(n);
    for _ in 0..n {
        let x = r.read_f64::<LE>().map_err(truncated)?;
        let y = r.read_f64::<LE>().map_err(truncated)?;
        xy.push([x, y]);
    }
    Ok(xy)
}

/// A range pair followed by `n` values.
fn read_values(r: &mut &[u8], n: usize) -> Result<Vec<f64>> {
    skip(r, 16)?;
    if r.len() / 8 < n {
        return Err(truncated_payload());
    }
    (0..n).map(|_| r.read_f64::<LE>().map_err(truncated)).collect()
}

type Measures = (Option<Vec<f64>>, Option<Vec<f64>>);

fn read_measures(r: &mut &[u8], shape_type: ShapeType, n: usize) -> Result<Measures> {
    let z = if shape_type.has_z() {
        Some(read_values(r, n)?)
    } else {
        None
    };
    let m = if shape_type.requires_m() || (shape_type.has_z() && r.len() >= 16 + 8 * n) {
        Some(read_values(r, n)?)
    } else {
        None
    };
    Ok((z, m))
}

fn write_bbox(out: &mut Vec<u8>, bbox: &BoundingBox) -> io::Result<()> {
    let b = if bbox.is_empty() {
        BoundingBox::new(0.0, 0.0, 0.0, 0.0)
    } else {
        *bbox
    };
    for v in [b.min_x, b.min_y, b.max_x, b.max_y] {
        out.write_f64::<LE>(v)?;
    }
    Ok(())
}

fn write_xy(out: &mut Vec<u8>, xy: &[[f64; 2]]) -> io::Result<()> {
    for p in xy {
        out.write_f64::<LE>(p[0])?;
        out.write_f64::<LE>(p[1])?;
    }
    Ok(())
}

fn write_values(out: &mut Vec<u8>, values: &[f64]) -> io::Result<()> {
    let (lo, hi) = range(values);
    out.write_f64::<LE>(lo)?;
    out.write_f64::<LE>(hi)?;
    for &v in values {
        out.write_f64::<LE>(v)?;
    }
    Ok(())
}

fn write_measures(out: &mut Vec<u8>, v: &Vertices) -> io::Result<()> {
    if let Some(z) = &v.z {
        write_values(out, z)?;
    }
    if let Some(m) = &v.m {
        write_values(out, m)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    fn square(x0: f64, y0: f64, size: f64, clockwise: bool) -> Vec<[f64; 2]> {
        let mut ring = vec![
            [x0, y0],
            [x0, y0 + size],
            [x0 + size, y0 + size],
            [x0 + size, y0],
            [x0, y0],
        ];
        if !clockwise {
            ring.reverse();
        }
        ring
    }

    #[test]
    fn test_shape_type_codes() {
        for code in [0, 1, 3, 5, 8, 11, 13, 15, 18, 21, 23, 25, 28, 31] {
            let t = ShapeType::from_code(code).unwrap();
            assert_eq!(t.code(), code);
        }
        assert_eq!(ShapeType::from_code(2), None);
        assert!(ShapeType::MultiPatch.has_z());
        assert!(!ShapeType::PolyLineZ.requires_m());
    }

    #[test]
    fn test_shape_type_follows_measures() {
        assert_eq!(Geometry::point(1.0, 2.0).shape_type(), ShapeType::Point);
        assert_eq!(Geometry::point_z(1.0, 2.0, 3.0, None).shape_type(), ShapeType::PointZ);
        assert_eq!(Geometry::point_m(1.0, 2.0, 3.0).shape_type(), ShapeType::PointM);
        let line = Parts::single(Vertices::new(vec![[0.0, 0.0], [1.0, 1.0]]).with_m(vec![0.0, 1.0]));
        assert_eq!(Geometry::PolyLine(line).shape_type(), ShapeType::PolyLineM);
    }

    #[test]
    fn test_polygon_payload_layout() {
        let g = Geometry::polygon(vec![0], square(0.0, 0.0, 2.0, true));
        let bytes = g.encode().unwrap();
        assert_eq!(bytes.len(), g.encoded_len());
        assert_eq!(bytes.len(), 32 + 8 + 4 + 5 * 16);
        // bbox then counts
        assert_eq!(LE::read_f64(&bytes[16..24]), 2.0);
        assert_eq!(LE::read_i32(&bytes[32..36]), 1);
        assert_eq!(LE::read_i32(&bytes[36..40]), 5);
        let back = Geometry::decode(ShapeType::Polygon, &bytes).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_point_z_without_m() {
        let g = Geometry::point_z(1.0, 2.0, 3.0, None);
        let bytes = g.encode().unwrap();
        assert_eq!(bytes.len(), 24);
        let back = Geometry::decode(ShapeType::PointZ, &bytes).unwrap();
        assert_eq!(back, g);

        let with_m = Geometry::point_z(1.0, 2.0, 3.0, Some(4.0));
        let back = Geometry::decode(ShapeType::PointZ, &with_m.encode().unwrap()).unwrap();
        assert_eq!(back, with_m);
    }

    #[test]
    fn test_polyline_z_keeps_measures() {
        let v = Vertices::new(vec![[0.0, 0.0], [3.0, 4.0], [6.0, 0.0]])
            .with_z(vec![10.0, 20.0, 15.0])
            .with_m(vec![0.0, 5.0, 10.0]);
        let g = Geometry::PolyLine(Parts::single(v));
        assert_eq!(g.z_range(), Some((10.0, 20.0)));
        let back = Geometry::decode(ShapeType::PolyLineZ, &g.encode().unwrap()).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_truncated_payload() {
        let g = Geometry::multi_point(vec![[0.0, 0.0], [1.0, 1.0]]);
        let bytes = g.encode().unwrap();
        let err = Geometry::decode(ShapeType::MultiPoint, &bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, FormatError::InvalidShapefile { .. }));
    }

    #[test]
    fn test_mismatched_measure_length_fails_encode() {
        let v = Vertices::new(vec![[0.0, 0.0], [1.0, 1.0]]).with_z(vec![1.0]);
        assert!(Geometry::MultiPoint(v).encode().is_err());
    }

    #[test]
    fn test_hole_detection_and_grouping() {
        let mut xy = square(0.0, 0.0, 10.0, true);
        xy.extend(square(2.0, 2.0, 2.0, false));
        xy.extend(square(20.0, 20.0, 5.0, true));
        let parts = Parts::new(vec![0, 5, 10], Vertices::new(xy));
        assert!(!parts.is_hole(0));
        assert!(parts.is_hole(1));
        assert!(!parts.is_hole(2));

        match Geometry::Polygon(parts).to_geo() {
            Some(geo_types::Geometry::MultiPolygon(mp)) => {
                assert_eq!(mp.0.len(), 2);
                assert_eq!(mp.0[0].interiors().len(), 1);
                assert!(mp.0[1].interiors().is_empty());
            }
            other => panic!("expected a multipolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_single_part_polyline_to_line_string() {
        let g = Geometry::polyline(vec![0], vec![[0.0, 0.0], [1.0, 1.0]]);
        assert!(matches!(g.to_geo(), Some(geo_types::Geometry::LineString(_))));
        assert!(Geometry::Null.to_geo().is_none());
    }

    #[test]
    fn test_multipatch_strip_triangles() {
        let parts = Parts::single(Vertices::new(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]));
        let g = Geometry::MultiPatch { parts, part_types: vec![PartType::TriangleStrip] };
        assert_eq!(g.shape_type(), ShapeType::MultiPatch);
        let bytes = g.encode().unwrap();
        assert_eq!(bytes.len(), g.encoded_len());
        match g.to_geo() {
            Some(geo_types::Geometry::MultiPolygon(mp)) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected triangles, got {:?}", other),
        }
        // Z is written as zeros when absent
        match Geometry::decode(ShapeType::MultiPatch, &bytes).unwrap() {
            Geometry::MultiPatch { parts, .. } => assert_eq!(parts.vertices.z, Some(vec![0.0; 4])),
            other => panic!("expected a multipatch, got {:?}", other),
        }
    }

    #[test]
    fn test_mappable() {
        let view = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(Geometry::point(5.0, 5.0).is_mappable(&view, 1.0));
        assert!(!Geometry::point(15.0, 5.0).is_mappable(&view, 1.0));
        let small = Geometry::polyline(vec![0], vec![[1.0, 1.0], [1.5, 1.5]]);
        assert!(small.is_mappable(&view, 0.1));
        assert!(!small.is_mappable(&view, 1.0));
        assert!(!Geometry::Null.is_mappable(&view, 0.0));
    }
}
