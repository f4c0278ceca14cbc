//! Buffered LAS point reader.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use gridstore_core::vector::BoundingBox;
use tracing::{debug, trace};

use crate::error::{invalid_las, Result};
use crate::las::header::{LasHeader, Vlr, MIN_HEADER_SIZE};
use crate::las::point::{min_record_length, PointRecord, Quantization, Rgb};

pub const DEFAULT_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct LasReaderOptions {
    /// Number of points decoded per buffer load.
    pub buffer_size: usize,
}

impl Default for LasReaderOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Reads point records through a window of `buffer_size` decoded points.
///
/// Asking for a point outside the window reloads it starting at that point.
#[derive(Debug)]
pub struct LasReader {
    path: PathBuf,
    file: File,
    header: LasHeader,
    vlrs: Vec<Vlr>,
    quantization: Quantization,
    buffer_size: usize,
    start: Option<usize>,
    points: Vec<PointRecord>,
    colours: Vec<Option<Rgb>>,
    loads: usize,
}

impl LasReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, LasReaderOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: LasReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut head = vec![0u8; MIN_HEADER_SIZE];
        file.read_exact(&mut head)
            .map_err(|_| invalid_las("file is shorter than a LAS header"))?;
        let header = LasHeader::parse(&head)?;

        let min_len = min_record_length(header.point_format)
            .ok_or_else(|| invalid_las(format!("point format {} is not supported", header.point_format)))?;
        if (header.point_record_length as usize) < min_len {
            return Err(invalid_las(format!(
                "record length {} is too short for point format {}",
                header.point_record_length, header.point_format
            )));
        }

        let file_len = file.metadata()?.len();
        if header.offset_to_point_data as u64 > file_len {
            return Err(invalid_las(format!(
                "point data offset {} is past the end of a {} byte file",
                header.offset_to_point_data, file_len
            )));
        }
        let vlr_len = header.offset_to_point_data as usize - header.header_size as usize;
        let mut vlr_bytes = vec![0u8; vlr_len];
        file.seek(SeekFrom::Start(header.header_size as u64))?;
        file.read_exact(&mut vlr_bytes)?;
        let vlrs = Vlr::parse_all(&vlr_bytes, header.num_vlrs as usize)?;

        debug!(
            path = %path.display(),
            version = %header.version(),
            format = header.point_format,
            points = header.num_points,
            vlrs = vlrs.len(),
            "opened LAS file"
        );

        let quantization = Quantization {
            scale: [header.x_scale, header.y_scale, header.z_scale],
            offset: [header.x_offset, header.y_offset, header.z_offset],
        };
        Ok(Self {
            path,
            file,
            header,
            vlrs,
            quantization,
            buffer_size: options.buffer_size.max(1),
            start: None,
            points: Vec::new(),
            colours: Vec::new(),
            loads: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &LasHeader {
        &self.header
    }

    pub fn vlrs(&self) -> &[Vlr] {
        &self.vlrs
    }

    pub fn num_points(&self) -> usize {
        self.header.num_points as usize
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Change the window size and drop the resident points.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.max(1);
        self.start = None;
        self.points.clear();
        self.colours.clear();
    }

    /// Number of times the window has been (re)loaded.
    pub fn buffer_loads(&self) -> usize {
        self.loads
    }

    /// Point `i`, or `None` past the last point.
    pub fn point_record(&mut self, i: usize) -> Result<Option<PointRecord>> {
        Ok(self.slot(i)?.map(|n| self.points[n].clone()))
    }

    /// Colour of point `i`, or `None` past the last point or for formats without RGB.
    pub fn point_colour(&mut self, i: usize) -> Result<Option<Rgb>> {
        Ok(self.slot(i)?.and_then(|n| self.colours[n]))
    }

    /// GPS time of point `i`, for formats that record it.
    pub fn gps_time(&mut self, i: usize) -> Result<Option<f64>> {
        Ok(self.point_record(i)?.and_then(|p| p.gps_time))
    }

    /// Every point whose x/y lies inside `bbox`, edges included.
    pub fn point_records_in_bbox(&mut self, bbox: &BoundingBox) -> Result<Vec<PointRecord>> {
        let mut found = Vec::new();
        for i in 0..self.num_points() {
            if let Some(p) = self.point_record(i)? {
                if bbox.contains_point(p.x, p.y) {
                    found.push(p);
                }
            }
        }
        Ok(found)
    }

    /// Index of point `i` in the window, loading it when needed.
    fn slot(&mut self, i: usize) -> Result<Option<usize>> {
        if i >= self.num_points() {
            return Ok(None);
        }
        match self.start {
            Some(start) if i >= start && i < start + self.points.len() => Ok(Some(i - start)),
            _ => {
                self.load(i)?;
                Ok(Some(0))
            }
        }
    }

    fn load(&mut self, first: usize) -> Result<()> {
        let count = self.buffer_size.min(self.num_points() - first);
        let record_len = self.header.point_record_length as usize;
        let format = self.header.point_format;

        let mut data = vec![0u8; count * record_len];
        let pos = self.header.offset_to_point_data as u64 + (first * record_len) as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(&mut data)?;

        self.points.clear();
        self.colours.clear();
        for record in data.chunks_exact(record_len) {
            self.points.push(PointRecord::decode(record, format, &self.quantization));
            self.colours.push(Rgb::decode(record, format));
        }
        self.start = Some(first);
        self.loads += 1;
        trace!(first, count, "loaded LAS point buffer");
        Ok(())
    }
}
