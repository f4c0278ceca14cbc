//! Paged raster storage engine.
//!
//! A [`PagedRaster`] owns one header/data file pair. Cell reads and writes go
//! through a single resident block of cells that is written back only when
//! it is dirty and a cell outside of it is touched. Row operations and
//! [`PagedRaster::set_pixel_value`] bypass the block with positioned I/O.
//!
//! Out-of-bounds reads return nodata (or a reflected cell, see
//! [`RasterOptions::reflect_at_edges`]) and out-of-bounds writes are ignored.
//! I/O failures inside the cell-level calls are logged and forwarded to the
//! attached [`FeedbackSink`]; the call then degrades to nodata / no-op.
//!
//! There is no locking. Two handles on the same files, in one process or
//! several, overwrite each other's blocks.

use ndarray::Array2;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::codec::{check_range, CellCodec, DataType};
use crate::error::{Error, Result};
use crate::progress::{FeedbackSink, ProgressSink, ProgressTicker};
use crate::raster::header::{data_file_path, stats_file_path, DataScale, RasterHeader};
use crate::raster::stats::{Statistics, StatsBuilder};
use crate::raster::window::{block_size_for, AccessTracker, BlockWindow, DEFAULT_BUFFER_BYTES};
use crate::raster::GeoTransform;

/// Cells written per chunk when a new data file is filled.
const CREATE_CHUNK_CELLS: usize = 2_000_000;

/// Whether a handle may modify its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Options controlling a raster handle.
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Memory the block sizing policy may assume is free (default: 1 GiB).
    pub memory_budget: usize,
    /// Fixed byte budget for grids far larger than memory (default: 100 MB).
    pub buffer_bytes: usize,
    /// Force a block size in cells instead of deriving one.
    pub block_size: Option<usize>,
    /// Reflect out-of-bounds reads back into the grid once.
    pub reflect_at_edges: bool,
    /// Reject values that the storage type would truncate.
    pub strict_range: bool,
    /// Fill value for newly created data files (default: 0).
    pub initial_value: f64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            memory_budget: 1 << 30,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            block_size: None,
            reflect_at_edges: false,
            strict_range: false,
            initial_value: 0.0,
        }
    }
}

/// Per-handle I/O counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub block_reads: u64,
    pub block_writes: u64,
    pub row_reads: u64,
    pub row_writes: u64,
    pub misses: u64,
    pub direction_switches: u64,
}

/// A raster grid stored as a header sidecar plus a raw row-major data file.
pub struct PagedRaster {
    header_path: PathBuf,
    data_path: PathBuf,
    stats_path: PathBuf,
    header: RasterHeader,
    mode: AccessMode,
    options: RasterOptions,
    codec: CellCodec,
    block_size: usize,
    window: BlockWindow,
    tracker: AccessTracker,
    counters: IoCounters,
    statistics: Option<Statistics>,
    temporary: bool,
    closed: bool,
    progress: Option<Arc<dyn ProgressSink>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
}

impl std::fmt::Debug for PagedRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedRaster")
            .field("header_path", &self.header_path)
            .field("rows", &self.header.rows)
            .field("cols", &self.header.cols)
            .field("data_type", &self.header.data_type)
            .field("mode", &self.mode)
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl PagedRaster {
    // ---- Construction ----

    /// Open an existing raster with default options.
    pub fn open(header_path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        Self::open_with(header_path, mode, RasterOptions::default())
    }

    /// Open an existing raster. Fails if the header file is missing.
    pub fn open_with(header_path: impl AsRef<Path>, mode: AccessMode, options: RasterOptions) -> Result<Self> {
        let header_path = header_path.as_ref().to_path_buf();
        if !header_path.exists() {
            return Err(Error::MissingFile(header_path));
        }
        let header = RasterHeader::read(&header_path)?;
        Ok(Self::from_parts(header_path, header, mode, options))
    }

    /// Read-only handle used only for header, statistics and row access.
    /// No block is loaded unless a cell is requested.
    pub fn open_info(header_path: impl AsRef<Path>) -> Result<Self> {
        Self::open(header_path, AccessMode::ReadOnly)
    }

    /// Create a new raster, replacing any existing files at `header_path`.
    ///
    /// The data file is filled with `options.initial_value`.
    pub fn create(header_path: impl AsRef<Path>, header: RasterHeader, options: RasterOptions) -> Result<Self> {
        if header.rows == 0 || header.cols == 0 {
            return Err(Error::InvalidDimensions {
                rows: header.rows,
                cols: header.cols,
            });
        }
        let header_path = header_path.as_ref().to_path_buf();
        remove_if_exists(&header_path)?;
        remove_if_exists(&data_file_path(&header_path))?;
        remove_if_exists(&stats_file_path(&header_path))?;

        let mut raster = Self::from_parts(header_path, header, AccessMode::ReadWrite, options);
        raster.header.write(&raster.header_path)?;
        raster.create_data_file()?;
        Ok(raster)
    }

    /// Create a raster with the geometry, scale, units, projection, palette and
    /// nodata of the raster whose header is at `template`.
    pub fn create_from_template(
        header_path: impl AsRef<Path>,
        template: impl AsRef<Path>,
        data_type: DataType,
        options: RasterOptions,
    ) -> Result<Self> {
        let base = RasterHeader::read(template.as_ref())?;
        Self::create(header_path, RasterHeader::from_template(&base, data_type), options)
    }

    /// Like [`create`](Self::create), but the files are deleted on close.
    pub fn create_temporary(header_path: impl AsRef<Path>, header: RasterHeader, options: RasterOptions) -> Result<Self> {
        let mut raster = Self::create(header_path, header, options)?;
        raster.temporary = true;
        Ok(raster)
    }

    fn from_parts(header_path: PathBuf, header: RasterHeader, mode: AccessMode, options: RasterOptions) -> Self {
        let block_size = match options.block_size {
            Some(n) => n.clamp(1, header.cell_count().max(1)),
            None => block_size_for(header.rows, header.cols, options.memory_budget, options.buffer_bytes),
        };
        let codec = CellCodec::new(header.data_type, header.byte_order).strict(options.strict_range);
        debug!(
            "raster {} ({} x {}, {}) block size {} cells",
            header_path.display(),
            header.rows,
            header.cols,
            header.data_type,
            block_size
        );
        Self {
            data_path: data_file_path(&header_path),
            stats_path: stats_file_path(&header_path),
            header_path,
            header,
            mode,
            options,
            codec,
            block_size,
            window: BlockWindow::default(),
            tracker: AccessTracker::new(),
            counters: IoCounters::default(),
            statistics: None,
            temporary: false,
            closed: false,
            progress: None,
            feedback: None,
        }
    }

    /// Attach a progress sink for full-grid scans.
    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = Some(sink);
    }

    /// Attach a sink for degraded-operation messages.
    pub fn set_feedback_sink(&mut self, sink: Arc<dyn FeedbackSink>) {
        self.feedback = Some(sink);
    }

    /// Mark the raster temporary: its files are deleted on close.
    pub fn set_temporary(&mut self, temporary: bool) {
        self.temporary = temporary;
    }

    // ---- Accessors ----

    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    /// Mutable header. Geometry, data type and byte order must not be changed
    /// on an open handle; display range, units, palette and metadata may.
    pub fn header_mut(&mut self) -> &mut RasterHeader {
        &mut self.header
    }

    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }

    pub fn rows(&self) -> usize {
        self.header.rows
    }

    pub fn cols(&self) -> usize {
        self.header.cols
    }

    pub fn nodata(&self) -> f64 {
        self.header.nodata
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_dirty(&self) -> bool {
        self.window.is_dirty()
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn counters(&self) -> IoCounters {
        IoCounters {
            misses: self.tracker.misses(),
            direction_switches: self.tracker.switches(),
            ..self.counters
        }
    }

    /// Size of the data file on disk, if it exists.
    pub fn data_file_size(&self) -> Option<u64> {
        fs::metadata(&self.data_path).ok().map(|m| m.len())
    }

    // ---- Geometry ----

    pub fn geo_transform(&self) -> GeoTransform {
        self.header.geo_transform()
    }

    pub fn cell_size_x(&self) -> f64 {
        self.header.cell_size_x()
    }

    pub fn cell_size_y(&self) -> f64 {
        self.header.cell_size_y()
    }

    pub fn column_from_x(&self, x: f64) -> isize {
        self.geo_transform().column_from_x(x)
    }

    pub fn row_from_y(&self, y: f64) -> isize {
        self.geo_transform().row_from_y(y)
    }

    pub fn x_from_column(&self, col: isize) -> f64 {
        self.geo_transform().x_from_column(col)
    }

    pub fn y_from_row(&self, row: isize) -> f64 {
        self.geo_transform().y_from_row(row)
    }

    // ---- Cell access through the block window ----

    /// Value at `(row, col)`; nodata outside the grid unless edge reflection is on.
    pub fn get_value(&mut self, row: isize, col: isize) -> f64 {
        let Some((r, c)) = self.resolve_read(row, col) else {
            return self.header.nodata;
        };
        let cell = r * self.header.cols + c;
        match self.ensure_resident(r, cell) {
            Ok(()) => self.window.get(cell),
            Err(e) => {
                self.report("read", &e);
                self.header.nodata
            }
        }
    }

    /// Set `(row, col)`. Ignored outside the grid, on read-only handles, and
    /// (after logging) when strict range checking rejects the value.
    pub fn set_value(&mut self, row: isize, col: isize, value: f64) {
        if let Err(e) = self.try_update(row, col, |slot| *slot = value) {
            self.report("write", &e);
        }
    }

    /// Add `value` to the cell at `(row, col)`.
    pub fn increment_value(&mut self, row: isize, col: isize, value: f64) {
        if let Err(e) = self.try_update(row, col, |slot| *slot += value) {
            self.report("increment", &e);
        }
    }

    /// Subtract `value` from the cell at `(row, col)`.
    pub fn decrement_value(&mut self, row: isize, col: isize, value: f64) {
        if let Err(e) = self.try_update(row, col, |slot| *slot -= value) {
            self.report("decrement", &e);
        }
    }

    /// Fallible form of [`set_value`](Self::set_value). Out-of-bounds cells
    /// are still a silent no-op.
    pub fn try_set_value(&mut self, row: isize, col: isize, value: f64) -> Result<()> {
        self.try_update(row, col, |slot| *slot = value)
    }

    fn try_update(&mut self, row: isize, col: isize, op: impl FnOnce(&mut f64)) -> Result<()> {
        if self.mode != AccessMode::ReadWrite {
            return Err(Error::ReadOnly(self.header_path.clone()));
        }
        let Some((r, c)) = self.in_bounds(row, col) else {
            return Ok(());
        };
        let cell = r * self.header.cols + c;
        self.ensure_resident(r, cell)?;

        let mut value = self.window.get(cell);
        op(&mut value);
        if self.options.strict_range {
            check_range(value, self.header.data_type)?;
        }
        *self.window.slot(cell) = value;
        Ok(())
    }

    fn in_bounds(&self, row: isize, col: isize) -> Option<(usize, usize)> {
        if row >= 0 && col >= 0 && (row as usize) < self.header.rows && (col as usize) < self.header.cols {
            Some((row as usize, col as usize))
        } else {
            None
        }
    }

    fn resolve_read(&self, row: isize, col: isize) -> Option<(usize, usize)> {
        if let Some(rc) = self.in_bounds(row, col) {
            return Some(rc);
        }
        if !self.options.reflect_at_edges {
            return None;
        }
        let rows = self.header.rows as isize;
        let cols = self.header.cols as isize;
        let reflect = |v: isize, n: isize| {
            if v < 0 {
                -v
            } else if v >= n {
                n - (v - n)
            } else {
                v
            }
        };
        self.in_bounds(reflect(row, rows), reflect(col, cols))
    }

    /// Make sure `cell` is resident, writing back and reloading if it is not.
    fn ensure_resident(&mut self, row: usize, cell: usize) -> Result<()> {
        if self.window.contains(cell) {
            return Ok(());
        }
        if self.window.is_dirty() {
            self.write_block()?;
        }
        let start = self.tracker.retarget(row, cell, self.block_size);
        self.read_block(start)
    }

    fn read_block(&mut self, start: usize) -> Result<()> {
        self.ensure_data_file()?;
        let total = self.header.cell_count();
        let len = (self.block_size + 1).min(total - start);
        let width = self.codec.width();

        let mut bytes = vec![0u8; len * width];
        let mut file = File::open(&self.data_path)?;
        file.seek(SeekFrom::Start((start * width) as u64))?;
        file.read_exact(&mut bytes)?;

        self.window.load(start, self.codec.decode_vec(&bytes));
        self.counters.block_reads += 1;
        debug!("loaded cells {}..{} of {}", start, start + len, self.header_path.display());
        Ok(())
    }

    fn write_block(&mut self) -> Result<()> {
        if self.mode != AccessMode::ReadWrite || !self.window.is_loaded() {
            return Ok(());
        }
        widen_range(&mut self.header, self.window.values());

        let bytes = self.codec.encode_vec(self.window.values())?;
        self.ensure_data_file()?;
        let mut file = OpenOptions::new().write(true).open(&self.data_path)?;
        file.seek(SeekFrom::Start((self.window.start() * self.codec.width()) as u64))?;
        file.write_all(&bytes)?;

        self.window.mark_clean();
        self.counters.block_writes += 1;
        debug!(
            "flushed cells {}..{} of {}",
            self.window.start(),
            self.window.start() + self.window.len(),
            self.header_path.display()
        );
        Ok(())
    }

    // ---- Row access (bypasses the block window) ----

    /// Read row `row` directly from the data file.
    pub fn get_row_values(&mut self, row: usize) -> Result<Vec<f64>> {
        if row >= self.header.rows {
            return Err(Error::RowOutOfRange {
                row,
                rows: self.header.rows,
            });
        }
        let cols = self.header.cols;
        let width = self.codec.width();
        let mut bytes = vec![0u8; cols * width];
        let mut file = File::open(&self.data_path)?;
        file.seek(SeekFrom::Start((row * cols * width) as u64))?;
        file.read_exact(&mut bytes)?;
        self.counters.row_reads += 1;
        Ok(self.codec.decode_vec(&bytes))
    }

    /// Write row `row` directly to the data file.
    ///
    /// A resident block overlapping the row is written back first (if dirty)
    /// and then dropped, so later cell reads see the new row.
    pub fn set_row_values(&mut self, row: usize, values: &[f64]) -> Result<()> {
        if self.mode != AccessMode::ReadWrite {
            return Err(Error::ReadOnly(self.header_path.clone()));
        }
        if row >= self.header.rows {
            return Err(Error::RowOutOfRange {
                row,
                rows: self.header.rows,
            });
        }
        let cols = self.header.cols;
        if values.len() != cols {
            return Err(Error::RowLengthMismatch {
                expected: cols,
                actual: values.len(),
            });
        }
        let bytes = self.codec.encode_vec(values)?;

        let first = row * cols;
        if self.window.overlaps(first, cols) {
            if self.window.is_dirty() {
                self.write_block()?;
            }
            self.window.invalidate();
        }

        widen_range(&mut self.header, values);
        self.ensure_data_file()?;
        let mut file = OpenOptions::new().write(true).open(&self.data_path)?;
        file.seek(SeekFrom::Start((first * self.codec.width()) as u64))?;
        file.write_all(&bytes)?;
        self.counters.row_writes += 1;
        Ok(())
    }

    /// Write one cell straight to disk and persist the header if min/max grow.
    ///
    /// Opens its own file handle per call; meant for sparse edits only.
    pub fn set_pixel_value(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if self.mode != AccessMode::ReadWrite {
            return Err(Error::ReadOnly(self.header_path.clone()));
        }
        if row >= self.header.rows || col >= self.header.cols {
            return Ok(());
        }
        if self.options.strict_range {
            check_range(value, self.header.data_type)?;
        }

        let mut header_changed = false;
        if value != self.header.nodata {
            if value < self.header.minimum {
                self.header.minimum = value;
                self.header.display_minimum = value;
                header_changed = true;
            }
            if value > self.header.maximum {
                self.header.maximum = value;
                self.header.display_maximum = value;
                header_changed = true;
            }
        }
        if header_changed {
            self.header.write(&self.header_path)?;
        }

        let cell = row * self.header.cols + col;
        let bytes = self.codec.encode_vec(&[value])?;
        self.ensure_data_file()?;
        let mut file = OpenOptions::new().write(true).open(&self.data_path)?;
        file.seek(SeekFrom::Start((cell * self.codec.width()) as u64))?;
        file.write_all(&bytes)?;
        self.window.patch(cell, value);
        Ok(())
    }

    // ---- Bulk helpers ----

    /// Read the whole grid into memory.
    pub fn read_all(&mut self) -> Result<Array2<f64>> {
        let (rows, cols) = (self.header.rows, self.header.cols);
        if self.window.is_dirty() {
            self.write_block()?;
        }
        let mut out = Array2::from_elem((rows, cols), self.header.nodata);
        for r in 0..rows {
            let values = self.get_row_values(r)?;
            for (dst, v) in out.row_mut(r).iter_mut().zip(values) {
                *dst = v;
            }
        }
        Ok(out)
    }

    /// Overwrite the whole grid from an array of matching shape.
    pub fn write_all(&mut self, data: &Array2<f64>) -> Result<()> {
        let (rows, cols) = data.dim();
        if rows != self.header.rows || cols != self.header.cols {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        let mut ticker = ProgressTicker::new(rows);
        for (r, row) in data.outer_iter().enumerate() {
            let values: Vec<f64> = row.iter().copied().collect();
            self.set_row_values(r, &values)?;
            if ticker.tick(self.progress.as_deref(), "writing rows", r + 1) {
                break;
            }
        }
        Ok(())
    }

    // ---- Header and statistics ----

    /// Rescan every row for the true min/max of the valid cells.
    pub fn find_min_and_max(&mut self) -> Result<()> {
        let rows = self.header.rows;
        let nodata = self.header.nodata;
        let mut min = f64::MAX;
        let mut max = -f64::MAX;
        let mut ticker = ProgressTicker::new(rows);
        for r in 0..rows {
            for v in self.get_row_values(r)? {
                if v != nodata && !v.is_nan() {
                    min = min.min(v);
                    max = max.max(v);
                }
            }
            if ticker.tick(self.progress.as_deref(), "finding min and max", r + 1) {
                return Ok(());
            }
        }
        self.header.minimum = min;
        self.header.maximum = max;
        Ok(())
    }

    /// Persist the header, rescanning min/max first if they are unknown.
    pub fn write_header(&mut self) -> Result<()> {
        if self.header.normalize_display_range() {
            self.find_min_and_max()?;
            self.header.normalize_display_range();
        }
        self.header.write(&self.header_path)
    }

    /// Write back the resident block if it is dirty.
    pub fn flush(&mut self) -> Result<()> {
        if self.window.is_dirty() {
            self.write_block()?;
        }
        Ok(())
    }

    /// Statistics of the valid cells, read from the sidecar or computed if it
    /// does not exist. `None` for RGB rasters and rasters without valid cells.
    pub fn statistics(&mut self) -> Result<Option<&Statistics>> {
        if self.statistics.is_none() && self.header.data_scale != DataScale::Rgb {
            if self.stats_path.exists() {
                self.statistics = Some(Statistics::read(&self.stats_path)?);
            } else {
                self.create_stats_file()?;
            }
        }
        Ok(self.statistics.as_ref())
    }

    /// Recompute statistics with a full scan and rewrite the sidecar.
    ///
    /// Statistics are not invalidated by later writes; call this again after
    /// modifying the grid.
    pub fn create_stats_file(&mut self) -> Result<Option<Statistics>> {
        remove_if_exists(&self.stats_path)?;
        self.statistics = None;
        if self.header.data_scale == DataScale::Rgb {
            return Ok(None);
        }
        self.flush()?;

        let rows = self.header.rows;
        let mut builder = StatsBuilder::new(self.header.data_type, self.header.nodata);
        let mut ticker = ProgressTicker::new(rows * 2);
        for r in 0..rows {
            builder.first_pass(&self.get_row_values(r)?);
            ticker.tick(self.progress.as_deref(), "computing statistics", r + 1);
        }
        builder.begin_histogram();
        for r in 0..rows {
            builder.second_pass(&self.get_row_values(r)?);
            ticker.tick(self.progress.as_deref(), "computing statistics", rows + r + 1);
        }

        let Some(stats) = builder.finish() else {
            warn!("{} has no valid cells, statistics not written", self.header_path.display());
            return Ok(None);
        };
        self.header.minimum = stats.minimum;
        self.header.maximum = stats.maximum;
        if !self.temporary {
            stats.write(&self.stats_path)?;
        }
        self.statistics = Some(stats.clone());
        Ok(Some(stats))
    }

    /// Value below which `percent` (0-100) of the valid cells fall.
    pub fn percentile(&mut self, percent: f64) -> Result<Option<f64>> {
        Ok(self.statistics()?.map(|s| s.percentile(percent)))
    }

    // ---- Lifecycle ----

    /// Finish with the raster.
    ///
    /// Temporary rasters delete their files. Writable rasters write back the
    /// resident block, rescan min/max and rewrite the header.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        if self.temporary {
            remove_if_exists(&self.header_path)?;
            remove_if_exists(&self.data_path)?;
            remove_if_exists(&self.stats_path)?;
            return Ok(());
        }
        if self.mode == AccessMode::ReadWrite {
            self.flush()?;
            self.find_min_and_max()?;
            self.write_header()?;
            let c = self.counters();
            info!(
                "closed {} ({} block reads, {} block writes, {} direction switches)",
                self.header_path.display(),
                c.block_reads,
                c.block_writes,
                c.direction_switches
            );
        }
        self.window.invalidate();
        Ok(())
    }

    // ---- Internals ----

    fn ensure_data_file(&mut self) -> Result<()> {
        if self.data_path.exists() {
            return Ok(());
        }
        if self.mode != AccessMode::ReadWrite {
            return Err(Error::MissingFile(self.data_path.clone()));
        }
        self.create_data_file()
    }

    /// Write a data file filled with the initial value, in fixed-size chunks.
    fn create_data_file(&mut self) -> Result<()> {
        let total = self.header.cell_count();
        let chunk_cells = CREATE_CHUNK_CELLS.min(total.max(1));
        let chunk = self.codec.encode_vec(&vec![self.options.initial_value; chunk_cells])?;
        let width = self.codec.width();

        let mut file = File::create(&self.data_path)?;
        let mut written = 0;
        let mut ticker = ProgressTicker::new(total);
        while written < total {
            let n = chunk_cells.min(total - written);
            file.write_all(&chunk[..n * width])?;
            written += n;
            ticker.tick(self.progress.as_deref(), "creating data file", written);
        }
        file.flush()?;
        debug!("created {} ({} cells)", self.data_path.display(), total);
        Ok(())
    }

    fn report(&self, op: &str, e: &Error) {
        let message = format!("{} failed on {}: {}", op, self.header_path.display(), e);
        error!("{}", message);
        if let Some(sink) = &self.feedback {
            sink.feedback(&message);
        }
    }
}

impl Drop for PagedRaster {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.temporary {
            let _ = fs::remove_file(&self.header_path);
            let _ = fs::remove_file(&self.data_path);
            let _ = fs::remove_file(&self.stats_path);
            return;
        }
        if self.mode != AccessMode::ReadWrite {
            return;
        }
        if self.window.is_dirty() {
            warn!("{} dropped without close, writing back pending cells", self.header_path.display());
            if let Err(e) = self.write_block() {
                self.report("flush on drop", &e);
            }
        }
        // min/max are only widened here; close() rescans for the exact range
        if let Err(e) = self.header.write(&self.header_path) {
            self.report("header write on drop", &e);
        }
    }
}

/// Widen the header min/max with the valid values in `values`.
fn widen_range(header: &mut RasterHeader, values: &[f64]) {
    let nodata = header.nodata;
    for &v in values.iter().filter(|&&v| v != nodata && !v.is_nan()) {
        if v < header.minimum {
            header.minimum = v;
        }
        if v > header.maximum {
            header.maximum = v;
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
