//! Grid statistics and the `.wstat` sidecar.
//!
//! Statistics are built from two row-by-row passes over the grid: the first
//! finds the valid-cell count, sum and range, the second fills the histogram
//! and the squared deviations. Percentiles interpolate on the cumulative
//! histogram.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::codec::DataType;
use crate::error::{Error, Result};
use crate::raster::header::{fmt_number, parse_number};

/// Summary statistics of the valid (non-nodata) cells of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub std_dev: f64,
    pub num_valid_cells: u64,
    pub bin_width: f64,
    pub histogram: Vec<u64>,
}

/// Number of histogram bins for a floating-point value range.
pub fn float_bin_count(range: f64) -> usize {
    if range < 512.0 {
        512
    } else if range < 1024.0 {
        1024
    } else if range < 2048.0 {
        2048
    } else if range < 4096.0 {
        4096
    } else {
        8192
    }
}

/// Streaming accumulator over rows of cell values.
///
/// Feed every row through [`first_pass`](Self::first_pass), call
/// [`begin_histogram`](Self::begin_histogram), feed every row again through
/// [`second_pass`](Self::second_pass) and finish.
#[derive(Debug, Clone)]
pub struct StatsBuilder {
    nodata: f64,
    data_type: DataType,
    n: u64,
    sum: f64,
    min: f64,
    max: f64,
    mean: f64,
    deviation: f64,
    bin_width: f64,
    histogram: Vec<u64>,
}

impl StatsBuilder {
    pub fn new(data_type: DataType, nodata: f64) -> Self {
        Self {
            nodata,
            data_type,
            n: 0,
            sum: 0.0,
            min: f64::MAX,
            max: -f64::MAX,
            mean: 0.0,
            deviation: 0.0,
            bin_width: 0.0,
            histogram: Vec::new(),
        }
    }

    pub fn first_pass(&mut self, row: &[f64]) {
        for &z in row.iter().filter(|&&z| z != self.nodata) {
            self.sum += z;
            self.n += 1;
            if z < self.min {
                self.min = z;
            }
            if z > self.max {
                self.max = z;
            }
        }
    }

    /// Fix the mean and bin layout once the first pass is complete.
    pub fn begin_histogram(&mut self) {
        if self.n == 0 {
            return;
        }
        self.mean = self.sum / self.n as f64;
        let range = self.max - self.min;
        let bins = if self.data_type.is_integral() {
            self.bin_width = 1.0;
            range as usize + 1
        } else {
            let bins = float_bin_count(range);
            self.bin_width = range / (bins - 1) as f64;
            bins
        };
        self.histogram = vec![0; bins];
    }

    pub fn second_pass(&mut self, row: &[f64]) {
        if self.histogram.is_empty() {
            return;
        }
        let last = self.histogram.len() - 1;
        for &z in row.iter().filter(|&&z| z != self.nodata) {
            self.deviation += (z - self.mean) * (z - self.mean);
            let bin = if self.bin_width > 0.0 {
                ((z - self.min) / self.bin_width).floor()
            } else {
                0.0
            };
            // NaN and negatives collapse to bin 0
            let bin = if bin > 0.0 { (bin as usize).min(last) } else { 0 };
            self.histogram[bin] += 1;
        }
    }

    /// `None` when the grid holds no valid cells.
    pub fn finish(self) -> Option<Statistics> {
        if self.n == 0 {
            return None;
        }
        let std_dev = if self.n > 1 {
            (self.deviation / (self.n - 1) as f64).sqrt()
        } else {
            0.0
        };

        let mut highest = 0u64;
        let mut highest_bin = 0usize;
        for (i, &count) in self.histogram.iter().enumerate() {
            if count > highest {
                highest = count;
                highest_bin = i;
            }
        }

        let mut stats = Statistics {
            minimum: self.min,
            maximum: self.max,
            mean: self.mean,
            median: 0.0,
            mode: self.min + highest_bin as f64 * self.bin_width,
            std_dev,
            num_valid_cells: self.n,
            bin_width: self.bin_width,
            histogram: self.histogram,
        };
        stats.median = stats.percentile(50.0);
        Some(stats)
    }
}

impl Statistics {
    /// Value below which `percent` (0-100) of the valid cells fall.
    ///
    /// Finds the first bin `i` whose cumulative fraction reaches the target and
    /// interpolates between `(min + (i-1)*w, cum[i-1])` and `(min + i*w, cum[i])`.
    pub fn percentile(&self, percent: f64) -> f64 {
        if self.histogram.is_empty() || self.num_valid_cells == 0 {
            return self.minimum;
        }
        let p = percent / 100.0;
        let n = self.num_valid_cells as f64;
        let w = self.bin_width;

        let mut running = 0u64;
        let mut previous = 0.0;
        let last = self.histogram.len() - 1;
        for (i, &count) in self.histogram.iter().enumerate() {
            running += count;
            let cumulative = running as f64 / n;
            if cumulative >= p || i == last {
                let x1 = self.minimum + (i as f64 - 1.0) * w;
                let (y1, y2) = if i > 0 { (previous, cumulative) } else { (0.0, cumulative) };
                if y2 <= y1 {
                    return x1 + w;
                }
                return x1 + (p - y1) / (y2 - y1) * w;
            }
            previous = cumulative;
        }
        self.maximum
    }

    /// Serialize to the sidecar text format.
    pub fn to_text(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "START_STATS:");
        let _ = writeln!(s, "MIN: \t{}", fmt_number(self.minimum));
        let _ = writeln!(s, "MAX: \t{}", fmt_number(self.maximum));
        let _ = writeln!(s, "MEAN: \t{}", fmt_number(self.mean));
        let _ = writeln!(s, "MEDIAN: \t{}", fmt_number(self.median));
        let _ = writeln!(s, "MODE: \t{}", fmt_number(self.mode));
        let _ = writeln!(s, "STD_DEV: \t{}", fmt_number(self.std_dev));
        let _ = writeln!(s, "NUM_VALID_CELLS: \t{}", self.num_valid_cells);
        let _ = writeln!(s, "END_STATS");
        let _ = writeln!(s, "START_HISTO");
        let _ = writeln!(s, "BIN_WIDTH: \t{}", fmt_number(self.bin_width));
        let _ = writeln!(s, "NUM_BINS: \t{}", self.histogram.len());
        for count in &self.histogram {
            let _ = writeln!(s, "{}", count);
        }
        let _ = writeln!(s, "END_HISTO");
        s
    }

    /// Parse the sidecar text format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut stats = Statistics {
            minimum: f64::NAN,
            maximum: f64::NAN,
            mean: 0.0,
            median: 0.0,
            mode: 0.0,
            std_dev: 0.0,
            num_valid_cells: 0,
            bin_width: 0.0,
            histogram: Vec::new(),
        };
        let mut in_stats = false;
        let mut in_histo = false;

        for line in text.lines() {
            let mut parts = line.split('\t');
            let key = parts.next().unwrap_or("").to_lowercase();
            let value = parts.next().map(str::trim);

            if key.contains("start_stats") {
                in_stats = true;
                continue;
            }
            if key.contains("end_stats") {
                in_stats = false;
                continue;
            }
            if key.contains("start_histo") {
                in_histo = true;
                continue;
            }
            if key.contains("end_histo") {
                in_histo = false;
                continue;
            }

            let num = || value.and_then(parse_number).ok_or_else(|| malformed(line));
            if in_stats {
                if key.contains("min:") {
                    stats.minimum = num()?;
                } else if key.contains("max:") {
                    stats.maximum = num()?;
                } else if key.contains("mean") {
                    stats.mean = num()?;
                } else if key.contains("median") {
                    stats.median = num()?;
                } else if key.contains("mode") {
                    stats.mode = num()?;
                } else if key.contains("std_dev") {
                    stats.std_dev = num()?;
                } else if key.contains("num_valid_cells") {
                    stats.num_valid_cells = num()? as u64;
                }
            } else if in_histo {
                if key.contains("bin_width") {
                    stats.bin_width = num()?;
                } else if key.contains("num_bins") {
                    stats.histogram.reserve(num()? as usize);
                } else if !key.trim().is_empty() {
                    let count = key.trim().parse::<u64>().map_err(|_| malformed(line))?;
                    stats.histogram.push(count);
                }
            }
        }
        Ok(stats)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_text())?;
        Ok(())
    }
}

fn malformed(line: &str) -> Error {
    Error::Malformed {
        what: "statistics file",
        reason: format!("bad line {:?}", line),
    }
}
