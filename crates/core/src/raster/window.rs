//! Block window bookkeeping for the paged raster.
//!
//! A raster keeps at most one contiguous run of cells in memory. This module
//! holds the pure parts of that machinery: how big the run is, where the next
//! run starts after a miss, and the resident cells with their dirty flag.

/// Fixed byte budget used when the grid does not come close to fitting in memory.
pub const DEFAULT_BUFFER_BYTES: usize = 100 * 1_048_576;

/// Cells held in memory per raster handle.
///
/// * the whole grid when a third of `memory_budget` exceeds its `f64` footprint;
/// * a third of `buffer_bytes / 8` when the grid is more than twice that third;
/// * half of the grid otherwise.
pub fn block_size_for(rows: usize, cols: usize, memory_budget: usize, buffer_bytes: usize) -> usize {
    let total = rows * cols;
    let need = total as u128 * 8;
    let third = (memory_budget / 3) as u128;

    let size = if third > need {
        total
    } else if third == 0 || need as f64 / third as f64 > 2.0 {
        (buffer_bytes / 8) / 3
    } else {
        total / 2
    };
    size.clamp(1, total.max(1))
}

/// Vertical direction of recent block misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    Down,
    Up,
}

/// Miss history used to place the next block.
///
/// While misses keep going the same way the next block starts at (downward)
/// or ends at (upward) the missed cell. Every change of direction raises
/// `switch_ratio = switches / misses`, which shifts the block toward being
/// centred on the missed cell.
#[derive(Debug, Clone, Default)]
pub struct AccessTracker {
    previous_row: usize,
    direction: Option<ReadDirection>,
    switches: u64,
    misses: u64,
    switch_ratio: f64,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a miss on `cell` (in `row`) and return the first cell of the new block.
    pub fn retarget(&mut self, row: usize, cell: usize, block_size: usize) -> usize {
        self.misses += 1;
        let half = (block_size / 2) as f64;

        let wanted = if self.previous_row < row {
            self.turn(ReadDirection::Down);
            cell as f64 - half * self.switch_ratio
        } else {
            self.turn(ReadDirection::Up);
            cell as f64 - (block_size as f64 - self.switch_ratio * half)
        };
        self.previous_row = row;

        if wanted <= 0.0 {
            0
        } else {
            (wanted as usize).min(cell)
        }
    }

    fn turn(&mut self, direction: ReadDirection) {
        match self.direction {
            None => self.direction = Some(direction),
            Some(d) if d != direction => {
                self.direction = Some(direction);
                self.switches += 1;
                self.switch_ratio = self.switches as f64 / self.misses as f64;
            }
            Some(_) => {}
        }
    }

    pub fn direction(&self) -> Option<ReadDirection> {
        self.direction
    }

    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn switch_ratio(&self) -> f64 {
        self.switch_ratio
    }
}

/// Resident cells `[start, start + values.len())`.
#[derive(Debug, Clone, Default)]
pub struct BlockWindow {
    start: usize,
    values: Vec<f64>,
    dirty: bool,
}

impl BlockWindow {
    /// Whether `cell` is resident.
    pub fn contains(&self, cell: usize) -> bool {
        cell >= self.start && cell < self.start + self.values.len()
    }

    /// Whether any cell of `[first, first + len)` is resident.
    pub fn overlaps(&self, first: usize, len: usize) -> bool {
        !self.values.is_empty() && first < self.start + self.values.len() && self.start < first + len
    }

    pub fn is_loaded(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Replace the resident run with freshly read cells.
    pub fn load(&mut self, start: usize, values: Vec<f64>) {
        self.start = start;
        self.values = values;
        self.dirty = false;
    }

    /// Drop the resident run without writing it back.
    pub fn invalidate(&mut self) {
        self.values.clear();
        self.dirty = false;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Value of a resident cell.
    pub fn get(&self, cell: usize) -> f64 {
        self.values[cell - self.start]
    }

    /// Mutable slot of a resident cell; marks the block dirty.
    pub fn slot(&mut self, cell: usize) -> &mut f64 {
        self.dirty = true;
        let start = self.start;
        &mut self.values[cell - start]
    }

    /// Overwrite a resident cell without marking the block dirty.
    pub fn patch(&mut self, cell: usize, value: f64) {
        if self.contains(cell) {
            let start = self.start;
            self.values[cell - start] = value;
        }
    }
}
