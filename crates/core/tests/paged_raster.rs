//! End-to-end tests for the paged raster engine: files on disk, close and reopen.

use approx::assert_relative_eq;
use gridstore_core::raster::{AccessMode, PagedRaster, RasterHeader, RasterOptions};
use gridstore_core::DataType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NODATA: f64 = -9999.0;

fn options_with_block(block: Option<usize>) -> RasterOptions {
    RasterOptions {
        block_size: block,
        ..RasterOptions::default()
    }
}

fn new_raster(path: &Path, rows: usize, cols: usize, data_type: DataType, nodata: f64) -> PagedRaster {
    let header = RasterHeader::new(
        rows,
        cols,
        rows as f64,
        0.0,
        cols as f64,
        0.0,
        data_type,
        nodata,
    );
    PagedRaster::create(path, header, RasterOptions::default()).unwrap()
}

/// Fill a raster with a deterministic pattern and close it.
fn patterned(dir: &TempDir, name: &str, rows: usize, cols: usize) -> PathBuf {
    let path = dir.path().join(name);
    let mut r = new_raster(&path, rows, cols, DataType::Float, NODATA);
    for row in 0..rows {
        let values: Vec<f64> = (0..cols)
            .map(|col| if (row + col) % 7 == 0 { NODATA } else { (row * cols + col) as f64 * 0.5 })
            .collect();
        r.set_row_values(row, &values).unwrap();
    }
    r.close().unwrap();
    path
}

fn read_cells(path: &Path, block: Option<usize>, order: &[(isize, isize)]) -> Vec<f64> {
    let mut r = PagedRaster::open_with(path, AccessMode::ReadOnly, options_with_block(block)).unwrap();
    order.iter().map(|&(row, col)| r.get_value(row, col)).collect()
}

#[test]
fn test_checkerboard_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checker.dep");

    let mut r = new_raster(&path, 4, 4, DataType::Float, NODATA);
    for row in 0..4 {
        for col in 0..4 {
            let v = if (row + col) % 2 == 0 { 1.0 } else { NODATA };
            r.set_value(row, col, v);
        }
    }
    r.close().unwrap();

    let mut r = PagedRaster::open(&path, AccessMode::ReadWrite).unwrap();
    r.set_value(1, 1, 5.5);
    r.close().unwrap();

    let mut r = PagedRaster::open(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(r.get_value(1, 1), 5.5);
    assert_eq!(r.get_value(0, 0), 1.0);
    assert_eq!(r.get_value(0, 1), NODATA);
    assert!(r.header().maximum >= 5.5);
    assert_eq!(r.header().minimum, 1.0);
}

#[test]
fn test_round_trip_each_data_type() {
    let dir = TempDir::new().unwrap();
    let cases: [(DataType, f64, Vec<f64>); 4] = [
        (DataType::Double, -32768.0, vec![f64::MAX, -f64::MAX, 1e-300, -32768.0, 0.1]),
        (DataType::Float, NODATA, vec![f32::MAX as f64, -1.5, 0.25, NODATA, 1e-3]),
        (DataType::Integer, -32768.0, vec![32767.0, -32768.0, 0.0, -1.0, 1234.0]),
        (DataType::Byte, 0.0, vec![255.0, 0.0, 1.0, 128.0, 77.0]),
    ];

    for (i, (data_type, nodata, values)) in cases.iter().enumerate() {
        let path = dir.path().join(format!("rt{}.dep", i));
        let mut r = new_raster(&path, 1, values.len(), *data_type, *nodata);
        for (col, v) in values.iter().enumerate() {
            r.set_value(0, col as isize, *v);
        }
        r.close().unwrap();

        let mut r = PagedRaster::open(&path, AccessMode::ReadOnly).unwrap();
        assert_eq!(r.data_type(), *data_type);
        for (col, v) in values.iter().enumerate() {
            let expected = if *data_type == DataType::Float { *v as f32 as f64 } else { *v };
            assert_eq!(r.get_value(0, col as isize), expected, "{:?} col {}", data_type, col);
        }
    }
}

#[test]
fn test_narrowing_truncates_without_strict_mode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("narrow.dep");
    let mut r = new_raster(&path, 1, 3, DataType::Integer, -32768.0);
    r.set_row_values(0, &[2.9, -2.9, 40000.0]).unwrap();
    assert_eq!(r.get_row_values(0).unwrap(), vec![2.0, -2.0, (40000i32 as i16) as f64]);
}

#[test]
fn test_min_max_after_close_matches_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minmax.dep");
    let mut rng = StdRng::seed_from_u64(7);
    let (rows, cols) = (20, 15);

    let mut r = PagedRaster::create(
        &path,
        RasterHeader::new(rows, cols, 20.0, 0.0, 15.0, 0.0, DataType::Float, NODATA),
        options_with_block(Some(37)),
    )
    .unwrap();
    for _ in 0..400 {
        let row = rng.gen_range(0..rows) as isize;
        let col = rng.gen_range(0..cols) as isize;
        let v = if rng.gen_bool(0.1) { NODATA } else { rng.gen_range(-50.0..50.0f32) as f64 };
        r.set_value(row, col, v);
    }
    let row: Vec<f64> = (0..cols).map(|c| c as f64 * 10.0).collect();
    r.set_row_values(3, &row).unwrap();
    // lower the maximum that set_row_values just introduced
    r.set_value(3, (cols - 1) as isize, 0.0);
    r.close().unwrap();

    let mut r = PagedRaster::open(&path, AccessMode::ReadOnly).unwrap();
    let data = r.read_all().unwrap();
    let valid = data.iter().copied().filter(|&v| v != NODATA);
    let (min, max) = valid.fold((f64::MAX, -f64::MAX), |(lo, hi), v| (lo.min(v), hi.max(v)));
    assert_eq!(r.header().minimum, min);
    assert_eq!(r.header().maximum, max);
}

#[test]
fn test_block_boundaries_are_transparent() {
    let dir = TempDir::new().unwrap();
    let (rows, cols) = (23, 17);
    let path = patterned(&dir, "blocks.dep", rows, cols);

    let mut forward = Vec::new();
    for row in 0..rows as isize {
        for col in 0..cols as isize {
            forward.push((row, col));
        }
    }
    let mut backward = forward.clone();
    backward.reverse();
    let mut shuffled = forward.clone();
    shuffled.shuffle(&mut StdRng::seed_from_u64(42));

    for order in [&forward, &backward, &shuffled] {
        let reference = read_cells(&path, None, order);
        for block in [1, 5, cols, 3 * cols + 2] {
            assert_eq!(read_cells(&path, Some(block), order), reference, "block {}", block);
        }
    }
}

#[test]
fn test_neighbourhood_scan_through_small_blocks() {
    let dir = TempDir::new().unwrap();
    let (rows, cols) = (12, 9);
    let path = patterned(&dir, "scan.dep", rows, cols);

    let mut whole = PagedRaster::open(&path, AccessMode::ReadOnly).unwrap();
    let mut small = PagedRaster::open_with(&path, AccessMode::ReadOnly, options_with_block(Some(20))).unwrap();
    for row in 0..rows as isize {
        for col in 0..cols as isize {
            for (dr, dc) in [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)] {
                assert_eq!(small.get_value(row + dr, col + dc), whole.get_value(row + dr, col + dc));
            }
        }
    }
    let c = small.counters();
    assert!(c.misses > 1);
    assert!(c.direction_switches > 0);
}

#[test]
fn test_cell_writes_through_small_blocks_persist() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("writes.dep");
    let (rows, cols) = (10, 10);
    let mut r = PagedRaster::create(
        &path,
        RasterHeader::new(rows, cols, 10.0, 0.0, 10.0, 0.0, DataType::Double, NODATA),
        options_with_block(Some(7)),
    )
    .unwrap();
    for row in (0..rows as isize).rev() {
        for col in 0..cols as isize {
            r.set_value(row, col, (row * 100 + col) as f64);
        }
    }
    r.close().unwrap();

    let mut r = PagedRaster::open(&path, AccessMode::ReadOnly).unwrap();
    for row in 0..rows {
        let expected: Vec<f64> = (0..cols).map(|c| (row * 100 + c) as f64).collect();
        assert_eq!(r.get_row_values(row).unwrap(), expected);
    }
}

#[test]
fn test_statistics_and_percentiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stats.dep");
    let mut r = new_raster(&path, 10, 10, DataType::Float, NODATA);
    for row in 0..10 {
        let values: Vec<f64> = (0..10).map(|c| (row * 10 + c) as f64).collect();
        r.set_row_values(row, &values).unwrap();
    }
    r.set_value(0, 0, NODATA);

    let stats = r.create_stats_file().unwrap().unwrap();
    assert_eq!(stats.num_valid_cells, 99);
    assert_eq!(stats.minimum, 1.0);
    assert_eq!(stats.maximum, 99.0);
    assert_relative_eq!(stats.mean, 50.0, epsilon = 1e-9);
    assert!(r.stats_path().exists());

    let mut previous = f64::NEG_INFINITY;
    for p in 0..=100 {
        let v = r.percentile(p as f64).unwrap().unwrap();
        assert!(v >= previous, "percentile {} went down: {} < {}", p, v, previous);
        previous = v;
    }
    let median = r.percentile(50.0).unwrap().unwrap();
    assert_relative_eq!(median, 50.0, epsilon = 0.5);
    r.close().unwrap();

    // sidecar is read back lazily
    let mut r = PagedRaster::open_info(&path).unwrap();
    let stats = r.statistics().unwrap().unwrap();
    assert_eq!(stats.num_valid_cells, 99);
}

#[test]
fn test_template_copies_geometry() {
    let dir = TempDir::new().unwrap();
    let base_path = dir.path().join("base.dep");
    let mut base = new_raster(&base_path, 3, 5, DataType::Integer, -1.0);
    base.header_mut().projection = "UTM zone 17N".to_string();
    base.header_mut().xy_units = "metres".to_string();
    base.close().unwrap();

    let copy_path = dir.path().join("copy.dep");
    let options = RasterOptions {
        initial_value: -1.0,
        ..RasterOptions::default()
    };
    let mut copy = PagedRaster::create_from_template(&copy_path, &base_path, DataType::Double, options).unwrap();
    assert_eq!(copy.rows(), 3);
    assert_eq!(copy.cols(), 5);
    assert_eq!(copy.data_type(), DataType::Double);
    assert_eq!(copy.nodata(), -1.0);
    assert_eq!(copy.header().projection, "UTM zone 17N");
    assert_eq!(copy.header().xy_units, "metres");
    assert_eq!(copy.data_file_size(), Some(3 * 5 * 8));
    assert_eq!(copy.get_value(2, 4), -1.0);
}

#[test]
fn test_bulk_array_helpers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bulk.dep");
    let mut r = new_raster(&path, 3, 4, DataType::Double, NODATA);
    let data = ndarray::Array2::from_shape_fn((3, 4), |(row, col)| (row * 4 + col) as f64);
    r.write_all(&data).unwrap();
    assert_eq!(r.read_all().unwrap(), data);
    assert_eq!(r.get_value(2, 3), 11.0);
    assert!(r.write_all(&ndarray::Array2::zeros((2, 2))).is_err());
}
