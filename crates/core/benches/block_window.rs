//! Benchmarks for cell access through the block window

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gridstore_core::raster::{AccessMode, PagedRaster, RasterHeader, RasterOptions};
use gridstore_core::DataType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_surface(dir: &Path, size: usize) -> PathBuf {
    let path = dir.join(format!("surface_{}.dep", size));
    let header = RasterHeader::new(size, size, size as f64, 0.0, size as f64, 0.0, DataType::Float, -9999.0);
    let mut raster = PagedRaster::create(&path, header, RasterOptions::default()).unwrap();
    for row in 0..size {
        let values: Vec<f64> = (0..size)
            .map(|col| (row + col) as f64 + ((row * 7 + col * 13) % 100) as f64 / 10.0)
            .collect();
        raster.set_row_values(row, &values).unwrap();
    }
    raster.close().unwrap();
    path
}

fn open_small_block(path: &Path, size: usize) -> PagedRaster {
    let options = RasterOptions {
        block_size: Some(size * 8),
        ..RasterOptions::default()
    };
    PagedRaster::open_with(path, AccessMode::ReadOnly, options).unwrap()
}

fn bench_row_orders(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("block_window");

    for size in [128usize, 256, 512].iter() {
        let path = create_surface(dir.path(), *size);
        let mut shuffled: Vec<usize> = (0..*size).collect();
        shuffled.shuffle(&mut StdRng::seed_from_u64(1));

        group.bench_with_input(BenchmarkId::new("sequential", size), size, |b, &n| {
            b.iter(|| {
                let mut raster = open_small_block(&path, n);
                let mut sum = 0.0;
                for row in 0..n as isize {
                    for col in 0..n as isize {
                        sum += raster.get_value(row, col);
                    }
                }
                black_box(sum)
            })
        });

        group.bench_with_input(BenchmarkId::new("reversed", size), size, |b, &n| {
            b.iter(|| {
                let mut raster = open_small_block(&path, n);
                let mut sum = 0.0;
                for row in (0..n as isize).rev() {
                    for col in 0..n as isize {
                        sum += raster.get_value(row, col);
                    }
                }
                black_box(sum)
            })
        });

        group.bench_with_input(BenchmarkId::new("random_rows", size), size, |b, &n| {
            b.iter(|| {
                let mut raster = open_small_block(&path, n);
                let mut sum = 0.0;
                for &row in &shuffled {
                    for col in 0..n as isize {
                        sum += raster.get_value(row as isize, col);
                    }
                }
                black_box(sum)
            })
        });

        group.bench_with_input(BenchmarkId::new("3x3_window", size), size, |b, &n| {
            b.iter(|| {
                let mut raster = open_small_block(&path, n);
                let mut sum = 0.0;
                for row in 0..n as isize {
                    for col in 0..n as isize {
                        for dr in -1..=1 {
                            for dc in -1..=1 {
                                sum += raster.get_value(row + dr, col + dc);
                            }
                        }
                    }
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_row_orders);
criterion_main!(benches);
