//! gridstore CLI - inspect and convert paged rasters and vector files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use gridstore_core::progress::ProgressSink;
use gridstore_core::raster::{AccessMode, PagedRaster};
use gridstore_formats::geotiff::{export_geotiff, import_geotiff};
use gridstore_formats::las::LasReader;
use gridstore_formats::shapefile::ShapeFile;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "gridstore")]
#[command(author, version, about = "Paged raster storage and geospatial file codecs", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header of a raster
    Info {
        /// Raster header file (.dep)
        input: PathBuf,
        /// Print the header as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute the statistics sidecar of a raster
    Stats {
        /// Raster header file (.dep)
        input: PathBuf,
    },
    /// Value below which a percentage of the valid cells fall
    Percentile {
        /// Raster header file (.dep)
        input: PathBuf,
        /// Percentage in 0-100
        percent: f64,
    },
    /// Convert a GeoTIFF into a raster
    ImportTiff {
        /// Input GeoTIFF
        input: PathBuf,
        /// Output raster header file (.dep)
        output: PathBuf,
    },
    /// Convert a raster into a GeoTIFF
    ExportTiff {
        /// Input raster header file (.dep)
        input: PathBuf,
        /// Output GeoTIFF
        output: PathBuf,
    },
    /// Summarise a LAS point cloud
    LasInfo {
        /// Input LAS file
        input: PathBuf,
        /// Number of points to print
        #[arg(short, long, default_value = "0")]
        points: usize,
    },
    /// Summarise a shapefile
    ShpInfo {
        /// Input shapefile (.shp)
        input: PathBuf,
        /// Number of records to print
        #[arg(short, long, default_value = "0")]
        records: usize,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Forwards percentage progress from the storage layer to a progress bar.
struct BarSink(ProgressBar);

impl BarSink {
    fn new() -> Self {
        let pb = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos:>3}%") {
            pb.set_style(style.progress_chars("=> "));
        }
        Self(pb)
    }
}

impl ProgressSink for BarSink {
    fn progress(&self, label: &str, percent: u8) {
        self.0.set_message(label.to_string());
        self.0.set_position(percent as u64);
    }
}

fn open_raster(path: &Path) -> Result<PagedRaster> {
    PagedRaster::open(path, AccessMode::ReadOnly).with_context(|| format!("Failed to open raster {}", path.display()))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn raster_info(input: &Path, json: bool) -> Result<()> {
    debug!(path = %input.display(), "reading header");
    let raster = PagedRaster::open_info(input).with_context(|| format!("Failed to open raster {}", input.display()))?;
    let header = raster.header();
    if json {
        println!("{}", serde_json::to_string_pretty(header)?);
        return Ok(());
    }
    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", header.cols, header.rows, header.rows * header.cols);
    println!("Data type: {:?}", header.data_type);
    println!("Data scale: {:?}", header.data_scale);
    println!("Cell size: {} x {}", raster.cell_size_x(), raster.cell_size_y());
    println!(
        "Bounds: N {} S {} E {} W {}",
        header.north, header.south, header.east, header.west
    );
    println!("Projection: {}", header.projection);
    println!("XY units: {}  Z units: {}", header.xy_units, header.z_units);
    println!("NoData: {}", header.nodata);
    println!("Range: {} .. {}", header.minimum, header.maximum);
    println!("Display range: {} .. {}", header.display_minimum, header.display_maximum);
    println!("Palette: {}", header.preferred_palette);
    println!("Byte order: {:?}", header.byte_order);
    for entry in header.metadata() {
        println!("Metadata: {}", entry);
    }
    Ok(())
}

fn raster_stats(input: &Path) -> Result<()> {
    let mut raster = open_raster(input)?;
    let sink = Arc::new(BarSink::new());
    raster.set_progress_sink(sink.clone());
    let stats = raster.create_stats_file().context("Failed to compute statistics")?;
    sink.0.finish_and_clear();

    match stats {
        Some(s) => {
            println!("Min: {}", s.minimum);
            println!("Max: {}", s.maximum);
            println!("Mean: {:.6}", s.mean);
            println!("Median: {:.6}", s.median);
            println!("Mode: {:.6}", s.mode);
            println!("Std dev: {:.6}", s.std_dev);
            println!("Valid cells: {}", s.num_valid_cells);
            println!("Histogram: {} bins of width {}", s.histogram.len(), s.bin_width);
            println!("Written to: {}", raster.stats_path().display());
        }
        None => println!("No statistics (RGB raster or no valid cells)"),
    }
    Ok(())
}

fn las_info(input: &Path, points: usize) -> Result<()> {
    let mut reader = LasReader::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let h = reader.header().clone();
    println!("File: {}", input.display());
    println!("Version: {}", h.version());
    println!("System: {}  Software: {}", h.system_identifier, h.generating_software);
    println!("Created: day {} of {}", h.creation_day, h.creation_year);
    println!("Point format: {} ({} bytes per record)", h.point_format, h.point_record_length);
    println!("Points: {}", h.num_points);
    println!("Points by return: {:?}", h.points_by_return);
    println!(
        "Bounds: X {} .. {}  Y {} .. {}  Z {} .. {}",
        h.min_x, h.max_x, h.min_y, h.max_y, h.min_z, h.max_z
    );
    for vlr in reader.vlrs() {
        println!(
            "VLR {}/{}: {} ({} bytes)",
            vlr.user_id,
            vlr.record_id,
            vlr.description,
            vlr.data.len()
        );
    }
    for i in 0..points.min(reader.num_points()) {
        if let Some(p) = reader.point_record(i)? {
            println!(
                "{:>8}  {:.3} {:.3} {:.3}  i={} class={} return {}/{}",
                i,
                p.x,
                p.y,
                p.z,
                p.intensity,
                p.classification.class,
                p.returns.return_number,
                p.returns.number_of_returns
            );
        }
    }
    Ok(())
}

fn shp_info(input: &Path, records: usize) -> Result<()> {
    let shp = ShapeFile::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let bbox = shp.bbox();
    println!("File: {}", input.display());
    println!("Shape type: {}", shp.shape_type());
    println!("Records: {}", shp.num_records());
    println!("Extent: {} {} .. {} {}", bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y);
    if let Some((lo, hi)) = shp.z_range() {
        println!("Z range: {} .. {}", lo, hi);
    }
    if let Some((lo, hi)) = shp.m_range() {
        println!("M range: {} .. {}", lo, hi);
    }
    match shp.crs() {
        Some(crs) => println!("Projection: {} ({:?})", crs, shp.xy_units()),
        None => println!("Projection: none"),
    }
    if let Some(table) = shp.attributes() {
        println!("Fields: {}", table.field_names().join(", "));
    }
    for (i, record) in shp.records().iter().take(records).enumerate() {
        let summary = record.summary();
        let mut line = format!("{:>6}  {:<12} {} points", summary.number, summary.shape_type.to_string(), summary.points);
        if let Some(table) = shp.attributes() {
            if let Ok(values) = table.record(i) {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                line.push_str("  ");
                line.push_str(&values.join(" | "));
            }
        }
        println!("{}", line);
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input, json } => raster_info(&input, json)?,

        Commands::Stats { input } => raster_stats(&input)?,

        Commands::Percentile { input, percent } => {
            anyhow::ensure!((0.0..=100.0).contains(&percent), "percent must be within 0-100, got {}", percent);
            let mut raster = open_raster(&input)?;
            let pb = spinner("Reading statistics...");
            let value = raster.percentile(percent).context("Failed to read statistics")?;
            pb.finish_and_clear();
            match value {
                Some(v) => println!("{}th percentile: {}", percent, v),
                None => println!("No statistics (RGB raster or no valid cells)"),
            }
        }

        Commands::ImportTiff { input, output } => {
            let start = Instant::now();
            let sink = BarSink::new();
            import_geotiff(&input, &output, Some(&sink))
                .with_context(|| format!("Failed to import {}", input.display()))?;
            sink.0.finish_and_clear();
            done("Raster", &output, start.elapsed());
        }

        Commands::ExportTiff { input, output } => {
            let start = Instant::now();
            let sink = BarSink::new();
            export_geotiff(&input, &output, Some(&sink))
                .with_context(|| format!("Failed to export {}", input.display()))?;
            sink.0.finish_and_clear();
            done("GeoTIFF", &output, start.elapsed());
        }

        Commands::LasInfo { input, points } => las_info(&input, points)?,

        Commands::ShpInfo { input, records } => shp_info(&input, records)?,
    }

    Ok(())
}
