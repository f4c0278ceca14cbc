//! Conversion between GeoTIFF files and paged rasters.

use std::path::Path;

use gridstore_core::progress::{ProgressSink, ProgressTicker};
use gridstore_core::raster::{AccessMode, DataScale, NOT_SPECIFIED};
use gridstore_core::{DataType, PagedRaster, RasterHeader, RasterOptions};
use tracing::info;

use crate::error::{FormatError, Result};
use crate::geotiff::keys::{key_ids, GeoKey};
use crate::geotiff::reader::{GeoTiffReader, SampleKind};
use crate::geotiff::writer::{GeoTiffWriter, SampleType};

/// Storage type able to hold every value of a TIFF sample layout.
pub fn data_type_for(kind: SampleKind) -> DataType {
    match kind {
        SampleKind::U8 => DataType::Byte,
        SampleKind::I8 | SampleKind::I16 => DataType::Integer,
        SampleKind::U16 | SampleKind::F32 => DataType::Float,
        SampleKind::U32 | SampleKind::I32 | SampleKind::I64 | SampleKind::F64 => DataType::Double,
        SampleKind::PackedRgb { .. } => DataType::Double,
    }
}

/// TIFF sample type matching a storage type.
pub fn sample_type_for(data_type: DataType) -> SampleType {
    match data_type {
        DataType::Double => SampleType::F64,
        DataType::Float => SampleType::F32,
        DataType::Integer => SampleType::I16,
        DataType::Byte => SampleType::U8,
    }
}

/// Copy the first image of a GeoTIFF into a new raster at `dest`.
pub fn import_geotiff(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    progress: Option<&dyn ProgressSink>,
) -> Result<()> {
    let mut reader = GeoTiffReader::open(source.as_ref())?;
    let kind = reader.sample_kind().ok_or(FormatError::UnsupportedSampleType {
        bps: reader.bits_per_sample(),
        sf: reader.sample_format(),
    })?;

    let mut header = RasterHeader::new(
        reader.rows(),
        reader.columns(),
        reader.north(),
        reader.south(),
        reader.east(),
        reader.west(),
        data_type_for(kind),
        reader.nodata(),
    );
    if matches!(kind, SampleKind::PackedRgb { .. }) {
        header.data_scale = DataScale::Rgb;
    }
    if let Some(crs) = reader.crs() {
        header.projection = crs.identifier();
    }

    let mut raster = PagedRaster::create(dest.as_ref(), header, RasterOptions::default())?;
    let mut ticker = ProgressTicker::new(reader.rows());
    for row in 0..reader.rows() {
        let values = reader.row_data(row)?.ok_or(FormatError::UnsupportedSampleType {
            bps: reader.bits_per_sample(),
            sf: reader.sample_format(),
        })?;
        raster.set_row_values(row, &values)?;
        if ticker.tick(progress, "Importing GeoTIFF", row + 1) {
            return Err(FormatError::Cancelled);
        }
    }
    raster.close()?;

    info!(
        source = %source.as_ref().display(),
        dest = %dest.as_ref().display(),
        rows = reader.rows(),
        cols = reader.columns(),
        "imported GeoTIFF"
    );
    Ok(())
}

/// Write the raster at `source` as a GeoTIFF.
///
/// A projection of the form `EPSG:<code>` becomes GeoKeys; any other
/// projection text is kept as the GeoTIFF citation.
pub fn export_geotiff(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    progress: Option<&dyn ProgressSink>,
) -> Result<()> {
    let mut raster = PagedRaster::open(source.as_ref(), AccessMode::ReadOnly)?;
    let rows = raster.rows();

    let mut writer = GeoTiffWriter::new(dest.as_ref(), rows, raster.cols(), sample_type_for(raster.data_type()));
    writer
        .set_geo_transform(raster.geo_transform())
        .set_nodata(raster.nodata());

    let projection = raster.header().projection.trim().to_string();
    match epsg_from_projection(&projection) {
        Some(code) => {
            writer.set_epsg(code);
        }
        None if !projection.is_empty() && projection != NOT_SPECIFIED => {
            writer.add_geo_key(GeoKey::ascii(key_ids::GT_CITATION, projection));
        }
        None => {}
    }

    let mut ticker = ProgressTicker::new(rows);
    writer.write_rows(|row| {
        let values = raster.get_row_values(row)?;
        if ticker.tick(progress, "Exporting GeoTIFF", row + 1) {
            return Err(FormatError::Cancelled);
        }
        Ok(values)
    })?;

    info!(
        source = %source.as_ref().display(),
        dest = %dest.as_ref().display(),
        "exported GeoTIFF"
    );
    Ok(())
}

fn epsg_from_projection(projection: &str) -> Option<u16> {
    let code = projection.strip_prefix("EPSG:")?;
    code.trim().parse().ok()
}
