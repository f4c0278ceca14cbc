//! GeoTIFF files written here are checked against the `tiff` crate's decoder
//! and carried through raster import/export.

use approx::assert_relative_eq;
use gridstore_core::progress::CancelFlag;
use gridstore_core::raster::{AccessMode, GeoTransform};
use gridstore_core::{DataType, PagedRaster, RasterHeader, RasterOptions};
use gridstore_formats::geotiff::{export_geotiff, import_geotiff, GeoTiffReader, GeoTiffWriter, SampleKind, SampleType};
use gridstore_formats::FormatError;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tiff::decoder::{Decoder, DecodingResult};

fn write_grid(path: &Path, sample_type: SampleType, values: &[f64]) {
    let mut writer = GeoTiffWriter::new(path, 3, 4, sample_type);
    writer
        .set_geo_transform(GeoTransform::new(500_000.0, 4_200_000.0, 30.0, -30.0))
        .set_nodata(-9999.0)
        .set_epsg(32617);
    writer.write(values).unwrap();
}

#[test]
fn test_f32_output_decodes_with_tiff_crate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.tif");
    let values: Vec<f64> = (0..12).map(|i| i as f64 * 1.5 - 3.0).collect();
    write_grid(&path, SampleType::F32, &values);

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (4, 3));
    match decoder.read_image().unwrap() {
        DecodingResult::F32(data) => {
            assert_eq!(data.len(), values.len());
            for (got, want) in data.iter().zip(&values) {
                assert_relative_eq!(*got as f64, *want);
            }
        }
        _ => panic!("expected f32 samples"),
    }
}

#[test]
fn test_i16_output_decodes_with_tiff_crate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let values: Vec<f64> = vec![-5.0, 0.0, 7.0, 120.0, -300.0, 42.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    write_grid(&path, SampleType::I16, &values);

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    match decoder.read_image().unwrap() {
        DecodingResult::I16(data) => {
            let expected: Vec<i16> = values.iter().map(|v| *v as i16).collect();
            assert_eq!(data, expected);
        }
        _ => panic!("expected i16 samples"),
    }
}

#[test]
fn test_reader_recovers_georeferencing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.tif");
    let values: Vec<f64> = (0..12).map(|i| i as f64).collect();
    write_grid(&path, SampleType::F64, &values);

    let mut reader = GeoTiffReader::open(&path).unwrap();
    assert_eq!(reader.rows(), 3);
    assert_eq!(reader.columns(), 4);
    assert_eq!(reader.sample_kind(), Some(SampleKind::F64));
    assert_eq!(reader.epsg(), Some(32617));
    assert_relative_eq!(reader.nodata(), -9999.0);
    assert_relative_eq!(reader.north(), 4_200_000.0);
    assert_relative_eq!(reader.south(), 4_200_000.0 - 90.0);
    assert_relative_eq!(reader.west(), 500_000.0);
    assert_relative_eq!(reader.east(), 500_120.0);

    assert_eq!(reader.row_data(1).unwrap(), Some(vec![4.0, 5.0, 6.0, 7.0]));
    assert!(matches!(reader.row_data(3), Err(FormatError::IndexOutOfRange { .. })));
}

#[test]
fn test_strip_past_end_of_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.tif");
    write_grid(&path, SampleType::F32, &[0.0; 12]);

    // point the single strip far past the end of the file
    let mut bytes = std::fs::read(&path).unwrap();
    let ifd = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let count = u16::from_be_bytes([bytes[ifd], bytes[ifd + 1]]) as usize;
    let entry = (0..count)
        .map(|i| ifd + 2 + i * 12)
        .find(|&e| u16::from_be_bytes([bytes[e], bytes[e + 1]]) == 273)
        .unwrap();
    bytes[entry + 8..entry + 12].copy_from_slice(&0xFFFF_FF00u32.to_be_bytes());
    std::fs::write(&path, bytes).unwrap();

    let mut reader = GeoTiffReader::open(&path).unwrap();
    assert!(matches!(reader.row_data(0), Err(FormatError::InvalidTiff { .. })));
}

fn source_raster(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("source.dep");
    let mut header = RasterHeader::new(5, 6, 100.0, 50.0, 60.0, 0.0, DataType::Float, -32768.0);
    header.projection = "EPSG:26917".to_string();
    let mut raster = PagedRaster::create(&path, header, RasterOptions::default()).unwrap();
    for row in 0..5 {
        let values: Vec<f64> = (0..6)
            .map(|col| if row == col { -32768.0 } else { (row * 6 + col) as f64 * 0.25 })
            .collect();
        raster.set_row_values(row, &values).unwrap();
    }
    raster.close().unwrap();
    path
}

#[test]
fn test_export_then_import_preserves_grid() {
    let dir = TempDir::new().unwrap();
    let source = source_raster(&dir);
    let tif = dir.path().join("exported.tif");
    let back = dir.path().join("imported.dep");

    export_geotiff(&source, &tif, None).unwrap();
    let reader = GeoTiffReader::open(&tif).unwrap();
    assert_eq!(reader.epsg(), Some(26917));
    assert_eq!(reader.sample_kind(), Some(SampleKind::F32));

    import_geotiff(&tif, &back, None).unwrap();
    let mut original = PagedRaster::open(&source, AccessMode::ReadOnly).unwrap();
    let mut imported = PagedRaster::open(&back, AccessMode::ReadOnly).unwrap();
    assert_eq!(imported.data_type(), DataType::Float);
    assert_eq!(imported.rows(), 5);
    assert_eq!(imported.cols(), 6);
    assert_eq!(imported.header().projection, "EPSG:26917");
    assert_relative_eq!(imported.header().north, 100.0);
    assert_relative_eq!(imported.header().south, 50.0);
    assert_relative_eq!(imported.header().east, 60.0);
    assert_relative_eq!(imported.header().west, 0.0);
    assert_relative_eq!(imported.nodata(), -32768.0);

    for row in 0..5 {
        assert_eq!(imported.get_row_values(row).unwrap(), original.get_row_values(row).unwrap());
    }
}

#[test]
fn test_cancelled_import() {
    let dir = TempDir::new().unwrap();
    let source = source_raster(&dir);
    let tif = dir.path().join("exported.tif");
    export_geotiff(&source, &tif, None).unwrap();

    let flag = CancelFlag::new();
    flag.cancel();
    let err = import_geotiff(&tif, dir.path().join("never.dep"), Some(&flag)).unwrap_err();
    assert!(matches!(err, FormatError::Cancelled));
}
