mod common;

use common::*;
use greenscan::core::clip::ClipProcessor;
use greenscan::core::CancellationToken;
use greenscan::io::band_store;
use greenscan::{AoiShape, GeoTransform, GreenscanError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PIXEL: f64 = 10.0;
const ORIGIN_X: f64 = 440000.0;
const ORIGIN_Y: f64 = 4480000.0;

fn tile_transform() -> GeoTransform {
    GeoTransform::from_gdal([ORIGIN_X, PIXEL, 0.0, ORIGIN_Y, 0.0, -PIXEL])
}

fn write_tile(dir: &Path, size: usize) -> Vec<PathBuf> {
    BAND_CODES
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let name = format!("T30TVK_20221001T105031_{}_10m.jp2", code);
            write_u16_band(&dir.join(name), tile_transform(), (size, size), 1000 * (i as u16 + 1))
        })
        .collect()
}

fn check_aligned_to_aoi(dir: &Path, size: usize) {
    let raw_dir = dir.join("raw");
    let bands = write_tile(&raw_dir, size);

    // 2 km x 2 km, deliberately off the pixel grid
    let (min_x, min_y) = (ORIGIN_X + 3003.0, ORIGIN_Y - 6997.0);
    let (max_x, max_y) = (min_x + 2000.0, min_y + 2000.0);
    let aoi_path = write_utm_aoi(&dir.join("aoi.geojson"), min_x, min_y, max_x, max_y);

    let processor = ClipProcessor::new(AoiShape::load(&aoi_path).unwrap());
    let out_dir = dir.join("processed");
    let clipped = processor.clip_all(&bands, &out_dir, &CancellationToken::new()).unwrap();
    assert_eq!(clipped.len(), 4);

    let first = &clipped[0];
    for (band, code) in clipped.iter().zip(BAND_CODES) {
        assert_eq!(band.band_code, code);
        assert!(band.path.file_name().unwrap().to_str().unwrap().contains(code));
        assert_eq!((band.width, band.height), (first.width, first.height));
        assert_eq!(band.georef, first.georef);

        let info = band_store::read_info(&band.path).unwrap();
        assert_eq!(info.dtype, gdal::raster::GdalDataType::UInt16);
        let gt = info.georef.transform;
        assert_eq!(gt.pixel_width, PIXEL);
        assert_eq!(gt.pixel_height, -PIXEL);

        let out_min_x = gt.top_left_x;
        let out_max_y = gt.top_left_y;
        let out_max_x = out_min_x + info.width as f64 * PIXEL;
        let out_min_y = out_max_y - info.height as f64 * PIXEL;
        assert!((out_min_x - min_x).abs() <= PIXEL, "min_x {} vs {}", out_min_x, min_x);
        assert!((out_max_x - max_x).abs() <= PIXEL, "max_x {} vs {}", out_max_x, max_x);
        assert!((out_min_y - min_y).abs() <= PIXEL, "min_y {} vs {}", out_min_y, min_y);
        assert!((out_max_y - max_y).abs() <= PIXEL, "max_y {} vs {}", out_max_y, max_y);
    }
}

#[test]
fn test_four_band_clip_matches_aoi_extent() {
    init_logging();
    let dir = TempDir::new().unwrap();
    check_aligned_to_aoi(dir.path(), 1098);
}

#[test]
#[ignore = "writes four full-size 10980x10980 tiles"]
fn test_full_tile_clip_matches_aoi_extent() {
    init_logging();
    let dir = TempDir::new().unwrap();
    check_aligned_to_aoi(dir.path(), 10980);
}

#[test]
fn test_clip_all_is_idempotent() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let bands = write_tile(&dir.path().join("raw"), 400);
    let aoi_path = write_utm_aoi(
        &dir.path().join("aoi.geojson"),
        ORIGIN_X + 1005.0,
        ORIGIN_Y - 2995.0,
        ORIGIN_X + 2005.0,
        ORIGIN_Y - 1995.0,
    );
    let processor = ClipProcessor::new(AoiShape::load(&aoi_path).unwrap());
    let out_dir = dir.path().join("processed");
    let cancel = CancellationToken::new();

    let first = processor.clip_all(&bands, &out_dir, &cancel).unwrap();
    let first_bytes: Vec<Vec<u8>> = first.iter().map(|b| std::fs::read(&b.path).unwrap()).collect();

    let second = processor.clip_all(&bands, &out_dir, &cancel).unwrap();
    let second_bytes: Vec<Vec<u8>> = second.iter().map(|b| std::fs::read(&b.path).unwrap()).collect();

    assert_eq!(first.iter().map(|b| &b.path).collect::<Vec<_>>(), second.iter().map(|b| &b.path).collect::<Vec<_>>());
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 4);
}

#[test]
fn test_disjoint_aoi_writes_nothing() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let bands = write_tile(&dir.path().join("raw"), 100);
    let aoi_path = write_utm_aoi(&dir.path().join("far.geojson"), 600000.0, 4300000.0, 602000.0, 4302000.0);
    let processor = ClipProcessor::new(AoiShape::load(&aoi_path).unwrap());

    let out_dir = dir.path().join("processed");
    std::fs::create_dir_all(&out_dir).unwrap();
    let target = out_dir.join("T30TVK_B02_10m.tif");

    let result = processor.clip(&bands[0], &target);
    assert!(matches!(result, Err(GreenscanError::Clip(_))));
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
}

#[test]
fn test_cancelled_clip_stops_before_work() {
    let dir = TempDir::new().unwrap();
    let bands = write_tile(&dir.path().join("raw"), 50);
    let aoi_path = write_utm_aoi(
        &dir.path().join("aoi.geojson"),
        ORIGIN_X + 100.0,
        ORIGIN_Y - 300.0,
        ORIGIN_X + 300.0,
        ORIGIN_Y - 100.0,
    );
    let processor = ClipProcessor::new(AoiShape::load(&aoi_path).unwrap());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let out_dir = dir.path().join("processed");
    let result = processor.clip_all(&bands, &out_dir, &cancel);
    assert!(matches!(result, Err(GreenscanError::Cancelled(_))));
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
}

#[test]
fn test_unreadable_band_leaves_processed_untouched() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let bands = write_tile(&dir.path().join("raw"), 100);
    std::fs::write(&bands[3], b"not a raster").unwrap();
    let aoi_path = write_utm_aoi(
        &dir.path().join("aoi.geojson"),
        ORIGIN_X + 100.0,
        ORIGIN_Y - 500.0,
        ORIGIN_X + 500.0,
        ORIGIN_Y - 100.0,
    );
    let processor = ClipProcessor::new(AoiShape::load(&aoi_path).unwrap());

    let out_dir = dir.path().join("processed");
    std::fs::create_dir_all(&out_dir).unwrap();
    std::fs::write(out_dir.join("earlier_run.tif"), b"kept").unwrap();

    let result = processor.clip_all(&bands, &out_dir, &CancellationToken::new());
    assert!(result.is_err());

    let names: Vec<String> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["earlier_run.tif"]);
    assert_eq!(std::fs::read(out_dir.join("earlier_run.tif")).unwrap(), b"kept");
}
