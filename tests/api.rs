//! Public API tests: entry points, validation and the CSV loader.

use std::io::Write;

use brute_knn::{
    compute, compute_with, load_csv, Backend, Dataset, KnnConfig, KnnError, LoadOptions,
    Sequential, DEFAULT_K,
};
use tempfile::NamedTempFile;

fn write_csv(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_compute_default_backend() {
    let ds = Dataset::from_points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]]).unwrap();
    let output = compute(&ds, 2).unwrap();
    assert_eq!(output.backend, "thread-pool");
    assert_eq!(output.table.len(), 4);
    assert_eq!(output.table.row(3), &[1, 2]);
}

#[test]
fn test_default_k() {
    assert_eq!(DEFAULT_K, 3);
    assert_eq!(KnnConfig::default().k, DEFAULT_K);
}

#[test]
fn test_k_must_be_below_point_count() {
    let ds = Dataset::from_points(&[[0.0], [1.0], [2.0]]).unwrap();
    for k in [0, 3, 10] {
        let err = compute_with(&ds, &KnnConfig { k }, &Sequential).unwrap_err();
        assert!(matches!(err, KnnError::InvalidConfig(_)), "k={}: {}", k, err);
    }
    assert!(compute_with(&ds, &KnnConfig { k: 2 }, &Sequential).is_ok());
}

#[test]
fn test_empty_dataset_rejected() {
    let ds = Dataset::from_flat(Vec::new(), 3).unwrap();
    assert!(ds.is_empty());
    let err = compute(&ds, 1).unwrap_err();
    assert!(matches!(err, KnnError::InvalidDataset(_)));
}

#[test]
fn test_validation_runs_before_backend() {
    // A device that could never fit the data is still not reached for a bad k.
    let ds = Dataset::from_points(&[[0.0], [1.0]]).unwrap();
    let backend = Backend::Device {
        threads: 4,
        block_size: 2,
    }
    .build()
    .unwrap();
    let err = compute_with(&ds, &KnnConfig { k: 2 }, backend.as_ref()).unwrap_err();
    assert!(matches!(err, KnnError::InvalidConfig(_)));
}

#[test]
fn test_load_csv_reads_requested_records() {
    let file = write_csv("0,0,0\n1,0,0\n0,2,0\n0,0,3\n9,9,9\n");
    let ds = load_csv(
        file.path(),
        &LoadOptions {
            dim: 3,
            max_points: Some(4),
        },
    )
    .unwrap();
    assert_eq!(ds.len(), 4);
    assert_eq!(ds.point(3), &[0.0, 0.0, 3.0]);

    let output = compute_with(&ds, &KnnConfig { k: 1 }, &Sequential).unwrap();
    assert_eq!(output.table.as_flat(), &[1, 0, 0, 0]);
}

#[test]
fn test_load_csv_pads_short_file() {
    let file = write_csv("1,2\n3,4\n");
    let ds = load_csv(
        file.path(),
        &LoadOptions {
            dim: 2,
            max_points: Some(5),
        },
    )
    .unwrap();
    assert_eq!(ds.len(), 5);
    for i in 2..5 {
        assert_eq!(ds.point(i), &[0.0, 0.0]);
    }
}

#[test]
fn test_load_csv_all_lines() {
    let file = write_csv("1,2\n3,4\n5,6\n");
    let ds = load_csv(
        file.path(),
        &LoadOptions {
            dim: 2,
            max_points: None,
        },
    )
    .unwrap();
    assert_eq!(ds.len(), 3);
}

#[test]
fn test_load_csv_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.csv");
    let err = load_csv(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, KnnError::Io { .. }));
    assert!(err.to_string().contains("absent.csv"), "{}", err);
}

#[test]
fn test_default_load_options() {
    let opts = LoadOptions::default();
    assert_eq!(opts.dim, 32);
    assert_eq!(opts.max_points, Some(1000));
}
