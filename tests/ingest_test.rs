//! End-to-end tests: sample files on disk through the scanner into the store.

use binscope::core::{Aggregation, SampleStore, StoreConfig, StoreError};
use binscope::scanner::{npy, DirectoryScanner, DirectoryWatcher, SampleGenerator, WatchEvent};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

fn write_sample(dir: &Path, name: &str, values: &[f64], mtime: f64) -> PathBuf {
    let path = dir.join(name);
    npy::write_sample_array(&path, values).unwrap();
    set_mtime(&path, mtime);
    path
}

fn set_mtime(path: &Path, mtime: f64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs_f64(mtime))
        .unwrap();
}

fn name_of(dir: &Path) -> String {
    dir.display().to_string()
}

fn scan_into(store: &mut SampleStore, dir: &Path) -> Result<binscope::IngestReport, StoreError> {
    let limit = store.config().history_capacity;
    let listing = DirectoryScanner::new().scan(dir, limit).unwrap();
    store.ingest(&name_of(dir), listing.into_entries())
}

#[test]
fn test_two_sources_reduce_latest_bin() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    write_sample(a.path(), "a0.npy", &[1.0; 4], 100.2);
    write_sample(a.path(), "a1.npy", &[2.0; 4], 101.3);
    write_sample(a.path(), "a2.npy", &[3.0; 4], 102.4);
    write_sample(b.path(), "b1.npy", &[20.0; 4], 101.5);
    write_sample(b.path(), "b2.npy", &[30.0; 4], 102.6);

    let mut store = SampleStore::new(StoreConfig::new(1.0, 10, 4)).unwrap();
    store.add_source(&name_of(a.path()));
    store.add_source(&name_of(b.path()));

    let report = scan_into(&mut store, a.path()).unwrap();
    assert_eq!(report.stored, 3);
    let report = scan_into(&mut store, b.path()).unwrap();
    assert_eq!(report.stored, 2);
    assert_eq!(store.len(), 3);

    let both = [name_of(a.path()), name_of(b.path())];
    let sum = store.query(&both, Aggregation::Sum, 1).unwrap();
    assert_eq!(sum.to_rows(), vec![vec![33.0; 4]]);
    assert!((sum.times[0] - 102.6).abs() < 1e-6);

    let mean = store.query(&both, Aggregation::Mean, 1).unwrap();
    assert_eq!(mean.to_rows(), vec![vec![16.5; 4]]);

    let rows = store.query(&both, Aggregation::None, 1).unwrap();
    assert_eq!(rows.to_rows(), vec![vec![3.0; 4], vec![30.0; 4]]);
    assert_eq!(rows.sources, both.to_vec());

    let only_b = store.query(&[name_of(b.path())], Aggregation::Max, 1).unwrap();
    assert_eq!(only_b.to_rows(), vec![vec![30.0; 4]]);
}

#[test]
fn test_rescan_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(dir.path(), "0.npy", &[1.0, 2.0], 10.5);
    write_sample(dir.path(), "1.npy", &[3.0, 4.0], 11.5);

    let mut store = SampleStore::new(StoreConfig::new(1.0, 10, 2)).unwrap();
    scan_into(&mut store, dir.path()).unwrap();
    let report = scan_into(&mut store, dir.path()).unwrap();

    assert_eq!(report.stored, 0);
    assert_eq!(report.duplicates, 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_partial_write_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.npy");
    let bytes = npy::encode(&[5.0, 6.0, 7.0]);
    std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
    set_mtime(&path, 200.0);

    let mut store = SampleStore::new(StoreConfig::new(1.0, 10, 3)).unwrap();
    let report = scan_into(&mut store, dir.path()).unwrap();
    assert_eq!(report.stored, 0);
    assert_eq!(report.load_failures, 1);
    assert_eq!(report.partial_writes, 1);
    assert!(store.is_empty());

    std::fs::write(&path, &bytes).unwrap();
    set_mtime(&path, 200.0);
    let report = scan_into(&mut store, dir.path()).unwrap();
    assert_eq!(report.stored, 1);

    let frame = store
        .query(&[name_of(dir.path())], Aggregation::Mean, 1)
        .unwrap();
    assert_eq!(frame.to_rows(), vec![vec![5.0, 6.0, 7.0]]);
}

#[test]
fn test_wrong_sample_size_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(dir.path(), "short.npy", &[1.0, 2.0], 50.0);
    write_sample(dir.path(), "good.npy", &[1.0, 2.0, 3.0], 51.0);
    std::fs::write(dir.path().join("garbage.npy"), b"not a numpy file").unwrap();
    set_mtime(&dir.path().join("garbage.npy"), 52.0);

    let mut store = SampleStore::new(StoreConfig::new(1.0, 10, 3)).unwrap();
    let report = scan_into(&mut store, dir.path()).unwrap();

    assert_eq!(report.stored, 1);
    assert_eq!(report.load_failures, 2);
    assert_eq!(store.resident_bins().len(), 1);
    assert_eq!(store.resident_bins()[0].id, 51);
}

#[test]
fn test_eviction_keeps_newest_bins() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(dir.path(), "10.npy", &[10.0], 10.1);
    write_sample(dir.path(), "11.npy", &[11.0], 11.1);

    let mut store = SampleStore::new(StoreConfig::new(1.0, 2, 1)).unwrap();
    scan_into(&mut store, dir.path()).unwrap();

    write_sample(dir.path(), "12.npy", &[12.0], 12.1);
    let report = scan_into(&mut store, dir.path()).unwrap();
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.stored, 1);
    assert_eq!(report.evicted, 1);

    let ids: Vec<i64> = store.resident_bins().iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![11, 12]);
}

#[test]
fn test_window_resamples_history() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        let t = i as f64;
        write_sample(dir.path(), &format!("{i}.npy"), &[t, 10.0 * t], t + 0.5);
    }

    let mut store = SampleStore::new(StoreConfig::new(1.0, 10, 2)).unwrap();
    scan_into(&mut store, dir.path()).unwrap();

    let frame = store
        .query(&[name_of(dir.path())], Aggregation::Mean, 5)
        .unwrap();
    assert_eq!(frame.rows(), 5);
    assert_eq!(frame.times, vec![0.5, 1.5, 2.5, 3.5, 4.5]);
    for (i, row) in frame.to_rows().iter().enumerate() {
        assert!((row[0] - i as f64).abs() < 1e-9);
        assert!((row[1] - 10.0 * i as f64).abs() < 1e-9);
    }
}

#[test]
fn test_generated_samples_through_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let generator = SampleGenerator::new(dir.path(), 720).unwrap();
    generator.write_next().unwrap();

    let mut watcher =
        DirectoryWatcher::new(vec![dir.path().to_path_buf()], Duration::from_millis(20));
    watcher.start().unwrap();
    let event = watcher
        .receiver()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(event, WatchEvent::Changed(dir.path().to_path_buf()));

    let mut store = SampleStore::new(StoreConfig::default()).unwrap();
    let report = scan_into(&mut store, dir.path()).unwrap();
    assert_eq!(report.stored, 1);

    let frame = store
        .query(&[name_of(dir.path())], Aggregation::Mean, 1)
        .unwrap();
    assert_eq!(frame.rows(), 1);
    assert_eq!(frame.sample_size(), 720);
    assert!(frame.values.iter().all(|v| (-1.0..=1.0).contains(v)));

    watcher.stop();
}
