//! End-to-end: sample CSV -> stratified partition -> split CSVs -> read back.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;

use sparsetree_data::{PartitionConfig, SampleReader, SplitPrefix, SplitSize, SplitWriter};
use tempfile::TempDir;

fn write_samples(dir: &std::path::Path) -> std::path::PathBuf {
    let mut csv = String::from("matrix,nnz,density,format\n");
    for i in 0..30 {
        let format = match i % 3 {
            0 => 0,
            1 => 1,
            _ => 4,
        };
        writeln!(csv, "m{i:03},{},{},{format}", i * 100, f64::from(i) / 64.0).unwrap();
    }
    let path = dir.join("samples.csv");
    fs::write(&path, csv).unwrap();
    path
}

#[test]
fn partition_round_trip_through_csv() {
    let dir = TempDir::new().unwrap();
    let input = write_samples(dir.path());

    // 1. Read samples
    let table = SampleReader::new(&input)
        .with_label_column("format")
        .read()
        .expect("fixture should parse");
    assert_eq!(table.n_samples(), 30);
    assert_eq!(table.feature_names(), &["nnz".to_string(), "density".to_string()]);
    let labels = table.labels().unwrap();

    // 2. Partition per class
    let cfg = PartitionConfig::new(
        SplitSize::Fraction(0.6),
        SplitSize::Fraction(0.2),
        SplitSize::Fraction(0.2),
    )
    .unwrap()
    .with_per_class(true)
    .with_seed(7);
    let splits = cfg.partition(table.features(), labels, table.ids()).unwrap();
    assert_eq!(splits.train.len(), 18);
    assert_eq!(splits.val.len(), 6);
    assert_eq!(splits.test.len(), 6);

    // 3. Write CSVs
    let out = dir.path().join("splits");
    let writer = SplitWriter::new(&out, SplitPrefix::new("formats".into()).unwrap()).unwrap();
    let paths = writer.write(table.feature_names(), &splits).unwrap();

    // 4. Read each file back and check it matches its partition
    let mut all_ids = HashSet::new();
    for (path, part) in [
        (&paths.train, &splits.train),
        (&paths.val, &splits.val),
        (&paths.test, &splits.test),
    ] {
        let back = SampleReader::new(path)
            .with_label_column("label")
            .read()
            .unwrap();
        assert_eq!(back.ids(), part.ids.as_slice());
        assert_eq!(back.features(), part.features.as_slice());
        assert_eq!(back.labels().unwrap(), part.labels.as_slice());
        assert_eq!(back.feature_names(), table.feature_names());
        for id in back.ids() {
            assert!(all_ids.insert(id.clone()));
        }
    }
    assert_eq!(all_ids.len(), 30);
}

#[test]
fn split_files_are_named_by_prefix() {
    let dir = TempDir::new().unwrap();
    let input = write_samples(dir.path());
    let table = SampleReader::new(&input)
        .with_label_column("format")
        .read()
        .unwrap();
    let splits = PartitionConfig::new(
        SplitSize::Fraction(0.8),
        SplitSize::Fraction(0.2),
        SplitSize::Fraction(0.0),
    )
    .unwrap()
    .partition(table.features(), table.labels().unwrap(), table.ids())
    .unwrap();

    let writer = SplitWriter::new(dir.path(), SplitPrefix::new("run_1".into()).unwrap()).unwrap();
    writer.write(table.feature_names(), &splits).unwrap();
    for name in ["run_1_train.csv", "run_1_val.csv", "run_1_test.csv"] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }
}
