//! Partitioning properties on small deterministic datasets.

use std::collections::{BTreeSet, HashSet};

use sparsetree_data::{DataError, PartitionConfig, RareClassPolicy, SplitSize, Splits};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `counts[c]` rows of class `c`; feature value and id both encode the row.
fn dataset(counts: &[usize]) -> (Vec<Vec<f64>>, Vec<i32>, Vec<u32>) {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    let mut ids = Vec::new();
    let mut next = 0u32;
    for (class, &count) in counts.iter().enumerate() {
        for _ in 0..count {
            features.push(vec![f64::from(next), class as f64]);
            labels.push(class as i32);
            ids.push(next);
            next += 1;
        }
    }
    (features, labels, ids)
}

fn config(train: f64, test: f64, val: f64) -> PartitionConfig {
    PartitionConfig::new(
        SplitSize::Fraction(train),
        SplitSize::Fraction(test),
        SplitSize::Fraction(val),
    )
    .unwrap()
}

fn count_label(labels: &[i32], label: i32) -> usize {
    labels.iter().filter(|&&l| l == label).count()
}

fn assert_complete(splits: &Splits<i32, u32>, n: usize) {
    let mut seen = HashSet::new();
    for part in [&splits.train, &splits.val, &splits.test] {
        assert_eq!(part.features.len(), part.len());
        assert_eq!(part.ids.len(), part.len());
        for ((row, &label), &id) in part.features.iter().zip(&part.labels).zip(&part.ids) {
            assert!(seen.insert(id), "id {id} in two partitions");
            // Rows stay aligned with their ids and labels.
            assert_eq!(row[0], f64::from(id));
            assert_eq!(row[1], f64::from(label));
        }
    }
    assert_eq!(seen.len(), n);
}

// ---------------------------------------------------------------------------
// Stratified
// ---------------------------------------------------------------------------

/// 10 rows, two classes of 5, 0.6/0.2/0.2 per class, seed 100.
#[test]
fn balanced_classes_split_per_class() {
    let (features, labels, ids) = dataset(&[5, 5]);
    let cfg = config(0.6, 0.2, 0.2).with_per_class(true).with_seed(100);
    let splits = cfg.partition(&features, &labels, &ids).unwrap();

    assert_eq!(splits.train.len(), 6);
    assert_eq!(splits.val.len(), 2);
    assert_eq!(splits.test.len(), 2);
    for class in [0, 1] {
        assert_eq!(count_label(&splits.train.labels, class), 3);
        assert_eq!(count_label(&splits.val.labels, class), 1);
        assert_eq!(count_label(&splits.test.labels, class), 1);
    }
    assert_complete(&splits, 10);

    let again = cfg.partition(&features, &labels, &ids).unwrap();
    assert_eq!(again, splits);
}

/// A 2-row class with test share 0.5 is kept whole in train.
#[test]
fn two_row_class_stays_in_train() {
    let (features, labels, ids) = dataset(&[2, 8]);
    let splits = config(0.5, 0.5, 0.0)
        .with_per_class(true)
        .partition(&features, &labels, &ids)
        .unwrap();

    assert_eq!(count_label(&splits.train.labels, 0), 2);
    assert_eq!(count_label(&splits.test.labels, 0), 0);
    assert_eq!(count_label(&splits.train.labels, 1), 4);
    assert_eq!(count_label(&splits.test.labels, 1), 4);
    assert!(splits.val.is_empty());
    assert_complete(&splits, 10);
}

#[test]
fn classes_concatenate_in_label_order() {
    let (features, mut labels, ids) = dataset(&[6, 6, 6]);
    // Relabel so ascending label order differs from row order.
    for l in &mut labels {
        *l = match *l {
            0 => 30,
            1 => 10,
            _ => 20,
        };
    }
    let splits = config(0.5, 0.5, 0.0)
        .with_per_class(true)
        .partition(&features, &labels, &ids)
        .unwrap();
    let order: Vec<i32> = splits
        .train
        .labels
        .iter()
        .fold(Vec::new(), |mut acc, &l| {
            if acc.last() != Some(&l) {
                acc.push(l);
            }
            acc
        });
    assert_eq!(order, vec![10, 20, 30]);
}

#[test]
fn every_class_reaches_train() {
    let (features, labels, ids) = dataset(&[1, 2, 3, 17, 40]);
    let splits = config(0.7, 0.15, 0.15)
        .with_per_class(true)
        .with_seed(3)
        .partition(&features, &labels, &ids)
        .unwrap();
    let train_labels: BTreeSet<i32> = splits.train.labels.iter().copied().collect();
    assert_eq!(train_labels, (0..5).collect());
    assert_complete(&splits, 63);
}

#[test]
fn inherited_threshold_policy_moves_five_row_classes() {
    let (features, labels, ids) = dataset(&[5, 5]);
    let splits = config(0.6, 0.2, 0.2)
        .with_per_class(true)
        .with_seed(100)
        .with_rare_class_policy(RareClassPolicy::HeldOutAtMost(1.0))
        .partition(&features, &labels, &ids)
        .unwrap();
    assert_eq!(splits.train.len(), 10);
    assert!(splits.test.is_empty());
    assert!(splits.val.is_empty());
}

#[test]
fn never_policy_splits_tiny_classes() {
    let (features, labels, ids) = dataset(&[2, 2]);
    let splits = config(0.5, 0.5, 0.0)
        .with_per_class(true)
        .with_rare_class_policy(RareClassPolicy::Never)
        .partition(&features, &labels, &ids)
        .unwrap();
    assert_eq!(splits.test.len(), 2);
    assert_eq!(splits.train.len(), 2);
}

// ---------------------------------------------------------------------------
// Non-stratified
// ---------------------------------------------------------------------------

#[test]
fn plain_split_sizes_and_completeness() {
    let (features, labels, ids) = dataset(&[30, 10]);
    let splits = config(0.6, 0.25, 0.15)
        .partition(&features, &labels, &ids)
        .unwrap();
    assert_eq!(splits.test.len(), 10);
    assert_eq!(splits.val.len(), 6);
    assert_eq!(splits.train.len(), 24);
    assert_complete(&splits, 40);
}

#[test]
fn plain_split_is_deterministic_per_seed() {
    let (features, labels, ids) = dataset(&[25, 25]);
    let cfg = config(0.8, 0.1, 0.1).with_seed(9);
    let a = cfg.partition(&features, &labels, &ids).unwrap();
    let b = cfg.partition(&features, &labels, &ids).unwrap();
    assert_eq!(a, b);
}

#[test]
fn absolute_row_counts() {
    let (features, labels, ids) = dataset(&[6, 6]);
    let cfg = PartitionConfig::new(SplitSize::Rows(8), SplitSize::Rows(2), SplitSize::Rows(2))
        .unwrap();
    let splits = cfg.partition(&features, &labels, &ids).unwrap();
    assert_eq!(
        (splits.train.len(), splits.val.len(), splits.test.len()),
        (8, 2, 2)
    );
}

#[test]
fn sizes_short_of_total_rejected() {
    let (features, labels, ids) = dataset(&[6, 6]);
    let cfg = PartitionConfig::new(SplitSize::Rows(8), SplitSize::Rows(2), SplitSize::Rows(1))
        .unwrap();
    let err = cfg.partition(&features, &labels, &ids).unwrap_err();
    assert!(matches!(err, DataError::SizesDoNotSum { total: 12, .. }));
}
