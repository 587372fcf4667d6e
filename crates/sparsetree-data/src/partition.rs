//! Seeded train/validation/test partitioning, optionally stratified by label.
//!
//! Partitioning runs in two stages. The first stage holds out the test rows;
//! the second splits what is left into train and validation using the
//! validation share relative to `train + val`. In stratified mode both
//! stages run separately inside every class and the per-class results are
//! concatenated in ascending label order.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::DataError;

/// Tolerance used when summing fractional sizes and rounding row counts.
const EPSILON: f64 = 1e-9;

/// Size of one partition, either a share of the dataset or a row count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitSize {
    /// A fraction in `[0.0, 1.0]`.
    Fraction(f64),
    /// An absolute number of rows in `[0, total]`.
    Rows(usize),
}

impl SplitSize {
    /// The size as given, a fraction or a row count.
    fn raw(self) -> f64 {
        match self {
            SplitSize::Fraction(value) => value,
            SplitSize::Rows(rows) => rows as f64,
        }
    }

    /// Validate against `total` rows and return the equivalent fraction.
    fn to_fraction(self, name: &'static str, total: usize) -> Result<f64, DataError> {
        match self {
            SplitSize::Fraction(value) => {
                if !(0.0..=1.0).contains(&value) {
                    return Err(DataError::FractionOutOfRange { name, value });
                }
                Ok(value)
            }
            SplitSize::Rows(rows) => {
                if rows > total {
                    return Err(DataError::RowCountOutOfRange { name, rows, total });
                }
                Ok(rows as f64 / total as f64)
            }
        }
    }
}

/// When a class is too small to give up rows to a held-out partition.
///
/// A class judged degenerate at a stage sends all of its rows at that stage
/// to `train` instead of being split. A held-out fraction of zero is never
/// degenerate, and the policy only applies in stratified mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RareClassPolicy {
    /// Degenerate when the held-out share `count * fraction` is below one
    /// row, or when the retained share `count * (1 - fraction)` is at most
    /// one row.
    #[default]
    Standard,
    /// Degenerate when `count * fraction <= threshold`.
    HeldOutAtMost(f64),
    /// Always split.
    Never,
}

impl RareClassPolicy {
    fn is_degenerate(self, count: usize, fraction: f64) -> bool {
        if fraction <= 0.0 {
            return false;
        }
        let held = count as f64 * fraction;
        match self {
            RareClassPolicy::Standard => {
                fraction < 1.0 && (held < 1.0 - EPSILON || count as f64 - held <= 1.0 + EPSILON)
            }
            RareClassPolicy::HeldOutAtMost(threshold) => held <= threshold + EPSILON,
            RareClassPolicy::Never => false,
        }
    }
}

/// Row-aligned features, labels and ids of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<L, I> {
    /// Feature rows.
    pub features: Vec<Vec<f64>>,
    /// Label per row.
    pub labels: Vec<L>,
    /// Id per row.
    pub ids: Vec<I>,
}

impl<L, I> Partition<L, I> {
    fn empty() -> Self {
        Self {
            features: Vec::new(),
            labels: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Return `true` if the partition holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The three disjoint partitions of a dataset. `val` may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Splits<L, I> {
    /// Training rows.
    pub train: Partition<L, I>,
    /// Validation rows.
    pub val: Partition<L, I>,
    /// Test rows.
    pub test: Partition<L, I>,
}

/// Row indices assigned to each partition.
#[derive(Debug, Default)]
struct Assignment {
    train: Vec<usize>,
    val: Vec<usize>,
    test: Vec<usize>,
}

/// Configuration for partitioning a dataset.
///
/// Construct via [`PartitionConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default    |
/// |---------------------|------------|
/// | `per_class`         | `false`    |
/// | `seed`              | 42         |
/// | `rare_class_policy` | `Standard` |
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    pub(crate) train_size: SplitSize,
    pub(crate) test_size: SplitSize,
    pub(crate) val_size: SplitSize,
    pub(crate) per_class: bool,
    pub(crate) seed: u64,
    pub(crate) rare_class_policy: RareClassPolicy,
}

impl PartitionConfig {
    /// Create a new config with the three partition sizes.
    ///
    /// Sizes are checked against the dataset in [`PartitionConfig::partition`],
    /// since row counts are only meaningful once the total is known.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::FractionOutOfRange`] if a fractional size is
    /// outside `[0.0, 1.0]` or not finite.
    pub fn new(
        train_size: SplitSize,
        test_size: SplitSize,
        val_size: SplitSize,
    ) -> Result<Self, DataError> {
        for (name, size) in [
            ("train_size", train_size),
            ("test_size", test_size),
            ("val_size", val_size),
        ] {
            if let SplitSize::Fraction(value) = size {
                if !(0.0..=1.0).contains(&value) {
                    return Err(DataError::FractionOutOfRange { name, value });
                }
            }
        }
        Ok(Self {
            train_size,
            test_size,
            val_size,
            per_class: false,
            seed: 42,
            rare_class_policy: RareClassPolicy::Standard,
        })
    }

    // --- Setters ---

    /// Split each class separately (stratified mode).
    #[must_use]
    pub fn with_per_class(mut self, per_class: bool) -> Self {
        self.per_class = per_class;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the rule for classes too small to split.
    #[must_use]
    pub fn with_rare_class_policy(mut self, policy: RareClassPolicy) -> Self {
        self.rare_class_policy = policy;
        self
    }

    /// Partition row-aligned `features`, `labels` and `ids`.
    ///
    /// Every input row lands in exactly one partition. The same seed and
    /// rows always produce the same assignment. In stratified mode every
    /// class keeps at least its degenerate rows in `train`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::LengthMismatch`] | inputs are not row-aligned |
    /// | [`DataError::EmptyInput`] | zero rows |
    /// | [`DataError::FractionOutOfRange`] | a fraction is outside `[0.0, 1.0]` |
    /// | [`DataError::RowCountOutOfRange`] | a row count exceeds the total |
    /// | [`DataError::SizesDoNotSum`] | sizes do not cover the dataset exactly |
    #[instrument(skip_all, fields(n_rows = labels.len(), per_class = self.per_class, seed = self.seed))]
    pub fn partition<L, I>(
        &self,
        features: &[Vec<f64>],
        labels: &[L],
        ids: &[I],
    ) -> Result<Splits<L, I>, DataError>
    where
        L: Ord + Clone + Send + Sync,
        I: Clone + Send + Sync,
    {
        if features.len() != labels.len() || labels.len() != ids.len() {
            return Err(DataError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
                ids: ids.len(),
            });
        }
        let total = labels.len();
        if total == 0 {
            return Err(DataError::EmptyInput);
        }
        let (train, test, val) = self.fractions(total)?;
        let val_share = if train + val > 0.0 {
            val / (train + val)
        } else {
            0.0
        };

        let assignment = if self.per_class {
            self.assign_per_class(labels, test, val_share)
        } else {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            two_stage(
                (0..total).collect(),
                test,
                val_share,
                RareClassPolicy::Never,
                &mut rng,
            )
        };

        let splits = Splits {
            train: gather(&assignment.train, features, labels, ids),
            val: gather(&assignment.val, features, labels, ids),
            test: gather(&assignment.test, features, labels, ids),
        };
        info!(
            train = splits.train.len(),
            val = splits.val.len(),
            test = splits.test.len(),
            "dataset partitioned"
        );
        Ok(splits)
    }

    /// Validate the sizes against `total` and return `(train, test, val)` fractions.
    fn fractions(&self, total: usize) -> Result<(f64, f64, f64), DataError> {
        let train = self.train_size.to_fraction("train_size", total)?;
        let test = self.test_size.to_fraction("test_size", total)?;
        let val = self.val_size.to_fraction("val_size", total)?;

        // The sizes as given must add up to 1.0 or to the row count, and
        // the converted shares must then cover the dataset.
        let raw: f64 = [self.train_size, self.test_size, self.val_size]
            .iter()
            .map(|size| size.raw())
            .sum();
        let covers = match (self.train_size, self.test_size, self.val_size) {
            (SplitSize::Rows(a), SplitSize::Rows(b), SplitSize::Rows(c)) => a + b + c == total,
            _ => {
                ((raw - 1.0).abs() <= EPSILON || (raw - total as f64).abs() <= EPSILON)
                    && (train + test + val - 1.0).abs() <= EPSILON
            }
        };
        if !covers {
            return Err(DataError::SizesDoNotSum { sum: raw, total });
        }
        Ok((train, test, val))
    }

    fn assign_per_class<L>(&self, labels: &[L], test: f64, val_share: f64) -> Assignment
    where
        L: Ord + Clone + Send + Sync,
    {
        let mut classes: BTreeMap<&L, Vec<usize>> = BTreeMap::new();
        for (row, label) in labels.iter().enumerate() {
            classes.entry(label).or_default().push(row);
        }

        // One sub-seed per class, drawn in label order, so the parallel
        // split below is deterministic.
        let mut master_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let jobs: Vec<(Vec<usize>, u64)> = classes
            .into_values()
            .map(|rows| (rows, master_rng.r#gen()))
            .collect();
        debug!(n_classes = jobs.len(), "stratified partition");

        let policy = self.rare_class_policy;
        let per_class: Vec<Assignment> = jobs
            .into_par_iter()
            .map(|(rows, seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                two_stage(rows, test, val_share, policy, &mut rng)
            })
            .collect();

        let mut merged = Assignment::default();
        for part in per_class {
            merged.train.extend(part.train);
            merged.val.extend(part.val);
            merged.test.extend(part.test);
        }
        merged
    }
}

/// Number of rows to hold out of `n` for `fraction`, rounded up.
fn held_out_count(n: usize, fraction: f64) -> usize {
    let raw = (n as f64 * fraction - EPSILON).ceil();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(n)
    }
}

/// Shuffle `rows` and return `(retained, held_out)`.
fn split_rows(mut rows: Vec<usize>, fraction: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    rows.shuffle(rng);
    let n_held = held_out_count(rows.len(), fraction);
    let retained = rows.split_off(n_held);
    (retained, rows)
}

/// Run both stages over one group of rows.
fn two_stage(
    rows: Vec<usize>,
    test: f64,
    val_share: f64,
    policy: RareClassPolicy,
    rng: &mut ChaCha8Rng,
) -> Assignment {
    let count = rows.len();
    if policy.is_degenerate(count, test) {
        debug!(count, fraction = test, "class too small for test split, kept in train");
        return Assignment {
            train: rows,
            ..Assignment::default()
        };
    }
    let (rest, test_rows) = split_rows(rows, test, rng);

    let remaining = rest.len();
    if policy.is_degenerate(remaining, val_share) {
        debug!(
            count = remaining,
            fraction = val_share,
            "class too small for validation split, kept in train"
        );
        return Assignment {
            train: rest,
            val: Vec::new(),
            test: test_rows,
        };
    }
    let (train_rows, val_rows) = split_rows(rest, val_share, rng);
    Assignment {
        train: train_rows,
        val: val_rows,
        test: test_rows,
    }
}

fn gather<L: Clone, I: Clone>(
    rows: &[usize],
    features: &[Vec<f64>],
    labels: &[L],
    ids: &[I],
) -> Partition<L, I> {
    let mut part = Partition::empty();
    part.features.reserve(rows.len());
    part.labels.reserve(rows.len());
    part.ids.reserve(rows.len());
    for &row in rows {
        part.features.push(features[row].clone());
        part.labels.push(labels[row].clone());
        part.ids.push(ids[row].clone());
    }
    part
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fractions(train: f64, test: f64, val: f64) -> PartitionConfig {
        PartitionConfig::new(
            SplitSize::Fraction(train),
            SplitSize::Fraction(test),
            SplitSize::Fraction(val),
        )
        .unwrap()
    }

    #[test]
    fn held_out_count_rounds_up() {
        assert_eq!(held_out_count(10, 0.2), 2);
        assert_eq!(held_out_count(10, 0.25), 3);
        assert_eq!(held_out_count(5, 0.2), 1);
        assert_eq!(held_out_count(4, 0.0), 0);
        assert_eq!(held_out_count(3, 1.0), 3);
        // 0.1 + 0.2 overshoots 0.3 by float noise; must not round to 4.
        assert_eq!(held_out_count(10, 0.1 + 0.2), 3);
    }

    #[test]
    fn standard_policy() {
        let p = RareClassPolicy::Standard;
        assert!(!p.is_degenerate(5, 0.2));
        assert!(p.is_degenerate(2, 0.5));
        assert!(p.is_degenerate(1, 0.2));
        assert!(p.is_degenerate(3, 0.2));
        assert!(!p.is_degenerate(4, 0.25));
        assert!(!p.is_degenerate(1, 0.0));
        assert!(!p.is_degenerate(1, 1.0));
    }

    #[test]
    fn held_out_at_most_policy() {
        let p = RareClassPolicy::HeldOutAtMost(1.0);
        assert!(p.is_degenerate(5, 0.2));
        assert!(p.is_degenerate(2, 0.5));
        assert!(!p.is_degenerate(10, 0.2));
        assert!(!p.is_degenerate(10, 0.0));
        assert!(!RareClassPolicy::Never.is_degenerate(1, 0.5));
    }

    #[test]
    fn new_rejects_bad_fraction() {
        let err = PartitionConfig::new(
            SplitSize::Fraction(1.5),
            SplitSize::Fraction(0.0),
            SplitSize::Fraction(0.0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataError::FractionOutOfRange {
                name: "train_size",
                ..
            }
        ));
        assert!(PartitionConfig::new(
            SplitSize::Fraction(f64::NAN),
            SplitSize::Fraction(0.0),
            SplitSize::Fraction(0.0),
        )
        .is_err());
    }

    #[test]
    fn sizes_must_cover_dataset() {
        let err = fractions(0.5, 0.2, 0.2)
            .partition(&[vec![0.0]], &[0], &[0])
            .unwrap_err();
        assert!(matches!(err, DataError::SizesDoNotSum { total: 1, .. }));

        let rows = PartitionConfig::new(SplitSize::Rows(2), SplitSize::Rows(1), SplitSize::Rows(0))
            .unwrap();
        let features = vec![vec![0.0]; 4];
        assert!(matches!(
            rows.partition(&features, &[0, 0, 1, 1], &[1, 2, 3, 4]),
            Err(DataError::SizesDoNotSum { .. })
        ));
    }

    #[test]
    fn row_count_past_total() {
        let config =
            PartitionConfig::new(SplitSize::Rows(5), SplitSize::Rows(0), SplitSize::Rows(0))
                .unwrap();
        let err = config
            .partition(&vec![vec![0.0]; 3], &[0, 0, 0], &["a", "b", "c"])
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::RowCountOutOfRange {
                rows: 5,
                total: 3,
                ..
            }
        ));
    }

    #[test]
    fn misaligned_inputs() {
        let err = fractions(1.0, 0.0, 0.0)
            .partition(&vec![vec![0.0]; 2], &[0, 1], &[7])
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::LengthMismatch {
                features: 2,
                labels: 2,
                ids: 1
            }
        ));
    }

    #[test]
    fn empty_input() {
        let features: Vec<Vec<f64>> = Vec::new();
        let labels: Vec<i32> = Vec::new();
        let ids: Vec<u32> = Vec::new();
        assert!(matches!(
            fractions(1.0, 0.0, 0.0).partition(&features, &labels, &ids),
            Err(DataError::EmptyInput)
        ));
    }

    #[test]
    fn rows_and_fractions_must_sum_as_given() {
        let n = 20;
        let features = vec![vec![1.0]; n];
        let labels = vec![0; n];
        let ids: Vec<usize> = (0..n).collect();

        // 0.5 + 6 + 4 is neither 1.0 nor 20.
        let config = PartitionConfig::new(
            SplitSize::Fraction(0.5),
            SplitSize::Rows(6),
            SplitSize::Rows(4),
        )
        .unwrap();
        let err = config.partition(&features, &labels, &ids).unwrap_err();
        assert!(matches!(err, DataError::SizesDoNotSum { total: 20, sum } if (sum - 10.5).abs() < 1e-12));

        // Sums to 1.0 as given but covers only a sliver of the rows.
        let config = PartitionConfig::new(
            SplitSize::Rows(1),
            SplitSize::Fraction(0.0),
            SplitSize::Fraction(0.0),
        )
        .unwrap();
        assert!(matches!(
            config.partition(&features, &labels, &ids),
            Err(DataError::SizesDoNotSum { .. })
        ));

        // A zero fraction next to row counts that cover the dataset is fine.
        let config = PartitionConfig::new(
            SplitSize::Rows(14),
            SplitSize::Rows(6),
            SplitSize::Fraction(0.0),
        )
        .unwrap();
        let splits = config.partition(&features, &labels, &ids).unwrap();
        assert_eq!(splits.test.len(), 6);
        assert_eq!(splits.train.len(), 14);
        assert!(splits.val.is_empty());
    }

    #[test]
    fn zero_validation_leaves_val_empty() {
        let n = 10;
        let splits = fractions(0.7, 0.3, 0.0)
            .partition(&vec![vec![0.0]; n], &vec![1; n], &(0..n).collect::<Vec<_>>())
            .unwrap();
        assert!(splits.val.is_empty());
        assert_eq!(splits.test.len(), 3);
        assert_eq!(splits.train.len(), 7);
    }

    #[test]
    fn everything_to_test() {
        let n = 4;
        let splits = fractions(0.0, 1.0, 0.0)
            .partition(&vec![vec![0.0]; n], &vec![1; n], &(0..n).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(splits.test.len(), 4);
        assert!(splits.train.is_empty());
        assert!(splits.val.is_empty());
    }
}
