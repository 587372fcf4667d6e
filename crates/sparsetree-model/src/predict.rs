//! Inference over validated trees and forests.

use std::collections::HashMap;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::ModelError;
use crate::forest::ForestModel;
use crate::node::{Node, argmax_lowest};
use crate::tree::TreeModel;

fn check_sample(expected: usize, sample: &[f64]) -> Result<(), ModelError> {
    if sample.len() != expected {
        return Err(ModelError::SampleFeatureMismatch {
            expected,
            got: sample.len(),
        });
    }
    Ok(())
}

/// Return the label with the most votes.
///
/// Ties go to the label that reached the winning count first when walking
/// `labels` in order, so the result depends on estimator order. Returns
/// `None` for an empty slice.
#[must_use]
pub fn majority_vote(labels: &[i32]) -> Option<i32> {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    let mut best: Option<(i32, usize)> = None;
    for &label in labels {
        let count = counts.entry(label).or_insert(0);
        *count += 1;
        if best.is_none_or(|(_, n)| *count > n) {
            best = Some((label, *count));
        }
    }
    best.map(|(label, _)| label)
}

impl TreeModel {
    /// Index of the leaf `sample` lands in.
    ///
    /// Samples go left when `sample[feature] <= threshold`; a NaN feature
    /// value goes right. The walk takes at most `max_depth` steps.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SampleFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn leaf_index(&self, sample: &[f64]) -> Result<usize, ModelError> {
        check_sample(self.n_features(), sample)?;
        let mut idx = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = self.node(idx)
        {
            idx = if sample[feature] <= threshold {
                left
            } else {
                right
            };
        }
        Ok(idx)
    }

    /// Predict the class label of one sample.
    ///
    /// Returns the class with the largest weight at the reached leaf, ties
    /// resolved to the lowest class index.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SampleFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn evaluate(&self, sample: &[f64]) -> Result<i32, ModelError> {
        let leaf = self.leaf_index(sample)?;
        Ok(self.classes()[argmax_lowest(self.value(leaf))])
    }

    /// Predict every sample in parallel, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError::SampleFeatureMismatch`] encountered.
    pub fn evaluate_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<i32>, ModelError> {
        samples.par_iter().map(|s| self.evaluate(s)).collect()
    }
}

impl ForestModel {
    /// Each estimator's prediction for `sample`, in estimator order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SampleFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn estimator_predictions(&self, sample: &[f64]) -> Result<Vec<i32>, ModelError> {
        check_sample(self.n_features(), sample)?;
        self.estimators()
            .par_iter()
            .map(|tree| tree.evaluate(sample))
            .collect()
    }

    /// Vote tally for `sample`, one entry per class in class order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SampleFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn votes(&self, sample: &[f64]) -> Result<Vec<usize>, ModelError> {
        let predictions = self.estimator_predictions(sample)?;
        let mut tally = vec![0usize; self.n_classes()];
        for label in predictions {
            if let Some(slot) = self.classes().iter().position(|&c| c == label) {
                tally[slot] += 1;
            }
        }
        Ok(tally)
    }

    /// Predict the class label of one sample by majority vote.
    ///
    /// Each estimator votes independently; ties go to the label that
    /// reached the winning count first in estimator order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SampleFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn evaluate(&self, sample: &[f64]) -> Result<i32, ModelError> {
        let predictions = self.estimator_predictions(sample)?;
        majority_vote(&predictions).ok_or(ModelError::EmptyForest)
    }

    /// Predict every sample in parallel, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError::SampleFeatureMismatch`] encountered.
    pub fn evaluate_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<i32>, ModelError> {
        samples.par_iter().map(|s| self.evaluate(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeArrays;

    fn stump(classes: Vec<i32>, left: Vec<f64>, right: Vec<f64>) -> TreeModel {
        TreeModel::from_arrays(TreeArrays {
            n_features: 1,
            max_depth: 1,
            classes,
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            threshold: vec![0.5, -2.0, -2.0],
            feature: vec![0, -2, -2],
            value: vec![vec![0.0, 0.0], left, right],
        })
        .unwrap()
    }

    #[test]
    fn threshold_is_inclusive_on_the_left() {
        let tree = stump(vec![10, 20], vec![5.0, 0.0], vec![0.0, 5.0]);
        assert_eq!(tree.evaluate(&[0.5]).unwrap(), 10);
        assert_eq!(tree.evaluate(&[0.500_000_1]).unwrap(), 20);
    }

    #[test]
    fn nan_goes_right() {
        let tree = stump(vec![10, 20], vec![5.0, 0.0], vec![0.0, 5.0]);
        assert_eq!(tree.leaf_index(&[f64::NAN]).unwrap(), 2);
    }

    #[test]
    fn leaf_tie_goes_to_lowest_class_index() {
        let tree = stump(vec![7, 3], vec![2.0, 2.0], vec![0.0, 1.0]);
        assert_eq!(tree.evaluate(&[0.0]).unwrap(), 7);
    }

    #[test]
    fn wrong_sample_length() {
        let tree = stump(vec![10, 20], vec![5.0, 0.0], vec![0.0, 5.0]);
        assert!(matches!(
            tree.evaluate(&[0.1, 0.2]),
            Err(ModelError::SampleFeatureMismatch {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn majority_vote_first_to_reach_max() {
        assert_eq!(majority_vote(&[10, 10, 20]), Some(10));
        assert_eq!(majority_vote(&[20, 10, 10, 20]), Some(10));
        assert_eq!(majority_vote(&[20, 10]), Some(20));
        assert_eq!(majority_vote(&[]), None);
    }

    #[test]
    fn forest_votes_and_batch() {
        let low = stump(vec![10, 20], vec![5.0, 0.0], vec![0.0, 5.0]);
        let high = stump(vec![10, 20], vec![0.0, 5.0], vec![0.0, 5.0]);
        let forest = ForestModel::new(vec![low.clone(), low, high]).unwrap();
        assert_eq!(forest.votes(&[0.2]).unwrap(), vec![2, 1]);
        assert_eq!(forest.estimator_predictions(&[0.2]).unwrap(), vec![10, 10, 20]);
        assert_eq!(
            forest.evaluate_batch(&[vec![0.2], vec![0.9]]).unwrap(),
            vec![10, 20]
        );
    }
}
