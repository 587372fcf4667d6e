//! Ensembles of trees that share feature and class metadata.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::ModelError;
use crate::tree::TreeModel;

/// A fitted single-output classification forest.
///
/// Every estimator shares the forest's feature count and class list.
/// Feature names live on the forest; estimators never carry their own.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ForestModel {
    pub(crate) n_features: usize,
    pub(crate) classes: Vec<i32>,
    pub(crate) feature_names: Option<Vec<String>>,
    pub(crate) estimators: Vec<TreeModel>,
}

impl ForestModel {
    /// Build a forest from validated trees, in estimator order.
    ///
    /// Names attached to individual trees are dropped; attach forest-level
    /// names with [`ForestModel::with_feature_names`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::EmptyForest`] | `estimators` is empty |
    /// | [`ModelError::EstimatorMismatch`] | an estimator's feature count or classes differ from the first |
    #[instrument(skip_all, fields(n_estimators = estimators.len()))]
    pub fn new(estimators: Vec<TreeModel>) -> Result<Self, ModelError> {
        let first = estimators.first().ok_or(ModelError::EmptyForest)?;
        let n_features = first.n_features();
        let classes = first.classes().to_vec();

        for (estimator, tree) in estimators.iter().enumerate() {
            if tree.n_features() != n_features {
                return Err(ModelError::EstimatorMismatch {
                    estimator,
                    field: "n_features",
                });
            }
            if tree.classes() != classes.as_slice() {
                return Err(ModelError::EstimatorMismatch {
                    estimator,
                    field: "classes",
                });
            }
        }

        let estimators: Vec<TreeModel> = estimators
            .into_iter()
            .map(TreeModel::without_feature_names)
            .collect();

        debug!(n_features, n_classes = classes.len(), "forest assembled");
        Ok(Self {
            n_features,
            classes,
            feature_names: None,
            estimators,
        })
    }

    /// Attach feature names shared by every estimator.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::FeatureNameCountMismatch`] when
    /// `names.len() != n_features`.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self, ModelError> {
        if names.len() != self.n_features {
            return Err(ModelError::FeatureNameCountMismatch {
                expected: self.n_features,
                got: names.len(),
            });
        }
        self.feature_names = Some(names);
        Ok(self)
    }

    /// Drop any attached feature names.
    #[must_use]
    pub fn without_feature_names(mut self) -> Self {
        self.feature_names = None;
        self
    }

    /// Binary byte length of each estimator without names, in estimator order.
    ///
    /// This is the offset table written ahead of the tree blobs.
    #[must_use]
    pub fn estimator_sizes(&self) -> Vec<usize> {
        self.estimators
            .par_iter()
            .map(TreeModel::unnamed_size)
            .collect()
    }

    // --- Getters ---

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Return the number of outputs. Always 1.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        1
    }

    /// Return the number of estimators.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }

    /// Return the class labels in output order.
    #[must_use]
    pub fn classes(&self) -> &[i32] {
        &self.classes
    }

    /// Return the feature names, if attached.
    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    /// Return all estimators in order.
    #[must_use]
    pub fn estimators(&self) -> &[TreeModel] {
        &self.estimators
    }

    /// Return estimator `index`, if it exists.
    #[must_use]
    pub fn estimator(&self, index: usize) -> Option<&TreeModel> {
        self.estimators.get(index)
    }

    /// Consume the forest and return its estimators.
    #[must_use]
    pub fn into_estimators(self) -> Vec<TreeModel> {
        self.estimators
    }
}
