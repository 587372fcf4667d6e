//! Serializable descriptions of loaded models.

use crate::forest::ForestModel;
use crate::tree::TreeModel;

/// Shape and size of one tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TreeSummary {
    /// Number of feature columns.
    pub n_features: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Total nodes, splits and leaves.
    pub node_count: usize,
    /// Number of leaves.
    pub n_leaves: usize,
    /// Longest root-to-leaf path.
    pub max_depth: usize,
    /// Class labels in output order.
    pub classes: Vec<i32>,
    /// Attached feature names, if any.
    pub feature_names: Option<Vec<String>>,
    /// Binary size without the name section.
    pub binary_size: usize,
}

/// Shape and size of a forest.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ForestSummary {
    /// Number of feature columns.
    pub n_features: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Number of outputs (always 1).
    pub n_outputs: usize,
    /// Number of estimators.
    pub n_estimators: usize,
    /// Class labels in output order.
    pub classes: Vec<i32>,
    /// Shared feature names, if any.
    pub feature_names: Option<Vec<String>>,
    /// Offset table entries.
    pub estimator_sizes: Vec<usize>,
    /// Deepest estimator.
    pub max_depth: usize,
    /// Nodes across all estimators.
    pub total_nodes: usize,
    /// Binary size without the name section.
    pub binary_size: usize,
}

impl TreeModel {
    /// Describe this tree.
    #[must_use]
    pub fn summary(&self) -> TreeSummary {
        TreeSummary {
            n_features: self.n_features(),
            n_classes: self.n_classes(),
            node_count: self.node_count(),
            n_leaves: self.n_leaves(),
            max_depth: self.max_depth(),
            classes: self.classes().to_vec(),
            feature_names: self.feature_names().map(<[String]>::to_vec),
            binary_size: self.unnamed_size(),
        }
    }
}

impl ForestModel {
    /// Describe this forest.
    #[must_use]
    pub fn summary(&self) -> ForestSummary {
        let estimator_sizes = self.estimator_sizes();
        let binary_size = (4 + self.n_estimators() + self.n_classes()) * 4
            + estimator_sizes.iter().sum::<usize>();
        ForestSummary {
            n_features: self.n_features(),
            n_classes: self.n_classes(),
            n_outputs: self.n_outputs(),
            n_estimators: self.n_estimators(),
            classes: self.classes().to_vec(),
            feature_names: self.feature_names().map(<[String]>::to_vec),
            max_depth: self
                .estimators()
                .iter()
                .map(TreeModel::max_depth)
                .max()
                .unwrap_or(0),
            total_nodes: self.estimators().iter().map(TreeModel::node_count).sum(),
            estimator_sizes,
            binary_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{TreeArrays, TreeModel};
    use crate::ForestModel;

    fn stump() -> TreeModel {
        TreeModel::from_arrays(TreeArrays {
            n_features: 1,
            max_depth: 1,
            classes: vec![10, 20],
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            threshold: vec![0.5, -2.0, -2.0],
            feature: vec![0, -2, -2],
            value: vec![vec![0.0, 0.0], vec![5.0, 0.0], vec![0.0, 5.0]],
        })
        .unwrap()
    }

    #[test]
    fn tree_summary_counts() {
        let summary = stump().summary();
        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.n_leaves, 2);
        assert_eq!(summary.binary_size, 132);
    }

    #[test]
    fn forest_summary_size_matches_codec() {
        let forest = ForestModel::new(vec![stump(), stump()]).unwrap();
        let summary = forest.summary();
        assert_eq!(summary.binary_size, forest.size_in_bytes(false).unwrap());
        assert_eq!(summary.total_nodes, 6);
        assert_eq!(summary.max_depth, 1);
    }

    #[test]
    fn summary_serializes_to_json() {
        let json = serde_json::to_value(stump().summary()).unwrap();
        assert_eq!(json["classes"], serde_json::json!([10, 20]));
        assert!(json["feature_names"].is_null());
    }
}
