use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::{
    ModelError,
    node::{LEAF_SENTINEL, NO_CHILD, Node},
};

/// Raw node arrays of one fitted tree, as produced by an external fitting
/// routine or by a decoder.
///
/// `n_classes` is `classes.len()` and `node_count` is `children_left.len()`;
/// every other per-node array must agree with that count. Hand the arrays to
/// [`TreeModel::from_arrays`] to obtain a validated model.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeArrays {
    /// Number of feature columns the tree was fitted on.
    pub n_features: usize,
    /// Longest root-to-leaf path, in edges.
    pub max_depth: usize,
    /// Class labels in output order.
    pub classes: Vec<i32>,
    /// Left child per node, [`NO_CHILD`] for leaves.
    pub children_left: Vec<i32>,
    /// Right child per node, [`NO_CHILD`] for leaves.
    pub children_right: Vec<i32>,
    /// Split threshold per node; ignored for leaves.
    pub threshold: Vec<f64>,
    /// Split feature per node, [`LEAF_SENTINEL`] for leaves.
    pub feature: Vec<i32>,
    /// Per-node class counts or weights, `node_count` rows of `n_classes`.
    pub value: Vec<Vec<f64>>,
}

/// The narrow interface through which an external fitting routine supplies
/// a tree. This crate never induces trees itself.
pub trait TreeFitter {
    /// Error type reported by the fitting routine.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fit a tree on row-major `features` and their `labels`.
    ///
    /// # Errors
    ///
    /// Whatever the routine considers a fitting failure.
    fn fit(&self, features: &[Vec<f64>], labels: &[i32]) -> Result<TreeArrays, Self::Error>;
}

/// An immutable, validated snapshot of one fitted classification tree.
///
/// Node 0 is the root. A node is a leaf iff its `feature` entry is
/// [`LEAF_SENTINEL`]; leaves have both children set to [`NO_CHILD`]. The
/// value matrix is stored flat, node-major.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TreeModel {
    pub(crate) n_features: usize,
    pub(crate) max_depth: usize,
    pub(crate) classes: Vec<i32>,
    pub(crate) feature_names: Option<Vec<String>>,
    pub(crate) children_left: Vec<i32>,
    pub(crate) children_right: Vec<i32>,
    pub(crate) threshold: Vec<f64>,
    pub(crate) feature: Vec<i32>,
    pub(crate) value: Vec<f64>,
}

impl TreeModel {
    /// Validate raw node arrays and build a model from them.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::EmptyTree`] | no nodes |
    /// | [`ModelError::NoClasses`] | `classes` is empty |
    /// | [`ModelError::DuplicateClass`] | a label is listed twice |
    /// | [`ModelError::DimensionOverflow`] | `node_count` or `n_features` exceeds `i32::MAX` |
    /// | [`ModelError::ArrayLengthMismatch`] | a per-node array has the wrong length |
    /// | [`ModelError::ValueRowLength`] | a value row is not `n_classes` long |
    /// | [`ModelError::NonFiniteValue`] | a class weight is NaN or infinite |
    /// | [`ModelError::LeafWithChildren`] | a leaf has a child other than -1 |
    /// | [`ModelError::InvalidFeatureIndex`] | a split feature is out of range |
    /// | [`ModelError::NanThreshold`] | a split threshold is NaN |
    /// | [`ModelError::InvalidChild`] | a child index is out of range or points at the root |
    /// | [`ModelError::MultipleParents`] | a node has two parents |
    /// | [`ModelError::UnreachableNode`] | a node is not reachable from the root |
    /// | [`ModelError::DepthMismatch`] | `max_depth` is not the true depth |
    #[instrument(skip_all, fields(node_count = arrays.children_left.len(), n_classes = arrays.classes.len()))]
    pub fn from_arrays(arrays: TreeArrays) -> Result<Self, ModelError> {
        let TreeArrays {
            n_features,
            max_depth,
            classes,
            children_left,
            children_right,
            threshold,
            feature,
            value,
        } = arrays;

        let node_count = children_left.len();
        if node_count == 0 {
            return Err(ModelError::EmptyTree);
        }
        if classes.is_empty() {
            return Err(ModelError::NoClasses);
        }
        let mut seen = HashSet::with_capacity(classes.len());
        for &class in &classes {
            if !seen.insert(class) {
                return Err(ModelError::DuplicateClass { class });
            }
        }
        for (field, n) in [("node_count", node_count), ("n_features", n_features)] {
            if i32::try_from(n).is_err() {
                return Err(ModelError::DimensionOverflow { field, value: n });
            }
        }

        for (array, got) in [
            ("children_right", children_right.len()),
            ("threshold", threshold.len()),
            ("feature", feature.len()),
            ("value", value.len()),
        ] {
            if got != node_count {
                return Err(ModelError::ArrayLengthMismatch {
                    array,
                    expected: node_count,
                    got,
                });
            }
        }

        let n_classes = classes.len();
        let mut flat = Vec::with_capacity(node_count * n_classes);
        for (node, row) in value.iter().enumerate() {
            if row.len() != n_classes {
                return Err(ModelError::ValueRowLength {
                    node,
                    expected: n_classes,
                    got: row.len(),
                });
            }
            if let Some(class) = row.iter().position(|v| !v.is_finite()) {
                return Err(ModelError::NonFiniteValue { node, class });
            }
            flat.extend_from_slice(row);
        }

        // Parent counts double as the "exactly one parent" check.
        let mut parents = vec![0u8; node_count];
        for node in 0..node_count {
            let (left, right) = (children_left[node], children_right[node]);
            if feature[node] == LEAF_SENTINEL {
                if left != NO_CHILD || right != NO_CHILD {
                    return Err(ModelError::LeafWithChildren { node, left, right });
                }
                continue;
            }
            if feature[node] < 0 || feature[node] as usize >= n_features {
                return Err(ModelError::InvalidFeatureIndex {
                    node,
                    feature: feature[node],
                    n_features,
                });
            }
            if threshold[node].is_nan() {
                return Err(ModelError::NanThreshold { node });
            }
            for child in [left, right] {
                if child < 1 || child as usize >= node_count {
                    return Err(ModelError::InvalidChild {
                        node,
                        child,
                        node_count,
                    });
                }
                let slot = &mut parents[child as usize];
                if *slot > 0 {
                    return Err(ModelError::MultipleParents {
                        node: child as usize,
                    });
                }
                *slot = 1;
            }
        }

        let model = TreeModel {
            n_features,
            max_depth,
            classes,
            feature_names: None,
            children_left,
            children_right,
            threshold,
            feature,
            value: flat,
        };

        let computed = model.measure_depth()?;
        if computed != max_depth {
            return Err(ModelError::DepthMismatch {
                declared: max_depth,
                computed,
            });
        }

        debug!(node_count, max_depth, "tree arrays validated");
        Ok(model)
    }

    /// Fit a tree through an external routine and validate what it returns.
    ///
    /// # Errors
    ///
    /// [`ModelError::Fit`] when the routine fails, otherwise any error of
    /// [`TreeModel::from_arrays`].
    pub fn fit_with<F: TreeFitter>(
        fitter: &F,
        features: &[Vec<f64>],
        labels: &[i32],
    ) -> Result<Self, ModelError> {
        let arrays = fitter.fit(features, labels).map_err(|e| ModelError::Fit {
            source: Box::new(e),
        })?;
        Self::from_arrays(arrays)
    }

    /// Attach feature names, one per feature column.
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

    /// Walk the tree from the root and return the longest root-to-leaf path.
    ///
    /// Relies on the single-parent check already done in `from_arrays`: with
    /// at most one parent per node the walk can never revisit a node.
    fn measure_depth(&self) -> Result<usize, ModelError> {
        let node_count = self.node_count();
        let mut visited = vec![false; node_count];
        let mut stack = vec![(0usize, 0usize)];
        let mut deepest = 0usize;

        while let Some((idx, depth)) = stack.pop() {
            visited[idx] = true;
            match self.node(idx) {
                Node::Leaf { .. } => deepest = deepest.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((left, depth + 1));
                    stack.push((right, depth + 1));
                }
            }
        }

        match visited.iter().position(|v| !v) {
            Some(node) => Err(ModelError::UnreachableNode { node }),
            None => Ok(deepest),
        }
    }

    // --- Getters ---

    /// Return a view of node `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= node_count()`.
    #[must_use]
    pub fn node(&self, idx: usize) -> Node<'_> {
        if self.feature[idx] == LEAF_SENTINEL {
            Node::Leaf {
                value: self.value(idx),
            }
        } else {
            Node::Split {
                feature: self.feature[idx] as usize,
                threshold: self.threshold[idx],
                left: self.children_left[idx] as usize,
                right: self.children_right[idx] as usize,
            }
        }
    }

    /// Return the class weights of node `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= node_count()`.
    #[must_use]
    pub fn value(&self, idx: usize) -> &[f64] {
        let n = self.n_classes();
        &self.value[idx * n..(idx + 1) * n]
    }

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

    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.children_left.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.feature.iter().filter(|&&f| f == LEAF_SENTINEL).count()
    }

    /// Return the longest root-to-leaf path. A single-leaf tree has depth 0.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
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

    /// Return the left-child array.
    #[must_use]
    pub fn children_left(&self) -> &[i32] {
        &self.children_left
    }

    /// Return the right-child array.
    #[must_use]
    pub fn children_right(&self) -> &[i32] {
        &self.children_right
    }

    /// Return the threshold array.
    #[must_use]
    pub fn threshold(&self) -> &[f64] {
        &self.threshold
    }

    /// Return the feature array.
    #[must_use]
    pub fn feature(&self) -> &[i32] {
        &self.feature
    }
}
