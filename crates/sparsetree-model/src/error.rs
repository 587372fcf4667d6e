use std::path::PathBuf;

/// Broad category of a [`ModelError`], for callers that only need to decide
/// whether to fix their inputs or retry the I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An argument or decoded token has the wrong shape or type.
    Type,
    /// An argument is well-typed but violates a size, range or structural rule.
    Value,
    /// The underlying reader or writer failed.
    Io,
}

/// Errors from model construction, encoding, decoding and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Returned when the node arrays are empty.
    #[error("tree has no nodes; node 0 must exist as the root")]
    EmptyTree,

    /// Returned when the class list is empty.
    #[error("tree has zero classes")]
    NoClasses,

    /// Returned when a per-node array length disagrees with `node_count`.
    #[error("array `{array}` has {got} entries, expected {expected}")]
    ArrayLengthMismatch {
        /// Name of the offending array.
        array: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// Returned when a row of the value matrix does not have `n_classes` entries.
    #[error("value row for node {node} has {got} entries, expected {expected}")]
    ValueRowLength {
        /// The node whose row is malformed.
        node: usize,
        /// Expected row length (`n_classes`).
        expected: usize,
        /// Actual row length.
        got: usize,
    },

    /// Returned when the same class label is listed twice.
    #[error("class label {class} appears more than once")]
    DuplicateClass {
        /// The repeated label.
        class: i32,
    },

    /// Returned when a class weight is NaN or infinite.
    #[error("non-finite class weight at node {node}, class index {class}")]
    NonFiniteValue {
        /// The node holding the weight.
        node: usize,
        /// Zero-based class index.
        class: usize,
    },

    /// Returned when a split node carries a NaN threshold.
    #[error("split node {node} has a NaN threshold")]
    NanThreshold {
        /// The offending split node.
        node: usize,
    },

    /// Returned when a node marked as a leaf still points at children.
    #[error("leaf node {node} has children ({left}, {right}); both must be -1")]
    LeafWithChildren {
        /// The offending leaf.
        node: usize,
        /// Its left child entry.
        left: i32,
        /// Its right child entry.
        right: i32,
    },

    /// Returned when a split node references a feature outside `[0, n_features)`.
    #[error("split node {node} uses feature {feature}, but the tree has {n_features} features")]
    InvalidFeatureIndex {
        /// The offending split node.
        node: usize,
        /// The feature entry found.
        feature: i32,
        /// Number of features the tree declares.
        n_features: usize,
    },

    /// Returned when a split node references a child outside `[1, node_count)`.
    #[error("split node {node} points at child {child}, valid children are 1..{node_count}")]
    InvalidChild {
        /// The offending split node.
        node: usize,
        /// The child entry found.
        child: i32,
        /// Number of nodes in the tree.
        node_count: usize,
    },

    /// Returned when a node is referenced by more than one parent.
    #[error("node {node} has more than one parent")]
    MultipleParents {
        /// The node referenced twice.
        node: usize,
    },

    /// Returned when a node cannot be reached from the root (this also covers cycles).
    #[error("node {node} is not reachable from the root")]
    UnreachableNode {
        /// The first unreachable node.
        node: usize,
    },

    /// Returned when the declared `max_depth` differs from the longest root-to-leaf path.
    #[error("declared max_depth {declared} does not match computed depth {computed}")]
    DepthMismatch {
        /// Depth declared by the producer.
        declared: usize,
        /// Depth computed from the node arrays.
        computed: usize,
    },

    /// Returned when the number of feature names differs from `n_features`.
    #[error("got {got} feature names, expected {expected}")]
    FeatureNameCountMismatch {
        /// The model's feature count.
        expected: usize,
        /// Number of names supplied.
        got: usize,
    },

    /// Returned when feature names are requested but the model carries none.
    #[error("feature names were requested but the model has none")]
    MissingFeatureNames,

    /// Returned when a feature name cannot be written to the text layout.
    #[error("feature name {index} ({name:?}) contains a tab or line break")]
    UnrepresentableFeatureName {
        /// Zero-based feature index.
        index: usize,
        /// The offending name.
        name: String,
    },

    /// Returned when a decoded feature name is not valid UTF-8.
    #[error("feature name {index} is not valid UTF-8")]
    InvalidUtf8Name {
        /// Zero-based feature index.
        index: usize,
    },

    /// Returned when a dimension does not fit the 32-bit layout fields.
    #[error("{field} = {value} does not fit in a 32-bit layout field")]
    DimensionOverflow {
        /// The field being encoded.
        field: &'static str,
        /// The value that overflowed.
        value: usize,
    },

    /// Returned when a decoded size field is negative.
    #[error("decoded {field} is negative ({value})")]
    NegativeDimension {
        /// The field being decoded.
        field: &'static str,
        /// The decoded value.
        value: i32,
    },

    /// Returned when a sample has a different number of features than the model.
    #[error("sample has {got} features, expected {expected}")]
    SampleFeatureMismatch {
        /// The model's feature count.
        expected: usize,
        /// The sample's length.
        got: usize,
    },

    /// Returned when a forest is built from zero estimators.
    #[error("forest has no estimators")]
    EmptyForest,

    /// Returned when an estimator disagrees with the forest-level metadata.
    #[error("estimator {estimator} disagrees with the forest on {field}")]
    EstimatorMismatch {
        /// Zero-based estimator index.
        estimator: usize,
        /// The metadata field that differs.
        field: &'static str,
    },

    /// Returned when a forest declares anything other than a single output.
    #[error("forest declares {n_outputs} outputs; only single-output forests are supported")]
    UnsupportedOutputs {
        /// The decoded output count.
        n_outputs: usize,
    },

    /// Returned when an estimator index is past the end of the forest.
    #[error("estimator {index} requested, forest has {n_estimators}")]
    EstimatorOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of estimators in the forest.
        n_estimators: usize,
    },

    /// Returned when a text layout section header is missing or different.
    #[error("line {line}: expected section header \"# {expected}\"")]
    MissingSection {
        /// One-based line number.
        line: usize,
        /// The header text expected after `# `.
        expected: &'static str,
    },

    /// Returned when a text layout line holds the wrong number of values.
    #[error("line {line}: {field} has {got} values, expected {expected}")]
    TokenCountMismatch {
        /// One-based line number.
        line: usize,
        /// The array being decoded.
        field: &'static str,
        /// Expected number of values.
        expected: usize,
        /// Number of values found.
        got: usize,
    },

    /// Returned when a text layout token cannot be parsed as the expected type.
    #[error("line {line}: cannot parse {token:?} as a value of {field}")]
    InvalidToken {
        /// One-based line number.
        line: usize,
        /// The array being decoded.
        field: &'static str,
        /// The raw token.
        token: String,
    },

    /// Returned when the external fitting routine fails.
    #[error("external fitting routine failed")]
    Fit {
        /// The fitter's own error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Returned when the destination or source stream fails.
    #[error("model stream I/O failed")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Returned when writing a model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying error.
        source: Box<ModelError>,
    },

    /// Returned when reading a model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying error.
        source: Box<ModelError>,
    },
}

impl ModelError {
    /// Classify this error as a type, value or I/O failure.
    ///
    /// File-level wrappers report the kind of the error they wrap.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::InvalidToken { .. } => ErrorKind::Type,
            ModelError::Io { .. } => ErrorKind::Io,
            ModelError::WriteModel { source, .. } | ModelError::ReadModel { source, .. } => {
                source.kind()
            }
            _ => ErrorKind::Value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_are_type_kind() {
        let err = ModelError::InvalidToken {
            line: 3,
            field: "classes",
            token: "abc".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn stream_errors_are_io_kind() {
        let err = ModelError::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn path_wrappers_report_inner_kind() {
        let err = ModelError::ReadModel {
            path: PathBuf::from("model.bin"),
            source: Box::new(ModelError::MissingFeatureNames),
        };
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn mismatch_message_carries_counts() {
        let err = ModelError::SampleFeatureMismatch {
            expected: 4,
            got: 2,
        };
        assert_eq!(err.to_string(), "sample has 2 features, expected 4");
    }
}
