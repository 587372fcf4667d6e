//! Domain types for sparsetree-data.

use crate::DataError;

/// A sample identifier, taken from the first column of a sample CSV.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    /// Create a row id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated prefix for split file names.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPrefix(String);

impl SplitPrefix {
    /// Parse and validate a prefix.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidPrefix`] if the prefix is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(prefix: String) -> Result<Self, DataError> {
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DataError::InvalidPrefix { prefix });
        }
        Ok(Self(prefix))
    }

    /// Return the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SplitPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Samples read from a CSV file.
///
/// Ids, feature rows and labels are parallel vectors: `ids[i]` corresponds
/// to `features[i]` and, when a label column was read, `labels[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    ids: Vec<RowId>,
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Option<Vec<i32>>,
}

impl SampleTable {
    pub(crate) fn new(
        ids: Vec<RowId>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        labels: Option<Vec<i32>>,
    ) -> Self {
        Self {
            ids,
            feature_names,
            features,
            labels,
        }
    }

    /// Return the row ids.
    #[must_use]
    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the labels, if a label column was read.
    #[must_use]
    pub fn labels(&self) -> Option<&[i32]> {
        self.labels.as_deref()
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.ids.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}
