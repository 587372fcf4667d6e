//! Error types for sparsetree-data.

use std::path::PathBuf;

use sparsetree_model::ErrorKind;

/// Errors from dataset partitioning and CSV sample I/O.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Returned when there are no rows to partition.
    #[error("cannot partition an empty dataset")]
    EmptyInput,

    /// Returned when features, labels and ids are not row-aligned.
    #[error("row counts differ: {features} feature rows, {labels} labels, {ids} ids")]
    LengthMismatch {
        /// Number of feature rows.
        features: usize,
        /// Number of labels.
        labels: usize,
        /// Number of ids.
        ids: usize,
    },

    /// Returned when a fractional split size is outside `[0, 1]` or not finite.
    #[error("{name} ({value}) must be in the range [0.0, 1.0]")]
    FractionOutOfRange {
        /// Which split size (`train_size`, `val_size`, `test_size`).
        name: &'static str,
        /// The offending fraction.
        value: f64,
    },

    /// Returned when an absolute split size exceeds the number of rows.
    #[error("{name} ({rows}) must be in the range [0, {total}]")]
    RowCountOutOfRange {
        /// Which split size.
        name: &'static str,
        /// The offending row count.
        rows: usize,
        /// Total number of rows.
        total: usize,
    },

    /// Returned when the three split sizes do not add up to the whole dataset.
    #[error("split sizes add up to {sum}; they must sum to 1.0 or to exactly {total} rows")]
    SizesDoNotSum {
        /// Sum of the sizes as given.
        sum: f64,
        /// Total number of rows.
        total: usize,
    },

    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} (id {row_id}) has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Id of the offending row.
        row_id: String,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a feature cell is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column {column:?}, raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Header name of the column.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when a label cell is not a 32-bit integer.
    #[error("invalid label in {path}: row {row_index}, raw value \"{raw}\"")]
    InvalidLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when the same row id appears more than once.
    #[error("duplicate row id \"{row_id}\" in {path}: first at row {first_row}, again at row {second_row}")]
    DuplicateRowId {
        /// Path to the CSV file.
        path: PathBuf,
        /// The duplicated id.
        row_id: String,
        /// Zero-based row index of the first occurrence.
        first_row: usize,
        /// Zero-based row index of the second occurrence.
        second_row: usize,
    },

    /// Returned when the requested label column is not in the header.
    #[error("label column \"{column}\" not found in {path}")]
    MissingLabelColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The requested column name.
        column: String,
    },

    /// Returned when the header has no columns besides the id and label.
    #[error("no feature columns in {path}")]
    NoFeatureColumns {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when the output file prefix contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid output prefix \"{prefix}\": must match [a-zA-Z0-9_-]+")]
    InvalidPrefix {
        /// The invalid prefix.
        prefix: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a split file cannot be written.
    #[error("cannot write file {path}")]
    WriteCsv {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

impl DataError {
    /// Classify this error as a type, value or I/O failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::InvalidLabel { .. } => ErrorKind::Type,
            DataError::FileNotFound { .. }
            | DataError::OutputDirCreate { .. }
            | DataError::WriteCsv { .. } => ErrorKind::Io,
            _ => ErrorKind::Value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_errors_are_value_kind() {
        let err = DataError::SizesDoNotSum { sum: 0.9, total: 10 };
        assert_eq!(err.kind(), ErrorKind::Value);
        assert!(err.to_string().contains("0.9"));
    }

    #[test]
    fn missing_file_is_io_kind() {
        let err = DataError::FileNotFound {
            path: PathBuf::from("nope.csv"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "file not found: nope.csv");
    }

    #[test]
    fn bad_label_is_type_kind() {
        let err = DataError::InvalidLabel {
            path: PathBuf::from("a.csv"),
            row_index: 0,
            raw: "x".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
