//! CSV sample reader with full input validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::DataError;
use crate::domain::{RowId, SampleTable};

/// Reads labeled or unlabeled samples from a CSV file.
///
/// Expected CSV format:
/// - Header row required; the first column is the row id
/// - One optional label column, chosen by name, holding `i32` labels
/// - Every other column is a finite `f64` feature
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DataError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`DataError::CsvParse`] | Malformed CSV record |
/// | [`DataError::MissingLabelColumn`] | Label column not in the header |
/// | [`DataError::NoFeatureColumns`] | Only id (and label) columns present |
/// | [`DataError::EmptyDataset`] | Zero data rows after header |
/// | [`DataError::InconsistentRowLength`] | Row has different column count than header |
/// | [`DataError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable float |
/// | [`DataError::InvalidLabel`] | Label cell is not an integer |
/// | [`DataError::DuplicateRowId`] | Same id appears twice |
#[derive(Debug, Clone)]
pub struct SampleReader {
    path: PathBuf,
    label_column: Option<String>,
}

impl SampleReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            label_column: None,
        }
    }

    /// Read labels from the named column.
    #[must_use]
    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    fn csv_error(&self, e: csv::Error) -> DataError {
        DataError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    /// Read and validate the CSV file, returning a [`SampleTable`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<SampleTable, DataError> {
        let file = std::fs::File::open(&self.path).map_err(|e| DataError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) lets our own InconsistentRowLength check fire
        // instead of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let expected_cols = header.len();

        let label_col = match &self.label_column {
            Some(name) => Some(
                header
                    .iter()
                    .skip(1)
                    .position(|h| h == name)
                    .map(|p| p + 1)
                    .ok_or_else(|| DataError::MissingLabelColumn {
                        path: self.path.clone(),
                        column: name.clone(),
                    })?,
            ),
            None => None,
        };
        let feature_cols: Vec<usize> = (1..expected_cols)
            .filter(|&c| Some(c) != label_col)
            .collect();
        if feature_cols.is_empty() {
            return Err(DataError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let feature_names: Vec<String> = feature_cols
            .iter()
            .map(|&c| header.get(c).unwrap_or_default().to_string())
            .collect();
        debug!(expected_cols, ?label_col, "read CSV header");

        let mut ids = Vec::new();
        let mut features = Vec::new();
        let mut labels = label_col.map(|_| Vec::new());
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            let row_id = record.get(0).unwrap_or_default().to_string();

            if record.len() != expected_cols {
                return Err(DataError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    row_id,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            if let Some(&first_row) = seen.get(&row_id) {
                return Err(DataError::DuplicateRowId {
                    path: self.path.clone(),
                    row_id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(row_id.clone(), row_index);

            let mut row = Vec::with_capacity(feature_cols.len());
            for (&col, name) in feature_cols.iter().zip(&feature_names) {
                let raw = record.get(col).unwrap_or_default().trim();
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| DataError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        column: name.clone(),
                        raw: raw.to_string(),
                    })?;
                row.push(value);
            }

            if let (Some(col), Some(labels)) = (label_col, labels.as_mut()) {
                let raw = record.get(col).unwrap_or_default().trim();
                let label = raw.parse::<i32>().map_err(|_| DataError::InvalidLabel {
                    path: self.path.clone(),
                    row_index,
                    raw: raw.to_string(),
                })?;
                labels.push(label);
            }

            ids.push(RowId::new(row_id));
            features.push(row);
        }

        if ids.is_empty() {
            return Err(DataError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = ids.len(),
            n_features = feature_names.len(),
            labeled = labels.is_some(),
            "samples loaded"
        );

        Ok(SampleTable::new(ids, feature_names, features, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_labeled_samples() {
        let f = write_csv("matrix,nnz,label,rows\nA,10,3,2.5\nB,20,1,4.0\n");
        let table = SampleReader::new(f.path())
            .with_label_column("label")
            .read()
            .unwrap();
        assert_eq!(table.n_samples(), 2);
        assert_eq!(table.feature_names(), &["nnz".to_string(), "rows".to_string()]);
        assert_eq!(table.features()[1], vec![20.0, 4.0]);
        assert_eq!(table.labels(), Some(&[3, 1][..]));
        assert_eq!(table.ids()[0].as_str(), "A");
    }

    #[test]
    fn read_unlabeled_samples() {
        let f = write_csv("id,x\nr1,0.5\n");
        let table = SampleReader::new(f.path()).read().unwrap();
        assert!(table.labels().is_none());
        assert_eq!(table.n_features(), 1);
    }

    #[test]
    fn missing_file() {
        let err = SampleReader::new(Path::new("/nonexistent/samples.csv"))
            .read()
            .unwrap_err();
        assert!(matches!(err, DataError::FileNotFound { .. }));
    }

    #[test]
    fn missing_label_column() {
        let f = write_csv("id,x\nr1,0.5\n");
        let err = SampleReader::new(f.path())
            .with_label_column("class")
            .read()
            .unwrap_err();
        assert!(matches!(err, DataError::MissingLabelColumn { column, .. } if column == "class"));
    }

    #[test]
    fn id_column_cannot_be_label() {
        let f = write_csv("label,x\n1,0.5\n");
        let err = SampleReader::new(f.path())
            .with_label_column("label")
            .read()
            .unwrap_err();
        assert!(matches!(err, DataError::MissingLabelColumn { .. }));
    }

    #[test]
    fn label_only_has_no_features() {
        let f = write_csv("id,label\nr1,1\n");
        let err = SampleReader::new(f.path())
            .with_label_column("label")
            .read()
            .unwrap_err();
        assert!(matches!(err, DataError::NoFeatureColumns { .. }));
    }

    #[test]
    fn header_only_is_empty() {
        let f = write_csv("id,x\n");
        let err = SampleReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, DataError::EmptyDataset { .. }));
    }

    #[test]
    fn short_row() {
        let f = write_csv("id,x,y\nr1,1.0,2.0\nr2,3.0\n");
        let err = SampleReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            DataError::InconsistentRowLength {
                row_index: 1,
                expected: 3,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn nan_feature() {
        let f = write_csv("id,x,y\nr1,1.0,NaN\n");
        let err = SampleReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, DataError::NonFiniteValue { column, raw, .. } if column == "y" && raw == "NaN"));
    }

    #[test]
    fn non_integer_label() {
        let f = write_csv("id,x,label\nr1,1.0,2.5\n");
        let err = SampleReader::new(f.path())
            .with_label_column("label")
            .read()
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidLabel { .. }));
    }

    #[test]
    fn duplicate_id() {
        let f = write_csv("id,x\nr1,1.0\nr2,2.0\nr1,3.0\n");
        let err = SampleReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            DataError::DuplicateRowId {
                first_row: 0,
                second_row: 2,
                ..
            }
        ));
    }
}
