//! CSV writer for train/validation/test partitions.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::DataError;
use crate::domain::{RowId, SplitPrefix};
use crate::partition::{Partition, Splits};

/// Writes the three partitions of a [`Splits`] to CSV files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{prefix}_train.csv`, `{prefix}_val.csv` and
/// `{prefix}_test.csv`, each with the header `id,<features...>,label`.
#[derive(Debug)]
pub struct SplitWriter {
    output_dir: PathBuf,
    prefix: SplitPrefix,
}

/// Paths written by [`SplitWriter::write`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SplitPaths {
    /// Training partition file.
    pub train: PathBuf,
    /// Validation partition file.
    pub val: PathBuf,
    /// Test partition file.
    pub test: PathBuf,
}

impl SplitWriter {
    /// Create a new writer targeting the given directory and file prefix.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), prefix = %prefix))]
    pub fn new(output_dir: &Path, prefix: SplitPrefix) -> Result<Self, DataError> {
        fs::create_dir_all(output_dir).map_err(|e| DataError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            prefix,
        })
    }

    /// Write all three partitions, including an empty validation file when
    /// `val` has no rows.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::WriteCsv`] if a file cannot be written.
    #[instrument(skip_all)]
    pub fn write(
        &self,
        feature_names: &[String],
        splits: &Splits<i32, RowId>,
    ) -> Result<SplitPaths, DataError> {
        let paths = SplitPaths {
            train: self.path_for("train"),
            val: self.path_for("val"),
            test: self.path_for("test"),
        };
        write_partition(&paths.train, feature_names, &splits.train)?;
        write_partition(&paths.val, feature_names, &splits.val)?;
        write_partition(&paths.test, feature_names, &splits.test)?;

        info!(
            train = splits.train.len(),
            val = splits.val.len(),
            test = splits.test.len(),
            "splits written"
        );
        Ok(paths)
    }

    fn path_for(&self, split: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{split}.csv", self.prefix.as_str()))
    }
}

fn write_partition(
    path: &Path,
    feature_names: &[String],
    part: &Partition<i32, RowId>,
) -> Result<(), DataError> {
    let to_error = |e: csv::Error| DataError::WriteCsv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(to_error)?;

    let mut header = Vec::with_capacity(feature_names.len() + 2);
    header.push("id");
    header.extend(feature_names.iter().map(String::as_str));
    header.push("label");
    wtr.write_record(&header).map_err(to_error)?;

    let mut record = Vec::with_capacity(header.len());
    for ((id, row), label) in part.ids.iter().zip(&part.features).zip(&part.labels) {
        record.clear();
        record.push(id.as_str().to_string());
        record.extend(row.iter().map(f64::to_string));
        record.push(label.to_string());
        wtr.write_record(&record).map_err(to_error)?;
    }
    wtr.flush().map_err(|e| to_error(e.into()))?;

    debug!(path = %path.display(), rows = part.len(), "partition written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn splits() -> Splits<i32, RowId> {
        let part = |ids: &[&str], label: i32| Partition {
            features: ids.iter().map(|_| vec![1.5, -0.25]).collect(),
            labels: vec![label; ids.len()],
            ids: ids.iter().map(|&s| RowId::new(s)).collect(),
        };
        Splits {
            train: part(&["a", "b"], 1),
            val: part(&[], 1),
            test: part(&["c"], 2),
        }
    }

    #[test]
    fn writes_three_files_with_header() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        let writer = SplitWriter::new(&out, SplitPrefix::new("exp".into()).unwrap()).unwrap();
        let names = vec!["nnz".to_string(), "density".to_string()];
        let paths = writer.write(&names, &splits()).unwrap();

        assert_eq!(paths.train, out.join("exp_train.csv"));
        let train = fs::read_to_string(&paths.train).unwrap();
        assert_eq!(train, "id,nnz,density,label\na,1.5,-0.25,1\nb,1.5,-0.25,1\n");
        let val = fs::read_to_string(&paths.val).unwrap();
        assert_eq!(val, "id,nnz,density,label\n");
        let test = fs::read_to_string(&paths.test).unwrap();
        assert_eq!(test.lines().count(), 2);
    }

    #[test]
    fn output_dir_over_a_file_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = SplitWriter::new(&blocker.join("sub"), SplitPrefix::new("p".into()).unwrap())
            .unwrap_err();
        assert!(matches!(err, DataError::OutputDirCreate { .. }));
    }
}
