//! Binary and text encoding of a [`ForestModel`], plus random access to
//! single estimators of a binary forest.
//!
//! A forest blob is a forest header, an offset table of per-estimator binary
//! sizes, the shared class list and optional names, then each estimator's
//! tree blob without names.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::ModelError;
use crate::forest::ForestModel;
use crate::layout::{
    BinarySink, BinarySource, Format, Sink, Source, TextSink, TextSource, to_i32, to_usize,
};
use crate::tree::TreeModel;
use crate::tree_codec::{CLASSES, FEATURE_NAMES, names_size};

const FOREST_SIZES: &str = "Sizes (NFeatures, NClasses, NOutputs, NEstimators)";
const ESTIMATOR_SIZES: &str = "Estimator Sizes";

/// Everything in a forest blob ahead of the first tree.
#[derive(Debug, Clone)]
struct ForestHeader {
    n_features: usize,
    n_estimators: usize,
    estimator_sizes: Vec<usize>,
    classes: Vec<i32>,
    feature_names: Option<Vec<String>>,
}

impl ForestHeader {
    fn read<S: Source>(source: &mut S, with_feature_names: bool) -> Result<Self, ModelError> {
        source.header(FOREST_SIZES)?;
        let sizes = source.ints(4, "forest sizes")?;
        let n_features = to_usize("n_features", sizes[0])?;
        let n_classes = to_usize("n_classes", sizes[1])?;
        let n_outputs = to_usize("n_outputs", sizes[2])?;
        let n_estimators = to_usize("n_estimators", sizes[3])?;
        if n_outputs != 1 {
            return Err(ModelError::UnsupportedOutputs { n_outputs });
        }

        source.header(ESTIMATOR_SIZES)?;
        let estimator_sizes = source
            .ints(n_estimators, "estimator sizes")?
            .into_iter()
            .map(|s| to_usize("estimator size", s))
            .collect::<Result<Vec<_>, _>>()?;

        source.header(CLASSES)?;
        let classes = source.ints(n_classes, "classes")?;
        let feature_names = if source.has_section(FEATURE_NAMES, with_feature_names)? {
            source.header(FEATURE_NAMES)?;
            Some(source.names(n_features)?)
        } else {
            None
        };

        Ok(Self {
            n_features,
            n_estimators,
            estimator_sizes,
            classes,
            feature_names,
        })
    }

    /// Read estimator `index` from `source` and check it against the header.
    fn read_estimator<S: Source>(&self, source: &mut S, index: usize) -> Result<TreeModel, ModelError> {
        let tree = TreeModel::read_tree(source, false)?;
        let mismatch = |field| ModelError::EstimatorMismatch {
            estimator: index,
            field,
        };
        if tree.n_features() != self.n_features {
            return Err(mismatch("n_features"));
        }
        if tree.classes() != self.classes.as_slice() {
            return Err(mismatch("classes"));
        }
        if tree.unnamed_size() != self.estimator_sizes[index] {
            return Err(mismatch("estimator size"));
        }
        Ok(tree)
    }

    fn read_forest<S: Source>(self, source: &mut S) -> Result<ForestModel, ModelError> {
        let estimators = (0..self.n_estimators)
            .map(|i| self.read_estimator(source, i))
            .collect::<Result<Vec<_>, _>>()?;
        let forest = ForestModel::new(estimators)?;
        match self.feature_names {
            Some(names) => forest.with_feature_names(names),
            None => Ok(forest),
        }
    }
}

impl ForestModel {
    /// Write this forest to `dest` in the chosen layout.
    ///
    /// The offset table is computed for every estimator before the first
    /// byte is written. Estimator sizes are binary lengths in both layouts.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::MissingFeatureNames`] | names requested but none attached |
    /// | [`ModelError::UnrepresentableFeatureName`] | a name holds a tab or line break (text only) |
    /// | [`ModelError::DimensionOverflow`] | a size does not fit an `i32` field |
    /// | [`ModelError::Io`] | the destination failed |
    #[instrument(skip(self, dest), fields(n_estimators = self.n_estimators()))]
    pub fn serialize<W: Write>(
        &self,
        dest: &mut W,
        with_feature_names: bool,
        format: Format,
    ) -> Result<(), ModelError> {
        let names = self.requested_names(with_feature_names)?;
        let sizes = self.estimator_sizes();
        debug!(?sizes, "estimator sizes computed");
        match format {
            Format::Binary => {
                let mut sink = BinarySink::new(dest);
                self.write_forest(&mut sink, names, &sizes)?;
                sink.finish()?;
                debug!(bytes = sink.written(), "forest written");
            }
            Format::Text => {
                let mut sink = TextSink::new(dest);
                self.write_forest(&mut sink, names, &sizes)?;
                sink.finish()?;
            }
        }
        Ok(())
    }

    /// Encode this forest into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Same as [`ForestModel::serialize`].
    pub fn to_bytes(&self, with_feature_names: bool, format: Format) -> Result<Vec<u8>, ModelError> {
        let mut buf = Vec::new();
        self.serialize(&mut buf, with_feature_names, format)?;
        Ok(buf)
    }

    /// Exact number of bytes the binary layout of this forest occupies.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingFeatureNames`] when names are requested
    /// but none are attached.
    pub fn size_in_bytes(&self, with_feature_names: bool) -> Result<usize, ModelError> {
        let names = self.requested_names(with_feature_names)?;
        let header = (4 + self.n_estimators() + self.n_classes()) * 4;
        let trees: usize = self.estimator_sizes().iter().sum();
        Ok(header + names.map_or(0, names_size) + trees)
    }

    /// Read a whole forest back from either layout.
    ///
    /// As with trees, the binary layout relies on `with_feature_names` to
    /// know whether the name section is present; text detects it.
    ///
    /// # Errors
    ///
    /// Any decoding error of [`TreeModel::deserialize`], plus:
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::UnsupportedOutputs`] | `n_outputs != 1` |
    /// | [`ModelError::EmptyForest`] | zero estimators |
    /// | [`ModelError::EstimatorMismatch`] | a tree disagrees with the header or its offset-table entry |
    #[instrument(skip(src))]
    pub fn deserialize<R: BufRead>(
        src: &mut R,
        with_feature_names: bool,
        format: Format,
    ) -> Result<Self, ModelError> {
        let forest = match format {
            Format::Binary => {
                let mut source = BinarySource::new(src);
                ForestHeader::read(&mut source, with_feature_names)?.read_forest(&mut source)?
            }
            Format::Text => {
                let mut source = TextSource::new(src);
                ForestHeader::read(&mut source, with_feature_names)?.read_forest(&mut source)?
            }
        };
        debug!(n_estimators = forest.n_estimators(), "forest decoded");
        Ok(forest)
    }

    /// Write this forest to a file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WriteModel`] wrapping any error of
    /// [`ForestModel::serialize`] or of creating the file.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        with_feature_names: bool,
        format: Format,
    ) -> Result<(), ModelError> {
        let path = path.as_ref();
        let write = || -> Result<(), ModelError> {
            let mut out = BufWriter::new(File::create(path)?);
            self.serialize(&mut out, with_feature_names, format)
        };
        write().map_err(|e| ModelError::WriteModel {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        info!(n_estimators = self.n_estimators(), ?format, "forest saved");
        Ok(())
    }

    /// Read a forest from a file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ReadModel`] wrapping any error of
    /// [`ForestModel::deserialize`] or of opening the file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(
        path: impl AsRef<Path>,
        with_feature_names: bool,
        format: Format,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let read = || -> Result<Self, ModelError> {
            let mut input = BufReader::new(File::open(path)?);
            Self::deserialize(&mut input, with_feature_names, format)
        };
        let forest = read().map_err(|e| ModelError::ReadModel {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        info!(n_estimators = forest.n_estimators(), "forest loaded");
        Ok(forest)
    }

    fn requested_names(&self, with_feature_names: bool) -> Result<Option<&[String]>, ModelError> {
        if !with_feature_names {
            return Ok(None);
        }
        self.feature_names()
            .map(Some)
            .ok_or(ModelError::MissingFeatureNames)
    }

    fn write_forest<S: Sink>(
        &self,
        sink: &mut S,
        names: Option<&[String]>,
        sizes: &[usize],
    ) -> Result<(), ModelError> {
        sink.header(FOREST_SIZES)?;
        sink.ints(&[
            to_i32("n_features", self.n_features())?,
            to_i32("n_classes", self.n_classes())?,
            to_i32("n_outputs", self.n_outputs())?,
            to_i32("n_estimators", self.n_estimators())?,
        ])?;
        sink.header(ESTIMATOR_SIZES)?;
        let sizes = sizes
            .iter()
            .map(|&s| to_i32("estimator size", s))
            .collect::<Result<Vec<_>, _>>()?;
        sink.ints(&sizes)?;
        sink.header(CLASSES)?;
        sink.ints(self.classes())?;
        if let Some(names) = names {
            sink.header(FEATURE_NAMES)?;
            sink.names(names)?;
        }
        for tree in self.estimators() {
            tree.write_tree(sink, None)?;
        }
        Ok(())
    }
}

/// Random access to the estimators of a binary forest blob.
///
/// The header and offset table are read once; each
/// [`load_estimator`](ForestReader::load_estimator) call seeks straight to
/// the requested tree without decoding the ones before it.
#[derive(Debug)]
pub struct ForestReader<R: BufRead + Seek> {
    reader: R,
    header: ForestHeader,
    /// Absolute stream position of each tree blob.
    offsets: Vec<u64>,
}

impl<R: BufRead + Seek> ForestReader<R> {
    /// Read the forest header and offset table from the current position.
    ///
    /// # Errors
    ///
    /// Any header error of [`ForestModel::deserialize`], or
    /// [`ModelError::Io`] if the stream position cannot be queried.
    #[instrument(skip(reader))]
    pub fn new(mut reader: R, with_feature_names: bool) -> Result<Self, ModelError> {
        let start = reader.stream_position()?;
        let mut source = BinarySource::new(&mut reader);
        let header = ForestHeader::read(&mut source, with_feature_names)?;
        let header_len = source.consumed() as u64;

        let mut offsets = Vec::with_capacity(header.n_estimators);
        let mut offset = start + header_len;
        for &size in &header.estimator_sizes {
            offsets.push(offset);
            offset += size as u64;
        }

        debug!(
            n_estimators = header.n_estimators,
            header_len, "forest header read"
        );
        Ok(Self {
            reader,
            header,
            offsets,
        })
    }

    /// Load estimator `index` by seeking past the ones before it.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::EstimatorOutOfRange`] | `index >= n_estimators` |
    /// | [`ModelError::EstimatorMismatch`] | the tree disagrees with the header |
    ///
    /// Any decoding error of [`TreeModel::deserialize`].
    pub fn load_estimator(&mut self, index: usize) -> Result<TreeModel, ModelError> {
        let offset = *self
            .offsets
            .get(index)
            .ok_or(ModelError::EstimatorOutOfRange {
                index,
                n_estimators: self.header.n_estimators,
            })?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let tree = self
            .header
            .read_estimator(&mut BinarySource::new(&mut self.reader), index)?;
        debug!(index, offset, "estimator loaded");
        Ok(tree)
    }

    /// Load every estimator and assemble the full forest.
    ///
    /// # Errors
    ///
    /// Any error of [`ForestReader::load_estimator`] or [`ForestModel::new`].
    pub fn into_forest(mut self) -> Result<ForestModel, ModelError> {
        let estimators = (0..self.n_estimators())
            .map(|i| self.load_estimator(i))
            .collect::<Result<Vec<_>, _>>()?;
        let forest = ForestModel::new(estimators)?;
        match self.header.feature_names {
            Some(names) => forest.with_feature_names(names),
            None => Ok(forest),
        }
    }

    /// Return the number of estimators.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.header.n_estimators
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.header.n_features
    }

    /// Return the class labels in output order.
    #[must_use]
    pub fn classes(&self) -> &[i32] {
        &self.header.classes
    }

    /// Return the forest-level feature names, if present.
    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        self.header.feature_names.as_deref()
    }

    /// Return the offset table.
    #[must_use]
    pub fn estimator_sizes(&self) -> &[usize] {
        &self.header.estimator_sizes
    }
}

impl ForestReader<BufReader<File>> {
    /// Open a binary forest file for random access.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ReadModel`] when the file cannot be opened or
    /// its header is invalid.
    pub fn open(path: impl AsRef<Path>, with_feature_names: bool) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let open = || -> Result<Self, ModelError> {
            Self::new(BufReader::new(File::open(path)?), with_feature_names)
        };
        open().map_err(|e| ModelError::ReadModel {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}
