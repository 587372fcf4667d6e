//! Binary and text encoding of a single [`TreeModel`].

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::layout::{
    BinarySink, BinarySource, Format, Sink, Source, TextSink, TextSource, to_i32, to_usize,
};
use crate::tree::{TreeArrays, TreeModel};
use crate::ModelError;

pub(crate) const TREE_SIZES: &str = "Sizes (NFeatures, Nclasses, NodeCount, MaxDepth)";
pub(crate) const CLASSES: &str = "Classes";
pub(crate) const FEATURE_NAMES: &str = "Feature Names";
const LEFT: &str = "Left";
const RIGHT: &str = "Right";
const THRESHOLD: &str = "Threshold";
const FEATURE: &str = "Feature";
const VALUES: &str = "Values";

/// Binary length of the feature-name section for `names`.
pub(crate) fn names_size(names: &[String]) -> usize {
    names.len() * 4 + names.iter().map(String::len).sum::<usize>()
}

impl TreeModel {
    /// Write this tree to `dest` in the chosen layout.
    ///
    /// When `with_feature_names` is set, the names attached to the model are
    /// written between the class list and the node arrays.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::MissingFeatureNames`] | names requested but none attached |
    /// | [`ModelError::UnrepresentableFeatureName`] | a name holds a tab or line break (text only) |
    /// | [`ModelError::Io`] | the destination failed |
    #[instrument(skip(self, dest), fields(node_count = self.node_count()))]
    pub fn serialize<W: Write>(
        &self,
        dest: &mut W,
        with_feature_names: bool,
        format: Format,
    ) -> Result<(), ModelError> {
        let names = self.requested_names(with_feature_names)?;
        match format {
            Format::Binary => {
                let mut sink = BinarySink::new(dest);
                self.write_tree(&mut sink, names)?;
                sink.finish()?;
                debug!(bytes = sink.written(), "tree written");
            }
            Format::Text => {
                let mut sink = TextSink::new(dest);
                self.write_tree(&mut sink, names)?;
                sink.finish()?;
            }
        }
        Ok(())
    }

    /// Encode this tree into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Same as [`TreeModel::serialize`].
    pub fn to_bytes(&self, with_feature_names: bool, format: Format) -> Result<Vec<u8>, ModelError> {
        let mut buf = Vec::new();
        self.serialize(&mut buf, with_feature_names, format)?;
        Ok(buf)
    }

    /// Exact number of bytes the binary layout of this tree occupies.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingFeatureNames`] when names are requested
    /// but none are attached.
    pub fn size_in_bytes(&self, with_feature_names: bool) -> Result<usize, ModelError> {
        let names = self.requested_names(with_feature_names)?;
        Ok(self.unnamed_size() + names.map_or(0, names_size))
    }

    /// Binary length without the name section; this is the size a forest
    /// records for each estimator.
    pub(crate) fn unnamed_size(&self) -> usize {
        let header = (4 + self.n_classes()) * 4;
        let nodes = self.node_count() * (12 + 8 * (1 + self.n_classes()));
        header + nodes
    }

    /// Read a tree back from either layout and validate it.
    ///
    /// The binary layout has no marker for the name section, so the caller
    /// states whether it is there. The text layout detects it from its
    /// header and ignores `with_feature_names`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::Io`] | the source failed or ended early |
    /// | [`ModelError::NegativeDimension`] | a decoded size is negative |
    /// | [`ModelError::MissingSection`] | a text header is missing |
    /// | [`ModelError::TokenCountMismatch`] | a text line has the wrong length |
    /// | [`ModelError::InvalidToken`] | a text token does not parse |
    /// | [`ModelError::InvalidUtf8Name`] | a binary name is not UTF-8 |
    ///
    /// Any error of [`TreeModel::from_arrays`] for structurally invalid trees.
    #[instrument(skip(src))]
    pub fn deserialize<R: BufRead>(
        src: &mut R,
        with_feature_names: bool,
        format: Format,
    ) -> Result<Self, ModelError> {
        let model = match format {
            Format::Binary => Self::read_tree(&mut BinarySource::new(src), with_feature_names)?,
            Format::Text => Self::read_tree(&mut TextSource::new(src), with_feature_names)?,
        };
        debug!(
            node_count = model.node_count(),
            n_classes = model.n_classes(),
            "tree decoded"
        );
        Ok(model)
    }

    /// Write this tree to a file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WriteModel`] wrapping any error of
    /// [`TreeModel::serialize`] or of creating the file.
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

        info!(node_count = self.node_count(), ?format, "tree saved");
        Ok(())
    }

    /// Read a tree from a file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ReadModel`] wrapping any error of
    /// [`TreeModel::deserialize`] or of opening the file.
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
        let model = read().map_err(|e| ModelError::ReadModel {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        info!(node_count = model.node_count(), "tree loaded");
        Ok(model)
    }

    fn requested_names(&self, with_feature_names: bool) -> Result<Option<&[String]>, ModelError> {
        if !with_feature_names {
            return Ok(None);
        }
        self.feature_names()
            .map(Some)
            .ok_or(ModelError::MissingFeatureNames)
    }

    /// Write every section of the tree. `names` is `None` to omit the name section.
    pub(crate) fn write_tree<S: Sink>(
        &self,
        sink: &mut S,
        names: Option<&[String]>,
    ) -> Result<(), ModelError> {
        sink.header(TREE_SIZES)?;
        sink.ints(&[
            to_i32("n_features", self.n_features())?,
            to_i32("n_classes", self.n_classes())?,
            to_i32("node_count", self.node_count())?,
            to_i32("max_depth", self.max_depth())?,
        ])?;
        sink.header(CLASSES)?;
        sink.ints(self.classes())?;
        if let Some(names) = names {
            sink.header(FEATURE_NAMES)?;
            sink.names(names)?;
        }
        sink.header(LEFT)?;
        sink.ints(self.children_left())?;
        sink.header(RIGHT)?;
        sink.ints(self.children_right())?;
        sink.header(THRESHOLD)?;
        sink.floats(self.threshold())?;
        sink.header(FEATURE)?;
        sink.ints(self.feature())?;
        sink.header(VALUES)?;
        for node in 0..self.node_count() {
            sink.floats(self.value(node))?;
        }
        Ok(())
    }

    /// Read every section of one tree and validate the result.
    pub(crate) fn read_tree<S: Source>(
        source: &mut S,
        with_feature_names: bool,
    ) -> Result<Self, ModelError> {
        source.header(TREE_SIZES)?;
        let sizes = source.ints(4, "tree sizes")?;
        let n_features = to_usize("n_features", sizes[0])?;
        let n_classes = to_usize("n_classes", sizes[1])?;
        let node_count = to_usize("node_count", sizes[2])?;
        let max_depth = to_usize("max_depth", sizes[3])?;

        source.header(CLASSES)?;
        let classes = source.ints(n_classes, "classes")?;
        let names = if source.has_section(FEATURE_NAMES, with_feature_names)? {
            source.header(FEATURE_NAMES)?;
            Some(source.names(n_features)?)
        } else {
            None
        };

        source.header(LEFT)?;
        let children_left = source.ints(node_count, "children_left")?;
        source.header(RIGHT)?;
        let children_right = source.ints(node_count, "children_right")?;
        source.header(THRESHOLD)?;
        let threshold = source.floats(node_count, "threshold")?;
        source.header(FEATURE)?;
        let feature = source.ints(node_count, "feature")?;
        source.header(VALUES)?;
        let value = (0..node_count)
            .map(|_| source.floats(n_classes, "value"))
            .collect::<Result<Vec<_>, _>>()?;

        let model = Self::from_arrays(TreeArrays {
            n_features,
            max_depth,
            classes,
            children_left,
            children_right,
            threshold,
            feature,
            value,
        })?;
        match names {
            Some(names) => model.with_feature_names(names),
            None => Ok(model),
        }
    }
}
