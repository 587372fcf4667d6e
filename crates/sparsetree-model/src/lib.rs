//! Fitted classification trees and forests: validation, a bit-exact
//! binary/text codec, and inference.
//!
//! Trees arrive as raw node arrays from an external fitting routine and are
//! validated once by [`TreeModel::from_arrays`]. Validated models can be
//! written in either [`Format`], read back, sized exactly before writing, and
//! evaluated against feature vectors. Forests add an offset table so single
//! estimators can be loaded with [`ForestReader`].

mod error;
mod forest;
mod forest_codec;
mod layout;
mod node;
mod predict;
mod summary;
mod tree;
mod tree_codec;

pub use error::{ErrorKind, ModelError};
pub use forest::ForestModel;
pub use forest_codec::ForestReader;
pub use layout::Format;
pub use node::{LEAF_SENTINEL, NO_CHILD, Node};
pub use predict::majority_vote;
pub use summary::{ForestSummary, TreeSummary};
pub use tree::{TreeArrays, TreeFitter, TreeModel};
