//! Dataset partitioning and CSV sample I/O for sparsetree.
//!
//! [`PartitionConfig`] splits row-aligned features, labels and ids into
//! train/validation/test partitions, optionally per class. [`SampleReader`]
//! and [`SplitWriter`] move samples between CSV files and memory.

mod domain;
mod error;
mod partition;
mod reader;
mod writer;

pub use domain::{RowId, SampleTable, SplitPrefix};
pub use error::DataError;
pub use partition::{Partition, PartitionConfig, RareClassPolicy, SplitSize, Splits};
pub use reader::SampleReader;
pub use writer::{SplitPaths, SplitWriter};
