//! In-memory implementations of the input and output boundaries.

mod json;
pub mod sink;
pub mod table;

pub use sink::{CompoundField, DatasetExport, GroupExport, MemorySink, TypeDef};
pub use table::{ColumnData, MemoryTable};
