//! I/O abstractions for record conversion:
//! - `RecordFrame`: the single in-memory record buffer of a table, together with its
//!   variable-length heap and the intermediate holding buffers of sequence fields.
//! - `TableSource`: the input side, a table that can bind its fields to frame locations
//!   and load one record at a time.
//! - `OutputSink`: the output side, a storage backend offering nested compound types
//!   and fixed-layout record datasets.
//!
//! Provides in-memory implementations of both sides.

pub mod frame;
pub mod memory;
pub mod shared;
pub mod sink;
pub mod source;

pub use frame::{HoldingId, RecordFrame, RecordView, SequenceValue, VarLenSlot};
pub use shared::SharedSink;
pub use sink::{DatasetHandle, GroupHandle, OutputSink, TypeHandle, TypeRef};
pub use source::{BindTarget, SourceEntry, SourceNamespace, TableSource};
