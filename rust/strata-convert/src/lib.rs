//! Schema flattening and layout compilation.
//!
//! Converts tables described by hierarchical schemas into fixed-layout records of
//! nested compound types. A table goes through three passes over its schema, all
//! driven by the [`walker`]:
//! - [`planner`] computes the byte layout of the single record buffer,
//! - [`descriptor`] builds the matching tree of output compound types,
//! - [`binder`] binds every leaf to its buffer location and assembles the per-record
//!   converter and deallocator.
//!
//! [`table::TableConverter`] runs the passes and the record loop for one table,
//! [`namespace`] drives whole trees of tables.

pub mod binder;
pub mod descriptor;
pub mod diagnostics;
pub mod namespace;
pub mod planner;
pub mod strategy;
pub mod table;
pub mod teardown;
pub mod walker;

#[cfg(test)]
mod tests;

pub use binder::{Deallocator, RowBinder, RowConverter};
pub use descriptor::{Descriptor, DescriptorBuilder};
pub use diagnostics::{CollectedDiagnostics, Diagnostic, DiagnosticSink, LogDiagnostics};
pub use namespace::{
    ConversionSummary, ConvertParams, NamespaceConverter, TableErrorPolicy,
    convert_tables_parallel,
};
pub use planner::{EntryKind, LayoutEntry, LayoutPlan};
pub use strategy::{StrategyRegistry, TypeStrategy};
pub use table::{TableConverter, TableOutcome, TableReport};
pub use teardown::{Teardown, TeardownAction};
pub use walker::{SchemaVisitor, walk, walk_fn};
