//! Conversion of a single table.

use serde::Serialize;
use strata_common::{Result, error::Error};
use strata_format::FieldPath;
use strata_io::{
    DatasetHandle, GroupHandle, OutputSink, RecordFrame, TableSource, TypeHandle,
};

use crate::{
    binder::{RowBinder, RowConverter},
    descriptor::DescriptorBuilder,
    diagnostics::{Diagnostic, DiagnosticSink},
    planner::LayoutPlan,
    strategy::StrategyRegistry,
};

/// Summary of a converted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub records: usize,
    pub record_size: usize,
    pub fields: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_fields: Vec<FieldPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No field of the table has a supported type.
    NoMappedFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Converted(TableReport),
    Skipped(SkipReason),
}

impl TableOutcome {
    pub fn report(&self) -> Option<&TableReport> {
        match self {
            TableOutcome::Converted(report) => Some(report),
            TableOutcome::Skipped(_) => None,
        }
    }
}

/// Converts one table into one dataset.
///
/// The table's layout, output types, record frame and field bindings live for the
/// duration of [`TableConverter::convert`] only. The converter itself holds shared,
/// read-only state and may be used from several threads at once.
#[derive(Clone, Copy)]
pub struct TableConverter<'a> {
    registry: &'a StrategyRegistry,
    diagnostics: &'a dyn DiagnosticSink,
}

impl<'a> TableConverter<'a> {
    pub fn new(
        registry: &'a StrategyRegistry,
        diagnostics: &'a dyn DiagnosticSink,
    ) -> TableConverter<'a> {
        TableConverter {
            registry,
            diagnostics,
        }
    }

    pub fn registry(&self) -> &'a StrategyRegistry {
        self.registry
    }

    pub fn diagnostics(&self) -> &'a dyn DiagnosticSink {
        self.diagnostics
    }

    /// Converts every record of `source` into a dataset named after the table, under
    /// `group`.
    ///
    /// A table without any supported field is skipped: no output type and no dataset
    /// are created for it.
    ///
    /// # Errors
    ///
    /// Any failure aborts the table. The field deallocators and the output type
    /// teardown run before the error is returned; records written up to that point
    /// stay in the dataset.
    pub fn convert(
        &self,
        source: &mut dyn TableSource,
        sink: &mut dyn OutputSink,
        group: GroupHandle,
    ) -> Result<TableOutcome> {
        let table = source.name().to_string();
        let schema = source.schema().clone();
        let plan = LayoutPlan::plan(&schema, self.registry, self.diagnostics)?;
        if plan.is_empty() {
            self.diagnostics.report(Diagnostic::EmptyTable { table });
            return Ok(TableOutcome::Skipped(SkipReason::NoMappedFields));
        }
        log::debug!(
            "converting table '{table}': {} records of {} bytes",
            source.record_count(),
            plan.buffer_size()
        );

        let descriptor = DescriptorBuilder::new(&plan, self.registry).build(&schema, sink)?;
        let mut frame = RecordFrame::new(plan.buffer_size());
        let bound = RowBinder::new(&plan, self.registry).bind(&schema, &mut frame, source);
        let (mut converter, deallocator) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                if let Err(cleanup) = descriptor.teardown.run(sink) {
                    log::warn!("teardown of '{table}' failed: {cleanup}");
                }
                return Err(e);
            }
        };

        let mut records = RecordWriter {
            table: &table,
            source,
            sink: &mut *sink,
            frame: &mut frame,
            converter: &mut converter,
        };
        let written = records.write_all(group, descriptor.root);
        let released = deallocator.run(&mut frame);
        let closed = descriptor.teardown.run(sink);
        let records = written?;
        released?;
        closed?;

        self.diagnostics.report(Diagnostic::TableConverted {
            table: table.clone(),
            records,
        });
        Ok(TableOutcome::Converted(TableReport {
            table,
            records,
            record_size: plan.buffer_size(),
            fields: plan.leaf_count(),
            skipped_fields: plan.skipped().iter().map(|s| s.path.clone()).collect(),
        }))
    }
}

/// The record loop of one table.
struct RecordWriter<'a> {
    table: &'a str,
    source: &'a mut dyn TableSource,
    sink: &'a mut dyn OutputSink,
    frame: &'a mut RecordFrame,
    converter: &'a mut RowConverter,
}

impl RecordWriter<'_> {
    /// Creates the dataset, writes every record and closes the dataset.
    fn write_all(&mut self, group: GroupHandle, ty: TypeHandle) -> Result<usize> {
        let count = self.source.record_count();
        let dataset = self.sink.create_dataset(group, self.table, ty.into(), count)?;
        let written = (0..count).try_for_each(|index| self.write_record(dataset, index));
        let closed = self.sink.close_dataset(dataset);
        written?;
        closed?;
        Ok(count)
    }

    fn write_record(&mut self, dataset: DatasetHandle, index: usize) -> Result<()> {
        self.frame.begin_record();
        self.source
            .load_record(index, self.frame)
            .map_err(|e| Error::source_read(self.table, index, e))?;
        self.converter.convert(self.frame)?;
        self.sink.write_record(dataset, index, self.frame.view())
    }
}
