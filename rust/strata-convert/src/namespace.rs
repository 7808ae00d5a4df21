//! Conversion of namespaces: trees of tables mapped onto trees of output groups.

use ahash::AHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strata_common::Result;
use strata_io::{
    GroupHandle, OutputSink, SharedSink, SourceEntry, SourceNamespace, TableSource,
};

use crate::{
    diagnostics::Diagnostic,
    table::{TableConverter, TableOutcome, TableReport},
};

/// What the namespace driver does when a table fails.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableErrorPolicy {
    /// Stop at the first failed table and return its error.
    #[default]
    Abort,
    /// Record the failure and continue with the next table.
    Skip,
}

/// Parameters of a namespace conversion.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertParams {
    pub error_policy: TableErrorPolicy,
    /// Convert the tables of each namespace level concurrently.
    pub parallel: bool,
}

/// A table the namespace driver gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTable {
    pub table: String,
    pub error: String,
}

/// Outcome of a namespace conversion.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConversionSummary {
    pub converted: Vec<TableReport>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedTable>,
}

impl ConversionSummary {
    pub fn total_records(&self) -> usize {
        self.converted.iter().map(|r| r.records).sum()
    }
}

/// Converts every table of a namespace tree.
///
/// Each nested namespace becomes an output group of the same name, each table a
/// dataset in the group of its namespace. The top-level namespace maps onto the given
/// parent group.
pub struct NamespaceConverter<'a> {
    tables: TableConverter<'a>,
    params: ConvertParams,
}

impl<'a> NamespaceConverter<'a> {
    pub fn new(tables: TableConverter<'a>, params: ConvertParams) -> NamespaceConverter<'a> {
        NamespaceConverter { tables, params }
    }

    pub fn params(&self) -> &ConvertParams {
        &self.params
    }

    /// Converts `namespace` into `parent`.
    ///
    /// # Errors
    ///
    /// With [`TableErrorPolicy::Abort`], the error of the first failed table. Failing
    /// to create or close an output group is an error under either policy. Groups
    /// opened by the driver are closed before any error is returned.
    pub fn convert<S: OutputSink + Send>(
        &self,
        namespace: &mut SourceNamespace,
        sink: &SharedSink<S>,
        parent: GroupHandle,
    ) -> Result<ConversionSummary> {
        let mut summary = ConversionSummary::default();
        self.convert_into(namespace, sink, parent, &mut summary)?;
        log::info!(
            "converted {} tables ({} records), skipped {}, failed {}",
            summary.converted.len(),
            summary.total_records(),
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn convert_into<S: OutputSink + Send>(
        &self,
        namespace: &mut SourceNamespace,
        sink: &SharedSink<S>,
        group: GroupHandle,
        summary: &mut ConversionSummary,
    ) -> Result<()> {
        let first = first_occurrences(namespace);
        if self.params.parallel {
            let tables = namespace
                .entries_mut()
                .iter_mut()
                .zip(&first)
                .filter_map(|(entry, &first)| match entry {
                    SourceEntry::Table(table) if first => {
                        Some(&mut **table as &mut (dyn TableSource + Send))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>();
            for (table, result) in convert_tables_parallel(tables, sink, group, &self.tables) {
                self.record(table, result, summary)?;
            }
        }

        let mut local = sink.clone();
        for (entry, &first) in namespace.entries_mut().iter_mut().zip(&first) {
            if !first {
                self.skip_duplicate(entry, summary);
                continue;
            }
            match entry {
                SourceEntry::Table(table) if !self.params.parallel => {
                    let name = table.name().to_string();
                    let result = self.tables.convert(table.as_mut(), &mut local, group);
                    self.record(name, result, summary)?;
                }
                SourceEntry::Table(_) => {}
                SourceEntry::Namespace(inner) => {
                    log::debug!("entering namespace '{}'", inner.name());
                    let child = local.create_group(group, inner.name())?;
                    let converted = self.convert_into(inner, sink, child, summary);
                    let closed = local.close_group(child);
                    converted?;
                    closed?;
                }
            }
        }
        Ok(())
    }

    fn skip_duplicate(&self, entry: &SourceEntry, summary: &mut ConversionSummary) {
        let name = entry.name().to_string();
        if let SourceEntry::Table(_) = entry {
            summary.skipped.push(name.clone());
        }
        self.tables
            .diagnostics()
            .report(Diagnostic::DuplicateEntry { name });
    }

    fn record(
        &self,
        table: String,
        result: Result<TableOutcome>,
        summary: &mut ConversionSummary,
    ) -> Result<()> {
        match result {
            Ok(TableOutcome::Converted(report)) => summary.converted.push(report),
            Ok(TableOutcome::Skipped(_)) => summary.skipped.push(table),
            Err(e) => {
                self.tables.diagnostics().report(Diagnostic::TableFailed {
                    table: table.clone(),
                    error: e.to_string(),
                });
                match self.params.error_policy {
                    TableErrorPolicy::Abort => return Err(e),
                    TableErrorPolicy::Skip => summary.failed.push(FailedTable {
                        table,
                        error: e.to_string(),
                    }),
                }
            }
        }
        Ok(())
    }
}

/// Marks the entries to convert: the first of each name. Later entries with the same
/// name, such as older cycles of an input key, are left out.
fn first_occurrences(namespace: &SourceNamespace) -> Vec<bool> {
    let mut seen = AHashSet::new();
    namespace
        .entries()
        .iter()
        .map(|entry| seen.insert(entry.name()))
        .collect()
}

/// Converts independent tables concurrently into the same parent group.
///
/// Every table gets its own layout, record frame and output types; the sink is shared
/// through its lock. Results are returned in the order of `tables`, with the table
/// names.
pub fn convert_tables_parallel<S: OutputSink + Send>(
    tables: Vec<&mut (dyn TableSource + Send)>,
    sink: &SharedSink<S>,
    parent: GroupHandle,
    converter: &TableConverter<'_>,
) -> Vec<(String, Result<TableOutcome>)> {
    tables
        .into_par_iter()
        .map(|table| {
            let mut sink = sink.clone();
            let name = table.name().to_string();
            let result = converter.convert(table, &mut sink, parent);
            (name, result)
        })
        .collect()
}
