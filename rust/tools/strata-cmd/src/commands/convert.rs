//! Convert command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use strata_convert::{
    ConversionSummary, ConvertParams, LogDiagnostics, NamespaceConverter, StrategyRegistry,
    TableConverter, TableErrorPolicy,
};
use strata_io::{
    OutputSink, SharedSink,
    memory::{GroupExport, MemorySink},
};

use crate::{input::InputDocument, utils};

pub struct ConvertArgs {
    pub input: String,
    pub output: String,
    pub overwrite: bool,
    pub skip_failed: bool,
    pub parallel: bool,
}

impl ConvertArgs {
    fn params(&self) -> ConvertParams {
        ConvertParams {
            error_policy: if self.skip_failed {
                TableErrorPolicy::Skip
            } else {
                TableErrorPolicy::Abort
            },
            parallel: self.parallel,
        }
    }
}

#[derive(Serialize)]
struct ConvertOutput {
    summary: ConversionSummary,
    container: GroupExport,
}

pub fn run(args: ConvertArgs) -> Result<()> {
    utils::validate_output_path(&args.output, args.overwrite)
        .with_context(|| format!("Invalid output: {}", args.output))?;
    let output = convert_document(&args)?;

    let json = serde_json::to_string_pretty(&output).context("Failed to serialize output")?;
    fs::write(&args.output, json)
        .with_context(|| format!("Failed to write output file: {}", args.output))?;

    let summary = &output.summary;
    println!(
        "Converted {} tables ({} records) into {}",
        summary.converted.len(),
        summary.total_records(),
        args.output
    );
    if !summary.skipped.is_empty() {
        println!("  Skipped tables: {}", summary.skipped.join(", "));
    }
    for failed in &summary.failed {
        println!("  Failed table {}: {}", failed.table, failed.error);
    }
    Ok(())
}

fn convert_document(args: &ConvertArgs) -> Result<ConvertOutput> {
    let mut namespace = InputDocument::load(&args.input)?.into_namespace()?;
    let registry = StrategyRegistry::builtin();
    let diagnostics = LogDiagnostics;
    let tables = TableConverter::new(&registry, &diagnostics);
    let converter = NamespaceConverter::new(tables, args.params());

    let sink = SharedSink::new(MemorySink::new());
    let root = sink.root_group();
    let summary = converter
        .convert(&mut namespace, &sink, root)
        .with_context(|| format!("Failed to convert {}", args.input))?;
    let sink = sink.into_inner()?;
    let container = sink.export().context("Failed to export output container")?;
    Ok(ConvertOutput { summary, container })
}
