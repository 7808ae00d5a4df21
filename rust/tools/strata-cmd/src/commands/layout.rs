//! Layout command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use strata_convert::{LayoutPlan, LogDiagnostics, StrategyRegistry};

use crate::input::InputDocument;

#[derive(Serialize)]
struct TableLayout {
    table: String,
    layout: LayoutPlan,
}

pub fn run(input: String) -> Result<()> {
    let layouts = plan_document(&input)?;
    let json = serde_json::to_string_pretty(&layouts).context("Failed to serialize layouts")?;
    println!("{json}");
    Ok(())
}

fn plan_document(input: &str) -> Result<Vec<TableLayout>> {
    let document = InputDocument::load(input)?;
    let registry = StrategyRegistry::builtin();
    let mut layouts = Vec::new();
    document.for_each_table(|path, table| {
        let layout = LayoutPlan::plan(&table.schema(), &registry, &LogDiagnostics)
            .with_context(|| format!("Failed to plan table: {path}"))?;
        layouts.push(TableLayout {
            table: path.to_string(),
            layout,
        });
        Ok(())
    })?;
    Ok(layouts)
}
