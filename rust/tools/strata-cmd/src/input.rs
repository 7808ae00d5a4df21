//! The input document: a tree of namespaces holding tables with their schema and
//! records.
//!
//! ```json
//! {
//!   "entries": [
//!     { "name": "events", "fields": [{ "name": "a", "type": "Int_t" }], "records": [{ "a": 1 }] },
//!     { "name": "run1", "entries": [] }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use strata_format::SchemaNode;
use strata_io::{SourceNamespace, memory::MemoryTable};

use crate::utils;

#[derive(Debug, Deserialize)]
pub struct InputDocument {
    #[serde(default)]
    pub name: String,
    pub entries: Vec<InputEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputEntry {
    Table(TableDocument),
    Namespace(NamespaceDocument),
}

#[derive(Debug, Deserialize)]
pub struct TableDocument {
    pub name: String,
    /// Top-level fields of the table schema.
    pub fields: Vec<SchemaNode>,
    #[serde(default)]
    pub records: Vec<Value>,
}

impl TableDocument {
    pub fn schema(&self) -> SchemaNode {
        SchemaNode::group(self.name.clone(), self.fields.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct NamespaceDocument {
    pub name: String,
    pub entries: Vec<InputEntry>,
}

impl InputDocument {
    pub fn load(path: &str) -> Result<InputDocument> {
        utils::validate_file_exists(path).with_context(|| format!("Invalid input: {path}"))?;
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read input: {path}"))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse input: {path}"))
    }

    /// Builds the source namespace tree, one in-memory table per table document.
    pub fn into_namespace(self) -> Result<SourceNamespace> {
        let mut namespace = SourceNamespace::new(self.name);
        add_entries(&mut namespace, self.entries, "")?;
        Ok(namespace)
    }

    /// Visits every table document with its slash-separated namespace path.
    pub fn for_each_table(
        &self,
        mut f: impl FnMut(&str, &TableDocument) -> Result<()>,
    ) -> Result<()> {
        visit_tables(&self.entries, "", &mut f)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn add_entries(
    namespace: &mut SourceNamespace,
    entries: Vec<InputEntry>,
    prefix: &str,
) -> Result<()> {
    for entry in entries {
        match entry {
            InputEntry::Table(table) => {
                let path = join(prefix, &table.name);
                let schema = table.schema();
                let source = MemoryTable::from_json(table.name, schema, &table.records)
                    .with_context(|| format!("Invalid table: {path}"))?;
                namespace.add_table(source);
            }
            InputEntry::Namespace(inner) => {
                let path = join(prefix, &inner.name);
                let mut child = SourceNamespace::new(inner.name);
                add_entries(&mut child, inner.entries, &path)?;
                namespace.add_namespace(child);
            }
        }
    }
    Ok(())
}

fn visit_tables(
    entries: &[InputEntry],
    prefix: &str,
    f: &mut impl FnMut(&str, &TableDocument) -> Result<()>,
) -> Result<()> {
    for entry in entries {
        match entry {
            InputEntry::Table(table) => f(&join(prefix, &table.name), table)?,
            InputEntry::Namespace(inner) => {
                visit_tables(&inner.entries, &join(prefix, &inner.name), f)?
            }
        }
    }
    Ok(())
}
