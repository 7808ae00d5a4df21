//! Non-fatal conversion events.

use std::sync::Mutex;

use strata_format::{FieldPath, TypeName};

/// An event worth reporting that does not by itself fail a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A leaf whose declared type no strategy can handle; it is left out of the record.
    UnsupportedType {
        path: FieldPath,
        declared_type: TypeName,
    },
    /// A group left without any mapped member; it is left out of the record.
    EmptyGroup { path: FieldPath },
    /// A table without any mapped field; no dataset is created for it.
    EmptyTable { table: String },
    /// A later namespace entry with the name of an earlier sibling; only the first
    /// one is converted.
    DuplicateEntry { name: String },
    /// A table failed and was skipped by the namespace driver.
    TableFailed { table: String, error: String },
    TableConverted { table: String, records: usize },
}

/// Receiver of conversion diagnostics. Shared by concurrently converted tables.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::UnsupportedType {
                path,
                declared_type,
            } => log::warn!("skipping field '{path}': unsupported type '{declared_type}'"),
            Diagnostic::EmptyGroup { path } => {
                log::warn!("skipping group '{path}': no supported members")
            }
            Diagnostic::EmptyTable { table } => {
                log::warn!("skipping table '{table}': no supported fields")
            }
            Diagnostic::DuplicateEntry { name } => {
                log::warn!("skipping entry '{name}': an earlier entry has the same name")
            }
            Diagnostic::TableFailed { table, error } => {
                log::error!("table '{table}' failed: {error}")
            }
            Diagnostic::TableConverted { table, records } => {
                log::info!("converted table '{table}' ({records} records)")
            }
        }
    }
}

/// Keeps every reported diagnostic, in reporting order.
#[derive(Debug, Default)]
pub struct CollectedDiagnostics {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectedDiagnostics {
    pub fn new() -> CollectedDiagnostics {
        Default::default()
    }

    /// A snapshot of the diagnostics reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.events().iter().filter(|d| predicate(d)).count()
    }

    pub fn unsupported_paths(&self) -> Vec<FieldPath> {
        self.events()
            .into_iter()
            .filter_map(|d| match d {
                Diagnostic::UnsupportedType { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticSink for CollectedDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(diagnostic);
        }
    }
}
