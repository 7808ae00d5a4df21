//! Ordered release of output handles.

use strata_common::Result;
use strata_io::{GroupHandle, OutputSink, TypeHandle};

/// A single release step against the output sink.
pub enum TeardownAction {
    CloseType(TypeHandle),
    CloseGroup(GroupHandle),
    Custom(Box<dyn FnOnce(&mut dyn OutputSink) -> Result<()> + Send>),
}

impl TeardownAction {
    fn run(self, sink: &mut dyn OutputSink) -> Result<()> {
        match self {
            TeardownAction::CloseType(handle) => sink.close_type(handle),
            TeardownAction::CloseGroup(group) => sink.close_group(group),
            TeardownAction::Custom(action) => action(sink),
        }
    }
}

impl std::fmt::Debug for TeardownAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownAction::CloseType(handle) => f.debug_tuple("CloseType").field(handle).finish(),
            TeardownAction::CloseGroup(group) => f.debug_tuple("CloseGroup").field(group).finish(),
            TeardownAction::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Release steps, registered at the time each resource is acquired.
///
/// [`Teardown::run`] executes them in reverse registration order, so a handle is
/// released before the handles acquired ahead of it.
#[derive(Debug, Default)]
pub struct Teardown {
    actions: Vec<TeardownAction>,
}

impl Teardown {
    pub fn new() -> Teardown {
        Default::default()
    }

    pub fn push(&mut self, action: TeardownAction) {
        self.actions.push(action);
    }

    pub fn close_type(&mut self, handle: TypeHandle) {
        self.push(TeardownAction::CloseType(handle));
    }

    pub fn close_group(&mut self, group: GroupHandle) {
        self.push(TeardownAction::CloseGroup(group));
    }

    pub fn custom<F>(&mut self, action: F)
    where
        F: FnOnce(&mut dyn OutputSink) -> Result<()> + Send + 'static,
    {
        self.push(TeardownAction::Custom(Box::new(action)));
    }

    /// Appends the steps of `other` after the steps already registered.
    pub fn append(&mut self, other: Teardown) {
        self.actions.extend(other.actions);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every step in reverse registration order.
    ///
    /// A failing step does not stop the remaining ones. The first error is returned.
    pub fn run(self, sink: &mut dyn OutputSink) -> Result<()> {
        let mut first_error = None;
        for action in self.actions.into_iter().rev() {
            if let Err(e) = action.run(sink) {
                log::warn!("teardown step failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
